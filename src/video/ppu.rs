use crate::memory::mmu::Mmu;
use crate::memory::registers::{InterruptFlags, LcdControl, LcdStatus, VideoRegisters};
use crate::video::palette::Palette;
use crate::video::sprite::{Sprite, SpriteAttributes, SPRITES_PER_LINE, SPRITE_COUNT};
use crate::video::state::Mode;
use crate::video::tile::TileRow;
use crate::video::{
    SCREEN_HEIGHT, SCREEN_WIDTH, SCANLINES_PER_FRAME, TILEMAP_0_ADDRESS, TILEMAP_1_ADDRESS, TILESET_0_ADDRESS,
    TILESET_1_ADDRESS,
};
use log::{debug, trace};

const VBLANK_START: u8 = SCREEN_HEIGHT as u8;
const WINDOW_X_LIMIT: u8 = 166;

pub struct Ppu {
    line: u8,
    dot: usize,
    mode: Mode,
    window_line: u8,
    line_sprites: Vec<Sprite>,
    stat_line: bool,
    enabled: bool,
    frame: Vec<Palette>,
    completed: Vec<Palette>,
}

impl Ppu {
    pub fn new() -> Ppu {
        Ppu {
            line: 0,
            dot: 0,
            mode: Mode::OamScan,
            window_line: 0,
            line_sprites: Vec::with_capacity(SPRITES_PER_LINE),
            stat_line: false,
            enabled: false,
            frame: vec![Palette::default(); SCREEN_WIDTH * SCREEN_HEIGHT],
            completed: vec![Palette::default(); SCREEN_WIDTH * SCREEN_HEIGHT],
        }
    }

    pub fn reset(&mut self) {
        *self = Ppu::new();
    }

    /// Runs the scanline state machine for `cycles` dots. Returns true if a frame was
    /// completed (V-Blank entered) during this call.
    pub fn advance(&mut self, mmu: &mut Mmu, cycles: usize) -> bool {
        if !mmu.video().lcd_enabled() {
            if self.enabled {
                debug!("PPU parked, LCD is off");
                self.enabled = false;
                self.line = 0;
                self.dot = 0;
                self.mode = Mode::HBlank;
                self.window_line = 0;
                self.stat_line = false;
                self.sync_registers(mmu);
            }
            return false;
        }

        if !self.enabled {
            debug!("PPU starting, LCD is on");
            self.enabled = true;
            self.line = 0;
            self.dot = 0;
            self.mode = Mode::OamScan;
            self.window_line = 0;
            self.sync_registers(mmu);
        }

        self.update_stat_line(mmu);

        let mut frame_complete = false;
        let mut remaining = cycles;

        while remaining > 0 {
            let step = remaining.min(self.mode.duration() - self.dot);
            self.dot += step;
            remaining -= step;

            if self.dot < self.mode.duration() {
                break;
            }

            self.dot = 0;
            frame_complete |= self.finish_mode(mmu);
            self.sync_registers(mmu);
            self.update_stat_line(mmu);
        }

        frame_complete
    }

    fn finish_mode(&mut self, mmu: &mut Mmu) -> bool {
        match self.mode {
            Mode::OamScan => {
                self.select_sprites(mmu);
                self.mode = Mode::Drawing;
            }
            Mode::Drawing => {
                self.render_scanline(mmu);
                self.mode = Mode::HBlank;
            }
            Mode::HBlank => {
                self.line += 1;

                if self.line == VBLANK_START {
                    self.mode = Mode::VBlank;
                    self.completed.copy_from_slice(&self.frame);
                    mmu.request_interrupt(InterruptFlags::VBLANK);
                    trace!("PPU entered V-Blank");
                    return true;
                }

                self.mode = Mode::OamScan;
            }
            Mode::VBlank => {
                self.line += 1;

                if self.line == SCANLINES_PER_FRAME {
                    self.line = 0;
                    self.window_line = 0;
                    self.mode = Mode::OamScan;
                }
            }
        }

        false
    }

    fn sync_registers(&self, mmu: &mut Mmu) {
        let video = mmu.video_mut();
        video.ly = self.line;
        video.set_mode_bits(self.mode.as_u8());
        video.refresh_coincidence();
    }

    /// The STAT interrupt fires on the rising edge of the OR of all enabled sources.
    fn update_stat_line(&mut self, mmu: &mut Mmu) {
        let stat = mmu.video().stat;

        let line = (self.mode == Mode::HBlank && stat.contains(LcdStatus::HBLANK_IRQ))
            || (self.mode == Mode::VBlank && stat.contains(LcdStatus::VBLANK_IRQ))
            || (self.mode == Mode::OamScan && stat.contains(LcdStatus::OAM_IRQ))
            || (stat.contains(LcdStatus::COINCIDENCE) && stat.contains(LcdStatus::COINCIDENCE_IRQ));

        if line && !self.stat_line {
            trace!("STAT interrupt on line {} in {:?}", self.line, self.mode);
            mmu.request_interrupt(InterruptFlags::LCD_STAT);
        }

        self.stat_line = line;
    }

    fn sprite_height(lcdc: LcdControl) -> u8 {
        if lcdc.contains(LcdControl::OBJ_SIZE) {
            16
        } else {
            8
        }
    }

    fn select_sprites(&mut self, mmu: &Mmu) {
        let height = Self::sprite_height(mmu.video().lcdc);

        self.line_sprites.clear();
        self.line_sprites.extend(
            (0..SPRITE_COUNT)
                .map(|index| Sprite::from_oam(mmu, index))
                .filter(|sprite| sprite.is_visible_on_scanline(self.line, height))
                .take(SPRITES_PER_LINE),
        );

        // Smaller X wins, OAM order breaks ties.
        self.line_sprites.sort_by_key(|sprite| (sprite.x, sprite.oam_index));
    }

    fn render_scanline(&mut self, mmu: &Mmu) {
        let video = *mmu.video();
        let line = self.line;
        let row_start = line as usize * SCREEN_WIDTH;
        let mut bg_colors = [0u8; SCREEN_WIDTH];

        let bg_enabled = video.lcdc.contains(LcdControl::BG_DISPLAY);
        let window_visible = bg_enabled
            && video.lcdc.contains(LcdControl::WINDOW_DISPLAY)
            && video.wy <= line
            && video.wx <= WINDOW_X_LIMIT;
        let mut window_drawn = false;

        for x in 0..SCREEN_WIDTH as u8 {
            let color = if !bg_enabled {
                0
            } else if window_visible && x + 7 >= video.wx {
                window_drawn = true;
                let map = if video.lcdc.contains(LcdControl::WINDOW_TILE_MAP) {
                    TILEMAP_1_ADDRESS
                } else {
                    TILEMAP_0_ADDRESS
                };
                Self::background_color(mmu, &video, map, x + 7 - video.wx, self.window_line)
            } else {
                let map = if video.lcdc.contains(LcdControl::BG_TILE_MAP) {
                    TILEMAP_1_ADDRESS
                } else {
                    TILEMAP_0_ADDRESS
                };
                Self::background_color(mmu, &video, map, x.wrapping_add(video.scx), line.wrapping_add(video.scy))
            };

            bg_colors[x as usize] = color;
            // With LCDC.0 clear the background is blank, whatever BGP says.
            self.frame[row_start + x as usize] = if bg_enabled {
                Palette::from_register(color, video.bgp)
            } else {
                Palette::White
            };
        }

        if window_drawn {
            self.window_line += 1;
        }

        if video.lcdc.contains(LcdControl::OBJ_DISPLAY) {
            self.render_sprites(mmu, &video, &bg_colors);
        }
    }

    fn background_color(mmu: &Mmu, video: &VideoRegisters, map: u16, x: u8, y: u8) -> u8 {
        let tile_index = mmu.read_vram(map + (y as u16 / 8) * 32 + (x as u16 / 8));

        let address = if video.lcdc.contains(LcdControl::BG_TILE_DATA) {
            TILESET_0_ADDRESS + tile_index as u16 * 16
        } else {
            // $9000-based signed addressing
            TILESET_1_ADDRESS.wrapping_add_signed(tile_index as i8 as i16 * 16)
        };

        TileRow::fetch(mmu, address, y % 8).color(x % 8)
    }

    fn render_sprites(&mut self, mmu: &Mmu, video: &VideoRegisters, bg_colors: &[u8; SCREEN_WIDTH]) {
        let height = Self::sprite_height(video.lcdc);
        let row_start = self.line as usize * SCREEN_WIDTH;

        let rows = self
            .line_sprites
            .iter()
            .map(|sprite| {
                let tile = if height == 16 {
                    sprite.tile_index & 0xfe
                } else {
                    sprite.tile_index
                };
                let address = TILESET_0_ADDRESS + tile as u16 * 16;
                (sprite, TileRow::fetch(mmu, address, sprite.row(self.line, height)))
            })
            .collect::<Vec<_>>();

        for x in 0..SCREEN_WIDTH as u8 {
            let pixel = rows.iter().find_map(|(sprite, row)| {
                let color = row.color(sprite.column(x)?);
                (color != 0).then_some((sprite, color))
            });

            let Some((sprite, color)) = pixel else {
                continue;
            };

            if sprite.attributes.contains(SpriteAttributes::PRIORITY) && bg_colors[x as usize] != 0 {
                continue;
            }

            let palette = if sprite.attributes.contains(SpriteAttributes::PALETTE) {
                video.obp1
            } else {
                video.obp0
            };
            self.frame[row_start + x as usize] = Palette::from_register(color, palette);
        }
    }

    pub fn line(&self) -> u8 {
        self.line
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// The last frame published on V-Blank entry, row-major.
    pub fn completed_frame(&self) -> &[Palette] {
        &self.completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::{
        BG_PALETTE_REGISTER, CYCLES_PER_FRAME, LCD_CONTROL_REGISTER, LCD_STATUS_REGISTER, SCANLINE_Y_COMPARE_REGISTER,
    };

    fn powered_mmu() -> Mmu {
        let mut mmu = Mmu::new();
        mmu.reset();
        mmu.disable_access_locks();
        mmu.write(0xff0f, 0x00);
        mmu
    }

    fn fill_tile(mmu: &mut Mmu, address: u16, color: u8) {
        let lsb = if color & 0b01 != 0 { 0xff } else { 0x00 };
        let msb = if color & 0b10 != 0 { 0xff } else { 0x00 };
        for row in 0..8 {
            mmu.write(address + row * 2, lsb);
            mmu.write(address + row * 2 + 1, msb);
        }
    }

    #[test]
    fn one_frame_visits_every_mode_in_order() {
        let mut mmu = powered_mmu();
        let mut ppu = Ppu::new();
        ppu.advance(&mut mmu, 0);

        let mut visited = vec![(ppu.line(), ppu.mode())];
        let mut completed = 0;
        for _ in 0..CYCLES_PER_FRAME / 4 {
            if ppu.advance(&mut mmu, 4) {
                completed += 1;
            }
            let state = (ppu.line(), ppu.mode());
            if visited.last() != Some(&state) {
                visited.push(state);
            }
        }

        assert_eq!(completed, 1);
        assert_eq!(visited.len(), 144 * 3 + 10 + 1);
        for line in 0..144u8 {
            let start = line as usize * 3;
            assert_eq!(visited[start], (line, Mode::OamScan));
            assert_eq!(visited[start + 1], (line, Mode::Drawing));
            assert_eq!(visited[start + 2], (line, Mode::HBlank));
        }
        for (i, line) in (144..154u8).enumerate() {
            assert_eq!(visited[144 * 3 + i], (line, Mode::VBlank));
        }
        assert_eq!(visited.last(), Some(&(0, Mode::OamScan)));
    }

    #[test]
    fn large_advance_crosses_multiple_boundaries() {
        let mut mmu = powered_mmu();
        let mut ppu = Ppu::new();

        assert!(ppu.advance(&mut mmu, 144 * 456));
        assert_eq!(ppu.line(), 144);
        assert_eq!(ppu.mode(), Mode::VBlank);
        assert_eq!(mmu.video().ly, 144);
        assert!(mmu.pending_interrupts().is_empty());

        mmu.write(0xffff, 0x01);
        assert_eq!(mmu.pending_interrupts(), InterruptFlags::VBLANK);
    }

    #[test]
    fn lcd_off_parks_the_ppu() {
        let mut mmu = powered_mmu();
        let mut ppu = Ppu::new();
        ppu.advance(&mut mmu, 1000);
        assert_ne!(ppu.line(), 0);

        mmu.write(LCD_CONTROL_REGISTER, 0x11);
        assert!(!ppu.advance(&mut mmu, CYCLES_PER_FRAME * 2));
        assert_eq!(ppu.line(), 0);
        assert_eq!(ppu.mode(), Mode::HBlank);
        assert_eq!(mmu.video().mode_bits(), 0);

        mmu.write(LCD_CONTROL_REGISTER, 0x91);
        ppu.advance(&mut mmu, 4);
        assert_eq!(ppu.mode(), Mode::OamScan);
    }

    #[test]
    fn coincidence_raises_stat_once() {
        let mut mmu = powered_mmu();
        mmu.write(0xffff, InterruptFlags::LCD_STAT.bits());
        mmu.write(SCANLINE_Y_COMPARE_REGISTER, 2);
        mmu.write(LCD_STATUS_REGISTER, LcdStatus::COINCIDENCE_IRQ.bits());

        let mut ppu = Ppu::new();
        ppu.advance(&mut mmu, 456 * 2 - 4);
        assert!(mmu.pending_interrupts().is_empty());

        ppu.advance(&mut mmu, 4);
        assert_eq!(mmu.pending_interrupts(), InterruptFlags::LCD_STAT);

        mmu.clear_interrupt(InterruptFlags::LCD_STAT);
        ppu.advance(&mut mmu, 200);
        assert!(mmu.pending_interrupts().is_empty());
    }

    #[test]
    fn disabled_background_is_blank_regardless_of_palette() {
        let mut mmu = powered_mmu();
        fill_tile(&mut mmu, 0x8000, 3);
        mmu.write(BG_PALETTE_REGISTER, 0xff);
        // LCD on, BG off, tile data at $8000
        mmu.write(LCD_CONTROL_REGISTER, 0x90);

        let mut ppu = Ppu::new();
        ppu.advance(&mut mmu, 144 * 456);

        assert!(ppu.completed_frame().iter().all(|&pixel| pixel == Palette::White));
    }

    #[test]
    fn background_uses_scroll_and_palette() {
        let mut mmu = powered_mmu();
        // Tile 1 is solid colour 3, placed at map column 1.
        fill_tile(&mut mmu, 0x8010, 3);
        mmu.write(TILEMAP_0_ADDRESS + 1, 1);
        mmu.write(LCD_CONTROL_REGISTER, 0x91);

        let mut ppu = Ppu::new();
        ppu.advance(&mut mmu, 144 * 456);

        let frame = ppu.completed_frame();
        assert_eq!(frame[7], Palette::White);
        assert_eq!(frame[8], Palette::Black);
        assert_eq!(frame[15], Palette::Black);
        assert_eq!(frame[16], Palette::White);
    }

    #[test]
    fn signed_tile_data_addressing() {
        let mut mmu = powered_mmu();
        // Tile index $ff in $8800 mode lives at $8ff0.
        fill_tile(&mut mmu, 0x8ff0, 1);
        mmu.write(TILEMAP_0_ADDRESS, 0xff);
        mmu.write(LCD_CONTROL_REGISTER, 0x81);

        let mut ppu = Ppu::new();
        ppu.advance(&mut mmu, 144 * 456);

        assert_eq!(ppu.completed_frame()[0], Palette::from_register(1, 0xfc));
    }

    #[test]
    fn sprite_priority_and_transparency() {
        let mut mmu = powered_mmu();
        fill_tile(&mut mmu, 0x8010, 3);
        fill_tile(&mut mmu, 0x8020, 1);
        // Sprite 0 covers x 4..12 with tile 2. Sprite 1 covers x 0..8 with tile 1 and wins the overlap.
        let oam = [16, 12, 2, 0x00, 16, 8, 1, 0x00];
        for (i, byte) in oam.iter().enumerate() {
            mmu.write(0xfe00 + i as u16, *byte);
        }
        mmu.write(0xff48, 0xe4);
        mmu.write(LCD_CONTROL_REGISTER, 0x93);

        let mut ppu = Ppu::new();
        ppu.advance(&mut mmu, 144 * 456);

        let frame = ppu.completed_frame();
        assert_eq!(frame[0], Palette::Black);
        assert_eq!(frame[7], Palette::Black);
        assert_eq!(frame[8], Palette::LightGray);
        assert_eq!(frame[11], Palette::LightGray);
        assert_eq!(frame[12], Palette::White);
    }

    #[test]
    fn sprite_behind_background() {
        let mut mmu = powered_mmu();
        fill_tile(&mut mmu, 0x8010, 2);
        mmu.write(TILEMAP_0_ADDRESS, 1);
        let oam = [16, 8, 1, 0x80, 16, 24, 1, 0x80];
        for (i, byte) in oam.iter().enumerate() {
            mmu.write(0xfe00 + i as u16, *byte);
        }
        mmu.write(0xff48, 0x10);
        mmu.write(LCD_CONTROL_REGISTER, 0x93);

        let mut ppu = Ppu::new();
        ppu.advance(&mut mmu, 144 * 456);

        let frame = ppu.completed_frame();
        // BG colour 2 wins over the hidden sprite, BG colour 0 does not.
        assert_eq!(frame[0], Palette::Black);
        assert_eq!(frame[16], Palette::LightGray);
    }

    #[test]
    fn window_line_counter_only_advances_when_drawn() {
        let mut mmu = powered_mmu();
        fill_tile(&mut mmu, 0x8010, 3);
        // Window map row 1 holds tile 1, row 0 is blank.
        for column in 0..32 {
            mmu.write(TILEMAP_1_ADDRESS + 32 + column, 1);
        }
        mmu.write(0xff4a, 10);
        mmu.write(0xff4b, 7);
        mmu.write(LCD_CONTROL_REGISTER, 0xf1);

        let mut ppu = Ppu::new();
        ppu.advance(&mut mmu, 144 * 456);

        let frame = ppu.completed_frame();
        assert_eq!(frame[9 * SCREEN_WIDTH], Palette::White);
        assert_eq!(frame[17 * SCREEN_WIDTH], Palette::White);
        assert_eq!(frame[18 * SCREEN_WIDTH], Palette::Black);
    }
}
