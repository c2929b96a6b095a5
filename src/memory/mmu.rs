use crate::lr35902::timer::Timer;
use crate::memory::cartridge::Cartridge;
use crate::memory::registers::{InterruptFlags, LcdControl, LcdStatus, VideoRegisters};
use crate::memory::{
    BOOTROM_MAPPER_REGISTER, DIV_REGISTER, EXTERNAL_RAM_END, EXTERNAL_RAM_START, INTERRUPT_ENABLE_REGISTER,
    INTERRUPT_FLAGS_REGISTER, JOYPAD_REGISTER, OAM_DMA_REGISTER, OPEN_BUS, SERIAL_CONTROL_REGISTER,
    SERIAL_DATA_REGISTER, TAC_REGISTER,
};
use crate::video::state::Mode;
use crate::video::{
    BG_PALETTE_REGISTER, LCD_CONTROL_REGISTER, LCD_STATUS_REGISTER, OBJ0_PALETTE_REGISTER, OBJ1_PALETTE_REGISTER,
    SCANLINE_Y_COMPARE_REGISTER, SCANLINE_Y_REGISTER, SCROLL_X_REGISTER, SCROLL_Y_REGISTER, WINDOW_X_REGISTER,
    WINDOW_Y_REGISTER,
};
use log::{debug, trace};

// Last address shadowed by the boot ROM while it is mapped.
const BOOTROM_END: u16 = 0xff;

const VRAM_SIZE: usize = 0x2000;
const WRAM_SIZE: usize = 0x2000;
const OAM_SIZE: usize = 0xa0;
const HRAM_SIZE: usize = 0x7f;
const IO_SIZE: usize = 0x80;

// Register values the DMG boot ROM leaves in the sound block.
const POST_BOOT_AUDIO: [(u16, u8); 17] = [
    (0xff10, 0x80),
    (0xff11, 0xbf),
    (0xff12, 0xf3),
    (0xff14, 0xbf),
    (0xff16, 0x3f),
    (0xff19, 0xbf),
    (0xff1a, 0x7f),
    (0xff1b, 0xff),
    (0xff1c, 0x9f),
    (0xff1e, 0xbf),
    (0xff20, 0xff),
    (0xff23, 0xbf),
    (0xff24, 0x77),
    (0xff25, 0xf3),
    (0xff26, 0xf1),
    (0xff21, 0x00),
    (0xff22, 0x00),
];

/// The memory map. Every CPU and PPU access goes through here.
#[derive(Clone)]
pub struct Mmu {
    cartridge: Option<Cartridge>,
    bootrom: Option<Vec<u8>>,
    bootrom_mapped: bool,
    vram: Vec<u8>,
    wram: Vec<u8>,
    oam: Vec<u8>,
    hram: Vec<u8>,
    io: Vec<u8>,
    video: VideoRegisters,
    timer: Timer,
    interrupt_flags: InterruptFlags,
    interrupt_enable: u8,
    joypad_select: u8,
    serial_data: u8,
    serial_control: u8,
    serial_output: Vec<u8>,
    enforce_access_locks: bool,
}

impl Mmu {
    pub fn new() -> Mmu {
        Mmu {
            cartridge: None,
            bootrom: None,
            bootrom_mapped: false,
            vram: vec![0; VRAM_SIZE],
            wram: vec![0; WRAM_SIZE],
            oam: vec![0; OAM_SIZE],
            hram: vec![0; HRAM_SIZE],
            io: vec![0; IO_SIZE],
            video: VideoRegisters::default(),
            timer: Timer::new(),
            interrupt_flags: InterruptFlags::empty(),
            interrupt_enable: 0,
            joypad_select: 0x30,
            serial_data: 0,
            serial_control: 0,
            serial_output: Vec::new(),
            enforce_access_locks: true,
        }
    }

    /// Clears every region and puts the I/O registers into the state the boot ROM hands over,
    /// or into the raw power-on state when a boot ROM is going to run.
    pub fn reset(&mut self) {
        self.vram.fill(0);
        self.wram.fill(0);
        self.oam.fill(0);
        self.hram.fill(0);
        self.io.fill(0);
        self.video = VideoRegisters::default();
        self.interrupt_enable = 0;
        self.joypad_select = 0x30;
        self.serial_data = 0;
        self.serial_control = 0;
        self.serial_output.clear();

        if let Some(cartridge) = self.cartridge.as_mut() {
            cartridge.reset();
        }

        if self.bootrom.is_some() {
            self.bootrom_mapped = true;
            self.timer = Timer::new();
            self.interrupt_flags = InterruptFlags::empty();
            return;
        }

        self.bootrom_mapped = false;
        self.timer = Timer::post_boot();
        self.interrupt_flags = InterruptFlags::VBLANK;
        self.video.lcdc = LcdControl::from(0x91);
        self.video.bgp = 0xfc;
        self.video.obp0 = 0xff;
        self.video.obp1 = 0xff;
        self.video.refresh_coincidence();

        for (addr, data) in POST_BOOT_AUDIO {
            self.io[(addr & 0x7f) as usize] = data;
        }
    }

    pub fn insert_cartridge(&mut self, cartridge: Cartridge) {
        self.cartridge = Some(cartridge);
    }

    pub fn cartridge(&self) -> Option<&Cartridge> {
        self.cartridge.as_ref()
    }

    pub fn set_bootrom(&mut self, bootrom: Option<Vec<u8>>) {
        self.bootrom = bootrom;
    }

    pub fn set_access_locks(&mut self, enabled: bool) {
        self.enforce_access_locks = enabled;
    }

    pub fn read(&self, addr: u16) -> u8 {
        match addr {
            0x0000..=BOOTROM_END if self.is_bootrom_mapped() => self.read_bootrom(addr),
            0x0000..=0x7fff | EXTERNAL_RAM_START..=EXTERNAL_RAM_END => self.read_cartridge(addr),
            0x8000..=0x9fff if self.vram_accessible() => self.vram[(addr - 0x8000) as usize],
            0x8000..=0x9fff => OPEN_BUS,
            0xc000..=0xdfff => self.wram[(addr - 0xc000) as usize],
            // Echo RAM mirrors $c000-$ddff
            0xe000..=0xfdff => self.wram[(addr - 0xe000) as usize],
            0xfe00..=0xfe9f if self.oam_accessible() => self.oam[(addr - 0xfe00) as usize],
            0xfe00..=0xfeff => OPEN_BUS,
            0xff00..=0xff7f => self.read_io(addr),
            0xff80..=0xfffe => self.hram[(addr - 0xff80) as usize],
            INTERRUPT_ENABLE_REGISTER => self.interrupt_enable,
        }
    }

    pub fn write(&mut self, addr: u16, data: u8) {
        match addr {
            0x0000..=0x7fff | EXTERNAL_RAM_START..=EXTERNAL_RAM_END => {
                if let Some(cartridge) = self.cartridge.as_mut() {
                    cartridge.write(addr, data);
                }
            }
            0x8000..=0x9fff if self.vram_accessible() => self.vram[(addr - 0x8000) as usize] = data,
            0x8000..=0x9fff => trace!("Blocked VRAM write to {:04x}", addr),
            0xc000..=0xdfff => self.wram[(addr - 0xc000) as usize] = data,
            0xe000..=0xfdff => self.wram[(addr - 0xe000) as usize] = data,
            0xfe00..=0xfe9f if self.oam_accessible() => self.oam[(addr - 0xfe00) as usize] = data,
            0xfe00..=0xfeff => {}
            0xff00..=0xff7f => self.write_io(addr, data),
            0xff80..=0xfffe => self.hram[(addr - 0xff80) as usize] = data,
            INTERRUPT_ENABLE_REGISTER => self.interrupt_enable = data,
        }
    }

    pub fn read16(&self, addr: u16) -> u16 {
        let lo = self.read(addr) as u16;
        let hi = self.read(addr.wrapping_add(1)) as u16;
        (hi << 8) | lo
    }

    pub fn write16(&mut self, addr: u16, data: u16) {
        let [lo, hi] = data.to_le_bytes();
        self.write(addr, lo);
        self.write(addr.wrapping_add(1), hi);
    }

    fn read_bootrom(&self, addr: u16) -> u8 {
        self.bootrom
            .as_ref()
            .and_then(|bootrom| bootrom.get(addr as usize).copied())
            .unwrap_or(OPEN_BUS)
    }

    fn read_cartridge(&self, addr: u16) -> u8 {
        match self.cartridge.as_ref() {
            Some(cartridge) => cartridge.read(addr),
            None => OPEN_BUS,
        }
    }

    fn read_io(&self, addr: u16) -> u8 {
        match addr {
            // No buttons are ever pressed.
            JOYPAD_REGISTER => 0b1100_0000 | self.joypad_select | 0x0f,
            SERIAL_DATA_REGISTER => self.serial_data,
            SERIAL_CONTROL_REGISTER => self.serial_control | 0b0111_1110,
            DIV_REGISTER..=TAC_REGISTER => self.timer.read(addr),
            INTERRUPT_FLAGS_REGISTER => self.interrupt_flags.bits() | 0b1110_0000,
            0xff10..=0xff26 | 0xff30..=0xff3f => self.io[(addr & 0x7f) as usize],
            LCD_CONTROL_REGISTER => self.video.lcdc.bits(),
            LCD_STATUS_REGISTER => self.video.stat.bits() | 0b1000_0000,
            SCROLL_Y_REGISTER => self.video.scy,
            SCROLL_X_REGISTER => self.video.scx,
            SCANLINE_Y_REGISTER => self.video.ly,
            SCANLINE_Y_COMPARE_REGISTER => self.video.lyc,
            OAM_DMA_REGISTER => self.io[(addr & 0x7f) as usize],
            BG_PALETTE_REGISTER => self.video.bgp,
            OBJ0_PALETTE_REGISTER => self.video.obp0,
            OBJ1_PALETTE_REGISTER => self.video.obp1,
            WINDOW_Y_REGISTER => self.video.wy,
            WINDOW_X_REGISTER => self.video.wx,
            _ => OPEN_BUS,
        }
    }

    fn write_io(&mut self, addr: u16, data: u8) {
        match addr {
            JOYPAD_REGISTER => self.joypad_select = data & 0b0011_0000,
            SERIAL_DATA_REGISTER => self.serial_data = data,
            SERIAL_CONTROL_REGISTER => {
                self.serial_control = data & 0b1000_0001;
                if data & 0b1000_0001 == 0b1000_0001 {
                    self.complete_serial_transfer();
                }
            }
            DIV_REGISTER..=TAC_REGISTER => self.timer.write(addr, data),
            INTERRUPT_FLAGS_REGISTER => self.interrupt_flags = InterruptFlags::from(data),
            0xff10..=0xff26 | 0xff30..=0xff3f => self.io[(addr & 0x7f) as usize] = data,
            LCD_CONTROL_REGISTER => {
                let was_enabled = self.video.lcd_enabled();
                self.video.lcdc = LcdControl::from(data);
                if was_enabled && !self.video.lcd_enabled() {
                    debug!("LCD switched off");
                    self.video.ly = 0;
                    self.video.set_mode_bits(Mode::HBlank.as_u8());
                    self.video.refresh_coincidence();
                }
            }
            LCD_STATUS_REGISTER => {
                let writable = LcdStatus::HBLANK_IRQ
                    | LcdStatus::VBLANK_IRQ
                    | LcdStatus::OAM_IRQ
                    | LcdStatus::COINCIDENCE_IRQ;
                self.video.stat = (self.video.stat - writable) | (LcdStatus::from(data) & writable);
            }
            SCROLL_Y_REGISTER => self.video.scy = data,
            SCROLL_X_REGISTER => self.video.scx = data,
            SCANLINE_Y_REGISTER => trace!("Ignoring write to read-only LY register"),
            SCANLINE_Y_COMPARE_REGISTER => {
                self.video.lyc = data;
                self.video.refresh_coincidence();
            }
            OAM_DMA_REGISTER => {
                self.io[(addr & 0x7f) as usize] = data;
                self.run_oam_dma(data);
            }
            BG_PALETTE_REGISTER => self.video.bgp = data,
            OBJ0_PALETTE_REGISTER => self.video.obp0 = data,
            OBJ1_PALETTE_REGISTER => self.video.obp1 = data,
            WINDOW_Y_REGISTER => self.video.wy = data,
            WINDOW_X_REGISTER => self.video.wx = data,
            BOOTROM_MAPPER_REGISTER => {
                if data != 0 && self.bootrom_mapped {
                    debug!("Boot ROM unmapped");
                    self.bootrom_mapped = false;
                }
            }
            _ => trace!("Ignoring write of {:02x} to unmapped I/O register {:04x}", data, addr),
        }
    }

    /// OAM DMA is modelled as an instantaneous copy.
    fn run_oam_dma(&mut self, source: u8) {
        let base = (source as u16) << 8;
        let mut buffer = [0u8; OAM_SIZE];
        for (offset, byte) in buffer.iter_mut().enumerate() {
            *byte = self.read_unlocked(base.wrapping_add(offset as u16));
        }
        self.oam.copy_from_slice(&buffer);
        trace!("OAM DMA from {:04x}", base);
    }

    fn read_unlocked(&self, addr: u16) -> u8 {
        match addr {
            0x8000..=0x9fff => self.vram[(addr - 0x8000) as usize],
            0xfe00..=0xfe9f => self.oam[(addr - 0xfe00) as usize],
            _ => self.read(addr),
        }
    }

    fn complete_serial_transfer(&mut self) {
        // There is never a link partner, so the transfer finishes immediately and shifts in $ff.
        debug!("Serial: {:02x} ({:?})", self.serial_data, self.serial_data as char);
        self.serial_output.push(self.serial_data);
        self.serial_data = 0xff;
        self.serial_control &= 0b0111_1111;
        self.request_interrupt(InterruptFlags::SERIAL);
    }

    pub fn serial_output(&self) -> &[u8] {
        &self.serial_output
    }

    pub fn is_bootrom_mapped(&self) -> bool {
        self.bootrom_mapped
    }

    fn vram_accessible(&self) -> bool {
        !self.enforce_access_locks || !self.video.lcd_enabled() || self.video.mode_bits() != Mode::Drawing.as_u8()
    }

    fn oam_accessible(&self) -> bool {
        let mode = self.video.mode_bits();
        !self.enforce_access_locks
            || !self.video.lcd_enabled()
            || (mode != Mode::Drawing.as_u8() && mode != Mode::OamScan.as_u8())
    }

    /// PPU-side VRAM access, never subject to the CPU access locks.
    #[inline]
    pub fn read_vram(&self, addr: u16) -> u8 {
        self.vram[(addr as usize).wrapping_sub(0x8000) % VRAM_SIZE]
    }

    /// PPU-side OAM access, never subject to the CPU access locks.
    #[inline]
    pub fn read_oam(&self, addr: u16) -> u8 {
        self.oam[(addr as usize).wrapping_sub(0xfe00) % OAM_SIZE]
    }

    pub fn video(&self) -> &VideoRegisters {
        &self.video
    }

    pub fn video_mut(&mut self) -> &mut VideoRegisters {
        &mut self.video
    }

    /// Advances the timer and raises its interrupt on overflow.
    pub fn tick(&mut self, cycles: usize) {
        if self.timer.tick(cycles) {
            self.request_interrupt(InterruptFlags::TIMER);
        }
    }

    pub fn reset_divider(&mut self) {
        self.timer.reset_divider();
    }

    pub fn request_interrupt(&mut self, flags: InterruptFlags) {
        self.interrupt_flags |= flags;
    }

    pub fn clear_interrupt(&mut self, flags: InterruptFlags) {
        self.interrupt_flags -= flags;
    }

    /// Interrupts that are both requested and enabled.
    pub fn pending_interrupts(&self) -> InterruptFlags {
        self.interrupt_flags & InterruptFlags::from(self.interrupt_enable)
    }

    #[cfg(test)]
    pub fn disable_access_locks(&mut self) {
        self.enforce_access_locks = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unmapped_regions_read_sentinel() {
        let mut mmu = Mmu::new();
        assert_eq!(mmu.read(0x0100), OPEN_BUS);
        assert_eq!(mmu.read(0xa000), OPEN_BUS);
        assert_eq!(mmu.read(0xfea0), OPEN_BUS);
        assert_eq!(mmu.read(0xff4c), OPEN_BUS);

        mmu.write(0x2000, 0x05);
        mmu.write(0xfea0, 0x12);
        assert_eq!(mmu.read(0xfea0), OPEN_BUS);
    }

    #[test]
    fn echo_ram_mirrors_work_ram() {
        let mut mmu = Mmu::new();
        mmu.write(0xc123, 0xab);
        assert_eq!(mmu.read(0xe123), 0xab);

        mmu.write(0xfdff, 0xcd);
        assert_eq!(mmu.read(0xddff), 0xcd);
    }

    #[test]
    fn post_boot_io_state() {
        let mut mmu = Mmu::new();
        mmu.reset();
        assert_eq!(mmu.read(LCD_CONTROL_REGISTER), 0x91);
        assert_eq!(mmu.read(BG_PALETTE_REGISTER), 0xfc);
        assert_eq!(mmu.read(DIV_REGISTER), 0xab);
        assert_eq!(mmu.read(INTERRUPT_FLAGS_REGISTER), 0xe1);
        assert_eq!(mmu.read(0xff26), 0xf1);
        assert_eq!(mmu.read(JOYPAD_REGISTER), 0xff);
    }

    #[test]
    fn vram_is_locked_during_pixel_transfer() {
        let mut mmu = Mmu::new();
        mmu.reset();
        mmu.write(0x8000, 0x11);
        mmu.video_mut().set_mode_bits(Mode::Drawing.as_u8());

        assert_eq!(mmu.read(0x8000), OPEN_BUS);
        mmu.write(0x8000, 0x22);
        assert_eq!(mmu.read_vram(0x8000), 0x11);

        mmu.disable_access_locks();
        assert_eq!(mmu.read(0x8000), 0x11);
    }

    #[test]
    fn stat_write_keeps_read_only_bits() {
        let mut mmu = Mmu::new();
        mmu.reset();
        mmu.video_mut().set_mode_bits(Mode::VBlank.as_u8());
        mmu.write(LCD_STATUS_REGISTER, 0xff);
        // LY == LYC after reset, so the coincidence bit stays set.
        assert_eq!(mmu.read(LCD_STATUS_REGISTER), 0b1111_1101);

        mmu.write(LCD_STATUS_REGISTER, 0x00);
        assert_eq!(mmu.read(LCD_STATUS_REGISTER), 0b1000_0101);
    }

    #[test]
    fn lcd_off_resets_scanline() {
        let mut mmu = Mmu::new();
        mmu.reset();
        mmu.video_mut().ly = 0x42;
        mmu.write(LCD_CONTROL_REGISTER, 0x11);
        assert_eq!(mmu.read(SCANLINE_Y_REGISTER), 0);

        mmu.write(SCANLINE_Y_REGISTER, 0x10);
        assert_eq!(mmu.read(SCANLINE_Y_REGISTER), 0);
    }

    #[test]
    fn oam_dma_copies_160_bytes() {
        let mut mmu = Mmu::new();
        for i in 0..0xa0u16 {
            mmu.write(0xc100 + i, i as u8);
        }
        mmu.write(OAM_DMA_REGISTER, 0xc1);
        assert_eq!(mmu.read(0xfe00), 0x00);
        assert_eq!(mmu.read(0xfe9f), 0x9f);
    }

    #[test]
    fn serial_transfer_is_captured() {
        let mut mmu = Mmu::new();
        mmu.write(SERIAL_DATA_REGISTER, b'O');
        mmu.write(SERIAL_CONTROL_REGISTER, 0x81);
        mmu.write(SERIAL_DATA_REGISTER, b'K');
        mmu.write(SERIAL_CONTROL_REGISTER, 0x81);

        assert_eq!(mmu.serial_output(), b"OK");
        // Transfer flag cleared, internal clock select kept.
        assert_eq!(mmu.read(SERIAL_CONTROL_REGISTER), 0x7f);
        assert!(InterruptFlags::from(mmu.read(INTERRUPT_FLAGS_REGISTER)).contains(InterruptFlags::SERIAL));
    }

    #[test]
    fn pending_interrupts_respect_enable_mask() {
        let mut mmu = Mmu::new();
        mmu.request_interrupt(InterruptFlags::TIMER | InterruptFlags::VBLANK);
        assert!(mmu.pending_interrupts().is_empty());

        mmu.write(INTERRUPT_ENABLE_REGISTER, 0b0000_0100);
        assert_eq!(mmu.pending_interrupts(), InterruptFlags::TIMER);
    }
}
