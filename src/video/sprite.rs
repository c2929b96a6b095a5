use crate::memory::mmu::Mmu;
use crate::video::OAM_ADDRESS;
use bitflags::bitflags;

pub const SPRITE_COUNT: u16 = 40;
pub const SPRITES_PER_LINE: usize = 10;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SpriteAttributes: u8 {
        const PALETTE  = 0b0001_0000;
        const FLIP_X   = 0b0010_0000;
        const FLIP_Y   = 0b0100_0000;
        const PRIORITY = 0b1000_0000;
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Sprite {
    pub x: u8,
    pub y: u8,
    pub tile_index: u8,
    pub attributes: SpriteAttributes,
    pub oam_index: u8,
}

impl Sprite {
    pub fn from_oam(mmu: &Mmu, index: u16) -> Self {
        let sprite_addr = OAM_ADDRESS + (index * 4);

        Sprite {
            y: mmu.read_oam(sprite_addr),
            x: mmu.read_oam(sprite_addr + 1),
            tile_index: mmu.read_oam(sprite_addr + 2),
            attributes: SpriteAttributes::from_bits_truncate(mmu.read_oam(sprite_addr + 3)),
            oam_index: index as u8,
        }
    }

    pub fn is_visible_on_scanline(&self, scanline: u8, height: u8) -> bool {
        // Y is stored with a 16 pixel offset so sprites can scroll in from the top.
        let top = self.y as i16 - 16;
        let line = scanline as i16;
        line >= top && line < top + height as i16
    }

    /// Row inside the sprite's tile data for `scanline`, with Y flip applied.
    pub fn row(&self, scanline: u8, height: u8) -> u8 {
        let row = (scanline as i16 - (self.y as i16 - 16)) as u8;
        if self.attributes.contains(SpriteAttributes::FLIP_Y) {
            height - 1 - row
        } else {
            row
        }
    }

    /// Column inside the sprite for screen `x`, or `None` when `x` is not covered.
    pub fn column(&self, x: u8) -> Option<u8> {
        let column = x as i16 - (self.x as i16 - 8);
        if !(0..8).contains(&column) {
            return None;
        }

        let column = column as u8;
        if self.attributes.contains(SpriteAttributes::FLIP_X) {
            Some(7 - column)
        } else {
            Some(column)
        }
    }
}
