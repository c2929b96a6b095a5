use crate::memory::mmu::Mmu;

/// One 8 pixel row of a tile, decoded from its two bitplanes.
#[derive(Debug, Clone, Copy)]
pub struct TileRow {
    lsb: u8,
    msb: u8,
}

impl TileRow {
    /// `address` is the first byte of the tile, `row` is 0-15 so 8x16 sprites can span two tiles.
    pub fn fetch(mmu: &Mmu, address: u16, row: u8) -> TileRow {
        let addr = address.wrapping_add(row as u16 * 2);

        TileRow {
            lsb: mmu.read_vram(addr),
            msb: mmu.read_vram(addr.wrapping_add(1)),
        }
    }

    /// Colour index of pixel `x`, leftmost first.
    #[inline]
    pub fn color(&self, x: u8) -> u8 {
        let shift = 7 - (x & 0b111);
        let lsb_bit = (self.lsb >> shift) & 0b0000_0001;
        let msb_bit = (self.msb >> shift) & 0b0000_0001;
        (msb_bit << 1) | lsb_bit
    }
}
