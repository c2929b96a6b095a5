use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct InterruptFlags: u8 {
        const VBLANK    = 0b00001;
        const LCD_STAT  = 0b00010;
        const TIMER     = 0b00100;
        const SERIAL    = 0b01000;
        const JOYPAD    = 0b10000;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct LcdControl: u8 {
        const BG_DISPLAY = 0b0000_0001;
        const OBJ_DISPLAY = 0b0000_0010;
        const OBJ_SIZE = 0b0000_0100;
        const BG_TILE_MAP = 0b0000_1000;
        const BG_TILE_DATA = 0b0001_0000;
        const WINDOW_DISPLAY = 0b0010_0000;
        const WINDOW_TILE_MAP = 0b0100_0000;
        const LCD_DISPLAY = 0b1000_0000;
    }
}

bitflags! {
    /// Interrupt sources and status bits of the STAT register. The mode lives in bits 0-1.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct LcdStatus: u8 {
        const MODE            = 0b0000_0011;
        const COINCIDENCE     = 0b0000_0100;
        const HBLANK_IRQ      = 0b0000_1000;
        const VBLANK_IRQ      = 0b0001_0000;
        const OAM_IRQ         = 0b0010_0000;
        const COINCIDENCE_IRQ = 0b0100_0000;
    }
}

impl From<u8> for InterruptFlags {
    fn from(byte: u8) -> Self {
        Self::from_bits_truncate(byte)
    }
}

impl From<u8> for LcdControl {
    fn from(byte: u8) -> Self {
        Self::from_bits_truncate(byte)
    }
}

impl From<u8> for LcdStatus {
    fn from(byte: u8) -> Self {
        Self::from_bits_truncate(byte)
    }
}

/// The PPU-facing I/O registers ($ff40-$ff4b, without DMA).
#[derive(Debug, Clone, Copy)]
pub struct VideoRegisters {
    pub lcdc: LcdControl,
    pub stat: LcdStatus,
    pub scy: u8,
    pub scx: u8,
    pub ly: u8,
    pub lyc: u8,
    pub bgp: u8,
    pub obp0: u8,
    pub obp1: u8,
    pub wy: u8,
    pub wx: u8,
}

impl VideoRegisters {
    pub fn lcd_enabled(&self) -> bool {
        self.lcdc.contains(LcdControl::LCD_DISPLAY)
    }

    pub fn mode_bits(&self) -> u8 {
        (self.stat & LcdStatus::MODE).bits()
    }

    pub fn set_mode_bits(&mut self, mode: u8) {
        self.stat = (self.stat - LcdStatus::MODE) | LcdStatus::from_bits_truncate(mode & 0b11);
    }

    pub fn refresh_coincidence(&mut self) {
        self.stat.set(LcdStatus::COINCIDENCE, self.ly == self.lyc);
    }
}

impl Default for VideoRegisters {
    fn default() -> VideoRegisters {
        VideoRegisters {
            lcdc: LcdControl::empty(),
            stat: LcdStatus::empty(),
            scy: 0,
            scx: 0,
            ly: 0,
            lyc: 0,
            bgp: 0,
            obp0: 0,
            obp1: 0,
            wy: 0,
            wx: 0,
        }
    }
}
