/// The four PPU modes, numbered the way STAT reports them.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Mode {
    HBlank,  // H-Blank
    VBlank,  // V-Blank
    OamScan, // OAM Scan
    Drawing, // Drawing
}

impl Mode {
    pub fn as_u8(self) -> u8 {
        match self {
            Mode::HBlank => 0,
            Mode::VBlank => 1,
            Mode::OamScan => 2,
            Mode::Drawing => 3,
        }
    }

    /// Length of the mode in dots. V-Blank is counted per scanline.
    pub fn duration(self) -> usize {
        match self {
            Mode::OamScan => 80,
            Mode::Drawing => 172,
            Mode::HBlank => 204,
            Mode::VBlank => 456,
        }
    }
}
