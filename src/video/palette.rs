pub type Color = [u8; 4];

/// Default RGBA shades, lightest first.
pub const DEFAULT_SHADES: [Color; 4] = [
    [0xff, 0xff, 0xff, 0xff],
    [0xc0, 0xc0, 0xc0, 0xff],
    [0x60, 0x60, 0x60, 0xff],
    [0x00, 0x00, 0x00, 0xff],
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Palette {
    #[default]
    White,
    LightGray,
    DarkGray,
    Black,
}

impl Palette {
    /// Maps a 2-bit colour index through one of BGP/OBP0/OBP1.
    pub fn from_register(color: u8, register: u8) -> Palette {
        let shade = (register >> ((color & 0b11) * 2)) & 0b11;

        match shade {
            0b00 => Palette::White,
            0b01 => Palette::LightGray,
            0b10 => Palette::DarkGray,
            _ => Palette::Black,
        }
    }

    pub fn to_rgba(self, shades: &[Color; 4]) -> Color {
        match self {
            Palette::White => shades[0],
            Palette::LightGray => shades[1],
            Palette::DarkGray => shades[2],
            Palette::Black => shades[3],
        }
    }
}
