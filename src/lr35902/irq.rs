use crate::memory::registers::InterruptFlags;

#[derive(Debug, Clone, Default)]
pub struct Ime {
    pub enabled: bool,
    pub enable_pending: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vector {
    VBlank,
    Stat,
    Timer,
    Serial,
    Joypad,
}

impl Vector {
    /// Picks the highest priority interrupt among `flags`.
    pub fn from_flags(flags: InterruptFlags) -> Option<Vector> {
        if flags.contains(InterruptFlags::VBLANK) {
            Some(Vector::VBlank)
        } else if flags.contains(InterruptFlags::LCD_STAT) {
            Some(Vector::Stat)
        } else if flags.contains(InterruptFlags::TIMER) {
            Some(Vector::Timer)
        } else if flags.contains(InterruptFlags::SERIAL) {
            Some(Vector::Serial)
        } else if flags.contains(InterruptFlags::JOYPAD) {
            Some(Vector::Joypad)
        } else {
            None
        }
    }

    pub fn to_address(self) -> u16 {
        match self {
            Vector::VBlank => 0x0040,
            Vector::Stat => 0x0048,
            Vector::Timer => 0x0050,
            Vector::Serial => 0x0058,
            Vector::Joypad => 0x0060,
        }
    }

    pub fn flag(self) -> InterruptFlags {
        match self {
            Vector::VBlank => InterruptFlags::VBLANK,
            Vector::Stat => InterruptFlags::LCD_STAT,
            Vector::Timer => InterruptFlags::TIMER,
            Vector::Serial => InterruptFlags::SERIAL,
            Vector::Joypad => InterruptFlags::JOYPAD,
        }
    }
}

impl std::fmt::Display for Vector {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Vector::VBlank => write!(f, "VBLANK"),
            Vector::Stat => write!(f, "STAT"),
            Vector::Timer => write!(f, "TIMER"),
            Vector::Serial => write!(f, "SERIAL"),
            Vector::Joypad => write!(f, "JOYPAD"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_follows_bit_order() {
        let flags = InterruptFlags::JOYPAD | InterruptFlags::TIMER | InterruptFlags::LCD_STAT;
        assert_eq!(Vector::from_flags(flags), Some(Vector::Stat));
        assert_eq!(Vector::from_flags(InterruptFlags::JOYPAD).map(Vector::to_address), Some(0x60));
        assert_eq!(Vector::from_flags(InterruptFlags::empty()), None);
    }
}
