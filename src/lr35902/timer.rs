use crate::memory::{DIV_REGISTER, OPEN_BUS, TAC_REGISTER, TIMA_REGISTER, TMA_REGISTER};

const TIMER_ENABLE: u8 = 0b100;

/// DIV/TIMA/TMA/TAC. Lives behind the bus; `tick` reports TIMA overflows so the
/// caller can raise the timer interrupt.
#[derive(Debug, Clone)]
pub struct Timer {
    divider: u16,
    tima: u8,
    tma: u8,
    tac: u8,
    cycles: usize,
}

impl Timer {
    pub fn new() -> Timer {
        Timer {
            divider: 0,
            tima: 0,
            tma: 0,
            tac: 0,
            cycles: 0,
        }
    }

    /// Internal divider value the boot ROM leaves behind.
    pub fn post_boot() -> Timer {
        Timer {
            divider: 0xabcc,
            ..Timer::new()
        }
    }

    pub fn tick(&mut self, cycles: usize) -> bool {
        self.divider = self.divider.wrapping_add(cycles as u16);

        if self.tac & TIMER_ENABLE == 0 {
            return false;
        }

        self.cycles += cycles;

        let period: usize = match self.tac & 0b11 {
            0b00 => 1024,
            0b01 => 16,
            0b10 => 64,
            _ => 256,
        };

        let mut overflow = false;
        while self.cycles >= period {
            if self.tima == 0xff {
                self.tima = self.tma;
                overflow = true;
            } else {
                self.tima += 1;
            }

            self.cycles -= period;
        }

        overflow
    }

    pub fn reset_divider(&mut self) {
        self.divider = 0;
        self.cycles = 0;
    }

    pub fn read(&self, addr: u16) -> u8 {
        match addr {
            DIV_REGISTER => (self.divider >> 8) as u8,
            TIMA_REGISTER => self.tima,
            TMA_REGISTER => self.tma,
            TAC_REGISTER => self.tac | 0b1111_1000,
            _ => OPEN_BUS,
        }
    }

    pub fn write(&mut self, addr: u16, data: u8) {
        match addr {
            DIV_REGISTER => self.reset_divider(),
            TIMA_REGISTER => self.tima = data,
            TMA_REGISTER => self.tma = data,
            TAC_REGISTER => {
                if (data ^ self.tac) & 0b11 != 0 {
                    self.cycles = 0;
                }
                self.tac = data & 0b111;
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn divider_counts_every_256_cycles() {
        let mut timer = Timer::new();
        timer.tick(255);
        assert_eq!(timer.read(DIV_REGISTER), 0);
        timer.tick(1);
        assert_eq!(timer.read(DIV_REGISTER), 1);

        timer.write(DIV_REGISTER, 0x55);
        assert_eq!(timer.read(DIV_REGISTER), 0);
    }

    #[test]
    fn tima_overflow_reloads_from_tma() {
        let mut timer = Timer::new();
        timer.write(TMA_REGISTER, 0x10);
        timer.write(TIMA_REGISTER, 0xfe);
        timer.write(TAC_REGISTER, 0b101);

        assert!(!timer.tick(16));
        assert_eq!(timer.read(TIMA_REGISTER), 0xff);
        assert!(timer.tick(16));
        assert_eq!(timer.read(TIMA_REGISTER), 0x10);
    }

    #[test]
    fn stopped_timer_does_not_count() {
        let mut timer = Timer::new();
        timer.write(TAC_REGISTER, 0b001);
        assert!(!timer.tick(4096));
        assert_eq!(timer.read(TIMA_REGISTER), 0);
        assert_eq!(timer.read(TAC_REGISTER), 0xf9);
    }
}
