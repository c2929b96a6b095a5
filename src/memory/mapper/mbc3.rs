use crate::memory::mapper::{ram_offset, rom_offset, wrap_bank, BankLayout};
use log::{debug, trace};

#[derive(Debug, Clone)]
pub struct Mbc3 {
    pub(super) layout: BankLayout,
    rom_bank: u8,
    ram_bank: u8,
    ram_enabled: bool,
}

impl Mbc3 {
    pub fn new(layout: BankLayout) -> Mbc3 {
        Mbc3 {
            layout,
            rom_bank: 1,
            ram_bank: 0,
            ram_enabled: false,
        }
    }

    #[inline]
    pub fn map_rom(&self, addr: u16) -> (usize, usize) {
        let bank = match addr {
            0x0000..=0x3fff => 0,
            _ => self.rom_bank as usize,
        };

        (wrap_bank(bank, self.layout.rom_banks), rom_offset(addr))
    }

    #[inline]
    pub fn map_ram(&self, addr: u16) -> Option<(usize, usize)> {
        // $08-$0c select the RTC registers, which are not wired up.
        if !self.ram_enabled || self.layout.ram_banks == 0 || self.ram_bank > 0x03 {
            return None;
        }

        Some((wrap_bank(self.ram_bank as usize, self.layout.ram_banks), ram_offset(addr)))
    }

    pub fn write_control(&mut self, addr: u16, data: u8) {
        match addr {
            0x0000..=0x1fff => {
                self.ram_enabled = data & 0x0f == 0x0a;
                debug!("MBC3: RAM enabled: {}", self.ram_enabled);
            }
            0x2000..=0x3fff => {
                self.rom_bank = data & 0b0111_1111;
                if self.rom_bank == 0 {
                    self.rom_bank = 1;
                }
                debug!("MBC3: Switched to ROM bank {}", self.rom_bank);
            }
            0x4000..=0x5fff => {
                self.ram_bank = data & 0x0f;
                debug!("MBC3: Switched to RAM bank {}", self.ram_bank);
            }
            0x6000..=0x7fff => trace!("MBC3: Ignoring RTC latch write {:02x}", data),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seven_bit_bank_wraps() {
        let mut mbc = Mbc3::new(BankLayout { rom_banks: 64, ram_banks: 4 });
        mbc.write_control(0x2000, 0x7f);
        assert_eq!(mbc.map_rom(0x4000).0, 0x7f % 64);

        mbc.write_control(0x2000, 0x80);
        assert_eq!(mbc.map_rom(0x4000).0, 1);
    }

    #[test]
    fn rtc_registers_are_unmapped() {
        let mut mbc = Mbc3::new(BankLayout { rom_banks: 8, ram_banks: 4 });
        mbc.write_control(0x0000, 0x0a);
        mbc.write_control(0x4000, 0x03);
        assert_eq!(mbc.map_ram(0xa001), Some((3, 1)));

        mbc.write_control(0x4000, 0x08);
        assert_eq!(mbc.map_ram(0xa001), None);
    }
}
