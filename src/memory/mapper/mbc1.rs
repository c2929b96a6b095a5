use crate::memory::mapper::{ram_offset, rom_offset, wrap_bank, BankLayout};
use log::debug;

const RAM_ENABLE_RANGE: std::ops::RangeInclusive<u16> = 0x0000..=0x1fff;
const ROM_BANK_RANGE: std::ops::RangeInclusive<u16> = 0x2000..=0x3fff;
const SECONDARY_BANK_REGISTER: std::ops::RangeInclusive<u16> = 0x4000..=0x5fff;
const BANKING_MODE_REGISTER: std::ops::RangeInclusive<u16> = 0x6000..=0x7fff;
const ROM_SLOT_0_RANGE: std::ops::RangeInclusive<u16> = 0x0000..=0x3fff;

#[derive(Debug, Clone)]
pub struct Mbc1 {
    pub(super) layout: BankLayout,
    rom_bank: u8,
    secondary_bank: u8,
    ram_enabled: bool,
    banking_mode: bool,
}

impl Mbc1 {
    pub fn new(layout: BankLayout) -> Mbc1 {
        Mbc1 {
            layout,
            rom_bank: 1,
            secondary_bank: 0,
            ram_enabled: false,
            banking_mode: false,
        }
    }

    #[inline]
    pub fn map_rom(&self, addr: u16) -> (usize, usize) {
        let bank = if ROM_SLOT_0_RANGE.contains(&addr) {
            // In advanced banking mode the secondary register also drives the fixed slot.
            if self.banking_mode {
                (self.secondary_bank as usize) << 5
            } else {
                0
            }
        } else {
            ((self.secondary_bank as usize) << 5) | self.rom_bank as usize
        };

        (wrap_bank(bank, self.layout.rom_banks), rom_offset(addr))
    }

    #[inline]
    pub fn map_ram(&self, addr: u16) -> Option<(usize, usize)> {
        if !self.ram_enabled || self.layout.ram_banks == 0 {
            return None;
        }

        let bank = if self.banking_mode { self.secondary_bank as usize } else { 0 };
        Some((wrap_bank(bank, self.layout.ram_banks), ram_offset(addr)))
    }

    pub fn write_control(&mut self, addr: u16, data: u8) {
        match addr {
            addr if RAM_ENABLE_RANGE.contains(&addr) => {
                self.ram_enabled = (data & 0x0f) == 0x0a;
                debug!("MBC1: RAM enabled: {}", self.ram_enabled);
            }
            addr if ROM_BANK_RANGE.contains(&addr) => {
                // Only 5 bits are wired up, and the zero check happens on those 5 bits alone.
                self.rom_bank = data & 0b0001_1111;
                if self.rom_bank == 0 {
                    self.rom_bank = 1;
                }
                debug!("MBC1: Switched to ROM bank {}", self.map_rom(0x4000).0);
            }
            addr if SECONDARY_BANK_REGISTER.contains(&addr) => {
                self.secondary_bank = data & 0b11;
                debug!("MBC1: Secondary bank register set to {}", self.secondary_bank);
            }
            addr if BANKING_MODE_REGISTER.contains(&addr) => {
                self.banking_mode = data & 0b0000_0001 == 1;
                debug!("MBC1: Switched to banking mode: {}", self.banking_mode);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mbc(rom_banks: usize, ram_banks: usize) -> Mbc1 {
        Mbc1::new(BankLayout { rom_banks, ram_banks })
    }

    #[test]
    fn zero_bank_select_maps_to_bank_one() {
        let mut mbc = mbc(8, 0);
        mbc.write_control(0x2000, 0x00);
        assert_eq!(mbc.map_rom(0x4000), (1, 0));

        mbc.write_control(0x2000, 0xe1);
        assert_eq!(mbc.map_rom(0x4123), (1, 0x0123));
    }

    #[test]
    fn bank_select_wraps_to_physical_bank_count() {
        let mut mbc = mbc(4, 0);
        mbc.write_control(0x2100, 6);
        assert_eq!(mbc.map_rom(0x4000).0, 6 % 4);

        mbc.write_control(0x3fff, 0x1f);
        assert_eq!(mbc.map_rom(0x7fff), (31 % 4, 0x3fff));
    }

    #[test]
    fn secondary_register_extends_rom_bank() {
        let mut mbc = mbc(128, 4);
        mbc.write_control(0x2000, 0x02);
        mbc.write_control(0x4000, 0x01);
        assert_eq!(mbc.map_rom(0x4000).0, 0x22);
        assert_eq!(mbc.map_rom(0x0000).0, 0);

        mbc.write_control(0x6000, 0x01);
        assert_eq!(mbc.map_rom(0x0000).0, 0x20);
    }

    #[test]
    fn ram_requires_enable_and_mode_for_banking() {
        let mut mbc = mbc(4, 4);
        assert_eq!(mbc.map_ram(0xa000), None);

        mbc.write_control(0x0000, 0x0a);
        mbc.write_control(0x4000, 0x02);
        assert_eq!(mbc.map_ram(0xa010), Some((0, 0x10)));

        mbc.write_control(0x6000, 0x01);
        assert_eq!(mbc.map_ram(0xbfff), Some((2, 0x1fff)));

        mbc.write_control(0x0000, 0x00);
        assert_eq!(mbc.map_ram(0xa000), None);
    }
}
