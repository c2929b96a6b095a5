use crate::memory::mapper::{ram_offset, rom_offset, wrap_bank, BankLayout};
use log::debug;

#[derive(Debug, Clone)]
pub struct Mbc5 {
    pub(super) layout: BankLayout,
    rom_bank: u16,
    ram_bank: u8,
    ram_enabled: bool,
    rumble: bool,
}

impl Mbc5 {
    pub fn new(layout: BankLayout, rumble: bool) -> Mbc5 {
        Mbc5 {
            layout,
            rom_bank: 1,
            ram_bank: 0,
            ram_enabled: false,
            rumble,
        }
    }

    pub fn has_rumble(&self) -> bool {
        self.rumble
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
        if !self.ram_enabled || self.layout.ram_banks == 0 {
            return None;
        }

        Some((wrap_bank(self.ram_bank as usize, self.layout.ram_banks), ram_offset(addr)))
    }

    pub fn write_control(&mut self, addr: u16, data: u8) {
        match addr {
            0x0000..=0x1fff => {
                self.ram_enabled = data & 0x0f == 0x0a;
                debug!("MBC5: RAM enabled: {}", self.ram_enabled);
            }
            0x2000..=0x2fff => {
                self.rom_bank = (self.rom_bank & 0x100) | data as u16;
                debug!("MBC5: Switched to ROM bank {}", self.rom_bank);
            }
            0x3000..=0x3fff => {
                self.rom_bank = (self.rom_bank & 0xff) | ((data as u16 & 0x1) << 8);
                debug!("MBC5: Switched to ROM bank {}", self.rom_bank);
            }
            0x4000..=0x5fff => {
                // Bit 3 drives the rumble motor on rumble carts instead of selecting RAM.
                self.ram_bank = if self.rumble { data & 0x07 } else { data & 0x0f };
                debug!("MBC5: Switched to RAM bank {}", self.ram_bank);
            }
            _ => {}
        }
    }
}
