use crate::memory::mapper::{ram_offset, rom_offset, wrap_bank, BankLayout};
use log::trace;

/// Cartridges without banking hardware: 32 KiB of ROM and at most one RAM bank.
#[derive(Debug, Clone)]
pub struct Rom {
    pub(super) layout: BankLayout,
}

impl Rom {
    pub fn new(layout: BankLayout) -> Rom {
        Rom { layout }
    }

    #[inline]
    pub fn map_rom(&self, addr: u16) -> (usize, usize) {
        let bank = if addr < 0x4000 { 0 } else { 1 };
        (wrap_bank(bank, self.layout.rom_banks), rom_offset(addr))
    }

    #[inline]
    pub fn map_ram(&self, addr: u16) -> Option<(usize, usize)> {
        if self.layout.ram_banks == 0 {
            return None;
        }

        Some((0, ram_offset(addr)))
    }

    #[inline]
    pub fn write_control(&mut self, addr: u16, data: u8) {
        // We simply only have a ROM, there are no registers to latch into.
        trace!("ROM: Ignoring write of {:02x} to {:04x}", data, addr);
    }
}
