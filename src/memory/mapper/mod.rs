use crate::memory::mapper::mbc1::Mbc1;
use crate::memory::mapper::mbc3::Mbc3;
use crate::memory::mapper::mbc5::Mbc5;
use crate::memory::mapper::rom::Rom;
use crate::memory::{RAM_BANK_SIZE, ROM_BANK_SIZE};

pub mod mbc1;
pub mod mbc3;
pub mod mbc5;
pub mod rom;

/// Banking hardware family as encoded in the cartridge header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapperKind {
    None,
    Mbc1,
    Mbc3,
    Mbc5,
}

/// Physical layout the mapper wraps its bank registers against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BankLayout {
    pub rom_banks: usize,
    pub ram_banks: usize,
}

#[derive(Debug, Clone)]
pub enum Mapper {
    Rom(Rom),
    Mbc1(Mbc1),
    Mbc3(Mbc3),
    Mbc5(Mbc5),
}

impl Mapper {
    pub fn new(kind: MapperKind, layout: BankLayout, rumble: bool) -> Mapper {
        match kind {
            MapperKind::None => Mapper::Rom(Rom::new(layout)),
            MapperKind::Mbc1 => Mapper::Mbc1(Mbc1::new(layout)),
            MapperKind::Mbc3 => Mapper::Mbc3(Mbc3::new(layout)),
            MapperKind::Mbc5 => Mapper::Mbc5(Mbc5::new(layout, rumble)),
        }
    }

    /// Resolves a `$0000-$7fff` address to `(bank, offset)` in the ROM image.
    #[inline]
    pub fn map_rom(&self, addr: u16) -> (usize, usize) {
        match self {
            Mapper::Rom(rom) => rom.map_rom(addr),
            Mapper::Mbc1(mbc) => mbc.map_rom(addr),
            Mapper::Mbc3(mbc) => mbc.map_rom(addr),
            Mapper::Mbc5(mbc) => mbc.map_rom(addr),
        }
    }

    /// Resolves a `$a000-$bfff` address to `(bank, offset)` in cartridge RAM.
    /// `None` means the access hits nothing (RAM disabled or absent).
    #[inline]
    pub fn map_ram(&self, addr: u16) -> Option<(usize, usize)> {
        match self {
            Mapper::Rom(rom) => rom.map_ram(addr),
            Mapper::Mbc1(mbc) => mbc.map_ram(addr),
            Mapper::Mbc3(mbc) => mbc.map_ram(addr),
            Mapper::Mbc5(mbc) => mbc.map_ram(addr),
        }
    }

    #[inline]
    pub fn write_control(&mut self, addr: u16, data: u8) {
        match self {
            Mapper::Rom(rom) => rom.write_control(addr, data),
            Mapper::Mbc1(mbc) => mbc.write_control(addr, data),
            Mapper::Mbc3(mbc) => mbc.write_control(addr, data),
            Mapper::Mbc5(mbc) => mbc.write_control(addr, data),
        }
    }

    pub fn current_rom_bank(&self) -> usize {
        self.map_rom(0x4000).0
    }

    pub fn layout(&self) -> BankLayout {
        match self {
            Mapper::Rom(rom) => rom.layout,
            Mapper::Mbc1(mbc) => mbc.layout,
            Mapper::Mbc3(mbc) => mbc.layout,
            Mapper::Mbc5(mbc) => mbc.layout,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Mapper::Rom(_) => "ROM",
            Mapper::Mbc1(_) => "MBC1",
            Mapper::Mbc3(_) => "MBC3",
            Mapper::Mbc5(mbc) if mbc.has_rumble() => "MBC5+RUMBLE",
            Mapper::Mbc5(_) => "MBC5",
        }
    }
}

#[inline]
pub(crate) fn rom_offset(addr: u16) -> usize {
    addr as usize % ROM_BANK_SIZE
}

#[inline]
pub(crate) fn ram_offset(addr: u16) -> usize {
    addr as usize % RAM_BANK_SIZE
}

#[inline]
pub(crate) fn wrap_bank(bank: usize, count: usize) -> usize {
    if count == 0 {
        0
    } else {
        bank % count
    }
}
