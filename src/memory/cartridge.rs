use crate::error::GbError;
use crate::memory::mapper::{BankLayout, Mapper, MapperKind};
use crate::memory::{EXTERNAL_RAM_END, EXTERNAL_RAM_START, OPEN_BUS, RAM_BANK_SIZE, ROM_BANK_SIZE};
use bitflags::bitflags;
use log::{info, warn};

const HEADER_END: usize = 0x150;
const TITLE_RANGE: std::ops::Range<usize> = 0x134..0x144;
const CARTRIDGE_TYPE_ADDRESS: usize = 0x147;
const ROM_SIZE_ADDRESS: usize = 0x148;
const RAM_SIZE_ADDRESS: usize = 0x149;
const HEADER_CHECKSUM_ADDRESS: usize = 0x14d;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CartridgeFeatures: u8 {
        const RAM     = 0b0001;
        const BATTERY = 0b0010;
        const TIMER   = 0b0100;
        const RUMBLE  = 0b1000;
    }
}

#[derive(Debug, Clone)]
pub struct CartridgeHeader {
    pub title: String,
    pub kind: MapperKind,
    pub features: CartridgeFeatures,
    pub declared_rom_size: usize,
    pub ram_size: usize,
    pub checksum_valid: bool,
}

impl CartridgeHeader {
    pub fn parse(image: &[u8]) -> Result<CartridgeHeader, GbError> {
        if image.len() < HEADER_END {
            return Err(GbError::CartridgeTooShort { length: image.len() });
        }

        let code = image[CARTRIDGE_TYPE_ADDRESS];
        let (kind, features) = Self::lookup_type(code)?;

        let ram_size = if features.contains(CartridgeFeatures::RAM) {
            Self::lookup_ram_size(image[RAM_SIZE_ADDRESS])?
        } else {
            0
        };

        let title = image[TITLE_RANGE]
            .iter()
            .take_while(|&&byte| byte != 0)
            .map(|&byte| if byte.is_ascii_graphic() || byte == b' ' { byte as char } else { '?' })
            .collect::<String>();

        let checksum = image[0x134..HEADER_CHECKSUM_ADDRESS]
            .iter()
            .fold(0u8, |acc, &byte| acc.wrapping_sub(byte).wrapping_sub(1));

        Ok(CartridgeHeader {
            title,
            kind,
            features,
            declared_rom_size: (32 * 1024) << (image[ROM_SIZE_ADDRESS] & 0x0f).min(8),
            ram_size,
            checksum_valid: checksum == image[HEADER_CHECKSUM_ADDRESS],
        })
    }

    fn lookup_type(code: u8) -> Result<(MapperKind, CartridgeFeatures), GbError> {
        type F = CartridgeFeatures;

        let entry = match code {
            0x00 => (MapperKind::None, F::empty()),
            0x08 => (MapperKind::None, F::RAM),
            0x09 => (MapperKind::None, F::RAM | F::BATTERY),
            0x01 => (MapperKind::Mbc1, F::empty()),
            0x02 => (MapperKind::Mbc1, F::RAM),
            0x03 => (MapperKind::Mbc1, F::RAM | F::BATTERY),
            0x0f => (MapperKind::Mbc3, F::TIMER | F::BATTERY),
            0x10 => (MapperKind::Mbc3, F::TIMER | F::RAM | F::BATTERY),
            0x11 => (MapperKind::Mbc3, F::empty()),
            0x12 => (MapperKind::Mbc3, F::RAM),
            0x13 => (MapperKind::Mbc3, F::RAM | F::BATTERY),
            0x19 => (MapperKind::Mbc5, F::empty()),
            0x1a => (MapperKind::Mbc5, F::RAM),
            0x1b => (MapperKind::Mbc5, F::RAM | F::BATTERY),
            0x1c => (MapperKind::Mbc5, F::RUMBLE),
            0x1d => (MapperKind::Mbc5, F::RUMBLE | F::RAM),
            0x1e => (MapperKind::Mbc5, F::RUMBLE | F::RAM | F::BATTERY),
            _ => return Err(GbError::UnsupportedCartridgeType { code }),
        };

        Ok(entry)
    }

    fn lookup_ram_size(code: u8) -> Result<usize, GbError> {
        match code {
            0x00 => Ok(0),
            0x01 => Ok(0x800),
            0x02 => Ok(0x2000),
            0x03 => Ok(0x8000),
            0x04 => Ok(0x20000),
            0x05 => Ok(0x10000),
            _ => Err(GbError::UnsupportedRamSize { code }),
        }
    }
}

/// A loaded cartridge: the ROM image, its external RAM and the banking hardware in front of them.
#[derive(Debug, Clone)]
pub struct Cartridge {
    header: CartridgeHeader,
    rom: Vec<u8>,
    ram: Vec<u8>,
    mapper: Mapper,
}

impl Cartridge {
    pub fn from_bytes(image: &[u8]) -> Result<Cartridge, GbError> {
        let header = CartridgeHeader::parse(image)?;

        if !header.checksum_valid {
            warn!("Cartridge header checksum mismatch for \"{}\"", header.title);
        }
        if header.declared_rom_size != image.len() {
            warn!(
                "Cartridge declares {} bytes of ROM but the image has {}",
                header.declared_rom_size,
                image.len()
            );
        }

        // Pad to whole banks so every mapped (bank, offset) pair stays in bounds.
        let banks = image.len().div_ceil(ROM_BANK_SIZE).max(2);
        let mut rom = image.to_vec();
        rom.resize(banks * ROM_BANK_SIZE, OPEN_BUS);

        let layout = BankLayout {
            rom_banks: banks,
            ram_banks: header.ram_size.div_ceil(RAM_BANK_SIZE),
        };
        let mapper = Mapper::new(
            header.kind,
            layout,
            header.features.contains(CartridgeFeatures::RUMBLE),
        );

        info!(
            "Loaded cartridge \"{}\" ({}, {} ROM banks, {} bytes of RAM)",
            header.title,
            mapper.name(),
            layout.rom_banks,
            header.ram_size
        );

        Ok(Cartridge {
            ram: vec![0; header.ram_size],
            header,
            rom,
            mapper,
        })
    }

    /// Puts the banking hardware back into its power-on state and clears RAM.
    pub fn reset(&mut self) {
        self.mapper = Mapper::new(
            self.header.kind,
            self.mapper.layout(),
            self.header.features.contains(CartridgeFeatures::RUMBLE),
        );
        self.ram.fill(0);
    }

    #[inline]
    pub fn read(&self, addr: u16) -> u8 {
        match addr {
            0x0000..=0x7fff => {
                let (bank, offset) = self.mapper.map_rom(addr);
                self.rom[bank * ROM_BANK_SIZE + offset]
            }
            EXTERNAL_RAM_START..=EXTERNAL_RAM_END => match self.ram_index(addr) {
                Some(index) => self.ram[index],
                None => OPEN_BUS,
            },
            _ => OPEN_BUS,
        }
    }

    #[inline]
    pub fn write(&mut self, addr: u16, data: u8) {
        match addr {
            0x0000..=0x7fff => self.mapper.write_control(addr, data),
            EXTERNAL_RAM_START..=EXTERNAL_RAM_END => {
                if let Some(index) = self.ram_index(addr) {
                    self.ram[index] = data;
                }
            }
            _ => {}
        }
    }

    fn ram_index(&self, addr: u16) -> Option<usize> {
        if self.ram.is_empty() {
            return None;
        }

        // 2 KiB carts mirror inside the 8 KiB window.
        self.mapper
            .map_ram(addr)
            .map(|(bank, offset)| (bank * RAM_BANK_SIZE + offset) % self.ram.len())
    }

    pub fn header(&self) -> &CartridgeHeader {
        &self.header
    }

    pub fn mapper(&self) -> &Mapper {
        &self.mapper
    }

    pub fn rom_bank_count(&self) -> usize {
        self.rom.len() / ROM_BANK_SIZE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn image(cartridge_type: u8, banks: usize, ram_code: u8) -> Vec<u8> {
        let mut image = vec![0u8; banks * ROM_BANK_SIZE];
        for bank in 0..banks {
            image[bank * ROM_BANK_SIZE] = bank as u8;
        }
        image[0x134..0x138].copy_from_slice(b"TEST");
        image[CARTRIDGE_TYPE_ADDRESS] = cartridge_type;
        image[ROM_SIZE_ADDRESS] = (banks / 2).trailing_zeros() as u8;
        image[RAM_SIZE_ADDRESS] = ram_code;
        image
    }

    #[test]
    fn rejects_short_images() {
        let result = Cartridge::from_bytes(&[0u8; 0x14f]);
        assert!(matches!(result, Err(GbError::CartridgeTooShort { length: 0x14f })));
    }

    #[test]
    fn rejects_unknown_types() {
        let result = Cartridge::from_bytes(&image(0xfc, 2, 0));
        assert!(matches!(result, Err(GbError::UnsupportedCartridgeType { code: 0xfc })));

        let result = Cartridge::from_bytes(&image(0x02, 2, 0x07));
        assert!(matches!(result, Err(GbError::UnsupportedRamSize { code: 0x07 })));
    }

    #[test]
    fn parses_title_and_pads_small_images() {
        let mut bytes = image(0x00, 2, 0);
        bytes.truncate(0x200);

        let cartridge = Cartridge::from_bytes(&bytes).unwrap();
        assert_eq!(cartridge.header().title, "TEST");
        assert_eq!(cartridge.rom_bank_count(), 2);
        assert_eq!(cartridge.read(0x4000), OPEN_BUS);
    }

    #[test]
    fn bank_select_beyond_image_wraps() {
        let mut cartridge = Cartridge::from_bytes(&image(0x01, 4, 0)).unwrap();
        cartridge.write(0x2000, 7);
        assert_eq!(cartridge.mapper().current_rom_bank(), 7 % 4);
        assert_eq!(cartridge.read(0x4000), (7 % 4) as u8);
    }

    #[test]
    fn external_ram_is_gated_and_reset_clears_it() {
        let mut cartridge = Cartridge::from_bytes(&image(0x03, 4, 0x02)).unwrap();
        cartridge.write(0xa000, 0x42);
        assert_eq!(cartridge.read(0xa000), OPEN_BUS);

        cartridge.write(0x0000, 0x0a);
        cartridge.write(0xa000, 0x42);
        assert_eq!(cartridge.read(0xa000), 0x42);

        cartridge.reset();
        assert_eq!(cartridge.read(0xa000), OPEN_BUS);
        cartridge.write(0x0000, 0x0a);
        assert_eq!(cartridge.read(0xa000), 0x00);
    }

    #[test]
    fn small_ram_mirrors() {
        let mut cartridge = Cartridge::from_bytes(&image(0x02, 2, 0x01)).unwrap();
        cartridge.write(0x0000, 0x0a);
        cartridge.write(0xa001, 0x99);
        assert_eq!(cartridge.read(0xa801), 0x99);
    }
}
