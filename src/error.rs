use snafu::prelude::*;

#[derive(Debug, Snafu)]
pub enum GbError {
    #[snafu(display("Illegal opcode ({:02x}) at address: ${:04x}", opcode, address))]
    IllegalOpcode { opcode: u8, address: u16 },
    #[snafu(display("Unknown condition bits: {:08b}", data))]
    UnknownConditionBits { data: u8 },
    #[snafu(display("Unknown register bits: {:08b}", data))]
    UnknownRegisterBits { data: u8 },
    #[snafu(display("Invalid instruction handler implementation: {}", instruction))]
    InvalidHandler { instruction: String },
    #[snafu(display("Unresolved target: {}", target))]
    UnresolvedTarget { target: String },
    #[snafu(display("Cartridge image too short for a header: {} bytes", length))]
    CartridgeTooShort { length: usize },
    #[snafu(display("Unsupported cartridge type: ${:02x}", code))]
    UnsupportedCartridgeType { code: u8 },
    #[snafu(display("Unsupported cartridge RAM size code: ${:02x}", code))]
    UnsupportedRamSize { code: u8 },
    #[snafu(display("Boot ROM must be 256 bytes, got {}", length))]
    InvalidBootRom { length: usize },
    #[snafu(display("Emulator has not been reset or loaded"))]
    Uninitialized,
}
