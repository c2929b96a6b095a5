pub mod error;
pub mod gameboy;
pub mod lr35902;
pub mod memory;
pub mod video;

#[cfg(test)]
mod tests;

use crate::error::GbError;
use crate::gameboy::GameBoy;
use log::info;

/// Creates a fresh engine for the named resource. The name is only logged; the host owns
/// resolving it to cartridge bytes and handing them to [`load_cartridge_data`].
pub fn get_emulator(identifier: &str) -> GameBoy {
    info!("Creating emulator for {}", identifier);
    GameBoy::new()
}

pub fn reset(emulator: &mut GameBoy) {
    emulator.reset();
}

pub fn load_cartridge_data(emulator: &mut GameBoy, bytes: &[u8]) -> Result<(), GbError> {
    emulator.load_cartridge(bytes)
}

pub fn run_until_redraw(emulator: &mut GameBoy) -> Result<bool, GbError> {
    emulator.run_until_redraw()
}

pub fn should_redraw_display(emulator: &GameBoy) -> bool {
    emulator.should_redraw_display()
}

/// 160x144 RGBA pixels, row-major from the top-left corner.
pub fn display_buffer(emulator: &GameBoy) -> Vec<u8> {
    emulator.display_buffer()
}
