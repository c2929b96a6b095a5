pub mod palette;
pub mod ppu;
mod sprite;
pub mod state;
mod tile;

pub const SCREEN_WIDTH: usize = 160;
pub const SCREEN_HEIGHT: usize = 144;

pub const TILESET_0_ADDRESS: u16 = 0x8000;
pub const TILESET_1_ADDRESS: u16 = 0x9000;
pub const TILEMAP_0_ADDRESS: u16 = 0x9800;
pub const TILEMAP_1_ADDRESS: u16 = 0x9c00;
pub const OAM_ADDRESS: u16 = 0xfe00;

pub const LCD_CONTROL_REGISTER: u16 = 0xff40;
pub const LCD_STATUS_REGISTER: u16 = 0xff41;
pub const SCROLL_Y_REGISTER: u16 = 0xff42;
pub const SCROLL_X_REGISTER: u16 = 0xff43;
pub const SCANLINE_Y_REGISTER: u16 = 0xff44;
pub const SCANLINE_Y_COMPARE_REGISTER: u16 = 0xff45;
pub const BG_PALETTE_REGISTER: u16 = 0xff47;
pub const OBJ0_PALETTE_REGISTER: u16 = 0xff48;
pub const OBJ1_PALETTE_REGISTER: u16 = 0xff49;
pub const WINDOW_X_REGISTER: u16 = 0xff4b;
pub const WINDOW_Y_REGISTER: u16 = 0xff4a;

pub const DOTS_PER_SCANLINE: usize = 456;
pub const SCANLINES_PER_FRAME: u8 = 154;
pub const CYCLES_PER_FRAME: usize = DOTS_PER_SCANLINE * SCANLINES_PER_FRAME as usize;
