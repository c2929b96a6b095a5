use crate::error::GbError;
use crate::lr35902::cpu::Cpu;
use crate::memory::cartridge::Cartridge;
use crate::memory::mmu::Mmu;
use crate::video::palette::{Color, DEFAULT_SHADES};
use crate::video::ppu::Ppu;
use crate::video::{CYCLES_PER_FRAME, SCREEN_HEIGHT, SCREEN_WIDTH};
use log::{debug, info, warn};

pub const BOOTROM_SIZE: usize = 0x100;
pub const DISPLAY_BUFFER_SIZE: usize = SCREEN_WIDTH * SCREEN_HEIGHT * 4;

#[derive(Debug, Clone)]
pub struct Config {
    /// Upper bound on CPU steps per `run_until_redraw` call.
    pub iteration_ceiling: usize,
    pub enforce_access_locks: bool,
    pub shades: [Color; 4],
    pub boot_rom: Option<Vec<u8>>,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            // A frame of NOPs never takes more steps than this.
            iteration_ceiling: CYCLES_PER_FRAME,
            enforce_access_locks: true,
            shades: DEFAULT_SHADES,
            boot_rom: None,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum State {
    Uninitialized,
    Loaded,
    Running,
}

pub struct GameBoy {
    cpu: Cpu,
    mmu: Mmu,
    ppu: Ppu,
    config: Config,
    state: State,
    redraw_pending: bool,
}

impl GameBoy {
    pub fn new() -> GameBoy {
        GameBoy::build(Config::default())
    }

    pub fn with_config(config: Config) -> Result<GameBoy, GbError> {
        if let Some(bootrom) = &config.boot_rom {
            if bootrom.len() != BOOTROM_SIZE {
                return Err(GbError::InvalidBootRom { length: bootrom.len() });
            }
        }

        Ok(GameBoy::build(config))
    }

    fn build(config: Config) -> GameBoy {
        let mut mmu = Mmu::new();
        mmu.set_bootrom(config.boot_rom.clone());
        mmu.set_access_locks(config.enforce_access_locks);

        GameBoy {
            cpu: Cpu::new(),
            mmu,
            ppu: Ppu::new(),
            config,
            state: State::Uninitialized,
            redraw_pending: false,
        }
    }

    pub fn reset(&mut self) {
        let with_bootrom = self.config.boot_rom.is_some();
        debug!("Resetting emulator (boot ROM: {})", with_bootrom);

        self.cpu.reset(with_bootrom);
        self.mmu.reset();
        self.ppu.reset();
        self.redraw_pending = false;
        self.state = State::Loaded;
    }

    /// Replaces the cartridge and resets. A rejected image leaves the current setup untouched.
    pub fn load_cartridge(&mut self, image: &[u8]) -> Result<(), GbError> {
        let cartridge = Cartridge::from_bytes(image)?;
        info!("Inserting \"{}\"", cartridge.header().title);

        self.mmu.insert_cartridge(cartridge);
        self.reset();
        Ok(())
    }

    /// Steps the machine until the PPU finishes a frame. Returns `Ok(false)` when the
    /// iteration ceiling is reached first.
    pub fn run_until_redraw(&mut self) -> Result<bool, GbError> {
        if self.state == State::Uninitialized {
            return Err(GbError::Uninitialized);
        }

        self.state = State::Running;
        self.redraw_pending = false;

        for _ in 0..self.config.iteration_ceiling {
            let cycles = self.cpu.step(&mut self.mmu)?;
            self.mmu.tick(cycles);

            if self.ppu.advance(&mut self.mmu, cycles) {
                self.redraw_pending = true;
                return Ok(true);
            }
        }

        warn!(
            "No frame after {} steps (pc: {:04x})",
            self.config.iteration_ceiling,
            self.cpu.registers().pc
        );
        Ok(false)
    }

    pub fn should_redraw_display(&self) -> bool {
        self.redraw_pending
    }

    /// The last completed frame as row-major RGBA.
    pub fn display_buffer(&self) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(DISPLAY_BUFFER_SIZE);
        for pixel in self.ppu.completed_frame() {
            buffer.extend_from_slice(&pixel.to_rgba(&self.config.shades));
        }

        buffer
    }

    pub fn serial_output(&self) -> &[u8] {
        self.mmu.serial_output()
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn cpu(&self) -> &Cpu {
        &self.cpu
    }

    pub fn mmu(&self) -> &Mmu {
        &self.mmu
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl Default for GameBoy {
    fn default() -> GameBoy {
        GameBoy::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::mapper::MapperKind;

    fn cartridge(cartridge_type: u8, rom_size_code: u8) -> Vec<u8> {
        let banks = 2usize << rom_size_code;
        let mut image = vec![0u8; banks * 0x4000];
        image[0x147] = cartridge_type;
        image[0x148] = rom_size_code;
        image[0x149] = 0x00;

        let mut checksum: u8 = 0;
        for byte in &image[0x134..=0x14c] {
            checksum = checksum.wrapping_sub(*byte).wrapping_sub(1);
        }
        image[0x14d] = checksum;

        for bank in 1..banks {
            image[bank * 0x4000] = bank as u8;
        }

        image
    }

    #[test]
    fn run_before_reset_is_an_error() {
        let mut gb = GameBoy::new();
        assert!(matches!(gb.run_until_redraw(), Err(GbError::Uninitialized)));
    }

    #[test]
    fn empty_bus_runs_without_failing() {
        let mut gb = GameBoy::new();
        gb.reset();

        assert!(gb.run_until_redraw().is_ok());
        assert_eq!(gb.state(), State::Running);
        assert_eq!(gb.display_buffer().len(), DISPLAY_BUFFER_SIZE);
    }

    #[test]
    fn display_buffer_size_is_fixed() {
        let mut gb = GameBoy::new();
        assert_eq!(gb.display_buffer().len(), DISPLAY_BUFFER_SIZE);

        gb.load_cartridge(&cartridge(0x00, 0)).unwrap();
        for _ in 0..3 {
            gb.run_until_redraw().unwrap();
            assert_eq!(gb.display_buffer().len(), DISPLAY_BUFFER_SIZE);
        }
    }

    #[test]
    fn rom_only_cartridge_draws_a_blank_first_frame() {
        let mut gb = GameBoy::new();
        gb.load_cartridge(&cartridge(0x00, 0)).unwrap();
        gb.reset();

        assert_eq!(gb.cpu().registers().pc, 0x0100);
        assert!(!gb.should_redraw_display());

        assert!(gb.run_until_redraw().unwrap());
        assert!(gb.should_redraw_display());

        // Peeking at the frame does not consume the redraw signal.
        let frame = gb.display_buffer();
        assert!(gb.should_redraw_display());
        assert!(frame.chunks(4).all(|pixel| pixel == &DEFAULT_SHADES[0][..]));
    }

    #[test]
    fn identical_setups_produce_identical_frames() {
        let image = cartridge(0x00, 0);

        let mut first = GameBoy::new();
        first.load_cartridge(&image).unwrap();
        first.load_cartridge(&image).unwrap();
        first.reset();
        first.reset();

        let mut second = GameBoy::new();
        second.load_cartridge(&image).unwrap();
        second.reset();

        assert_eq!(first.run_until_redraw().unwrap(), second.run_until_redraw().unwrap());
        assert_eq!(first.display_buffer(), second.display_buffer());
        assert_eq!(first.cpu().registers(), second.cpu().registers());
    }

    #[test]
    fn rejected_cartridge_keeps_previous_one() {
        let mut gb = GameBoy::new();
        gb.load_cartridge(&cartridge(0x00, 0)).unwrap();

        assert!(matches!(
            gb.load_cartridge(&[0u8; 0x100]),
            Err(GbError::CartridgeTooShort { length: 0x100 })
        ));

        let mut unsupported = cartridge(0x00, 0);
        unsupported[0x147] = 0xfc;
        assert!(matches!(
            gb.load_cartridge(&unsupported),
            Err(GbError::UnsupportedCartridgeType { code: 0xfc })
        ));

        assert_eq!(gb.mmu().cartridge().map(|c| c.header().kind), Some(MapperKind::None));
        assert!(gb.run_until_redraw().is_ok());
    }

    #[test]
    fn bank_select_wraps_to_available_banks() {
        let mut gb = GameBoy::new();
        gb.load_cartridge(&cartridge(0x01, 1)).unwrap();

        // Four banks present, bank 6 resolves to bank 2.
        gb.mmu.write(0x2000, 6);
        assert_eq!(gb.mmu.read(0x4000), 2);

        gb.mmu.write(0x2000, 3);
        assert_eq!(gb.mmu.read(0x4000), 3);
    }

    #[test]
    fn boot_rom_must_be_256_bytes() {
        let config = Config {
            boot_rom: Some(vec![0; 0x80]),
            ..Config::default()
        };
        assert!(matches!(
            GameBoy::with_config(config),
            Err(GbError::InvalidBootRom { length: 0x80 })
        ));
    }

    #[test]
    fn boot_rom_starts_from_zero() {
        let mut bootrom = vec![0u8; BOOTROM_SIZE];
        bootrom[0] = 0x31; // ld sp, $fffe
        bootrom[1] = 0xfe;
        bootrom[2] = 0xff;

        let mut gb = GameBoy::with_config(Config {
            boot_rom: Some(bootrom),
            ..Config::default()
        })
        .unwrap();
        gb.load_cartridge(&cartridge(0x00, 0)).unwrap();

        assert_eq!(gb.cpu().registers().pc, 0x0000);
        assert!(gb.mmu().is_bootrom_mapped());
        assert_eq!(gb.mmu().read(0x0000), 0x31);
    }

    #[test]
    fn custom_shades_reach_the_buffer() {
        let mut shades = DEFAULT_SHADES;
        shades[0] = [0x9b, 0xbc, 0x0f, 0xff];

        let gb = GameBoy::with_config(Config {
            shades,
            ..Config::default()
        })
        .unwrap();
        assert_eq!(&gb.display_buffer()[..4], &[0x9b, 0xbc, 0x0f, 0xff]);
    }
}
