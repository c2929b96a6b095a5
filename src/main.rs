use clap::Parser;
use dmgcore::gameboy::{Config, GameBoy};
use dmgcore::video::{SCREEN_HEIGHT, SCREEN_WIDTH};
use log::{error, info, LevelFilter};
use std::error::Error;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

const ROM_EXTENSIONS: [&str; 2] = ["gb", "bin"];

/// Runs a DMG cartridge headlessly for a number of frames.
#[derive(Parser, Debug)]
#[command(name = "dmgcore")]
struct Args {
    /// Path to the cartridge image (.gb) or a zip archive containing one
    rom: PathBuf,

    /// Optional 256 byte boot ROM to run before the cartridge
    #[arg(short, long)]
    bootrom: Option<PathBuf>,

    /// Number of frames to run
    #[arg(short, long, default_value_t = 60)]
    frames: usize,

    /// Write the last frame as a binary PPM image
    #[arg(short, long)]
    dump: Option<PathBuf>,

    #[arg(short, long, default_value_t = LevelFilter::Info)]
    log_level: LevelFilter,

    /// Let the CPU access VRAM and OAM while the PPU owns them
    #[arg(long)]
    no_access_locks: bool,
}

fn main() {
    let args = Args::parse();
    setup_logger(args.log_level);

    if let Err(e) = run(&args) {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), Box<dyn Error>> {
    let rom = load_rom(&args.rom)?;
    let boot_rom = match &args.bootrom {
        Some(path) => Some(std::fs::read(path)?),
        None => None,
    };

    let config = Config {
        enforce_access_locks: !args.no_access_locks,
        boot_rom,
        ..Config::default()
    };

    let name = args.rom.display().to_string();
    let mut gb = GameBoy::with_config(config)?;
    info!("Starting {}", name);
    dmgcore::load_cartridge_data(&mut gb, &rom)?;

    let mut frames = 0;
    for _ in 0..args.frames {
        if dmgcore::run_until_redraw(&mut gb)? {
            frames += 1;
        }
    }
    info!("Completed {} of {} frames", frames, args.frames);

    if !gb.serial_output().is_empty() {
        info!("Serial: {}", String::from_utf8_lossy(gb.serial_output()));
    }

    if let Some(path) = &args.dump {
        dump_frame(path, &dmgcore::display_buffer(&gb))?;
        info!("Wrote frame to {}", path.display());
    }

    Ok(())
}

fn load_rom(path: &Path) -> Result<Vec<u8>, Box<dyn Error>> {
    let is_zip = path
        .extension()
        .is_some_and(|extension| extension.eq_ignore_ascii_case("zip"));
    if !is_zip {
        return Ok(std::fs::read(path)?);
    }

    let mut archive = zip::ZipArchive::new(File::open(path)?)?;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let is_rom = Path::new(entry.name())
            .extension()
            .and_then(|extension| extension.to_str())
            .is_some_and(|extension| ROM_EXTENSIONS.contains(&extension.to_ascii_lowercase().as_str()));

        if is_rom {
            info!("Using {} from archive", entry.name());
            let mut rom = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut rom)?;
            return Ok(rom);
        }
    }

    Err(format!("No cartridge image found in {}", path.display()).into())
}

fn dump_frame(path: &Path, rgba: &[u8]) -> Result<(), Box<dyn Error>> {
    let mut file = File::create(path)?;
    write!(file, "P6\n{} {}\n255\n", SCREEN_WIDTH, SCREEN_HEIGHT)?;

    let rgb = rgba.chunks(4).flat_map(|pixel| pixel[..3].iter().copied()).collect::<Vec<u8>>();
    file.write_all(&rgb)?;
    Ok(())
}

fn setup_logger(level: LevelFilter) {
    let result = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!("[{}] {}: {}", record.level(), record.target(), message))
        })
        .level(level)
        .chain(std::io::stdout())
        .apply();

    if let Err(e) = result {
        eprintln!("Failed to install logger: {}", e);
    }
}
