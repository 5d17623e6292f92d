use std::collections::hash_map::DefaultHasher;
use std::fs;
use std::hash::{Hash, Hasher};
use std::io::Write;
use std::path::PathBuf;

use clap::Parser;
use gameboy_core::{EmulatorConfig, GameBoy};
use log::*;

/// Runs a cartridge without a window and reports what it did
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to .gb rom file
    #[arg(short = 'r', long = "rom", required = true)]
    rom_path: PathBuf,

    /// Number of frames to run
    #[arg(short, long, default_value_t = 60)]
    frames: u32,

    /// Directory for save-state slots
    #[arg(long, default_value = ".")]
    save_dir: PathBuf,

    /// Save state to restore before running
    #[arg(long)]
    load_state: Option<PathBuf>,

    /// Where to write a save state after running
    #[arg(long)]
    save_state: Option<PathBuf>,

    /// Print the cpu registers after every frame
    #[arg(short, long, default_value_t = false)]
    debug: bool,
}

fn main() -> Result<(), String> {
    env_logger::init();

    let args = Args::parse();

    let rom_dir = args
        .rom_path
        .parent()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let config = EmulatorConfig {
        rom_dir,
        save_dir: args.save_dir.clone(),
    };

    let mut gameboy = GameBoy::new(config);
    gameboy
        .load_rom_file(&args.rom_path)
        .map_err(|e| e.to_string())?;

    if let Some(path) = &args.load_state {
        gameboy.load_state_file(path).map_err(|e| e.to_string())?;
    }

    let stdout = std::io::stdout();
    for frame in 0..args.frames {
        if let Err(err) = gameboy.run_one_frame() {
            error!("frame {} failed: {}", frame, err);
            return Err(err.to_string());
        }

        let serial = gameboy.take_serial_data();
        if !serial.is_empty() {
            let mut out = stdout.lock();
            out.write_all(&serial).map_err(|e| e.to_string())?;
            out.flush().map_err(|e| e.to_string())?;
        }

        if args.debug {
            println!("frame {}: {}", frame, gameboy.debug_info());
        }
    }

    if let Some(path) = &args.save_state {
        let state = gameboy.save_state().map_err(|e| e.to_string())?;
        fs::write(path, state).map_err(|e| e.to_string())?;
        info!("wrote save state to {}", path.display());
    }

    let mut hasher = DefaultHasher::new();
    gameboy.framebuffer().pixels().hash(&mut hasher);
    println!();
    println!("{}", gameboy.debug_info());
    println!(
        "frames: {}, cycles: {}, screen hash: {:016x}",
        gameboy.ppu().frame_count(),
        gameboy.total_cycles(),
        hasher.finish()
    );

    Ok(())
}
