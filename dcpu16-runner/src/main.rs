//! Command-line runner: loads a memory image, attaches the requested
//! devices, and runs the machine to completion.

use std::fs::File;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use dcpu16_core::devices::{Clock, Keyboard, Monitor};
use dcpu16_core::{ByteOrder, Computer, Memory, MEMORY_SIZE};

// ---------------------------------------------------------------------------
// CLI argument parsing
// ---------------------------------------------------------------------------

struct CliArgs {
    image_path: Option<PathBuf>,
    endian: ByteOrder,
    monitor: bool,
    keyboard: bool,
    clock: bool,
    cycles: Option<u64>,
    verbose: bool,
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut cli = CliArgs {
        image_path: None,
        endian: ByteOrder::Big,
        monitor: false,
        keyboard: false,
        clock: false,
        cycles: None,
        verbose: false,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--image" => {
                i += 1;
                cli.image_path = args.get(i).map(PathBuf::from);
            }
            "--endian" => {
                i += 1;
                match args.get(i).map(String::as_str) {
                    Some("big") => cli.endian = ByteOrder::Big,
                    Some("little") => cli.endian = ByteOrder::Little,
                    Some(other) => {
                        eprintln!("Unknown endian '{other}', expected 'big' or 'little'");
                        process::exit(1);
                    }
                    None => {
                        eprintln!("--endian requires a value");
                        process::exit(1);
                    }
                }
            }
            "--monitor" => cli.monitor = true,
            "--keyboard" => cli.keyboard = true,
            "--clock" => cli.clock = true,
            "--cycles" => {
                i += 1;
                if let Some(s) = args.get(i) {
                    cli.cycles = s.parse().ok();
                }
            }
            "--verbose" => cli.verbose = true,
            "--help" | "-h" => {
                eprintln!("Usage: dcpu16-runner --image <path> [OPTIONS]");
                eprintln!();
                eprintln!("Options:");
                eprintln!("  --image <file>      Memory image to load (required)");
                eprintln!("  --endian <order>    Word byte order in the image: big, little [default: big]");
                eprintln!("  --monitor           Attach a monitor device");
                eprintln!("  --keyboard          Attach a keyboard device");
                eprintln!("  --clock             Attach a clock device");
                eprintln!("  --cycles <n>        Stop after n cycles instead of running forever");
                eprintln!("  --verbose           Print PC and cycle count after every step");
                process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {other}");
                process::exit(1);
            }
        }
        i += 1;
    }

    cli
}

fn main() {
    let cli = parse_args();

    let Some(image_path) = cli.image_path else {
        eprintln!("Missing required --image <path>");
        process::exit(1);
    };

    let mut file = match File::open(&image_path) {
        Ok(file) => file,
        Err(err) => {
            eprintln!("Cannot open memory image '{}': {err}", image_path.display());
            process::exit(1);
        }
    };

    let memory = match Memory::load(&mut file, MEMORY_SIZE, cli.endian) {
        Ok(memory) => memory,
        Err(err) => {
            eprintln!("Failed to load memory image: {err}");
            process::exit(1);
        }
    };

    let mut computer = Computer::new(Arc::new(memory));

    if cli.monitor {
        let (monitor, _handle) = Monitor::new();
        computer.attach(monitor);
    }
    if cli.keyboard {
        let (keyboard, _input) = Keyboard::new();
        computer.attach(keyboard);
    }
    if cli.clock {
        computer.attach(Clock::new());
    }

    let result = match cli.cycles {
        Some(limit) => run_for(&mut computer, limit, cli.verbose),
        None => run_forever(&mut computer, cli.verbose),
    };

    if let Err(err) = result {
        eprintln!("Execution error: {err}");
        process::exit(1);
    }

    computer.shutdown();
    process::exit(0);
}

fn run_for(computer: &mut Computer, limit: u64, verbose: bool) -> Result<(), dcpu16_core::Error> {
    while computer.registers().cycles < limit && computer.is_active() {
        computer.step()?;
        if verbose {
            trace(computer);
        }
    }
    Ok(())
}

fn run_forever(computer: &mut Computer, verbose: bool) -> Result<(), dcpu16_core::Error> {
    while computer.is_active() {
        computer.step()?;
        if verbose {
            trace(computer);
        }
    }
    Ok(())
}

fn trace(computer: &Computer) {
    let regs = computer.registers();
    eprintln!("pc={:#06x} cycles={}", regs.pc, regs.cycles);
}
