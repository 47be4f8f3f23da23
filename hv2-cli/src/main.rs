mod args;
mod console;
mod elf;
mod error;

use args::Args;
use clap::Parser;
use console::ConsoleHooks;
use env_logger::Env;
use error::CliError;
use hv2_core::board::{Board, Config};
use hv2_core::clock::ClockDivider;
use log::{info, LevelFilter};
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

/// Upper bound on how often per second the run loop checks the wall clock.
const THROTTLE_HZ: u64 = 100;

fn main() -> Result<(), CliError> {
    let args = Args::parse();

    let mut logger = env_logger::Builder::from_env(Env::default().default_filter_or("info"));
    if args.trace {
        logger.filter_module("hv2_core", LevelFilter::Trace);
    }
    logger.init();

    let program = args.elf.as_deref().map(read_file).transpose()?;

    if args.disassemble {
        if let Some(image) = &program {
            elf::disassemble(image, &mut std::io::stdout().lock())?;
        }
        return Ok(());
    }

    if program.is_none() && args.bios.is_none() {
        return Err(CliError::NothingToRun);
    }

    let mut board = Board::new(Config {
        memory_base: args.memory_base,
        memory_size: args.memory_size,
        bios: args.bios.as_deref().map(read_file).transpose()?,
        ..Config::default()
    })?;
    if let Some(image) = &program {
        elf::load_elf(&mut board, image)?;
    }

    let core = board.core_mut();
    core.set_host_hooks(Box::new(ConsoleHooks::new(std::io::stdout())));
    if args.flush_on_flow_transfer {
        core.control_mut().set_flush_on_flow_transfer(true);
    }

    run(&mut board, args.cpu_speed, args.cycles);
    info!(
        "stopped after {} cycles at pc {:#010x}",
        board.core().cycles(),
        board.core().pc()
    );
    Ok(())
}

fn read_file(path: &Path) -> Result<Vec<u8>, CliError> {
    std::fs::read(path).map_err(|source| CliError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Ticks the board until the core halts or `cycles` is exhausted.
fn run(board: &mut Board, cpu_speed: u64, cycles: Option<u64>) {
    let mut throttle = (cpu_speed > 0).then(|| Throttle::new(cpu_speed));
    while !board.core().is_halted() {
        if cycles.is_some_and(|budget| board.core().cycles() >= budget) {
            break;
        }
        board.tick();
        if let Some(throttle) = &mut throttle {
            throttle.tick();
        }
    }
}

/// Keeps the emulated core from running ahead of the wall clock.
#[derive(Debug)]
struct Throttle {
    divider: ClockDivider,
    start: Instant,
    slices: u64,
}

impl Throttle {
    fn new(cpu_speed: u64) -> Self {
        Self {
            divider: ClockDivider::new(cpu_speed, THROTTLE_HZ),
            start: Instant::now(),
            slices: 0,
        }
    }

    fn tick(&mut self) {
        if !self.divider.tick() {
            return;
        }
        self.slices += 1;
        let due = Duration::from_millis(self.slices * 1000 / self.divider.hz());
        if let Some(ahead) = due.checked_sub(self.start.elapsed()) {
            thread::sleep(ahead);
        }
    }
}
