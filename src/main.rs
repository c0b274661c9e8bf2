#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use clap::{ArgAction, Parser};
use lc3_vm::sim::mem::MachineInitStrategy;
use lc3_vm::sim::{SimFlags, Simulator};
use tracing::error;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::prelude::*;

mod term;

/// Exit status after a HALT.
const EXIT_HALT: u8 = 0;
/// Exit status after a load failure or a fault.
const EXIT_FAILURE: u8 = 1;
/// Exit status after the program was interrupted with Ctrl-C.
const EXIT_INTERRUPTED: u8 = 130;

#[derive(Parser)]
#[clap(version, about)]
struct Opt {
    /// Program images to load, in order. Later images overwrite earlier ones where they overlap.
    #[clap(required = true, value_name = "IMAGE")]
    images: Vec<PathBuf>,

    /// Increase the level of verbosity. Can be used multiple times.
    #[clap(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Stop with an error when a TRAP vector has no built-in routine
    #[clap(long)]
    strict_traps: bool,

    /// Fill memory and registers with random words generated from this seed
    #[clap(long, conflicts_with = "fill")]
    seed: Option<u64>,

    /// Fill memory and registers with this word (decimal, or hex prefixed with x or 0x)
    #[clap(long, value_parser = parse_word)]
    fill: Option<u16>,
}

impl Opt {
    const fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "lc3_vm=debug,info",
            2..=u8::MAX => "lc3_vm=trace,info",
        }
    }

    fn filter_layer(&self) -> EnvFilter {
        // Parse log level from env
        EnvFilter::try_from_default_env()
            // or infer from args
            .unwrap_or_else(|_| EnvFilter::new(self.log_filter()))
    }

    fn sim_flags(&self) -> SimFlags {
        let machine_init = match (self.seed, self.fill) {
            (Some(seed), _) => MachineInitStrategy::Seeded { seed },
            (None, Some(value)) => MachineInitStrategy::Known { value },
            (None, None) => MachineInitStrategy::default(),
        };

        SimFlags { machine_init, strict_traps: self.strict_traps }
    }
}

fn parse_word(s: &str) -> Result<u16, std::num::ParseIntError> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix('x')) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse(),
    }
}

/// Creates a simulator and loads every image into it, in order.
///
/// The first image that fails to load aborts loading.
fn load_images(flags: SimFlags, images: &[PathBuf]) -> anyhow::Result<Simulator> {
    let mut sim = Simulator::new(flags);
    for path in images {
        sim.load_image_file(path)?;
    }

    Ok(sim)
}

/// Runs the loaded program until it halts, faults, or `interrupted` is set,
/// and returns the exit status.
///
/// `interrupted` is checked before every instruction, including the first.
fn run_program(sim: &mut Simulator, interrupted: &AtomicBool) -> u8 {
    let result = sim.run_while(|_| !interrupted.load(Ordering::Relaxed));
    if interrupted.load(Ordering::Relaxed) {
        return EXIT_INTERRUPTED;
    }

    match result {
        Ok(()) => EXIT_HALT,
        Err(e) => {
            error!("program stopped at x{:04X}: {e}", sim.prefetch_pc());
            EXIT_FAILURE
        }
    }
}

fn exec(opt: &Opt) -> anyhow::Result<u8> {
    let mut sim = load_images(opt.sim_flags(), &opt.images)?;

    let interrupted = Arc::new(AtomicBool::new(false));
    let guard = term::RawModeGuard::enable()
        .context("failed to switch the terminal to raw mode")?;
    sim.set_console(term::stdin_console(Arc::clone(sim.mcr()), Arc::clone(&interrupted)));

    let status = run_program(&mut sim, &interrupted);
    drop(guard);

    if status == EXIT_INTERRUPTED {
        println!();
    }
    Ok(status)
}

fn main() -> ExitCode {
    // First, parse the arguments
    let opt = Opt::parse();

    // Then, setup the tracing formatter for logging
    let fmt_layer = tracing_subscriber::fmt::layer()
        .without_time()
        .with_target(false)
        .with_writer(|| term::CrlfWriter(std::io::stderr()));
    tracing_subscriber::Registry::default()
        .with(opt.filter_layer())
        .with(fmt_layer)
        .init();

    // And run the images
    match exec(&opt) {
        Ok(status) => ExitCode::from(status),
        Err(e) => {
            error!("{e:#}");
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::atomic::AtomicBool;

    use clap::{CommandFactory, Parser};
    use lc3_vm::sim::io::BufferedConsole;
    use lc3_vm::sim::mem::MachineInitStrategy;

    use super::{load_images, parse_word, run_program, Opt};
    use super::{EXIT_FAILURE, EXIT_HALT, EXIT_INTERRUPTED};

    fn temp_image(name: &str, bytes: &[u8]) -> PathBuf {
        let path = std::env::temp_dir().join(format!("lc3-vm-cli-{}-{name}", std::process::id()));
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn test_cli_definition() {
        Opt::command().debug_assert();
    }

    #[test]
    fn test_parse_word() {
        assert_eq!(parse_word("x3000"), Ok(0x3000));
        assert_eq!(parse_word("0xFFFF"), Ok(0xFFFF));
        assert_eq!(parse_word("42"), Ok(42));
        assert!(parse_word("x10000").is_err());
        assert!(parse_word("-1").is_err());
    }

    #[test]
    fn test_flags_from_args() {
        let opt = Opt::try_parse_from(["lc3-vm", "a.obj", "b.obj"]).unwrap();
        assert_eq!(opt.images.len(), 2);
        assert_eq!(opt.sim_flags(), Default::default());
        assert_eq!(opt.log_filter(), "info");

        let opt = Opt::try_parse_from(["lc3-vm", "-vv", "--strict-traps", "--fill", "xBEEF", "a.obj"]).unwrap();
        let flags = opt.sim_flags();
        assert!(flags.strict_traps);
        assert_eq!(flags.machine_init, MachineInitStrategy::Known { value: 0xBEEF });
        assert_eq!(opt.log_filter(), "lc3_vm=trace,info");

        let opt = Opt::try_parse_from(["lc3-vm", "--seed", "7", "a.obj"]).unwrap();
        assert_eq!(opt.sim_flags().machine_init, MachineInitStrategy::Seeded { seed: 7 });
    }

    #[test]
    fn test_bad_args() {
        let Err(err) = Opt::try_parse_from(["lc3-vm"]) else { panic!("missing images should be rejected") };
        assert_eq!(err.exit_code(), 2);

        let Err(err) = Opt::try_parse_from(["lc3-vm", "--seed", "1", "--fill", "0", "a.obj"]) else {
            panic!("--seed and --fill should conflict")
        };
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_halt_exits_zero() {
        let path = temp_image("hi.obj", b"\x30\x00\xE0\x02\xF0\x22\xF0\x25\x00\x48\x00\x49\x00\x00");
        let sim = load_images(Default::default(), &[path.clone()]);
        std::fs::remove_file(&path).unwrap();

        let mut sim = sim.unwrap();
        let console = BufferedConsole::new();
        sim.set_console(console.clone());

        assert_eq!(run_program(&mut sim, &AtomicBool::new(false)), EXIT_HALT);
        assert_eq!(&**console.get_output().read().unwrap(), b"HI");
    }

    #[test]
    fn test_fault_exits_one() {
        let path = temp_image("reserved.obj", b"\x30\x00\xD0\x00\xF0\x25");
        let sim = load_images(Default::default(), &[path.clone()]);
        std::fs::remove_file(&path).unwrap();

        let mut sim = sim.unwrap();
        assert_eq!(run_program(&mut sim, &AtomicBool::new(false)), EXIT_FAILURE);
        assert_eq!(sim.instructions_run, 0);
        assert!(!sim.hit_halt());
    }

    #[test]
    fn test_failed_load_aborts() {
        let good = temp_image("good.obj", b"\x30\x00\xF0\x25");
        let missing = std::env::temp_dir().join("lc3-vm-cli-does-not-exist.obj");

        let result = load_images(Default::default(), &[good.clone(), missing]);
        std::fs::remove_file(&good).unwrap();

        let err = result.unwrap_err();
        assert!(format!("{err:#}").contains("lc3-vm-cli-does-not-exist.obj"));
    }

    #[test]
    fn test_interrupt_before_run() {
        let path = temp_image("loop.obj", b"\x30\x00\x0F\xFF");
        let sim = load_images(Default::default(), &[path.clone()]);
        std::fs::remove_file(&path).unwrap();

        // The reader thread can see Ctrl-C before the run starts.
        let mut sim = sim.unwrap();
        let interrupted = AtomicBool::new(true);
        sim.mcr().store(false, std::sync::atomic::Ordering::Relaxed);

        assert_eq!(run_program(&mut sim, &interrupted), EXIT_INTERRUPTED);
        assert_eq!(sim.instructions_run, 0);
    }
}
