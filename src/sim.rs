//! Simulating and execution for LC-3 programs.
//!
//! This module is focused on executing program images (see [`crate::image`]).
//!
//! This module consists of:
//! - [`Simulator`]: The struct that simulates loaded code.
//! - [`mem`]: The module handling memory and the register file.
//! - [`io`]: The module handling the console the simulator reads from and writes to.
//!
//! # Usage
//!
//! To simulate some code, you need to instantiate a Simulator and load an image to it:
//!
//! ```
//! use lc3_vm::image::ProgramImage;
//! use lc3_vm::sim::Simulator;
//! use lc3_vm::ast::reg_consts::R0;
//!
//! let image = ProgramImage::new(0x3000, vec![
//!     0x5020, // AND R0, R0, #0
//!     0x1021, // ADD R0, R0, #1
//!     0x1021, // ADD R0, R0, #1
//!     0xF025, // HALT
//! ]);
//!
//! let mut sim = Simulator::new(Default::default());
//! sim.load_image(&image);
//!
//! // Running step by step:
//! sim.step_in().unwrap();
//! assert_eq!(sim.reg_file[R0], 0);
//! sim.step_in().unwrap();
//! assert_eq!(sim.reg_file[R0], 1);
//!
//! // Running to the end:
//! sim.run().unwrap();
//! assert_eq!(sim.reg_file[R0], 2);
//! assert!(sim.hit_halt());
//! ```
//!
//! ## Flags
//!
//! Here, we define `simulator` to have the default flags.
//! We could also configure the simulator by editing the flags. For example,
//! if unknown trap vectors should stop the program, we can edit the flags like so:
//!
//! ```
//! # use lc3_vm::sim::{Simulator, SimFlags};
//! let mut simulator = Simulator::new(SimFlags { strict_traps: true, ..Default::default() });
//! ```
//!
//! All of the available flags can be found in [`SimFlags`].
//!
//! ## Execution
//!
//! Beyond the basic [`Simulator::run`] (which runs until halting),
//! there are also:
//! - [`Simulator::step_in`]: manual step-by-step simulation
//! - [`Simulator::run_while`], [`Simulator::run_with_limit`]: more advanced programmatic execution
//!
//! Execution can also be stopped from the outside by clearing the machine control flag
//! ([`Simulator::mcr`]). The simulator finishes its current instruction and then stops.
//!
//! ## IO
//!
//! The keyboard status and data registers (`KBSR` at `xFE00`, `KBDR` at `xFE02`)
//! and the IO traps are backed by a console (the trait [`io::ConsoleIO`]).
//! A new simulator has [`io::NullConsole`]; another can be attached with [`Simulator::set_console`].
//!
//! The best console for programmatic uses is [`io::BufferedConsole`],
//! which exposes the IO to memory buffers that can be modified.
//!
//! ```
//! use lc3_vm::image::ProgramImage;
//! use lc3_vm::sim::Simulator;
//! use lc3_vm::sim::io::BufferedConsole;
//!
//! let image = ProgramImage::new(0x3000, vec![
//!     0xF020, // GETC
//!     0xF021, // OUT
//!     0x1020, // ADD R0, R0, #0
//!     0x0BFC, // BRnp #-4
//!     0xF025, // HALT
//! ]);
//!
//! let mut sim = Simulator::new(Default::default());
//! sim.load_image(&image);
//!
//! let console = BufferedConsole::new();
//! sim.set_console(console.clone());
//!
//! console.get_input().write().unwrap().extend(b"Hello, World!\0");
//! sim.run().unwrap();
//!
//! assert_eq!(&*console.get_input().read().unwrap(), b"");
//! assert_eq!(&**console.get_output().read().unwrap(), b"Hello, World!\0");
//! ```
pub mod mem;
pub mod io;
mod trap;

use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::ast::reg_consts::R7;
use crate::ast::sim::SimInstr;
use crate::ast::ImmOrReg;
use crate::image::{LoadError, ProgramImage};
use self::io::{ConsoleIO, NullConsole};
use self::mem::{MachineInitStrategy, MemArray, RegFile};
pub use self::trap::TrapCode;

/// The keyboard status register.
///
/// Bit 15 is set when a character is ready in [`KBDR`].
pub const KBSR: u16 = 0xFE00;
/// The keyboard data register.
pub const KBDR: u16 = 0xFE02;

/// Errors that can occur during simulation.
#[derive(Debug, PartialEq, Eq, Clone, Copy, thiserror::Error)]
pub enum SimErr {
    /// Word was decoded, but the opcode was invalid.
    #[error("simulator executed illegal opcode (instruction x{0:04X})")]
    IllegalOpcode(u16),
    /// A `TRAP` was executed with a vector that has no built-in implementation
    /// (only raised if [`SimFlags::strict_traps`] is enabled).
    #[error("simulator executed unknown trap x{0:02X}")]
    UnknownTrap(u8),
    /// An input trap was executed, but the console will never provide more input.
    #[error("console input closed while waiting for a character")]
    InputClosed,
}

/// Anything that can cause a step to abruptly fail to finish.
enum StepBreak {
    /// A HALT was executed.
    Halt,
    /// A simulation error occurred.
    Err(SimErr),
}
impl From<SimErr> for StepBreak {
    fn from(value: SimErr) -> Self {
        Self::Err(value)
    }
}

/// Reason for why execution paused if it wasn't due to an error.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
enum PauseCondition {
    /// Program reached a halt.
    Halt,
    /// The MCR was cleared.
    MCROff,
    /// Program hit a tripwire condition.
    Tripwire,
    /// Program hit an error and did not pause successfully.
    #[default]
    Unsuccessful
}

/// Configuration flags for [`Simulator`].
///
/// These can be modified after the `Simulator` is created with [`Simulator::new`]
/// and their effects should still apply.
///
/// Read the field descriptions for more details.
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
pub struct SimFlags {
    /// The creation strategy for memory and registers that were never written.
    ///
    /// This flag only goes into effect after a `Simulator::new` or `Simulator::reset` call.
    ///
    /// By default, this is [`MachineInitStrategy::Known`] with a value of 0.
    pub machine_init: MachineInitStrategy,

    /// Whether a `TRAP` with an unknown vector is an error.
    ///
    /// - `false`: the trap is logged and skipped, and execution continues.
    /// - `true`: the simulator stops with [`SimErr::UnknownTrap`].
    ///
    /// By default, this flag is `false`.
    pub strict_traps: bool,
}

/// A type alias for MCR (the machine control flag).
///
/// While this is `true`, the simulator keeps running.
pub type MCR = Arc<AtomicBool>;

/// Executes loaded code.
pub struct Simulator {
    // ------------------ SIMULATION STATE ------------------
    // Calling [`Simulator::reset`] resets these values.

    /// The simulator's memory.
    ///
    /// Note that this is held in the heap, as it is too large for the stack.
    pub mem: MemArray,

    /// The simulator's register file (which includes the PC and condition code).
    pub reg_file: RegFile,

    /// The number of instructions successfully run since this `Simulator` was initialized.
    ///
    /// This can be set to 0 to reset the counter.
    pub instructions_run: u64,

    /// Indicates whether the PC has been incremented in the fetch stage yet.
    ///
    /// This is just for error handling purposes. It's used to compute
    /// the PC of the instruction that caused an error. See [`Simulator::prefetch_pc`].
    prefetch: bool,

    /// Indicates the reason why the last execution (via [`Simulator::run_while`] and adjacent)
    /// had paused.
    pause_condition: PauseCondition,

    // ------------------ CONFIG STATE ------------------
    // Calling [`Simulator::reset`] does not reset these values.

    /// Machine control.
    /// If unset, the program stops.
    ///
    /// This is publicly accessible via a reference through [`Simulator::mcr`].
    mcr: MCR,

    /// Configuration settings for the simulator.
    ///
    /// These are preserved between resets.
    pub flags: SimFlags,

    /// The console backing keyboard IO and the IO traps.
    console: Box<dyn ConsoleIO + Send>,
}

impl Simulator {
    /// Creates a new simulator with the provided flags
    /// and with no program loaded.
    ///
    /// This also allows providing an MCR atomic which is used by the Simulator.
    fn new_with_mcr(flags: SimFlags, mcr: MCR) -> Self {
        let mut filler = flags.machine_init.generator();

        Self {
            mem: MemArray::new(&mut filler),
            reg_file: RegFile::new(&mut filler),
            instructions_run: 0,
            prefetch: false,
            pause_condition: Default::default(),

            mcr,
            flags,
            console: Box::new(NullConsole),
        }
    }

    /// Creates a new simulator with the provided flags
    /// and with no program loaded.
    ///
    /// The console starts as [`NullConsole`].
    pub fn new(flags: SimFlags) -> Self {
        Self::new_with_mcr(flags, Arc::default())
    }

    /// Resets the simulator.
    ///
    /// This resets the state of the `Simulator` back to before any execution calls,
    /// while preserving configuration.
    ///
    /// Note that this function preserves:
    /// - Flags
    /// - MCR reference (i.e., anything with access to the Simulator's MCR can still control it)
    /// - The console
    ///
    /// This also does not reload images. Any image data has to be reloaded into the Simulator.
    pub fn reset(&mut self) {
        let mcr = Arc::clone(&self.mcr);
        let flags = self.flags;
        let console = std::mem::replace(&mut self.console, Box::new(NullConsole));

        *self = Simulator::new_with_mcr(flags, mcr);
        self.console = console;
    }

    /// Attaches a console, replacing the current one.
    pub fn set_console(&mut self, console: impl ConsoleIO + Send + 'static) {
        self.console = Box::new(console);
    }

    /// Reads the word at the provided address.
    ///
    /// Reading [`KBSR`] polls the console first:
    /// if a character is pending, it is moved into [`KBDR`] and `KBSR` is set to `x8000`.
    /// Otherwise, `KBSR` is cleared to `x0000`.
    /// Every other address simply returns the stored value.
    ///
    /// Note that this method is used for simulating a read to memory-mapped IO.
    /// If you would like to query the memory's state, consider using `index` on [`MemArray`].
    pub fn read_mem(&mut self, addr: u16) -> u16 {
        if addr == KBSR {
            let key = match self.console.poll_input() {
                true  => self.console.read_char(),
                false => None,
            };
            match key {
                Some(ch) => {
                    self.mem[KBSR] = 0x8000;
                    self.mem[KBDR] = u16::from(ch);
                },
                None => self.mem[KBSR] = 0,
            }
        }

        self.mem[addr]
    }

    /// Writes the word at the provided address.
    ///
    /// Writes are stored unconditionally, including to the keyboard registers.
    pub fn write_mem(&mut self, addr: u16, data: u16) {
        self.mem[addr] = data;
    }

    /// Loads an image into this simulator's memory.
    ///
    /// Words that would land past `xFFFF` are dropped.
    /// This returns the number of words that were stored.
    pub fn load_image(&mut self, image: &ProgramImage) -> usize {
        let loaded = self.mem.copy_block(image.origin, &image.words);
        if loaded < image.words.len() {
            tracing::warn!(
                "image at x{:04X} runs past xFFFF, dropping its last {} words",
                image.origin, image.words.len() - loaded
            );
        }
        tracing::debug!("loaded {loaded} words at x{:04X}", image.origin);

        loaded
    }

    /// Reads an image file and loads it into this simulator's memory.
    pub fn load_image_file(&mut self, path: impl AsRef<Path>) -> Result<usize, LoadError> {
        let image = ProgramImage::open(path)?;
        Ok(self.load_image(&image))
    }

    /// Gets a reference to the MCR.
    ///
    /// Clearing the MCR (from any thread) stops the current run after the instruction in progress.
    /// Every run sets the MCR when it starts, so clearing it before a run has no effect.
    /// To stop a run that may not have started yet, check a separate flag in [`Simulator::run_while`]'s tripwire.
    ///
    /// ```
    /// use std::sync::atomic::Ordering;
    /// use lc3_vm::image::ProgramImage;
    /// use lc3_vm::sim::Simulator;
    ///
    /// let mut sim = Simulator::new(Default::default());
    /// sim.load_image(&ProgramImage::new(0x3000, vec![0x0FFF])); // BR #-1
    ///
    /// let mcr = sim.mcr().clone();
    /// sim.run_while(|sim| {
    ///     if sim.instructions_run >= 100 { mcr.store(false, Ordering::Relaxed) }
    ///     true
    /// }).unwrap();
    /// assert!(!sim.hit_halt());
    /// ```
    pub fn mcr(&self) -> &MCR {
        // The mcr field is not exposed because that allows someone to swap the MCR
        // with another AtomicBool, which would cause the simulator's MCR
        // to be inconsistent with any other component's
        &self.mcr
    }

    /// Adds an offset to the PC.
    fn offset_pc(&mut self, offset: i16) {
        self.reg_file.pc = self.reg_file.pc.wrapping_add_signed(offset);
    }
    /// Gets the value of the prefetch PC.
    ///
    /// This function is useful as it returns the location of the currently
    /// executing instruction in memory.
    pub fn prefetch_pc(&self) -> u16 {
        self.reg_file.pc.wrapping_sub(u16::from(!self.prefetch))
    }

    /// Indicates whether the last execution of the simulator resulted in a HALT successfully occurring.
    pub fn hit_halt(&self) -> bool {
        matches!(self.pause_condition, PauseCondition::Halt)
    }

    /// Runs until the tripwire condition returns false (or any of the typical breaks occur).
    ///
    /// The typical break conditions are:
    /// - `HALT` is executed
    /// - the MCR is set to false
    /// - an error occurs
    pub fn run_while(&mut self, mut tripwire: impl FnMut(&mut Simulator) -> bool) -> Result<(), SimErr> {
        use std::sync::atomic::Ordering;

        std::mem::take(&mut self.pause_condition);
        self.mcr.store(true, Ordering::Relaxed);

        // event loop
        // run until:
        // 1. the MCR is set to false
        // 2. the tripwire condition returns false
        // 3. HALT or an error
        let result = loop {
            // MCR turned off:
            if !self.mcr.load(Ordering::Relaxed) {
                break Ok(PauseCondition::MCROff);
            }
            // Tripwire turned off:
            if !tripwire(self) {
                break Ok(PauseCondition::Tripwire);
            }

            match self.step() {
                Ok(_) => {},
                Err(StepBreak::Halt) => break Ok(PauseCondition::Halt),
                Err(StepBreak::Err(e)) => break Err(e)
            }
        };

        self.mcr.store(false, Ordering::Relaxed);
        self.pause_condition = result?;
        Ok(())
    }

    /// Execute the program.
    ///
    /// This blocks until the program ends.
    /// If you would like to limit the maximum number of steps to execute, consider [`Simulator::run_with_limit`].
    pub fn run(&mut self) -> Result<(), SimErr> {
        self.run_while(|_| true)
    }

    /// Execute the program with a limit on how many steps to execute.
    ///
    /// This blocks until the program ends or until the number of steps to execute has been hit.
    pub fn run_with_limit(&mut self, max_steps: u64) -> Result<(), SimErr> {
        let i = self.instructions_run;
        self.run_while(|sim| sim.instructions_run.wrapping_sub(i) < max_steps)
    }

    /// Simulate one step, executing one instruction.
    ///
    /// Unlike [`Simulator::run`], a `HALT` is not reported here.
    /// Use [`Simulator::run_while`] if that is needed.
    pub fn step_in(&mut self) -> Result<(), SimErr> {
        match self.step() {
            Ok(()) => Ok(()),
            Err(StepBreak::Halt) => Ok(()),
            Err(StepBreak::Err(e)) => Err(e)
        }
    }

    /// Simulate one step, executing one instruction.
    ///
    /// The PC is incremented before the instruction is decoded,
    /// so PC-relative offsets are relative to the next instruction.
    fn step(&mut self) -> Result<(), StepBreak> {
        self.prefetch = true;

        let word = self.read_mem(self.reg_file.pc);
        self.offset_pc(1);
        self.prefetch = false;

        let instr = SimInstr::decode(word)?;
        tracing::trace!("x{:04X}: {instr}", self.prefetch_pc());

        match instr {
            SimInstr::BR(cc, off) => {
                if cc & self.reg_file.cond().bits() != 0 {
                    self.offset_pc(off.get());
                }
            },
            SimInstr::ADD(dr, sr1, sr2) => {
                let val2 = match sr2 {
                    ImmOrReg::Imm(i2) => i2.get() as u16,
                    ImmOrReg::Reg(r2) => self.reg_file[r2],
                };

                self.reg_file[dr] = self.reg_file[sr1].wrapping_add(val2);
                self.reg_file.update_flags(dr);
            },
            SimInstr::LD(dr, off) => {
                let ea = self.reg_file.pc.wrapping_add_signed(off.get());
                self.reg_file[dr] = self.read_mem(ea);
                self.reg_file.update_flags(dr);
            },
            SimInstr::ST(sr, off) => {
                let ea = self.reg_file.pc.wrapping_add_signed(off.get());
                self.write_mem(ea, self.reg_file[sr]);
            },
            SimInstr::JSR(op) => {
                // The target is computed before R7 is written,
                // so JSRR R7 jumps to the old value of R7.
                let addr = match op {
                    ImmOrReg::Imm(off) => self.reg_file.pc.wrapping_add_signed(off.get()),
                    ImmOrReg::Reg(br)  => self.reg_file[br],
                };

                self.reg_file[R7] = self.reg_file.pc;
                self.reg_file.pc = addr;
            },
            SimInstr::AND(dr, sr1, sr2) => {
                let val2 = match sr2 {
                    ImmOrReg::Imm(i2) => i2.get() as u16,
                    ImmOrReg::Reg(r2) => self.reg_file[r2],
                };

                self.reg_file[dr] = self.reg_file[sr1] & val2;
                self.reg_file.update_flags(dr);
            },
            SimInstr::LDR(dr, br, off) => {
                let ea = self.reg_file[br].wrapping_add_signed(off.get());
                self.reg_file[dr] = self.read_mem(ea);
                self.reg_file.update_flags(dr);
            },
            SimInstr::STR(sr, br, off) => {
                let ea = self.reg_file[br].wrapping_add_signed(off.get());
                self.write_mem(ea, self.reg_file[sr]);
            },
            SimInstr::NOT(dr, sr) => {
                self.reg_file[dr] = !self.reg_file[sr];
                self.reg_file.update_flags(dr);
            },
            SimInstr::LDI(dr, off) => {
                let shifted_pc = self.reg_file.pc.wrapping_add_signed(off.get());
                let ea = self.read_mem(shifted_pc);
                self.reg_file[dr] = self.read_mem(ea);
                self.reg_file.update_flags(dr);
            },
            SimInstr::STI(sr, off) => {
                let shifted_pc = self.reg_file.pc.wrapping_add_signed(off.get());
                let ea = self.read_mem(shifted_pc);
                self.write_mem(ea, self.reg_file[sr]);
            },
            SimInstr::JMP(br) => {
                self.reg_file.pc = self.reg_file[br];
            },
            SimInstr::LEA(dr, off) => {
                self.reg_file[dr] = self.reg_file.pc.wrapping_add_signed(off.get());
                self.reg_file.update_flags(dr);
            },
            SimInstr::TRAP(vect) => {
                self.reg_file[R7] = self.reg_file.pc;
                match self.handle_trap(vect) {
                    Ok(()) => {},
                    // HALT is counted even though it stops the run.
                    Err(StepBreak::Halt) => {
                        self.instructions_run = self.instructions_run.wrapping_add(1);
                        return Err(StepBreak::Halt);
                    },
                    Err(e) => return Err(e),
                }
            },
        }

        self.instructions_run = self.instructions_run.wrapping_add(1);
        Ok(())
    }
}
impl Default for Simulator {
    fn default() -> Self {
        Self::new(Default::default())
    }
}
impl std::fmt::Debug for Simulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulator")
            .field("mem", &self.mem)
            .field("reg_file", &self.reg_file)
            .field("instructions_run", &self.instructions_run)
            .field("pause_condition", &self.pause_condition)
            .field("mcr", &self.mcr)
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}
