//! Memory handling for the LC-3 simulator.
//!
//! This module consists of:
//! - [`MemArray`]: The raw 65536-word memory.
//! - [`RegFile`]: The register file (general purpose registers, PC, and condition code).
//! - [`Cond`]: The condition code.
//! - [`MachineInitStrategy`]: How memory and registers are filled before a program writes to them.
//!
//! Memory-mapped IO is not handled here.
//! Reads which trigger IO go through [`Simulator::read_mem`].
//!
//! [`Simulator::read_mem`]: super::Simulator::read_mem

use rand::rngs::StdRng;
use rand::Rng;

use crate::ast::Reg;

const N: usize = 1 << 16;

/// Trait that describes types that can be used to fill words that were never written.
pub trait WordFiller {
    /// Generate the data.
    fn generate(&mut self) -> u16;
}
impl WordFiller for () {
    /// This creates unseeded, non-deterministic values.
    fn generate(&mut self) -> u16 {
        rand::random()
    }
}
impl WordFiller for u16 {
    /// Sets each word to the given value.
    fn generate(&mut self) -> u16 {
        *self
    }
}
impl WordFiller for StdRng {
    /// This creates values from the standard random number generator.
    ///
    /// This can be used to create deterministic, seeded values.
    fn generate(&mut self) -> u16 {
        self.gen()
    }
}

/// Strategy used to initialize the `reg_file` and `mem` of the [`Simulator`].
///
/// By default, every word starts at zero.
///
/// [`Simulator`]: super::Simulator
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum MachineInitStrategy {
    /// Initializes each word randomly and non-deterministically.
    Unseeded,

    /// Initializes each word randomly and deterministically.
    Seeded {
        /// The seed the RNG was initialized with.
        seed: u64
    },

    /// Initializes each word to a known value.
    Known {
        /// The value to initialize each value to.
        value: u16
    }
}
impl Default for MachineInitStrategy {
    fn default() -> Self {
        MachineInitStrategy::Known { value: 0 }
    }
}

impl MachineInitStrategy {
    pub(super) fn generator(&self) -> impl WordFiller {
        use rand::SeedableRng;

        match self {
            MachineInitStrategy::Unseeded => MIGenerator::Unseeded,
            MachineInitStrategy::Seeded { seed } => MIGenerator::Seeded(Box::new(StdRng::seed_from_u64(*seed))),
            MachineInitStrategy::Known { value } => MIGenerator::Known(*value),
        }
    }
}

enum MIGenerator {
    Unseeded,
    Seeded(Box<StdRng>),
    Known(u16)
}
impl WordFiller for MIGenerator {
    fn generate(&mut self) -> u16 {
        match self {
            MIGenerator::Unseeded  => ().generate(),
            MIGenerator::Seeded(r) => r.generate(),
            MIGenerator::Known(k)  => k.generate(),
        }
    }
}

/// Memory.
///
/// This can be indexed with any `u16` (16-bit address),
/// so every access is in bounds.
///
/// Indexing accesses the stored value directly and never triggers IO.
///
/// ```
/// use lc3_vm::sim::mem::MemArray;
///
/// let mut mem = MemArray::new(&mut 0u16);
/// mem[0x3000] = 11;
/// assert_eq!(mem[0x3000], 11);
/// assert_eq!(mem[0xFFFF], 0);
/// ```
pub struct MemArray(Box<[u16; N]>);
impl MemArray {
    /// Creates a new memory with a provided word creation strategy.
    pub fn new(filler: &mut impl WordFiller) -> Self {
        Self(
            std::iter::repeat_with(|| filler.generate())
                .take(N)
                .collect::<Box<_>>()
                .try_into()
                .unwrap_or_else(|_| unreachable!("iterator should have had {N} elements"))
        )
    }

    /// Copies a block of words into memory, starting at `start`.
    ///
    /// Words which would land past `0xFFFF` are dropped rather than wrapped to `0x0000`.
    /// This returns how many words were copied.
    pub fn copy_block(&mut self, start: u16, words: &[u16]) -> usize {
        let si = usize::from(start);
        let len = words.len().min(N - si);

        self.0[si..(si + len)].copy_from_slice(&words[..len]);
        len
    }

    /// Gets a reference to the whole memory.
    pub fn as_slice(&self) -> &[u16] {
        &*self.0
    }
}
impl std::ops::Index<u16> for MemArray {
    type Output = u16;

    fn index(&self, index: u16) -> &Self::Output {
        &self.0[usize::from(index)]
    }
}
impl std::ops::IndexMut<u16> for MemArray {
    fn index_mut(&mut self, index: u16) -> &mut Self::Output {
        &mut self.0[usize::from(index)]
    }
}
impl std::fmt::Debug for MemArray {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // 65536 words is too much to print.
        let used = self.0.iter().filter(|&&w| w != 0).count();
        f.debug_struct("MemArray")
            .field("nonzero_words", &used)
            .finish_non_exhaustive()
    }
}

/// The condition code.
///
/// Exactly one of these is set at a time.
/// The discriminants match the bits tested by a `BR` condition mask.
#[derive(Debug, Default, PartialEq, Eq, Hash, Clone, Copy)]
#[repr(u8)]
pub enum Cond {
    #[allow(missing_docs)]
    Negative = 0b100,
    #[allow(missing_docs)]
    #[default]
    Zero = 0b010,
    #[allow(missing_docs)]
    Positive = 0b001,
}
impl Cond {
    /// Classifies a value by its sign (as a two's complement 16-bit integer).
    pub fn of(value: u16) -> Cond {
        match (value as i16).cmp(&0) {
            std::cmp::Ordering::Less    => Cond::Negative,
            std::cmp::Ordering::Equal   => Cond::Zero,
            std::cmp::Ordering::Greater => Cond::Positive,
        }
    }
    /// The bit representation (`0b100`, `0b010`, or `0b001`).
    pub fn bits(self) -> u8 {
        self as u8
    }
}

/// The register file.
///
/// This struct can be indexed with a [`Reg`]
/// (which can be constructed using the [`crate::ast::reg_consts`] module or via [`Reg::try_from`]).
///
/// It also holds the program counter (the public `pc` field)
/// and the condition code (see [`RegFile::cond`] and [`RegFile::update_flags`]).
///
/// # Example
///
/// ```
/// use lc3_vm::sim::mem::{Cond, RegFile};
/// use lc3_vm::ast::reg_consts::R0;
///
/// let mut reg = RegFile::new(&mut 0u16);
/// reg[R0] = 0x8000;
/// reg.update_flags(R0);
/// assert_eq!(reg[R0], 0x8000);
/// assert_eq!(reg.cond(), Cond::Negative);
/// ```
#[derive(Debug, Clone)]
pub struct RegFile {
    regs: [u16; 8],
    /// The program counter.
    pub pc: u16,
    cond: Cond,
}
impl RegFile {
    /// Where execution starts.
    pub const PC_START: u16 = 0x3000;

    /// Creates a register file with its general purpose registers filled by `filler`.
    ///
    /// The PC starts at [`RegFile::PC_START`] and the condition code starts at [`Cond::Zero`].
    pub fn new(filler: &mut impl WordFiller) -> Self {
        Self {
            regs: std::array::from_fn(|_| filler.generate()),
            pc: Self::PC_START,
            cond: Cond::default(),
        }
    }

    /// Gets the current condition code.
    pub fn cond(&self) -> Cond {
        self.cond
    }
    /// Sets the condition code.
    pub fn set_cond(&mut self, cond: Cond) {
        self.cond = cond;
    }
    /// Sets the condition code from the current value of `reg`.
    pub fn update_flags(&mut self, reg: Reg) {
        self.cond = Cond::of(self[reg]);
    }
}
impl std::ops::Index<Reg> for RegFile {
    type Output = u16;

    fn index(&self, index: Reg) -> &Self::Output {
        &self.regs[usize::from(index)]
    }
}
impl std::ops::IndexMut<Reg> for RegFile {
    fn index_mut(&mut self, index: Reg) -> &mut Self::Output {
        &mut self.regs[usize::from(index)]
    }
}
