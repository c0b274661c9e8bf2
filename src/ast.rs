//! Components describing the operands of LC-3 instructions.
//!
//! These components together are used to construct [`sim::SimInstr`],
//! the decoded form of a 16-bit instruction word.
//!
//! This module also holds [`sign_extend`], the pure function used
//! to widen every signed instruction field to a full word.

pub mod sim;

use std::num::TryFromIntError;

/// A register. Must be between 0 and 7.
///
/// This `Reg` struct can either be constructed by selecting a register from [`reg_consts`],
/// or by using [`Reg::try_from`].
///
/// ## Examples
///
/// ```text
/// AND R0, R0, #0
///     ~~  ~~
/// ADD R1, R1, R0
///     ~~  ~~  ~~
/// LD R2, #4
///    ~~
/// NOT R1, R2
///     ~~  ~~
/// ```
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub struct Reg(pub(crate) u8);

/// Register constants!
pub mod reg_consts {
    use super::Reg;

    /// The 0th register in the register file.
    pub const R0: Reg = Reg(0);
    /// The 1st register in the register file.
    pub const R1: Reg = Reg(1);
    /// The 2nd register in the register file.
    pub const R2: Reg = Reg(2);
    /// The 3rd register in the register file.
    pub const R3: Reg = Reg(3);
    /// The 4th register in the register file.
    pub const R4: Reg = Reg(4);
    /// The 5th register in the register file.
    pub const R5: Reg = Reg(5);
    /// The 6th register in the register file.
    pub const R6: Reg = Reg(6);
    /// The 7th register in the register file.
    ///
    /// `JSR`, `JSRR` and `TRAP` store their return address here.
    pub const R7: Reg = Reg(7);
}
impl Reg {
    /// Gets the register number of this [`Reg`]. This is always between 0 and 7.
    pub fn reg_no(self) -> u8 {
        self.0
    }

    /// Selects the register named by the three bits of `word` starting at bit `lo`.
    pub(crate) fn from_bits(word: u16, lo: u32) -> Self {
        Reg(((word >> lo) & 0b111) as u8)
    }
}
impl std::fmt::Display for Reg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "R{}", self.0)
    }
}
impl From<Reg> for usize {
    // Used for indexing the reg file.
    fn from(value: Reg) -> Self {
        usize::from(value.0)
    }
}
impl TryFrom<u8> for Reg {
    type Error = TryFromIntError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0..=7 => Ok(Reg(value)),
            // there's no public constructor for this error
            _     => u8::try_from(256u16).map(|_| unreachable!("256 does not fit in u8")),
        }
    }
}

/// A condition code mask (used for `BR`), must be between 0 and 7.
///
/// The condition codes are listed below:
///
/// | instruction   | code (bin) |
/// |---------------|------------|
/// | `NOP`         | `000`      |
/// | `BRn`         | `100`      |
/// | `BRz`         | `010`      |
/// | `BRnz`        | `110`      |
/// | `BRp`         | `001`      |
/// | `BRnp`        | `101`      |
/// | `BRzp`        | `011`      |
/// | `BR`, `BRnzp` | `111`      |
///
pub type CondCode = u8;

/// Widens the low `bit_count` bits of `field` to a full 16-bit word.
///
/// If the most significant bit of the field is set,
/// the upper bits are filled with ones (two's complement negative).
/// Otherwise, they are filled with zeroes.
/// Bits of `field` above `bit_count` are ignored.
///
/// ```
/// use lc3_vm::ast::sign_extend;
///
/// assert_eq!(sign_extend(0b10000, 5), 0xFFF0); // -16
/// assert_eq!(sign_extend(0b01111, 5), 0x000F); //  15
/// assert_eq!(sign_extend(0x1FF, 9),   0xFFFF); //  -1
/// ```
///
/// # Panics
///
/// This panics if `bit_count` is not within `1..=16`.
pub fn sign_extend(field: u16, bit_count: u32) -> u16 {
    assert!((1..=16).contains(&bit_count), "bit count {bit_count} is not within 1..=16");
    let shift = 16 - bit_count;
    (((field << shift) as i16) >> shift) as u16
}

/// The errors that can result from calling [`IOffset::new`].
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, thiserror::Error)]
pub enum OffsetNewErr {
    /// The provided offset cannot fit a signed integer of the given bitsize.
    #[error("value is too big for signed {0}-bit integer")]
    CannotFitSigned(u32),
}

/// A value representing a signed offset or a signed immediate value.
///
/// `N` indicates the bit size of the instruction field this value came from.
///
/// ## Examples
///
/// `IOffset<5>` is used to represent `ADD`/`AND`'s imm5 operand:
///
/// ```text
/// AND R0, R0, #0
///             ~~
/// ADD R1, R1, #-1
///             ~~~
/// ```
///
/// They are also used for register or PC offset values:
/// ```text
/// BR #-15
///    ~~~~
/// JSR #99
///     ~~~
/// LDR R0, R0, #9
///             ~~
/// ```
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub struct IOffset<const N: u32>(i16);

impl<const N: u32> IOffset<N> {
    /// Creates a new offset value.
    /// This must fit within `N` bits as a signed integer, otherwise an error is raised.
    ///
    /// ```
    /// # use lc3_vm::ast::IOffset;
    /// assert!(IOffset::<5>::new(-16).is_ok());
    /// assert!(IOffset::<5>::new(15).is_ok());
    /// assert!(IOffset::<5>::new(16).is_err());
    /// ```
    pub fn new(n: i16) -> Result<Self, OffsetNewErr> {
        let fits = N >= 16 || (-(1 << (N - 1))..(1 << (N - 1))).contains(&i32::from(n));
        match fits {
            true  => Ok(IOffset(n)),
            false => Err(OffsetNewErr::CannotFitSigned(N)),
        }
    }

    /// Creates an offset from the low `N` bits of an instruction word,
    /// sign-extending them and discarding the rest.
    ///
    /// ```
    /// # use lc3_vm::ast::IOffset;
    /// assert_eq!(IOffset::<5>::from_field(0b01111).get(),  15);
    /// assert_eq!(IOffset::<5>::from_field(0b10000).get(), -16);
    /// assert_eq!(IOffset::<5>::from_field(0b1_00000).get(), 0);
    /// ```
    pub fn from_field(word: u16) -> Self {
        IOffset(sign_extend(word, N) as i16)
    }

    /// Gets the value of the offset.
    pub fn get(&self) -> i16 {
        self.0
    }

    /// Gets the two's complement bit pattern of this offset, truncated to `N` bits.
    pub fn bits(&self) -> u16 {
        (self.0 as u16) & (u16::MAX >> (16 - N))
    }
}
impl<const N: u32> std::fmt::Display for IOffset<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A value representing either an immediate value or a register.
///
/// This is used to handle cases where an operand can be either
/// an immediate value or a register (e.g., in `AND` or `ADD`).
///
/// `JSR`/`JSRR` also use this type, with the immediate being the PC offset.
///
/// ## Examples
/// ```text
/// AND R0, R0, #0
/// AND R1, R1, R1
/// ADD R2, R2, #2
/// ADD R3, R3, R3
///             ^^
/// ```
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum ImmOrReg<const N: u32> {
    #[allow(missing_docs)]
    Imm(IOffset<N>),
    #[allow(missing_docs)]
    Reg(Reg)
}
impl<const N: u32> std::fmt::Display for ImmOrReg<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImmOrReg::Imm(imm) => imm.fmt(f),
            ImmOrReg::Reg(reg) => reg.fmt(f),
        }
    }
}
