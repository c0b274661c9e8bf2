//! Decoded instructions for the simulator.
//!
//! A 16-bit instruction word is split into fields by [`InstrBits`]
//! and assembled into a [`SimInstr`] by [`SimInstr::decode`].

use super::reg_consts::R7;
use super::{CondCode, IOffset, ImmOrReg, Reg};
use crate::sim::SimErr;

/// Named accessors over the bit fields of a raw instruction word.
///
/// Each accessor extracts one field from a fixed position.
/// Which fields are meaningful depends on the opcode:
///
/// ```text
///  15  12 11  9 8   6 5 4   0
/// +------+-----+-----+-+-----+
/// |opcode| dest| src1|m| ... |
/// +------+-----+-----+-+-----+
/// ```
///
/// ```
/// use lc3_vm::ast::sim::InstrBits;
/// use lc3_vm::ast::reg_consts::{R0, R1};
///
/// // ADD R0, R1, #-1
/// let bits = InstrBits::new(0b0001_000_001_1_11111);
/// assert_eq!(bits.opcode(), 0b0001);
/// assert_eq!(bits.dest(), R0);
/// assert_eq!(bits.src1(), R1);
/// assert!(bits.imm_mode());
/// assert_eq!(bits.imm5().get(), -1);
/// ```
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub struct InstrBits(u16);

impl InstrBits {
    /// Wraps a raw instruction word.
    pub fn new(word: u16) -> Self {
        Self(word)
    }
    /// The raw instruction word.
    pub fn get(self) -> u16 {
        self.0
    }
    /// Bits `[15:12]`.
    pub fn opcode(self) -> u8 {
        (self.0 >> 12) as u8
    }
    /// Bits `[11:9]`: the destination register (or the source register of a store).
    pub fn dest(self) -> Reg {
        Reg::from_bits(self.0, 9)
    }
    /// Bits `[8:6]`: the first source register.
    pub fn src1(self) -> Reg {
        Reg::from_bits(self.0, 6)
    }
    /// Bits `[8:6]`: the base register for `JMP`, `JSRR`, `LDR` and `STR`.
    ///
    /// This is the same field as [`InstrBits::src1`].
    pub fn base(self) -> Reg {
        self.src1()
    }
    /// Bits `[2:0]`: the second source register.
    pub fn src2(self) -> Reg {
        Reg::from_bits(self.0, 0)
    }
    /// Bit 5: whether `ADD`/`AND` use an immediate instead of `src2`.
    pub fn imm_mode(self) -> bool {
        (self.0 >> 5) & 1 != 0
    }
    /// Bit 11: whether `JSR` uses a PC offset (`JSR`) instead of a base register (`JSRR`).
    pub fn long_mode(self) -> bool {
        (self.0 >> 11) & 1 != 0
    }
    /// Bits `[11:9]`: the condition mask of `BR`.
    pub fn cond(self) -> CondCode {
        ((self.0 >> 9) & 0b111) as u8
    }
    /// Bits `[4:0]`, sign-extended.
    pub fn imm5(self) -> IOffset<5> {
        IOffset::from_field(self.0)
    }
    /// Bits `[5:0]`, sign-extended.
    pub fn offset6(self) -> IOffset<6> {
        IOffset::from_field(self.0)
    }
    /// Bits `[8:0]`, sign-extended.
    pub fn offset9(self) -> IOffset<9> {
        IOffset::from_field(self.0)
    }
    /// Bits `[10:0]`, sign-extended.
    pub fn offset11(self) -> IOffset<11> {
        IOffset::from_field(self.0)
    }
    /// Bits `[7:0]`: the trap vector.
    pub fn trapvect8(self) -> u8 {
        self.0 as u8
    }
}

/// A decoded instruction.
///
/// Operands of stores are named after their role:
/// `ST(sr, off)` stores `sr`, even though `sr` sits in the destination field.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum SimInstr {
    /// A conditional branch.
    BR(CondCode, IOffset<9>),
    /// An addition.
    ADD(Reg, Reg, ImmOrReg<5>),
    /// A PC-relative load.
    LD(Reg, IOffset<9>),
    /// A PC-relative store.
    ST(Reg, IOffset<9>),
    /// A subroutine call (`JSR` with an offset, `JSRR` with a register).
    JSR(ImmOrReg<11>),
    /// A bitwise AND.
    AND(Reg, Reg, ImmOrReg<5>),
    /// A base + offset load.
    LDR(Reg, Reg, IOffset<6>),
    /// A base + offset store.
    STR(Reg, Reg, IOffset<6>),
    /// A bitwise complement.
    NOT(Reg, Reg),
    /// A PC-relative indirect load.
    LDI(Reg, IOffset<9>),
    /// A PC-relative indirect store.
    STI(Reg, IOffset<9>),
    /// A jump to the address in a register (`RET` when the register is `R7`).
    JMP(Reg),
    /// An effective address computation.
    LEA(Reg, IOffset<9>),
    /// A system call.
    TRAP(u8),
}

impl SimInstr {
    /// The two opcodes which are not defined (`RTI` and the reserved opcode).
    pub const RESERVED_OPCODES: [u8; 2] = [0b1000, 0b1101];

    /// Decodes a word into an instruction.
    ///
    /// This fails with [`SimErr::IllegalOpcode`] if the word's opcode is reserved.
    ///
    /// ```
    /// use lc3_vm::ast::sim::SimInstr;
    ///
    /// assert_eq!(SimInstr::decode(0xF025).unwrap(), SimInstr::TRAP(0x25));
    /// assert!(SimInstr::decode(0x8000).is_err());
    /// ```
    pub fn decode(word: u16) -> Result<Self, SimErr> {
        let bits = InstrBits::new(word);

        let imm_or_reg = |bits: InstrBits| match bits.imm_mode() {
            true  => ImmOrReg::Imm(bits.imm5()),
            false => ImmOrReg::Reg(bits.src2()),
        };

        let instr = match bits.opcode() {
            0b0000 => SimInstr::BR(bits.cond(), bits.offset9()),
            0b0001 => SimInstr::ADD(bits.dest(), bits.src1(), imm_or_reg(bits)),
            0b0010 => SimInstr::LD(bits.dest(), bits.offset9()),
            0b0011 => SimInstr::ST(bits.dest(), bits.offset9()),
            0b0100 => match bits.long_mode() {
                true  => SimInstr::JSR(ImmOrReg::Imm(bits.offset11())),
                false => SimInstr::JSR(ImmOrReg::Reg(bits.base())),
            },
            0b0101 => SimInstr::AND(bits.dest(), bits.src1(), imm_or_reg(bits)),
            0b0110 => SimInstr::LDR(bits.dest(), bits.base(), bits.offset6()),
            0b0111 => SimInstr::STR(bits.dest(), bits.base(), bits.offset6()),
            0b1001 => SimInstr::NOT(bits.dest(), bits.src1()),
            0b1010 => SimInstr::LDI(bits.dest(), bits.offset9()),
            0b1011 => SimInstr::STI(bits.dest(), bits.offset9()),
            0b1100 => SimInstr::JMP(bits.base()),
            0b1110 => SimInstr::LEA(bits.dest(), bits.offset9()),
            0b1111 => SimInstr::TRAP(bits.trapvect8()),
            _      => return Err(SimErr::IllegalOpcode(word)),
        };

        Ok(instr)
    }

    /// Gets the opcode of this instruction.
    pub fn opcode(&self) -> u8 {
        match self {
            SimInstr::BR(..)  => 0b0000,
            SimInstr::ADD(..) => 0b0001,
            SimInstr::LD(..)  => 0b0010,
            SimInstr::ST(..)  => 0b0011,
            SimInstr::JSR(_)  => 0b0100,
            SimInstr::AND(..) => 0b0101,
            SimInstr::LDR(..) => 0b0110,
            SimInstr::STR(..) => 0b0111,
            SimInstr::NOT(..) => 0b1001,
            SimInstr::LDI(..) => 0b1010,
            SimInstr::STI(..) => 0b1011,
            SimInstr::JMP(_)  => 0b1100,
            SimInstr::LEA(..) => 0b1110,
            SimInstr::TRAP(_) => 0b1111,
        }
    }

    /// Encodes this instruction into a word.
    ///
    /// Decoding the result gives back the same instruction.
    ///
    /// ```
    /// use lc3_vm::ast::sim::SimInstr;
    /// use lc3_vm::ast::{IOffset, ImmOrReg};
    /// use lc3_vm::ast::reg_consts::{R0, R1};
    ///
    /// let add = SimInstr::ADD(R0, R1, ImmOrReg::Imm(IOffset::new(-1).unwrap()));
    /// assert_eq!(add.encode(), 0x107F);
    /// ```
    pub fn encode(&self) -> u16 {
        fn reg(r: Reg, lo: u32) -> u16 {
            u16::from(r.reg_no()) << lo
        }
        fn imm_or_reg(op: ImmOrReg<5>) -> u16 {
            match op {
                ImmOrReg::Imm(imm) => 1 << 5 | imm.bits(),
                ImmOrReg::Reg(r)   => reg(r, 0),
            }
        }

        let operands = match *self {
            SimInstr::BR(cc, off)         => u16::from(cc & 0b111) << 9 | off.bits(),
            SimInstr::ADD(dr, sr1, sr2)   => reg(dr, 9) | reg(sr1, 6) | imm_or_reg(sr2),
            SimInstr::LD(dr, off)         => reg(dr, 9) | off.bits(),
            SimInstr::ST(sr, off)         => reg(sr, 9) | off.bits(),
            SimInstr::JSR(ImmOrReg::Imm(off)) => 1 << 11 | off.bits(),
            SimInstr::JSR(ImmOrReg::Reg(br))  => reg(br, 6),
            SimInstr::AND(dr, sr1, sr2)   => reg(dr, 9) | reg(sr1, 6) | imm_or_reg(sr2),
            SimInstr::LDR(dr, br, off)    => reg(dr, 9) | reg(br, 6) | off.bits(),
            SimInstr::STR(sr, br, off)    => reg(sr, 9) | reg(br, 6) | off.bits(),
            SimInstr::NOT(dr, sr)         => reg(dr, 9) | reg(sr, 6) | 0b111111,
            SimInstr::LDI(dr, off)        => reg(dr, 9) | off.bits(),
            SimInstr::STI(sr, off)        => reg(sr, 9) | off.bits(),
            SimInstr::JMP(br)             => reg(br, 6),
            SimInstr::LEA(dr, off)        => reg(dr, 9) | off.bits(),
            SimInstr::TRAP(vect)          => u16::from(vect),
        };

        u16::from(self.opcode()) << 12 | operands
    }
}

impl std::fmt::Display for SimInstr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SimInstr::BR(0, _) => f.write_str("NOP"),
            SimInstr::BR(cc, off) => {
                f.write_str("BR")?;
                if cc & 0b100 != 0 { f.write_str("n")?; }
                if cc & 0b010 != 0 { f.write_str("z")?; }
                if cc & 0b001 != 0 { f.write_str("p")?; }
                write!(f, " {off}")
            },
            SimInstr::ADD(dr, sr1, sr2) => write!(f, "ADD {dr}, {sr1}, {sr2}"),
            SimInstr::LD(dr, off)       => write!(f, "LD {dr}, {off}"),
            SimInstr::ST(sr, off)       => write!(f, "ST {sr}, {off}"),
            SimInstr::JSR(ImmOrReg::Imm(off)) => write!(f, "JSR {off}"),
            SimInstr::JSR(ImmOrReg::Reg(br))  => write!(f, "JSRR {br}"),
            SimInstr::AND(dr, sr1, sr2) => write!(f, "AND {dr}, {sr1}, {sr2}"),
            SimInstr::LDR(dr, br, off)  => write!(f, "LDR {dr}, {br}, {off}"),
            SimInstr::STR(sr, br, off)  => write!(f, "STR {sr}, {br}, {off}"),
            SimInstr::NOT(dr, sr)       => write!(f, "NOT {dr}, {sr}"),
            SimInstr::LDI(dr, off)      => write!(f, "LDI {dr}, {off}"),
            SimInstr::STI(sr, off)      => write!(f, "STI {sr}, {off}"),
            SimInstr::JMP(br) if *br == R7 => f.write_str("RET"),
            SimInstr::JMP(br)           => write!(f, "JMP {br}"),
            SimInstr::LEA(dr, off)      => write!(f, "LEA {dr}, {off}"),
            SimInstr::TRAP(vect)        => write!(f, "TRAP x{vect:02X}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::reg_consts::{R0, R1, R2, R5, R6, R7};
    use crate::ast::{IOffset, ImmOrReg};
    use crate::sim::SimErr;

    use super::{InstrBits, SimInstr};

    fn off<const N: u32>(n: i16) -> IOffset<N> {
        IOffset::new(n).unwrap()
    }

    #[test]
    fn test_field_accessors() {
        // STR R5, R6, #-32
        let bits = InstrBits::new(0b0111_101_110_100000);
        assert_eq!(bits.opcode(), 0b0111);
        assert_eq!(bits.dest(), R5);
        assert_eq!(bits.base(), R6);
        assert_eq!(bits.offset6().get(), -32);

        // ADD R2, R1, R7
        let bits = InstrBits::new(0b0001_010_001_0_00_111);
        assert!(!bits.imm_mode());
        assert_eq!(bits.src2(), R7);

        // BRnp #-1
        let bits = InstrBits::new(0b0000_101_111111111);
        assert_eq!(bits.cond(), 0b101);
        assert_eq!(bits.offset9().get(), -1);

        // JSR #1023
        let bits = InstrBits::new(0b0100_1_01111111111);
        assert!(bits.long_mode());
        assert_eq!(bits.offset11().get(), 1023);

        assert_eq!(InstrBits::new(0xF023).trapvect8(), 0x23);
    }

    #[test]
    fn test_decode_table() {
        let cases = [
            (0x0E03, SimInstr::BR(0b111, off(3))),
            (0x1261, SimInstr::ADD(R1, R1, ImmOrReg::Imm(off(1)))),
            (0x1042, SimInstr::ADD(R0, R1, ImmOrReg::Reg(R2))),
            (0x21FF, SimInstr::LD(R0, off(-1))),
            (0x3002, SimInstr::ST(R0, off(2))),
            (0x4FFF, SimInstr::JSR(ImmOrReg::Imm(off(-1)))),
            (0x4080, SimInstr::JSR(ImmOrReg::Reg(R2))),
            (0x5020, SimInstr::AND(R0, R0, ImmOrReg::Imm(off(0)))),
            (0x6281, SimInstr::LDR(R1, R2, off(1))),
            (0x7BBF, SimInstr::STR(R5, R6, off(-1))),
            (0x907F, SimInstr::NOT(R0, R1)),
            (0xA004, SimInstr::LDI(R0, off(4))),
            (0xB1FE, SimInstr::STI(R0, off(-2))),
            (0xC1C0, SimInstr::JMP(R7)),
            (0xE002, SimInstr::LEA(R0, off(2))),
            (0xF022, SimInstr::TRAP(0x22)),
        ];

        for (word, instr) in cases {
            assert_eq!(SimInstr::decode(word).unwrap(), instr, "decoding {word:#06X}");
            assert_eq!(instr.encode(), word, "encoding {instr}");
        }
    }

    #[test]
    fn test_decode_reserved() {
        for opcode in SimInstr::RESERVED_OPCODES {
            let word = u16::from(opcode) << 12 | 0x0ABC;
            assert!(matches!(SimInstr::decode(word), Err(SimErr::IllegalOpcode(w)) if w == word));
        }
    }

    #[test]
    fn test_decode_every_word() {
        // Every word either decodes to an instruction with its opcode or is reserved.
        for word in 0..=u16::MAX {
            let opcode = (word >> 12) as u8;
            match SimInstr::decode(word) {
                Ok(instr) => assert_eq!(instr.opcode(), opcode),
                Err(_)    => assert!(SimInstr::RESERVED_OPCODES.contains(&opcode)),
            }
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(SimInstr::decode(0x0A03).unwrap().to_string(), "BRnp #3");
        assert_eq!(SimInstr::decode(0x0E03).unwrap().to_string(), "BRnzp #3");
        assert_eq!(SimInstr::decode(0x0003).unwrap().to_string(), "NOP");
        assert_eq!(SimInstr::decode(0x107F).unwrap().to_string(), "ADD R0, R1, #-1");
        assert_eq!(SimInstr::decode(0xC1C0).unwrap().to_string(), "RET");
        assert_eq!(SimInstr::decode(0x4080).unwrap().to_string(), "JSRR R2");
        assert_eq!(SimInstr::decode(0xF025).unwrap().to_string(), "TRAP x25");
    }
}
