//! The built-in system calls, dispatched by `TRAP`.
//!
//! | vector | name    | effect |
//! |--------|---------|--------|
//! | `x20`  | `GETC`  | read a character into `R0` (no echo) |
//! | `x21`  | `OUT`   | write the low byte of `R0` |
//! | `x22`  | `PUTS`  | write the string at `R0`, one character per word |
//! | `x23`  | `IN`    | prompt, read a character into `R0`, and echo it |
//! | `x24`  | `PUTSP` | write the string at `R0`, two characters per word |
//! | `x25`  | `HALT`  | stop the simulator |

use crate::ast::reg_consts::R0;

use super::{SimErr, Simulator, StepBreak};

macro_rules! int_vect {
    ($(#[$m:meta])* $Type:ident, {$($(#[$vm:meta])* $name:ident = $value:literal),+}) => {
        $(#[$m])*
        #[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
        pub enum $Type {
            $($(#[$vm])* $name = $value),+
        }
        impl TryFrom<u8> for $Type {
            type Error = ();

            fn try_from(value: u8) -> Result<Self, Self::Error> {
                match value {
                    $($value => Ok(Self::$name)),+,
                    _ => Err(())
                }
            }
        }
    }
}
int_vect!(
    /// The trap vectors with a built-in implementation.
    TrapCode, {
    /// `x20`
    Getc = 0x20,
    /// `x21`
    Out = 0x21,
    /// `x22`
    Puts = 0x22,
    /// `x23`
    In = 0x23,
    /// `x24`
    Putsp = 0x24,
    /// `x25`
    Halt = 0x25
});

const IN_PROMPT: &[u8] = b"Enter a character: ";

impl Simulator {
    /// Runs the trap with the given vector.
    ///
    /// `R7` is expected to already hold the return address.
    pub(super) fn handle_trap(&mut self, vect: u8) -> Result<(), StepBreak> {
        let Ok(code) = TrapCode::try_from(vect) else {
            if self.flags.strict_traps {
                return Err(SimErr::UnknownTrap(vect).into());
            }
            tracing::warn!("ignoring unknown trap x{vect:02X} at x{:04X}", self.prefetch_pc());
            return Ok(());
        };

        match code {
            TrapCode::Getc => {
                let ch = self.console.read_char().ok_or(SimErr::InputClosed)?;
                self.set_r0(ch);
            },
            TrapCode::Out => {
                self.console.write_char(self.reg_file[R0] as u8);
                self.console.flush();
            },
            TrapCode::Puts => {
                let string: Vec<_> = self.string_words(self.reg_file[R0])
                    .take_while(|&w| w != 0)
                    .map(|w| w as u8)
                    .collect();
                self.write_bytes(&string);
            },
            TrapCode::In => {
                self.write_bytes(IN_PROMPT);
                let ch = self.console.read_char().ok_or(SimErr::InputClosed)?;
                self.write_bytes(&[ch]);
                self.set_r0(ch);
            },
            TrapCode::Putsp => {
                let string: Vec<_> = self.string_words(self.reg_file[R0])
                    .take_while(|&w| w & 0xFF != 0)
                    .flat_map(|w| {
                        let [lo, hi] = w.to_le_bytes();
                        [Some(lo), (hi != 0).then_some(hi)]
                    })
                    .flatten()
                    .collect();
                self.write_bytes(&string);
            },
            TrapCode::Halt => {
                self.console.flush();
                tracing::info!("HALT");
                return Err(StepBreak::Halt);
            },
        }

        Ok(())
    }

    /// Iterates over memory starting at `start`.
    ///
    /// Strings without a terminator end after one lap of memory.
    fn string_words(&self, start: u16) -> impl Iterator<Item = u16> + '_ {
        (0..=u16::MAX).map(move |i| self.mem[start.wrapping_add(i)])
    }

    fn write_bytes(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.console.write_char(b);
        }
        self.console.flush();
    }

    fn set_r0(&mut self, ch: u8) {
        self.reg_file[R0] = u16::from(ch);
        self.reg_file.update_flags(R0);
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::reg_consts::{R0, R7};
    use crate::image::ProgramImage;
    use crate::sim::io::BufferedConsole;
    use crate::sim::mem::{Cond, MachineInitStrategy};
    use crate::sim::{SimFlags, Simulator};

    use super::TrapCode;

    fn run_with_input(words: &[u16], input: &[u8]) -> (Simulator, Vec<u8>) {
        let mut sim = Simulator::new(Default::default());
        sim.load_image(&ProgramImage::new(0x3000, words.to_vec()));

        let console = BufferedConsole::new();
        console.get_input().write().unwrap().extend(input);
        sim.set_console(console.clone());

        sim.run().unwrap();
        assert!(sim.hit_halt());

        let output = console.get_output().read().unwrap().clone();
        (sim, output)
    }

    #[test]
    fn test_trap_codes() {
        assert_eq!(TrapCode::try_from(0x20), Ok(TrapCode::Getc));
        assert_eq!(TrapCode::try_from(0x25), Ok(TrapCode::Halt));
        assert_eq!(TrapCode::try_from(0x26), Err(()));
        assert_eq!(TrapCode::try_from(0x00), Err(()));
    }

    #[test]
    fn test_getc() {
        let (sim, output) = run_with_input(&[0xF020, 0xF025], b"q");
        assert_eq!(sim.reg_file[R0], u16::from(b'q'));
        assert_eq!(sim.reg_file.cond(), Cond::Positive);
        assert_eq!(output, b"");
    }

    #[test]
    fn test_out() {
        let mut sim = Simulator::new(Default::default());
        sim.load_image(&ProgramImage::new(0x3000, vec![0xF021, 0xF025]));
        sim.reg_file[R0] = 0x1241; // only the low byte is written
        sim.reg_file.set_cond(Cond::Negative);

        let console = BufferedConsole::new();
        sim.set_console(console.clone());
        sim.run().unwrap();

        assert_eq!(&**console.get_output().read().unwrap(), b"A");
        assert_eq!(sim.reg_file[R0], 0x1241);
        assert_eq!(sim.reg_file.cond(), Cond::Negative);
        assert_eq!(sim.reg_file[R7], 0x3002);
    }

    #[test]
    fn test_in() {
        let (sim, output) = run_with_input(&[0xF023, 0xF025], b"x");
        assert_eq!(sim.reg_file[R0], u16::from(b'x'));
        assert_eq!(output, b"Enter a character: x");
    }

    #[test]
    fn test_puts() {
        let (_, output) = run_with_input(&[
            0xE002, // LEA R0, #2
            0xF022, // PUTS
            0xF025, // HALT
            0x0168, // only the low byte is written
            0x0069,
            0x0000,
            0x0021,
        ], b"");
        assert_eq!(output, b"hi");
    }

    #[test]
    fn test_putsp() {
        let (_, output) = run_with_input(&[
            0xE002, // LEA R0, #2
            0xF024, // PUTSP
            0xF025, // HALT
            0x6548, // "He"
            0x6C6C, // "ll"
            0x006F, // "o"
            0x0000,
        ], b"");
        assert_eq!(output, b"Hello");
    }

    #[test]
    fn test_puts_unterminated() {
        // every word is nonzero, so there is no terminator anywhere
        let mut sim = Simulator::new(SimFlags {
            machine_init: MachineInitStrategy::Known { value: 1 },
            ..Default::default()
        });
        sim.load_image(&ProgramImage::new(0x3000, vec![0xF022, 0xF025]));
        sim.reg_file[R0] = 0x3000;

        let console = BufferedConsole::new();
        sim.set_console(console.clone());
        sim.run().unwrap();

        assert_eq!(console.get_output().read().unwrap().len(), 1 << 16);
    }
}
