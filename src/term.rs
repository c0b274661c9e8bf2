//! Terminal handling for the `lc3-vm` binary.
//!
//! While a program runs, the terminal is switched to raw mode so that
//! key presses reach the simulator immediately and without echo.
//! Raw mode also turns off the terminal's newline translation,
//! so everything written while it is on passes through [`CrlfWriter`].

use std::io::{self, IsTerminal, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use lc3_vm::sim::io::{ChannelConsole, Stop};
use lc3_vm::sim::MCR;

/// Whether the terminal is currently in raw mode.
static RAW_MODE: AtomicBool = AtomicBool::new(false);

/// The byte a terminal sends for Ctrl-C while in raw mode.
const CTRL_C: u8 = 0x03;

/// Keeps the terminal in raw mode until dropped.
pub struct RawModeGuard {
    enabled: bool
}
impl RawModeGuard {
    /// Switches the terminal to raw mode.
    ///
    /// If stdin is not a terminal (e.g., input is piped), nothing is changed.
    pub fn enable() -> io::Result<Self> {
        if !io::stdin().is_terminal() {
            tracing::warn!("stdin is not a terminal, leaving terminal mode unchanged");
            return Ok(Self { enabled: false });
        }

        crossterm::terminal::enable_raw_mode()?;
        RAW_MODE.store(true, Ordering::Relaxed);
        Ok(Self { enabled: true })
    }
}
impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if !self.enabled { return };

        RAW_MODE.store(false, Ordering::Relaxed);
        if let Err(e) = crossterm::terminal::disable_raw_mode() {
            tracing::warn!("failed to restore terminal mode: {e}");
        }
    }
}

/// A writer which converts `\n` into `\r\n` while the terminal is in raw mode.
pub struct CrlfWriter<W>(pub W);
impl<W: Write> Write for CrlfWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !RAW_MODE.load(Ordering::Relaxed) {
            return self.0.write(buf);
        }

        for chunk in buf.split_inclusive(|&b| b == b'\n') {
            match chunk.strip_suffix(b"\n") {
                Some(line) => {
                    self.0.write_all(line)?;
                    self.0.write_all(b"\r\n")?;
                },
                None => self.0.write_all(chunk)?,
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

/// Creates the console for the process's stdin and stdout.
///
/// When Ctrl-C is read in raw mode, `interrupted` is set,
/// the simulator is stopped through `mcr`, and input is closed.
pub fn stdin_console(mcr: MCR, interrupted: Arc<AtomicBool>) -> ChannelConsole<CrlfWriter<io::Stdout>> {
    let mut stdin = io::stdin();

    let reader = move || loop {
        let mut byte = [0];
        match stdin.read(&mut byte) {
            Ok(0) => return Err(Stop),
            Ok(_) if byte[0] == CTRL_C && RAW_MODE.load(Ordering::Relaxed) => {
                interrupted.store(true, Ordering::Relaxed);
                mcr.store(false, Ordering::Relaxed);
                return Err(Stop);
            },
            Ok(_) => return Ok(byte[0]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                tracing::warn!("failed to read from stdin: {e}");
                return Err(Stop);
            },
        }
    };

    ChannelConsole::new(reader, CrlfWriter(io::stdout()))
}
