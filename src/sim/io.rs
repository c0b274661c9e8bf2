//! Console IO for the LC-3 simulator.
//!
//! The simulator talks to its console through the [`ConsoleIO`] trait.
//! It is used by the keyboard status register (`KBSR`) poll and by the IO traps.
//!
//! Besides the trait, this module also includes:
//! - [`NullConsole`]: A console which never has input and discards output.
//! - [`BufferedConsole`]: A console that reads from an input buffer and writes to an output buffer.
//! - [`ChannelConsole`]: A console that receives input from a reader thread and writes to any [`Write`]r.

use std::collections::VecDeque;
use std::io::Write;
use std::sync::{Arc, RwLock, RwLockWriteGuard, TryLockError};

use crossbeam_channel as cbc;

/// A character console that the simulator reads keys from and writes characters to.
pub trait ConsoleIO {
    /// Checks whether a character can be read without blocking.
    fn poll_input(&mut self) -> bool;

    /// Reads one character, blocking until one is available.
    ///
    /// This returns `None` if no more input will ever arrive.
    fn read_char(&mut self) -> Option<u8>;

    /// Writes one character.
    fn write_char(&mut self, byte: u8);

    /// Flushes any written characters.
    fn flush(&mut self) {}
}
impl dyn ConsoleIO {} // assert ConsoleIO is dyn safe

/// No console. Input is never ready and output is discarded.
///
/// If an input trap (`GETC`, `IN`) is executed with this console,
/// the simulator stops with [`SimErr::InputClosed`].
///
/// [`SimErr::InputClosed`]: super::SimErr::InputClosed
#[derive(Debug, Default, Clone, Copy)]
pub struct NullConsole;
impl ConsoleIO for NullConsole {
    fn poll_input(&mut self) -> bool {
        false
    }

    fn read_char(&mut self) -> Option<u8> {
        None
    }

    fn write_char(&mut self, _byte: u8) {}
}

/// Console that reads from an input buffer and writes to an output buffer.
///
/// The buffers can be accessed in code via [`BufferedConsole::get_input`] and [`BufferedConsole::get_output`].
/// Cloning the console shares the buffers.
///
/// Note that if a lock guard is acquired from one of these buffers,
/// the buffer becomes temporarily inaccessible to the simulator
/// (input reads as empty and output is dropped).
///
/// ```
/// use lc3_vm::sim::io::{BufferedConsole, ConsoleIO};
///
/// let mut console = BufferedConsole::new();
/// console.get_input().write().unwrap().extend(b"hi");
///
/// assert!(console.poll_input());
/// assert_eq!(console.read_char(), Some(b'h'));
/// console.write_char(b'!');
/// assert_eq!(&*console.get_output().read().unwrap(), b"!");
/// ```
#[derive(Debug, Default, Clone)]
pub struct BufferedConsole {
    input: Arc<RwLock<VecDeque<u8>>>,
    output: Arc<RwLock<Vec<u8>>>
}
impl BufferedConsole {
    /// Creates a new console with empty buffers.
    pub fn new() -> Self {
        Self::default()
    }

    fn try_input(&self) -> Option<RwLockWriteGuard<'_, VecDeque<u8>>> {
        match self.input.try_write() {
            Ok(g) => Some(g),
            Err(TryLockError::Poisoned(e)) => Some(e.into_inner()),
            Err(TryLockError::WouldBlock) => None,
        }
    }
    fn try_output(&self) -> Option<RwLockWriteGuard<'_, Vec<u8>>> {
        match self.output.try_write() {
            Ok(g) => Some(g),
            Err(TryLockError::Poisoned(e)) => Some(e.into_inner()),
            Err(TryLockError::WouldBlock) => None,
        }
    }

    /// Gets a reference to the input buffer.
    pub fn get_input(&self) -> &Arc<RwLock<VecDeque<u8>>> {
        &self.input
    }
    /// Gets a reference to the output buffer.
    pub fn get_output(&self) -> &Arc<RwLock<Vec<u8>>> {
        &self.output
    }
}
impl ConsoleIO for BufferedConsole {
    fn poll_input(&mut self) -> bool {
        self.try_input().is_some_and(|inp| !inp.is_empty())
    }

    /// Takes the next character of the input buffer.
    ///
    /// A buffer cannot be refilled while the simulator is blocked on it,
    /// so an empty buffer counts as closed input.
    fn read_char(&mut self) -> Option<u8> {
        self.try_input()?.pop_front()
    }

    fn write_char(&mut self, byte: u8) {
        if let Some(mut out) = self.try_output() {
            out.push(byte);
        }
    }
}

/// A helper struct for [`ChannelConsole::new`],
/// indicating the reader is closed and no more input will come from it.
#[derive(Clone, Copy, Default, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Stop;

/// A console that receives input from a reader thread.
///
/// The reader function runs on its own thread and forwards every byte it produces
/// through a channel. Polling only checks whether the channel has a byte queued,
/// so it never blocks. Output is written to the provided writer.
pub struct ChannelConsole<W> {
    input: cbc::Receiver<u8>,
    output: W
}
impl<W: Write> ChannelConsole<W> {
    /// Creates a new console with the given reader and writer.
    ///
    /// The reader function is called repeatedly on a separate thread.
    /// It should block until a byte is ready, or return `Stop`
    /// if there are no more bytes to read. After `Stop`, [`ConsoleIO::read_char`]
    /// returns `None` once the already received bytes are consumed.
    ///
    /// The reader thread keeps reading even when the simulator is not asking for input,
    /// so bytes queue up until the program reads them.
    pub fn new(mut reader: impl FnMut() -> Result<u8, Stop> + Send + 'static, output: W) -> Self {
        let (read_tx, read_rx) = cbc::unbounded();

        std::thread::spawn(move || loop {
            let Ok(byte) = reader() else { return };
            let Ok(()) = read_tx.send(byte) else { return };
        });

        Self { input: read_rx, output }
    }
}
impl<W: Write> ConsoleIO for ChannelConsole<W> {
    fn poll_input(&mut self) -> bool {
        !self.input.is_empty()
    }

    fn read_char(&mut self) -> Option<u8> {
        self.input.recv().ok()
    }

    fn write_char(&mut self, byte: u8) {
        if let Err(e) = self.output.write_all(&[byte]) {
            tracing::warn!("failed to write console output: {e}");
        }
    }

    fn flush(&mut self) {
        if let Err(e) = self.output.flush() {
            tracing::warn!("failed to flush console output: {e}");
        }
    }
}
impl<W> std::fmt::Debug for ChannelConsole<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelConsole")
            .field("queued", &self.input.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::{BufferedConsole, ChannelConsole, ConsoleIO, NullConsole, Stop};

    #[test]
    fn test_null_console() {
        let mut console = NullConsole;
        assert!(!console.poll_input());
        assert_eq!(console.read_char(), None);
        console.write_char(b'x');
    }

    #[test]
    fn test_buffered_console_shares_buffers() {
        let console = BufferedConsole::new();
        let mut handle = console.clone();

        console.get_input().write().unwrap().extend(b"ab");
        assert!(handle.poll_input());
        assert_eq!(handle.read_char(), Some(b'a'));
        assert_eq!(handle.read_char(), Some(b'b'));
        assert!(!handle.poll_input());
        assert_eq!(handle.read_char(), None);

        handle.write_char(b'o');
        handle.write_char(b'k');
        assert_eq!(&*console.get_output().read().unwrap(), b"ok");
    }

    #[test]
    fn test_buffered_console_locked() {
        let mut console = BufferedConsole::new();
        console.get_input().write().unwrap().push_back(b'z');

        let input = console.get_input().clone();
        let guard = input.write().unwrap();
        assert!(!console.poll_input());
        drop(guard);
        assert!(console.poll_input());
    }

    #[test]
    fn test_channel_console() {
        let mut bytes = b"hey".to_vec().into_iter();
        let mut console = ChannelConsole::new(move || bytes.next().ok_or(Stop), Vec::new());

        // The reader thread fills the channel in the background.
        let deadline = Instant::now() + Duration::from_secs(5);
        while !console.poll_input() && Instant::now() < deadline {
            std::thread::yield_now();
        }
        assert!(console.poll_input());

        assert_eq!(console.read_char(), Some(b'h'));
        assert_eq!(console.read_char(), Some(b'e'));
        assert_eq!(console.read_char(), Some(b'y'));
        assert_eq!(console.read_char(), None);

        console.write_char(b'!');
        console.flush();
        assert_eq!(console.output, b"!");
    }
}
