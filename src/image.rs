//! Program images.
//!
//! A program image is a stream of big-endian 16-bit words.
//! The first word is the origin (the address the program loads at),
//! and every word after it is stored contiguously starting at the origin.
//!
//! ```text
//! 30 00 | E0 02 | F0 22 | F0 25 | 00 48 | 00 49 | 00 00
//! ~~~~~
//! origin  mem[x3000..]
//! ```
//!
//! There is no header, checksum or length field. The end of the stream ends the image.
//!
//! Images are parsed into a [`ProgramImage`], which can then be loaded with [`Simulator::load_image`].
//!
//! [`Simulator::load_image`]: crate::sim::Simulator::load_image

use std::io::Read;
use std::path::{Path, PathBuf};

/// Errors that can occur while reading a program image.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// The image could not be opened or read.
    #[error("failed to read image{}", describe(.path))]
    Io {
        /// The image's file, if it came from one.
        path: Option<PathBuf>,
        /// The underlying IO error.
        #[source]
        source: std::io::Error
    },
    /// The image was too short to hold an origin word.
    #[error("image{} is missing its origin word", describe(.path))]
    Empty {
        /// The image's file, if it came from one.
        path: Option<PathBuf>
    },
}
impl LoadError {
    fn with_path(self, p: &Path) -> Self {
        match self {
            LoadError::Io { source, .. } => LoadError::Io { path: Some(p.to_path_buf()), source },
            LoadError::Empty { .. }      => LoadError::Empty { path: Some(p.to_path_buf()) },
        }
    }
}

fn describe(path: &Option<PathBuf>) -> String {
    match path {
        Some(p) => format!(" {}", p.display()),
        None    => String::new(),
    }
}

/// A parsed program image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramImage {
    /// The address the first word of `words` is loaded to.
    pub origin: u16,
    /// The contents of the image, in host order.
    pub words: Vec<u16>
}

impl ProgramImage {
    /// Creates an image from its origin and words.
    pub fn new(origin: u16, words: Vec<u16>) -> Self {
        Self { origin, words }
    }

    /// Reads an image from a byte source until the source ends.
    ///
    /// A trailing odd byte is not a full word and is ignored.
    ///
    /// ```
    /// use lc3_vm::image::ProgramImage;
    ///
    /// let bytes: &[u8] = &[0x30, 0x00, 0x12, 0x34, 0x56, 0x78];
    /// let image = ProgramImage::read_from(bytes).unwrap();
    /// assert_eq!(image.origin, 0x3000);
    /// assert_eq!(image.words, [0x1234, 0x5678]);
    /// ```
    pub fn read_from(mut src: impl Read) -> Result<Self, LoadError> {
        let mut bytes = vec![];
        src.read_to_end(&mut bytes)
            .map_err(|source| LoadError::Io { path: None, source })?;

        Self::from_bytes(&bytes)
    }

    /// Parses an image from its bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, LoadError> {
        let mut chunks = bytes.chunks_exact(2);
        let words: Vec<_> = chunks.by_ref()
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();

        if !chunks.remainder().is_empty() {
            tracing::warn!("image has a trailing odd byte, ignoring it");
        }

        let Some((&origin, rest)) = words.split_first() else {
            return Err(LoadError::Empty { path: None });
        };
        Ok(Self::new(origin, rest.to_vec()))
    }

    /// Reads an image from a file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .map_err(|source| LoadError::Io { path: Some(path.to_path_buf()), source })?;

        Self::read_from(std::io::BufReader::new(file))
            .map_err(|e| e.with_path(path))
    }

    /// Converts the image back into its big-endian byte form.
    pub fn to_bytes(&self) -> Vec<u8> {
        std::iter::once(self.origin)
            .chain(self.words.iter().copied())
            .flat_map(u16::to_be_bytes)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::{LoadError, ProgramImage};

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("lc3-vm-{}-{name}", std::process::id()))
    }

    #[test]
    fn test_parse_big_endian() {
        let image = ProgramImage::from_bytes(&[0x30, 0x00, 0x12, 0x34, 0x56, 0x78]).unwrap();
        assert_eq!(image, ProgramImage::new(0x3000, vec![0x1234, 0x5678]));
        assert_eq!(image.to_bytes(), [0x30, 0x00, 0x12, 0x34, 0x56, 0x78]);
    }

    #[test]
    fn test_origin_only() {
        let image = ProgramImage::from_bytes(&[0x40, 0x00]).unwrap();
        assert_eq!(image.origin, 0x4000);
        assert!(image.words.is_empty());
    }

    #[test]
    fn test_odd_trailing_byte() {
        let image = ProgramImage::from_bytes(&[0x30, 0x00, 0xAB, 0xCD, 0xEF]).unwrap();
        assert_eq!(image.words, [0xABCD]);
    }

    #[test]
    fn test_empty_image() {
        assert!(matches!(ProgramImage::from_bytes(&[]), Err(LoadError::Empty { path: None })));
        assert!(matches!(ProgramImage::from_bytes(&[0x30]), Err(LoadError::Empty { .. })));
    }

    #[test]
    fn test_open_file() {
        let path = temp_path("open.obj");
        std::fs::write(&path, b"\x30\x00\xF0\x25").unwrap();

        let image = ProgramImage::open(&path);
        std::fs::remove_file(&path).unwrap();
        assert_eq!(image.unwrap(), ProgramImage::new(0x3000, vec![0xF025]));
    }

    #[test]
    fn test_open_errors() {
        let missing = temp_path("does-not-exist.obj");
        let err = ProgramImage::open(&missing).unwrap_err();
        assert!(matches!(&err, LoadError::Io { path: Some(p), .. } if *p == missing));
        assert!(err.to_string().contains("does-not-exist.obj"));

        // The IO error is only reported as the source, not repeated in the message.
        let source = std::error::Error::source(&err).map(ToString::to_string).unwrap();
        assert!(!err.to_string().contains(&source));

        let empty = temp_path("empty.obj");
        std::fs::write(&empty, b"").unwrap();
        let err = ProgramImage::open(&empty).unwrap_err();
        std::fs::remove_file(&empty).unwrap();
        assert!(matches!(&err, LoadError::Empty { path: Some(p) } if *p == empty));
    }
}
