//! A virtual machine for the LC-3 instruction set.
//!
//! This crate loads LC-3 program images and executes them,
//! with console IO through the keyboard registers and the built-in trap routines.
//!
//! # Usage
//!
//! A program image is a list of big-endian words, where the first word is the origin.
//! It can be read from a file with [`image::ProgramImage::open`] or parsed from bytes:
//! ```
//! use lc3_vm::image::ProgramImage;
//!
//! let bytes = [
//!     0x30, 0x00, // .orig x3000
//!     0x50, 0x20, // AND R0, R0, #0
//!     0x10, 0x27, // ADD R0, R0, #7
//!     0xF0, 0x25, // HALT
//! ];
//! let image = ProgramImage::from_bytes(&bytes).unwrap();
//! assert_eq!(image.origin, 0x3000);
//! ```
//!
//! Once an image has been read, it can be executed with the simulator:
//! ```
//! # use lc3_vm::image::ProgramImage;
//! # let image = ProgramImage::new(0x3000, vec![0x5020, 0x1027, 0xF025]);
//! use lc3_vm::sim::Simulator;
//! use lc3_vm::ast::reg_consts::R0;
//!
//! let mut simulator = Simulator::new(Default::default());
//! simulator.load_image(&image);
//! simulator.run().unwrap(); // <-- Result can be handled accordingly
//! assert_eq!(simulator.reg_file[R0], 7);
//! ```
//!
//! If more granularity is needed for simulation, there are also step-in and bounded run functions.
//! See the [`sim`] module for more details.
#![warn(missing_docs)]

pub mod ast;
pub mod image;
pub mod sim;
