//! # syslift
//!
//! A pipeline for turning Windows kernel driver binaries (PE/COFF `.sys`
//! images) into portable driver modules for a bare-metal Forth interpreter.
//!
//! A driver binary interleaves two concerns: conversations with the host
//! kernel (IRPs, plug-and-play, power, synchronization, registry) and
//! conversations with the hardware (port I/O, MMIO, busy-wait timing, PCI
//! configuration, DMA). Only the latter is portable; the former is
//! scaffolding for a kernel that no longer exists on the target. The
//! pipeline separates the two and re-expresses the hardware half as a
//! textual Forth vocabulary:
//!
//! ```text
//! raw bytes -> PE image -> instructions -> basic blocks -> classified
//! functions -> Forth module
//! ```
//!
//! Each stage owns one intermediate form and consumes only the form of its
//! predecessor:
//!
//! - [`pe`] parses the PE32/PE32+ container, borrowing the input buffer;
//! - [`decode`] decodes the executable section's x86-32 byte stream;
//! - [`uir`] lifts decoded instructions into basic blocks of a small
//!   platform-neutral IR and summarizes port activity;
//! - [`classify`] tags imports and functions as hardware or scaffolding
//!   against a fixed API recognition catalogue;
//! - [`forth`] renders the surviving functions as a driver module with a
//!   line-oriented metadata header.
//!
//! # Example
//!
//! ```no_run
//! use syslift::{decode, pe, uir};
//!
//! let bytes = std::fs::read("i8042prt.sys")?;
//! let image = pe::PE::parse(&bytes)?;
//! let text = image.text.expect("driver has no code section");
//! let base = image.image_base as u32 + text.rva;
//! let insts = decode::decode_range(text.bytes, base)?;
//! let func = uir::lift(&insts, image.image_base as u32 + image.entry);
//! println!("{}", func.dump());
//! # Ok::<(), syslift::Error>(())
//! ```

pub mod classify;
pub mod decode;
pub mod error;
pub mod forth;
pub mod pe;
pub mod uir;

pub use crate::error::{Error, Result};
