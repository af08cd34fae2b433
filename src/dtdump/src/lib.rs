//! Decoding and fixed-column dumping of x86 descriptor tables (IDT and GDT).
//!
//! The crate is `no_std` and allocation-free: tables are read from caller-provided byte
//! regions, and each rendered line is handed to a [`Sink`] as soon as it is formatted.

#![cfg_attr(not(test), no_std)]
#![forbid(clippy::inline_asm_x86_att_syntax)]
#![deny(clippy::debug_assert_with_mut_call, clippy::as_conversions)]
#![warn(
    clippy::pedantic,
    clippy::undocumented_unsafe_blocks,
    clippy::semicolon_inside_block,
    clippy::semicolon_if_nothing_returned,
    unsafe_op_in_unsafe_fn
)]
#![allow(
    clippy::enum_glob_use,
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::unreadable_literal,
    clippy::missing_const_for_fn,
    clippy::missing_panics_doc
)]

mod descriptor;
mod dump;
mod error;
mod format;
mod params;
mod reader;
mod sink;

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
mod registers;

#[macro_use]
extern crate bitflags;

#[macro_use]
extern crate log;

#[macro_use]
extern crate num_enum;

#[macro_use]
extern crate thiserror;

pub use descriptor::{
    DecodedEntry, Granularity, Mode, OperandSize, PrivilegeLevel, RawEntry, SegmentAccess,
    SegmentDescriptor, SegmentKind, SystemDescriptor, SystemKind, TableKind,
};
pub use dump::{DumpSummary, TableDescriptor, dump_gdt, dump_idt};
pub use error::Error;
pub use format::{Formatter, RECORD_CAPACITY, Record};
pub use params::Parameters;
pub use reader::{read, read_raw};
pub use sink::{FmtSink, LogSink, Sink};

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
pub use registers::{DescriptorTablePointer, dump_current_gdt, dump_current_idt};
