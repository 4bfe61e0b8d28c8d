#![no_std]

#[cfg(feature = "alloc")]
extern crate alloc;

mod data;
mod define;
mod header;
mod node;
mod property;
mod table;
mod tree;

use core::ffi::FromBytesUntilNulError;

pub use define::{Phandle, FDT_MAGIC};
pub use header::Header;
pub use node::{ChildIter, NodeRef, NodeStat, PropIter};
pub use property::{Property, StringsIter};
pub use table::{STATIC_NODE_CAPACITY, STATIC_PROP_CAPACITY};
pub use tree::{AllNodesIter, CompatibleIter, DtbTree};

#[derive(thiserror::Error, Debug, Clone)]
pub enum FdtError {
    /// The blob is shorter than a read at `pos` requires.
    #[error("buffer too small at position {pos}")]
    BufferTooSmall { pos: usize },
    #[error("invalid magic number {0:#x} != {FDT_MAGIC:#x}")]
    InvalidMagic(u32),
    #[error("invalid pointer")]
    InvalidPtr,
    /// A node's token stream ran out before its END_NODE.
    #[error("node has no terminating tag")]
    UnterminatedNode,
    /// A table filled up. In dynamic mode this means the blob is corrupt
    /// (the pre-scan counts are upper bounds); in static mode the
    /// compile-time capacities are too small for this blob.
    #[error("node or property table exhausted")]
    NoMemory,
    #[error("data provided does not contain a nul")]
    FromBytesUntilNull,
    #[error("failed to parse UTF-8 string")]
    Utf8Parse,
}

impl From<core::str::Utf8Error> for FdtError {
    fn from(_: core::str::Utf8Error) -> Self {
        FdtError::Utf8Parse
    }
}
impl From<FromBytesUntilNulError> for FdtError {
    fn from(_: FromBytesUntilNulError) -> Self {
        FdtError::FromBytesUntilNull
    }
}
