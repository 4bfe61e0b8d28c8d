//! FDT header parsing.
//!
//! Every device tree blob begins with a fixed 40-byte header holding
//! metadata about the layout and version of the FDT. All fields are
//! stored big-endian and converted to host order when parsed.

use crate::{FdtError, FDT_MAGIC};

/// The FDT header structure.
#[derive(Debug, Clone)]
pub struct Header {
    /// FDT header magic number (must be 0xd00dfeed)
    pub magic: u32,
    /// Total size in bytes of the FDT structure
    pub totalsize: u32,
    /// Offset in bytes from the start of the header to the structure block
    pub off_dt_struct: u32,
    /// Offset in bytes from the start of the header to the strings block
    pub off_dt_strings: u32,
    /// Offset in bytes from the start of the header to the memory reservation block
    pub off_mem_rsvmap: u32,
    /// FDT version number
    pub version: u32,
    /// Last compatible FDT version
    pub last_comp_version: u32,
    /// Physical ID of the boot CPU
    pub boot_cpuid_phys: u32,
    /// Length in bytes of the strings block
    pub size_dt_strings: u32,
    /// Length in bytes of the structure block
    pub size_dt_struct: u32,
}

impl Header {
    /// Size in bytes of the on-disk header.
    pub const SIZE: usize = 40;

    /// Read a header from the beginning of a byte slice.
    ///
    /// Validates the magic number and converts all fields from big-endian
    /// to host order.
    ///
    /// # Errors
    ///
    /// Returns `FdtError::BufferTooSmall` if the slice is too small to
    /// contain a complete header, or `FdtError::InvalidMagic` if the magic
    /// number doesn't match the expected value.
    pub fn from_bytes(data: &[u8]) -> Result<Self, FdtError> {
        if data.len() < Self::SIZE {
            return Err(FdtError::BufferTooSmall { pos: Self::SIZE });
        }

        // All header reads funnel through one big-endian conversion point;
        // the header is never reinterpreted through a pointer cast.
        let field = |index: usize| {
            let at = index * 4;
            u32::from_be_bytes(data[at..at + 4].try_into().unwrap())
        };

        let magic = field(0);
        if magic != FDT_MAGIC {
            return Err(FdtError::InvalidMagic(magic));
        }

        Ok(Header {
            magic,
            totalsize: field(1),
            off_dt_struct: field(2),
            off_dt_strings: field(3),
            off_mem_rsvmap: field(4),
            version: field(5),
            last_comp_version: field(6),
            boot_cpuid_phys: field(7),
            size_dt_strings: field(8),
            size_dt_struct: field(9),
        })
    }
}
