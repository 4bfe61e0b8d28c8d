//! Fixed-capacity record tables.
//!
//! All nodes and properties live in tables whose capacities are fixed
//! before parsing begins, from the pre-scan token counts. Records are
//! cross-linked by slot index rather than by reference, which keeps the
//! tree trivially relocatable and free of aliasing concerns.
//!
//! With the `alloc` feature the tables reserve their exact capacity from
//! the host's global allocator once at construction; nothing grows or is
//! reallocated afterwards. Without it they are `heapless` vectors with
//! the compile-time capacities below, for fully static embedding.

use crate::FdtError;

#[cfg(feature = "alloc")]
use alloc::vec::Vec;

/// Node-table (and phandle-table) capacity in static mode.
pub const STATIC_NODE_CAPACITY: usize = 256;
/// Property-table capacity in static mode.
pub const STATIC_PROP_CAPACITY: usize = 1024;

/// A table slot index with a reserved null sentinel.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(transparent)]
pub(crate) struct Idx(u32);

impl Idx {
    pub const NONE: Idx = Idx(u32::MAX);

    pub fn new(slot: usize) -> Idx {
        Idx(slot as u32)
    }

    /// The slot number, or `None` for the sentinel.
    pub fn get(self) -> Option<usize> {
        if self == Self::NONE {
            None
        } else {
            Some(self.0 as usize)
        }
    }
}

/// Bump-insertion storage for one record kind.
#[derive(Debug)]
pub(crate) enum Table<T, const N: usize> {
    #[cfg(feature = "alloc")]
    Heap { slots: Vec<T>, cap: usize },
    #[cfg(not(feature = "alloc"))]
    Fixed(heapless::Vec<T, N>),
}

impl<T, const N: usize> Table<T, N> {
    /// Acquires storage for exactly `cap` records.
    ///
    /// In static mode this fails when `cap` exceeds the compile-time
    /// capacity `N`; the dynamic reservation cannot fail short of the
    /// global allocator aborting.
    pub fn with_capacity(cap: usize) -> Result<Self, FdtError> {
        #[cfg(feature = "alloc")]
        {
            Ok(Table::Heap {
                slots: Vec::with_capacity(cap),
                cap,
            })
        }
        #[cfg(not(feature = "alloc"))]
        {
            if cap > N {
                return Err(FdtError::NoMemory);
            }
            Ok(Table::Fixed(heapless::Vec::new()))
        }
    }

    /// Appends a record, returning its slot index.
    ///
    /// Fails with `NoMemory` instead of growing past the capacity fixed
    /// at construction.
    pub fn push(&mut self, value: T) -> Result<usize, FdtError> {
        match self {
            #[cfg(feature = "alloc")]
            Table::Heap { slots, cap } => {
                if slots.len() == *cap {
                    return Err(FdtError::NoMemory);
                }
                slots.push(value);
                Ok(slots.len() - 1)
            }
            #[cfg(not(feature = "alloc"))]
            Table::Fixed(slots) => {
                slots.push(value).map_err(|_| FdtError::NoMemory)?;
                Ok(slots.len() - 1)
            }
        }
    }

    pub fn as_slice(&self) -> &[T] {
        match self {
            #[cfg(feature = "alloc")]
            Table::Heap { slots, .. } => slots,
            #[cfg(not(feature = "alloc"))]
            Table::Fixed(slots) => slots,
        }
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        match self {
            #[cfg(feature = "alloc")]
            Table::Heap { slots, .. } => slots,
            #[cfg(not(feature = "alloc"))]
            Table::Fixed(slots) => slots,
        }
    }

    pub fn get(&self, slot: usize) -> Option<&T> {
        self.as_slice().get(slot)
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_returns_consecutive_slots() {
        let mut table: Table<u32, 8> = Table::with_capacity(3).unwrap();
        assert_eq!(table.push(10).unwrap(), 0);
        assert_eq!(table.push(11).unwrap(), 1);
        assert_eq!(table.push(12).unwrap(), 2);
        assert_eq!(table.get(1), Some(&11));
        assert_eq!(table.len(), 3);
    }

    // In static mode pushes are bounded by `N` rather than the counted
    // capacity, so this only holds for the dynamic tables.
    #[cfg(feature = "alloc")]
    #[test]
    fn push_past_capacity_is_no_memory() {
        let mut table: Table<u32, 8> = Table::with_capacity(1).unwrap();
        table.push(1).unwrap();
        assert!(matches!(table.push(2), Err(FdtError::NoMemory)));
    }

    #[test]
    fn sentinel_index_is_none() {
        assert_eq!(Idx::NONE.get(), None);
        assert_eq!(Idx::new(7).get(), Some(7));
    }
}
