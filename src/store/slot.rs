//! Location and label types for the vector store

use std::fmt;

/// Dense internal index of a storage slot
pub type Location = u32;

/// Caller-assigned identity of a live vector
pub type Label = u64;

/// Reserved location meaning "no slot"
pub const INVALID_LOCATION: Location = Location::MAX;

/// Reserved location meaning "not known yet"
pub const UNKNOWN_LOCATION: Location = Location::MAX;

/// Reserved label stored for unallocated and tombstoned locations
pub const UNKNOWN_LABEL: Label = Label::MAX;

/// Physical address of a location inside the batch chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotAddress {
    /// Index of the batch in the chain
    pub batch: usize,
    /// Slot index within the batch
    pub offset: usize,
}

impl SlotAddress {
    /// Split a location into (batch, offset) for the given batch size
    pub fn from_location(location: Location, batch_size: usize) -> Self {
        let location = location as usize;
        Self {
            batch: location / batch_size,
            offset: location % batch_size,
        }
    }
}

impl fmt::Display for SlotAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Slot(batch={}, offset={})", self.batch, self.offset)
    }
}
