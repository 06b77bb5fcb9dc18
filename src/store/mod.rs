//! Vector Store
//!
//! Manages the physical slots holding fixed-width vectors and the mapping
//! between caller labels and internal locations.
//!
//! # Architecture
//!
//! ```text
//! VectorStore
//!   ├─→ meta lock    → high-water mark, location→label, tombstones {1, 4}
//!   ├─→ label lock   → label→location {10→0, 30→2, 50→3}
//!   └─→ data lock    → [VectorBatch(0..256)] [VectorBatch(256..512)] ...
//!
//! AlignedAllocator (shared, 64B alignment)
//!   └─→ backs every VectorBatch
//! ```
//!
//! Locks are always taken in the order meta → label → data.
//!
//! Deleted locations are tombstoned, not erased. With vacancy reuse enabled
//! the lowest tombstone is handed out before the high-water mark moves.

pub mod allocator;
pub mod batch;
pub mod bench;
pub mod options;
pub mod slot;
pub mod vector_store;

pub use allocator::{AlignedAllocator, AlignedBuf};
pub use batch::VectorBatch;
pub use options::{InitialReserve, StoreOptions};
pub use slot::{Label, Location, INVALID_LOCATION, UNKNOWN_LABEL, UNKNOWN_LOCATION};
pub use vector_store::{StoreStats, VectorRef, VectorStore};
