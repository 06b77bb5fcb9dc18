//! Location/label allocator over a chain of vector batches
//!
//! Combines the batch chain with the label bookkeeping:
//! - label → location map (label lock)
//! - location → label reverse array, tombstone set, high-water mark (meta lock)
//! - batch chain and slot bytes (data lock)
//!
//! Every location is Unallocated (at or above the high-water mark), Active
//! (bound to a label) or Tombstoned (removed, waiting for reuse).

use super::allocator::AlignedAllocator;
use super::batch::VectorBatch;
use super::options::{InitialReserve, StoreOptions};
use super::slot::{Label, Location, SlotAddress, INVALID_LOCATION, UNKNOWN_LABEL};
use crate::error::{Error, Result};
use crate::filter::IdFilter;
use parking_lot::{MappedRwLockReadGuard, RwLock, RwLockReadGuard};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Read view of one slot; blocks slot writers while held
///
/// Several views may be held at once. While any view is alive, only
/// `get_vector` and `copy_vector` may be called on the store from the same
/// thread.
pub type VectorRef<'a> = MappedRwLockReadGuard<'a, [u8]>;

/// State guarded by the meta lock
#[derive(Debug, Default)]
struct Meta {
    /// High-water mark: locations below it are Active or Tombstoned
    current_idx: usize,
    /// Current limit, only ever raised
    max_elements: usize,
    /// Reverse map, `UNKNOWN_LABEL` for free locations
    lid_to_label: Vec<Label>,
    /// Tombstoned locations, lowest reused first
    deleted: BTreeSet<Location>,
}

/// Vector store
///
/// Hands out locations for labelled vectors, reusing deleted locations
/// (lowest first) before extending storage. All methods take `&self`;
/// share it across threads with `Arc`.
///
/// Must be initialized before use. Using it earlier, or passing a location
/// at or past the high-water mark, panics.
pub struct VectorStore {
    allocator: Arc<AlignedAllocator>,
    options: StoreOptions,
    ready: bool,
    replace_vacant: AtomicBool,
    /// Copy of the high-water mark, only changed with the data lock held
    mark: AtomicUsize,
    meta: RwLock<Meta>,
    labels: RwLock<HashMap<Label, Location>>,
    batches: RwLock<Vec<VectorBatch>>,
}

impl VectorStore {
    /// Create an uninitialized store backed by `allocator`
    pub fn new(allocator: Arc<AlignedAllocator>) -> Self {
        Self {
            allocator,
            options: StoreOptions::default(),
            ready: false,
            replace_vacant: AtomicBool::new(true),
            mark: AtomicUsize::new(0),
            meta: RwLock::new(Meta::default()),
            labels: RwLock::new(HashMap::new()),
            batches: RwLock::new(Vec::new()),
        }
    }

    /// Create and initialize a store with its own allocator
    pub fn open(options: StoreOptions) -> Result<Self> {
        Self::open_with_allocator(options, Arc::new(AlignedAllocator::new()))
    }

    /// Create and initialize a store on a shared allocator
    pub fn open_with_allocator(
        options: StoreOptions,
        allocator: Arc<AlignedAllocator>,
    ) -> Result<Self> {
        let mut store = Self::new(allocator);
        store.initialize(options)?;
        Ok(store)
    }

    /// Configure the store and provision its initial batches
    ///
    /// May be called once.
    pub fn initialize(&mut self, options: StoreOptions) -> Result<()> {
        check!(!self.ready, "vector store initialized twice");
        options.validate()?;

        info!(
            batch_size = options.batch_size,
            max_elements = options.max_elements,
            vector_byte_size = options.vector_byte_size,
            enable_replace_vacant = options.enable_replace_vacant,
            initial_reserve = ?options.initial_reserve,
            "Initializing vector store"
        );

        self.replace_vacant
            .store(options.enable_replace_vacant, Ordering::Release);
        self.options = options;

        let max_elements = self.options.max_elements;
        {
            let mut meta = self.meta.write();
            meta.max_elements = max_elements;
            meta.lid_to_label = vec![UNKNOWN_LABEL; max_elements];
        }

        if self.options.initial_reserve == InitialReserve::Eager {
            let mut batches = self.batches.write();
            self.grow_chain(&mut batches, max_elements, max_elements)?;
        }

        self.ready = true;
        Ok(())
    }

    /// Raise the element limit to `max_elements`
    ///
    /// The new limit must be larger than the current one. Storage is not
    /// provisioned; batches are added as locations are handed out.
    pub fn reset_max_elements(&self, max_elements: usize) {
        self.check_ready();
        let mut meta = self.meta.write();
        check!(
            meta.max_elements < max_elements,
            "max_elements can only grow: {} -> {}",
            meta.max_elements,
            max_elements
        );
        check!(
            max_elements <= INVALID_LOCATION as usize,
            "max_elements {} exceeds the location range",
            max_elements
        );

        meta.lid_to_label.resize(max_elements, UNKNOWN_LABEL);
        let previous = std::mem::replace(&mut meta.max_elements, max_elements);
        info!(previous, max_elements, "Raised vector store limit");
    }

    /// Store `vector` under `label` and return its location
    ///
    /// Reuses the lowest tombstoned location when vacancy reuse is enabled,
    /// otherwise appends at the high-water mark.
    pub fn add_vector(&self, label: Label, vector: &[u8]) -> Result<Location> {
        self.check_ready();
        if label == UNKNOWN_LABEL {
            return Err(Error::InvalidArgument(format!(
                "label {} is reserved",
                label
            )));
        }
        if vector.len() != self.options.vector_byte_size {
            return Err(Error::InvalidArgument(format!(
                "vector has {} bytes, store expects {}",
                vector.len(),
                self.options.vector_byte_size
            )));
        }

        let location = match self.get_vacant(label) {
            Ok(location) => {
                metrics::counter!("vecstore_vacant_reused_total").increment(1);
                location
            }
            Err(_) => match self.prefer_add_vector(label) {
                Ok(location) => location,
                Err(e) => {
                    metrics::counter!("vecstore_add_rejected_total", "reason" => e.kind())
                        .increment(1);
                    return Err(e);
                }
            },
        };

        self.set_vector(location, vector);
        metrics::counter!("vecstore_vectors_added_total").increment(1);
        Ok(location)
    }

    /// Bind `label` to a fresh location at the high-water mark
    ///
    /// Does not write any bytes.
    pub fn prefer_add_vector(&self, label: Label) -> Result<Location> {
        self.check_ready();
        let mut meta = self.meta.write();
        let mut labels = self.labels.write();

        if labels.contains_key(&label) {
            return Err(Error::AlreadyExists(format!(
                "label {} already in store",
                label
            )));
        }
        if meta.current_idx >= meta.max_elements {
            return Err(Error::ResourceExhausted(format!(
                "no space: {} of {} locations in use",
                meta.current_idx, meta.max_elements
            )));
        }

        let lid = meta.current_idx;
        {
            let mut batches = self.batches.write();
            self.resize_locked(&mut meta, &mut batches, lid + 1)?;
        }
        meta.lid_to_label[lid] = label;
        labels.insert(label, lid as Location);

        debug!(label, location = lid, "Allocated new location");
        Ok(lid as Location)
    }

    /// Take the lowest tombstoned location for `label`
    pub fn get_vacant(&self, label: Label) -> Result<Location> {
        self.check_ready();
        if !self.replace_vacant.load(Ordering::Acquire) {
            return Err(Error::Unavailable(
                "vacancy reuse is disabled".to_string(),
            ));
        }

        let mut meta = self.meta.write();
        let mut labels = self.labels.write();

        let lid = match meta.deleted.first() {
            Some(&lid) => lid,
            None => {
                return Err(Error::ResourceExhausted(
                    "no vacant location to reuse".to_string(),
                ))
            }
        };
        if labels.contains_key(&label) {
            return Err(Error::AlreadyExists(format!(
                "label {} already in store",
                label
            )));
        }

        meta.deleted.remove(&lid);
        meta.lid_to_label[lid as usize] = label;
        labels.insert(label, lid);

        debug!(label, location = lid, "Reused vacant location");
        Ok(lid)
    }

    /// Retire the location holding `label`
    ///
    /// The slot bytes are left in place until the location is reused.
    pub fn remove_vector(&self, label: Label) -> Result<Location> {
        self.check_ready();
        let mut meta = self.meta.write();
        let mut labels = self.labels.write();

        let lid = labels
            .remove(&label)
            .ok_or_else(|| Error::NotFound(format!("label {} not found", label)))?;
        meta.lid_to_label[lid as usize] = UNKNOWN_LABEL;
        meta.deleted.insert(lid);

        metrics::counter!("vecstore_vectors_removed_total").increment(1);
        debug!(label, location = lid, "Removed vector");
        Ok(lid)
    }

    /// Bytes stored at `location`
    ///
    /// Does not take the meta lock, so a caller already holding a view can
    /// take another even while a writer is queued. Drop every view before
    /// calling anything but `get_vector` or `copy_vector` from the same
    /// thread.
    pub fn get_vector(&self, location: Location) -> VectorRef<'_> {
        self.check_ready();
        let batches = self.batches.read_recursive();
        self.check_mark(location);

        let addr = self.address(location);
        RwLockReadGuard::map(batches, move |b| b[addr.batch].at(addr.offset))
    }

    /// Overwrite the bytes at `location`
    pub fn set_vector(&self, location: Location, vector: &[u8]) {
        self.check_ready();
        check!(
            vector.len() == self.options.vector_byte_size,
            "vector has {} bytes, store expects {}",
            vector.len(),
            self.options.vector_byte_size
        );
        let mut batches = self.batches.write();
        self.check_mark(location);

        let addr = self.address(location);
        batches[addr.batch].set_vector(addr.offset, vector);
    }

    /// Copy the bytes at `location` into the front of `dest`
    pub fn copy_vector(&self, location: Location, dest: &mut [u8]) {
        let width = self.options.vector_byte_size;
        check!(
            dest.len() >= width,
            "destination of {} bytes cannot hold a {}-byte vector",
            dest.len(),
            width
        );
        let vector = self.get_vector(location);
        dest[..width].copy_from_slice(&vector);
    }

    /// Copy the bytes at `from` over `to`; the label maps are not touched
    pub fn move_vector(&self, from: Location, to: Location) {
        self.check_ready();
        let mut batches = self.batches.write();
        self.check_mark(from);
        self.check_mark(to);

        let src = self.address(from);
        let dst = self.address(to);
        if src.batch == dst.batch {
            batches[src.batch].copy_within(src.offset, dst.offset);
        } else if src.batch < dst.batch {
            let (lo, hi) = batches.split_at_mut(dst.batch);
            hi[0].set_vector(dst.offset, lo[src.batch].at(src.offset));
        } else {
            let (lo, hi) = batches.split_at_mut(src.batch);
            lo[dst.batch].set_vector(dst.offset, hi[0].at(src.offset));
        }
    }

    /// Whether `label` is currently live
    pub fn exists_label(&self, label: Label) -> bool {
        self.check_ready();
        self.labels.read().contains_key(&label)
    }

    /// Location bound to `label`, if live
    pub fn get_location(&self, label: Label) -> Option<Location> {
        self.check_ready();
        self.labels.read().get(&label).copied()
    }

    /// Whether `location` is tombstoned
    pub fn is_deleted(&self, location: Location) -> bool {
        self.check_ready();
        let meta = self.meta.read();
        Self::check_location(&meta, location);
        meta.lid_to_label[location as usize] == UNKNOWN_LABEL
    }

    /// Label at `location`, `UNKNOWN_LABEL` when tombstoned
    pub fn get_label(&self, location: Location) -> Label {
        self.check_ready();
        let meta = self.meta.read();
        Self::check_location(&meta, location);
        meta.lid_to_label[location as usize]
    }

    /// Live vectors
    pub fn size(&self) -> usize {
        self.check_ready();
        let meta = self.meta.read();
        meta.current_idx - meta.deleted.len()
    }

    /// Tombstoned locations awaiting reuse
    pub fn deleted_size(&self) -> usize {
        self.check_ready();
        self.meta.read().deleted.len()
    }

    /// High-water mark
    pub fn current_index(&self) -> usize {
        self.check_ready();
        self.meta.read().current_idx
    }

    /// Provisioned slots, capped at `max_elements`
    pub fn capacity(&self) -> usize {
        self.check_ready();
        let meta = self.meta.read();
        let batches = self.batches.read();
        self.capacity_locked(&meta, &batches)
    }

    /// Provisioned slots above the high-water mark
    pub fn available(&self) -> usize {
        self.check_ready();
        let meta = self.meta.read();
        let batches = self.batches.read();
        self.capacity_locked(&meta, &batches)
            .saturating_sub(meta.current_idx)
    }

    /// Provision batches until at least `min(n, max_elements)` slots exist
    pub fn reserve(&self, n: usize) -> Result<()> {
        self.check_ready();
        let meta = self.meta.read();
        let mut batches = self.batches.write();
        self.grow_chain(&mut batches, n, meta.max_elements)
    }

    /// Move the high-water mark to exactly `n`
    ///
    /// Labels and tombstones are left as they are; keeping them consistent
    /// with the new mark is up to the caller.
    pub fn resize(&self, n: usize) -> Result<()> {
        self.check_ready();
        let mut meta = self.meta.write();
        if n > meta.max_elements {
            return Err(Error::ResourceExhausted(format!(
                "cannot resize to {}, limit is {}",
                n, meta.max_elements
            )));
        }
        let mut batches = self.batches.write();
        self.resize_locked(&mut meta, &mut batches, n)
    }

    /// Lower the high-water mark by `n`
    pub fn pop_back(&self, n: usize) -> Result<()> {
        self.check_ready();
        let mut meta = self.meta.write();
        check!(
            n <= meta.current_idx,
            "cannot pop {} locations, only {} allocated",
            n,
            meta.current_idx
        );
        let target = meta.current_idx - n;
        let mut batches = self.batches.write();
        self.resize_locked(&mut meta, &mut batches, target)
    }

    /// Free trailing batches that hold no locations
    pub fn shrink(&self) {
        self.check_ready();
        let mut batches = self.batches.write();
        let before = batches.len();
        while batches.last().is_some_and(VectorBatch::is_empty) {
            batches.pop();
        }
        batches.shrink_to_fit();

        let released = before - batches.len();
        if released > 0 {
            metrics::gauge!("vecstore_batches").set(batches.len() as f64);
            info!(released, remaining = batches.len(), "Released empty batches");
        }
    }

    /// Let new vectors take over tombstoned locations
    pub fn enable_vacant(&self) {
        self.check_ready();
        self.replace_vacant.store(true, Ordering::Release);
    }

    /// Always append at the high-water mark
    pub fn disable_vacant(&self) {
        self.check_ready();
        self.replace_vacant.store(false, Ordering::Release);
    }

    /// Whether tombstoned locations are reused
    pub fn vacant_enabled(&self) -> bool {
        self.replace_vacant.load(Ordering::Acquire)
    }

    /// Slots per batch
    pub fn batch_size(&self) -> usize {
        self.options.batch_size
    }

    /// Bytes per vector
    pub fn vector_byte_size(&self) -> usize {
        self.options.vector_byte_size
    }

    /// Current element limit
    pub fn max_elements(&self) -> usize {
        self.check_ready();
        self.meta.read().max_elements
    }

    /// Whether `initialize` has succeeded
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Current options, reflecting later limit and vacancy changes
    pub fn options(&self) -> StoreOptions {
        self.check_ready();
        StoreOptions {
            max_elements: self.meta.read().max_elements,
            enable_replace_vacant: self.vacant_enabled(),
            ..self.options.clone()
        }
    }

    /// Allocator backing the batches
    pub fn allocator(&self) -> &Arc<AlignedAllocator> {
        &self.allocator
    }

    /// Read view of the batch chain
    pub fn batches(&self) -> MappedRwLockReadGuard<'_, [VectorBatch]> {
        self.check_ready();
        RwLockReadGuard::map(self.batches.read_recursive(), |b| b.as_slice())
    }

    /// Live (label, location) pairs accepted by `filter`, ordered by location
    pub fn labels_matching(&self, filter: Option<&IdFilter>) -> Vec<(Label, Location)> {
        self.check_ready();
        let labels = self.labels.read();
        let mut matches: Vec<_> = labels
            .iter()
            .filter(|(&label, _)| filter.map_or(true, |f| f.is_member(label)))
            .map(|(&label, &location)| (label, location))
            .collect();
        matches.sort_unstable_by_key(|&(_, location)| location);
        matches
    }

    /// Snapshot of the store accounting
    pub fn stats(&self) -> StoreStats {
        self.check_ready();
        let meta = self.meta.read();
        let batches = self.batches.read();
        let capacity = self.capacity_locked(&meta, &batches);

        StoreStats {
            size: meta.current_idx - meta.deleted.len(),
            deleted: meta.deleted.len(),
            current_index: meta.current_idx,
            capacity,
            available: capacity.saturating_sub(meta.current_idx),
            max_elements: meta.max_elements,
            batch_count: batches.len(),
            allocated_bytes: batches.iter().map(|b| b.as_bytes().len()).sum(),
            vacant_enabled: self.vacant_enabled(),
        }
    }

    fn check_ready(&self) {
        check!(self.ready, "vector store used before initialize");
    }

    fn check_location(meta: &Meta, location: Location) {
        check!(
            (location as usize) < meta.current_idx,
            "location {} out of range, high-water mark is {}",
            location,
            meta.current_idx
        );
    }

    /// Bounds check against the mark; call with the data lock held
    fn check_mark(&self, location: Location) {
        let mark = self.mark.load(Ordering::Acquire);
        check!(
            (location as usize) < mark,
            "location {} out of range, high-water mark is {}",
            location,
            mark
        );
    }

    fn address(&self, location: Location) -> SlotAddress {
        SlotAddress::from_location(location, self.options.batch_size)
    }

    fn capacity_locked(&self, meta: &Meta, batches: &[VectorBatch]) -> usize {
        (batches.len() * self.options.batch_size).min(meta.max_elements)
    }

    /// Append whole batches until `min(n, max_elements)` slots exist
    fn grow_chain(
        &self,
        batches: &mut Vec<VectorBatch>,
        n: usize,
        max_elements: usize,
    ) -> Result<()> {
        let target = n.min(max_elements);
        let before = batches.len();

        while batches.len() * self.options.batch_size < target {
            batches.push(VectorBatch::new(
                &self.allocator,
                self.options.vector_byte_size,
                self.options.batch_size,
            )?);
        }

        if batches.len() > before {
            metrics::gauge!("vecstore_batches").set(batches.len() as f64);
            debug!(
                added = batches.len() - before,
                batches = batches.len(),
                "Expanded batch chain"
            );
        }
        Ok(())
    }

    /// Move the high-water mark, filling cursors forward or emptying them
    /// backward in chain order. `n` must not exceed `max_elements`.
    fn resize_locked(
        &self,
        meta: &mut Meta,
        batches: &mut Vec<VectorBatch>,
        n: usize,
    ) -> Result<()> {
        let batch_size = self.options.batch_size;
        let current = meta.current_idx;

        if n < current {
            let mut need_to_pop = current - n;
            let mut idx = (current - 1) / batch_size;
            while need_to_pop > 0 {
                let batch = &mut batches[idx];
                let size = batch.size();
                if size >= need_to_pop {
                    batch.resize(size - need_to_pop);
                    need_to_pop = 0;
                } else {
                    batch.resize(0);
                    need_to_pop -= size;
                    idx -= 1;
                }
            }
        } else if n > current {
            self.grow_chain(batches, n, meta.max_elements)?;
            let mut need_to_expand = n - current;
            let mut idx = current / batch_size;
            while need_to_expand > 0 {
                let batch = &mut batches[idx];
                let available = batch.available();
                if available >= need_to_expand {
                    batch.resize(batch.size() + need_to_expand);
                    need_to_expand = 0;
                } else {
                    batch.resize(batch_size);
                    need_to_expand -= available;
                    idx += 1;
                }
            }
        }

        meta.current_idx = n;
        self.mark.store(n, Ordering::Release);
        Ok(())
    }
}

/// Store accounting snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub size: usize,
    pub deleted: usize,
    pub current_index: usize,
    pub capacity: usize,
    pub available: usize,
    pub max_elements: usize,
    pub batch_count: usize,
    pub allocated_bytes: usize,
    pub vacant_enabled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(max_elements: usize, batch_size: usize) -> VectorStore {
        VectorStore::open(StoreOptions {
            batch_size,
            max_elements,
            vector_byte_size: 4,
            ..StoreOptions::default()
        })
        .unwrap()
    }

    fn v(byte: u8) -> [u8; 4] {
        [byte; 4]
    }

    #[test]
    fn test_vacant_reuse_scenario() -> Result<()> {
        let store = store(4, 2);

        assert_eq!(store.add_vector(10, &v(1))?, 0);
        assert_eq!(store.add_vector(20, &v(2))?, 1);
        assert_eq!(store.add_vector(30, &v(3))?, 2);
        assert_eq!(store.batches().len(), 2);

        assert_eq!(store.remove_vector(20)?, 1);
        assert_eq!(store.size(), 2);
        assert_eq!(store.deleted_size(), 1);

        assert_eq!(store.add_vector(40, &v(4))?, 1);
        assert_eq!(store.size(), 3);
        assert_eq!(store.deleted_size(), 0);
        assert_eq!(store.current_index(), 3);
        assert_eq!(&*store.get_vector(1), &v(4));
        Ok(())
    }

    #[test]
    fn test_exhausted_scenario() -> Result<()> {
        let store = store(1, 256);

        assert_eq!(store.add_vector(1, &v(1))?, 0);
        assert!(matches!(
            store.add_vector(2, &v(2)),
            Err(Error::ResourceExhausted(_))
        ));
        assert_eq!(store.current_index(), 1);
        assert!(!store.exists_label(2));
        Ok(())
    }

    #[test]
    fn test_add_existing_label_leaves_state() -> Result<()> {
        let store = store(8, 2);
        store.add_vector(1, &v(1))?;
        store.add_vector(2, &v(2))?;
        store.remove_vector(1)?;

        let before = (store.current_index(), store.labels_matching(None), store.stats());
        assert!(matches!(
            store.add_vector(2, &v(9)),
            Err(Error::AlreadyExists(_))
        ));
        let after = (store.current_index(), store.labels_matching(None), store.stats());

        assert_eq!(before, after);
        assert_eq!(store.get_label(0), UNKNOWN_LABEL);
        assert_eq!(store.get_label(1), 2);
        assert_eq!(&*store.get_vector(1), &v(2));
        Ok(())
    }

    #[test]
    fn test_add_existing_label_when_full() -> Result<()> {
        let store = store(1, 1);
        store.add_vector(5, &v(5))?;
        assert!(matches!(
            store.add_vector(5, &v(5)),
            Err(Error::AlreadyExists(_))
        ));
        Ok(())
    }

    #[test]
    fn test_remove_postconditions() -> Result<()> {
        let store = store(8, 4);
        store.add_vector(7, &v(7))?;
        let loc = store.remove_vector(7)?;

        assert!(!store.exists_label(7));
        assert!(store.is_deleted(loc));
        assert_eq!(store.get_label(loc), UNKNOWN_LABEL);
        assert_eq!(store.get_location(7), None);
        // Soft delete: bytes stay until reuse
        assert_eq!(&*store.get_vector(loc), &v(7));

        assert!(matches!(store.remove_vector(7), Err(Error::NotFound(_))));
        Ok(())
    }

    #[test]
    fn test_vacant_lowest_first() -> Result<()> {
        let store = store(8, 2);
        for label in 0..5 {
            store.add_vector(label, &v(label as u8))?;
        }
        store.remove_vector(3)?;
        store.remove_vector(1)?;
        store.remove_vector(2)?;

        assert_eq!(store.add_vector(100, &v(0))?, 1);
        assert_eq!(store.add_vector(101, &v(0))?, 2);
        assert_eq!(store.add_vector(102, &v(0))?, 3);
        assert_eq!(store.add_vector(103, &v(0))?, 5);
        Ok(())
    }

    #[test]
    fn test_disabled_vacant_appends() -> Result<()> {
        let store = store(8, 2);
        store.add_vector(1, &v(1))?;
        store.add_vector(2, &v(2))?;
        store.remove_vector(1)?;

        store.disable_vacant();
        assert!(!store.vacant_enabled());
        assert!(matches!(store.get_vacant(9), Err(Error::Unavailable(_))));
        assert_eq!(store.add_vector(3, &v(3))?, 2);
        assert_eq!(store.deleted_size(), 1);

        store.enable_vacant();
        assert_eq!(store.add_vector(4, &v(4))?, 0);
        Ok(())
    }

    #[test]
    fn test_get_vacant_errors() -> Result<()> {
        let store = store(8, 2);
        store.add_vector(1, &v(1))?;
        assert!(matches!(
            store.get_vacant(2),
            Err(Error::ResourceExhausted(_))
        ));

        store.add_vector(2, &v(2))?;
        store.remove_vector(2)?;
        assert!(matches!(store.get_vacant(1), Err(Error::AlreadyExists(_))));
        assert_eq!(store.deleted_size(), 1);

        let loc = store.get_vacant(3)?;
        assert_eq!(loc, 1);
        assert_eq!(store.get_label(1), 3);
        assert!(store.exists_label(3));
        Ok(())
    }

    #[test]
    fn test_prefer_add_skips_vacant() -> Result<()> {
        let store = store(8, 2);
        store.add_vector(1, &v(1))?;
        store.remove_vector(1)?;

        assert_eq!(store.prefer_add_vector(2)?, 1);
        assert_eq!(store.current_index(), 2);
        assert_eq!(store.deleted_size(), 1);
        Ok(())
    }

    #[test]
    fn test_invalid_payload_rejected() -> Result<()> {
        let store = store(8, 2);
        assert!(matches!(
            store.add_vector(1, &[1, 2, 3]),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            store.add_vector(UNKNOWN_LABEL, &v(1)),
            Err(Error::InvalidArgument(_))
        ));
        assert_eq!(store.current_index(), 0);
        assert!(!store.exists_label(1));
        Ok(())
    }

    #[test]
    fn test_resize_roundtrip_keeps_bytes() -> Result<()> {
        let store = store(32, 4);
        for label in 0..6u64 {
            store.add_vector(label, &v(label as u8 + 1))?;
        }

        store.resize(13)?;
        assert_eq!(store.current_index(), 13);
        assert_eq!(store.capacity(), 32);

        store.resize(6)?;
        assert_eq!(store.current_index(), 6);
        for loc in 0..6u32 {
            assert_eq!(&*store.get_vector(loc), &v(loc as u8 + 1));
        }

        let sizes: Vec<_> = store.batches().iter().map(VectorBatch::size).collect();
        assert_eq!(&sizes[..3], &[4, 2, 0]);
        Ok(())
    }

    #[test]
    fn test_resize_down_from_full_batch() -> Result<()> {
        let store = store(2, 2);
        store.add_vector(1, &v(1))?;
        store.add_vector(2, &v(2))?;

        store.resize(1)?;
        assert_eq!(store.current_index(), 1);
        assert_eq!(store.batches()[0].size(), 1);

        store.resize(0)?;
        assert!(store.batches()[0].is_empty());
        Ok(())
    }

    #[test]
    fn test_resize_past_limit() {
        let store = store(4, 2);
        assert!(matches!(store.resize(5), Err(Error::ResourceExhausted(_))));
        assert_eq!(store.current_index(), 0);
    }

    #[test]
    fn test_pop_back() -> Result<()> {
        let store = store(8, 2);
        for label in 0..5 {
            store.add_vector(label, &v(1))?;
        }
        store.pop_back(3)?;
        assert_eq!(store.current_index(), 2);
        let sizes: Vec<_> = store.batches().iter().map(VectorBatch::size).collect();
        assert_eq!(sizes, vec![2, 0, 0, 0]);
        Ok(())
    }

    #[test]
    fn test_capacity_and_shrink() -> Result<()> {
        let store = store(10, 4);
        assert_eq!(store.batches().len(), 3);
        assert_eq!(store.capacity(), 10);
        assert_eq!(store.available(), 10);

        for label in 0..5 {
            store.add_vector(label, &v(1))?;
        }
        assert_eq!(store.available(), 5);

        let allocated = store.allocator().allocated_bytes();
        store.shrink();
        assert_eq!(store.batches().len(), 2);
        assert_eq!(store.capacity(), 8);
        assert_eq!(store.allocator().allocated_bytes(), allocated - 16);

        // Shrinking never touches batches in use
        store.shrink();
        assert_eq!(store.capacity(), 8);

        for label in 5..10 {
            store.add_vector(label, &v(1))?;
        }
        assert_eq!(store.capacity(), 10);
        assert_eq!(store.available(), 0);
        Ok(())
    }

    #[test]
    fn test_lazy_reserve() -> Result<()> {
        let store = VectorStore::open(StoreOptions {
            batch_size: 4,
            max_elements: 10,
            vector_byte_size: 4,
            initial_reserve: InitialReserve::Lazy,
            ..StoreOptions::default()
        })?;
        assert_eq!(store.capacity(), 0);
        assert_eq!(store.allocator().allocated_bytes(), 0);

        store.add_vector(1, &v(1))?;
        assert_eq!(store.batches().len(), 1);
        assert_eq!(store.capacity(), 4);

        store.reserve(9)?;
        assert_eq!(store.batches().len(), 3);
        assert_eq!(store.capacity(), 10);

        store.reserve(1000)?;
        assert_eq!(store.batches().len(), 3);
        Ok(())
    }

    #[test]
    fn test_reset_max_elements() -> Result<()> {
        let store = store(1, 2);
        store.add_vector(1, &v(1))?;
        assert!(store.add_vector(2, &v(2)).is_err());

        store.reset_max_elements(3);
        assert_eq!(store.max_elements(), 3);
        assert_eq!(store.options().max_elements, 3);

        assert_eq!(store.add_vector(2, &v(2))?, 1);
        assert_eq!(store.add_vector(3, &v(3))?, 2);
        assert_eq!(store.get_label(2), 3);
        assert_eq!(store.capacity(), 3);
        Ok(())
    }

    #[test]
    fn test_move_and_copy() -> Result<()> {
        let store = store(8, 2);
        for label in 0..5u64 {
            store.add_vector(label, &v(label as u8))?;
        }

        // Across batches, both directions
        store.move_vector(0, 3);
        assert_eq!(&*store.get_vector(3), &v(0));
        store.move_vector(4, 1);
        assert_eq!(&*store.get_vector(1), &v(4));

        // Within one batch
        store.move_vector(2, 3);
        assert_eq!(&*store.get_vector(3), &v(2));

        // Maps untouched
        assert_eq!(store.get_label(3), 3);
        assert_eq!(store.get_location(0), Some(0));

        let mut dest = [0u8; 6];
        store.copy_vector(4, &mut dest);
        assert_eq!(dest, [4, 4, 4, 4, 0, 0]);

        store.set_vector(4, &v(9));
        assert_eq!(&*store.get_vector(4), &v(9));
        Ok(())
    }

    #[test]
    fn test_labels_matching_filter() -> Result<()> {
        let store = store(16, 4);
        for label in [50u64, 10, 30, 20, 40] {
            store.add_vector(label, &v(1))?;
        }
        store.remove_vector(30)?;

        let all = store.labels_matching(None);
        assert_eq!(all, vec![(50, 0), (10, 1), (20, 3), (40, 4)]);

        let filter = IdFilter::range(15, 45);
        assert_eq!(store.labels_matching(Some(&filter)), vec![(20, 3), (40, 4)]);
        Ok(())
    }

    #[test]
    fn test_stats() -> Result<()> {
        let store = store(10, 4);
        store.add_vector(1, &v(1))?;
        store.add_vector(2, &v(2))?;
        store.remove_vector(1)?;

        let stats = store.stats();
        assert_eq!(stats.size, 1);
        assert_eq!(stats.deleted, 1);
        assert_eq!(stats.current_index, 2);
        assert_eq!(stats.capacity, 10);
        assert_eq!(stats.available, 8);
        assert_eq!(stats.batch_count, 3);
        assert_eq!(stats.allocated_bytes, 3 * 4 * 4);
        assert!(stats.vacant_enabled);
        Ok(())
    }

    #[test]
    fn test_shared_allocator() -> Result<()> {
        let allocator = Arc::new(AlignedAllocator::new());
        let options = StoreOptions {
            batch_size: 8,
            max_elements: 8,
            vector_byte_size: 16,
            ..StoreOptions::default()
        };
        let a = VectorStore::open_with_allocator(options.clone(), Arc::clone(&allocator))?;
        let b = VectorStore::open_with_allocator(options, Arc::clone(&allocator))?;
        assert_eq!(allocator.allocated_bytes(), 2 * 8 * 16);

        drop(a);
        assert_eq!(allocator.allocated_bytes(), 8 * 16);
        assert_eq!(
            b.batches()[0].as_bytes().as_ptr() as usize % allocator.alignment(),
            0
        );
        Ok(())
    }

    #[test]
    fn test_initialize_rejects_bad_options() {
        let mut store = VectorStore::new(Arc::new(AlignedAllocator::new()));
        let err = store.initialize(StoreOptions::default()).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert!(!store.is_ready());
    }

    #[test]
    #[should_panic(expected = "before initialize")]
    fn test_use_before_initialize() {
        let store = VectorStore::new(Arc::new(AlignedAllocator::new()));
        store.size();
    }

    #[test]
    #[should_panic(expected = "initialized twice")]
    fn test_initialize_twice() {
        let mut store = VectorStore::new(Arc::new(AlignedAllocator::new()));
        store.initialize(StoreOptions::new(4)).unwrap();
        store.initialize(StoreOptions::new(4)).unwrap();
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_get_label_past_mark() {
        let store = store(4, 2);
        store.add_vector(1, &v(1)).unwrap();
        store.get_label(1);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_get_vector_past_mark() {
        let store = store(4, 2);
        let _ = store.get_vector(0);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_is_deleted_past_mark() {
        let store = store(4, 2);
        store.is_deleted(3);
    }

    #[test]
    #[should_panic(expected = "can only grow")]
    fn test_reset_max_elements_shrinking() {
        store(4, 2).reset_max_elements(4);
    }

    #[test]
    #[should_panic(expected = "cannot pop")]
    fn test_pop_back_past_zero() {
        store(4, 2).pop_back(1).unwrap();
    }
}
