//! Version allocation and snapshot pinning
//!
//! # Overview
//!
//! - The committed version is an atomic counter, read without locks.
//! - Writers take a [`WriteTicket`], which serializes them with each other
//!   and publishes the new version when the write is done. A ticket dropped
//!   unpublished abandons its version. Readers never wait for it.
//! - Pinned snapshots are reference counted per version in a small map
//!   behind a mutex. Reclamation computes its horizon under the same mutex
//!   and keeps holding it while it unlinks, so no snapshot at or below the
//!   horizon can be pinned in between.

use super::{StoreError, StoreResult, StoreShared, Version};
use parking_lot::{Mutex, MutexGuard};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Allocates versions and tracks pinned snapshots
#[derive(Debug, Default)]
pub struct SnapshotManager {
    committed: AtomicU64,
    /// Pinned version -> number of pins
    active: Mutex<BTreeMap<Version, usize>>,
    writer: Mutex<()>,
}

impl SnapshotManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a write. Blocks while another write is in progress.
    pub fn next_write_version(&self) -> WriteTicket<'_> {
        let guard = self.writer.lock();
        let version = self.committed.load(Ordering::Acquire) + 1;
        WriteTicket {
            manager: self,
            _guard: guard,
            version,
            published: false,
        }
    }

    /// Pin the current committed version
    pub fn pin_snapshot(&self) -> Version {
        let mut active = self.active.lock();
        let version = self.committed.load(Ordering::Acquire);
        *active.entry(version).or_insert(0) += 1;
        version
    }

    /// Add a pin to a version that is already pinned
    pub fn pin_version(&self, version: Version) -> StoreResult<()> {
        let mut active = self.active.lock();
        match active.get_mut(&version) {
            Some(count) => {
                *count += 1;
                Ok(())
            }
            None => Err(StoreError::SnapshotNotPinned(version)),
        }
    }

    /// Drop one pin of `version`. Returns `true` if that was the last pin of
    /// the oldest pinned version, i.e. the reclaim horizon moved.
    pub fn release_snapshot(&self, version: Version) -> StoreResult<bool> {
        let mut active = self.active.lock();
        let oldest = active.keys().next().copied();
        let count = active
            .get_mut(&version)
            .ok_or(StoreError::SnapshotNotPinned(version))?;
        *count -= 1;
        if *count > 0 {
            return Ok(false);
        }
        active.remove(&version);
        Ok(oldest == Some(version))
    }

    /// Latest committed version
    pub fn committed(&self) -> Version {
        self.committed.load(Ordering::Acquire)
    }

    /// Oldest pinned version
    pub fn min_active(&self) -> Option<Version> {
        self.active.lock().keys().next().copied()
    }

    /// Number of distinct pinned versions
    pub fn active_count(&self) -> usize {
        self.active.lock().len()
    }

    /// Total number of pins
    pub fn pin_count(&self) -> usize {
        self.active.lock().values().sum()
    }

    /// Highest removal version that may be unlinked right now
    pub fn reclaim_horizon(&self) -> Version {
        let active = self.active.lock();
        Self::horizon(&active, self.committed())
    }

    /// Run `f` with the current reclaim horizon while no new snapshot can
    /// be pinned
    pub(crate) fn with_horizon<R>(&self, f: impl FnOnce(Version) -> R) -> R {
        let active = self.active.lock();
        let horizon = Self::horizon(&active, self.committed());
        let result = f(horizon);
        drop(active);
        result
    }

    fn horizon(active: &MutexGuard<'_, BTreeMap<Version, usize>>, committed: Version) -> Version {
        active.keys().next().copied().unwrap_or(committed)
    }
}

/// Exclusive right to write at one version.
///
/// The version becomes visible to new snapshots when the ticket is
/// published. Dropping it unpublished releases the writer lock and leaves
/// the committed version where it was, so the next writer gets the same
/// version.
pub struct WriteTicket<'a> {
    manager: &'a SnapshotManager,
    _guard: MutexGuard<'a, ()>,
    version: Version,
    published: bool,
}

impl WriteTicket<'_> {
    pub fn version(&self) -> Version {
        self.version
    }

    /// Make the version the committed one
    pub fn publish(mut self) -> Version {
        self.published = true;
        self.manager.committed.store(self.version, Ordering::Release);
        debug!("Committed version {}", self.version);
        self.version
    }
}

impl Drop for WriteTicket<'_> {
    fn drop(&mut self) {
        if !self.published {
            debug!("Abandoned version {}", self.version);
        }
    }
}

impl fmt::Debug for WriteTicket<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteTicket")
            .field("version", &self.version)
            .field("published", &self.published)
            .finish()
    }
}

/// A pinned snapshot of one store.
///
/// Releasing the pin (explicitly or on drop) may trigger a reclamation
/// sweep, depending on the store's reclaim policy.
pub struct SnapshotPin {
    shared: Arc<StoreShared>,
    version: Version,
    released: bool,
}

impl SnapshotPin {
    pub(crate) fn acquire(shared: Arc<StoreShared>) -> Self {
        let version = shared.snapshots.pin_snapshot();
        Self {
            shared,
            version,
            released: false,
        }
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Second, independent pin on the same version
    pub fn share(&self) -> StoreResult<SnapshotPin> {
        if self.released {
            return Err(StoreError::SnapshotNotPinned(self.version));
        }
        self.shared.snapshots.pin_version(self.version)?;
        Ok(Self {
            shared: Arc::clone(&self.shared),
            version: self.version,
            released: false,
        })
    }

    /// Release the pin. Idempotent.
    pub fn release(&mut self) -> StoreResult<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        if self.shared.snapshots.release_snapshot(self.version)? {
            self.shared.on_oldest_released();
        }
        Ok(())
    }
}

impl Drop for SnapshotPin {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!("Failed to release snapshot {}: {}", self.version, e);
        }
    }
}

impl fmt::Debug for SnapshotPin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapshotPin")
            .field("store", &self.shared.id)
            .field("version", &self.version)
            .field("released", &self.released)
            .finish()
    }
}
