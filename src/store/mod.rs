//! In-memory, snapshot-isolated quad store
//!
//! # Architecture
//!
//! ```text
//!   MemoryStore ──> StoreShared ─┬─> SnapshotManager   committed version, pinned snapshots
//!        │                       ├─> StatementIndex    value registry + per-role statement lists
//!        │                       └─> NamespaceManager
//!        └─> StoreConnection ──> ConnectionIteration ──> StatementIteration (holds a SnapshotPin)
//! ```
//!
//! Writers append statements tagged with a fresh version and stamp removals
//! in place. Readers pin a version and filter every list they walk by
//! visibility at that version. Reclamation unlinks statements whose removal
//! no pinned reader can still see.
//!
//! Lock order, when more than one is held: pinned-snapshot state, then the
//! index lock. Writers hold the writer ticket around index updates and
//! never touch the pinned-snapshot state while doing so.

mod config;
mod connection;
mod index;
mod iteration;
mod registry;
mod snapshot;
mod statement;
mod value;

pub use config::{ReclaimPolicy, StoreConfig};
pub use connection::{ConnectionIteration, StoreConnection, TripleSource};
pub use index::{ContextFilter, ReclaimStats, StatementIndex, StatementPattern, ValuePattern};
pub use iteration::{StatementIteration, StatementSource};
pub use registry::ValueRegistry;
pub use snapshot::{SnapshotManager, SnapshotPin, WriteTicket};
pub use statement::{FrozenList, MemStatement, StatementId, StatementList, NOT_REMOVED};
pub use value::{MemValue, Role, StoreId, ValueId};

use crate::iteration::IterationError;
use crate::rdf::{NamespaceManager, RdfError, Statement, Term};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Version number of a committed write
pub type Version = u64;

/// Store errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// Handle minted by another store
    #[error("Value {value} does not belong to {store}")]
    ForeignValue { value: ValueId, store: StoreId },

    /// Handle to a value that has been evicted
    #[error("Unknown value {0}")]
    UnknownValue(ValueId),

    /// Value cannot occupy this position
    #[error("{value} cannot be used as {role}")]
    InvalidRole { role: Role, value: String },

    #[error("Snapshot {0} is not pinned")]
    SnapshotNotPinned(Version),

    #[error("A transaction is already active")]
    TransactionActive,

    #[error("No active transaction")]
    NoActiveTransaction,

    #[error("Connection is closed")]
    ConnectionClosed,

    /// Internal invariant broken; not recoverable
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Errors collected while force-closing a connection's iterations
    #[error("{} iteration(s) failed to close", .0.len())]
    CloseFailed(Vec<IterationError>),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Iteration(#[from] IterationError),

    #[error(transparent)]
    Rdf(#[from] RdfError),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// State shared by a store, its connections and their iterations
pub(crate) struct StoreShared {
    pub(crate) id: StoreId,
    pub(crate) config: StoreConfig,
    pub(crate) snapshots: SnapshotManager,
    pub(crate) index: StatementIndex,
    pub(crate) namespaces: RwLock<NamespaceManager>,
    releases_since_sweep: AtomicUsize,
}

impl StoreShared {
    /// Run `apply` with exclusive write access at a fresh version, then
    /// publish that version. If `apply` fails, whatever it did at that
    /// version is discarded and nothing is published.
    pub(crate) fn write<F>(&self, apply: F) -> StoreResult<Version>
    where
        F: FnOnce(&StatementIndex, Version) -> StoreResult<()>,
    {
        let ticket = self.snapshots.next_write_version();
        let version = ticket.version();
        match apply(&self.index, version) {
            Ok(()) => Ok(ticket.publish()),
            Err(e) => {
                warn!("Write at version {} failed and was discarded: {}", version, e);
                self.index.discard_version(version);
                Err(e)
            }
        }
    }

    pub(crate) fn to_statement(&self, st: &MemStatement) -> StoreResult<Statement> {
        let (subject, predicate, object, context) = self.index.resolve_quad(st)?;
        Ok(Statement {
            subject: subject.to_resource(Role::Subject)?,
            predicate: predicate.to_named_node()?,
            object: object.to_term(),
            context: context
                .map(|c| c.to_resource(Role::Context))
                .transpose()?,
        })
    }

    /// Unlink everything below the current horizon
    pub(crate) fn reclaim(&self) -> ReclaimStats {
        self.snapshots.with_horizon(|horizon| {
            let stats = self.index.unlink_removed(horizon, self.config.compact_values);
            debug!(
                "Reclaimed {} statements and {} values at horizon {}",
                stats.statements_unlinked, stats.values_evicted, horizon
            );
            stats
        })
    }

    pub(crate) fn reclaim_below(&self, below: Version) -> StoreResult<ReclaimStats> {
        self.snapshots.with_horizon(|horizon| {
            if below > horizon {
                error!(
                    "Refusing to reclaim below {}: oldest pinned snapshot is {}",
                    below, horizon
                );
                return Err(StoreError::InvariantViolation(format!(
                    "reclamation requested below version {} but version {} is still pinned",
                    below, horizon
                )));
            }
            Ok(self.index.unlink_removed(below, self.config.compact_values))
        })
    }

    /// Called when the last pin of the oldest pinned snapshot goes away
    pub(crate) fn on_oldest_released(&self) {
        let due = match self.config.reclaim_policy {
            ReclaimPolicy::Manual => false,
            ReclaimPolicy::Eager => true,
            ReclaimPolicy::Batched { releases } => {
                let seen = self.releases_since_sweep.fetch_add(1, Ordering::Relaxed) + 1;
                if seen >= releases.max(1) {
                    self.releases_since_sweep.store(0, Ordering::Relaxed);
                    true
                } else {
                    false
                }
            }
        };
        if due && self.index.pending_removals() > 0 {
            self.reclaim();
        }
    }
}

/// In-memory quad store.
///
/// Cheap to clone; clones share the same data.
///
/// # Example
///
/// ```rust
/// use quadstore::iteration::collect_all;
/// use quadstore::rdf::{NamedNode, QuadPattern, Statement};
/// use quadstore::store::MemoryStore;
///
/// let store = MemoryStore::new();
/// let mut conn = store.connection();
/// let s = NamedNode::new("http://example.org/s").unwrap();
/// let p = NamedNode::new("http://example.org/p").unwrap();
/// let o = NamedNode::new("http://example.org/o").unwrap();
/// conn.add(&Statement::new(s, p, o)).unwrap();
///
/// let found = collect_all(conn.get_statements(&QuadPattern::any(), false).unwrap()).unwrap();
/// assert_eq!(found.len(), 1);
/// ```
#[derive(Clone)]
pub struct MemoryStore {
    shared: Arc<StoreShared>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    pub fn with_config(config: StoreConfig) -> Self {
        let id = StoreId::next();
        info!("Created {} with reclaim policy {:?}", id, config.reclaim_policy);
        Self {
            shared: Arc::new(StoreShared {
                id,
                config,
                snapshots: SnapshotManager::new(),
                index: StatementIndex::new(id),
                namespaces: RwLock::new(NamespaceManager::new()),
                releases_since_sweep: AtomicUsize::new(0),
            }),
        }
    }

    pub fn id(&self) -> StoreId {
        self.shared.id
    }

    pub fn config(&self) -> &StoreConfig {
        &self.shared.config
    }

    /// Open a new connection
    pub fn connection(&self) -> StoreConnection {
        StoreConnection::new(Arc::clone(&self.shared))
    }

    /// Intern a term, allocating a handle on first use
    pub fn intern(&self, term: &Term) -> ValueId {
        self.shared.index.intern(MemValue::from(term))
    }

    /// Handle of a term if it is interned
    pub fn lookup(&self, term: &Term) -> Option<ValueId> {
        self.shared.index.lookup(&MemValue::from(term))
    }

    pub fn resolve(&self, id: ValueId) -> StoreResult<Term> {
        self.shared.index.resolve(id).map(|value| value.to_term())
    }

    /// Statements matching a handle-level pattern, read from a freshly
    /// pinned snapshot. Handles from other stores are rejected.
    pub fn statements(&self, pattern: StatementPattern) -> StoreResult<StatementIteration> {
        let pin = self.pin_snapshot();
        let candidates = self.shared.index.candidates(&pattern)?;
        Ok(StatementIteration::new(candidates, pattern, pin))
    }

    /// Convert a stored statement back to its terms
    pub fn to_statement(&self, st: &MemStatement) -> StoreResult<Statement> {
        self.shared.to_statement(st)
    }

    /// Pin the current committed snapshot
    pub fn pin_snapshot(&self) -> SnapshotPin {
        SnapshotPin::acquire(Arc::clone(&self.shared))
    }

    pub fn snapshots(&self) -> &SnapshotManager {
        &self.shared.snapshots
    }

    /// Sweep everything no pinned snapshot can see
    pub fn reclaim(&self) -> ReclaimStats {
        self.shared.reclaim()
    }

    /// Unlink statements removed at or below `below`. Fails without
    /// unlinking anything if a snapshot below that version is pinned.
    pub fn reclaim_below(&self, below: Version) -> StoreResult<ReclaimStats> {
        self.shared.reclaim_below(below)
    }

    /// Linked statements, including removed ones not yet reclaimed
    pub fn physical_statement_count(&self) -> usize {
        self.shared.index.physical_len()
    }

    pub fn value_count(&self) -> usize {
        self.shared.index.value_count()
    }

    pub fn pending_removals(&self) -> usize {
        self.shared.index.pending_removals()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for StoreShared {
    fn drop(&mut self) {
        let pins = self.snapshots.pin_count();
        if pins > 0 {
            warn!("{} dropped with {} pinned snapshots", self.id, pins);
        }
    }
}
