//! Connections: transactions and connection-scoped iterations
//!
//! A [`StoreConnection`] is the unit a client (parser, query evaluator,
//! application) talks to. It owns at most one transaction and keeps track
//! of every iteration it handed out, so that closing the connection closes
//! them too.
//!
//! # Transactions
//!
//! - `begin()` pins the current snapshot. Reads inside the transaction see
//!   that snapshot (repeatable read), not the transaction's own writes.
//! - Writes are buffered. A removal also cancels matching buffered adds.
//! - `commit()` applies removals, then additions, under one new version.
//! - Outside a transaction every write commits on its own and every read
//!   pins a fresh snapshot for the lifetime of its iteration.

use super::index::{StatementIndex, ValuePattern};
use super::iteration::StatementIteration;
use super::snapshot::SnapshotPin;
use super::statement::MemStatement;
use super::value::{MemValue, Role};
use super::{StoreError, StoreResult, StoreShared, Version};
use crate::iteration::{
    BoxedIteration, CloseableIteration, ConvertIteration, IterationError, IterationResult,
    VecIteration,
};
use crate::rdf::{Namespace, QuadPattern, Resource, Statement};
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Read access a query evaluator needs
pub trait TripleSource {
    /// Statements matching `pattern`, explicit and inferred
    fn match_statements(&self, pattern: &QuadPattern) -> StoreResult<BoxedIteration<Statement>>;
}

/// An iteration that its connection can close from the outside
trait TrackedIteration: Send + Sync {
    fn force_close(&self) -> IterationResult<()>;
}

struct Tracked<T> {
    iteration: Mutex<BoxedIteration<T>>,
}

impl<T> TrackedIteration for Tracked<T> {
    fn force_close(&self) -> IterationResult<()> {
        self.iteration.lock().close()
    }
}

struct ConnectionState {
    id: u64,
    open: AtomicBool,
    iterations: Mutex<FxHashMap<u64, Arc<dyn TrackedIteration>>>,
    next_iteration_id: AtomicU64,
}

impl ConnectionState {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    fn deregister(&self, iteration_id: u64) {
        if self.iterations.lock().remove(&iteration_id).is_some() {
            debug!(
                "Connection {} deregistered iteration {}",
                self.id, iteration_id
            );
        }
    }
}

/// Iteration handed out by a connection.
///
/// Registered with the connection while open. Once the connection is
/// closed every operation except `close()` fails with
/// [`IterationError::ConnectionClosed`].
pub struct ConnectionIteration<T> {
    id: u64,
    tracked: Arc<Tracked<T>>,
    connection: Arc<ConnectionState>,
    registered: bool,
}

impl<T: 'static> ConnectionIteration<T> {
    fn register(connection: &Arc<ConnectionState>, iteration: BoxedIteration<T>) -> StoreResult<Self> {
        if !connection.is_open() {
            return Err(StoreError::ConnectionClosed);
        }
        let id = connection.next_iteration_id.fetch_add(1, Ordering::Relaxed);
        let tracked = Arc::new(Tracked {
            iteration: Mutex::new(iteration),
        });
        let handle: Arc<dyn TrackedIteration> = tracked.clone();
        connection.iterations.lock().insert(id, handle);
        debug!("Connection {} registered iteration {}", connection.id, id);
        Ok(Self {
            id,
            tracked,
            connection: Arc::clone(connection),
            registered: true,
        })
    }
}

impl<T> ConnectionIteration<T> {
    fn check_connection(&self) -> IterationResult<()> {
        if self.connection.is_open() {
            Ok(())
        } else {
            Err(IterationError::ConnectionClosed)
        }
    }

    fn deregister(&mut self) {
        if self.registered {
            self.registered = false;
            self.connection.deregister(self.id);
        }
    }
}

impl<T> CloseableIteration for ConnectionIteration<T> {
    type Item = T;

    fn has_next(&mut self) -> IterationResult<bool> {
        self.check_connection()?;
        let (result, closed) = {
            let mut iteration = self.tracked.iteration.lock();
            let result = iteration.has_next();
            (result, iteration.is_closed())
        };
        if closed {
            self.deregister();
        }
        result
    }

    fn next(&mut self) -> IterationResult<T> {
        self.check_connection()?;
        let (result, closed) = {
            let mut iteration = self.tracked.iteration.lock();
            let result = iteration.next();
            (result, iteration.is_closed())
        };
        if closed {
            self.deregister();
        }
        result
    }

    fn close(&mut self) -> IterationResult<()> {
        if !self.connection.is_open() {
            // the connection already closed everything it tracked
            self.registered = false;
            return Ok(());
        }
        let result = self.tracked.iteration.lock().close();
        self.deregister();
        result
    }

    fn is_closed(&self) -> bool {
        !self.connection.is_open() || self.tracked.iteration.lock().is_closed()
    }
}

impl<T> Drop for ConnectionIteration<T> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to close iteration {} on drop: {}", self.id, e);
        }
    }
}

/// A quad given by value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Quad {
    subject: MemValue,
    predicate: MemValue,
    object: MemValue,
    context: Option<MemValue>,
}

#[derive(Debug, Clone)]
struct PendingAdd {
    quad: Quad,
    explicit: bool,
}

impl PendingAdd {
    fn from_statement(st: &Statement, explicit: bool) -> Self {
        Self {
            quad: Quad {
                subject: MemValue::from(&st.subject),
                predicate: MemValue::from(&st.predicate),
                object: MemValue::from(&st.object),
                context: st.context.as_ref().map(MemValue::from),
            },
            explicit,
        }
    }

    fn cancelled_by(&self, removal: &ValuePattern) -> bool {
        removal.explicit.map_or(true, |e| e == self.explicit)
            && removal.matches_values(
                &self.quad.subject,
                &self.quad.predicate,
                &self.quad.object,
                self.quad.context.as_ref(),
            )
    }

    fn apply(&self, index: &StatementIndex, version: Version) -> StoreResult<bool> {
        index.add_statement(
            &self.quad.subject,
            &self.quad.predicate,
            &self.quad.object,
            self.quad.context.as_ref(),
            self.explicit,
            version,
        )
    }
}

struct Transaction {
    pin: SnapshotPin,
    additions: Vec<PendingAdd>,
    /// Position of each buffered quad in `additions`
    positions: FxHashMap<Quad, usize>,
    removals: Vec<ValuePattern>,
}

impl Transaction {
    fn new(pin: SnapshotPin) -> Self {
        Self {
            pin,
            additions: Vec::new(),
            positions: FxHashMap::default(),
            removals: Vec::new(),
        }
    }

    /// Buffer an addition. A quad is buffered once; it stays explicit if
    /// any of its additions was explicit.
    fn buffer(&mut self, add: PendingAdd) {
        if let Some(&at) = self.positions.get(&add.quad) {
            self.additions[at].explicit |= add.explicit;
            return;
        }
        self.positions.insert(add.quad.clone(), self.additions.len());
        self.additions.push(add);
    }

    /// Buffer a removal and drop the buffered additions it matches
    fn remove(&mut self, removal: ValuePattern) {
        let before = self.additions.len();
        self.additions.retain(|add| !add.cancelled_by(&removal));
        if self.additions.len() != before {
            self.positions = self
                .additions
                .iter()
                .enumerate()
                .map(|(at, add)| (add.quad.clone(), at))
                .collect();
        }
        self.removals.push(removal);
    }
}

/// A client session on a [`super::MemoryStore`]
pub struct StoreConnection {
    shared: Arc<StoreShared>,
    state: Arc<ConnectionState>,
    txn: Option<Transaction>,
}

impl StoreConnection {
    pub(crate) fn new(shared: Arc<StoreShared>) -> Self {
        let id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
        debug!("Opened connection {} on {}", id, shared.id);
        Self {
            shared,
            state: Arc::new(ConnectionState {
                id,
                open: AtomicBool::new(true),
                iterations: Mutex::new(FxHashMap::default()),
                next_iteration_id: AtomicU64::new(1),
            }),
            txn: None,
        }
    }

    pub fn id(&self) -> u64 {
        self.state.id
    }

    pub fn is_open(&self) -> bool {
        self.state.is_open()
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(StoreError::ConnectionClosed)
        }
    }

    // ----- Transactions -----

    /// Start a transaction on the current snapshot
    pub fn begin(&mut self) -> StoreResult<()> {
        self.ensure_open()?;
        if self.txn.is_some() {
            return Err(StoreError::TransactionActive);
        }
        let pin = SnapshotPin::acquire(Arc::clone(&self.shared));
        debug!("Connection {} began transaction at {}", self.id(), pin.version());
        self.txn = Some(Transaction::new(pin));
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.txn.is_some()
    }

    /// Snapshot the open transaction reads, if any
    pub fn snapshot(&self) -> Option<Version> {
        self.txn.as_ref().map(|txn| txn.pin.version())
    }

    /// Apply buffered writes under a new version. Returns `None` when the
    /// transaction wrote nothing.
    pub fn commit(&mut self) -> StoreResult<Option<Version>> {
        self.ensure_open()?;
        let mut txn = self.txn.take().ok_or(StoreError::NoActiveTransaction)?;

        let committed = if txn.additions.is_empty() && txn.removals.is_empty() {
            None
        } else {
            Some(self.shared.write(|index, version| {
                for removal in &txn.removals {
                    index.remove_matching(removal, version)?;
                }
                for add in &txn.additions {
                    add.apply(index, version)?;
                }
                Ok(())
            })?)
        };

        txn.pin.release()?;
        debug!("Connection {} committed {:?}", self.id(), committed);
        Ok(committed)
    }

    /// Discard buffered writes and release the transaction's snapshot
    pub fn rollback(&mut self) -> StoreResult<()> {
        self.ensure_open()?;
        let mut txn = self.txn.take().ok_or(StoreError::NoActiveTransaction)?;
        debug!(
            "Connection {} rolled back {} additions, {} removals",
            self.id(),
            txn.additions.len(),
            txn.removals.len()
        );
        txn.pin.release()
    }

    // ----- Writes -----

    pub fn add(&mut self, statement: &Statement) -> StoreResult<()> {
        self.add_with_flag(std::slice::from_ref(statement), true)
            .map(|_| ())
    }

    pub fn add_inferred(&mut self, statement: &Statement) -> StoreResult<()> {
        self.add_with_flag(std::slice::from_ref(statement), false)
            .map(|_| ())
    }

    /// Add a stream of explicit statements, e.g. the output of a parser.
    /// Outside a transaction they all commit under one version. Returns the
    /// number of statements that were new.
    pub fn add_all<I>(&mut self, statements: I) -> StoreResult<usize>
    where
        I: IntoIterator<Item = Statement>,
    {
        let statements: Vec<Statement> = statements.into_iter().collect();
        self.add_with_flag(&statements, true)
    }

    fn add_with_flag(&mut self, statements: &[Statement], explicit: bool) -> StoreResult<usize> {
        self.ensure_open()?;
        let additions: Vec<PendingAdd> = statements
            .iter()
            .map(|st| PendingAdd::from_statement(st, explicit))
            .collect();

        if let Some(txn) = self.txn.as_mut() {
            let buffered = additions.len();
            for add in additions {
                txn.buffer(add);
            }
            return Ok(buffered);
        }

        let mut added = 0;
        self.shared.write(|index, version| {
            for add in &additions {
                if add.apply(index, version)? {
                    added += 1;
                }
            }
            Ok(())
        })?;
        Ok(added)
    }

    /// Remove explicit statements matching `pattern`
    pub fn remove_statements(&mut self, pattern: &QuadPattern) -> StoreResult<()> {
        self.remove_with_flag(pattern, true)
    }

    /// Remove inferred statements matching `pattern`
    pub fn remove_inferred(&mut self, pattern: &QuadPattern) -> StoreResult<()> {
        self.remove_with_flag(pattern, false)
    }

    /// Remove every explicit statement in `contexts`; all contexts if empty
    pub fn clear(&mut self, contexts: &[Option<Resource>]) -> StoreResult<()> {
        self.remove_statements(&QuadPattern::any().with_contexts(contexts.to_vec()))
    }

    fn remove_with_flag(&mut self, pattern: &QuadPattern, explicit: bool) -> StoreResult<()> {
        self.ensure_open()?;
        let mut removal = ValuePattern::from_quad_pattern(pattern, true);
        removal.explicit = Some(explicit);

        if let Some(txn) = self.txn.as_mut() {
            txn.remove(removal);
            return Ok(());
        }

        self.shared.write(|index, version| {
            index.remove_matching(&removal, version).map(|_| ())
        })?;
        Ok(())
    }

    // ----- Reads -----

    fn read_pin(&self) -> StoreResult<SnapshotPin> {
        match &self.txn {
            Some(txn) => txn.pin.share(),
            None => Ok(SnapshotPin::acquire(Arc::clone(&self.shared))),
        }
    }

    fn raw_statements(&self, pattern: &ValuePattern) -> StoreResult<StatementIteration> {
        let pin = self.read_pin()?;
        Ok(match self.shared.index.select(pattern)? {
            Some((resolved, candidates)) => StatementIteration::new(candidates, resolved, pin),
            None => StatementIteration::nothing(pin),
        })
    }

    /// Statements matching `pattern` in this connection's view
    pub fn get_statements(
        &self,
        pattern: &QuadPattern,
        include_inferred: bool,
    ) -> StoreResult<ConnectionIteration<Statement>> {
        self.ensure_open()?;
        let raw = self.raw_statements(&ValuePattern::from_quad_pattern(pattern, include_inferred))?;
        let shared = Arc::clone(&self.shared);
        let statements = ConvertIteration::new(raw, move |st: Arc<MemStatement>| {
            shared
                .to_statement(&st)
                .map_err(|e| IterationError::Store(e.to_string()))
        });
        let boxed: BoxedIteration<Statement> = Box::new(statements);
        ConnectionIteration::register(&self.state, boxed)
    }

    pub fn has_statement(&self, pattern: &QuadPattern, include_inferred: bool) -> StoreResult<bool> {
        let mut iter = self.get_statements(pattern, include_inferred)?;
        let found = iter.has_next();
        let closed = iter.close();
        let found = found?;
        closed?;
        Ok(found)
    }

    /// Number of explicit statements in `contexts`; all contexts if empty
    pub fn size(&self, contexts: &[Option<Resource>]) -> StoreResult<usize> {
        self.ensure_open()?;
        let mut iter = self.raw_statements(&ValuePattern::for_contexts(contexts, Some(true)))?;
        let mut count = 0;
        while iter.has_next()? {
            iter.next()?;
            count += 1;
        }
        Ok(count)
    }

    /// Named contexts that hold at least one visible statement
    pub fn contexts(&self) -> StoreResult<ConnectionIteration<Resource>> {
        self.ensure_open()?;
        let mut iter = self.raw_statements(&ValuePattern::default())?;
        let mut seen = FxHashSet::default();
        let mut contexts = Vec::new();
        // resolved while the iteration still pins the snapshot
        while iter.has_next()? {
            if let Some(context) = iter.next()?.context() {
                if seen.insert(context) {
                    let value = self.shared.index.resolve(context)?;
                    contexts.push(value.to_resource(Role::Context)?);
                }
            }
        }
        let boxed: BoxedIteration<Resource> = Box::new(VecIteration::new(contexts));
        ConnectionIteration::register(&self.state, boxed)
    }

    // ----- Namespaces -----

    pub fn set_namespace(&mut self, prefix: &str, iri: &str) -> StoreResult<()> {
        self.ensure_open()?;
        self.shared.namespaces.write().set(prefix, iri);
        Ok(())
    }

    pub fn namespace(&self, prefix: &str) -> StoreResult<Option<String>> {
        self.ensure_open()?;
        Ok(self.shared.namespaces.read().get(prefix).map(str::to_string))
    }

    pub fn remove_namespace(&mut self, prefix: &str) -> StoreResult<()> {
        self.ensure_open()?;
        self.shared.namespaces.write().remove(prefix);
        Ok(())
    }

    pub fn clear_namespaces(&mut self) -> StoreResult<()> {
        self.ensure_open()?;
        self.shared.namespaces.write().clear();
        Ok(())
    }

    pub fn namespaces(&self) -> StoreResult<ConnectionIteration<Namespace>> {
        self.ensure_open()?;
        let namespaces = self.shared.namespaces.read().namespaces();
        let boxed: BoxedIteration<Namespace> = Box::new(VecIteration::new(namespaces));
        ConnectionIteration::register(&self.state, boxed)
    }

    // ----- Lifecycle -----

    /// Iterations handed out by this connection that are still open
    pub fn open_iteration_count(&self) -> usize {
        self.state.iterations.lock().len()
    }

    /// Close every open iteration, roll back an open transaction and
    /// release the connection's snapshot. Idempotent.
    ///
    /// Every iteration gets its close attempt; failures are collected into
    /// [`StoreError::CloseFailed`] after the connection is fully released.
    pub fn close(&mut self) -> StoreResult<()> {
        if !self.state.open.swap(false, Ordering::AcqRel) {
            return Ok(());
        }

        let tracked: Vec<Arc<dyn TrackedIteration>> = self
            .state
            .iterations
            .lock()
            .drain()
            .map(|(_, iteration)| iteration)
            .collect();
        let forced = tracked.len();

        let mut errors: Vec<IterationError> = tracked
            .iter()
            .filter_map(|iteration| iteration.force_close().err())
            .collect();

        if let Some(mut txn) = self.txn.take() {
            debug!("Connection {} rolled back on close", self.id());
            if let Err(e) = txn.pin.release() {
                errors.push(IterationError::Store(e.to_string()));
            }
        }

        info!(
            "Closed connection {} ({} iterations force-closed)",
            self.id(),
            forced
        );
        if errors.is_empty() {
            Ok(())
        } else {
            for e in &errors {
                warn!("Connection {} close error: {}", self.id(), e);
            }
            Err(StoreError::CloseFailed(errors))
        }
    }
}

impl TripleSource for StoreConnection {
    fn match_statements(&self, pattern: &QuadPattern) -> StoreResult<BoxedIteration<Statement>> {
        Ok(Box::new(self.get_statements(pattern, true)?))
    }
}

impl Drop for StoreConnection {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to close connection {} on drop: {}", self.id(), e);
        }
    }
}
