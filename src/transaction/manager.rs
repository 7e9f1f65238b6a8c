use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tokio::sync::{Mutex as AsyncMutex, OwnedMappedMutexGuard, OwnedMutexGuard};
use tracing::{debug, warn};

use crate::error::DualSqlError;
use crate::statement::ControlStatement;

use super::context::{self, AmbientChains, CallChain};
use super::lease::Lease;
use super::source::LeaseSource;

/// Per-chain holder for at most one lease.
pub type LeaseSlot<S> = AsyncMutex<Option<Lease<S>>>;

/// Native begin that the server rejects, used by the begin-failure test hook.
pub(crate) const FAILING_BEGIN: &str = "BEGIN ISOLATION LEVEL UNDEFINED";

static NEXT_MANAGER_ID: AtomicU64 = AtomicU64::new(1);

/// Where a regular statement should run.
pub enum Route<S: LeaseSource> {
    /// The call chain's open transaction. Held exclusively until dropped.
    Leased(OwnedMappedMutexGuard<Option<Lease<S>>, S::Conn>),
    /// A connection checked out of the pool for this one statement.
    Pooled(S::Conn),
}

impl<S: LeaseSource> Route<S> {
    #[must_use]
    pub fn conn(&self) -> &S::Conn {
        match self {
            Route::Leased(guard) => &**guard,
            Route::Pooled(conn) => conn,
        }
    }

    #[must_use]
    pub fn is_leased(&self) -> bool {
        matches!(self, Route::Leased(_))
    }
}

/// Binds leased connections to call chains and routes statements to them.
///
/// States per chain: idle (no lease) and in-transaction (one lease). `BEGIN` leases and
/// begins, `COMMIT`/`ROLLBACK` finish and always release, everything else runs on the lease
/// when one is bound and on the pool otherwise. Outside any scope the chain is the current task.
pub struct TransactionManager<S: LeaseSource> {
    id: u64,
    source: Arc<S>,
    ambient: AmbientChains,
    open: Mutex<HashMap<u64, Weak<LeaseSlot<S>>>>,
    fail_next_begin: AtomicBool,
    closed: AtomicBool,
}

impl<S: LeaseSource> TransactionManager<S> {
    #[must_use]
    pub fn new(source: S) -> Self {
        Self {
            id: NEXT_MANAGER_ID.fetch_add(1, Ordering::Relaxed),
            source: Arc::new(source),
            ambient: AmbientChains::default(),
            open: Mutex::new(HashMap::new()),
            fail_next_begin: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Apply a control statement for the current call chain.
    ///
    /// # Errors
    /// See [`Self::begin`] and [`Self::finish`].
    pub async fn control(&self, statement: ControlStatement) -> Result<(), DualSqlError> {
        match statement {
            ControlStatement::Begin => self.begin().await,
            ControlStatement::Commit | ControlStatement::Rollback => self.finish(statement).await,
        }
    }

    /// Lease a connection, begin on it and bind it to the current call chain.
    ///
    /// # Errors
    /// - [`DualSqlError::TransactionAlreadyStarted`] if the chain already holds a lease, which
    ///   is left untouched
    /// - [`DualSqlError::Closed`] if the manager closes before the lease is bound; the new
    ///   transaction is rolled back
    /// - the pool or native error otherwise; the connection is released first
    pub async fn begin(&self) -> Result<(), DualSqlError> {
        self.ensure_open()?;
        let chain = context::current().unwrap_or_else(|| self.ambient.current_or_insert());
        let slot: Arc<LeaseSlot<S>> = chain.slot(self.id, || AsyncMutex::new(None));
        let mut bound = slot.lock().await;
        if bound.is_some() {
            return Err(DualSqlError::TransactionAlreadyStarted);
        }

        let conn = match self.source.acquire().await {
            Ok(conn) => conn,
            Err(err) => {
                self.ambient.release(&chain);
                return Err(err);
            }
        };
        let begin_sql = if self.fail_next_begin.swap(false, Ordering::SeqCst) {
            FAILING_BEGIN
        } else {
            ControlStatement::Begin.native_sql()
        };
        if let Err(err) = self.source.command(&conn, begin_sql).await {
            warn!(chain = chain.id(), error = %err, "begin failed; releasing connection");
            drop(conn);
            self.ambient.release(&chain);
            return Err(err);
        }

        *bound = Some(Lease::new(conn, Arc::clone(&self.source)));
        drop(bound);
        self.register(&chain, &slot);

        // close may have drained the registry while the connection was being set up
        if self.is_closed() {
            let lease = slot.lock().await.take();
            self.forget(chain.id());
            self.ambient.release(&chain);
            if let Some(lease) = lease {
                warn!(chain = chain.id(), "closed during begin; rolling back");
                if let Err(err) = lease
                    .finish(ControlStatement::Rollback.native_sql())
                    .await
                {
                    warn!(chain = chain.id(), error = %err, "rollback after close failed");
                }
            }
            return Err(DualSqlError::Closed);
        }
        debug!(chain = chain.id(), "transaction started");
        Ok(())
    }

    /// Commit or roll back the current chain's transaction. No-op when none is open.
    ///
    /// # Errors
    /// Returns the native error from the terminal command; the lease is released regardless.
    pub async fn finish(&self, statement: ControlStatement) -> Result<(), DualSqlError> {
        let Some(chain) = self.current_chain() else {
            debug!(?statement, "no open transaction");
            return Ok(());
        };
        let Some(slot) = chain.existing_slot::<LeaseSlot<S>>(self.id) else {
            debug!(chain = chain.id(), ?statement, "no open transaction");
            return Ok(());
        };
        let lease = slot.lock().await.take();
        self.ambient.release(&chain);
        let Some(lease) = lease else {
            debug!(chain = chain.id(), ?statement, "no open transaction");
            return Ok(());
        };
        self.forget(chain.id());

        let outcome = lease.finish(statement.native_sql()).await;
        match &outcome {
            Ok(()) => debug!(chain = chain.id(), ?statement, "transaction finished"),
            Err(err) => warn!(chain = chain.id(), ?statement, error = %err, "transaction end failed; connection released"),
        }
        outcome
    }

    /// The connection a regular statement should use in the current call chain.
    ///
    /// # Errors
    /// Returns [`DualSqlError::Closed`] after [`Self::close`], or the pool error.
    pub async fn route(&self) -> Result<Route<S>, DualSqlError> {
        self.ensure_open()?;
        if let Some(slot) = self
            .current_chain()
            .and_then(|chain| chain.existing_slot::<LeaseSlot<S>>(self.id))
        {
            let guard = slot.lock_owned().await;
            if let Ok(leased) =
                OwnedMutexGuard::try_map(guard, |bound| bound.as_mut().and_then(Lease::conn_mut))
            {
                return Ok(Route::Leased(leased));
            }
        }
        Ok(Route::Pooled(self.source.acquire().await?))
    }

    /// Refuse new work and roll back every transaction still bound to a chain.
    ///
    /// Rollback errors are logged and swallowed.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let slots: Vec<Arc<LeaseSlot<S>>> = self
            .open
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .filter_map(|(_, slot)| slot.upgrade())
            .collect();
        self.ambient.clear();

        for slot in slots {
            let lease = slot.lock().await.take();
            if let Some(lease) = lease {
                warn!("closing with an open transaction; rolling back");
                if let Err(err) = lease
                    .finish(ControlStatement::Rollback.native_sql())
                    .await
                {
                    warn!(error = %err, "rollback during close failed");
                }
            }
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Make the next native begin command fail.
    #[doc(hidden)]
    pub fn fail_next_begin_for_tests(&self) {
        self.fail_next_begin.store(true, Ordering::SeqCst);
    }

    fn current_chain(&self) -> Option<Arc<CallChain>> {
        context::current().or_else(|| self.ambient.current())
    }

    fn ensure_open(&self) -> Result<(), DualSqlError> {
        if self.is_closed() {
            Err(DualSqlError::Closed)
        } else {
            Ok(())
        }
    }

    fn register(&self, chain: &CallChain, slot: &Arc<LeaseSlot<S>>) {
        let mut open = self.open.lock().unwrap_or_else(PoisonError::into_inner);
        open.retain(|_, slot| slot.strong_count() > 0);
        open.insert(chain.id(), Arc::downgrade(slot));
    }

    fn forget(&self, chain_id: u64) {
        self.open
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&chain_id);
    }
}
