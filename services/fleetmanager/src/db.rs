//! Transaction-scoped database contexts.
//!
//! # Purpose
//! The reconciler drives every per-row transition through a transaction bound
//! to a long-lived context. This module owns that contract:
//!
//! - [`ConnectionFactory::new_context`] hands out a [`TxContext`], a cheaply
//!   cloneable handle to one transaction slot.
//! - [`in_transaction`] begins a transaction on the context, runs the caller's
//!   closure, marks the transaction for rollback if the closure errored, and
//!   **always** resolves the context so connection resources and post-commit
//!   callbacks are released exactly once.
//! - [`TxContext::add_post_commit_action`] queues work to run after a
//!   successful commit. Callbacks run in registration order, exactly once per
//!   commit, and never on rollback.
//!
//! # Rollback marking
//! The rollback mark is sticky: once a context is marked, resolve rolls the
//! transaction back no matter what happens afterwards, and the first recorded
//! reason wins.
//!
//! # Backends
//! The Postgres backend opens a real `sqlx` transaction per begin/resolve
//! cycle. The memory backend (used by the in-memory store, mirroring its
//! serialized-mutation consistency model) tracks only the open flag, the
//! rollback mark, and the post-commit queue; the mutation-atomicity guarantees
//! come from the durable backend.
use crate::store::{StoreError, StoreResult};
use anyhow::anyhow;
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard};

/// Transaction lifecycle failures, distinguished from whatever the
/// transactional closure itself returned.
#[derive(Debug, Error)]
pub enum TxError {
    #[error("failed to begin transaction: {0}")]
    Begin(#[source] anyhow::Error),
    #[error("failed to resolve transaction: {0}")]
    Resolve(#[source] anyhow::Error),
}

#[derive(Clone)]
enum Backend {
    Postgres(PgPool),
    Memory,
}

/// Produces transaction contexts for one configured backend.
#[derive(Clone)]
pub struct ConnectionFactory {
    backend: Backend,
}

impl ConnectionFactory {
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            backend: Backend::Postgres(pool),
        }
    }

    pub fn memory() -> Self {
        Self {
            backend: Backend::Memory,
        }
    }

    /// Create a fresh context with no transaction open.
    ///
    /// The reconciler keeps one context per process and reuses it for every
    /// per-row transaction; contexts are not tied to a single transaction.
    pub fn new_context(&self) -> TxContext {
        TxContext {
            state: Arc::new(Mutex::new(TxState {
                backend: self.backend.clone(),
                tx: None,
                open: false,
                rollback: None,
                post_commit: Vec::new(),
            })),
        }
    }
}

type PostCommitAction = Box<dyn FnOnce() + Send>;

pub(crate) struct TxState {
    backend: Backend,
    tx: Option<Transaction<'static, Postgres>>,
    open: bool,
    rollback: Option<String>,
    post_commit: Vec<PostCommitAction>,
}

impl TxState {
    /// The connection of the currently open Postgres transaction.
    ///
    /// Store implementations call this to run statements inside the scope.
    pub(crate) fn pg_conn(&mut self) -> StoreResult<&mut PgConnection> {
        self.tx
            .as_deref_mut()
            .ok_or_else(|| StoreError::Unexpected(anyhow!("no open transaction on context")))
    }
}

/// Handle to one transaction slot. Clones share the slot.
#[derive(Clone)]
pub struct TxContext {
    state: Arc<Mutex<TxState>>,
}

impl TxContext {
    pub(crate) async fn lock_state(&self) -> MutexGuard<'_, TxState> {
        self.state.lock().await
    }

    /// Begin a transaction on this context.
    ///
    /// Contexts are single-level: beginning while a transaction is already
    /// open is a lifecycle error, not a nested transaction.
    pub async fn begin(&self) -> Result<(), TxError> {
        let mut state = self.state.lock().await;
        if state.open {
            return Err(TxError::Begin(anyhow!("transaction already open")));
        }
        let pool = match &state.backend {
            Backend::Postgres(pool) => Some(pool.clone()),
            Backend::Memory => None,
        };
        if let Some(pool) = pool {
            let tx = pool.begin().await.map_err(|e| TxError::Begin(e.into()))?;
            state.tx = Some(tx);
        }
        state.open = true;
        state.rollback = None;
        Ok(())
    }

    /// Mark the open transaction for rollback. Sticky: the first reason wins
    /// and resolve will roll back regardless of later activity.
    pub async fn mark_for_rollback(&self, reason: impl Display) {
        let mut state = self.state.lock().await;
        if state.rollback.is_none() {
            state.rollback = Some(reason.to_string());
        }
    }

    /// Queue `action` to run after the open transaction commits.
    ///
    /// Actions run in registration order and are dropped on rollback.
    pub async fn add_post_commit_action(
        &self,
        action: impl FnOnce() + Send + 'static,
    ) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        if !state.open {
            return Err(StoreError::Unexpected(anyhow!(
                "cannot register post-commit action: no open transaction"
            )));
        }
        state.post_commit.push(Box::new(action));
        Ok(())
    }

    /// Commit or roll back the open transaction and drain the context.
    ///
    /// Post-commit actions run only after a successful commit; a commit
    /// failure or a rollback mark discards them.
    pub async fn resolve(&self) -> Result<(), TxError> {
        let mut state = self.state.lock().await;
        if !state.open {
            return Err(TxError::Resolve(anyhow!("no open transaction to resolve")));
        }
        state.open = false;
        let tx = state.tx.take();
        let rollback = state.rollback.take();
        let actions = std::mem::take(&mut state.post_commit);

        match rollback {
            Some(reason) => {
                tracing::debug!(%reason, "rolling back transaction");
                if let Some(tx) = tx {
                    tx.rollback()
                        .await
                        .map_err(|e| TxError::Resolve(e.into()))?;
                }
            }
            None => {
                if let Some(tx) = tx {
                    tx.commit().await.map_err(|e| TxError::Resolve(e.into()))?;
                }
                for action in actions {
                    action();
                }
            }
        }
        Ok(())
    }
}

/// Run `f` inside a transaction on `ctx`.
///
/// The closure's error marks the transaction for rollback and is preserved as
/// the result; begin/resolve failures surface as [`TxError`] instead. Resolve
/// runs on every exit path.
pub async fn in_transaction<F, Fut, E>(ctx: &TxContext, f: F) -> Result<(), E>
where
    F: FnOnce(TxContext) -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: From<TxError> + Display,
{
    ctx.begin().await.map_err(E::from)?;
    let result = f(ctx.clone()).await;
    if let Err(err) = &result {
        ctx.mark_for_rollback(err).await;
    }
    match ctx.resolve().await {
        Err(resolve_err) => Err(E::from(resolve_err)),
        Ok(()) => result,
    }
}
