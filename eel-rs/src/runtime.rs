//! Evaluation runtime.
//!
//! Every evaluation goes through [`run`]. Panics escaping an executor are
//! caught and reported as [`Error::Execution`]; errors of the crate's own
//! family come back untouched. When the context sets a timeout the root
//! executor runs on a tokio blocking thread and the caller waits at most
//! that long. On expiry the evaluation's [`Cancellation`] is raised so the
//! abandoned body stops at its next checkpoint, and the caller gets
//! [`Error::Timeout`] straight away.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::{Duration, Instant};

use tokio::runtime::{Builder, Handle, Runtime};
use tracing::warn;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::lang::compiler::{Executor, Scope};
use crate::symbols::SymbolsTable;
use crate::value::Value;

// ── Cancellation ──────────────────────────────────────────────────────────────

/// Shared flag telling one evaluation to stop.
#[derive(Debug, Clone, Default)]
pub struct Cancellation(Arc<AtomicBool>);

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// `Err(Error::Interrupted)` once cancelled.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Interrupted)
        } else {
            Ok(())
        }
    }
}

// ── Timer ─────────────────────────────────────────────────────────────────────

/// The background runtime used for timed evaluations, started on first use.
#[derive(Default)]
pub(crate) struct Timer {
    runtime: OnceLock<Runtime>,
    starting: Mutex<()>,
}

impl Timer {
    fn runtime(&self) -> Result<&Runtime> {
        if let Some(runtime) = self.runtime.get() {
            return Ok(runtime);
        }
        // Only one caller builds; the others find it set once they get the lock.
        let _starting = self.starting.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(runtime) = self.runtime.get() {
            return Ok(runtime);
        }
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("eel-timer")
            .enable_time()
            .build()?;
        Ok(self.runtime.get_or_init(|| runtime))
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        // Abandoned bodies may still be running; never wait for them.
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

impl std::fmt::Debug for Timer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Timer")
            .field("started", &self.runtime.get().is_some())
            .finish()
    }
}

// ── Entry points ──────────────────────────────────────────────────────────────

/// Evaluate `root` against `symbols` under `context`'s timeout.
pub(crate) fn run(root: &Executor, symbols: &SymbolsTable, context: &Context) -> Result<Value> {
    let Some(limit) = context.timeout() else {
        return guarded(root, symbols, &Cancellation::new());
    };
    let runtime = context.timer().runtime()?;
    let wait = timed(root.clone(), symbols.clone(), limit);
    if Handle::try_current().is_err() {
        return runtime.block_on(wait);
    }
    // Already inside a runtime: blocking here would panic, so wait on a
    // plain thread instead.
    std::thread::scope(|s| {
        s.spawn(|| runtime.block_on(wait))
            .join()
            .unwrap_or_else(|payload| Err(Error::from_panic(payload)))
    })
}

/// [`run`] for callers already inside a tokio runtime.
pub(crate) async fn run_async(
    root: &Executor,
    symbols: &SymbolsTable,
    context: &Context,
) -> Result<Value> {
    match context.timeout() {
        Some(limit) => timed(root.clone(), symbols.clone(), limit).await,
        None => guarded(root, symbols, &Cancellation::new()),
    }
}

/// Run `root` directly, turning a panic into [`Error::Execution`].
fn guarded(root: &Executor, symbols: &SymbolsTable, cancel: &Cancellation) -> Result<Value> {
    let scope = Scope::new(symbols, cancel);
    catch_unwind(AssertUnwindSafe(|| root(&scope))).unwrap_or_else(|payload| Err(Error::from_panic(payload)))
}

async fn timed(root: Executor, symbols: SymbolsTable, limit: Duration) -> Result<Value> {
    let cancel = Cancellation::new();
    let flag = cancel.clone();
    let started = Instant::now();
    let task = tokio::task::spawn_blocking(move || guarded(&root, &symbols, &flag));
    match tokio::time::timeout(limit, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(join)) => match join.try_into_panic() {
            Ok(payload) => Err(Error::from_panic(payload)),
            Err(_) => Err(Error::Interrupted),
        },
        Err(_) => {
            cancel.cancel();
            let seconds = started.elapsed().as_secs();
            warn!(limit_ms = limit.as_millis() as u64, seconds, "abandoned timed evaluation");
            Err(Error::Timeout { seconds })
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
