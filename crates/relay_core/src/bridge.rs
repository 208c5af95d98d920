//! The concurrency bridge (spec C2, §4.2).
//!
//! Mesh packets arrive on the radio connection's own task; relaying them
//! onto Matrix means scheduling async work onto the Matrix client's
//! runtime from wherever that arrival happened. `MatrixBridge` resolves
//! which runtime to submit onto with a three-tier order: the caller's
//! own current Tokio context if it's already inside one, else the
//! runtime handle captured when the bridge was built, else a submission
//! error rather than a silent drop or panic. Once shutdown is requested
//! no further work is accepted.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("bridge is shutting down, submission refused")]
    ShuttingDown,
    #[error("no Tokio runtime available to run the submitted task on")]
    NoRuntime,
}

#[derive(Clone)]
pub struct MatrixBridge {
    captured_handle: Option<Handle>,
    shutting_down: Arc<AtomicBool>,
}

impl MatrixBridge {
    /// Capture the current runtime handle, if any, as the fallback tier.
    pub fn new() -> Self {
        Self {
            captured_handle: Handle::try_current().ok(),
            shutting_down: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_handle(handle: Handle) -> Self {
        Self { captured_handle: Some(handle), shutting_down: Arc::new(AtomicBool::new(false)) }
    }

    pub fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Resolve the runtime to submit onto: the ambient current context if
    /// one exists, else the captured handle, else `NoRuntime`.
    fn resolve_handle(&self) -> Result<Handle, BridgeError> {
        if let Ok(handle) = Handle::try_current() {
            return Ok(handle);
        }
        self.captured_handle.clone().ok_or(BridgeError::NoRuntime)
    }

    /// Submit a future to run to completion, awaitable by the caller.
    pub fn submit<F>(&self, future: F) -> Result<JoinHandle<F::Output>, BridgeError>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        if self.is_shutting_down() {
            return Err(BridgeError::ShuttingDown);
        }
        let handle = self.resolve_handle()?;
        Ok(handle.spawn(future))
    }

    /// Submit a future fire-and-forget: errors from `future` itself are
    /// the caller's concern, but submission failures (shutdown, no
    /// runtime) are logged here since there is nothing to await.
    pub fn submit_detached<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        match self.submit(future) {
            Ok(_join) => {}
            Err(error) => tracing::warn!(%error, "dropped task submitted to matrix bridge"),
        }
    }
}

impl Default for MatrixBridge {
    fn default() -> Self {
        Self::new()
    }
}
