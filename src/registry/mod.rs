//! External package client interface.
//!
//! The installer treats the host package manager as a remote collaborator:
//! three synchronous existence checks against its persisted manifest, and
//! two add operations that run as background tasks. An add returns an
//! [`AddRequest`] handle carrying a progress side channel, a completion
//! flag, and the awaitable outcome; a failed add surfaces the remote error
//! message through [`AddRequest::wait`].

pub mod manifest;

pub use manifest::ManifestPackageClient;

use std::future::Future;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::catalog::ScopedRegistry;
use crate::error::{KitbagError, Result};

/// Host package manager operations consumed by the installer.
pub trait PackageClient: Send + Sync {
    /// True if the package identifier is already present.
    fn package_added(&self, identifier: &str) -> bool;

    /// True if the registry package of this name is already present.
    fn registry_added(&self, name: &str) -> bool;

    /// True if a scoped registry with this name and url is already present.
    fn scoped_registry_added(&self, name: &str, url: &str) -> bool;

    /// Starts adding a package by source identifier.
    fn add_package(&self, identifier: &str) -> AddRequest;

    /// Starts adding a scoped registry.
    fn add_scoped_registry(&self, registry: &ScopedRegistry) -> AddRequest;
}

/// Reporter handed to the work future of an [`AddRequest`].
pub struct AddProgress {
    tx: watch::Sender<f32>,
}

impl AddProgress {
    /// Publishes a progress fraction; values are clamped so the visible
    /// fraction stays below 1.0 until the request completes.
    pub fn report(&self, fraction: f32) {
        let _ = self.tx.send(fraction.clamp(0.0, 0.99));
    }
}

/// Handle to one in-flight external add operation.
pub struct AddRequest {
    progress: watch::Receiver<f32>,
    handle: JoinHandle<Result<()>>,
}

impl AddRequest {
    /// Spawns the work future onto the current tokio runtime and returns
    /// the handle the installer awaits. Must be called within a runtime.
    pub fn spawn<F, Fut>(work: F) -> Self
    where
        F: FnOnce(AddProgress) -> Fut,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let (tx, rx) = watch::channel(0.0f32);
        let handle = tokio::spawn(work(AddProgress { tx }));
        Self {
            progress: rx,
            handle,
        }
    }

    /// Request that completed before it started; useful for clients whose
    /// add is trivial and for test doubles.
    pub fn ready(result: Result<()>) -> Self {
        Self::spawn(|_progress| async move { result })
    }

    /// Last published progress fraction, in `[0, 1)`.
    pub fn progress(&self) -> f32 {
        *self.progress.borrow()
    }

    /// True once the underlying task has finished, successfully or not.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Awaits completion. Failures carry the remote error message; a task
    /// that panicked or was aborted is reported as a registry failure.
    pub async fn wait(self) -> Result<()> {
        match self.handle.await {
            Ok(outcome) => outcome,
            Err(err) => Err(KitbagError::Registry(format!("add task aborted: {err}"))),
        }
    }
}
