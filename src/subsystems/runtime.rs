//! Shared subsystem scaffolding.
//!
//! A subsystem spawns its long-lived task itself and hands back a
//! [`SubsystemHandle`]. The owner can `.await` it after cancelling the shared
//! `CancellationToken` to make sure the task has actually exited.

use tokio::task::JoinHandle;

use crate::error::AppError;

/// An opaque handle to a running subsystem task.
#[derive(Debug)]
pub struct SubsystemHandle {
    name: &'static str,
    inner: JoinHandle<Result<(), AppError>>,
}

impl SubsystemHandle {
    pub fn from_handle(name: &'static str, handle: JoinHandle<Result<(), AppError>>) -> Self {
        Self { name, inner: handle }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }

    /// Await the task and return its error, if any.
    pub async fn join(self) -> Result<(), AppError> {
        match self.inner.await {
            Ok(r) => r,
            Err(e) => Err(AppError::Task(format!("{} task panicked: {e}", self.name))),
        }
    }
}
