use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::actions::{CycleActions, ExecutorUpdate};
use crate::error::Result;

/// Carries out create/stop actions and reports position status back
///
/// The controller never places orders itself: it hands actions to a runtime
/// and learns about fills and closes only through `poll_updates`.
#[async_trait]
pub trait ExecutorRuntime: Send {
    /// Submit the actions of one cycle
    async fn execute(&mut self, actions: &CycleActions) -> Result<()>;

    /// Drain status changes since the last poll
    async fn poll_updates(&mut self, now: DateTime<Utc>) -> Result<Vec<ExecutorUpdate>>;
}
