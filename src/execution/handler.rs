//! In-process tool handlers run on a tokio task.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;
use tokio::task::JoinHandle;

use super::error::ExecutionError;
use super::runner::{ActionOutcome, RunningAction, ToolRunner};
use crate::permissions::ToolInvocationRequest;

/// An async tool implemented in the host process.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// `Err` is a failed run, not a supervisor error.
    async fn call(&self, input: Value) -> Result<String, String>;
}

type HandlerFn = dyn Fn(Value) -> BoxFuture<'static, Result<String, String>> + Send + Sync;

struct FnHandler(Box<HandlerFn>);

#[async_trait]
impl ToolHandler for FnHandler {
    async fn call(&self, input: Value) -> Result<String, String> {
        (self.0)(input).await
    }
}

/// Runs a [`ToolHandler`] on its own task so it can be aborted.
#[derive(Clone)]
pub struct HandlerRunner {
    handler: Arc<dyn ToolHandler>,
}

impl HandlerRunner {
    pub fn new(handler: Arc<dyn ToolHandler>) -> Self {
        Self { handler }
    }

    pub fn from_fn<F, Fut>(f: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, String>> + Send + 'static,
    {
        let handler = FnHandler(Box::new(move |input| Box::pin(f(input))));
        Self::new(Arc::new(handler))
    }
}

impl fmt::Debug for HandlerRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRunner").finish_non_exhaustive()
    }
}

#[async_trait]
impl ToolRunner for HandlerRunner {
    async fn spawn(
        &self,
        request: &ToolInvocationRequest,
    ) -> Result<Box<dyn RunningAction>, ExecutionError> {
        let handler = Arc::clone(&self.handler);
        let input = request.input().clone();
        let task = tokio::spawn(async move { handler.call(input).await });
        Ok(Box::new(HandlerAction {
            task,
            finished: false,
        }))
    }
}

struct HandlerAction {
    task: JoinHandle<Result<String, String>>,
    finished: bool,
}

#[async_trait]
impl RunningAction for HandlerAction {
    async fn wait(&mut self) -> ActionOutcome {
        if self.finished {
            return ActionOutcome::failure("handler already finished", None);
        }
        let joined = (&mut self.task).await;
        self.finished = true;
        match joined {
            Ok(Ok(output)) => ActionOutcome::success(output),
            Ok(Err(message)) => ActionOutcome::failure(message, None),
            Err(e) => ActionOutcome::failure(format!("handler panicked: {}", e), None),
        }
    }

    async fn terminate(&mut self, grace: Duration) -> Result<(), String> {
        if self.finished || self.task.is_finished() {
            return Ok(());
        }
        self.task.abort();
        match tokio::time::timeout(grace, &mut self.task).await {
            Ok(_) => {
                self.finished = true;
                Ok(())
            }
            Err(_) => Err(format!(
                "handler task still running {}ms after abort",
                grace.as_millis()
            )),
        }
    }
}

impl Drop for HandlerAction {
    fn drop(&mut self) {
        self.task.abort();
    }
}
