//! Test doubles for stage and pipeline testing.
//!
//! [`ScriptedFlow`] plays a queued sequence of pull results and records
//! every pushed message, giving stage tests precise control over what the
//! downstream side does without any real transport.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::Flow;
use crate::error::FlowError;
use crate::message::Message;

/// A downstream flow scripted by the test.
///
/// Pull results are served from a queue in FIFO order; an exhausted queue
/// reports [`FlowError::Closed`]. Pushes succeed and are recorded unless a
/// failure has been injected with [`fail_next_push`](Self::fail_next_push).
#[derive(Default)]
pub struct ScriptedFlow {
    pulls: Mutex<VecDeque<Result<Message, FlowError>>>,
    pushed: Mutex<Vec<Message>>,
    push_failure: Mutex<Option<FlowError>>,
    closed: AtomicUsize,
}

impl ScriptedFlow {
    /// An empty script: every pull reports `Closed`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the next pull result.
    pub fn enqueue_pull(&self, result: Result<Message, FlowError>) {
        self.pulls
            .lock()
            .expect("pull queue lock")
            .push_back(result);
    }

    /// Make the next push fail with `error`.
    pub fn fail_next_push(&self, error: FlowError) {
        *self.push_failure.lock().expect("push failure lock") = Some(error);
    }

    /// Messages pushed so far, in order.
    #[must_use]
    pub fn pushed(&self) -> Vec<Message> {
        self.pushed.lock().expect("pushed lock").clone()
    }

    /// How many times `close` has been invoked.
    #[must_use]
    pub fn close_count(&self) -> usize {
        self.closed.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Flow for ScriptedFlow {
    async fn push(&self, message: Message, _ctx: &CancellationToken) -> Result<(), FlowError> {
        if let Some(error) = self.push_failure.lock().expect("push failure lock").take() {
            return Err(error);
        }
        self.pushed.lock().expect("pushed lock").push(message);
        Ok(())
    }

    async fn pull(&self, _ctx: &CancellationToken) -> Result<Message, FlowError> {
        self.pulls
            .lock()
            .expect("pull queue lock")
            .pop_front()
            .unwrap_or(Err(FlowError::Closed))
    }

    fn close(&self) {
        self.closed.fetch_add(1, Ordering::Relaxed);
    }
}
