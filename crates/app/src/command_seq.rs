//! Command sequence — an ordered chain of acknowledgement-gated steps.
//!
//! Each step receives a [`Completion`] synthesized by the sequence. The next
//! step only starts once the previous one resolved it with `Ok`. The first
//! failure stops the chain: remaining steps are dropped without running and
//! the overall completion receives that failure. The overall completion is
//! resolved exactly once per run, after the last step (or immediately for an
//! empty sequence), with the last step's message.
//!
//! Steps are not retried here; retries and timeouts belong to the transport.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use linkhub_domain::error::SequenceError;

use crate::completion::{CommandResult, Completion};

/// One step of a sequence. It owns its bound arguments.
pub type Step = Box<dyn FnOnce(Completion) + Send>;

/// Box a closure as a [`Step`].
pub fn step<F>(f: F) -> Step
where
    F: FnOnce(Completion) + Send + 'static,
{
    Box::new(f)
}

struct SeqState {
    name: String,
    steps: VecDeque<Step>,
    total: usize,
    started: bool,
    last_message: Option<String>,
    on_done: Option<Completion>,
}

/// Ordered chain of asynchronous operations.
///
/// The handle is cheap to clone; clones refer to the same sequence.
#[derive(Clone)]
pub struct CommandSeq {
    inner: Arc<Mutex<SeqState>>,
}

impl CommandSeq {
    /// Create an empty sequence. `name` describes it in logs and is the
    /// success message of an empty run.
    #[must_use]
    pub fn new(name: impl Into<String>, on_done: Completion) -> Self {
        Self::from_steps(name, on_done, Vec::new())
    }

    /// Create a sequence from already built steps.
    #[must_use]
    pub fn from_steps(
        name: impl Into<String>,
        on_done: Completion,
        steps: impl IntoIterator<Item = Step>,
    ) -> Self {
        let steps: VecDeque<Step> = steps.into_iter().collect();
        Self {
            inner: Arc::new(Mutex::new(SeqState {
                name: name.into(),
                total: steps.len(),
                steps,
                started: false,
                last_message: None,
                on_done: Some(on_done),
            })),
        }
    }

    /// Append a step.
    ///
    /// # Errors
    ///
    /// Returns [`SequenceError::InvalidState`] once the sequence has started.
    pub fn add<F>(&self, f: F) -> Result<(), SequenceError>
    where
        F: FnOnce(Completion) + Send + 'static,
    {
        let mut state = lock(&self.inner);
        if state.started {
            return Err(SequenceError::InvalidState(
                "cannot add a step to a command sequence that already started",
            ));
        }
        state.steps.push_back(step(f));
        state.total += 1;
        Ok(())
    }

    /// Number of steps added to the sequence.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.inner).total
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Start the first step.
    ///
    /// # Errors
    ///
    /// Returns [`SequenceError::InvalidState`] if the sequence already ran.
    pub fn run(&self) -> Result<(), SequenceError> {
        {
            let mut state = lock(&self.inner);
            if state.started {
                return Err(SequenceError::InvalidState(
                    "command sequence already started",
                ));
            }
            state.started = true;
            tracing::debug!(seq = %state.name, steps = state.total, "running command sequence");
        }
        next(&self.inner);
        Ok(())
    }

    /// Run a sequence no other handle has started.
    pub fn spawn(self) {
        if let Err(err) = self.run() {
            tracing::error!(%err, "command sequence not started");
        }
    }
}

impl fmt::Debug for CommandSeq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.inner);
        f.debug_struct("CommandSeq")
            .field("name", &state.name)
            .field("total", &state.total)
            .field("remaining", &state.steps.len())
            .field("started", &state.started)
            .finish()
    }
}

fn lock(inner: &Mutex<SeqState>) -> MutexGuard<'_, SeqState> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Run the next queued step, or finish the sequence if none remain.
fn next(inner: &Arc<Mutex<SeqState>>) {
    let step = {
        let mut state = lock(inner);
        match state.steps.pop_front() {
            Some(step) => step,
            None => {
                let message = state
                    .last_message
                    .take()
                    .unwrap_or_else(|| state.name.clone());
                let on_done = state.on_done.take();
                drop(state);
                if let Some(on_done) = on_done {
                    on_done.complete(Ok(message));
                }
                return;
            }
        }
    };

    let handle = Arc::clone(inner);
    step(Completion::new(move |result| on_step_done(&handle, result)));
}

fn on_step_done(inner: &Arc<Mutex<SeqState>>, result: CommandResult) {
    match result {
        Ok(message) => {
            lock(inner).last_message = Some(message);
            next(inner);
        }
        Err(err) => {
            let on_done = {
                let mut state = lock(inner);
                tracing::warn!(
                    seq = %state.name,
                    skipped = state.steps.len(),
                    %err,
                    "command sequence step failed"
                );
                state.steps.clear();
                state.on_done.take()
            };
            if let Some(on_done) = on_done {
                on_done.complete(Err(err));
            }
        }
    }
}
