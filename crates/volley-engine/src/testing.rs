//! Scripted work handles for unit tests.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use volley_core::fault::ValueTaken;
use volley_core::{Fault, WaitError};

use crate::handle::WorkHandle;

#[derive(Default)]
struct RecorderState {
    query_bounds: Vec<Option<Duration>>,
    fetch_bounds: Vec<Option<Duration>>,
    cancelled: bool,
}

/// Records how a [`ScriptedHandle`] was used.
#[derive(Clone, Default)]
pub(crate) struct Recorder(Arc<Mutex<RecorderState>>);

impl Recorder {
    pub fn query_bounds(&self) -> Vec<Option<Duration>> {
        self.0.lock().unwrap().query_bounds.clone()
    }

    pub fn fetch_bounds(&self) -> Vec<Option<Duration>> {
        self.0.lock().unwrap().fetch_bounds.clone()
    }

    pub fn cancelled(&self) -> bool {
        self.0.lock().unwrap().cancelled
    }
}

enum Script {
    /// Answers the failure query immediately.
    Fixed(Result<Option<Fault>, WaitError>),
    /// Completes `delay` after the handle was built, as if already running.
    Delayed { done_at: Instant },
    /// Reports success, then fails to produce a value.
    Broken,
}

pub(crate) struct ScriptedHandle<T> {
    script: Script,
    value: Option<T>,
    recorder: Recorder,
}

impl<T> ScriptedHandle<T> {
    fn build(script: Script, value: Option<T>) -> Self {
        Self {
            script,
            value,
            recorder: Recorder::default(),
        }
    }

    pub fn succeeding(value: T) -> Self {
        Self::build(Script::Fixed(Ok(None)), Some(value))
    }

    pub fn failing(fault: Fault) -> Self {
        Self::build(Script::Fixed(Ok(Some(fault))), None)
    }

    pub fn raising(err: WaitError) -> Self {
        Self::build(Script::Fixed(Err(err)), None)
    }

    pub fn broken() -> Self {
        Self::build(Script::Broken, None)
    }

    pub fn delayed(delay: Duration, value: T) -> Self {
        Self::build(
            Script::Delayed {
                done_at: Instant::now() + delay,
            },
            Some(value),
        )
    }

    pub fn recorder(&self) -> Recorder {
        self.recorder.clone()
    }
}

impl<T: Send> WorkHandle<T> for ScriptedHandle<T> {
    fn query_failure(&mut self, bound: Option<Duration>) -> Result<Option<Fault>, WaitError> {
        self.recorder.0.lock().unwrap().query_bounds.push(bound);
        match &self.script {
            Script::Fixed(answer) => answer.clone(),
            Script::Broken => Ok(None),
            Script::Delayed { done_at } => {
                let left = done_at.saturating_duration_since(Instant::now());
                match bound {
                    Some(limit) if limit < left => {
                        std::thread::sleep(limit);
                        Err(WaitError::TimedOut(limit))
                    }
                    _ => {
                        std::thread::sleep(left);
                        Ok(None)
                    }
                }
            }
        }
    }

    fn fetch_value(&mut self, bound: Option<Duration>) -> Result<T, Fault> {
        self.recorder.0.lock().unwrap().fetch_bounds.push(bound);
        self.value.take().ok_or_else(|| Fault::business(ValueTaken))
    }

    fn cancel(&mut self) -> bool {
        self.recorder.0.lock().unwrap().cancelled = true;
        true
    }
}
