//! Scheduled events and their captured arguments.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use arrayvec::ArrayVec;

use crate::{
    error::{ActionError, InvalidEvent},
    scheduler::Cascade,
    SampleTime,
};

/// Maximum number of arguments captured with one event
pub const MAX_ARGS: usize = 8;

/// A single captured argument
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    /// MIDI note number
    Note(u8),
}

impl Value {
    pub fn as_float(&self) -> Option<f64> {
        match *self {
            Value::Float(v) => Some(v),
            Value::Int(v) => Some(v as f64),
            Value::Note(n) => Some(n as f64),
            Value::Bool(_) => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match *self {
            Value::Int(v) => Some(v),
            Value::Note(n) => Some(n as i64),
            _ => None,
        }
    }

    pub fn as_note(&self) -> Option<u8> {
        match *self {
            Value::Note(n) => Some(n),
            Value::Int(v) => u8::try_from(v).ok().filter(|n| *n < 128),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Value::Bool(b) => Some(b),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v as f64)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

/// Inline argument list; never touches the heap
pub type Args = ArrayVec<Value, MAX_ARGS>;

/// Copy positional arguments into an inline [`Args`] list
pub fn capture(values: &[Value]) -> Result<Args, InvalidEvent> {
    Args::try_from(values).map_err(|_| InvalidEvent::TooManyArgs { max: MAX_ARGS })
}

/// Work done when an event comes due.
///
/// `T` is whatever the render side hands to `process_block` (a synth, a MIDI
/// port, a test log). The action may schedule follow-up events through the
/// [`Cascade`].
pub type Action<T> = fn(&mut T, &[Value], &mut Cascade<'_, T>) -> Result<(), ActionError>;

/// Shared flag that lets control code withdraw an event before it fires
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// A pending action with its due time and captured arguments
pub struct Event<T> {
    pub due_time: SampleTime,
    pub action: Action<T>,
    pub args: Args,
    pub(crate) cancel: Option<CancelToken>,
}

impl<T> Event<T> {
    pub fn new(due_time: SampleTime, action: Action<T>, args: Args) -> Self {
        Self {
            due_time,
            action,
            args,
            cancel: None,
        }
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelToken::is_cancelled)
    }
}

impl<T> std::fmt::Debug for Event<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Event")
            .field("due_time", &self.due_time)
            .field("args", &self.args.as_slice())
            .field("cancellable", &self.cancel.is_some())
            .finish()
    }
}
