//! Error types for channel construction and the fallible queue operations.

use core::fmt;

/// Error returned by [`channel`](crate::channel()) when the handle and head
/// segment cannot be allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocError;

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "channel allocation failed")
    }
}

/// Error returned by [`Sender::send`](crate::Sender::send) when growing the
/// queue fails; carries the rejected element back to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendError(pub usize);

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "queue growth allocation failed")
    }
}

/// Error returned by [`Sender::try_send`](crate::Sender::try_send) when the
/// queue would have to grow; carries the rejected element back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrySendError(pub usize);

impl fmt::Display for TrySendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "queue is full")
    }
}

/// Error returned by [`Receiver::try_recv`](crate::Receiver::try_recv) when
/// no element is buffered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TryRecvError;

impl fmt::Display for TryRecvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "queue is empty")
    }
}
