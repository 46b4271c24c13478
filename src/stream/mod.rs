//! Streaming session management: per-user concurrency and session lifecycle

pub mod gate;
pub mod session;

pub use gate::{ConcurrencyGate, StreamSlot};
pub use session::{
    ControlEvent, FinalizeOutcome, SessionEvent, SessionState, StreamErrorCode, StreamSession,
};
