//! Shared types for the voxbridge speech proxy.
//!
//! This crate holds the task model (identity, kind, lifecycle state,
//! parameter bags) and the wire schema of the remote speech service's
//! duplex task protocol. It performs no I/O, so the session state machine
//! and the server can both depend on it without pulling in a runtime.

pub mod protocol;
pub mod task;

pub use protocol::{
    Action, ControlFrame, ControlPayload, EventFrame, EventName, Sentence, STREAMING_DUPLEX,
};
pub use task::{
    RecognitionParameters, SynthesisParameters, TaskId, TaskKind, TaskOutput, TaskParameters,
    TaskState,
};
