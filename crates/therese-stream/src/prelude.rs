//! Common imports for typical usage.
//!
//! Exports the types needed to open a stream, drive a view and read the
//! resulting snapshot.
pub use crate::{
    AbortHandle, AdvisorRole, BackendConfig, BoardRequest, BufferStatus, ChatFrame, ChatRequest,
    ChatState, ClientError, DeliberationFrame, DeliberationState, Frame, FrameStream, Reducer,
    StreamView, ThereseClient,
};
