//! Streaming client for the THÉRÈSE assistant backend.
//!
//! The chat (`/api/chat/send`) and board deliberation (`/api/board/deliberate`)
//! endpoints answer with a line-oriented event stream: one `data: {json}` line
//! per frame. This crate splits that byte stream into typed frames and folds
//! them, one at a time, into a snapshot a UI can re-render after every frame.
//!
//! Decoding and reduction are separate: [`LineDecoder`] and [`parse_frame`]
//! turn bytes into frames, and [`Reducer::reduce`] is a pure fold that can be
//! driven without any network.
//!
//! # Streaming a deliberation
//!
//! ```no_run
//! use therese_stream::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), ClientError> {
//! let client = ThereseClient::from_env()?;
//! let mut view = StreamView::<DeliberationState>::new();
//! view.start(
//!     client
//!         .open_deliberation(BoardRequest::new("Dois-je lever des fonds cette année ?"))
//!         .await?,
//! );
//!
//! while let Some(state) = view.advance().await {
//!     for (role, opinion) in &state.advisors {
//!         println!("{role}: {} chars ({:?})", opinion.text.len(), opinion.status);
//!     }
//! }
//! if let Some(synthesis) = &view.snapshot().synthesis {
//!     println!("{}", synthesis.recommendation);
//! }
//! # Ok(())
//! # }
//! ```

/// Board-of-advisors frames, request and reducer.
pub mod board;
/// Per-entity accumulation buffers.
pub mod buffer;
/// Chat frames, request and reducer.
pub mod chat;
/// Backend client.
pub mod client;
/// Backend connection settings.
pub mod config;
/// Line framing of the event stream.
pub mod decoder;
/// Public error types.
pub mod errors;
/// Frame and reducer contracts.
pub mod frame;
/// Log subscriber bootstrap.
pub mod observability;
/// Common imports for typical usage.
pub mod prelude;
/// Frame stream handle and cancellation.
pub mod stream;
/// HTTP transport seam.
pub mod transport;
/// Snapshot owner for one view.
pub mod view;

pub use board::{
    AdvisorBuffer, AdvisorInfo, AdvisorMeta, AdvisorRole, BoardRequest, BoardSynthesis,
    DeliberationFrame, DeliberationState,
};
pub use buffer::{AccumulationBuffer, BufferStatus};
pub use chat::{
    ChatCompletion, ChatFrame, ChatRequest, ChatState, ChatUsage, DetectedEntities,
    ExtractedContact, ExtractedProject, ToolResult, Uncertainty,
};
pub use client::{CancelOutcome, ThereseClient};
pub use config::BackendConfig;
pub use decoder::{LineDecoder, parse_frame};
pub use errors::{ClientError, ErrorOrigin, StreamError};
pub use frame::{Frame, Reducer};
pub use observability::init_observability;
pub use stream::{AbortHandle, FrameStream, decode_frames};
pub use transport::{ByteStream, HttpTransport, Transport};
pub use view::StreamView;
