use serde::de::DeserializeOwned;

/// A typed unit of one streaming protocol.
///
/// Implemented by [`crate::ChatFrame`] and [`crate::DeliberationFrame`].
pub trait Frame: DeserializeOwned + std::fmt::Debug + Send + 'static {
    /// Whether this frame ends the stream (`done` or `error`).
    fn is_terminal(&self) -> bool;

    /// Builds the synthetic `error` frame used when the transport fails.
    fn transport_failure(message: impl Into<String>) -> Self;

    /// Wire name of the frame kind, for logs.
    fn kind(&self) -> &'static str;
}

/// Pure fold from frames to a renderable snapshot.
///
/// `reduce` must not perform I/O; it may log.
pub trait Reducer: Default + Clone + Send + 'static {
    type Frame: Frame;

    /// Applies one frame and returns the updated state.
    fn reduce(self, frame: &Self::Frame) -> Self;

    /// Whether a terminal frame has already been applied.
    fn is_finished(&self) -> bool;
}
