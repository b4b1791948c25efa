use thiserror::Error;

/// Misuse of a [`RingBuffer`](crate::ring_buffer::RingBuffer). These indicate a
/// buffer sized wrongly for its producer or consumer, not a runtime condition.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    #[error("append of {len} samples exceeds buffer capacity {capacity}")]
    Capacity { len: usize, capacity: usize },

    #[error("window of {requested} samples exceeds buffer capacity {capacity}")]
    Range { requested: usize, capacity: usize },

    #[error("channel lengths differ (x={x}, y={y}, z={z})")]
    ChannelLengthMismatch { x: usize, y: usize, z: usize },
}

/// Inbound frame that does not match the sensor wire grammar.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FrameError {
    #[error("expected '{expected}' at byte {offset}")]
    MissingLiteral { expected: &'static str, offset: usize },

    #[error("invalid number '{token}' in {field}")]
    InvalidNumber { field: &'static str, token: String },

    #[error("non-finite value {value} in {field}")]
    NonFinite { field: &'static str, value: f32 },

    #[error("unexpected trailing input at byte {offset}")]
    TrailingInput { offset: usize },

    #[error("binary frame is not valid UTF-8")]
    NotUtf8,
}

/// Session-level ingestion failures. Both are recovered locally by the server.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("connection rejected: a sensor session is already active")]
    ConnectionRejected,

    #[error("transport error: {0}")]
    Transport(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{sensor} buffer capacity must be non-zero (rate {hz} Hz x {secs} s)")]
    ZeroCapacity { sensor: &'static str, hz: u32, secs: u32 },

    #[error("filter alpha must lie in [0, 1], got {0}")]
    AlphaOutOfRange(f32),

    #[error("{0} must be non-zero")]
    ZeroPeriod(&'static str),
}
