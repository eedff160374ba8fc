use std::fmt;

/// Typed error for video rendering, encoding and muxing.
#[derive(Debug)]
pub enum VideoError {
    /// Encoder initialization failed (openh264 setup).
    EncoderInit(String),
    /// Frame encoding failed.
    EncodeFailed(String),
    /// MP4 muxing failed.
    MuxFailed(String),
    /// Frame buffer allocation or drawing failed.
    DrawFailed(String),
    /// I/O error (font loading, writes).
    Io(std::io::Error),
}

impl fmt::Display for VideoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EncoderInit(msg) => write!(f, "encoder initialization failed: {msg}"),
            Self::EncodeFailed(msg) => write!(f, "encode failed: {msg}"),
            Self::MuxFailed(msg) => write!(f, "MP4 mux failed: {msg}"),
            Self::DrawFailed(msg) => write!(f, "draw failed: {msg}"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for VideoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for VideoError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}
