use std::path::PathBuf;

use thiserror::Error;

/// Everything that can go wrong while painting, sequencing, or classifying frames.
///
/// Block size or palette mismatches between encode and decode are *not* in here:
/// they produce wrong bits, not errors.
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// The video (or frame directory) does not exist
    #[error("no video found at {}", .path.display())]
    NotFound { path: PathBuf },

    /// The video exists but its first frame (or header) could not be decoded
    #[error("unable to read video at {}: {reason}", .path.display())]
    Unreadable { path: PathBuf, reason: String },

    #[error("unsupported container version: {found}, we support version: {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error("invalid canvas geometry: {0}")]
    InvalidGeometry(String),

    #[error("invalid frame rate: {0}, must be at least 1")]
    InvalidFrameRate(u32),

    #[error("frame is {}x{} but the canvas is {}x{}", .actual.0, .actual.1, .expected.0, .expected.1)]
    FrameSizeMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("ffmpeg: {0}")]
    Ffmpeg(String),
}

pub type Result<T> = std::result::Result<T, Error>;
