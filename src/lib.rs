//! Stores bytes as blocks of color in video frames, and reads them back.

pub mod bits;
pub mod classifier;
pub mod codec;
pub mod config;
pub mod container;
pub mod error;
pub mod geometry;
pub mod painter;
pub mod palette;
pub mod remote;
pub mod sequencer;

pub use classifier::{BlockClassifier, Cell};
pub use codec::{Codec, EncodeReport};
pub use config::CodecConfig;
pub use error::{Error, Result};
pub use geometry::Geometry;
pub use painter::FramePainter;
pub use palette::{Arity, Palette};
pub use sequencer::{FrameSink, FrameSource, VideoFormat};

use std::path::Path;

/// Encodes `bytes` into a video at `path`.
pub fn encode(bytes: &[u8], path: &Path, config: CodecConfig) -> Result<EncodeReport> {
    Codec::new(config).encode_to_path(bytes, path)
}

/// Decodes the video at `path`. `config` must match the one it was encoded with.
pub fn decode(path: &Path, config: CodecConfig) -> Result<Vec<u8>> {
    Codec::new(config).decode_path(path)
}
