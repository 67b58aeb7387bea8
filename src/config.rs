use crate::error::{Error, Result};
use crate::geometry::Geometry;
use crate::palette::{Arity, Palette};

pub const DEFAULT_WIDTH: u32 = 1920;
pub const DEFAULT_HEIGHT: u32 = 1080;
pub const DEFAULT_BLOCK_SIZE: u32 = 5;
pub const DEFAULT_FRAME_RATE: u32 = 30;

/// Settings shared by both ends of the codec.
///
/// Nothing in here is stored alongside ffmpeg or PNG output; decode has to be handed the
/// same geometry and arity that encode used.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CodecConfig {
    pub geometry: Geometry,
    pub arity: Arity,
    pub frame_rate: u32,
}

impl CodecConfig {
    pub fn new(width: u32, height: u32, block_size: u32, arity: Arity) -> Result<Self> {
        Ok(Self {
            geometry: Geometry::new(width, height, block_size)?,
            arity,
            frame_rate: DEFAULT_FRAME_RATE,
        })
    }

    /// Frames per second of the output video. Must be at least 1.
    pub fn with_frame_rate(self, frame_rate: u32) -> Result<Self> {
        if frame_rate == 0 {
            return Err(Error::InvalidFrameRate(frame_rate));
        }
        Ok(Self { frame_rate, ..self })
    }

    pub fn palette(&self) -> Palette {
        Palette::new(self.arity)
    }
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            geometry: Geometry::new(DEFAULT_WIDTH, DEFAULT_HEIGHT, DEFAULT_BLOCK_SIZE)
                .unwrap_or_else(|e| unreachable!("default geometry is valid: {e}")),
            arity: Arity::Color,
            frame_rate: DEFAULT_FRAME_RATE,
        }
    }
}

#[cfg(test)]
mod t {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn check_defaults() {
        let config = CodecConfig::default();
        assert_eq!(config.geometry.dims(), (1920, 1080));
        assert_eq!(config.geometry.block_size(), 5);
        assert_eq!(config.arity, Arity::Color);
        assert_eq!(config.frame_rate, 30);
    }

    #[test]
    fn check_frame_rate() {
        let config = CodecConfig::new(8, 8, 2, Arity::Monochrome).unwrap();
        assert_eq!(config.with_frame_rate(24).unwrap().frame_rate, 24);
        assert!(matches!(
            config.with_frame_rate(0),
            Err(Error::InvalidFrameRate(0))
        ));
    }
}
