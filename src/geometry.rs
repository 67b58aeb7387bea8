use crate::error::{Error, Result};

/// Canvas size and the square block grid laid over it.
///
/// Blocks are numbered in row-major order: row 0 left to right, then row 1, ...
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Geometry {
    width: u32,
    height: u32,
    block_size: u32,
}

impl Geometry {
    /// The block size must evenly divide both canvas dimensions.
    pub fn new(width: u32, height: u32, block_size: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::InvalidGeometry(format!(
                "canvas must not be empty, got {width}x{height}"
            )));
        }
        if block_size == 0 || block_size > width.min(height) {
            return Err(Error::InvalidGeometry(format!(
                "block size {block_size} does not fit a {width}x{height} canvas"
            )));
        }
        if width % block_size != 0 || height % block_size != 0 {
            return Err(Error::InvalidGeometry(format!(
                "block size {block_size} does not evenly divide {width}x{height}"
            )));
        }

        Ok(Self {
            width,
            height,
            block_size,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dims(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    pub fn columns(&self) -> u32 {
        self.width / self.block_size
    }

    pub fn rows(&self) -> u32 {
        self.height / self.block_size
    }

    /// Symbol codes one frame can hold.
    pub fn capacity(&self) -> usize {
        self.columns() as usize * self.rows() as usize
    }

    /// Frames needed to hold `n_symbols` codes.
    pub fn frames_for(&self, n_symbols: usize) -> usize {
        n_symbols.div_ceil(self.capacity())
    }

    /// Top-left pixel of every block, in row-major order.
    pub fn block_origins(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        let b = self.block_size;
        (0..self.rows()).flat_map(move |y| (0..self.columns()).map(move |x| (x * b, y * b)))
    }

    /// The pixel each block is sampled at: `block_size / 2` in from its top-left corner.
    pub fn sample_points(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        let half = self.block_size / 2;
        self.block_origins().map(move |(x, y)| (x + half, y + half))
    }
}
