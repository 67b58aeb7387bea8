//! `.pxv`: a lossless, frame-rate tagged container of RGB frames.
//!
//! Layout: one [`ContainerHeader`], then per frame a [`FrameChunk`] followed by `size`
//! bytes of pixel data in the chunk's [`FrameEncoding`].

use core::fmt::Debug;
use std::io::{self, Read, Seek, SeekFrom, Write};

use bytemuck::{Pod, Zeroable};
use image::{Rgb, RgbImage};
use static_assertions::*;

use crate::error::{Error, Result};

/// `PIXCODE!🎞`
pub const MAGIC: [u8; 12] = *b"PIXCODE!\xF0\x9F\x8E\x9E";

pub const VERSION: u32 = 1;

#[derive(Copy, Clone, Pod, Zeroable, PartialEq, Eq)]
#[repr(C)]
pub struct ContainerHeader {
    /// `PIXCODE!🎞`
    pub magic: [u8; MAGIC.len()],

    /// Version of the container that this was saved with
    pub version: u32,

    /// The number of frames (and thus chunks) stored after this header
    pub n_frames: u32,

    /// Frames per second. Each frame is shown for `1 / frame_rate` seconds.
    pub frame_rate: u32,

    pub width: u32,
    pub height: u32,

    /// Reserved for future use
    pub reserved: [u32; 24],
}
assert_eq_size!(ContainerHeader, [u32; 32]);

impl ContainerHeader {
    pub const SIZE: usize = core::mem::size_of::<Self>();

    pub fn new(n_frames: usize, frame_rate: u32, width: u32, height: u32) -> Self {
        Self {
            magic: MAGIC,
            version: VERSION,
            n_frames: n_frames as u32,
            frame_rate,
            width,
            height,
            ..Zeroable::zeroed()
        }
    }

    pub fn read(bytes: &[u8]) -> Option<Self> {
        Some(bytemuck::pod_read_unaligned(bytes.get(..Self::SIZE)?))
    }

    pub fn has_magic(&self) -> bool {
        self.magic == MAGIC
    }

    pub fn frame_bytes(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }
}

impl Debug for ContainerHeader {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ContainerHeader")
            .field(
                "magic",
                &core::str::from_utf8(&self.magic).unwrap_or("INVALID_MAGIC"),
            )
            .field("version", &self.version)
            .field("n_frames", &self.n_frames)
            .field("frame_rate", &self.frame_rate)
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

#[derive(Copy, Clone, Debug, Pod, Zeroable, PartialEq, Eq)]
#[repr(transparent)]
pub struct FrameEncoding(u32);

impl FrameEncoding {
    /// Every pixel, `[r, g, b]`, row-major.
    pub const RAW: Self = Self(0);

    /// Row-major runs of identical pixels, 4 bytes each: `[len - 1, r, g, b]`.
    ///
    /// Runs never exceed 256 pixels, but may wrap across rows.
    pub const RUN_LENGTH: Self = Self(1);
}
assert_eq_size!(FrameEncoding, u32);

#[derive(Copy, Clone, Debug, Pod, Zeroable, PartialEq, Eq)]
#[repr(C)]
pub struct FrameChunk {
    /// The count of bytes immediately after this header that are part of this frame
    pub size: u32,

    /// How the bytes after this header encode the frame
    pub encoding: FrameEncoding,
}
assert_eq_size!(FrameChunk, [u32; 2]);

impl FrameChunk {
    pub const SIZE: usize = core::mem::size_of::<Self>();

    pub fn read(bytes: &[u8]) -> Option<Self> {
        Some(bytemuck::pod_read_unaligned(bytes.get(..Self::SIZE)?))
    }
}

/// Streams frames into a container.
///
/// The header is written up front with a frame count of zero and patched by [`finish()`].
///
/// [`finish()`]: ContainerWriter::finish
pub struct ContainerWriter<W: Write + Seek> {
    w: W,
    header: ContainerHeader,
}

impl<W: Write + Seek> ContainerWriter<W> {
    pub fn new(mut w: W, frame_rate: u32, width: u32, height: u32) -> Result<Self> {
        let header = ContainerHeader::new(0, frame_rate, width, height);
        w.write_all(bytemuck::bytes_of(&header))?;

        Ok(Self { w, header })
    }

    pub fn frame_count(&self) -> usize {
        self.header.n_frames as usize
    }

    pub fn push(&mut self, frame: &RgbImage) -> Result<()> {
        let actual = frame.dimensions();
        if actual != (self.header.width, self.header.height) {
            return Err(Error::FrameSizeMismatch {
                expected: (self.header.width, self.header.height),
                actual,
            });
        }

        // Painted frames are mostly large flat blocks, so runs usually win by a lot.
        let runs = compress_runlength(frame);
        let (encoding, bytes) = if runs.len() < frame.as_raw().len() {
            (FrameEncoding::RUN_LENGTH, runs.as_slice())
        } else {
            (FrameEncoding::RAW, frame.as_raw().as_slice())
        };

        let chunk = FrameChunk {
            size: bytes.len() as u32,
            encoding,
        };
        self.w.write_all(bytemuck::bytes_of(&chunk))?;
        self.w.write_all(bytes)?;

        self.header.n_frames += 1;
        Ok(())
    }

    /// Rewrites the header with the final frame count and hands back the writer.
    pub fn finish(mut self) -> Result<W> {
        self.w.seek(SeekFrom::Start(0))?;
        self.w.write_all(bytemuck::bytes_of(&self.header))?;
        self.w.seek(SeekFrom::End(0))?;
        self.w.flush()?;

        Ok(self.w)
    }
}

/// Reads frames back out of a container, once, in stored order.
pub struct ContainerReader<R: Read> {
    r: R,
    header: ContainerHeader,
    frame_num: usize,
}

impl<R: Read> Debug for ContainerReader<R> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ContainerReader")
            .field("header", &self.header)
            .field("frame_num", &self.frame_num)
            .finish()
    }
}

impl<R: Read> ContainerReader<R> {
    pub fn new(mut r: R) -> Result<Self> {
        let mut bytes = [0_u8; ContainerHeader::SIZE];
        r.read_exact(&mut bytes)?;

        let header = ContainerHeader::read(&bytes)
            // This is a fixed size so easy to catch
            .ok_or_else(|| io::Error::from(io::ErrorKind::UnexpectedEof))?;
        if !header.has_magic() {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "not a pxv container").into());
        }
        if header.version != VERSION {
            return Err(Error::UnsupportedVersion {
                found: header.version,
                supported: VERSION,
            });
        }

        Ok(Self {
            r,
            header,
            frame_num: 0,
        })
    }

    pub fn header(&self) -> ContainerHeader {
        self.header
    }

    pub fn is_finished(&self) -> bool {
        self.frame_num >= self.header.n_frames as usize
    }

    pub fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        if self.is_finished() {
            return Ok(None);
        }

        let mut bytes = [0_u8; FrameChunk::SIZE];
        self.r.read_exact(&mut bytes)?;
        let chunk = FrameChunk::read(&bytes)
            .ok_or_else(|| io::Error::from(io::ErrorKind::UnexpectedEof))?;

        let mut payload = vec![0_u8; chunk.size as usize];
        self.r.read_exact(&mut payload)?;

        let pixels = if chunk.encoding == FrameEncoding::RAW {
            payload
        } else if chunk.encoding == FrameEncoding::RUN_LENGTH {
            expand_runlength(&payload, self.header.frame_bytes())
        } else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unsupported frame encoding: {:?}", chunk.encoding),
            )
            .into());
        };

        let frame = RgbImage::from_raw(self.header.width, self.header.height, pixels)
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("frame {} has the wrong number of pixels", self.frame_num),
                )
            })?;

        self.frame_num += 1;
        Ok(Some(frame))
    }
}

impl<R: Read> Iterator for ContainerReader<R> {
    type Item = Result<RgbImage>;

    fn next(&mut self) -> Option<Self::Item> {
        let next = self.next_frame().transpose();
        if matches!(next, Some(Err(_))) {
            // Don't keep reading from the middle of a broken chunk
            self.frame_num = self.header.n_frames as usize;
        }
        next
    }
}

fn compress_runlength(frame: &RgbImage) -> Vec<u8> {
    let mut out = vec![];
    let mut pixels = frame.pixels();

    let Some(&first) = pixels.next() else {
        return out;
    };
    let mut run: (Rgb<u8>, usize) = (first, 1);

    for &px in pixels {
        if px == run.0 && run.1 < 256 {
            run.1 += 1;
        } else {
            push_run(&mut out, run);
            run = (px, 1);
        }
    }
    push_run(&mut out, run);

    out
}

fn push_run(out: &mut Vec<u8>, (Rgb([r, g, b]), len): (Rgb<u8>, usize)) {
    out.extend_from_slice(&[(len - 1) as u8, r, g, b]);
}

fn expand_runlength(in_bytes: &[u8], frame_bytes: usize) -> Vec<u8> {
    let mut pixels = Vec::with_capacity(frame_bytes);
    for run in in_bytes.chunks_exact(4) {
        let [len, r, g, b] = [run[0], run[1], run[2], run[3]];
        for _ in 0..=len {
            pixels.extend_from_slice(&[r, g, b]);
        }
    }
    pixels
}

#[cfg(test)]
mod t {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn check_runlength_round_trip() {
        let mut img = RgbImage::from_pixel(300, 2, Rgb([127, 127, 127]));
        img.put_pixel(0, 0, Rgb([255, 0, 0]));
        img.put_pixel(299, 1, Rgb([0, 0, 255]));

        let runs = compress_runlength(&img);
        // red, then 598 gray split at 256, then blue
        assert_eq!(runs.len(), 4 * (1 + 3 + 1));
        assert_eq!(&runs[..4], &[0, 255, 0, 0]);
        assert_eq!(&runs[4..8], &[255, 127, 127, 127]);

        assert_eq!(expand_runlength(&runs, 300 * 2 * 3), img.into_raw());
    }

    #[test]
    fn check_header_debug() {
        let header = ContainerHeader::new(3, 30, 1920, 1080);
        let s = format!("{header:?}");
        assert!(s.contains("PIXCODE!"), "{s}");
        assert!(s.contains("n_frames: 3"), "{s}");
    }
}
