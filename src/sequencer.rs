//! Moving frames in and out of videos, strictly in order.
//!
//! Three backends, picked from the path by [`VideoFormat::from_path()`]:
//! - `*.pxv`: our own lossless container, see [`crate::container`]
//! - a directory (or a path with no extension that doesn't exist yet): numbered PNGs
//! - anything else: handed to an `ffmpeg` child process over raw `rgb24` pipes
//!
//! An existing file with no extension is sniffed: our container if it starts with the
//! container magic, ffmpeg otherwise.
//!
//! Outputs are written next to their final path and only renamed into place by
//! [`FrameSink::finish()`], so a failed encode never leaves a half-written video behind.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::thread::{self, JoinHandle};

use image::RgbImage;
use log::{debug, info, warn};
use regex::Regex;

use crate::config::CodecConfig;
use crate::container::{ContainerReader, ContainerWriter, MAGIC};
use crate::error::{Error, Result};
use crate::geometry::Geometry;
use crate::palette::BACKGROUND;

pub const FFMPEG: &str = "ffmpeg";
const H264_PRESET: &str = "medium";
const H264_CRF: u32 = 18;

/// Receives painted frames in index order.
pub trait FrameSink {
    fn push(&mut self, frame: &RgbImage) -> Result<()>;

    fn frames_written(&self) -> usize;

    /// Completes the video and moves it to its final path.
    ///
    /// Dropping a sink without calling this throws away everything written so far.
    fn finish(self: Box<Self>) -> Result<()>;
}

/// Frames of a video, in stored order. One pass only.
pub type FrameSource = Box<dyn Iterator<Item = Result<RgbImage>>>;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum VideoFormat {
    Pxv,
    PngDir,
    Ffmpeg,
}

impl VideoFormat {
    pub fn from_path(path: &Path) -> Self {
        if path.is_dir() {
            return VideoFormat::PngDir;
        }
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("pxv") => VideoFormat::Pxv,
            Some(_) => VideoFormat::Ffmpeg,
            None if path.is_file() => {
                if starts_with_magic(path) {
                    VideoFormat::Pxv
                } else {
                    VideoFormat::Ffmpeg
                }
            }
            None => VideoFormat::PngDir,
        }
    }
}

fn starts_with_magic(path: &Path) -> bool {
    let mut magic = [0_u8; MAGIC.len()];
    File::open(path)
        .and_then(|mut file| file.read_exact(&mut magic))
        .map(|()| magic == MAGIC)
        .unwrap_or(false)
}

/// Opens a sink that writes a video to `path` at `config.frame_rate`.
pub fn create(path: &Path, config: &CodecConfig) -> Result<Box<dyn FrameSink>> {
    let format = VideoFormat::from_path(path);
    info!("Writing {format:?} video to {}", path.display());

    let sink: Box<dyn FrameSink> = match format {
        VideoFormat::Pxv => Box::new(PxvSink::create(path, config)?),
        VideoFormat::PngDir => Box::new(PngDirSink::create(path, &config.geometry)?),
        VideoFormat::Ffmpeg => Box::new(FfmpegSink::spawn(path, config)?),
    };
    Ok(sink)
}

/// Opens the video at `path` for reading.
///
/// Fails if nothing is there, or if the first frame can't be decoded. Running out of
/// frames later just ends the sequence.
pub fn open(path: &Path, geometry: &Geometry) -> Result<FrameSource> {
    if !path.exists() {
        return Err(Error::NotFound {
            path: path.to_path_buf(),
        });
    }

    let format = VideoFormat::from_path(path);
    info!("Reading {format:?} video from {}", path.display());

    let unreadable = |e: Error| Error::Unreadable {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };

    let mut source: FrameSource = match format {
        VideoFormat::Pxv => {
            let file = BufReader::new(File::open(path).map_err(|e| unreadable(e.into()))?);
            let reader = ContainerReader::new(file).map_err(unreadable)?;
            debug!("{:?}", reader.header());
            Box::new(reader)
        }
        VideoFormat::PngDir => Box::new(PngDirSource::open(path).map_err(unreadable)?),
        VideoFormat::Ffmpeg => Box::new(FfmpegSource::spawn(path, geometry)?),
    };

    match source.next() {
        None => Ok(Box::new(std::iter::empty())),
        Some(Err(e)) => Err(unreadable(e)),
        Some(Ok(first)) => Ok(Box::new(std::iter::once(Ok(first)).chain(source))),
    }
}

/// Opens a sink that writes numbered PNG frames into `dir`, whatever its name looks like.
pub fn create_png_dir(dir: &Path, geometry: &Geometry) -> Result<Box<dyn FrameSink>> {
    Ok(Box::new(PngDirSink::create(dir, geometry)?))
}

/// Sends every frame to two sinks.
pub struct Tee {
    first: Box<dyn FrameSink>,
    second: Box<dyn FrameSink>,
}

impl Tee {
    pub fn new(first: Box<dyn FrameSink>, second: Box<dyn FrameSink>) -> Self {
        Self { first, second }
    }
}

impl FrameSink for Tee {
    fn push(&mut self, frame: &RgbImage) -> Result<()> {
        self.first.push(frame)?;
        self.second.push(frame)
    }

    fn frames_written(&self) -> usize {
        self.first.frames_written()
    }

    fn finish(self: Box<Self>) -> Result<()> {
        self.first.finish()?;
        self.second.finish()
    }
}

/// Is there an `ffmpeg` we can run?
pub fn ffmpeg_available() -> bool {
    Command::new(FFMPEG)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// A file or directory being written beside its final path.
///
/// Removed on drop unless [`commit()`](Staged::commit) moved it into place.
struct Staged {
    tmp: PathBuf,
    dest: PathBuf,
    committed: bool,
}

impl Staged {
    fn new(dest: &Path) -> Self {
        let name = match (dest.file_stem(), dest.extension()) {
            (Some(stem), Some(ext)) => format!(
                ".{}.partial.{}",
                stem.to_string_lossy(),
                ext.to_string_lossy()
            ),
            _ => format!(
                ".{}.partial",
                dest.file_name().unwrap_or_default().to_string_lossy()
            ),
        };

        Self {
            tmp: dest.with_file_name(name),
            dest: dest.to_path_buf(),
            committed: false,
        }
    }

    fn commit(mut self) -> Result<()> {
        if self.dest.is_dir() {
            // Only ever empty; see `PngDirSink::create()`
            fs::remove_dir(&self.dest)?;
        }
        fs::rename(&self.tmp, &self.dest)?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for Staged {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        let removed = if self.tmp.is_dir() {
            fs::remove_dir_all(&self.tmp)
        } else {
            fs::remove_file(&self.tmp)
        };
        if let Err(err) = removed {
            if err.kind() != io::ErrorKind::NotFound {
                warn!("Failed to clean up {}: {err}", self.tmp.display());
            }
        }
    }
}

struct PxvSink {
    writer: ContainerWriter<BufWriter<File>>,
    staged: Staged,
}

impl PxvSink {
    fn create(path: &Path, config: &CodecConfig) -> Result<Self> {
        let staged = Staged::new(path);
        let file = BufWriter::new(File::create(&staged.tmp)?);
        let (width, height) = config.geometry.dims();
        let writer = ContainerWriter::new(file, config.frame_rate, width, height)?;

        Ok(Self { writer, staged })
    }
}

impl FrameSink for PxvSink {
    fn push(&mut self, frame: &RgbImage) -> Result<()> {
        self.writer.push(frame)
    }

    fn frames_written(&self) -> usize {
        self.writer.frame_count()
    }

    fn finish(self: Box<Self>) -> Result<()> {
        let Self { writer, staged } = *self;
        let file = writer.finish()?;
        file.into_inner().map_err(|e| e.into_error())?.sync_all()?;
        staged.commit()
    }
}

struct PngDirSink {
    staged: Staged,
    dims: (u32, u32),
    n_frames: usize,
}

impl PngDirSink {
    fn create(path: &Path, geometry: &Geometry) -> Result<Self> {
        if path.is_dir() && fs::read_dir(path)?.next().is_some() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} already has files in it", path.display()),
            )
            .into());
        }

        let staged = Staged::new(path);
        fs::create_dir_all(&staged.tmp)?;

        Ok(Self {
            staged,
            dims: geometry.dims(),
            n_frames: 0,
        })
    }
}

impl FrameSink for PngDirSink {
    fn push(&mut self, frame: &RgbImage) -> Result<()> {
        if frame.dimensions() != self.dims {
            return Err(Error::FrameSizeMismatch {
                expected: self.dims,
                actual: frame.dimensions(),
            });
        }

        let path = self.staged.tmp.join(frame_file_name(self.n_frames));
        frame.save(&path)?;
        self.n_frames += 1;
        Ok(())
    }

    fn frames_written(&self) -> usize {
        self.n_frames
    }

    fn finish(self: Box<Self>) -> Result<()> {
        self.staged.commit()
    }
}

pub fn frame_file_name(index: usize) -> String {
    format!("frame_{index:06}.png")
}

struct PngDirSource {
    files: std::vec::IntoIter<(usize, PathBuf)>,
}

impl PngDirSource {
    fn open(dir: &Path) -> Result<Self> {
        let pattern = Regex::new(r"^[a-zA-Z_-]*([0-9]+)\.png$")
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let files = find_files(dir, &pattern)?;
        debug!("Found {} frames in {}", files.len(), dir.display());

        Ok(Self {
            files: files.into_iter(),
        })
    }
}

impl Iterator for PngDirSource {
    type Item = Result<RgbImage>;

    fn next(&mut self) -> Option<Self::Item> {
        let (_id, path) = self.files.next()?;
        Some(image::open(&path).map(|img| img.to_rgb8()).map_err(Error::from))
    }
}

/// Numbered frame files in `dir`, sorted by their number.
fn find_files(dir: &Path, pattern: &Regex) -> Result<Vec<(usize, PathBuf)>> {
    let mut files = vec![];

    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().map(|name| name.to_string_lossy().into_owned())
        else {
            continue;
        };
        if let Some(id) = pattern
            .captures(&name)
            .and_then(|matches| matches.get(1))
            .and_then(|id| id.as_str().parse::<usize>().ok())
        {
            files.push((id, path));
        }
    }

    files.sort_by_key(|(id, _f)| *id);

    let missing: Vec<usize> = files
        .windows(2)
        .flat_map(|pair| pair[0].0 + 1..pair[1].0)
        .collect();
    if !missing.is_empty() {
        warn!("Missing frames from {}: {missing:?}", dir.display());
    }

    Ok(files)
}

struct FfmpegSink {
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    dims: (u32, u32),
    n_frames: usize,
    staged: Option<Staged>,
}

impl FfmpegSink {
    fn spawn(path: &Path, config: &CodecConfig) -> Result<Self> {
        let (width, height) = config.geometry.dims();
        let staged = Staged::new(path);

        let mut command = Command::new(FFMPEG);
        command
            .args(["-hide_banner", "-loglevel", "error", "-y"])
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24"])
            .arg("-s:v")
            .arg(format!("{width}x{height}"))
            .arg("-r")
            .arg(config.frame_rate.to_string())
            .args(["-i", "-", "-an"])
            .args(["-c:v", "libx264", "-preset", H264_PRESET])
            .arg("-crf")
            .arg(H264_CRF.to_string())
            .args(["-pix_fmt", "yuv420p"])
            .arg(&staged.tmp)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit());

        let mut child = command.spawn().map_err(spawn_error)?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Ffmpeg("failed to capture ffmpeg stdin".into()))?;

        Ok(Self {
            child: Some(child),
            stdin: Some(stdin),
            dims: (width, height),
            n_frames: 0,
            staged: Some(staged),
        })
    }
}

impl FrameSink for FfmpegSink {
    fn push(&mut self, frame: &RgbImage) -> Result<()> {
        if frame.dimensions() != self.dims {
            return Err(Error::FrameSizeMismatch {
                expected: self.dims,
                actual: frame.dimensions(),
            });
        }
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| Error::Ffmpeg("ffmpeg stdin already closed".into()))?;
        stdin
            .write_all(frame.as_raw())
            .map_err(|e| Error::Ffmpeg(format!("failed to write frame to ffmpeg: {e}")))?;

        self.n_frames += 1;
        Ok(())
    }

    fn frames_written(&self) -> usize {
        self.n_frames
    }

    fn finish(mut self: Box<Self>) -> Result<()> {
        if self.n_frames == 0 {
            // ffmpeg won't produce a video with no frames in it
            let blank = RgbImage::from_pixel(self.dims.0, self.dims.1, BACKGROUND);
            self.push(&blank)?;
        }
        if let Some(mut stdin) = self.stdin.take() {
            stdin.flush()?;
        }

        let mut child = self
            .child
            .take()
            .ok_or_else(|| Error::Ffmpeg("ffmpeg already exited".into()))?;
        let status = child.wait()?;
        if !status.success() {
            return Err(Error::Ffmpeg(format!("ffmpeg failed with status {status}")));
        }

        match self.staged.take() {
            Some(staged) => staged.commit(),
            None => Ok(()),
        }
    }
}

impl Drop for FfmpegSink {
    fn drop(&mut self) {
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

struct FfmpegSource {
    child: Child,
    stdout: ChildStdout,
    stderr: Option<JoinHandle<String>>,
    frame_size: usize,
    dims: (u32, u32),
    n_frames: usize,
    done: bool,
}

impl FfmpegSource {
    fn spawn(path: &Path, geometry: &Geometry) -> Result<Self> {
        let (width, height) = geometry.dims();

        let mut child = Command::new(FFMPEG)
            .args(["-hide_banner", "-loglevel", "error", "-i"])
            .arg(path)
            .arg("-vf")
            .arg(format!("scale={width}:{height}:flags=neighbor"))
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(spawn_error)?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Ffmpeg("failed to capture ffmpeg stdout".into()))?;

        // Drained as it comes, or a chatty ffmpeg blocks on a full stderr pipe
        let stderr = child.stderr.take().map(|mut pipe| {
            thread::spawn(move || {
                let mut buf = vec![];
                let _ = pipe.read_to_end(&mut buf);
                String::from_utf8_lossy(&buf).into_owned()
            })
        });

        Ok(Self {
            child,
            stdout,
            stderr,
            frame_size: width as usize * height as usize * 3,
            dims: (width, height),
            n_frames: 0,
            done: false,
        })
    }

    /// Called once stdout runs dry: did ffmpeg exit cleanly?
    fn wait(&mut self) -> Result<()> {
        let status = self.child.wait()?;
        let stderr = self.join_stderr();
        if status.success() {
            Ok(())
        } else {
            Err(Error::Ffmpeg(format!(
                "ffmpeg failed with status {status}: {}",
                stderr.trim()
            )))
        }
    }

    fn join_stderr(&mut self) -> String {
        self.stderr
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default()
    }
}

impl Iterator for FfmpegSource {
    type Item = Result<RgbImage>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut buf = vec![0_u8; self.frame_size];
        let result = match read_full(&mut self.stdout, &mut buf) {
            Ok(0) => {
                self.done = true;
                return self.wait().err().map(Err);
            }
            Ok(n) if n < self.frame_size => Err(Error::Ffmpeg(format!(
                "frame {} truncated: got {n} of {} bytes",
                self.n_frames, self.frame_size
            ))),
            Ok(_) => RgbImage::from_raw(self.dims.0, self.dims.1, buf).ok_or_else(|| {
                Error::Ffmpeg(format!("frame {} has the wrong size", self.n_frames))
            }),
            Err(e) => Err(e.into()),
        };

        match &result {
            Ok(_) => self.n_frames += 1,
            Err(_) => self.done = true,
        }
        Some(result)
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        if !self.done {
            let _ = self.child.kill();
        }
        let _ = self.child.wait();
        self.join_stderr();
    }
}

/// Like `read_exact()`, but reports how much it got when the stream ends early.
fn read_full(r: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn spawn_error(error: io::Error) -> Error {
    if error.kind() == io::ErrorKind::NotFound {
        Error::Ffmpeg("ffmpeg was not found on PATH. Install ffmpeg and verify `ffmpeg -version` works".into())
    } else {
        Error::Ffmpeg(format!("failed to spawn ffmpeg: {error}"))
    }
}

#[cfg(test)]
mod t {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn check_format_from_path() {
        assert_eq!(VideoFormat::from_path(Path::new("out.pxv")), VideoFormat::Pxv);
        assert_eq!(VideoFormat::from_path(Path::new("out.PXV")), VideoFormat::Pxv);
        assert_eq!(VideoFormat::from_path(Path::new("out.mp4")), VideoFormat::Ffmpeg);
        assert_eq!(VideoFormat::from_path(Path::new("frames")), VideoFormat::PngDir);
    }

    #[test]
    fn check_staged_names() {
        let staged = Staged::new(Path::new("vids/hello.mp4"));
        assert_eq!(staged.tmp, Path::new("vids/.hello.partial.mp4"));
        drop(staged);

        let staged = Staged::new(Path::new("vids/frames"));
        assert_eq!(staged.tmp, Path::new("vids/.frames.partial"));
    }

    #[test]
    fn check_read_full_reports_short_reads() {
        let mut buf = [0_u8; 8];
        assert_eq!(read_full(&mut &[1_u8, 2, 3][..], &mut buf).unwrap(), 3);
        assert_eq!(read_full(&mut &[0_u8; 16][..], &mut buf).unwrap(), 8);
        assert_eq!(read_full(&mut &[][..], &mut buf).unwrap(), 0);
    }

    #[test]
    fn check_frame_file_names_sort() {
        assert_eq!(frame_file_name(0), "frame_000000.png");
        assert_eq!(frame_file_name(42), "frame_000042.png");
    }
}
