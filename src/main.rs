use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use image::RgbImage;
use indicatif::*;

use pixcode::config::{DEFAULT_BLOCK_SIZE, DEFAULT_FRAME_RATE, DEFAULT_HEIGHT, DEFAULT_WIDTH};
use pixcode::sequencer::{self, FrameSink, Tee};
use pixcode::{bits, Arity, Codec, CodecConfig};

/// Store text (or any bytes) as blocks of color in a video, and get it back out.
#[derive(Parser, Debug)]
#[command(name = "pixcode", version, about)]
struct Opts {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Encode a file into a video
    Encode {
        /// File to encode. Read as UTF-8 text unless --raw is given.
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Where to write the video: `*.pxv` is lossless, a directory gets PNG frames,
        /// anything else goes through ffmpeg
        #[arg(short, long = "output", default_value = "out.mp4")]
        output: PathBuf,

        #[command(flatten)]
        canvas: CanvasOpts,

        #[arg(long, default_value_t = DEFAULT_FRAME_RATE, value_parser = clap::value_parser!(u32).range(1..))]
        frame_rate: u32,

        /// Encode the file's bytes as-is instead of as text
        #[arg(long)]
        raw: bool,

        /// Also save every frame as a PNG in this directory
        #[arg(long, value_name = "DIR")]
        dump_frames: Option<PathBuf>,
    },

    /// Decode a video back into text (or bytes)
    Decode {
        #[arg(value_name = "VIDEO")]
        input: PathBuf,

        /// Write the decoded bytes here instead of printing them as text
        #[arg(short, long = "output")]
        output: Option<PathBuf>,

        #[command(flatten)]
        canvas: CanvasOpts,
    },
}

/// These are not stored in the video: decode needs the values encode was given.
#[derive(Args, Debug)]
struct CanvasOpts {
    #[arg(long, default_value_t = DEFAULT_WIDTH)]
    width: u32,

    #[arg(long, default_value_t = DEFAULT_HEIGHT)]
    height: u32,

    /// Side of each square block, in pixels. Must evenly divide --width and --height.
    #[arg(short, long, default_value_t = DEFAULT_BLOCK_SIZE)]
    block_size: u32,

    /// 1 bit per block in black and white, instead of 3 bits per block in color
    #[arg(long)]
    mono: bool,
}

impl CanvasOpts {
    fn config(&self) -> Result<CodecConfig> {
        let arity = if self.mono {
            Arity::Monochrome
        } else {
            Arity::Color
        };
        CodecConfig::new(self.width, self.height, self.block_size, arity)
            .context("Invalid canvas options")
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let opts = Opts::parse();
    match opts.command {
        Command::Encode {
            input,
            output,
            canvas,
            frame_rate,
            raw,
            dump_frames,
        } => {
            let config = canvas.config()?.with_frame_rate(frame_rate)?;
            encode(&input, &output, config, raw, dump_frames.as_deref())
        }
        Command::Decode {
            input,
            output,
            canvas,
        } => decode(&input, output.as_deref(), canvas.config()?),
    }
}

fn encode(
    input: &Path,
    output: &Path,
    config: CodecConfig,
    raw: bool,
    dump_frames: Option<&Path>,
) -> Result<()> {
    let codec = Codec::new(config);

    println!("+ Reading {}", input.display());
    let bytes = if raw {
        std::fs::read(input).with_context(|| format!("Failed to read {}", input.display()))?
    } else {
        let text = std::fs::read_to_string(input)
            .with_context(|| format!("Failed to read {} as text", input.display()))?;
        let admitted = bits::admit_text(&text);
        if !admitted.skipped.is_empty() {
            println!("[WARNING] Skipped invalid characters: {:?}", admitted.skipped);
        }
        admitted.bytes
    };
    println!("+ Read {}", HumanBytes(bytes.len() as u64));

    let n_frames = config.geometry.frames_for(codec.symbols(&bytes).len());
    println!(
        "+ Canvas {}x{}, {}px blocks, {} blocks per frame, {} frames at {} fps",
        config.geometry.width(),
        config.geometry.height(),
        config.geometry.block_size(),
        HumanCount(config.geometry.capacity() as u64),
        HumanCount(n_frames as u64),
        config.frame_rate,
    );

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let mut sink = sequencer::create(output, &config)
        .with_context(|| format!("Failed to create {}", output.display()))?;
    if let Some(dir) = dump_frames {
        println!("+ Also saving frames to {}", dir.display());
        let pngs = sequencer::create_png_dir(dir, &config.geometry)?;
        sink = Box::new(Tee::new(sink, pngs));
    }

    let mut sink = Box::new(Progress {
        inner: sink,
        bar: ProgressBar::new(n_frames as u64),
    });
    println!("+ Encoding");
    let report = codec.encode(&bytes, sink.as_mut())?;
    sink.finish()
        .with_context(|| format!("Failed to finish {}", output.display()))?;
    println!(
        "+ Done: {} symbols in {} frames",
        HumanCount(report.symbols as u64),
        report.frames
    );
    println!("+ Video of {} created successfully.", output.display());

    Ok(())
}

fn decode(input: &Path, output: Option<&Path>, config: CodecConfig) -> Result<()> {
    let codec = Codec::new(config);

    println!("+ Decoding {}", input.display());
    let frames = sequencer::open(input, &config.geometry)
        .with_context(|| format!("Failed to open {}", input.display()))?;
    let bytes = codec.decode(frames.progress_with(ProgressBar::new_spinner()))?;
    println!("+ Decoded {}", HumanBytes(bytes.len() as u64));

    match output {
        Some(path) => {
            std::fs::write(path, &bytes)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("+ Wrote {}", path.display());
        }
        None => {
            println!("Extracted Text:");
            println!("{}", bits::bytes_to_text(&bytes));
        }
    }

    Ok(())
}

/// Ticks a progress bar for every frame that goes by.
struct Progress {
    inner: Box<dyn FrameSink>,
    bar: ProgressBar,
}

impl FrameSink for Progress {
    fn push(&mut self, frame: &RgbImage) -> pixcode::Result<()> {
        self.inner.push(frame)?;
        self.bar.inc(1);
        Ok(())
    }

    fn frames_written(&self) -> usize {
        self.inner.frames_written()
    }

    fn finish(self: Box<Self>) -> pixcode::Result<()> {
        self.bar.finish();
        self.inner.finish()
    }
}
