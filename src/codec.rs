use std::collections::BTreeSet;
use std::path::Path;

use image::RgbImage;
use log::{debug, info, warn};
use rayon::prelude::*;

use crate::bits::{self, Admitted};
use crate::classifier::{BlockClassifier, Cell};
use crate::config::CodecConfig;
use crate::error::Result;
use crate::painter::FramePainter;
use crate::sequencer::{self, FrameSink};

/// What an encode pass produced.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EncodeReport {
    pub bytes: usize,
    pub symbols: usize,
    pub frames: usize,

    /// Characters that couldn't be represented in 8 bits and were left out
    pub skipped: BTreeSet<char>,
}

/// Bytes -> bits -> symbol codes -> frames -> video, and back again.
#[derive(Clone, Debug)]
pub struct Codec {
    config: CodecConfig,
    painter: FramePainter,
    classifier: BlockClassifier,
}

impl Codec {
    pub fn new(config: CodecConfig) -> Self {
        let palette = config.palette();
        Self {
            painter: FramePainter::new(config.geometry, palette.clone()),
            classifier: BlockClassifier::new(config.geometry, palette),
            config,
        }
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    pub fn painter(&self) -> &FramePainter {
        &self.painter
    }

    pub fn classifier(&self) -> &BlockClassifier {
        &self.classifier
    }

    /// How many frames are painted at once before being handed, in order, to a sink.
    fn batch_size(&self) -> usize {
        rayon::current_num_threads().max(1)
    }

    pub fn symbols(&self, bytes: &[u8]) -> Vec<u8> {
        bits::bits_to_symbols(&bits::bytes_to_bits(bytes), self.config.arity)
    }

    /// Paints `bytes` and pushes every frame into `sink`, in order.
    ///
    /// Does not call [`FrameSink::finish()`].
    pub fn encode(&self, bytes: &[u8], sink: &mut dyn FrameSink) -> Result<EncodeReport> {
        let codes = self.symbols(bytes);
        info!(
            "Encoding {} bytes as {} symbols ({} per frame)",
            bytes.len(),
            codes.len(),
            self.config.geometry.capacity()
        );

        let mut cursor = 0;
        while cursor < codes.len() {
            let (frames, consumed) = self.painter.paint_batch(&codes[cursor..], self.batch_size());
            for frame in &frames {
                sink.push(frame)?;
            }
            cursor += consumed;
            debug!("Painted {cursor} of {} symbols", codes.len());
        }

        let report = EncodeReport {
            bytes: bytes.len(),
            symbols: codes.len(),
            frames: sink.frames_written(),
            skipped: BTreeSet::new(),
        };
        info!("Encoded {} frames", report.frames);
        Ok(report)
    }

    /// Like [`encode()`](Self::encode), but for text: characters wider than one byte are
    /// skipped and reported instead of failing the whole pass.
    pub fn encode_text(&self, text: &str, sink: &mut dyn FrameSink) -> Result<EncodeReport> {
        let Admitted { bytes, skipped } = bits::admit_text(text);
        if !skipped.is_empty() {
            warn!("Skipped invalid characters: {skipped:?}");
        }

        let mut report = self.encode(&bytes, sink)?;
        report.skipped = skipped;
        Ok(report)
    }

    /// Encodes `bytes` into a complete video at `path`.
    pub fn encode_to_path(&self, bytes: &[u8], path: &Path) -> Result<EncodeReport> {
        let mut sink = sequencer::create(path, &self.config)?;
        let report = self.encode(bytes, sink.as_mut())?;
        sink.finish()?;
        Ok(report)
    }

    /// Classifies every frame, in order, and reassembles the bytes.
    ///
    /// Background blocks carry no bits; a trailing partial byte is dropped.
    pub fn decode(&self, mut frames: impl Iterator<Item = Result<RgbImage>>) -> Result<Vec<u8>> {
        let mut bits = vec![];
        let mut n_frames = 0;

        loop {
            let batch: Vec<RgbImage> = frames
                .by_ref()
                .take(self.batch_size())
                .collect::<Result<_>>()?;
            if batch.is_empty() {
                break;
            }
            n_frames += batch.len();

            let cells: Vec<Vec<Cell>> = batch
                .par_iter()
                .map(|frame| self.classifier.classify(frame))
                .collect::<Result<_>>()?;
            for frame_cells in &cells {
                bits.extend(bits::symbols_to_bits(frame_cells, self.config.arity));
            }
        }

        let bytes = bits::bits_to_bytes(&bits);
        info!(
            "Decoded {} frames into {} bits ({} bytes)",
            n_frames,
            bits.len(),
            bytes.len()
        );
        Ok(bytes)
    }

    pub fn decode_path(&self, path: &Path) -> Result<Vec<u8>> {
        let frames = sequencer::open(path, &self.config.geometry)?;
        self.decode(frames)
    }

    pub fn decode_text(&self, path: &Path) -> Result<String> {
        Ok(bits::bytes_to_text(&self.decode_path(path)?))
    }
}

#[cfg(test)]
mod t {
    use super::*;

    use crate::palette::{Arity, BACKGROUND, BLACK, WHITE};

    use pretty_assertions::assert_eq;

    /// Keeps frames in memory instead of writing a video.
    #[derive(Default)]
    struct Frames(Vec<RgbImage>);

    impl FrameSink for Frames {
        fn push(&mut self, frame: &RgbImage) -> Result<()> {
            self.0.push(frame.clone());
            Ok(())
        }

        fn frames_written(&self) -> usize {
            self.0.len()
        }

        fn finish(self: Box<Self>) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn check_hi_monochrome_hd() {
        let codec = Codec::new(CodecConfig::new(1920, 1080, 5, Arity::Monochrome).unwrap());
        let mut frames = Frames::default();
        let report = codec.encode(b"Hi", &mut frames).unwrap();
        assert_eq!(report.symbols, 16);
        assert_eq!(report.frames, 1);

        // 01001000 01101001, one block per bit along the top row
        let frame = &frames.0[0];
        let expected = "0100100001101001";
        for (i, bit) in expected.chars().enumerate() {
            let px = *frame.get_pixel(i as u32 * 5 + 2, 2);
            assert_eq!(px, if bit == '1' { WHITE } else { BLACK }, "block {i}");
        }
        assert_eq!(*frame.get_pixel(16 * 5 + 2, 2), BACKGROUND);
        assert_eq!(*frame.get_pixel(1919, 1079), BACKGROUND);

        let cells = codec.classifier().classify(frame).unwrap();
        assert_eq!(cells.len(), 82_944);
        let background = cells.iter().filter(|&&c| c == Cell::Background).count();
        assert_eq!(background, 82_944 - 16);

        let bytes = codec.decode(frames.0.into_iter().map(Ok)).unwrap();
        assert_eq!(bytes, b"Hi".to_vec());
    }

    #[test]
    fn check_multiple_frames_stay_in_order() {
        // 4 blocks per frame, 3 bits each
        let codec = Codec::new(CodecConfig::new(4, 4, 2, Arity::Color).unwrap());
        let message = b"frames arrive in order";

        let mut frames = Frames::default();
        let report = codec.encode(message, &mut frames).unwrap();
        // 22 bytes = 176 bits = 59 symbols = 15 frames
        assert_eq!(report.symbols, 59);
        assert_eq!(report.frames, 15);

        let bytes = codec.decode(frames.0.into_iter().map(Ok)).unwrap();
        assert_eq!(bytes, message.to_vec());
    }

    #[test]
    fn check_encode_text_reports_skipped() {
        let codec = Codec::new(CodecConfig::new(40, 40, 2, Arity::Color).unwrap());
        let mut frames = Frames::default();
        let report = codec.encode_text("naïve café", &mut frames).unwrap();
        assert_eq!(report.skipped, BTreeSet::from(['ï', 'é']));
        assert_eq!(report.bytes, 8);

        let bytes = codec.decode(frames.0.into_iter().map(Ok)).unwrap();
        assert_eq!(bits::bytes_to_text(&bytes), "nave caf");
    }

    #[test]
    fn check_empty_input_has_no_frames() {
        let codec = Codec::new(CodecConfig::new(4, 4, 2, Arity::Monochrome).unwrap());
        let mut frames = Frames::default();
        let report = codec.encode(&[], &mut frames).unwrap();
        assert_eq!(report.frames, 0);
        assert_eq!(codec.decode(std::iter::empty()).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn check_decode_stops_on_bad_frame() {
        let codec = Codec::new(CodecConfig::new(4, 4, 2, Arity::Monochrome).unwrap());
        let frames = vec![Ok(RgbImage::from_pixel(4, 4, WHITE)), Ok(RgbImage::new(2, 2))];
        assert!(codec.decode(frames.into_iter()).is_err());
    }
}
