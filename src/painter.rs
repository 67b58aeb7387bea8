use image::RgbImage;
use rayon::prelude::*;

use crate::geometry::Geometry;
use crate::palette::Palette;

/// Rasterizes symbol codes onto canvases, one block per code.
#[derive(Clone, Debug)]
pub struct FramePainter {
    geometry: Geometry,
    palette: Palette,
}

impl FramePainter {
    pub fn new(geometry: Geometry, palette: Palette) -> Self {
        Self { geometry, palette }
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// Paints as many of `codes` as fit into a single frame.
    ///
    /// Returns the frame and how many codes were placed; every block past the last code
    /// is left as background.
    pub fn paint(&self, codes: &[u8]) -> (RgbImage, usize) {
        let (width, height) = self.geometry.dims();
        let b = self.geometry.block_size();
        let mut img = RgbImage::from_pixel(width, height, self.palette.background());

        let mut placed = 0;
        for ((x0, y0), &code) in self.geometry.block_origins().zip(codes) {
            let color = self.palette.color_of(code);
            for y in y0..y0 + b {
                for x in x0..x0 + b {
                    img.put_pixel(x, y, color);
                }
            }
            placed += 1;
        }

        (img, placed)
    }

    /// Paints up to `max_frames` frames starting at `codes[0]` across the rayon pool.
    ///
    /// Frames come back in index order. Returns how many codes were consumed in total.
    pub fn paint_batch(&self, codes: &[u8], max_frames: usize) -> (Vec<RgbImage>, usize) {
        let capacity = self.geometry.capacity();
        let end = codes.len().min(capacity * max_frames);

        let frames: Vec<(RgbImage, usize)> = codes[..end]
            .par_chunks(capacity)
            .map(|page| self.paint(page))
            .collect();
        let consumed = frames.iter().map(|(_, n)| n).sum();

        (frames.into_iter().map(|(img, _)| img).collect(), consumed)
    }
}

#[cfg(test)]
mod t {
    use super::*;

    use crate::palette::{BACKGROUND, BLACK, WHITE};

    use image::Rgb;
    use pretty_assertions::assert_eq;

    fn mono(width: u32, height: u32, block_size: u32) -> FramePainter {
        FramePainter::new(
            Geometry::new(width, height, block_size).unwrap(),
            Palette::monochrome(),
        )
    }

    #[test]
    fn check_empty_codes_paint_background() {
        let painter = mono(8, 4, 2);
        let (img, placed) = painter.paint(&[]);
        assert_eq!(placed, 0);
        assert!(img.pixels().all(|&px| px == BACKGROUND));
    }

    #[test]
    fn check_blocks_fill_their_rectangle() {
        let painter = mono(6, 4, 2);
        // Row 0: white, black, white | Row 1: black, <background>, <background>
        let (img, placed) = painter.paint(&[1, 0, 1, 0]);
        assert_eq!(placed, 4);

        for (x, y) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
            assert_eq!(*img.get_pixel(x, y), WHITE);
        }
        for (x, y) in [(2, 0), (3, 1)] {
            assert_eq!(*img.get_pixel(x, y), BLACK);
        }
        assert_eq!(*img.get_pixel(5, 1), WHITE);
        assert_eq!(*img.get_pixel(1, 3), BLACK);
        assert_eq!(*img.get_pixel(2, 2), BACKGROUND);
        assert_eq!(*img.get_pixel(5, 3), BACKGROUND);
    }

    #[test]
    fn check_paint_stops_at_capacity() {
        let painter = mono(4, 4, 2);
        let (img, placed) = painter.paint(&[1; 10]);
        assert_eq!(placed, 4);
        assert!(img.pixels().all(|&px| px == WHITE));
    }

    #[test]
    fn check_color_block() {
        let painter = FramePainter::new(Geometry::new(4, 2, 2).unwrap(), Palette::color());
        let (img, placed) = painter.paint(&[0b101]);
        assert_eq!(placed, 1);
        assert_eq!(*img.get_pixel(1, 1), Rgb([255, 0, 255]));
        assert_eq!(*img.get_pixel(2, 0), BACKGROUND);
    }

    #[test]
    fn check_frames_paginate() {
        let painter = mono(4, 4, 2);
        let codes = [1_u8; 9];
        let (frames, consumed) = painter.paint_batch(&codes, 8);
        assert_eq!(consumed, 9);
        assert_eq!(frames.len(), 3);
        assert!(frames[1].pixels().all(|&px| px == WHITE));

        // The last frame holds a single block
        assert_eq!(*frames[2].get_pixel(0, 0), WHITE);
        assert_eq!(*frames[2].get_pixel(2, 0), BACKGROUND);
    }

    #[test]
    fn check_batch_matches_sequential() {
        let painter = mono(4, 4, 2);
        let codes: Vec<u8> = (0..11).map(|i| (i % 3 == 0) as u8).collect();

        let (batch, consumed) = painter.paint_batch(&codes, 2);
        assert_eq!(consumed, 8);
        assert_eq!(batch.len(), 2);

        let sequential: Vec<_> = codes
            .chunks(4)
            .take(2)
            .map(|page| painter.paint(page).0)
            .collect();
        assert_eq!(batch, sequential);
    }
}
