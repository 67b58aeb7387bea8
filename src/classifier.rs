use image::RgbImage;

use crate::error::{Error, Result};
use crate::geometry::Geometry;
use crate::palette::Palette;

/// What a single block decoded to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Cell {
    Symbol(u8),

    /// Nearest to the background sentinel: no data here.
    Background,
}

/// Reads blocks back out of (possibly lossy) frames.
///
/// Each block is judged by the one pixel at its center, matched to the nearest palette
/// color. Video codecs smear colors across block edges, so the center is the pixel most
/// likely to still look like what was painted.
#[derive(Clone, Debug)]
pub struct BlockClassifier {
    geometry: Geometry,
    palette: Palette,
}

impl BlockClassifier {
    pub fn new(geometry: Geometry, palette: Palette) -> Self {
        Self { geometry, palette }
    }

    /// Classifies every block of `frame`, in row-major order.
    pub fn classify(&self, frame: &RgbImage) -> Result<Vec<Cell>> {
        if frame.dimensions() != self.geometry.dims() {
            return Err(Error::FrameSizeMismatch {
                expected: self.geometry.dims(),
                actual: frame.dimensions(),
            });
        }

        Ok(self
            .geometry
            .sample_points()
            .map(|(x, y)| match self.palette.nearest(*frame.get_pixel(x, y)) {
                Some(code) => Cell::Symbol(code),
                None => Cell::Background,
            })
            .collect())
    }
}

#[cfg(test)]
mod t {
    use super::*;

    use crate::painter::FramePainter;

    use image::Rgb;
    use pretty_assertions::assert_eq;

    #[test]
    fn check_reads_back_painted_frame() {
        let geometry = Geometry::new(6, 4, 2).unwrap();
        let palette = Palette::color();
        let painter = FramePainter::new(geometry, palette.clone());
        let classifier = BlockClassifier::new(geometry, palette);

        let (img, _) = painter.paint(&[0b000, 0b111, 0b101, 0b010]);
        assert_eq!(
            classifier.classify(&img).unwrap(),
            vec![
                Cell::Symbol(0b000),
                Cell::Symbol(0b111),
                Cell::Symbol(0b101),
                Cell::Symbol(0b010),
                Cell::Background,
                Cell::Background,
            ]
        );
    }

    #[test]
    fn check_samples_center_not_edges() {
        let geometry = Geometry::new(5, 5, 5).unwrap();
        let classifier = BlockClassifier::new(geometry, Palette::monochrome());

        // Smear everything but the center pixel
        let mut img = RgbImage::from_pixel(5, 5, Rgb([0, 0, 0]));
        img.put_pixel(2, 2, Rgb([250, 250, 250]));
        assert_eq!(classifier.classify(&img).unwrap(), vec![Cell::Symbol(1)]);
    }

    #[test]
    fn check_tolerates_drift() {
        let geometry = Geometry::new(2, 2, 2).unwrap();
        let classifier = BlockClassifier::new(geometry, Palette::color());

        // Magenta, knocked around by +-5 per channel
        for px in [Rgb([250, 5, 250]), Rgb([255, 3, 251]), Rgb([251, 0, 255])] {
            let img = RgbImage::from_pixel(2, 2, px);
            assert_eq!(classifier.classify(&img).unwrap(), vec![Cell::Symbol(0b101)]);
        }

        // Near-gray stays background
        let img = RgbImage::from_pixel(2, 2, Rgb([120, 135, 127]));
        assert_eq!(classifier.classify(&img).unwrap(), vec![Cell::Background]);
    }

    #[test]
    fn check_rejects_wrong_frame_size() {
        let geometry = Geometry::new(4, 4, 2).unwrap();
        let classifier = BlockClassifier::new(geometry, Palette::monochrome());

        let img = RgbImage::new(4, 2);
        assert!(matches!(
            classifier.classify(&img),
            Err(Error::FrameSizeMismatch {
                expected: (4, 4),
                actual: (4, 2),
            })
        ));
    }
}
