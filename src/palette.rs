use image::Rgb;

pub const BLACK: Rgb<u8> = Rgb([0x00, 0x00, 0x00]);
pub const WHITE: Rgb<u8> = Rgb([0xFF, 0xFF, 0xFF]);

/// Canvas fill, meaning "no data here".
///
/// Mid-gray sits at the center of the RGB cube, as far as it can get from every corner color.
pub const BACKGROUND: Rgb<u8> = Rgb([0x7F, 0x7F, 0x7F]);

/// How many bits a single block carries.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Arity {
    /// 1 bit per block: black and white
    Monochrome,

    /// 3 bits per block: the 8 corners of the RGB cube
    Color,
}

impl Arity {
    pub const fn bits(self) -> usize {
        match self {
            Arity::Monochrome => 1,
            Arity::Color => 3,
        }
    }
}

/// Ordered `(code, color)` table for one [`Arity`], plus the background sentinel.
///
/// Both the painter and the classifier must be handed the same palette, or decoding
/// quietly produces garbage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Palette {
    entries: Vec<(u8, Rgb<u8>)>,
    background: Rgb<u8>,
}

impl Palette {
    pub fn new(arity: Arity) -> Self {
        let entries = match arity {
            Arity::Monochrome => vec![(0, BLACK), (1, WHITE)],
            // Bits are `rgb`: each set bit turns its channel fully on.
            // 000 is black, 111 is white, 101 is magenta, etc.
            Arity::Color => (0..8_u8)
                .map(|code| {
                    let channel = |bit: u8| if code & bit != 0 { 0xFF } else { 0x00 };
                    (code, Rgb([channel(0b100), channel(0b010), channel(0b001)]))
                })
                .collect(),
        };

        Self {
            entries,
            background: BACKGROUND,
        }
    }

    pub fn monochrome() -> Self {
        Self::new(Arity::Monochrome)
    }

    pub fn color() -> Self {
        Self::new(Arity::Color)
    }

    pub fn background(&self) -> Rgb<u8> {
        self.background
    }

    pub fn entries(&self) -> &[(u8, Rgb<u8>)] {
        &self.entries
    }

    /// Reference color for `code`.
    ///
    /// Codes are produced by grouping `arity.bits()` bits, so they always index the table.
    pub fn color_of(&self, code: u8) -> Rgb<u8> {
        self.entries[code as usize].1
    }

    /// Nearest reference to `px` in RGB space, or `None` if that is the background.
    ///
    /// Data entries are scanned in code order and the background last; on a tie the
    /// first one seen wins.
    pub fn nearest(&self, px: Rgb<u8>) -> Option<u8> {
        let mut best = (None, distance_sq(px, self.background));
        for &(code, color) in self.entries.iter().rev() {
            let d = distance_sq(px, color);
            if d <= best.1 {
                best = (Some(code), d);
            }
        }
        best.0
    }
}

/// Squared Euclidean distance. Ordering is the same as the true distance, without the sqrt.
pub fn distance_sq(a: Rgb<u8>, b: Rgb<u8>) -> u32 {
    a.0.iter()
        .zip(b.0.iter())
        .map(|(&a, &b)| {
            let d = a as i32 - b as i32;
            (d * d) as u32
        })
        .sum()
}
