//! 7×7 binary input bitmaps and the classifier's label set.

use anyhow::{bail, Result};

use crate::sim::config::{Fp, INPUT_COUNT};

pub type Bitmap = [bool; INPUT_COUNT];

pub const LABELS: [&str; 3] = ["circle", "square", "triangle"];

#[rustfmt::skip]
pub const BASE_CIRCLE: [u8; INPUT_COUNT] = [
    0, 0, 0, 0, 0, 0, 0,
    0, 0, 1, 1, 1, 0, 0,
    0, 1, 0, 0, 0, 1, 0,
    0, 1, 0, 0, 0, 1, 0,
    0, 1, 0, 0, 0, 1, 0,
    0, 0, 1, 1, 1, 0, 0,
    0, 0, 0, 0, 0, 0, 0,
];

#[rustfmt::skip]
pub const BASE_SQUARE: [u8; INPUT_COUNT] = [
    0, 0, 0, 0, 0, 0, 0,
    0, 1, 1, 1, 1, 1, 0,
    0, 1, 0, 0, 0, 1, 0,
    0, 1, 0, 0, 0, 1, 0,
    0, 1, 0, 0, 0, 1, 0,
    0, 1, 1, 1, 1, 1, 0,
    0, 0, 0, 0, 0, 0, 0,
];

#[rustfmt::skip]
pub const BASE_TRIANGLE: [u8; INPUT_COUNT] = [
    0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 1, 0, 0, 0,
    0, 0, 1, 0, 1, 0, 0,
    0, 1, 0, 0, 0, 1, 0,
    1, 0, 0, 0, 0, 0, 1,
    1, 1, 1, 1, 1, 1, 1,
    0, 0, 0, 0, 0, 0, 0,
];

pub fn bitmap_from_bytes(bytes: &[u8; INPUT_COUNT]) -> Bitmap {
    let mut bitmap = [false; INPUT_COUNT];
    for (cell, byte) in bitmap.iter_mut().zip(bytes) {
        *cell = *byte != 0;
    }
    bitmap
}

/// Parse a text bitmap: 49 `0`/`1` cells, whitespace-separated in any
/// shape (7 rows of 7 is the conventional one), blank lines ignored.
pub fn parse_bitmap(text: &str) -> Result<Bitmap> {
    let mut bitmap = [false; INPUT_COUNT];
    let mut count = 0;

    for token in text.split_whitespace() {
        for cell in token.chars() {
            if count >= INPUT_COUNT {
                bail!("bitmap has more than {INPUT_COUNT} cells");
            }
            bitmap[count] = match cell {
                '0' => false,
                '1' => true,
                other => bail!("bad bitmap cell {other:?} (expected '0' or '1')"),
            };
            count += 1;
        }
    }

    if count != INPUT_COUNT {
        bail!("bitmap has {count} cells, expected {INPUT_COUNT}");
    }
    Ok(bitmap)
}

/// Index of the highest score. Empty slices have no winner.
pub fn argmax(scores: &[Fp]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (index, &score) in scores.iter().enumerate() {
        if best.map_or(true, |b| score > scores[b]) {
            best = Some(index);
        }
    }
    best
}
