//! Deterministic per-instance overlay colors.
//!
//! Instances are colored by their position in the detection list, cycling
//! through a fixed palette. There is no randomness and no state: the same index
//! yields the same color in every run and every process.

use serde::{Deserialize, Serialize};

/// An 8-bit RGB triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RgbColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl RgbColor {
    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    #[must_use]
    pub const fn channels(self) -> [u8; 3] {
        [self.r, self.g, self.b]
    }
}

impl From<RgbColor> for image::Rgb<u8> {
    fn from(c: RgbColor) -> Self {
        image::Rgb(c.channels())
    }
}

/// Number of palette entries before colors repeat.
pub const PALETTE_LEN: usize = 12;

/// Ordered overlay palette: primaries, secondaries, then half-intensity mixes.
pub const PALETTE: [RgbColor; PALETTE_LEN] = [
    RgbColor::new(0, 0, 255),
    RgbColor::new(0, 255, 0),
    RgbColor::new(255, 0, 0),
    RgbColor::new(0, 255, 255),
    RgbColor::new(255, 0, 255),
    RgbColor::new(255, 255, 0),
    RgbColor::new(255, 0, 128),
    RgbColor::new(0, 128, 255),
    RgbColor::new(255, 128, 0),
    RgbColor::new(0, 255, 128),
    RgbColor::new(128, 0, 255),
    RgbColor::new(128, 255, 0),
];

/// Color for the instance at `index` in emission order.
#[must_use]
pub const fn color_for(index: usize) -> RgbColor {
    PALETTE[index % PALETTE_LEN]
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    #[test]
    fn palette_entries_are_distinct() {
        let unique: HashSet<RgbColor> = PALETTE.iter().copied().collect();
        assert_eq!(unique.len(), PALETTE_LEN);
    }

    #[test]
    fn thirteenth_instance_reuses_first_color() {
        assert_eq!(color_for(12), color_for(0));
        assert_eq!(color_for(12), PALETTE[0]);
        assert_eq!(color_for(25), PALETTE[1]);
    }

    #[test]
    fn first_cycle_follows_palette_order() {
        for (i, expected) in PALETTE.iter().enumerate() {
            assert_eq!(color_for(i), *expected);
        }
    }

    #[test]
    fn converts_to_image_pixel() {
        let px: image::Rgb<u8> = RgbColor::new(1, 2, 3).into();
        assert_eq!(px.0, [1, 2, 3]);
    }

    proptest! {
        #[test]
        fn color_depends_only_on_index_mod_len(index in 0usize..1_000_000) {
            prop_assert_eq!(color_for(index), color_for(index % PALETTE_LEN));
            prop_assert_eq!(color_for(index), color_for(index + PALETTE_LEN));
        }
    }
}
