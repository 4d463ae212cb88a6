use std::fmt;

use rand::{distributions::Uniform, Rng};
use serde::Serialize;

use super::mnist::{RawExample, PIXELS_PER_IMAGE};

pub const CHANNELS: usize = 3;
pub const VALUES_PER_IMAGE: usize = PIXELS_PER_IMAGE * CHANNELS;

// Background noise is uniform in [0, NOISE_MAX); the digit adds up to DIGIT_SCALE on top
pub const NOISE_MAX: f32 = 0.5;
pub const DIGIT_SCALE: f32 = 0.5;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorFlag {
    Red = 0,
    Green = 1,
}

impl ColorFlag {
    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(ColorFlag::Red),
            1 => Some(ColorFlag::Green),
            _ => None,
        }
    }

    pub fn from_probability(p: f32) -> Self {
        if p > 0.5 {
            ColorFlag::Green
        } else {
            ColorFlag::Red
        }
    }

    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        if rng.gen_bool(0.5) {
            ColorFlag::Green
        } else {
            ColorFlag::Red
        }
    }

    /// RGB channel that carries the digit.
    pub fn channel(self) -> usize {
        self as usize
    }

    /// Binary target for the color head.
    pub fn target(self) -> f32 {
        self as u8 as f32
    }

    pub fn name(self) -> &'static str {
        match self {
            ColorFlag::Red => "red",
            ColorFlag::Green => "green",
        }
    }
}

impl fmt::Display for ColorFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A digit drawn over colored noise. `image` is 28×28×3, channel last.
#[derive(Clone, Debug)]
pub struct SyntheticExample {
    pub image: Vec<f32>,
    pub digit: u8,
    pub color: ColorFlag,
}

pub fn create_example<R: Rng + ?Sized>(raw: &RawExample, rng: &mut R) -> SyntheticExample {
    let color = ColorFlag::random(rng);
    create_example_with_color(raw, color, rng)
}

/// Noise in every channel, then `0.5 * x / 255` added to the `color` channel. Values are not clipped.
pub fn create_example_with_color<R: Rng + ?Sized>(raw: &RawExample, color: ColorFlag, rng: &mut R) -> SyntheticExample {
    let noise = Uniform::new(0.0f32, NOISE_MAX);
    let mut image: Vec<f32> = (0..VALUES_PER_IMAGE).map(|_| rng.sample(noise)).collect();

    let channel = color.channel();
    for (pixel, &x) in image.chunks_exact_mut(CHANNELS).zip(raw.pixels.iter()) {
        pixel[channel] += DIGIT_SCALE * x as f32 / 255.0;
    }

    SyntheticExample {
        image,
        digit: raw.label,
        color,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataloader::mnist::IMAGE_COLS;
    use rand::{rngs::StdRng, SeedableRng};

    fn stroke() -> Vec<u8> {
        // Bright vertical bar in the middle column
        (0..PIXELS_PER_IMAGE)
            .map(|i| if i % IMAGE_COLS == 14 { 255 } else { 0 })
            .collect()
    }

    fn channel_values(example: &SyntheticExample, channel: usize) -> impl Iterator<Item = f32> + '_ {
        example.image.iter().skip(channel).step_by(CHANNELS).copied()
    }

    #[test]
    fn only_the_flagged_channel_carries_the_digit() {
        let pixels = stroke();
        let raw = RawExample { pixels: &pixels, label: 1 };
        let mut rng = StdRng::seed_from_u64(5);

        for _ in 0..20 {
            let example = create_example(&raw, &mut rng);
            assert_eq!(example.digit, 1);
            assert_eq!(example.image.len(), VALUES_PER_IMAGE);

            for channel in 0..CHANNELS {
                let max = channel_values(&example, channel).fold(0.0f32, f32::max);
                if channel == example.color.channel() {
                    assert!(max >= DIGIT_SCALE, "digit missing from channel {}", channel);
                } else {
                    assert!(max < NOISE_MAX, "digit leaked into channel {}", channel);
                }
            }
        }
    }

    #[test]
    fn zero_image_is_pure_noise() {
        let pixels = vec![0u8; PIXELS_PER_IMAGE];
        let raw = RawExample { pixels: &pixels, label: 0 };
        let example = create_example_with_color(&raw, ColorFlag::Red, &mut StdRng::seed_from_u64(1));

        assert_eq!(example.color, ColorFlag::Red);
        assert!(example.image.iter().all(|v| (0.0..NOISE_MAX).contains(v)));
    }

    #[test]
    fn bright_pixel_exceeds_one_without_clipping() {
        let pixels = vec![255u8; PIXELS_PER_IMAGE];
        let raw = RawExample { pixels: &pixels, label: 8 };
        let example = create_example_with_color(&raw, ColorFlag::Green, &mut StdRng::seed_from_u64(2));

        assert!(channel_values(&example, 1).all(|v| (DIGIT_SCALE..DIGIT_SCALE + NOISE_MAX).contains(&v)));
        assert!(channel_values(&example, 1).any(|v| v > 0.75));
    }

    #[test]
    fn color_flag_is_roughly_balanced() {
        let pixels = vec![0u8; PIXELS_PER_IMAGE];
        let raw = RawExample { pixels: &pixels, label: 0 };
        let mut rng = StdRng::seed_from_u64(11);

        let greens = (0..400)
            .filter(|_| create_example(&raw, &mut rng).color == ColorFlag::Green)
            .count();
        assert!((120..280).contains(&greens), "{} greens out of 400", greens);
    }

    #[test]
    fn flag_helpers() {
        assert_eq!(ColorFlag::from_index(1), Some(ColorFlag::Green));
        assert_eq!(ColorFlag::from_index(2), None);
        assert_eq!(ColorFlag::from_probability(0.5), ColorFlag::Red);
        assert_eq!(ColorFlag::from_probability(0.51), ColorFlag::Green);
        assert_eq!(ColorFlag::Green.to_string(), "green");
        assert_eq!(ColorFlag::Red.target(), 0.0);
    }
}
