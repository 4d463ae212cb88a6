use std::path::Path;

use image::{imageops, Rgb, RgbImage};
use tracing::info;

use crate::dataloader::{
    error::EngineError,
    mnist::{IMAGE_COLS, IMAGE_ROWS},
    synth::CHANNELS,
};

use super::{
    font::{draw_text, text_width, GLYPH_HEIGHT},
    predict::Evaluation,
};

pub const IMAGE_SCALE: u32 = 4;
pub const BORDER: u32 = 3;
pub const TEXT_SCALE: u32 = 2;
const PAD: u32 = 4;
const GAP: u32 = 8;

const IMAGE_PX: u32 = IMAGE_COLS as u32 * IMAGE_SCALE;
const FRAME_PX: u32 = IMAGE_PX + 2 * BORDER;
const TEXT_PX: u32 = GLYPH_HEIGHT * TEXT_SCALE;

pub const TILE_WIDTH: u32 = 160;
pub const TILE_HEIGHT: u32 = PAD + TEXT_PX + PAD + FRAME_PX + PAD + TEXT_PX + PAD;

// Frame position inside a tile
pub const FRAME_X: u32 = (TILE_WIDTH - FRAME_PX) / 2;
pub const FRAME_Y: u32 = PAD + TEXT_PX + PAD;

pub const CORRECT_COLOR: Rgb<u8> = Rgb([0, 160, 0]);
pub const WRONG_COLOR: Rgb<u8> = Rgb([200, 0, 0]);
const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);

/// 8-bit RGB copy of a channel-last float image; values are clamped to [0, 1] here only.
pub fn to_rgb_image(image: &[f32]) -> RgbImage {
    let mut out = RgbImage::new(IMAGE_COLS as u32, IMAGE_ROWS as u32);
    for (pixel, values) in out.pixels_mut().zip(image.chunks_exact(CHANNELS)) {
        for (channel, &value) in pixel.0.iter_mut().zip(values.iter()) {
            *channel = (value.clamp(0.0, 1.0) * 255.0).round() as u8;
        }
    }
    out
}

fn upscaled(image: &[f32]) -> RgbImage {
    imageops::resize(&to_rgb_image(image), IMAGE_PX, IMAGE_PX, imageops::FilterType::Nearest)
}

pub fn save_example_png(image: &[f32], path: &Path) -> Result<(), EngineError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    upscaled(image).save(path)?;
    info!(path = %path.display(), "image written");
    Ok(())
}

fn fill_rect(image: &mut RgbImage, x: u32, y: u32, width: u32, height: u32, color: Rgb<u8>) {
    for py in y..(y + height).min(image.height()) {
        for px in x..(x + width).min(image.width()) {
            image.put_pixel(px, py, color);
        }
    }
}

fn draw_centered(image: &mut RgbImage, tile_x: u32, y: u32, text: &str, color: Rgb<u8>) {
    let width = text_width(text, TEXT_SCALE);
    let x = tile_x + TILE_WIDTH.saturating_sub(width) / 2;
    draw_text(image, x, y, text, TEXT_SCALE, color);
}

/// Ground truth above, prediction below, framed image in between; all green when both heads are right.
pub fn draw_tile(canvas: &mut RgbImage, x: u32, y: u32, evaluation: &Evaluation) {
    let color = if evaluation.is_correct() { CORRECT_COLOR } else { WRONG_COLOR };

    draw_centered(canvas, x, y + PAD, &evaluation.gt_caption(), color);

    let (frame_x, frame_y) = (x + FRAME_X, y + FRAME_Y);
    fill_rect(canvas, frame_x, frame_y, FRAME_PX, FRAME_PX, color);
    imageops::replace(
        canvas,
        &upscaled(&evaluation.image),
        (frame_x + BORDER) as i64,
        (frame_y + BORDER) as i64,
    );

    draw_centered(canvas, x, frame_y + FRAME_PX + PAD, &evaluation.pr_caption(), color);
}

pub fn grid_columns(tiles: usize) -> usize {
    let mut columns = 1;
    while columns * columns < tiles {
        columns += 1;
    }
    columns
}

/// Top-left corner of tile `index` in a grid with `columns` columns.
pub fn tile_origin(index: usize, columns: usize) -> (u32, u32) {
    let (row, col) = ((index / columns) as u32, (index % columns) as u32);
    (GAP + col * (TILE_WIDTH + GAP), GAP + row * (TILE_HEIGHT + GAP))
}

/// Lays the evaluations out in a near-square grid (4×4 for 16).
pub fn render_grid(evaluations: &[Evaluation]) -> RgbImage {
    let columns = grid_columns(evaluations.len());
    let rows = evaluations.len().div_ceil(columns).max(1);

    let width = GAP + columns as u32 * (TILE_WIDTH + GAP);
    let height = GAP + rows as u32 * (TILE_HEIGHT + GAP);
    let mut canvas = RgbImage::from_pixel(width, height, BACKGROUND);

    for (index, evaluation) in evaluations.iter().enumerate() {
        let (x, y) = tile_origin(index, columns);
        draw_tile(&mut canvas, x, y, evaluation);
    }

    canvas
}

pub fn save_grid(evaluations: &[Evaluation], path: &Path) -> Result<(), EngineError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    render_grid(evaluations).save(path)?;
    info!(path = %path.display(), tiles = evaluations.len(), "prediction grid written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataloader::synth::{ColorFlag, VALUES_PER_IMAGE};

    fn evaluation(correct: bool) -> Evaluation {
        Evaluation {
            image: vec![0.25; VALUES_PER_IMAGE],
            gt_digit: 4,
            gt_color: ColorFlag::Green,
            pred_digit: 4,
            pred_color: if correct { ColorFlag::Green } else { ColorFlag::Red },
            color_probability: if correct { 0.8 } else { 0.2 },
        }
    }

    fn count_pixels(image: &RgbImage, x: u32, y: u32, w: u32, h: u32, color: Rgb<u8>) -> usize {
        (y..y + h)
            .flat_map(|py| (x..x + w).map(move |px| (px, py)))
            .filter(|&(px, py)| *image.get_pixel(px, py) == color)
            .count()
    }

    #[test]
    fn sixteen_tiles_in_a_four_by_four_grid() {
        let evaluations: Vec<Evaluation> = (0..16).map(|i| evaluation(i % 3 != 0)).collect();
        let grid = render_grid(&evaluations);

        assert_eq!(grid_columns(16), 4);
        assert_eq!(grid.width(), GAP + 4 * (TILE_WIDTH + GAP));
        assert_eq!(grid.height(), GAP + 4 * (TILE_HEIGHT + GAP));

        for (index, evaluation) in evaluations.iter().enumerate() {
            let (x, y) = tile_origin(index, 4);
            let expected = if evaluation.is_correct() { CORRECT_COLOR } else { WRONG_COLOR };
            let other = if evaluation.is_correct() { WRONG_COLOR } else { CORRECT_COLOR };

            // Border corner and caption strips carry the status color, never the other one
            assert_eq!(*grid.get_pixel(x + FRAME_X, y + FRAME_Y), expected);
            assert!(count_pixels(&grid, x, y, TILE_WIDTH, FRAME_Y, expected) > 0);
            assert!(count_pixels(&grid, x, y + FRAME_Y + FRAME_PX, TILE_WIDTH, TILE_HEIGHT - FRAME_Y - FRAME_PX, expected) > 0);
            assert_eq!(count_pixels(&grid, x, y, TILE_WIDTH, TILE_HEIGHT, other), 0);

            // Image inside the border, 0.25 -> 64
            let inner = grid.get_pixel(x + FRAME_X + BORDER + 10, y + FRAME_Y + BORDER + 10);
            assert_eq!(*inner, Rgb([64, 64, 64]));
        }
    }

    #[test]
    fn pixels_are_clamped_for_display() {
        let mut image = vec![0.5; VALUES_PER_IMAGE];
        image[0] = 1.4;
        image[1] = -0.2;
        let rgb = to_rgb_image(&image);
        assert_eq!(rgb.get_pixel(0, 0).0, [255, 0, 128]);
    }

    #[test]
    fn uneven_tile_counts_still_fit() {
        assert_eq!(grid_columns(1), 1);
        assert_eq!(grid_columns(5), 3);
        let grid = render_grid(&[evaluation(true), evaluation(false), evaluation(true)]);
        assert_eq!(grid.height(), GAP + 2 * (TILE_HEIGHT + GAP));
    }

    #[test]
    fn saves_png_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("grid.png");
        save_grid(&[evaluation(true)], &path).unwrap();
        save_example_png(&vec![0.1; VALUES_PER_IMAGE], &dir.path().join("one.png")).unwrap();

        let loaded = image::open(&path).unwrap();
        assert_eq!(loaded.width(), GAP + TILE_WIDTH + GAP);
        assert!(dir.path().join("one.png").is_file());
    }
}
