use std::{
    fs,
    path::{Path, PathBuf},
};

use tracing::{debug, info};

use super::error::EngineError;

pub const IMAGE_ROWS: usize = 28;
pub const IMAGE_COLS: usize = 28;
pub const PIXELS_PER_IMAGE: usize = IMAGE_ROWS * IMAGE_COLS;
pub const NUM_CLASSES: u8 = 10;

const IMAGES_MAGIC: u32 = 2051;
const LABELS_MAGIC: u32 = 2049;

/// One grayscale digit borrowed from a loaded split.
#[derive(Clone, Copy, Debug)]
pub struct RawExample<'a> {
    pub pixels: &'a [u8],
    pub label: u8,
}

/// Images stored back to back as `len × 28 × 28` bytes, labels aligned by index.
#[derive(Clone, Debug)]
pub struct MnistSplit {
    pub images: Vec<u8>,
    pub labels: Vec<u8>,
}

impl MnistSplit {
    pub fn new(images: Vec<u8>, labels: Vec<u8>) -> Result<Self, EngineError> {
        let count = images.len() / PIXELS_PER_IMAGE;
        if images.len() % PIXELS_PER_IMAGE != 0 || count != labels.len() {
            return Err(EngineError::CountMismatch {
                images: count,
                labels: labels.len(),
            });
        }
        if let Some(bad) = labels.iter().find(|&&label| label >= NUM_CLASSES) {
            return Err(EngineError::InvalidConfig(format!("label {} out of range 0-9", bad)));
        }
        Ok(Self { images, labels })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn get(&self, index: usize) -> RawExample<'_> {
        let start = index * PIXELS_PER_IMAGE;
        RawExample {
            pixels: &self.images[start..start + PIXELS_PER_IMAGE],
            label: self.labels[index],
        }
    }

    /// How many examples carry each digit label.
    pub fn label_histogram(&self) -> [usize; NUM_CLASSES as usize] {
        let mut counts = [0usize; NUM_CLASSES as usize];
        for &label in &self.labels {
            counts[label as usize] += 1;
        }
        counts
    }
}

pub struct MnistDataset {
    pub train: MnistSplit,
    pub test: MnistSplit,
}

/// Loads both splits from `dir`, accepting `train-images-idx3-ubyte` as well as
/// the dotted `train-images.idx3-ubyte` spelling.
pub fn load_mnist(dir: &Path) -> Result<MnistDataset, EngineError> {
    let train = load_split(dir, "train")?;
    let test = load_split(dir, "t10k")?;

    info!(
        dir = %dir.display(),
        train = train.len(),
        test = test.len(),
        "MNIST loaded"
    );

    Ok(MnistDataset { train, test })
}

fn load_split(dir: &Path, prefix: &str) -> Result<MnistSplit, EngineError> {
    let images_path = resolve_file(dir, &format!("{}-images", prefix), "idx3-ubyte")?;
    let labels_path = resolve_file(dir, &format!("{}-labels", prefix), "idx1-ubyte")?;

    let images = read_idx_images(&images_path)?;
    let labels = read_idx_labels(&labels_path)?;

    let image_count = images.len() / PIXELS_PER_IMAGE;
    if image_count != labels.len() {
        return Err(EngineError::CountMismatch {
            images: image_count,
            labels: labels.len(),
        });
    }

    MnistSplit::new(images, labels)
}

fn resolve_file(dir: &Path, stem: &str, extension: &str) -> Result<PathBuf, EngineError> {
    let candidates = [
        dir.join(format!("{}-{}", stem, extension)),
        dir.join(format!("{}.{}", stem, extension)),
    ];

    candidates
        .iter()
        .find(|path| path.is_file())
        .cloned()
        .ok_or_else(|| EngineError::DatasetNotFound(candidates[0].display().to_string()))
}

pub fn read_idx_images(path: &Path) -> Result<Vec<u8>, EngineError> {
    let bytes = fs::read(path)?;
    parse_idx_images(&bytes, &path.display().to_string())
}

pub fn read_idx_labels(path: &Path) -> Result<Vec<u8>, EngineError> {
    let bytes = fs::read(path)?;
    parse_idx_labels(&bytes, &path.display().to_string())
}

fn malformed(path: &str, reason: impl Into<String>) -> EngineError {
    EngineError::MalformedIdx {
        path: path.to_string(),
        reason: reason.into(),
    }
}

fn read_be_u32(data: &[u8], offset: &mut usize, path: &str) -> Result<u32, EngineError> {
    let bytes = data
        .get(*offset..*offset + 4)
        .ok_or_else(|| malformed(path, "truncated header"))?;
    *offset += 4;
    Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

// Header: magic, count, rows, cols (big-endian u32), then count*rows*cols bytes
pub(crate) fn parse_idx_images(data: &[u8], path: &str) -> Result<Vec<u8>, EngineError> {
    let mut offset = 0usize;

    let magic = read_be_u32(data, &mut offset, path)?;
    if magic != IMAGES_MAGIC {
        return Err(malformed(path, format!("bad magic {} (expected {})", magic, IMAGES_MAGIC)));
    }

    let count = read_be_u32(data, &mut offset, path)? as usize;
    let rows = read_be_u32(data, &mut offset, path)? as usize;
    let cols = read_be_u32(data, &mut offset, path)? as usize;

    if rows != IMAGE_ROWS || cols != IMAGE_COLS {
        return Err(malformed(
            path,
            format!("unexpected image shape {}x{} (expected {}x{})", rows, cols, IMAGE_ROWS, IMAGE_COLS),
        ));
    }

    let total_bytes = count * rows * cols;
    let pixels = data
        .get(offset..offset + total_bytes)
        .ok_or_else(|| malformed(path, format!("truncated: header promises {} images", count)))?;

    debug!(path, count, rows, cols, "parsed IDX images");
    Ok(pixels.to_vec())
}

// Header: magic, count (big-endian u32), then count label bytes
pub(crate) fn parse_idx_labels(data: &[u8], path: &str) -> Result<Vec<u8>, EngineError> {
    let mut offset = 0usize;

    let magic = read_be_u32(data, &mut offset, path)?;
    if magic != LABELS_MAGIC {
        return Err(malformed(path, format!("bad magic {} (expected {})", magic, LABELS_MAGIC)));
    }

    let count = read_be_u32(data, &mut offset, path)? as usize;
    let labels = data
        .get(offset..offset + count)
        .ok_or_else(|| malformed(path, format!("truncated: header promises {} labels", count)))?;

    if let Some(bad) = labels.iter().find(|&&label| label >= NUM_CLASSES) {
        return Err(malformed(path, format!("label {} out of range 0-9", bad)));
    }

    debug!(path, count, "parsed IDX labels");
    Ok(labels.to_vec())
}

/// Serializes images/labels in IDX format; used to build small fixture datasets.
pub fn encode_idx_images(images: &[u8]) -> Vec<u8> {
    let count = (images.len() / PIXELS_PER_IMAGE) as u32;
    let mut out = Vec::with_capacity(16 + images.len());
    for value in [IMAGES_MAGIC, count, IMAGE_ROWS as u32, IMAGE_COLS as u32] {
        out.extend_from_slice(&value.to_be_bytes());
    }
    out.extend_from_slice(images);
    out
}

pub fn encode_idx_labels(labels: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + labels.len());
    out.extend_from_slice(&LABELS_MAGIC.to_be_bytes());
    out.extend_from_slice(&(labels.len() as u32).to_be_bytes());
    out.extend_from_slice(labels);
    out
}
