//! Image payloads for predict uploads.
//!
//! Pool mode re-encodes a random real image; synthetic mode encodes uniform random pixels.
//! Generation is synchronous CPU work and never suspends.
use image::{codecs::jpeg::JpegEncoder, imageops::FilterType, RgbImage};
use rand::{seq::SliceRandom, Rng};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use volley_core::{Dimensions, POOL_JPEG_QUALITY};

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("Failed to list image pool {path}: {source}")]
    Pool {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to load {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Failed to encode JPEG: {0}")]
    Encode(#[from] image::ImageError),

    #[error("Invalid payload dimensions {0}")]
    Dimensions(Dimensions),
}

/// Produces JPEG upload bodies of a requested size.
///
/// The pool listing is read once and shared read-only between all in-flight requests.
#[derive(Debug, Clone, Default)]
pub struct PayloadGenerator {
    pool: Arc<[PathBuf]>,
}

impl PayloadGenerator {
    /// Generator that always produces synthetic images.
    pub fn synthetic() -> Self {
        Self::default()
    }

    /// Load `*.jpg`/`*.jpeg` files from `dir`. An empty directory selects synthetic mode; only
    /// a directory that cannot be listed is an error.
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self, PayloadError> {
        let dir = dir.as_ref();
        let entries = std::fs::read_dir(dir).map_err(|source| PayloadError::Pool {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut pool = vec![];
        for entry in entries {
            let path = entry
                .map_err(|source| PayloadError::Pool {
                    path: dir.to_path_buf(),
                    source,
                })?
                .path();
            if is_jpeg(&path) {
                pool.push(path);
            }
        }
        pool.sort();

        if pool.is_empty() {
            warn!(
                "No images found in {}, generating synthetic images",
                dir.display()
            );
        } else {
            info!("Loaded {} images from {}", pool.len(), dir.display());
        }

        Ok(Self { pool: pool.into() })
    }

    pub fn pool_size(&self) -> usize {
        self.pool.len()
    }

    pub fn generate(&self, dims: Dimensions) -> Result<Vec<u8>, PayloadError> {
        if dims.width() == 0 || dims.height() == 0 {
            return Err(PayloadError::Dimensions(dims));
        }

        let path = self.pool.choose(&mut rand::thread_rng());
        match path {
            Some(path) => from_pool(path, dims),
            None => synthetic(dims),
        }
    }
}

fn from_pool(path: &Path, dims: Dimensions) -> Result<Vec<u8>, PayloadError> {
    let mut img = image::open(path).map_err(|source| PayloadError::Decode {
        path: path.to_path_buf(),
        source,
    })?;

    if img.width() != dims.width() || img.height() != dims.height() {
        img = img.resize_exact(dims.width(), dims.height(), FilterType::Lanczos3);
    }
    let rgb = img.to_rgb8();

    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, POOL_JPEG_QUALITY).encode_image(&rgb)?;
    debug!("Pool image {} encoded to {} bytes", path.display(), buf.len());
    Ok(buf)
}

fn synthetic(dims: Dimensions) -> Result<Vec<u8>, PayloadError> {
    let mut pixels = vec![0u8; dims.width() as usize * dims.height() as usize * 3];
    rand::thread_rng().fill(&mut pixels[..]);
    let rgb = RgbImage::from_raw(dims.width(), dims.height(), pixels)
        .ok_or(PayloadError::Dimensions(dims))?;

    let mut buf = Vec::new();
    JpegEncoder::new(&mut buf).encode_image(&rgb)?;
    Ok(buf)
}

fn is_jpeg(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("jpeg"))
        .unwrap_or(false)
}
