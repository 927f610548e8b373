//! Image loading and the single-slot image cache
//!
//! The cache holds at most one decoded image. Switching images always
//! releases the previous pixels before the next fetch starts, and dropping the
//! cache releases whatever it holds.

use image::RgbaImage;

use crate::api::types::ImageListResponse;
use crate::api::{ApiError, ImageSource};
use crate::domain::{GroundSampleDistance, ImageSize, UtmInfo};

/// Default page size for image listings
pub const PAGE_SIZE: u32 = 20;

/// Load status shown next to the viewer
#[derive(Clone, Debug, Default, PartialEq)]
pub enum LoadState {
    #[default]
    Idle,
    Loading {
        image_id: i64,
    },
    Loaded {
        image_id: i64,
    },
    /// `retryable` drives the inline retry control
    Failed {
        image_id: i64,
        message: String,
        retryable: bool,
    },
    /// No token; nothing was requested
    Unauthenticated,
}

impl LoadState {
    pub fn can_retry(&self) -> bool {
        matches!(self, LoadState::Failed { retryable: true, .. })
    }
}

/// Per-image metadata gathered alongside the pixels
#[derive(Clone, Debug, PartialEq)]
pub struct ImageMetadata {
    pub image_id: i64,
    pub size: ImageSize,
    pub gsd: GroundSampleDistance,
    pub utm: UtmInfo,
}

#[derive(Debug)]
struct Slot {
    image_id: i64,
    pixels: RgbaImage,
}

#[derive(Debug, Default)]
pub struct ImageCache {
    slot: Option<Slot>,
    state: LoadState,
    acquired: u64,
    released: u64,
}

impl ImageCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &LoadState {
        &self.state
    }

    pub fn current_id(&self) -> Option<i64> {
        self.slot.as_ref().map(|s| s.image_id)
    }

    pub fn pixels(&self) -> Option<&RgbaImage> {
        self.slot.as_ref().map(|s| &s.pixels)
    }

    /// Number of (acquired, released) images over the cache's life
    pub fn counts(&self) -> (u64, u64) {
        (self.acquired, self.released)
    }

    /// Drop the held image, if any
    pub fn release(&mut self) {
        if let Some(slot) = self.slot.take() {
            log::debug!(
                "Releasing image {} ({}x{})",
                slot.image_id,
                slot.pixels.width(),
                slot.pixels.height()
            );
            self.released += 1;
        }
    }

    /// Decode `bytes` into the slot, releasing the previous image first
    pub fn acquire(&mut self, image_id: i64, bytes: &[u8]) -> Result<&RgbaImage, ApiError> {
        self.release();
        let pixels = decode(bytes)?;
        log::debug!(
            "Acquired image {} ({}x{})",
            image_id,
            pixels.width(),
            pixels.height()
        );
        self.acquired += 1;
        let slot = self.slot.insert(Slot { image_id, pixels });
        Ok(&slot.pixels)
    }

    /// Fetch, decode and cache an image with its GSD and UTM info.
    ///
    /// GSD falls back to `fallback_gsd_m` (estimated) and UTM to "no GPS" when
    /// their endpoints fail; only the pixels are required.
    pub async fn load<S: ImageSource + ?Sized>(
        &mut self,
        source: &S,
        image_id: i64,
        fallback_gsd_m: f64,
    ) -> Result<ImageMetadata, ApiError> {
        self.release();
        self.state = LoadState::Loading { image_id };

        let bytes = match source.image_bytes(image_id).await {
            Ok(bytes) => bytes,
            Err(err) => return Err(self.fail(image_id, err)),
        };
        let size = match self.acquire(image_id, &bytes) {
            Ok(pixels) => ImageSize::new(pixels.width(), pixels.height()),
            Err(err) => return Err(self.fail(image_id, err)),
        };

        let gsd = match source.gsd(image_id).await {
            Ok(response) => response.resolve(fallback_gsd_m),
            Err(err) => {
                log::warn!("GSD unavailable for image {}: {}", image_id, err);
                GroundSampleDistance::estimated(fallback_gsd_m)
            }
        };
        let utm = match source.utm_info(image_id).await {
            Ok(utm) => utm,
            Err(err) => {
                log::debug!("No UTM info for image {}: {}", image_id, err);
                UtmInfo::without_gps()
            }
        };

        self.state = LoadState::Loaded { image_id };
        Ok(ImageMetadata {
            image_id,
            size,
            gsd,
            utm,
        })
    }

    fn fail(&mut self, image_id: i64, err: ApiError) -> ApiError {
        self.state = match &err {
            ApiError::Unauthenticated => LoadState::Unauthenticated,
            other => {
                log::warn!("Failed to load image {}: {}", image_id, other);
                LoadState::Failed {
                    image_id,
                    message: other.to_string(),
                    retryable: other.is_transient(),
                }
            }
        };
        err
    }
}

impl Drop for ImageCache {
    fn drop(&mut self) {
        self.release();
    }
}

/// Decode encoded image bytes to RGBA8
pub fn decode(bytes: &[u8]) -> Result<RgbaImage, ApiError> {
    let decoded = image::load_from_memory(bytes).map_err(|e| ApiError::Decode(e.to_string()))?;
    Ok(decoded.to_rgba8())
}

/// `skip` of the page after `response`, if there is one
pub fn next_page_skip(response: &ImageListResponse, skip: u32) -> Option<u32> {
    let next = skip as u64 + response.images.len() as u64;
    (!response.images.is_empty() && next < response.total).then_some(next as u32)
}
