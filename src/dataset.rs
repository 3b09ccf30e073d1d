//! Crop datasets over one large raster.
//!
//! A [`WindowedDataset`] splits an image (or a region of it) into a grid of
//! tiles and serves square crops drawn from those tiles. In
//! [`CropMode::Random`] there is one sample per selected tile and every access
//! draws a fresh crop position, so reading the same index twice returns
//! different pixels. In [`CropMode::FixedGrid`] each tile is covered by a
//! deterministic grid of crops and the dataset enumerates all of them.
//!
//! Nothing but geometry is kept on the dataset: every access opens the
//! rasters, reads one window and releases the handles, which makes a single
//! instance safe to share between threads.

use crate::augment::Augmentation;
use crate::crop::{CropMode, CropSampler};
use crate::error::{GeoTileError, Result};
use crate::io::{self, RasterMetadata};
use crate::label::{LabelFormatter, Mask};
use crate::tiles::TileGrid;
use crate::window::Window;
use gdal::Dataset;
use log::{debug, info};
use ndarray::Array3;
use rand::RngCore;
use std::path::{Path, PathBuf};

/// Construction parameters of a [`WindowedDataset`].
#[derive(Debug, Clone)]
pub struct DatasetConfig {
    pub image_path: PathBuf,
    /// Tile `(width, height)`.
    pub tile_size: (usize, usize),
    /// Tile `(col_step, row_step)`; defaults to the tile size.
    pub tile_step: Option<(usize, usize)>,
    pub crop_size: usize,
    pub mode: CropMode,
    /// Restrict the dataset to these tile indices, in this order.
    pub tile_indices: Option<Vec<usize>>,
    /// Only tile this part of the image.
    pub region: Option<Window>,
    /// 0-based bands to read; all bands when `None`.
    pub bands: Option<Vec<usize>>,
    /// Raw pixel values are divided by this.
    pub pixel_scale: f32,
}

impl DatasetConfig {
    pub fn new<P: Into<PathBuf>>(image_path: P, tile_size: (usize, usize), crop_size: usize) -> Self {
        Self {
            image_path: image_path.into(),
            tile_size,
            tile_step: None,
            crop_size,
            mode: CropMode::Random,
            tile_indices: None,
            region: None,
            bands: None,
            pixel_scale: 255.0,
        }
    }

    pub fn with_step(mut self, col_step: usize, row_step: usize) -> Self {
        self.tile_step = Some((col_step, row_step));
        self
    }

    pub fn with_mode(mut self, mode: CropMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_tile_indices(mut self, indices: Vec<usize>) -> Self {
        self.tile_indices = Some(indices);
        self
    }

    pub fn with_region(mut self, region: Window) -> Self {
        self.region = Some(region);
        self
    }

    pub fn with_bands(mut self, bands: Vec<usize>) -> Self {
        self.bands = Some(bands);
        self
    }

    pub fn with_pixel_scale(mut self, scale: f32) -> Self {
        self.pixel_scale = scale;
        self
    }
}

/// One dataset item.
#[derive(Debug, Clone)]
pub struct Sample {
    /// Band-first `(bands, height, width)` pixels after normalisation and
    /// augmentation.
    pub image: Array3<f32>,
    /// Absolute crop window in the source raster.
    pub window: Window,
    /// Index of the parent tile in the full grid.
    pub tile_index: usize,
    pub mask: Option<Mask>,
    /// Pre-augmentation image, only kept when an augmentation is configured.
    pub orig_image: Option<Array3<f32>>,
    /// Pre-augmentation mask, only kept when an augmentation is configured.
    pub orig_mask: Option<Mask>,
}

struct LabelSource {
    path: PathBuf,
    formatter: Box<dyn LabelFormatter>,
}

pub struct WindowedDataset {
    image_path: PathBuf,
    metadata: RasterMetadata,
    grid: TileGrid,
    tile_windows: Vec<Window>,
    selected: Vec<usize>,
    sampler: CropSampler,
    mode: CropMode,
    /// Tile-local crop windows, shared by every tile (fixed-grid mode only).
    crop_windows: Vec<Window>,
    bands: Option<Vec<usize>>,
    pixel_scale: f32,
    label: Option<LabelSource>,
    augmentation: Option<Box<dyn Augmentation>>,
}

impl WindowedDataset {
    /// Probe the image size and build the tile and crop tables. Only the
    /// raster header is read.
    pub fn new(config: DatasetConfig) -> Result<Self> {
        let metadata = io::probe_raster(&config.image_path)?;
        let bounds = metadata.bounds();
        let region = config.region.unwrap_or(bounds);
        if region.is_empty() || !bounds.contains(&region) {
            return Err(GeoTileError::RegionOutOfBounds(
                region,
                metadata.width,
                metadata.height,
            ));
        }
        if let Some(bands) = &config.bands {
            if let Some(&band) = bands.iter().find(|&&b| b >= metadata.band_count) {
                return Err(GeoTileError::InvalidBand {
                    band,
                    count: metadata.band_count,
                });
            }
        }

        let (tile_width, tile_height) = config.tile_size;
        let (col_step, row_step) = config.tile_step.unwrap_or(config.tile_size);
        let grid = TileGrid::over_region(region, tile_width, tile_height, col_step, row_step)?;

        let sampler = CropSampler::new(config.crop_size)?;
        let (effective_width, effective_height) = grid.effective_tile_size();
        sampler.check_fits(effective_width, effective_height)?;

        let selected = match config.tile_indices {
            Some(indices) => {
                if let Some(&index) = indices.iter().find(|&&i| i >= grid.total_tiles) {
                    return Err(GeoTileError::UnknownTileIndex {
                        index,
                        count: grid.total_tiles,
                    });
                }
                indices
            }
            None => (0..grid.total_tiles).collect(),
        };

        let crop_windows = match config.mode {
            CropMode::FixedGrid => sampler.local_grid(effective_width, effective_height)?,
            CropMode::Random => Vec::new(),
        };

        info!(
            "Dataset on {}: {} tiles ({} selected), crop={}, mode={:?}",
            config.image_path.display(),
            grid.total_tiles,
            selected.len(),
            config.crop_size,
            config.mode
        );

        Ok(Self {
            image_path: config.image_path,
            metadata,
            tile_windows: grid.windows(),
            grid,
            selected,
            sampler,
            mode: config.mode,
            crop_windows,
            bands: config.bands,
            pixel_scale: config.pixel_scale,
            label: None,
            augmentation: None,
        })
    }

    /// Pair every crop with the same window of a co-registered label raster.
    /// The label file is only opened on access.
    pub fn with_labels<P, F>(mut self, label_path: P, formatter: F) -> Self
    where
        P: Into<PathBuf>,
        F: LabelFormatter + 'static,
    {
        self.label = Some(LabelSource {
            path: label_path.into(),
            formatter: Box::new(formatter),
        });
        self
    }

    pub fn with_augmentation(mut self, augmentation: Box<dyn Augmentation>) -> Self {
        self.augmentation = Some(augmentation);
        self
    }

    /// Number of samples: selected tiles in random mode, selected tiles
    /// times crops per tile in fixed-grid mode.
    pub fn len(&self) -> usize {
        match self.mode {
            CropMode::Random => self.selected.len(),
            CropMode::FixedGrid => self.selected.len() * self.crop_windows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn mode(&self) -> CropMode {
        self.mode
    }

    pub fn image_path(&self) -> &Path {
        &self.image_path
    }

    pub fn has_labels(&self) -> bool {
        self.label.is_some()
    }

    pub fn metadata(&self) -> &RasterMetadata {
        &self.metadata
    }

    pub fn region(&self) -> Window {
        self.grid.region()
    }

    pub fn grid(&self) -> &TileGrid {
        &self.grid
    }

    pub fn tile_windows(&self) -> &[Window] {
        &self.tile_windows
    }

    pub fn selected_tiles(&self) -> &[usize] {
        &self.selected
    }

    pub fn crops_per_tile(&self) -> usize {
        match self.mode {
            CropMode::Random => 1,
            CropMode::FixedGrid => self.crop_windows.len(),
        }
    }

    /// Resolve `idx` to its parent tile index and absolute crop window.
    /// Random mode draws the crop position from `rng`.
    pub fn crop_window<R: RngCore + ?Sized>(&self, idx: usize, rng: &mut R) -> Result<(usize, Window)> {
        let len = self.len();
        if idx >= len {
            return Err(GeoTileError::IndexOutOfRange { index: idx, len });
        }

        match self.mode {
            CropMode::Random => {
                let tile_idx = self.selected[idx];
                let tile = &self.tile_windows[tile_idx];
                Ok((tile_idx, self.sampler.sample_one(tile, rng)?))
            }
            CropMode::FixedGrid => {
                let per_tile = self.crop_windows.len();
                let tile_idx = self.selected[idx / per_tile];
                let tile = &self.tile_windows[tile_idx];
                let crop = self.crop_windows[idx % per_tile].translate(tile.col_off, tile.row_off);
                Ok((tile_idx, crop))
            }
        }
    }

    /// Every crop window in index order (fixed-grid mode); in random mode the
    /// selected tile windows themselves.
    pub fn fixed_windows(&self) -> Vec<Window> {
        match self.mode {
            CropMode::Random => self.selected.iter().map(|&i| self.tile_windows[i]).collect(),
            CropMode::FixedGrid => self
                .selected
                .iter()
                .flat_map(|&i| {
                    let tile = self.tile_windows[i];
                    self.crop_windows
                        .iter()
                        .map(move |c| c.translate(tile.col_off, tile.row_off))
                })
                .collect(),
        }
    }

    /// Read sample `idx`, drawing randomness from the calling thread's
    /// generator.
    pub fn get_sample(&self, idx: usize) -> Result<Sample> {
        let mut rng = rand::thread_rng();
        self.get_sample_with_rng(idx, &mut rng)
    }

    /// Read sample `idx` with an explicit random source for crop placement
    /// and augmentation.
    pub fn get_sample_with_rng<R: RngCore>(&self, idx: usize, rng: &mut R) -> Result<Sample> {
        let (tile_index, window) = self.crop_window(idx, rng)?;
        debug!("Sample {} → tile {} {}", idx, tile_index, window);

        let mut image = io::read_window(&self.image_path, &window, self.bands.as_deref())?;
        image.mapv_inplace(|v| v / self.pixel_scale);

        let mask = match &self.label {
            Some(label) => Some(self.read_mask(label, &window, &image)?),
            None => None,
        };

        let sample = match &self.augmentation {
            Some(augmentation) => {
                let (aug_image, aug_mask) = augmentation.apply(image.clone(), mask.clone(), rng);
                Sample {
                    image: aug_image,
                    window,
                    tile_index,
                    mask: aug_mask,
                    orig_image: Some(image),
                    orig_mask: mask,
                }
            }
            None => Sample {
                image,
                window,
                tile_index,
                mask,
                orig_image: None,
                orig_mask: None,
            },
        };

        Ok(sample)
    }

    fn read_mask(&self, label: &LabelSource, window: &Window, image: &Array3<f32>) -> Result<Mask> {
        let (_, height, width) = image.dim();

        let raw = {
            let dataset = Dataset::open(&label.path)?;
            let (label_width, label_height) = dataset.raster_size();
            if (label_width, label_height) != (self.metadata.width, self.metadata.height) {
                return Err(GeoTileError::Alignment {
                    expected: vec![self.metadata.height, self.metadata.width],
                    found: vec![label_height, label_width],
                });
            }
            io::read_window_from_dataset(&dataset, window, None)?
        };

        let mask = label.formatter.format(raw)?;
        let (mask_height, mask_width) = mask.spatial_dim();
        if (mask_height, mask_width) != (height, width) {
            return Err(GeoTileError::Alignment {
                expected: vec![height, width],
                found: vec![mask_height, mask_width],
            });
        }
        Ok(mask)
    }
}
