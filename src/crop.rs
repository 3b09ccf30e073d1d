use crate::error::{GeoTileError, Result};
use crate::tiles::TileGrid;
use crate::window::Window;
use log::debug;
use rand::Rng;

/// How crops are placed inside a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CropMode {
    /// One uniformly random crop per tile and per access.
    Random,
    /// Deterministic full-coverage grid of crops per tile.
    FixedGrid,
}

/// Turns tile windows into square crop windows of side `crop_size`.
#[derive(Debug, Clone, Copy)]
pub struct CropSampler {
    crop_size: usize,
}

impl CropSampler {
    pub fn new(crop_size: usize) -> Result<Self> {
        if crop_size == 0 {
            return Err(GeoTileError::NonPositiveParameter {
                name: "crop size",
                value: crop_size,
            });
        }
        Ok(Self { crop_size })
    }

    pub fn crop_size(&self) -> usize {
        self.crop_size
    }

    /// Fails when the crop does not fit in a `tile_width` x `tile_height` tile.
    pub fn check_fits(&self, tile_width: usize, tile_height: usize) -> Result<()> {
        if self.crop_size > tile_width || self.crop_size > tile_height {
            return Err(GeoTileError::CropLargerThanTile {
                crop: self.crop_size,
                tile_width,
                tile_height,
            });
        }
        Ok(())
    }

    /// Draw a crop uniformly inside `tile`. Every call is independent.
    pub fn sample_one<R: Rng + ?Sized>(&self, tile: &Window, rng: &mut R) -> Result<Window> {
        self.check_fits(tile.width, tile.height)?;

        let col_off = rng.gen_range(tile.col_off..=tile.col_end() - self.crop_size);
        let row_off = rng.gen_range(tile.row_off..=tile.row_end() - self.crop_size);

        Ok(Window::new(col_off, row_off, self.crop_size, self.crop_size))
    }

    /// Crop windows in tile-local coordinates for a `tile_width` x
    /// `tile_height` tile, with the same pullback rule as the tile grid.
    pub fn local_grid(&self, tile_width: usize, tile_height: usize) -> Result<Vec<Window>> {
        self.check_fits(tile_width, tile_height)?;

        let grid = TileGrid::new(
            tile_width,
            tile_height,
            self.crop_size,
            self.crop_size,
            self.crop_size,
            self.crop_size,
        )?;
        debug!(
            "Crop grid: {}x{} tile, crop={} → {} crops",
            tile_width, tile_height, self.crop_size, grid.total_tiles
        );

        Ok(grid.windows())
    }

    /// Crop windows covering `tile`, in absolute image coordinates.
    pub fn fixed_grid(&self, tile: &Window) -> Result<Vec<Window>> {
        Ok(self
            .local_grid(tile.width, tile.height)?
            .into_iter()
            .map(|w| w.translate(tile.col_off, tile.row_off))
            .collect())
    }
}
