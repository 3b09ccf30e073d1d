use crate::error::{GeoTileError, Result};
use crate::window::Window;
use log::debug;

/// Offsets of windows of length `size` stepping by `step` along an axis of
/// length `length` starting at `origin`. The last offset is pulled back so
/// that its window ends exactly at `origin + length`.
pub fn axis_offsets(origin: usize, length: usize, size: usize, step: usize) -> Vec<usize> {
    if length <= size {
        return vec![origin];
    }

    // Ceiling division: number of steps needed before the pulled-back window
    let steps = (length - size + step - 1) / step;
    let mut offsets: Vec<usize> = (0..steps).map(|i| origin + i * step).collect();
    offsets.push(origin + length - size);
    offsets
}

fn check_positive(name: &'static str, value: usize) -> Result<()> {
    if value == 0 {
        return Err(GeoTileError::NonPositiveParameter { name, value });
    }
    Ok(())
}

/// Ordered grid of tile windows over a raster region.
///
/// Tiles are enumerated row-major: the row offset is the outer loop and the
/// column offset the inner one, so `index = row_idx * num_tiles_x + col_idx`.
/// Every window is intersected with the region, and the last tile along each
/// axis is flush with the region edge.
#[derive(Debug, Clone)]
pub struct TileGrid {
    region: Window,
    tile_width: usize,
    tile_height: usize,
    col_offsets: Vec<usize>,
    row_offsets: Vec<usize>,
    pub num_tiles_x: usize,
    pub num_tiles_y: usize,
    pub total_tiles: usize,
}

impl TileGrid {
    /// Grid over a whole `image_width` x `image_height` raster.
    pub fn new(
        image_width: usize,
        image_height: usize,
        tile_width: usize,
        tile_height: usize,
        col_step: usize,
        row_step: usize,
    ) -> Result<Self> {
        Self::over_region(
            Window::full(image_width, image_height),
            tile_width,
            tile_height,
            col_step,
            row_step,
        )
    }

    /// Grid over an arbitrary region; windows are in the region's coordinates
    /// frame (i.e. absolute image coordinates when the region is a sub-window).
    pub fn over_region(
        region: Window,
        tile_width: usize,
        tile_height: usize,
        col_step: usize,
        row_step: usize,
    ) -> Result<Self> {
        if region.is_empty() {
            return Err(GeoTileError::InvalidDimensions(region.width, region.height));
        }
        check_positive("tile width", tile_width)?;
        check_positive("tile height", tile_height)?;
        check_positive("column step", col_step)?;
        check_positive("row step", row_step)?;

        let col_offsets = axis_offsets(region.col_off, region.width, tile_width, col_step);
        let row_offsets = axis_offsets(region.row_off, region.height, tile_height, row_step);
        let num_tiles_x = col_offsets.len();
        let num_tiles_y = row_offsets.len();
        let total_tiles = num_tiles_x * num_tiles_y;

        debug!(
            "TileGrid: {} tile={}x{} step={}x{} → {}x{} tiles ({} total)",
            region, tile_width, tile_height, col_step, row_step, num_tiles_x, num_tiles_y, total_tiles
        );

        Ok(Self {
            region,
            tile_width,
            tile_height,
            col_offsets,
            row_offsets,
            num_tiles_x,
            num_tiles_y,
            total_tiles,
        })
    }

    pub fn region(&self) -> Window {
        self.region
    }

    /// Width and height shared by every tile of the grid, after clamping to
    /// the region.
    pub fn effective_tile_size(&self) -> (usize, usize) {
        (
            self.tile_width.min(self.region.width),
            self.tile_height.min(self.region.height),
        )
    }

    pub fn col_offsets(&self) -> &[usize] {
        &self.col_offsets
    }

    pub fn row_offsets(&self) -> &[usize] {
        &self.row_offsets
    }

    pub fn len(&self) -> usize {
        self.total_tiles
    }

    pub fn is_empty(&self) -> bool {
        self.total_tiles == 0
    }

    pub fn iter(&self) -> TileIterator<'_> {
        TileIterator::new(self)
    }

    pub fn get_tile(&self, tile_idx: usize) -> Result<Window> {
        if tile_idx >= self.total_tiles {
            return Err(GeoTileError::UnknownTileIndex {
                index: tile_idx,
                count: self.total_tiles,
            });
        }

        // Convert linear index to 2D coordinates
        let tile_y = tile_idx / self.num_tiles_x;
        let tile_x = tile_idx % self.num_tiles_x;

        let window = Window::new(
            self.col_offsets[tile_x],
            self.row_offsets[tile_y],
            self.tile_width,
            self.tile_height,
        );

        // Offsets always start inside the region, so the intersection exists
        let clamped = window.intersection(&self.region).unwrap_or(self.region);
        Ok(clamped)
    }

    /// All windows in enumeration order.
    pub fn windows(&self) -> Vec<Window> {
        self.iter().map(|(_, window)| window).collect()
    }
}

pub struct TileIterator<'a> {
    grid: &'a TileGrid,
    current_idx: usize,
}

impl<'a> TileIterator<'a> {
    fn new(grid: &'a TileGrid) -> Self {
        Self {
            grid,
            current_idx: 0,
        }
    }
}

impl<'a> Iterator for TileIterator<'a> {
    type Item = (usize, Window);

    fn next(&mut self) -> Option<Self::Item> {
        let window = self.grid.get_tile(self.current_idx).ok()?;
        let idx = self.current_idx;
        self.current_idx += 1;
        Some((idx, window))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.grid.total_tiles.saturating_sub(self.current_idx);
        (remaining, Some(remaining))
    }
}

impl<'a> ExactSizeIterator for TileIterator<'a> {}

/// Tile windows covering the region `[col_offset, col_offset + image_width)`
/// x `[row_offset, row_offset + image_height)`.
#[allow(clippy::too_many_arguments)]
pub fn get_tiles(
    image_width: usize,
    image_height: usize,
    tile_width: usize,
    tile_height: usize,
    col_step: usize,
    row_step: usize,
    col_offset: usize,
    row_offset: usize,
) -> Result<Vec<Window>> {
    let region = Window::new(col_offset, row_offset, image_width, image_height);
    let grid = TileGrid::over_region(region, tile_width, tile_height, col_step, row_step)?;
    Ok(grid.windows())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_grid_even_split() {
        let tiles = get_tiles(1000, 1000, 500, 500, 500, 500, 0, 0).unwrap();
        assert_eq!(
            tiles,
            vec![
                Window::new(0, 0, 500, 500),
                Window::new(500, 0, 500, 500),
                Window::new(0, 500, 500, 500),
                Window::new(500, 500, 500, 500),
            ]
        );
    }

    #[test]
    fn test_tile_grid_pullback() {
        let grid = TileGrid::new(517, 517, 256, 256, 256, 256).unwrap();
        assert_eq!(grid.col_offsets(), &[0, 256, 261]);
        assert_eq!(grid.row_offsets(), &[0, 256, 261]);
        assert_eq!(grid.total_tiles, 9);
        assert_eq!(grid.get_tile(8).unwrap(), Window::new(261, 261, 256, 256));
    }

    #[test]
    fn test_small_image_single_clamped_tile() {
        let tiles = get_tiles(100, 300, 256, 256, 256, 256, 0, 0).unwrap();
        assert_eq!(tiles.len(), 2);
        assert_eq!(tiles[0], Window::new(0, 0, 100, 256));
        assert_eq!(tiles[1], Window::new(0, 44, 100, 256));
    }

    #[test]
    fn test_overlapping_steps() {
        assert_eq!(axis_offsets(0, 10, 4, 3), vec![0, 3, 6]);
        assert_eq!(axis_offsets(0, 11, 4, 3), vec![0, 3, 6, 7]);
        assert_eq!(axis_offsets(0, 4, 4, 1), vec![0]);
        assert_eq!(axis_offsets(0, 5, 4, 1), vec![0, 1]);
    }

    #[test]
    fn test_region_offset() {
        let tiles = get_tiles(300, 200, 128, 128, 128, 128, 1000, 2000).unwrap();
        assert_eq!(tiles.len(), 6);
        assert_eq!(tiles[0], Window::new(1000, 2000, 128, 128));
        assert_eq!(tiles[5], Window::new(1172, 2072, 128, 128));
        let region = Window::new(1000, 2000, 300, 200);
        assert!(tiles.iter().all(|t| region.contains(t)));
    }

    #[test]
    fn test_coverage_and_bounds() {
        for width in 1..80 {
            for tile in 1..=width.min(24) {
                for step in 1..=tile {
                    let offsets = axis_offsets(0, width, tile, step);
                    let mut covered = vec![false; width];
                    for &off in &offsets {
                        assert!(off + tile <= width);
                        for c in covered.iter_mut().skip(off).take(tile) {
                            *c = true;
                        }
                    }
                    assert!(covered.iter().all(|&c| c), "gap for {width}/{tile}/{step}");
                    assert_eq!(offsets.last().map(|o| o + tile), Some(width));
                    assert!(offsets.windows(2).all(|w| w[0] < w[1]));
                }
            }
        }
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(TileGrid::new(100, 100, 0, 10, 10, 10).is_err());
        assert!(TileGrid::new(100, 100, 10, 10, 0, 10).is_err());
        assert!(TileGrid::new(0, 100, 10, 10, 10, 10).is_err());
    }

    #[test]
    fn test_tile_iterator() {
        let grid = TileGrid::new(4000, 4000, 2000, 2000, 2000, 2000).unwrap();
        let tiles: Vec<_> = grid.iter().collect();

        assert_eq!(tiles.len(), 4);
        assert_eq!(tiles[0].0, 0);
        assert_eq!(tiles[3].0, 3);
        assert!(grid.get_tile(4).is_err());
    }
}
