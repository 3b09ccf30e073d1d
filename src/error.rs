use crate::window::Window;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GeoTileError {
    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Array shape error: {0}")]
    ShapeError(#[from] ndarray::ShapeError),

    #[error("Raster has invalid dimensions: {0}x{1}")]
    InvalidDimensions(usize, usize),

    #[error("Invalid {name}: {value} (must be positive)")]
    NonPositiveParameter { name: &'static str, value: usize },

    #[error("Crop size {crop} exceeds tile size {tile_width}x{tile_height}")]
    CropLargerThanTile {
        crop: usize,
        tile_width: usize,
        tile_height: usize,
    },

    #[error("Tile index {index} out of range for a grid of {count} tiles")]
    UnknownTileIndex { index: usize, count: usize },

    #[error("Region {0} lies outside the {1}x{2} raster")]
    RegionOutOfBounds(Window, usize, usize),

    #[error("Invalid band index {band} (raster has {count} bands)")]
    InvalidBand { band: usize, count: usize },

    #[error("Unknown augmentation: {0}")]
    UnknownAugmentation(String),

    #[error("Invalid compression type: {0}")]
    InvalidCompression(String),

    #[error("Invalid block size: {0} (must be multiple of 16)")]
    InvalidBlockSize(usize),

    #[error("Invalid probability {0} (must lie in [0, 1])")]
    InvalidProbability(f64),

    #[error("Inference requires a fixed-grid dataset")]
    RandomModeInference,

    #[error("Index {index} out of range for dataset of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Window {window} exceeds raster bounds {width}x{height}")]
    WindowOutOfBounds {
        window: Window,
        width: usize,
        height: usize,
    },

    #[error("Shape mismatch: expected {expected:?}, found {found:?}")]
    Alignment {
        expected: Vec<usize>,
        found: Vec<usize>,
    },
}

/// Coarse classification of failures, used by loaders to decide between
/// skipping, retrying and aborting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Io,
    Index,
    Alignment,
}

impl GeoTileError {
    pub fn kind(&self) -> ErrorKind {
        use GeoTileError::*;

        match self {
            Gdal(_) | Io(_) | WindowOutOfBounds { .. } => ErrorKind::Io,
            IndexOutOfRange { .. } => ErrorKind::Index,
            Alignment { .. } | ShapeError(_) => ErrorKind::Alignment,
            InvalidDimensions(..)
            | NonPositiveParameter { .. }
            | CropLargerThanTile { .. }
            | UnknownTileIndex { .. }
            | RegionOutOfBounds(..)
            | InvalidBand { .. }
            | UnknownAugmentation(_)
            | InvalidCompression(_)
            | InvalidBlockSize(_)
            | InvalidProbability(_)
            | RandomModeInference => ErrorKind::Configuration,
        }
    }
}

pub type Result<T> = std::result::Result<T, GeoTileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        let err = GeoTileError::IndexOutOfRange { index: 4, len: 4 };
        assert_eq!(err.kind(), ErrorKind::Index);

        let err = GeoTileError::CropLargerThanTile {
            crop: 300,
            tile_width: 256,
            tile_height: 256,
        };
        assert_eq!(err.kind(), ErrorKind::Configuration);

        let err = GeoTileError::Alignment {
            expected: vec![8, 8],
            found: vec![8, 7],
        };
        assert_eq!(err.kind(), ErrorKind::Alignment);

        let err = GeoTileError::from(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert_eq!(err.kind(), ErrorKind::Io);
    }
}
