// Library exports for testing and reuse

pub mod augment;
pub mod cli;
pub mod crop;
pub mod dataset;
pub mod error;
pub mod infer;
pub mod io;
pub mod label;
pub mod partition;
pub mod stitch;
pub mod tiles;
pub mod window;

// Re-export commonly used types
pub use crop::{CropMode, CropSampler};
pub use dataset::{DatasetConfig, Sample, WindowedDataset};
pub use error::{ErrorKind, GeoTileError, Result};
pub use io::{probe_raster, read_window, RasterMetadata};
pub use label::{LabelFormatter, Mask};
pub use stitch::{ProbabilityStitcher, Reduction, Stitched};
pub use tiles::{get_tiles, TileGrid};
pub use window::Window;
