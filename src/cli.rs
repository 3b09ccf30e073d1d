use crate::crop::CropMode;
use crate::dataset::DatasetConfig;
use crate::window::Window;
use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "geotile")]
#[command(about = "Tile, crop and inspect large rasters for semantic segmentation")]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Number of threads (default: all available)
    #[arg(short, long, value_name = "N", global = true)]
    pub threads: Option<usize>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the tile windows (and crop windows in fixed-grid mode)
    Grid(TilingArgs),

    /// Draw samples and report their windows and band statistics
    Sample(SampleArgs),

    /// Count pixels per label value
    CountLabels {
        /// Label raster path
        #[arg(short, long, value_name = "FILE")]
        input: String,

        /// Scan block size in pixels
        #[arg(long, value_name = "PX", default_value_t = 2000)]
        block_size: usize,
    },
}

#[derive(clap::Args, Debug)]
pub struct TilingArgs {
    /// Input raster path
    #[arg(short, long, value_name = "FILE")]
    pub input: String,

    /// Tile width in pixels
    #[arg(long, value_name = "PX")]
    pub tile_width: usize,

    /// Tile height in pixels (default: tile width)
    #[arg(long, value_name = "PX")]
    pub tile_height: Option<usize>,

    /// Column step between tiles (default: tile width)
    #[arg(long, value_name = "PX")]
    pub col_step: Option<usize>,

    /// Row step between tiles (default: tile height)
    #[arg(long, value_name = "PX")]
    pub row_step: Option<usize>,

    /// Square crop size in pixels
    #[arg(short, long, value_name = "PX")]
    pub crop_size: usize,

    /// Enumerate a fixed crop grid instead of random crops
    #[arg(long)]
    pub fixed_grid: bool,

    /// Restrict tiling to a region of the image
    #[arg(long, num_args = 4, value_names = ["COL", "ROW", "WIDTH", "HEIGHT"])]
    pub region: Option<Vec<usize>>,

    /// Restrict the dataset to these tile indices
    #[arg(long, value_delimiter = ',', value_name = "IDX,...")]
    pub tiles: Option<Vec<usize>>,
}

impl TilingArgs {
    pub fn to_config(&self) -> DatasetConfig {
        let tile_height = self.tile_height.unwrap_or(self.tile_width);
        let col_step = self.col_step.unwrap_or(self.tile_width);
        let row_step = self.row_step.unwrap_or(tile_height);
        let mode = if self.fixed_grid {
            CropMode::FixedGrid
        } else {
            CropMode::Random
        };

        let mut config = DatasetConfig::new(&self.input, (self.tile_width, tile_height), self.crop_size)
            .with_step(col_step, row_step)
            .with_mode(mode);

        if let Some(region) = &self.region {
            // clap guarantees exactly four values
            if let [col, row, width, height] = region[..] {
                config = config.with_region(Window::new(col, row, width, height));
            }
        }
        if let Some(tiles) = &self.tiles {
            config = config.with_tile_indices(tiles.clone());
        }
        config
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelFormat {
    /// Band 0 holds class indices
    Raw,
    /// ISPRS RGB colour legend
    Isprs,
}

#[derive(clap::Args, Debug)]
pub struct SampleArgs {
    #[command(flatten)]
    pub tiling: TilingArgs,

    /// Co-registered label raster
    #[arg(short, long, value_name = "FILE")]
    pub label: Option<String>,

    /// Label encoding
    #[arg(long, value_enum, default_value_t = LabelFormat::Raw)]
    pub label_format: LabelFormat,

    /// Number of samples to draw
    #[arg(short = 'n', long, default_value_t = 4)]
    pub count: usize,

    /// Seed for crop positions and augmentations
    #[arg(long)]
    pub seed: Option<u64>,

    /// Augmentations to apply (d4, hflip, vflip, d1flip, d2flip, rot90, rot180, rot270, no)
    #[arg(long, value_delimiter = ',')]
    pub augment: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_grid() {
        let args = Args::parse_from([
            "geotile", "grid", "-i", "image.tif", "--tile-width", "512", "-c", "256", "--fixed-grid",
            "--region", "0", "0", "1024", "1024",
        ]);
        let Command::Grid(tiling) = args.command else {
            panic!("expected grid subcommand");
        };
        let config = tiling.to_config();
        assert_eq!(config.tile_size, (512, 512));
        assert_eq!(config.tile_step, Some((512, 512)));
        assert_eq!(config.mode, CropMode::FixedGrid);
        assert_eq!(config.region, Some(Window::new(0, 0, 1024, 1024)));
    }

    #[test]
    fn test_parse_sample() {
        let args = Args::parse_from([
            "geotile", "-v", "sample", "-i", "image.tif", "--tile-width", "512", "--col-step", "256",
            "-c", "128", "--tiles", "1,3,5", "--augment", "d4,hflip", "--label-format", "isprs",
        ]);
        assert!(args.verbose);
        let Command::Sample(sample) = args.command else {
            panic!("expected sample subcommand");
        };
        let config = sample.tiling.to_config();
        assert_eq!(config.tile_step, Some((256, 512)));
        assert_eq!(config.tile_indices, Some(vec![1, 3, 5]));
        assert_eq!(sample.augment, vec!["d4".to_string(), "hflip".to_string()]);
        assert_eq!(sample.label_format, LabelFormat::Isprs);
    }
}
