use clap::Parser;
use env_logger::Env;
use log::{info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;

use geotile::augment::augmentation_from_names;
use geotile::cli::{Args, Command, LabelFormat, SampleArgs, TilingArgs};
use geotile::label::{ColorLabelFormatter, ColorTable, Mask, RawClassFormatter};
use geotile::{io, CropMode, Result, WindowedDataset};

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logger
    let log_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    // Set thread pool size if specified
    if let Some(n_threads) = args.threads {
        if let Err(e) = rayon::ThreadPoolBuilder::new()
            .num_threads(n_threads)
            .build_global()
        {
            warn!("Could not configure thread pool: {}", e);
        } else {
            info!("Using {} threads", n_threads);
        }
    }

    match args.command {
        Command::Grid(tiling) => print_grid(&tiling),
        Command::Sample(sample) => draw_samples(&sample),
        Command::CountLabels { input, block_size } => {
            for (value, count) in io::count_label_pixels(&input, block_size)? {
                println!("{:?}\t{}", value, count);
            }
            Ok(())
        }
    }
}

fn print_grid(tiling: &TilingArgs) -> Result<()> {
    let dataset = WindowedDataset::new(tiling.to_config())?;
    let metadata = dataset.metadata();
    let grid = dataset.grid();

    info!(
        "Raster {}x{} ({} bands), region {}",
        metadata.width,
        metadata.height,
        metadata.band_count,
        dataset.region()
    );
    info!(
        "{}x{} tiles, {} crops per tile, {} samples",
        grid.num_tiles_x,
        grid.num_tiles_y,
        dataset.crops_per_tile(),
        dataset.len()
    );

    for &tile_idx in dataset.selected_tiles() {
        println!("tile {}\t{}", tile_idx, dataset.tile_windows()[tile_idx]);
    }
    if dataset.mode() == CropMode::FixedGrid {
        for (idx, window) in dataset.fixed_windows().iter().enumerate() {
            println!("crop {}\t{}", idx, window);
        }
    }
    Ok(())
}

fn draw_samples(args: &SampleArgs) -> Result<()> {
    let mut dataset = WindowedDataset::new(args.tiling.to_config())?;

    if let Some(label) = &args.label {
        dataset = match args.label_format {
            LabelFormat::Raw => dataset.with_labels(label, RawClassFormatter::default()),
            LabelFormat::Isprs => dataset.with_labels(
                label,
                ColorLabelFormatter {
                    table: ColorTable::isprs(),
                },
            ),
        };
    }
    if !args.augment.is_empty() {
        let names: Vec<&str> = args.augment.iter().map(String::as_str).collect();
        dataset = dataset.with_augmentation(augmentation_from_names(&names, 0.5)?);
    }

    if dataset.is_empty() {
        warn!("Dataset is empty, nothing to sample");
        return Ok(());
    }

    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    for i in 0..args.count {
        let idx = i % dataset.len();
        let sample = dataset.get_sample_with_rng(idx, &mut rng)?;

        let band_means: Vec<String> = sample
            .image
            .outer_iter()
            .map(|band| format!("{:.4}", band.mean().unwrap_or(0.0)))
            .collect();
        println!(
            "sample {}\ttile {}\t{}\tmeans [{}]",
            idx,
            sample.tile_index,
            sample.window,
            band_means.join(", ")
        );

        if let Some(Mask::Classes(classes)) = &sample.mask {
            let mut histogram = [0usize; 256];
            for &c in classes.iter() {
                histogram[c as usize] += 1;
            }
            let present: Vec<String> = histogram
                .iter()
                .enumerate()
                .filter(|(_, n)| **n > 0)
                .map(|(class, n)| format!("{}:{}", class, n))
                .collect();
            println!("\tclasses {}", present.join(" "));
        }
    }

    Ok(())
}
