use crate::error::{GeoTileError, Result};
use crate::tiles::TileGrid;
use crate::window::Window;
use gdal::cpl::CslStringList;
use gdal::raster::Buffer;
use gdal::{Dataset, DriverManager, Metadata};
use log::{debug, info, warn};
use ndarray::{Array2, Array3, Axis};
use rayon::prelude::*;
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct RasterMetadata {
    pub width: usize,
    pub height: usize,
    pub band_count: usize,
    pub geotransform: Option<[f64; 6]>,
    pub projection: Option<String>,
}

impl RasterMetadata {
    pub fn bounds(&self) -> Window {
        Window::full(self.width, self.height)
    }

    /// Geotransform whose origin is moved to the top-left corner of `region`.
    pub fn region_geotransform(&self, region: &Window) -> Option<[f64; 6]> {
        self.geotransform.map(|gt| {
            let col = region.col_off as f64;
            let row = region.row_off as f64;
            [
                gt[0] + col * gt[1] + row * gt[2],
                gt[1],
                gt[2],
                gt[3] + col * gt[4] + row * gt[5],
                gt[4],
                gt[5],
            ]
        })
    }
}

/// Extract metadata from a dataset without reading any pixel
pub fn extract_metadata_from_dataset(dataset: &Dataset) -> Result<RasterMetadata> {
    let (width, height) = dataset.raster_size();
    let band_count = dataset.raster_count() as usize;

    if width == 0 || height == 0 || band_count == 0 {
        return Err(GeoTileError::InvalidDimensions(width, height));
    }

    let geotransform = dataset.geo_transform().ok();
    if geotransform.is_none() {
        debug!("Raster is not georeferenced");
    }

    let projection = Some(dataset.projection()).filter(|p| !p.is_empty());

    Ok(RasterMetadata {
        width,
        height,
        band_count,
        geotransform,
        projection,
    })
}

/// Open a raster header and report its size and georeferencing.
pub fn probe_raster<P: AsRef<Path>>(path: P) -> Result<RasterMetadata> {
    let path = path.as_ref();
    debug!("Probing raster: {}", path.display());
    let dataset = Dataset::open(path)?;
    extract_metadata_from_dataset(&dataset)
}

/// Read `window` from the given 0-based `bands` (all bands when `None`)
/// into a band-first `(bands, height, width)` array.
pub fn read_window_from_dataset(
    dataset: &Dataset,
    window: &Window,
    bands: Option<&[usize]>,
) -> Result<Array3<f32>> {
    let (width, height) = dataset.raster_size();
    if !Window::full(width, height).contains(window) || window.is_empty() {
        return Err(GeoTileError::WindowOutOfBounds {
            window: *window,
            width,
            height,
        });
    }

    let band_count = dataset.raster_count() as usize;
    let band_indices: Vec<usize> = match bands {
        Some(bands) => bands.to_vec(),
        None => (0..band_count).collect(),
    };

    debug!(
        "Reading window: offset=({},{}), size=({},{}), bands={:?}",
        window.col_off, window.row_off, window.width, window.height, band_indices
    );

    let mut data_vec: Vec<f32> = Vec::with_capacity(band_indices.len() * window.area());
    for &band in &band_indices {
        if band >= band_count {
            return Err(GeoTileError::InvalidBand {
                band,
                count: band_count,
            });
        }
        let rasterband = dataset.rasterband(band + 1)?;
        let buffer = rasterband.read_as::<f32>(
            (window.col_off as isize, window.row_off as isize),
            (window.width, window.height),
            (window.width, window.height),
            None,
        )?;
        data_vec.extend(buffer);
    }

    let data = Array3::from_shape_vec(
        (band_indices.len(), window.height, window.width),
        data_vec,
    )?;
    Ok(data)
}

/// Open `path`, read one window and release the handle before returning.
pub fn read_window<P: AsRef<Path>>(
    path: P,
    window: &Window,
    bands: Option<&[usize]>,
) -> Result<Array3<f32>> {
    let dataset = Dataset::open(path.as_ref())?;
    read_window_from_dataset(&dataset, window, bands)
}

/// Validate compression type
pub fn validate_compression(compression: &str) -> Result<()> {
    let valid_types = ["DEFLATE", "LZW", "ZSTD", "NONE"];
    if !valid_types.contains(&compression) {
        return Err(GeoTileError::InvalidCompression(compression.to_string()));
    }
    Ok(())
}

/// Validate block size (must be multiple of 16)
pub fn validate_block_size(block_size: usize) -> Result<()> {
    if block_size == 0 || block_size % 16 != 0 {
        return Err(GeoTileError::InvalidBlockSize(block_size));
    }
    Ok(())
}

/// Creation options for a tiled, compressed GeoTIFF
#[derive(Debug, Clone)]
pub struct OutputOptions {
    pub compression: String,
    pub block_size: usize,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            compression: "DEFLATE".to_string(),
            block_size: 256,
        }
    }
}

impl OutputOptions {
    pub fn to_creation_options(&self) -> Result<Vec<String>> {
        validate_compression(&self.compression)?;
        validate_block_size(self.block_size)?;
        Ok(vec![
            format!("COMPRESS={}", self.compression),
            "TILED=YES".to_string(),
            format!("BLOCKXSIZE={}", self.block_size),
            format!("BLOCKYSIZE={}", self.block_size),
            "BIGTIFF=IF_SAFER".to_string(),
        ])
    }
}

fn create_output_dataset<T: gdal::raster::GdalType>(
    path: &Path,
    width: usize,
    height: usize,
    num_bands: usize,
    options: Option<&OutputOptions>,
) -> Result<Dataset> {
    info!("Creating output dataset: {}", path.display());

    let driver = DriverManager::get_driver_by_name("GTiff")?;

    let dataset = match options {
        None => driver.create_with_band_type::<T, _>(path, width, height, num_bands)?,
        Some(options) => {
            let mut gdal_options = CslStringList::new();
            for opt in options.to_creation_options()? {
                gdal_options.add_string(&opt)?;
            }

            driver.create_with_band_type_with_options::<T, _>(
                path,
                width,
                height,
                num_bands,
                &gdal_options,
            )?
        }
    };

    Ok(dataset)
}

fn set_georeferencing(dataset: &mut Dataset, metadata: &RasterMetadata, region: &Window) -> Result<()> {
    match metadata.region_geotransform(region) {
        Some(gt) => dataset.set_geo_transform(&gt)?,
        None => warn!("Source raster has no geotransform, output will not be georeferenced"),
    }
    if let Some(projection) = &metadata.projection {
        dataset.set_projection(projection)?;
    }
    Ok(())
}

/// Write a band-first `(classes, height, width)` probability array covering
/// `region` of the source raster described by `metadata`.
pub fn write_probabilities<P: AsRef<Path>>(
    path: P,
    probas: &Array3<f32>,
    metadata: &RasterMetadata,
    region: &Window,
    options: Option<&OutputOptions>,
) -> Result<()> {
    let (num_bands, height, width) = probas.dim();
    if (width, height) != (region.width, region.height) {
        return Err(GeoTileError::Alignment {
            expected: vec![region.height, region.width],
            found: vec![height, width],
        });
    }

    let mut dataset = create_output_dataset::<f32>(path.as_ref(), width, height, num_bands, options)?;
    set_georeferencing(&mut dataset, metadata, region)?;

    for (i, band_data) in probas.axis_iter(Axis(0)).enumerate() {
        let band_index = i + 1;
        debug!("Writing probability band {}", band_index);

        let mut raster_band = dataset.rasterband(band_index)?;
        let band_vec: Vec<f32> = band_data.iter().copied().collect();
        let mut buffer = Buffer::new((width, height), band_vec);
        raster_band.write((0, 0), (width, height), &mut buffer)?;
        raster_band.set_description(&format!("class_{:02}", i))?;
    }

    info!("Successfully wrote {} bands to output", num_bands);
    Ok(())
}

/// Write a band-first byte array (class map or RGB rendering) covering
/// `region` of the source raster.
pub fn write_classes<P: AsRef<Path>>(
    path: P,
    classes: &Array3<u8>,
    metadata: &RasterMetadata,
    region: &Window,
) -> Result<()> {
    let (num_bands, height, width) = classes.dim();
    if (width, height) != (region.width, region.height) {
        return Err(GeoTileError::Alignment {
            expected: vec![region.height, region.width],
            found: vec![height, width],
        });
    }

    let mut dataset = create_output_dataset::<u8>(path.as_ref(), width, height, num_bands, None)?;
    set_georeferencing(&mut dataset, metadata, region)?;

    for (i, band_data) in classes.axis_iter(Axis(0)).enumerate() {
        let mut raster_band = dataset.rasterband(i + 1)?;
        let band_vec: Vec<u8> = band_data.iter().copied().collect();
        let mut buffer = Buffer::new((width, height), band_vec);
        raster_band.write((0, 0), (width, height), &mut buffer)?;
    }

    info!("Successfully wrote {}-band class map to output", num_bands);
    Ok(())
}

/// Same as [`write_classes`] for a single-band map.
pub fn write_class_map<P: AsRef<Path>>(
    path: P,
    classes: &Array2<u8>,
    metadata: &RasterMetadata,
    region: &Window,
) -> Result<()> {
    let expanded = classes.clone().insert_axis(Axis(0));
    write_classes(path, &expanded, metadata, region)
}

/// Count pixel values of a label raster, block by block and in parallel.
/// Each distinct band tuple is a key; every block opens its own handle.
pub fn count_label_pixels<P: AsRef<Path> + Sync>(
    path: P,
    block_size: usize,
) -> Result<Vec<(Vec<u8>, u64)>> {
    let metadata = probe_raster(&path)?;
    info!(
        "Scanning {}x{} label raster in {} px blocks",
        metadata.width, metadata.height, block_size
    );

    let grid = TileGrid::new(
        metadata.width,
        metadata.height,
        block_size,
        block_size,
        block_size,
        block_size,
    )?;

    // Pulled-back blocks overlap their neighbour, so only count the part of
    // each block not already covered by the previous one along each axis.
    let col_starts = owned_starts(grid.col_offsets(), block_size);
    let row_starts = owned_starts(grid.row_offsets(), block_size);

    let blocks: Vec<(usize, Window)> = grid.iter().collect();
    let partials: Vec<HashMap<Vec<u8>, u64>> = blocks
        .par_iter()
        .map(|(idx, window)| -> Result<HashMap<Vec<u8>, u64>> {
            let skip_cols = col_starts[idx % grid.num_tiles_x] - window.col_off;
            let skip_rows = row_starts[idx / grid.num_tiles_x] - window.row_off;
            let owned = Window::new(
                window.col_off + skip_cols,
                window.row_off + skip_rows,
                window.width - skip_cols,
                window.height - skip_rows,
            );
            let data = read_window(&path, &owned, None)?;
            Ok(count_values(&data))
        })
        .collect::<Result<_>>()?;

    let mut totals: HashMap<Vec<u8>, u64> = HashMap::new();
    for partial in partials {
        for (value, count) in partial {
            *totals.entry(value).or_insert(0) += count;
        }
    }

    let mut counts: Vec<(Vec<u8>, u64)> = totals.into_iter().collect();
    counts.sort_unstable();

    info!("Found {} distinct label values", counts.len());
    Ok(counts)
}

/// First pixel of each block not covered by the preceding block.
fn owned_starts(offsets: &[usize], block_size: usize) -> Vec<usize> {
    let mut starts = Vec::with_capacity(offsets.len());
    let mut covered_until = 0;
    for &off in offsets {
        starts.push(off.max(covered_until));
        covered_until = off + block_size;
    }
    starts
}

fn count_values(data: &Array3<f32>) -> HashMap<Vec<u8>, u64> {
    let (bands, height, width) = data.dim();
    let mut counts: HashMap<Vec<u8>, u64> = HashMap::new();
    for row in 0..height {
        for col in 0..width {
            let key: Vec<u8> = (0..bands).map(|b| data[[b, row, col]] as u8).collect();
            *counts.entry(key).or_insert(0) += 1;
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr3;

    #[test]
    fn test_validate_compression() {
        assert!(validate_compression("DEFLATE").is_ok());
        assert!(validate_compression("ZSTD").is_ok());
        assert!(validate_compression("jpeg").is_err());
    }

    #[test]
    fn test_validate_block_size() {
        assert!(validate_block_size(256).is_ok());
        assert!(validate_block_size(0).is_err());
        assert!(validate_block_size(100).is_err());
    }

    #[test]
    fn test_creation_options() {
        let opts = OutputOptions {
            compression: "LZW".to_string(),
            block_size: 512,
        }
        .to_creation_options()
        .unwrap();
        assert_eq!(opts.len(), 5);
        assert!(opts.contains(&"COMPRESS=LZW".to_string()));
        assert!(opts.contains(&"BLOCKXSIZE=512".to_string()));
    }

    #[test]
    fn test_region_geotransform() {
        let metadata = RasterMetadata {
            width: 100,
            height: 100,
            band_count: 1,
            geotransform: Some([1000.0, 0.5, 0.0, 2000.0, 0.0, -0.5]),
            projection: None,
        };
        let gt = metadata
            .region_geotransform(&Window::new(10, 20, 50, 50))
            .unwrap();
        assert_eq!(gt, [1005.0, 0.5, 0.0, 1990.0, 0.0, -0.5]);
    }

    #[test]
    fn test_owned_starts() {
        assert_eq!(owned_starts(&[0, 256, 261], 256), vec![0, 256, 512]);
        assert_eq!(owned_starts(&[0], 256), vec![0]);
    }

    #[test]
    fn test_count_values() {
        let data = arr3(&[[[1.0, 2.0], [1.0, 1.0]]]);
        let counts = count_values(&data);
        assert_eq!(counts[&vec![1u8]], 3);
        assert_eq!(counts[&vec![2u8]], 1);
    }
}
