use crate::error::{GeoTileError, Result};
use crate::window::Window;
use log::debug;
use ndarray::{s, Array2, Array3, ArrayView3, Zip};

/// How overlapping crop predictions are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Reduction {
    #[default]
    Mean,
    Max,
}

/// Accumulates per-crop class probabilities into one array covering a
/// region of the source raster.
#[derive(Debug, Clone)]
pub struct ProbabilityStitcher {
    region: Window,
    reduction: Reduction,
    accumulator: Array3<f32>,
    coverage: Array2<u32>,
}

/// Result of stitching: probabilities `(classes, height, width)` and the
/// number of crops that contributed to each pixel.
#[derive(Debug, Clone)]
pub struct Stitched {
    pub probas: Array3<f32>,
    pub coverage: Array2<u32>,
}

impl Stitched {
    pub fn is_fully_covered(&self) -> bool {
        self.coverage.iter().all(|&c| c > 0)
    }
}

impl ProbabilityStitcher {
    pub fn new(num_classes: usize, region: Window, reduction: Reduction) -> Self {
        let init = match reduction {
            Reduction::Mean => 0.0,
            Reduction::Max => f32::NEG_INFINITY,
        };
        Self {
            region,
            reduction,
            accumulator: Array3::from_elem((num_classes, region.height, region.width), init),
            coverage: Array2::zeros((region.height, region.width)),
        }
    }

    pub fn region(&self) -> Window {
        self.region
    }

    /// Add the prediction for the absolute crop `window`.
    pub fn add(&mut self, window: &Window, probas: ArrayView3<'_, f32>) -> Result<()> {
        if !self.region.contains(window) {
            return Err(GeoTileError::WindowOutOfBounds {
                window: *window,
                width: self.region.col_end(),
                height: self.region.row_end(),
            });
        }
        let (num_classes, _, _) = self.accumulator.dim();
        let expected = (num_classes, window.height, window.width);
        if probas.dim() != expected {
            let (c, h, w) = probas.dim();
            return Err(GeoTileError::Alignment {
                expected: vec![expected.0, expected.1, expected.2],
                found: vec![c, h, w],
            });
        }

        let local = window.relative_to(&self.region).unwrap_or(*window);
        let rows = local.row_off..local.row_end();
        let cols = local.col_off..local.col_end();
        debug!("Stitching {} at local {}", window, local);

        let mut target = self.accumulator.slice_mut(s![.., rows.clone(), cols.clone()]);
        match self.reduction {
            Reduction::Mean => target += &probas,
            Reduction::Max => Zip::from(&mut target)
                .and(&probas)
                .for_each(|acc, &p| *acc = acc.max(p)),
        }
        self.coverage
            .slice_mut(s![rows, cols])
            .mapv_inplace(|c| c + 1);

        Ok(())
    }

    pub fn finish(self) -> Stitched {
        let Self {
            reduction,
            mut accumulator,
            coverage,
            ..
        } = self;

        for mut class_band in accumulator.outer_iter_mut() {
            Zip::from(&mut class_band)
                .and(&coverage)
                .for_each(|value, &count| {
                    if count == 0 {
                        *value = 0.0;
                    } else if reduction == Reduction::Mean {
                        *value /= count as f32;
                    }
                });
        }

        Stitched {
            probas: accumulator,
            coverage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crop::CropSampler;
    use ndarray::Array3;

    #[test]
    fn test_non_overlapping_reproduces_crops() {
        let region = Window::new(0, 0, 8, 8);
        let crops = CropSampler::new(4).unwrap().fixed_grid(&region).unwrap();
        let mut stitcher = ProbabilityStitcher::new(2, region, Reduction::Mean);

        for (i, crop) in crops.iter().enumerate() {
            let pred = Array3::from_elem((2, 4, 4), i as f32);
            stitcher.add(crop, pred.view()).unwrap();
        }
        let stitched = stitcher.finish();

        assert!(stitched.is_fully_covered());
        assert!(stitched.coverage.iter().all(|&c| c == 1));
        for (i, crop) in crops.iter().enumerate() {
            for r in crop.row_off..crop.row_end() {
                for c in crop.col_off..crop.col_end() {
                    assert_eq!(stitched.probas[[1, r, c]], i as f32);
                }
            }
        }
    }

    #[test]
    fn test_overlap_is_averaged() {
        let region = Window::new(100, 100, 6, 4);
        let crops = CropSampler::new(4).unwrap().fixed_grid(&region).unwrap();
        assert_eq!(crops.len(), 2);

        let mut stitcher = ProbabilityStitcher::new(1, region, Reduction::Mean);
        stitcher.add(&crops[0], Array3::from_elem((1, 4, 4), 0.2).view()).unwrap();
        stitcher.add(&crops[1], Array3::from_elem((1, 4, 4), 0.6).view()).unwrap();
        let stitched = stitcher.finish();

        assert_eq!(stitched.coverage[[0, 0]], 1);
        assert_eq!(stitched.coverage[[0, 2]], 2);
        assert_eq!(stitched.coverage[[0, 3]], 2);
        assert_eq!(stitched.coverage[[0, 4]], 1);
        assert!((stitched.probas[[0, 0, 0]] - 0.2).abs() < 1e-6);
        assert!((stitched.probas[[0, 1, 3]] - 0.4).abs() < 1e-6);
        assert!((stitched.probas[[0, 3, 5]] - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_max_reduction_and_uncovered() {
        let region = Window::new(0, 0, 4, 2);
        let mut stitcher = ProbabilityStitcher::new(1, region, Reduction::Max);
        stitcher
            .add(&Window::new(0, 0, 2, 2), Array3::from_elem((1, 2, 2), 0.3).view())
            .unwrap();
        stitcher
            .add(&Window::new(1, 0, 2, 2), Array3::from_elem((1, 2, 2), 0.1).view())
            .unwrap();
        let stitched = stitcher.finish();

        assert!(!stitched.is_fully_covered());
        assert_eq!(stitched.probas[[0, 0, 1]], 0.3);
        assert_eq!(stitched.probas[[0, 0, 2]], 0.1);
        assert_eq!(stitched.probas[[0, 0, 3]], 0.0);
    }

    #[test]
    fn test_rejects_misaligned() {
        let region = Window::new(0, 0, 4, 4);
        let mut stitcher = ProbabilityStitcher::new(2, region, Reduction::Mean);
        let pred = Array3::<f32>::zeros((2, 2, 2));
        assert!(stitcher.add(&Window::new(3, 3, 2, 2), pred.view()).is_err());
        assert!(stitcher.add(&Window::new(0, 0, 3, 3), pred.view()).is_err());
        assert!(stitcher.add(&Window::new(2, 2, 2, 2), pred.view()).is_ok());
    }
}
