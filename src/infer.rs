use crate::augment::D4Transform;
use crate::crop::CropMode;
use crate::dataset::WindowedDataset;
use crate::error::{GeoTileError, Result};
use crate::stitch::{ProbabilityStitcher, Reduction, Stitched};
use crate::window::Window;
use log::{debug, info};
use ndarray::{Array2, Array3, ArrayView3, Axis, Zip};
use rayon::prelude::*;

/// Opaque segmentation network: band-first image crop in, per-class logits
/// `(classes, height, width)` out.
pub trait SegmentationModel: Sync {
    fn predict(&self, image: ArrayView3<'_, f32>) -> Result<Array3<f32>>;
}

impl<F> SegmentationModel for F
where
    F: Fn(ArrayView3<'_, f32>) -> Result<Array3<f32>> + Sync,
{
    fn predict(&self, image: ArrayView3<'_, f32>) -> Result<Array3<f32>> {
        self(image)
    }
}

/// Logits to probabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    /// Softmax across the class axis.
    Softmax,
    /// Independent sigmoid per class; a single channel becomes `[1 - p, p]`.
    Sigmoid,
}

impl Activation {
    pub fn apply(self, logits: Array3<f32>) -> Array3<f32> {
        match self {
            Activation::Softmax => {
                let mut probas = logits;
                for mut pixel in probas.lanes_mut(Axis(0)) {
                    let max = pixel.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
                    pixel.mapv_inplace(|v| (v - max).exp());
                    let total = pixel.sum();
                    pixel.mapv_inplace(|v| v / total);
                }
                probas
            }
            Activation::Sigmoid => {
                let probas = logits.mapv(|v| 1.0 / (1.0 + (-v).exp()));
                let (classes, h, w) = probas.dim();
                if classes != 1 {
                    return probas;
                }
                Array3::from_shape_fn((2, h, w), |(c, row, col)| {
                    let p = probas[[0, row, col]];
                    if c == 0 {
                        1.0 - p
                    } else {
                        p
                    }
                })
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct InferenceConfig {
    pub num_classes: usize,
    pub activation: Activation,
    /// Extra views averaged with the plain prediction.
    pub tta: Vec<D4Transform>,
    pub reduction: Reduction,
    /// Crops predicted in parallel before being stitched.
    pub batch_size: usize,
}

impl InferenceConfig {
    pub fn new(num_classes: usize) -> Self {
        Self {
            num_classes,
            activation: Activation::Softmax,
            tta: Vec::new(),
            reduction: Reduction::Mean,
            batch_size: 8,
        }
    }
}

/// Probabilities for one crop, averaged over the identity and every
/// test-time transform.
pub fn predict_crop<M: SegmentationModel + ?Sized>(
    model: &M,
    image: &Array3<f32>,
    config: &InferenceConfig,
) -> Result<Array3<f32>> {
    let mut total: Option<Array3<f32>> = None;
    let views = std::iter::once(D4Transform::Identity).chain(config.tta.iter().copied());
    let mut count = 0usize;

    for transform in views {
        let input = transform.apply_array(image.clone());
        let logits = model.predict(input.view())?;
        let probas = transform.inverse().apply_array(config.activation.apply(logits));
        total = Some(match total {
            None => probas,
            Some(acc) => {
                if acc.dim() != probas.dim() {
                    return Err(GeoTileError::Alignment {
                        expected: acc.shape().to_vec(),
                        found: probas.shape().to_vec(),
                    });
                }
                acc + probas
            }
        });
        count += 1;
    }

    let total = total.unwrap_or_else(|| Array3::zeros((config.num_classes, 0, 0)));
    Ok(total / count.max(1) as f32)
}

/// Run `model` over every crop of a fixed-grid dataset and stitch the
/// probabilities over the dataset region.
pub fn compute_probas<M: SegmentationModel + ?Sized>(
    dataset: &WindowedDataset,
    model: &M,
    config: &InferenceConfig,
) -> Result<Stitched> {
    if dataset.mode() != CropMode::FixedGrid {
        return Err(GeoTileError::RandomModeInference);
    }
    if config.batch_size == 0 {
        return Err(GeoTileError::NonPositiveParameter {
            name: "batch size",
            value: config.batch_size,
        });
    }

    let region = dataset.region();
    let mut stitcher = ProbabilityStitcher::new(config.num_classes, region, config.reduction);
    let indices: Vec<usize> = (0..dataset.len()).collect();
    info!(
        "Computing probabilities on {} crops ({} TTA views)",
        indices.len(),
        config.tta.len()
    );

    for (batch_idx, batch) in indices.chunks(config.batch_size).enumerate() {
        let predictions: Vec<(Window, Array3<f32>)> = batch
            .par_iter()
            .map(|&idx| -> Result<(Window, Array3<f32>)> {
                let sample = dataset.get_sample(idx)?;
                let image = sample.orig_image.unwrap_or(sample.image);
                Ok((sample.window, predict_crop(model, &image, config)?))
            })
            .collect::<Result<_>>()?;

        for (window, probas) in &predictions {
            stitcher.add(window, probas.view())?;
        }
        debug!("Batch {} stitched ({} crops)", batch_idx, predictions.len());
    }

    let stitched = stitcher.finish();
    info!(
        "Stitched {}x{} probability map, fully covered: {}",
        region.width,
        region.height,
        stitched.is_fully_covered()
    );
    Ok(stitched)
}

/// Arg-max over the class axis; ties go to the lowest class.
pub fn probas_to_preds(probas: &Array3<f32>) -> Array2<u8> {
    let (_, h, w) = probas.dim();
    Array2::from_shape_fn((h, w), |(row, col)| {
        let mut best = 0usize;
        let mut best_value = f32::NEG_INFINITY;
        for (class, &value) in probas.slice(ndarray::s![.., row, col]).iter().enumerate() {
            if value > best_value {
                best = class;
                best_value = value;
            }
        }
        best as u8
    })
}

/// Per-pixel disagreement between predictions and labels.
///
/// Without `class_id` the map is 1 where they differ and 0 elsewhere. With a
/// class of interest it codes 0 = true negative, 1 = true positive,
/// 2 = false positive, 3 = false negative.
pub fn error_map(preds: &Array2<u8>, labels: &Array2<u8>, class_id: Option<u8>) -> Result<Array2<u8>> {
    if preds.dim() != labels.dim() {
        return Err(GeoTileError::Alignment {
            expected: preds.shape().to_vec(),
            found: labels.shape().to_vec(),
        });
    }

    let mut errors = Array2::<u8>::zeros(preds.dim());
    Zip::from(&mut errors)
        .and(preds)
        .and(labels)
        .for_each(|e, &p, &l| {
            *e = match class_id {
                None => u8::from(p != l),
                Some(c) => match (p == c, l == c) {
                    (false, false) => 0,
                    (true, true) => 1,
                    (true, false) => 2,
                    (false, true) => 3,
                },
            }
        });
    Ok(errors)
}
