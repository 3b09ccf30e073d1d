use crate::error::{GeoTileError, Result};
use crate::label::Mask;
use ndarray::{Array, Array3, Axis, Dimension};
use rand::seq::SliceRandom;
use rand::{Rng, RngCore};

/// Elements of the dihedral group D4 acting on the last two (row, column)
/// axes of an array. Rotations are counter-clockwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum D4Transform {
    Identity,
    Hflip,
    Vflip,
    /// Transpose along the main diagonal.
    Transpose1,
    /// Transpose along the anti-diagonal.
    Transpose2,
    Rot90,
    Rot180,
    Rot270,
}

impl D4Transform {
    pub const ALL: [D4Transform; 8] = [
        D4Transform::Identity,
        D4Transform::Hflip,
        D4Transform::Vflip,
        D4Transform::Transpose1,
        D4Transform::Transpose2,
        D4Transform::Rot90,
        D4Transform::Rot180,
        D4Transform::Rot270,
    ];

    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "identity" => Ok(D4Transform::Identity),
            "hflip" => Ok(D4Transform::Hflip),
            "vflip" => Ok(D4Transform::Vflip),
            "d1flip" => Ok(D4Transform::Transpose1),
            "d2flip" => Ok(D4Transform::Transpose2),
            "rot90" => Ok(D4Transform::Rot90),
            "rot180" => Ok(D4Transform::Rot180),
            "rot270" => Ok(D4Transform::Rot270),
            _ => Err(GeoTileError::UnknownAugmentation(name.to_string())),
        }
    }

    pub fn inverse(self) -> Self {
        match self {
            D4Transform::Rot90 => D4Transform::Rot270,
            D4Transform::Rot270 => D4Transform::Rot90,
            other => other,
        }
    }

    /// Apply to an array of at least two dimensions; the result is in
    /// standard layout.
    pub fn apply_array<A: Clone, D: Dimension>(self, mut array: Array<A, D>) -> Array<A, D> {
        let ndim = array.ndim();
        let rows = Axis(ndim - 2);
        let cols = Axis(ndim - 1);

        match self {
            D4Transform::Identity => {}
            D4Transform::Hflip => array.invert_axis(cols),
            D4Transform::Vflip => array.invert_axis(rows),
            D4Transform::Transpose1 => array.swap_axes(rows.index(), cols.index()),
            D4Transform::Transpose2 => {
                array.invert_axis(cols);
                array.invert_axis(rows);
                array.swap_axes(rows.index(), cols.index());
            }
            D4Transform::Rot90 => {
                array.invert_axis(cols);
                array.swap_axes(rows.index(), cols.index());
            }
            D4Transform::Rot180 => {
                array.invert_axis(cols);
                array.invert_axis(rows);
            }
            D4Transform::Rot270 => {
                array.swap_axes(rows.index(), cols.index());
                array.invert_axis(cols);
            }
        }

        array.as_standard_layout().into_owned()
    }

    pub fn apply_mask(self, mask: Mask) -> Mask {
        match mask {
            Mask::Classes(classes) => Mask::Classes(self.apply_array(classes)),
            Mask::Probabilities(probas) => Mask::Probabilities(self.apply_array(probas)),
        }
    }
}

/// Post-read transform applied to an image crop and its optional mask.
/// Implementations must move image and mask pixels identically.
pub trait Augmentation: Send + Sync {
    fn apply(
        &self,
        image: Array3<f32>,
        mask: Option<Mask>,
        rng: &mut dyn RngCore,
    ) -> (Array3<f32>, Option<Mask>);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoOp;

impl Augmentation for NoOp {
    fn apply(
        &self,
        image: Array3<f32>,
        mask: Option<Mask>,
        _rng: &mut dyn RngCore,
    ) -> (Array3<f32>, Option<Mask>) {
        (image, mask)
    }
}

/// Applies a fixed D4 transform with probability `p`.
#[derive(Debug, Clone, Copy)]
pub struct RandomTransform {
    transform: D4Transform,
    p: f64,
}

impl RandomTransform {
    pub fn new(transform: D4Transform, p: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&p) {
            return Err(GeoTileError::InvalidProbability(p));
        }
        Ok(Self { transform, p })
    }
}

impl Augmentation for RandomTransform {
    fn apply(
        &self,
        image: Array3<f32>,
        mask: Option<Mask>,
        rng: &mut dyn RngCore,
    ) -> (Array3<f32>, Option<Mask>) {
        if rng.gen::<f64>() < self.p {
            let image = self.transform.apply_array(image);
            let mask = mask.map(|m| self.transform.apply_mask(m));
            return (image, mask);
        }
        (image, mask)
    }
}

/// Uniformly random element of D4.
#[derive(Debug, Clone, Copy, Default)]
pub struct D4;

impl Augmentation for D4 {
    fn apply(
        &self,
        image: Array3<f32>,
        mask: Option<Mask>,
        rng: &mut dyn RngCore,
    ) -> (Array3<f32>, Option<Mask>) {
        let transform = *D4Transform::ALL
            .choose(rng)
            .unwrap_or(&D4Transform::Identity);
        let image = transform.apply_array(image);
        let mask = mask.map(|m| transform.apply_mask(m));
        (image, mask)
    }
}

pub struct Compose {
    transforms: Vec<Box<dyn Augmentation>>,
}

impl Compose {
    pub fn new(transforms: Vec<Box<dyn Augmentation>>) -> Self {
        Self { transforms }
    }
}

impl Augmentation for Compose {
    fn apply(
        &self,
        image: Array3<f32>,
        mask: Option<Mask>,
        rng: &mut dyn RngCore,
    ) -> (Array3<f32>, Option<Mask>) {
        self.transforms
            .iter()
            .fold((image, mask), |(image, mask), t| t.apply(image, mask, rng))
    }
}

/// Build a pipeline from names: `d4`, `hflip`, `vflip`, `d1flip`, `d2flip`,
/// `rot90`, `rot180`, `rot270` and `no`. Single transforms fire with
/// probability `p`.
pub fn augmentation_from_names(names: &[&str], p: f64) -> Result<Box<dyn Augmentation>> {
    let mut transforms: Vec<Box<dyn Augmentation>> = Vec::with_capacity(names.len());
    for &name in names {
        let transform: Box<dyn Augmentation> = match name {
            "no" => Box::new(NoOp),
            "d4" => Box::new(D4),
            other => Box::new(RandomTransform::new(D4Transform::from_name(other)?, p)?),
        };
        transforms.push(transform);
    }

    if transforms.len() == 1 {
        if let Some(single) = transforms.pop() {
            return Ok(single);
        }
    }
    Ok(Box::new(Compose::new(transforms)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr2, Array2};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn grid() -> Array2<u8> {
        arr2(&[[1, 2, 3], [4, 5, 6]])
    }

    #[test]
    fn test_flips() {
        assert_eq!(D4Transform::Hflip.apply_array(grid()), arr2(&[[3, 2, 1], [6, 5, 4]]));
        assert_eq!(D4Transform::Vflip.apply_array(grid()), arr2(&[[4, 5, 6], [1, 2, 3]]));
        assert_eq!(
            D4Transform::Transpose1.apply_array(grid()),
            arr2(&[[1, 4], [2, 5], [3, 6]])
        );
        assert_eq!(
            D4Transform::Transpose2.apply_array(grid()),
            arr2(&[[6, 3], [5, 2], [4, 1]])
        );
    }

    #[test]
    fn test_rotations() {
        let square = arr2(&[[1, 2], [3, 4]]);
        assert_eq!(D4Transform::Rot90.apply_array(square.clone()), arr2(&[[2, 4], [1, 3]]));
        assert_eq!(D4Transform::Rot180.apply_array(square.clone()), arr2(&[[4, 3], [2, 1]]));
        assert_eq!(D4Transform::Rot270.apply_array(square), arr2(&[[3, 1], [4, 2]]));
    }

    #[test]
    fn test_inverse_restores() {
        for t in D4Transform::ALL {
            let back = t.inverse().apply_array(t.apply_array(grid()));
            assert_eq!(back, grid(), "{:?}", t);
        }
    }

    #[test]
    fn test_image_and_mask_stay_aligned() {
        let image = Array3::from_shape_fn((2, 4, 4), |(b, r, c)| (b * 100 + r * 4 + c) as f32);
        let mask = Mask::Classes(Array2::from_shape_fn((4, 4), |(r, c)| (r * 4 + c) as u8));
        let mut rng = StdRng::seed_from_u64(3);

        for _ in 0..20 {
            let (image, mask) = D4.apply(image.clone(), Some(mask.clone()), &mut rng);
            let classes = match mask {
                Some(Mask::Classes(c)) => c,
                _ => panic!("mask lost"),
            };
            for ((r, c), &class) in classes.indexed_iter() {
                assert_eq!(image[[0, r, c]] as u8, class);
                assert_eq!(image[[1, r, c]], 100.0 + class as f32);
            }
        }
    }

    #[test]
    fn test_probability_bounds() {
        assert!(RandomTransform::new(D4Transform::Hflip, 1.5).is_err());
        let never = RandomTransform::new(D4Transform::Hflip, 0.0).unwrap();
        let image = Array3::from_shape_fn((1, 2, 2), |(_, r, c)| (r * 2 + c) as f32);
        let mut rng = StdRng::seed_from_u64(0);
        let (out, _) = never.apply(image.clone(), None, &mut rng);
        assert_eq!(out, image);
    }

    #[test]
    fn test_from_names() {
        assert!(augmentation_from_names(&["d4", "hflip"], 0.5).is_ok());
        assert!(augmentation_from_names(&["no"], 0.5).is_ok());
        assert!(augmentation_from_names(&["cutmix"], 0.5).is_err());

        let always = augmentation_from_names(&["vflip"], 1.0).unwrap();
        let image = Array3::from_shape_fn((1, 2, 1), |(_, r, _)| r as f32);
        let mut rng = StdRng::seed_from_u64(0);
        let (out, _) = always.apply(image, None, &mut rng);
        assert_eq!(out[[0, 0, 0]], 1.0);
    }
}
