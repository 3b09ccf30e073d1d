use crate::error::{GeoTileError, Result};
use ndarray::{Array2, Array3, Axis};

/// Label crop after formatting: either one class index per pixel or one
/// probability band per class.
#[derive(Debug, Clone, PartialEq)]
pub enum Mask {
    Classes(Array2<u8>),
    Probabilities(Array3<f32>),
}

impl Mask {
    /// `(height, width)` of the mask.
    pub fn spatial_dim(&self) -> (usize, usize) {
        match self {
            Mask::Classes(classes) => classes.dim(),
            Mask::Probabilities(probas) => {
                let (_, h, w) = probas.dim();
                (h, w)
            }
        }
    }
}

/// Converts a raw band-first label window into a [`Mask`]. Must be pure and
/// keep the spatial layout of its input.
pub trait LabelFormatter: Send + Sync {
    fn format(&self, raw: Array3<f32>) -> Result<Mask>;
}

impl<F> LabelFormatter for F
where
    F: Fn(Array3<f32>) -> Result<Mask> + Send + Sync,
{
    fn format(&self, raw: Array3<f32>) -> Result<Mask> {
        self(raw)
    }
}

fn first_band(raw: &Array3<f32>) -> Result<ndarray::ArrayView2<'_, f32>> {
    if raw.dim().0 == 0 {
        return Err(GeoTileError::Alignment {
            expected: vec![1],
            found: vec![0],
        });
    }
    Ok(raw.index_axis(Axis(0), 0))
}

/// Band 0 holds class indices directly; `shift` is subtracted (saturating),
/// e.g. to drop a void class stored as 0.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawClassFormatter {
    pub shift: u8,
}

impl LabelFormatter for RawClassFormatter {
    fn format(&self, raw: Array3<f32>) -> Result<Mask> {
        let band = first_band(&raw)?;
        Ok(Mask::Classes(
            band.mapv(|v| (v as u8).saturating_sub(self.shift)),
        ))
    }
}

/// Class of interest becomes 1, everything else 0.
#[derive(Debug, Clone, Copy)]
pub struct BinaryFormatter {
    pub class_id: u8,
}

impl LabelFormatter for BinaryFormatter {
    fn format(&self, raw: Array3<f32>) -> Result<Mask> {
        let band = first_band(&raw)?;
        Ok(Mask::Classes(
            band.mapv(|v| u8::from(v as u8 == self.class_id)),
        ))
    }
}

/// Class indices in band 0 expanded to one probability band per class.
#[derive(Debug, Clone, Copy)]
pub struct OneHotFormatter {
    pub num_classes: usize,
}

impl LabelFormatter for OneHotFormatter {
    fn format(&self, raw: Array3<f32>) -> Result<Mask> {
        let band = first_band(&raw)?;
        let (h, w) = band.dim();
        let mut probas = Array3::<f32>::zeros((self.num_classes, h, w));
        for ((row, col), &value) in band.indexed_iter() {
            let class = value as usize;
            if class < self.num_classes {
                probas[[class, row, col]] = 1.0;
            }
        }
        Ok(Mask::Probabilities(probas))
    }
}

/// Mapping between RGB colours and class indices.
#[derive(Debug, Clone)]
pub struct ColorTable {
    entries: Vec<([u8; 3], u8)>,
    fallback: u8,
}

impl ColorTable {
    pub fn new(entries: Vec<([u8; 3], u8)>, fallback: u8) -> Self {
        Self { entries, fallback }
    }

    /// ISPRS Vaihingen/Potsdam legend. Unknown colours fall back to clutter.
    pub fn isprs() -> Self {
        Self::new(
            vec![
                ([255, 255, 255], 0), // impervious surfaces
                ([0, 0, 255], 1),     // building
                ([0, 255, 255], 2),   // low vegetation
                ([0, 255, 0], 3),     // tree
                ([255, 255, 0], 4),   // car
                ([255, 0, 0], 5),     // clutter
            ],
            5,
        )
    }

    pub fn num_classes(&self) -> usize {
        self.entries.len()
    }

    pub fn class_of(&self, color: [u8; 3]) -> u8 {
        self.entries
            .iter()
            .find(|(c, _)| *c == color)
            .map(|(_, class)| *class)
            .unwrap_or(self.fallback)
    }

    pub fn color_of(&self, class: u8) -> [u8; 3] {
        self.entries
            .iter()
            .find(|(_, c)| *c == class)
            .map(|(color, _)| *color)
            .unwrap_or([0, 0, 0])
    }

    /// Render a class map as a band-first RGB array.
    pub fn to_rgb(&self, classes: &Array2<u8>) -> Array3<u8> {
        let (h, w) = classes.dim();
        let mut rgb = Array3::<u8>::zeros((3, h, w));
        for ((row, col), &class) in classes.indexed_iter() {
            let color = self.color_of(class);
            for (band, value) in color.iter().enumerate() {
                rgb[[band, row, col]] = *value;
            }
        }
        rgb
    }
}

/// Colour-coded RGB labels (bands 0..3) to class indices.
#[derive(Debug, Clone)]
pub struct ColorLabelFormatter {
    pub table: ColorTable,
}

impl LabelFormatter for ColorLabelFormatter {
    fn format(&self, raw: Array3<f32>) -> Result<Mask> {
        let (bands, h, w) = raw.dim();
        if bands < 3 {
            return Err(GeoTileError::Alignment {
                expected: vec![3, h, w],
                found: vec![bands, h, w],
            });
        }
        let classes = Array2::from_shape_fn((h, w), |(row, col)| {
            self.table.class_of([
                raw[[0, row, col]] as u8,
                raw[[1, row, col]] as u8,
                raw[[2, row, col]] as u8,
            ])
        });
        Ok(Mask::Classes(classes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr2, arr3};

    #[test]
    fn test_raw_class_shift() {
        let raw = arr3(&[[[0.0, 1.0], [2.0, 3.0]]]);
        let mask = RawClassFormatter { shift: 1 }.format(raw).unwrap();
        assert_eq!(mask, Mask::Classes(arr2(&[[0, 0], [1, 2]])));
    }

    #[test]
    fn test_binary() {
        let raw = arr3(&[[[4.0, 1.0], [4.0, 3.0]]]);
        let mask = BinaryFormatter { class_id: 4 }.format(raw).unwrap();
        assert_eq!(mask, Mask::Classes(arr2(&[[1, 0], [1, 0]])));
    }

    #[test]
    fn test_one_hot() {
        let raw = arr3(&[[[0.0, 2.0]]]);
        let mask = OneHotFormatter { num_classes: 3 }.format(raw).unwrap();
        match mask {
            Mask::Probabilities(p) => {
                assert_eq!(p.dim(), (3, 1, 2));
                assert_eq!(p[[0, 0, 0]], 1.0);
                assert_eq!(p[[2, 0, 1]], 1.0);
                assert_eq!(p.sum(), 2.0);
            }
            Mask::Classes(_) => panic!("expected probabilities"),
        }
    }

    #[test]
    fn test_isprs_colors_roundtrip() {
        let table = ColorTable::isprs();
        let raw = arr3(&[
            [[255.0, 0.0], [0.0, 12.0]],
            [[255.0, 0.0], [255.0, 34.0]],
            [[255.0, 255.0], [0.0, 56.0]],
        ]);
        let mask = ColorLabelFormatter {
            table: table.clone(),
        }
        .format(raw)
        .unwrap();
        let classes = match mask {
            Mask::Classes(c) => c,
            Mask::Probabilities(_) => panic!("expected classes"),
        };
        assert_eq!(classes, arr2(&[[0, 1], [3, 5]]));

        let rgb = table.to_rgb(&classes);
        assert_eq!(rgb[[2, 0, 1]], 255);
        assert_eq!(rgb[[0, 1, 1]], 255);
    }

    #[test]
    fn test_closure_formatter() {
        let formatter = |raw: Array3<f32>| -> Result<Mask> {
            Ok(Mask::Classes(raw.index_axis(Axis(0), 0).mapv(|v| v as u8 * 2)))
        };
        let mask = formatter.format(arr3(&[[[1.0]]])).unwrap();
        assert_eq!(mask.spatial_dim(), (1, 1));
    }
}
