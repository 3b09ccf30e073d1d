use std::fmt;

/// Axis-aligned pixel rectangle: column/row offset of the top-left corner
/// plus width and height.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Window {
    pub col_off: usize,
    pub row_off: usize,
    pub width: usize,
    pub height: usize,
}

impl Window {
    pub fn new(col_off: usize, row_off: usize, width: usize, height: usize) -> Self {
        Self {
            col_off,
            row_off,
            width,
            height,
        }
    }

    /// Window spanning a whole `width` x `height` raster.
    pub fn full(width: usize, height: usize) -> Self {
        Self::new(0, 0, width, height)
    }

    /// Exclusive right edge.
    pub fn col_end(&self) -> usize {
        self.col_off + self.width
    }

    /// Exclusive bottom edge.
    pub fn row_end(&self) -> usize {
        self.row_off + self.height
    }

    pub fn area(&self) -> usize {
        self.width * self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// True when `other` lies entirely inside `self`.
    pub fn contains(&self, other: &Window) -> bool {
        other.col_off >= self.col_off
            && other.row_off >= self.row_off
            && other.col_end() <= self.col_end()
            && other.row_end() <= self.row_end()
    }

    /// Overlapping part of two windows, or `None` if they are disjoint.
    pub fn intersection(&self, other: &Window) -> Option<Window> {
        let col_min = self.col_off.max(other.col_off);
        let row_min = self.row_off.max(other.row_off);
        let col_max = self.col_end().min(other.col_end());
        let row_max = self.row_end().min(other.row_end());

        if col_min >= col_max || row_min >= row_max {
            return None;
        }

        Some(Window::new(
            col_min,
            row_min,
            col_max - col_min,
            row_max - row_min,
        ))
    }

    /// Shift by a non-negative offset, e.g. from tile-local to image coordinates.
    pub fn translate(&self, col: usize, row: usize) -> Window {
        Window::new(self.col_off + col, self.row_off + row, self.width, self.height)
    }

    /// Express `self` relative to the top-left corner of `origin`.
    /// Returns `None` if `self` starts before `origin`.
    pub fn relative_to(&self, origin: &Window) -> Option<Window> {
        Some(Window::new(
            self.col_off.checked_sub(origin.col_off)?,
            self.row_off.checked_sub(origin.row_off)?,
            self.width,
            self.height,
        ))
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Window(col_off={}, row_off={}, width={}, height={})",
            self.col_off, self.row_off, self.width, self.height
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intersection_clamps_to_bounds() {
        let bounds = Window::full(517, 517);
        let window = Window::new(512, 0, 256, 256);
        let clipped = window.intersection(&bounds).unwrap();
        assert_eq!(clipped, Window::new(512, 0, 5, 256));
    }

    #[test]
    fn test_intersection_disjoint() {
        let a = Window::new(0, 0, 10, 10);
        let b = Window::new(10, 0, 10, 10);
        assert!(a.intersection(&b).is_none());
    }

    #[test]
    fn test_contains_and_relative() {
        let tile = Window::new(100, 200, 64, 64);
        let crop = Window::new(110, 230, 32, 32);
        assert!(tile.contains(&crop));
        assert!(!crop.contains(&tile));
        assert_eq!(crop.relative_to(&tile), Some(Window::new(10, 30, 32, 32)));
        assert_eq!(tile.relative_to(&crop), None);
        assert_eq!(Window::new(10, 30, 32, 32).translate(100, 200), crop);
    }
}
