use nalgebra::{Matrix3, Point3, Vector3};
use ndarray::{Array4, ArrayView2, ArrayView3, Axis, s};
use rayon::prelude::*;

use crate::window_level::WindowLevelError;

/// Minimum and maximum sample value of an image or a part of it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScalarRange {
    pub min: f64,
    pub max: f64,
}

/// A decoded slice or volume together with its geometry.
///
/// Samples are stored as `(depth, height, width, components)`, i.e. the
/// layout the DICOM pixel data decoder hands out: frame first, component
/// last. The direction matrix holds the world direction of the i (column),
/// j (row) and k (frame) index axes as its columns.
#[derive(Debug, Clone)]
pub struct Image {
    data: Array4<f32>,
    spacing: [f64; 3],
    origin: Point3<f64>,
    direction: Matrix3<f64>,
}

impl Image {
    pub fn new(
        data: Array4<f32>,
        spacing: [f64; 3],
        origin: Point3<f64>,
        direction: Matrix3<f64>,
    ) -> Self {
        Self {
            data,
            spacing,
            origin,
            direction,
        }
    }

    /// Single-component image with identity direction, unit spacing and
    /// origin at zero. Handy for synthetic data.
    pub fn from_frames(frames: ndarray::Array3<f32>) -> Self {
        let data = frames.insert_axis(Axis(3));
        Self::new(data, [1.0; 3], Point3::origin(), Matrix3::identity())
    }

    /// Dimensions as `[width, height, depth]`
    pub fn dimensions(&self) -> [usize; 3] {
        let (depth, height, width, _) = self.data.dim();
        [width, height, depth]
    }

    pub fn components(&self) -> usize {
        self.data.dim().3
    }

    pub fn voxel_count(&self) -> usize {
        let [width, height, depth] = self.dimensions();
        width * height * depth
    }

    pub fn spacing(&self) -> [f64; 3] {
        self.spacing
    }

    pub fn origin(&self) -> Point3<f64> {
        self.origin
    }

    pub fn direction(&self) -> &Matrix3<f64> {
        &self.direction
    }

    /// Get a reference to the underlying samples
    pub fn data(&self) -> &Array4<f32> {
        &self.data
    }

    /// First component of every voxel, shaped `(depth, height, width)`.
    pub fn scalars(&self) -> ArrayView3<'_, f32> {
        self.data.index_axis(Axis(3), 0)
    }

    /// Frame `index` (first component), or `None` if out of range.
    pub fn frame(&self, index: usize) -> Option<ArrayView2<'_, f32>> {
        if index >= self.data.dim().0 {
            return None;
        }
        Some(self.data.slice(s![index, .., .., 0]))
    }

    /// Range over every sample of every component.
    ///
    /// # Errors
    ///
    /// Returns [`WindowLevelError::EmptyRange`] when the image holds no samples.
    pub fn scalar_range(&self) -> Result<ScalarRange, WindowLevelError> {
        Self::range_of(self.data.as_slice_memory_order(), self.data.iter())
    }

    /// Range over the samples of frame `index`.
    pub fn slice_range(&self, index: usize) -> Result<ScalarRange, WindowLevelError> {
        if index >= self.data.dim().0 {
            return Err(WindowLevelError::EmptyRange);
        }
        let frame = self.data.slice(s![index, .., .., ..]);
        Self::range_of(frame.as_slice_memory_order(), frame.iter())
    }

    fn range_of<'a>(
        contiguous: Option<&'a [f32]>,
        fallback: impl Iterator<Item = &'a f32>,
    ) -> Result<ScalarRange, WindowLevelError> {
        let identity = || (f32::INFINITY, f32::NEG_INFINITY);
        let fold = |(lo, hi): (f32, f32), &v: &f32| (lo.min(v), hi.max(v));

        let (min, max) = match contiguous {
            Some(values) => values
                .par_iter()
                .fold(identity, fold)
                .reduce(identity, |a, b| (a.0.min(b.0), a.1.max(b.1))),
            None => fallback.fold(identity(), fold),
        };

        // Also covers arrays made only of NaN.
        if min > max {
            return Err(WindowLevelError::EmptyRange);
        }
        Ok(ScalarRange {
            min: min as f64,
            max: max as f64,
        })
    }

    /// Geometric center of the image in world coordinates.
    pub fn center(&self) -> Point3<f64> {
        let [width, height, depth] = self.dimensions();
        let half_extent = Vector3::new(
            width.saturating_sub(1) as f64 * self.spacing[0],
            height.saturating_sub(1) as f64 * self.spacing[1],
            depth.saturating_sub(1) as f64 * self.spacing[2],
        ) / 2.0;
        self.origin + self.direction * half_extent
    }
}
