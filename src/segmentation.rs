use nalgebra::{Matrix3, Point3};
use ndarray::{Array3, ArrayView2, Axis, Zip};
use tracing::debug;

use crate::volume::Image;

/// Label identifier; 0 means unlabelled.
pub type LabelId = u8;

pub const UNLABELED: LabelId = 0;

/// Assigns `label` to every voxel in `lower..upper`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdRule {
    pub label: LabelId,
    pub lower: f64,
    pub upper: f64,
}

impl ThresholdRule {
    pub fn new(label: LabelId, lower: f64, upper: f64) -> Self {
        Self {
            label,
            lower,
            upper,
        }
    }

    #[inline]
    pub fn contains(&self, value: f64) -> bool {
        self.lower <= value && value < self.upper
    }
}

/// Per-voxel labels aligned with a background image.
#[derive(Debug, Clone)]
pub struct LabelVolume {
    labels: Array3<LabelId>,
    spacing: [f64; 3],
    origin: Point3<f64>,
    direction: Matrix3<f64>,
}

impl LabelVolume {
    /// All-zero volume sharing the geometry of `background`.
    pub fn for_image(background: &Image) -> Self {
        Self {
            labels: Array3::zeros(background.scalars().raw_dim()),
            spacing: background.spacing(),
            origin: background.origin(),
            direction: *background.direction(),
        }
    }

    /// Labels shaped `(depth, height, width)`
    pub fn labels(&self) -> &Array3<LabelId> {
        &self.labels
    }

    pub fn dimensions(&self) -> [usize; 3] {
        let (depth, height, width) = self.labels.dim();
        [width, height, depth]
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

    pub fn frame(&self, index: usize) -> Option<ArrayView2<'_, LabelId>> {
        (index < self.labels.dim().0).then(|| self.labels.index_axis(Axis(0), index))
    }

    pub fn count(&self, label: LabelId) -> usize {
        self.labels.iter().filter(|&&l| l == label).count()
    }
}

/// Applies threshold rules in the order given.
///
/// Each rule rewrites every voxel in its range before the next rule runs, so
/// where ranges overlap the later rule wins. The order is part of the
/// contract; do not reorder rules by range width or anything else.
#[derive(Debug, Clone, Default)]
pub struct SegmentationClassifier {
    rules: Vec<ThresholdRule>,
}

impl SegmentationClassifier {
    pub fn new(rules: Vec<ThresholdRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[ThresholdRule] {
        &self.rules
    }

    /// Classify the first component of `background` into a fresh label volume.
    pub fn classify(&self, background: &Image) -> LabelVolume {
        let mut volume = LabelVolume::for_image(background);
        let scalars = background.scalars();

        for rule in &self.rules {
            Zip::from(&mut volume.labels)
                .and(&scalars)
                .par_for_each(|label, &value| {
                    if rule.contains(value as f64) {
                        *label = rule.label;
                    }
                });
        }

        for rule in &self.rules {
            debug!(
                label = rule.label,
                lower = rule.lower,
                upper = rule.upper,
                voxels = volume.count(rule.label),
                "Classified"
            );
        }
        volume
    }
}
