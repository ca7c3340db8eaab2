use nalgebra::{Matrix3, Point3, Vector3};
use thiserror::Error;

use crate::volume::Image;

#[derive(Debug, Error, PartialEq)]
pub enum GeometryError {
    #[error("Image carries no direction information")]
    MissingDirection,

    #[error("Direction matrix is not orthonormal (deviation {deviation:.3e})")]
    NotOrthonormal { deviation: f64 },

    #[error("Image orientation vectors are degenerate")]
    DegenerateOrientation,
}

/// Slicing axis in index space.
pub const SLICE_NORMAL: Vector3<f64> = Vector3::new(0.0, 0.0, 1.0);
/// Screen up in index space; rows grow downwards.
pub const VIEW_UP: Vector3<f64> = Vector3::new(0.0, -1.0, 0.0);

/// Camera parameters derived once per loaded stack.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub normal: Vector3<f64>,
    pub view_up: Vector3<f64>,
    pub focal_point: Point3<f64>,
    pub position: Point3<f64>,
}

impl Camera {
    /// Orient the camera along the reference image's slicing axis and aim it
    /// at the image center. The camera sits one unit behind the focal point.
    pub fn for_image(reference: &Image, tolerance: f64) -> Result<Self, GeometryError> {
        let (normal, view_up) = resolve_orientation(reference.direction(), tolerance)?;
        let focal_point = reference.center();
        Ok(Self {
            normal,
            view_up,
            focal_point,
            position: focal_point - normal,
        })
    }
}

/// Map the slicing normal and view-up through the direction matrix.
///
/// No renormalization takes place, so the matrix has to be orthonormal
/// within `tolerance` (largest absolute entry of `DᵀD − I`).
pub fn resolve_orientation(
    direction: &Matrix3<f64>,
    tolerance: f64,
) -> Result<(Vector3<f64>, Vector3<f64>), GeometryError> {
    let deviation = orthonormal_deviation(direction);
    if !(deviation <= tolerance) {
        return Err(GeometryError::NotOrthonormal { deviation });
    }
    Ok((direction * SLICE_NORMAL, direction * VIEW_UP))
}

fn orthonormal_deviation(direction: &Matrix3<f64>) -> f64 {
    // NaN must survive the fold so it fails the tolerance check.
    (direction.transpose() * direction - Matrix3::identity())
        .iter()
        .fold(0.0, |max: f64, v| {
            if v.is_nan() || v.abs() > max {
                v.abs()
            } else {
                max
            }
        })
}

/// Build a direction matrix from the six DICOM row/column direction cosines.
/// The third column is their cross product.
pub fn direction_from_cosines(cosines: &[f64]) -> Result<Matrix3<f64>, GeometryError> {
    let [rx, ry, rz, cx, cy, cz] = cosines else {
        return Err(GeometryError::MissingDirection);
    };
    let row = Vector3::new(*rx, *ry, *rz);
    let column = Vector3::new(*cx, *cy, *cz);
    let normal = row.cross(&column);
    if normal.norm() < f64::EPSILON {
        return Err(GeometryError::DegenerateOrientation);
    }
    Ok(Matrix3::from_columns(&[row, column, normal]))
}
