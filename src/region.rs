//! Processing region derivation.
//!
//! The engine keeps its processing region axis-aligned in the chunk frame,
//! while the capture volume is defined once in reference-frame units. Each
//! sequence has its own estimated scale and orientation, so the canonical box
//! is re-expressed in the chunk frame after marker calibration.

use nalgebra::{Matrix3, Matrix4, Point3};

use crate::error::RegionError;
use crate::models::{CanonicalBox, Region};

/// Map the canonical box into the chunk frame of `scene_transform`.
///
/// `None` is treated as the identity transform, in which case the canonical
/// box is copied through unchanged.
///
/// # Errors
/// * `RegionError::DegenerateScale` if the first row of the rotation block has
///   zero or non-finite length
/// * `RegionError::Singular` if the transform has no inverse
pub fn compute_region(
    scene_transform: Option<&Matrix4<f64>>,
    canonical: &CanonicalBox,
) -> Result<Region, RegionError> {
    let transform = scene_transform.copied().unwrap_or_else(Matrix4::identity);

    let block: Matrix3<f64> = transform.fixed_view::<3, 3>(0, 0).into_owned();
    let scale = block.row(0).norm();
    if !scale.is_finite() || scale <= f64::EPSILON {
        return Err(RegionError::DegenerateScale(scale));
    }

    let rotation = block / scale;
    let size = canonical.size_vector() / scale;

    let inverse = transform.try_inverse().ok_or(RegionError::Singular)?;
    let center = inverse.transform_point(&Point3::from(canonical.center_vector()));

    Ok(Region {
        rotation: rotation.transpose(),
        size,
        center: center.coords,
    })
}
