//! Orientation correction.
//!
//! Decoded pixels are normalized to top-left orientation according to the
//! EXIF Orientation tag, after which the stored tag is reset so nothing
//! downstream corrects twice.
//!
//! Two strategies produce the same result:
//!
//! | Strategy | How |
//! |---|---|
//! | [`OrientStrategy::Library`] | `image::DynamicImage::apply_orientation` |
//! | [`OrientStrategy::Manual`] | the fixed [`correction_steps`] table |
//!
//! [`OrientStrategy::Auto`] runs a one-time probe comparing the library's
//! transform with the table on a small asymmetric image, and caches the
//! choice for the rest of the process.
//!
//! An undefined orientation (tag absent, zero, or out of range) is treated
//! as already normal and left alone.

use image::DynamicImage;
use image::metadata::Orientation;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// How orientation correction is performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrientStrategy {
    /// Probe once, prefer the library.
    #[default]
    Auto,
    Library,
    Manual,
}

/// A single geometric step of the manual table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    FlipHorizontal,
    FlipVertical,
    Rotate90,
    Rotate180,
    Rotate270,
}

/// Every orientation the tag can express, in EXIF order (1–8).
pub const ALL_ORIENTATIONS: [Orientation; 8] = [
    Orientation::NoTransforms,
    Orientation::FlipHorizontal,
    Orientation::Rotate180,
    Orientation::FlipVertical,
    Orientation::Rotate90FlipH,
    Orientation::Rotate90,
    Orientation::Rotate270FlipH,
    Orientation::Rotate270,
];

/// Steps that normalize a stored orientation, applied in order.
///
/// Rotations are clockwise.
pub fn correction_steps(orientation: Orientation) -> &'static [Transform] {
    use Transform::*;
    match orientation {
        Orientation::NoTransforms => &[],
        // 2: top-right
        Orientation::FlipHorizontal => &[FlipHorizontal],
        // 3: bottom-right
        Orientation::Rotate180 => &[Rotate180],
        // 4: bottom-left
        Orientation::FlipVertical => &[FlipVertical],
        // 5: left-top
        Orientation::Rotate90FlipH => &[FlipVertical, Rotate90],
        // 6: right-top
        Orientation::Rotate90 => &[Rotate90],
        // 7: right-bottom
        Orientation::Rotate270FlipH => &[FlipHorizontal, Rotate90],
        // 8: left-bottom
        Orientation::Rotate270 => &[Rotate270],
    }
}

pub fn apply_transform(image: &DynamicImage, transform: Transform) -> DynamicImage {
    match transform {
        Transform::FlipHorizontal => image.fliph(),
        Transform::FlipVertical => image.flipv(),
        Transform::Rotate90 => image.rotate90(),
        Transform::Rotate180 => image.rotate180(),
        Transform::Rotate270 => image.rotate270(),
    }
}

fn apply_manual(image: DynamicImage, orientation: Orientation) -> DynamicImage {
    correction_steps(orientation)
        .iter()
        .fold(image, |img, &step| apply_transform(&img, step))
}

fn apply_library(mut image: DynamicImage, orientation: Orientation) -> DynamicImage {
    image.apply_orientation(orientation);
    image
}

static PROBED: OnceLock<OrientStrategy> = OnceLock::new();

/// Resolve `Auto` to a concrete strategy. The probe runs at most once.
pub fn resolve(strategy: OrientStrategy) -> OrientStrategy {
    match strategy {
        OrientStrategy::Auto => *PROBED.get_or_init(probe_library),
        other => other,
    }
}

/// Check the library transform agrees with the table for every orientation.
fn probe_library() -> OrientStrategy {
    let sample = DynamicImage::ImageRgb8(image::RgbImage::from_fn(3, 2, |x, y| {
        image::Rgb([x as u8 * 60, y as u8 * 120, 9])
    }));
    let agrees = ALL_ORIENTATIONS.iter().all(|&orientation| {
        let library = apply_library(sample.clone(), orientation);
        let manual = apply_manual(sample.clone(), orientation);
        library.width() == manual.width()
            && library.height() == manual.height()
            && library.as_bytes() == manual.as_bytes()
    });
    let chosen = if agrees {
        OrientStrategy::Library
    } else {
        log::warn!("library orientation transform disagrees with the EXIF table, using manual");
        OrientStrategy::Manual
    };
    log::debug!("orientation strategy: {chosen:?}");
    chosen
}

/// Normalize `image` from `orientation` to top-left.
///
/// Returns the corrected image; the caller resets its stored tag to
/// [`Orientation::NoTransforms`].
pub fn normalize(
    image: DynamicImage,
    orientation: Orientation,
    strategy: OrientStrategy,
) -> DynamicImage {
    if orientation == Orientation::NoTransforms {
        return image;
    }
    match resolve(strategy) {
        OrientStrategy::Manual => apply_manual(image, orientation),
        _ => apply_library(image, orientation),
    }
}
