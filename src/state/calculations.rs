//! Pure argument checks shared by every backend.
//!
//! All functions here are pure and testable without any codec.

use super::backend::StateError;
use super::params::{ChannelOrder, Rect, Size};

/// Byte length of a tightly packed buffer, or `None` on overflow.
pub fn buffer_len(size: Size, order: ChannelOrder) -> Option<usize> {
    (size.width as usize)
        .checked_mul(size.height as usize)?
        .checked_mul(order.bytes_per_pixel())
}

/// Check a crop rectangle against the image size and return the cropped size.
///
/// Requires `left < right <= width` and `top < bottom <= height`. Nothing is
/// clamped: an out-of-range rectangle is an error.
///
/// # Examples
/// ```
/// # use pixgraph::state::{Rect, Size, validate_crop};
/// let cropped = validate_crop(Rect::new(10, 0, 30, 5), Size::new(40, 20)).unwrap();
/// assert_eq!(cropped, Size::new(20, 5));
///
/// assert!(validate_crop(Rect::new(0, 0, 41, 5), Size::new(40, 20)).is_err());
/// ```
pub fn validate_crop(rect: Rect, size: Size) -> Result<Size, StateError> {
    let invalid = |message: String| StateError::InvalidArgument {
        operation: "crop",
        message,
    };
    if rect.left >= rect.right {
        return Err(invalid(format!(
            "left ({}) must be less than right ({})",
            rect.left, rect.right
        )));
    }
    if rect.top >= rect.bottom {
        return Err(invalid(format!(
            "top ({}) must be less than bottom ({})",
            rect.top, rect.bottom
        )));
    }
    if rect.right > size.width || rect.bottom > size.height {
        return Err(invalid(format!("rectangle {rect} exceeds image {size}")));
    }
    Ok(Size::new(rect.right - rect.left, rect.bottom - rect.top))
}

/// Reject zero-sized resize targets.
pub fn validate_resize(size: Size) -> Result<Size, StateError> {
    if size.width == 0 || size.height == 0 {
        return Err(StateError::InvalidArgument {
            operation: "resize",
            message: format!("target {size} has a zero dimension"),
        });
    }
    Ok(size)
}
