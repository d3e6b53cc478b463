//! Pure calculation functions for image dimensions.
//!
//! All functions here are pure and testable without any I/O or images.

/// A rectangular region inside a source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Calculate the centered square crop for an image of the given size.
///
/// The side length is the shorter edge. The anchor is centered along the
/// longer axis, rounding the offset down.
///
/// # Examples
/// ```
/// # use photofeed::imaging::{CropRegion, square_crop_region};
/// // 200x100 landscape → 100x100 starting 50px in
/// assert_eq!(
///     square_crop_region(200, 100),
///     CropRegion { x: 50, y: 0, width: 100, height: 100 }
/// );
/// ```
pub fn square_crop_region(width: u32, height: u32) -> CropRegion {
    let side = width.min(height);

    let (x, y) = if width > height {
        ((width - height) / 2, 0)
    } else if height > width {
        (0, (height - width) / 2)
    } else {
        (0, 0)
    };

    CropRegion {
        x,
        y,
        width: side,
        height: side,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn landscape_is_centered_horizontally() {
        assert_eq!(
            square_crop_region(200, 100),
            CropRegion {
                x: 50,
                y: 0,
                width: 100,
                height: 100
            }
        );
    }

    #[test]
    fn portrait_is_centered_vertically() {
        assert_eq!(
            square_crop_region(100, 200),
            CropRegion {
                x: 0,
                y: 50,
                width: 100,
                height: 100
            }
        );
    }

    #[test]
    fn square_source_has_no_offset() {
        assert_eq!(
            square_crop_region(100, 100),
            CropRegion {
                x: 0,
                y: 0,
                width: 100,
                height: 100
            }
        );
    }

    #[test]
    fn odd_difference_rounds_down() {
        // (201 - 100) / 2 = 50.5 → 50
        let region = square_crop_region(201, 100);
        assert_eq!((region.x, region.y), (50, 0));
        assert_eq!((region.width, region.height), (100, 100));

        let region = square_crop_region(100, 203);
        assert_eq!((region.x, region.y), (0, 51));
    }

    #[test]
    fn crop_always_fits_inside_source() {
        for (w, h) in [(1, 1), (1, 9), (9, 1), (640, 480), (480, 640), (3, 2)] {
            let r = square_crop_region(w, h);
            assert_eq!(r.width, r.height);
            assert!(r.x + r.width <= w, "{w}x{h} overflows horizontally");
            assert!(r.y + r.height <= h, "{w}x{h} overflows vertically");
        }
    }
}
