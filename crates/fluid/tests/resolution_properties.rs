//! Property tests for the grid-resolution rules. Pure CPU math, no GPU
//! required.

use fluid::gpu::surface::resolve_resolution;
use proptest::prelude::*;

proptest! {
    /// The shorter grid axis always carries exactly the base resolution.
    #[test]
    fn short_axis_equals_base(
        base in 16u32..=1024,
        width in 1u32..=8192,
        height in 1u32..=8192,
    ) {
        let r = resolve_resolution(base, width, height);
        prop_assert_eq!(r.width.min(r.height), base);
    }

    /// The longer grid axis follows the longer screen axis.
    #[test]
    fn orientation_follows_screen(
        base in 16u32..=1024,
        width in 1u32..=8192,
        height in 1u32..=8192,
    ) {
        let r = resolve_resolution(base, width, height);
        if width > height {
            prop_assert!(r.width >= r.height);
        } else if height > width {
            prop_assert!(r.height >= r.width);
        } else {
            prop_assert_eq!(r.width, r.height);
        }
    }

    /// Grid aspect tracks screen aspect to within one texel of rounding.
    #[test]
    fn aspect_is_preserved(
        base in 16u32..=1024,
        width in 64u32..=8192,
        height in 64u32..=8192,
    ) {
        let r = resolve_resolution(base, width, height);
        let mut screen_aspect = width as f32 / height as f32;
        if screen_aspect < 1.0 {
            screen_aspect = 1.0 / screen_aspect;
        }
        let grid_aspect = r.width.max(r.height) as f32 / base as f32;
        prop_assert!((grid_aspect - screen_aspect).abs() <= 1.0 / base as f32);
    }

    /// Swapping screen axes transposes the grid.
    #[test]
    fn transpose_symmetry(
        base in 16u32..=1024,
        width in 1u32..=8192,
        height in 1u32..=8192,
    ) {
        let a = resolve_resolution(base, width, height);
        let b = resolve_resolution(base, height, width);
        prop_assert_eq!(a.width.max(a.height), b.width.max(b.height));
        prop_assert_eq!(a.width.min(a.height), b.width.min(b.height));
    }
}
