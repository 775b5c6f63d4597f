//! Relative-to-center (RTC) coordinate helpers.
//!
//! Geometry far from the World origin loses precision once it is squeezed into
//! `f32`. Batches therefore store positions relative to a nearby anchor, and
//! every World-space quantity that meets those positions in a shader (the view
//! matrix, clip plane positions) is moved into the same anchor-relative frame
//! in `f64` before it is narrowed.

use glam::{DMat4, DVec3, DVec4};

/// Default cell size used to snap RTC centers, in World units.
pub const DEFAULT_RTC_CELL_SIZE: f64 = 200.0;

/// A point on the plane `dot(direction, p) + distance = 0`, expressed relative to `center`.
///
/// The result is the foot of the perpendicular from `center` onto the plane, so
/// its magnitude is the plane's distance from the anchor rather than from the
/// World origin.
pub fn plane_rtc_position(distance: f64, direction: DVec3, center: DVec3) -> DVec3 {
    let length = direction.length();
    if length == 0.0 {
        return -center;
    }
    let normal = direction / length;
    let center_to_plane = (direction.dot(center) + distance) / length;
    -normal * center_to_plane
}

/// Moves the view matrix's translation so it can be applied to vertices that are
/// relative to `center`.
pub fn rtc_view_matrix(view: &DMat4, center: DVec3) -> DMat4 {
    let center_in_view = view.transform_point3(center);
    let mut rtc_view = *view;
    rtc_view.w_axis = DVec4::new(
        center_in_view.x,
        center_in_view.y,
        center_in_view.z,
        view.w_axis.w,
    );
    rtc_view
}

/// Splits double-precision World positions into an RTC center and `f32` offsets.
///
/// The center is the middle of the positions' bounding box snapped to a grid of
/// `cell_size`, so neighbouring batches tend to share anchors.
pub fn world_to_rtc_positions(positions: &[DVec3], cell_size: f64) -> (DVec3, Vec<[f32; 3]>) {
    let Some(first) = positions.first() else {
        return (DVec3::ZERO, Vec::new());
    };

    let (min, max) = positions
        .iter()
        .fold((*first, *first), |(min, max), p| (min.min(*p), max.max(*p)));
    let middle = (min + max) * 0.5;
    let center = if cell_size > 0.0 {
        (middle / cell_size).round() * cell_size
    } else {
        middle
    };

    let relative = positions
        .iter()
        .map(|p| (*p - center).as_vec3().to_array())
        .collect();

    (center, relative)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rtc_plane_position_lies_on_the_original_plane() {
        let position = DVec3::new(1.0e7 + 3.25, -4.0e6, 12.5);
        let direction = DVec3::new(-1.0, -1.0, -1.0);
        let distance = -position.dot(direction);
        let center = DVec3::new(1.0e7, -4.0e6, 0.0);

        let rtc = plane_rtc_position(distance, direction, center);
        let world = rtc + center;

        let offset_from_plane = direction.normalize().dot(world - position);
        assert!(offset_from_plane.abs() < 1e-6, "off plane by {offset_from_plane}");
        assert!(rtc.length() < 100.0);
    }

    #[test]
    fn rtc_plane_position_with_origin_anchor_is_foot_of_perpendicular() {
        let rtc = plane_rtc_position(-5.0, DVec3::Z, DVec3::ZERO);
        assert_eq!(rtc, DVec3::new(0.0, 0.0, 5.0));
    }

    #[test]
    fn rtc_view_matrix_matches_world_view() {
        let view = DMat4::look_at_rh(
            DVec3::new(5.0e6, 5.0e6 + 10.0, 30.0),
            DVec3::new(5.0e6, 5.0e6, 0.0),
            DVec3::Y,
        );
        let center = DVec3::new(5.0e6, 5.0e6, 0.0);
        let rtc_view = rtc_view_matrix(&view, center);

        let relative = DVec3::new(1.5, -2.0, 0.25);
        let through_rtc = rtc_view.transform_point3(relative);
        let through_world = view.transform_point3(relative + center);
        assert!((through_rtc - through_world).length() < 1e-6);
    }

    #[test]
    fn world_positions_split_around_snapped_center() {
        let positions = [
            DVec3::new(1_000_010.0, 2_000_000.0, 5.0),
            DVec3::new(1_000_030.0, 2_000_040.0, 15.0),
        ];
        let (center, relative) = world_to_rtc_positions(&positions, DEFAULT_RTC_CELL_SIZE);

        assert_eq!(center, DVec3::new(1_000_000.0, 2_000_000.0, 0.0));
        assert_eq!(relative[0], [10.0, 0.0, 5.0]);
        assert_eq!(relative[1], [30.0, 40.0, 15.0]);
    }

    #[test]
    fn no_positions_means_origin_anchor() {
        let (center, relative) = world_to_rtc_positions(&[], DEFAULT_RTC_CELL_SIZE);
        assert_eq!(center, DVec3::ZERO);
        assert!(relative.is_empty());
    }
}
