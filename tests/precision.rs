/// Quantization and relative-to-center precision for far-from-origin geometry.
use instaclip::glam::{DMat4, DVec3, Vec3};
use instaclip::quantize::quantize_positions;
use instaclip::rtc::{plane_rtc_position, rtc_view_matrix, world_to_rtc_positions};
use instaclip_test_scenes::scene::unit_cube;
use instaclip_test_scenes::FAR_ORIGIN;

#[test]
fn cube_round_trips_within_one_step() {
    let (positions, _) = unit_cube();
    let quantized = quantize_positions(&positions);
    let tolerance = quantized.step() + Vec3::splat(1e-6);

    for (original, q) in positions.iter().zip(&quantized.positions) {
        let error = (quantized.decode(*q) - Vec3::from_array(*original)).abs();
        assert!(error.cmple(tolerance).all(), "{original:?} off by {error:?}");
    }
}

#[test]
fn rtc_plane_and_view_agree_with_world_space() {
    let center = FAR_ORIGIN;
    let world_point = FAR_ORIGIN + DVec3::new(3.0, -2.0, 1.5);
    let plane_position = FAR_ORIGIN + DVec3::new(1.0, 1.0, 1.0);
    let direction = DVec3::new(-1.0, -1.0, -1.0);
    let distance = -plane_position.dot(direction);

    // Which side of the plane a point lies on must not change in RTC space.
    let world_side = direction.dot(world_point - plane_position);
    let rtc_plane = plane_rtc_position(distance, direction, center);
    let rtc_side = direction.dot((world_point - center) - rtc_plane);
    assert!((world_side - rtc_side).abs() < 1e-6);

    let view = DMat4::look_at_rh(FAR_ORIGIN + DVec3::new(0.0, -40.0, 20.0), FAR_ORIGIN, DVec3::Z);
    let expected = view.transform_point3(world_point);
    let actual = rtc_view_matrix(&view, center).transform_point3(world_point - center);
    assert!((expected - actual).length() < 1e-6);
}

#[test]
fn rtc_offsets_fit_comfortably_in_f32() {
    let world: Vec<_> = (0..10)
        .map(|i| FAR_ORIGIN + DVec3::new(i as f64 * 0.001, 0.0, 0.0))
        .collect();
    let (center, relative) = world_to_rtc_positions(&world, 200.0);

    for (original, offset) in world.iter().zip(&relative) {
        let restored = center + Vec3::from_array(*offset).as_dvec3();
        assert!((restored - *original).length() < 1e-4);
    }
}
