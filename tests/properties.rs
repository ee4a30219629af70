// properties.rs — 投影与文档不变量的性质测试

use glam::DVec2;
use proptest::prelude::*;

use pano_suite::camera::{project, unproject};
use pano_suite::cutout::{parse_ratio, ratio_label};
use pano_suite::equirect::{dir_to_lon_lat, dir_to_uv, lon_lat_to_dir, uv_to_lon_lat};
use pano_suite::math::{dir_to_yaw_pitch, shortest_yaw_delta, wrap_yaw, yaw_pitch_to_dir};
use pano_suite::raster::solve_affine;
use pano_suite::sticker::Frame;
use pano_suite::{Basis, EditorState, FovAxis, Rect, Viewport};

fn yaw_close(a: f64, b: f64, eps: f64) -> bool {
    shortest_yaw_delta(a, b).abs() < eps
}

proptest! {
    #[test]
    fn wrapped_yaw_stays_in_half_open_range(yaw in -1.0e5f64..1.0e5) {
        let w = wrap_yaw(yaw);
        prop_assert!(w > -180.0 && w <= 180.0);
        let turns = (yaw - w) / 360.0;
        prop_assert!((turns - turns.round()).abs() < 1e-6);
    }

    #[test]
    fn shortest_delta_lands_on_target(from in -720.0f64..720.0, to in -720.0f64..720.0) {
        let d = shortest_yaw_delta(from, to);
        prop_assert!((-180.0..=180.0).contains(&d));
        prop_assert!(yaw_close(from + d, to, 1e-6));
    }

    #[test]
    fn yaw_pitch_round_trips(yaw in -179.0f64..180.0, pitch in -85.0f64..85.0) {
        let (y, p) = dir_to_yaw_pitch(yaw_pitch_to_dir(yaw, pitch));
        prop_assert!(yaw_close(y, yaw, 1e-6));
        prop_assert!((p - pitch).abs() < 1e-6);
    }

    #[test]
    fn equirect_coordinates_stay_on_the_image(yaw in -360.0f64..360.0, pitch in -90.0f64..90.0) {
        let uv = dir_to_uv(yaw_pitch_to_dir(yaw, pitch), 2048.0, 1024.0);
        prop_assert!(uv.x >= 0.0 && uv.x < 2048.0);
        prop_assert!(uv.y >= -1e-9 && uv.y <= 1024.0 + 1e-9);
    }

    #[test]
    fn pixel_coordinates_lead_back_to_the_direction(yaw in -180.0f64..180.0, pitch in -89.9f64..89.9) {
        let d = yaw_pitch_to_dir(yaw, pitch);
        let uv = dir_to_uv(d, 2048.0, 1024.0);
        let ll = uv_to_lon_lat(uv, 2048.0, 1024.0);
        prop_assert!((ll.lat - dir_to_lon_lat(d).lat).abs() < 1e-9);
        prop_assert!(lon_lat_to_dir(ll).distance(d) < 1e-9);
    }

    #[test]
    fn basis_is_orthonormal(yaw in -180.0f64..180.0, pitch in -89.9f64..89.9, roll in -180.0f64..180.0) {
        let b = Basis::new(yaw, pitch, roll);
        for v in [b.forward, b.right, b.up] {
            prop_assert!((v.length() - 1.0).abs() < 1e-9);
        }
        prop_assert!(b.forward.dot(b.right).abs() < 1e-9);
        prop_assert!(b.forward.dot(b.up).abs() < 1e-9);
        prop_assert!(b.right.dot(b.up).abs() < 1e-9);
    }

    #[test]
    fn unproject_then_project_is_identity(
        yaw in -180.0f64..180.0,
        pitch in -80.0f64..80.0,
        roll in -45.0f64..45.0,
        fov in 35.0f64..140.0,
        x in 0.0f64..640.0,
        y in 0.0f64..480.0,
    ) {
        let basis = Basis::new(yaw, pitch, roll);
        let viewport = Viewport::from_fov(Rect::new(0.0, 0.0, 640.0, 480.0), fov, FovAxis::Horizontal);
        let p = DVec2::new(x, y);
        let back = project(unproject(p, &basis, &viewport), &basis, &viewport);
        prop_assert!(back.is_some());
        prop_assert!(back.unwrap().distance(p) < 1e-6);
    }

    #[test]
    fn affine_maps_triangle_vertices(
        pts in proptest::array::uniform6(-500.0f64..500.0),
        dst in proptest::array::uniform6(-500.0f64..500.0),
    ) {
        let src = [DVec2::new(pts[0], pts[1]), DVec2::new(pts[2], pts[3]), DVec2::new(pts[4], pts[5])];
        let dst = [DVec2::new(dst[0], dst[1]), DVec2::new(dst[2], dst[3]), DVec2::new(dst[4], dst[5])];
        let area = (src[1] - src[0]).perp_dot(src[2] - src[0]).abs();
        prop_assume!(area > 1.0);
        let m = solve_affine(&src, &dst).unwrap();
        for (s, d) in src.iter().zip(dst.iter()) {
            prop_assert!(m.transform_point2(*s).distance(*d) < 1e-6 * (1.0 + d.length()));
        }
    }

    #[test]
    fn frame_center_is_the_placement_direction(
        yaw in -180.0f64..180.0,
        pitch in -89.0f64..89.0,
        roll in -180.0f64..180.0,
        h in 1.0f64..170.0,
        v in 1.0f64..170.0,
    ) {
        let f = Frame::new(yaw, pitch, roll, h, v);
        prop_assert!(f.direction(0.0, 0.0).distance(yaw_pitch_to_dir(yaw, pitch)) < 1e-9);
        // 四角关于中心对称
        let c = f.corner_directions();
        let center = yaw_pitch_to_dir(yaw, pitch);
        prop_assert!((c[0].dot(center) - c[2].dot(center)).abs() < 1e-9);
        prop_assert!((c[1].dot(center) - c[3].dot(center)).abs() < 1e-9);
    }

    #[test]
    fn ratio_labels_are_reduced(w in 1u32..500, h in 1u32..500) {
        let label = ratio_label(f64::from(w), f64::from(h));
        let (a, b) = parse_ratio(&label).unwrap();
        prop_assert!((a / b - f64::from(w) / f64::from(h)).abs() < 1e-9);
        let (a, b) = (a as u64, b as u64);
        let gcd = (1..=a.min(b)).rev().find(|d| a % d == 0 && b % d == 0).unwrap();
        prop_assert_eq!(gcd, 1);
    }

    #[test]
    fn z_order_stays_a_dense_permutation(ops in proptest::collection::vec((0u8..3, 0usize..8), 1..24)) {
        let mut s = EditorState::default();
        let mut ids = Vec::new();
        for (op, pick) in ops {
            match op {
                0 => ids.push(s.add_sticker("a", (10, 10), 0.0, 0.0)),
                1 if !ids.is_empty() => {
                    s.bring_to_front(&ids[pick % ids.len()]);
                }
                2 if !ids.is_empty() => {
                    s.send_to_back(&ids[pick % ids.len()]);
                }
                _ => {}
            }
            let mut z: Vec<u32> = s.stickers.iter().map(|st| st.z_index).collect();
            z.sort_unstable();
            prop_assert_eq!(z, (0..s.stickers.len() as u32).collect::<Vec<_>>());
        }
    }

    #[test]
    fn arbitrary_text_never_breaks_the_document(text in ".{0,64}") {
        let s = EditorState::from_json_str(&text);
        prop_assert!(s.output_preset >= 8);
        prop_assert!(s.bg_color.starts_with('#'));
    }
}
