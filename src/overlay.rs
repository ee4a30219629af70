// overlay.rs — 叠加层：经纬网格、贴纸轮廓、占位框、选中手柄

use glam::DVec2;
use image::Rgba;

use crate::camera::Projector;
use crate::math::yaw_pitch_to_dir;
use crate::raster::RasterSurface;
use crate::sticker::{boundary_points, Placement, ScreenGeometry};

pub const GRID_COLOR: Rgba<u8> = Rgba([255, 255, 255, 56]);
pub const SELECTION_COLOR: Rgba<u8> = Rgba([74, 163, 255, 255]);
pub const PLACEHOLDER_COLOR: Rgba<u8> = Rgba([150, 150, 150, 220]);
pub const CUTOUT_COLOR: Rgba<u8> = Rgba([255, 204, 0, 255]);

const HANDLE_HALF: f64 = 4.0;

// 网格间距（度）
const LAT_STEP: i32 = 15;
const LON_STEP: i32 = 45;

/// Pushes runs of projected points, breaking a run wherever a point is not visible
/// or jumps further than `max_jump`.
fn stroke_runs<S, I>(surface: &mut S, projector: &Projector, dirs: I, color: Rgba<u8>, max_jump: f64)
where
    S: RasterSurface + ?Sized,
    I: IntoIterator<Item = glam::DVec3>,
{
    let mut run: Vec<DVec2> = Vec::new();
    for d in dirs {
        let prev_x = run.last().map(|p| p.x);
        match projector.project(d, prev_x) {
            Some(p) if run.last().map_or(true, |q| q.distance(p) <= max_jump) => run.push(p),
            Some(p) => {
                if run.len() > 1 {
                    surface.stroke_polyline(&run, false, color, 1.0);
                }
                run.clear();
                run.push(p);
            }
            None => {
                if run.len() > 1 {
                    surface.stroke_polyline(&run, false, color, 1.0);
                }
                run.clear();
            }
        }
    }
    if run.len() > 1 {
        surface.stroke_polyline(&run, false, color, 1.0);
    }
}

/// Orientation grid: parallels every 15°, meridians every 45°.
pub fn draw_sphere_grid<S: RasterSurface + ?Sized>(surface: &mut S, projector: &Projector) {
    let r = projector.rect();
    let max_jump = r.w.max(r.h) * 0.5;
    for lat in (-90 + LAT_STEP..90).step_by(LAT_STEP as usize) {
        let dirs = (-180..=180).step_by(3).map(|lon| yaw_pitch_to_dir(f64::from(lon), f64::from(lat)));
        stroke_runs(surface, projector, dirs, GRID_COLOR, max_jump);
    }
    for lon in (-180..180).step_by(LON_STEP as usize) {
        let dirs = (-88..=88).step_by(4).map(|lat| yaw_pitch_to_dir(f64::from(lon), f64::from(lat)));
        stroke_runs(surface, projector, dirs, GRID_COLOR, max_jump);
    }
}

pub fn draw_outline<S, P>(surface: &mut S, p: &P, projector: &Projector, color: Rgba<u8>, width: f64)
where
    S: RasterSurface + ?Sized,
    P: Placement + ?Sized,
{
    let steps = match projector {
        Projector::Perspective { .. } => 28,
        Projector::Unwrap { .. } => 20,
    };
    let pts = boundary_points(p, projector, steps);
    if pts.len() > 2 {
        surface.stroke_polyline(&pts, true, color, width);
    }
}

/// Outline plus diagonals, for a sticker whose bitmap is not available.
pub fn draw_placeholder<S, P>(surface: &mut S, p: &P, projector: &Projector)
where
    S: RasterSurface + ?Sized,
    P: Placement + ?Sized,
{
    draw_outline(surface, p, projector, PLACEHOLDER_COLOR, 1.5);
    if let Some(g) = ScreenGeometry::of(p, projector) {
        surface.stroke_polyline(&[g.corners[0], g.corners[2]], false, PLACEHOLDER_COLOR, 1.0);
        surface.stroke_polyline(&[g.corners[1], g.corners[3]], false, PLACEHOLDER_COLOR, 1.0);
    }
}

fn square(c: DVec2) -> [DVec2; 4] {
    let h = HANDLE_HALF;
    [c + DVec2::new(-h, -h), c + DVec2::new(h, -h), c + DVec2::new(h, h), c + DVec2::new(-h, h)]
}

pub fn draw_handles<S: RasterSurface + ?Sized>(surface: &mut S, g: &ScreenGeometry, with_edges: bool, color: Rgba<u8>) {
    for c in g.corners {
        surface.stroke_polyline(&square(c), true, color, 1.5);
    }
    if with_edges {
        for m in g.edge_midpoints {
            surface.stroke_polyline(&square(m), true, color, 1.0);
        }
    }
    surface.stroke_polyline(&[g.rotate_stem_base, g.rotate_handle], false, color, 1.0);
    let ring: Vec<DVec2> = (0..12)
        .map(|i| {
            let a = f64::from(i) / 12.0 * std::f64::consts::TAU;
            g.rotate_handle + DVec2::new(a.cos(), a.sin()) * 6.0
        })
        .collect();
    surface.stroke_polyline(&ring, true, color, 1.5);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{Basis, FovAxis, Rect, Viewport};
    use crate::state::Sticker;
    use image::RgbaImage;

    fn touched(img: &RgbaImage) -> usize {
        img.pixels().filter(|p| p[3] > 0).count()
    }

    #[test]
    fn grid_draws_in_both_projections() {
        let mut a = RgbaImage::new(200, 100);
        draw_sphere_grid(&mut a, &Projector::Unwrap { rect: Rect::new(0.0, 0.0, 200.0, 100.0) });
        assert!(touched(&a) > 0);

        let mut b = RgbaImage::new(160, 120);
        let proj = Projector::Perspective {
            basis: Basis::new(0.0, 0.0, 0.0),
            viewport: Viewport::from_fov(Rect::new(0.0, 0.0, 160.0, 120.0), 100.0, FovAxis::Horizontal),
        };
        draw_sphere_grid(&mut b, &proj);
        // 赤道附近的纬线 15° 必然可见
        assert!(touched(&b) > 0);
    }

    #[test]
    fn placeholder_marks_the_patch() {
        let s = Sticker {
            id: "s".into(),
            asset_id: "gone".into(),
            yaw_deg: 0.0,
            pitch_deg: 0.0,
            hfov_deg: 40.0,
            vfov_deg: 30.0,
            rot_deg: 0.0,
            crop: None,
            z_index: 0,
        };
        let mut img = RgbaImage::new(200, 150);
        let proj = Projector::Perspective {
            basis: Basis::new(0.0, 0.0, 0.0),
            viewport: Viewport::from_fov(Rect::new(0.0, 0.0, 200.0, 150.0), 90.0, FovAxis::Horizontal),
        };
        draw_placeholder(&mut img, &s, &proj);
        // 对角线穿过中心
        assert!(img.get_pixel(100, 75)[3] > 0);
    }
}
