// raster.rs — 软件光栅化表面：仿射三角形贴图、折线描边

use glam::{DAffine2, DVec2};
use image::{Rgba, RgbaImage};

/// Signed-area threshold below which a triangle is treated as degenerate.
pub const DEGENERATE_AREA: f64 = 1e-6;

/// A 2D drawing target that can only do affine image blits and strokes.
///
/// This is the whole contract the mesh warp needs: every nonlinear projection is
/// expressed as many small affine triangle draws.
pub trait RasterSurface {
    fn size(&self) -> (u32, u32);

    fn fill(&mut self, color: Rgba<u8>);

    /// Draws `source` through `transform` (source px → surface px), clipped to `clip`.
    /// Returns `false` when nothing could be drawn.
    fn draw_image_triangle(
        &mut self,
        source: &RgbaImage,
        transform: &DAffine2,
        clip: &[DVec2; 3],
        opacity: f64,
    ) -> bool;

    fn stroke_polyline(&mut self, points: &[DVec2], closed: bool, color: Rgba<u8>, width: f64);
}

/// Closed-form affine map taking triangle `src` onto triangle `dst`.
/// `None` when `src` has (near) zero area.
pub fn solve_affine(src: &[DVec2; 3], dst: &[DVec2; 3]) -> Option<DAffine2> {
    let [s0, s1, s2] = *src;
    let [d0, d1, d2] = *dst;
    let den = s0.x * (s1.y - s2.y) + s1.x * (s2.y - s0.y) + s2.x * (s0.y - s1.y);
    if !den.is_finite() || den.abs() < DEGENERATE_AREA {
        return None;
    }

    let row = |a: f64, b: f64, c: f64| {
        let m1 = (a * (s1.y - s2.y) + b * (s2.y - s0.y) + c * (s0.y - s1.y)) / den;
        let m2 = (a * (s2.x - s1.x) + b * (s0.x - s2.x) + c * (s1.x - s0.x)) / den;
        let m3 = (a * (s1.x * s2.y - s2.x * s1.y)
            + b * (s2.x * s0.y - s0.x * s2.y)
            + c * (s0.x * s1.y - s1.x * s0.y))
            / den;
        (m1, m2, m3)
    };
    let (m11, m12, m13) = row(d0.x, d1.x, d2.x);
    let (m21, m22, m23) = row(d0.y, d1.y, d2.y);

    let t = DAffine2::from_cols(
        DVec2::new(m11, m21),
        DVec2::new(m12, m22),
        DVec2::new(m13, m23),
    );
    t.is_finite().then_some(t)
}

/// Twice the signed area of a triangle.
pub fn signed_area2(t: &[DVec2; 3]) -> f64 {
    (t[1] - t[0]).perp_dot(t[2] - t[0])
}

/// Moves every vertex `px` pixels outward from the centroid.
pub fn inflate_triangle(t: &[DVec2; 3], px: f64) -> [DVec2; 3] {
    if px <= 0.0 {
        return *t;
    }
    let c = (t[0] + t[1] + t[2]) / 3.0;
    t.map(|p| {
        let d = p - c;
        let len = d.length();
        if len > 1e-9 {
            p + d / len * px
        } else {
            p
        }
    })
}

fn inside_triangle(t: &[DVec2; 3], p: DVec2, orient: f64) -> bool {
    let e0 = (t[1] - t[0]).perp_dot(p - t[0]) * orient;
    let e1 = (t[2] - t[1]).perp_dot(p - t[1]) * orient;
    let e2 = (t[0] - t[2]).perp_dot(p - t[2]) * orient;
    e0 >= 0.0 && e1 >= 0.0 && e2 >= 0.0
}

/// Bilinear sample at source-pixel coordinates, edges clamped.
pub fn sample_bilinear(img: &RgbaImage, x: f64, y: f64) -> [f64; 4] {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return [0.0; 4];
    }
    let fx = (x - 0.5).clamp(0.0, f64::from(w - 1));
    let fy = (y - 0.5).clamp(0.0, f64::from(h - 1));
    let x0 = fx.floor() as u32;
    let y0 = fy.floor() as u32;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let tx = fx - f64::from(x0);
    let ty = fy - f64::from(y0);

    let p00 = img.get_pixel(x0, y0).0;
    let p10 = img.get_pixel(x1, y0).0;
    let p01 = img.get_pixel(x0, y1).0;
    let p11 = img.get_pixel(x1, y1).0;

    let mut out = [0.0; 4];
    for (i, o) in out.iter_mut().enumerate() {
        let top = f64::from(p00[i]) * (1.0 - tx) + f64::from(p10[i]) * tx;
        let bottom = f64::from(p01[i]) * (1.0 - tx) + f64::from(p11[i]) * tx;
        *o = top * (1.0 - ty) + bottom * ty;
    }
    out
}

/// Straight-alpha source-over.
pub(crate) fn blend_over(dst: &mut Rgba<u8>, src: [f64; 4], opacity: f64) {
    let sa = (src[3] / 255.0) * opacity;
    if sa <= 0.0 {
        return;
    }
    let da = f64::from(dst[3]) / 255.0;
    let oa = sa + da * (1.0 - sa);
    if oa <= 0.0 {
        return;
    }
    for i in 0..3 {
        let c = (src[i] * sa + f64::from(dst[i]) * da * (1.0 - sa)) / oa;
        dst[i] = c.round().clamp(0.0, 255.0) as u8;
    }
    dst[3] = (oa * 255.0).round().clamp(0.0, 255.0) as u8;
}

fn pixel_span(lo: f64, hi: f64, limit: u32) -> Option<(u32, u32)> {
    if !(lo.is_finite() && hi.is_finite()) || limit == 0 {
        return None;
    }
    let a = lo.floor().max(0.0);
    let b = hi.ceil().min(f64::from(limit));
    (a < b).then(|| (a as u32, b as u32))
}

impl RasterSurface for RgbaImage {
    fn size(&self) -> (u32, u32) {
        self.dimensions()
    }

    fn fill(&mut self, color: Rgba<u8>) {
        for p in self.pixels_mut() {
            *p = color;
        }
    }

    fn draw_image_triangle(
        &mut self,
        source: &RgbaImage,
        transform: &DAffine2,
        clip: &[DVec2; 3],
        opacity: f64,
    ) -> bool {
        if source.width() == 0 || source.height() == 0 || opacity <= 0.0 {
            return false;
        }
        let area = signed_area2(clip);
        if !area.is_finite() || area.abs() < DEGENERATE_AREA {
            return false;
        }
        let inv = transform.inverse();
        if !inv.is_finite() {
            return false;
        }
        let orient = area.signum();
        let opacity = opacity.min(1.0);

        let (w, h) = self.dimensions();
        let min = clip[0].min(clip[1]).min(clip[2]);
        let max = clip[0].max(clip[1]).max(clip[2]);
        let Some((x0, x1)) = pixel_span(min.x, max.x, w) else {
            return false;
        };
        let Some((y0, y1)) = pixel_span(min.y, max.y, h) else {
            return false;
        };

        for y in y0..y1 {
            for x in x0..x1 {
                let p = DVec2::new(f64::from(x) + 0.5, f64::from(y) + 0.5);
                if !inside_triangle(clip, p, orient) {
                    continue;
                }
                let s = inv.transform_point2(p);
                let c = sample_bilinear(source, s.x, s.y);
                blend_over(self.get_pixel_mut(x, y), c, opacity);
            }
        }
        true
    }

    fn stroke_polyline(&mut self, points: &[DVec2], closed: bool, color: Rgba<u8>, width: f64) {
        if points.len() < 2 {
            return;
        }
        let (w, h) = self.dimensions();
        let half = (width * 0.5).max(0.5);
        let src = [
            f64::from(color[0]),
            f64::from(color[1]),
            f64::from(color[2]),
            f64::from(color[3]),
        ];
        let n = points.len();
        let segs = if closed { n } else { n - 1 };
        for i in 0..segs {
            let a = points[i];
            let b = points[(i + 1) % n];
            if !(a.is_finite() && b.is_finite()) {
                continue;
            }
            let Some((x0, x1)) = pixel_span(a.x.min(b.x) - half, a.x.max(b.x) + half, w) else {
                continue;
            };
            let Some((y0, y1)) = pixel_span(a.y.min(b.y) - half, a.y.max(b.y) + half, h) else {
                continue;
            };
            let ab = b - a;
            let len2 = ab.length_squared();
            for y in y0..y1 {
                for x in x0..x1 {
                    let p = DVec2::new(f64::from(x) + 0.5, f64::from(y) + 0.5);
                    let t = if len2 > 0.0 { ((p - a).dot(ab) / len2).clamp(0.0, 1.0) } else { 0.0 };
                    let d = p.distance(a + ab * t);
                    // 一像素宽的边缘抗锯齿
                    let cover = (half + 0.5 - d).clamp(0.0, 1.0);
                    if cover > 0.0 {
                        blend_over(self.get_pixel_mut(x, y), src, cover);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn affine_maps_source_vertices_onto_destination() {
        let src = [DVec2::new(0.0, 0.0), DVec2::new(10.0, 0.0), DVec2::new(0.0, 5.0)];
        let dst = [DVec2::new(3.0, 4.0), DVec2::new(23.0, 6.0), DVec2::new(1.0, 19.0)];
        let t = solve_affine(&src, &dst).unwrap();
        for (s, d) in src.iter().zip(dst.iter()) {
            let p = t.transform_point2(*s);
            assert_abs_diff_eq!(p.x, d.x, epsilon = 1e-9);
            assert_abs_diff_eq!(p.y, d.y, epsilon = 1e-9);
        }
    }

    #[test]
    fn collinear_source_is_degenerate() {
        let src = [DVec2::ZERO, DVec2::new(1.0, 1.0), DVec2::new(2.0, 2.0)];
        assert!(solve_affine(&src, &src).is_none());
    }

    #[test]
    fn inflation_pushes_vertices_outward() {
        let t = [DVec2::new(0.0, 0.0), DVec2::new(9.0, 0.0), DVec2::new(0.0, 9.0)];
        let big = inflate_triangle(&t, 0.45);
        assert!(signed_area2(&big).abs() > signed_area2(&t).abs());
        assert_eq!(inflate_triangle(&t, 0.0), t);
    }

    #[test]
    fn triangle_blit_copies_opaque_pixels() {
        let src = RgbaImage::from_pixel(4, 4, Rgba([200, 10, 10, 255]));
        let mut dst = RgbaImage::from_pixel(8, 8, Rgba([0, 0, 0, 255]));
        let clip = [DVec2::new(0.0, 0.0), DVec2::new(8.0, 0.0), DVec2::new(0.0, 8.0)];
        let t = DAffine2::from_scale(DVec2::splat(2.0));
        assert!(dst.draw_image_triangle(&src, &t, &clip, 1.0));
        assert_eq!(dst.get_pixel(1, 1).0, [200, 10, 10, 255]);
        assert_eq!(dst.get_pixel(7, 7).0, [0, 0, 0, 255]);
    }

    #[test]
    fn half_opacity_blends() {
        let src = RgbaImage::from_pixel(2, 2, Rgba([255, 255, 255, 255]));
        let mut dst = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255]));
        let clip = [DVec2::new(-1.0, -1.0), DVec2::new(10.0, -1.0), DVec2::new(-1.0, 10.0)];
        dst.draw_image_triangle(&src, &DAffine2::IDENTITY, &clip, 0.5);
        let v = dst.get_pixel(0, 0)[0];
        assert!((126..=129).contains(&v));
    }

    #[test]
    fn stroke_touches_pixels_on_the_line() {
        let mut img = RgbaImage::new(10, 10);
        img.stroke_polyline(&[DVec2::new(0.0, 5.0), DVec2::new(10.0, 5.0)], false, Rgba([0, 255, 0, 255]), 2.0);
        assert_eq!(img.get_pixel(5, 4)[1], 255);
        assert_eq!(img.get_pixel(5, 0)[3], 0);
    }
}
