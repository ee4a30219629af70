// equirect.rs — 等距柱状投影坐标映射与接缝处理

use std::f64::consts::{PI, TAU};

use glam::{DVec2, DVec3};
use image::{GenericImage, RgbaImage};

use crate::camera::Rect;
use crate::math::clamp;

/// Longitude/latitude in radians. Longitude 0 is +Z, +π/2 is +X.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LonLat {
    pub lon: f64,
    pub lat: f64,
}

pub fn dir_to_lon_lat(d: DVec3) -> LonLat {
    LonLat {
        lon: d.x.atan2(d.z),
        lat: clamp(d.y, -1.0, 1.0).asin(),
    }
}

pub fn lon_lat_to_dir(ll: LonLat) -> DVec3 {
    let cl = ll.lat.cos();
    DVec3::new(cl * ll.lon.sin(), ll.lat.sin(), cl * ll.lon.cos())
}

/// Source pixel coordinates on a `w × h` equirectangular image; `u` wraps into `[0, w)`.
pub fn lon_lat_to_uv(ll: LonLat, w: f64, h: f64) -> DVec2 {
    let mut u = (ll.lon / TAU + 0.5) * w;
    if w > 0.0 {
        u = u.rem_euclid(w);
        // rem_euclid can round up to exactly w for tiny negative inputs
        if u >= w {
            u = 0.0;
        }
    }
    DVec2::new(u, (0.5 - ll.lat / PI) * h)
}

pub fn uv_to_lon_lat(uv: DVec2, w: f64, h: f64) -> LonLat {
    LonLat {
        lon: (uv.x / w - 0.5) * TAU,
        lat: (0.5 - uv.y / h) * PI,
    }
}

pub fn dir_to_uv(d: DVec3, w: f64, h: f64) -> DVec2 {
    lon_lat_to_uv(dir_to_lon_lat(d), w, h)
}

/// Shifts the low-side samples of a cell by +`w` when its U values straddle the seam,
/// so every vertex samples from one contiguous copy of a horizontally duplicated source.
pub fn unwrap_seam(samples: &mut [DVec2], w: f64) {
    let (lo, hi) = samples
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), s| (lo.min(s.x), hi.max(s.x)));
    if hi - lo > w * 0.5 {
        for s in samples.iter_mut() {
            if s.x < w * 0.5 {
                s.x += w;
            }
        }
    }
}

/// The 2:1 region of a canvas that shows the flat (unwrapped) panorama.
pub fn unwrap_rect(canvas_w: f64, canvas_h: f64) -> Rect {
    let w = canvas_w.max(1.0);
    let h = canvas_h.max(1.0);
    if w / h >= 2.0 {
        let rw = h * 2.0;
        Rect::new((w - rw) * 0.5, 0.0, rw, h)
    } else {
        let rh = w / 2.0;
        Rect::new(0.0, (h - rh) * 0.5, w, rh)
    }
}

/// Direction → point in the unwrap rect. With `ref_x` the result is moved by whole
/// widths to lie within half a width of it, keeping seam-crossing shapes contiguous.
pub fn project_unwrap(d: DVec3, rect: &Rect, ref_x: Option<f64>) -> DVec2 {
    let ll = dir_to_lon_lat(d);
    let mut x = rect.x + (ll.lon / TAU + 0.5) * rect.w;
    let y = rect.y + (0.5 - ll.lat / PI) * rect.h;
    if let Some(r) = ref_x {
        if rect.w > 0.0 {
            let half = rect.w * 0.5;
            while x - r > half {
                x -= rect.w;
            }
            while x - r < -half {
                x += rect.w;
            }
        }
    }
    DVec2::new(x, y)
}

/// Point in the unwrap rect → (yaw, pitch) degrees; clamped to the rect.
pub fn unproject_unwrap(p: DVec2, rect: &Rect) -> (f64, f64) {
    let nx = clamp((p.x - rect.x) / rect.w.max(1.0), 0.0, 1.0);
    let ny = clamp((p.y - rect.y) / rect.h.max(1.0), 0.0, 1.0);
    (
        crate::math::wrap_yaw(nx * 360.0 - 180.0),
        crate::math::clamp_pitch(90.0 - ny * 180.0),
    )
}

/// Identity of a source bitmap for cache invalidation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceKey {
    pub identity: String,
    pub width: u32,
    pub height: u32,
}

/// Owns the horizontally duplicated (2w × h) copy of a panorama used by seam-safe warps.
#[derive(Debug, Default)]
pub struct WrappedErpCache {
    key: Option<SourceKey>,
    wrapped: Option<RgbaImage>,
}

impl WrappedErpCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the doubled copy, rebuilding it when the identity or size changed.
    /// `None` for sources too small to sample.
    pub fn get_or_build(&mut self, identity: &str, source: &RgbaImage) -> Option<&RgbaImage> {
        let (w, h) = source.dimensions();
        if w == 0 || h == 0 {
            return None;
        }
        let key = SourceKey { identity: identity.to_owned(), width: w, height: h };
        if self.key.as_ref() != Some(&key) || self.wrapped.is_none() {
            let mut doubled = RgbaImage::new(w * 2, h);
            // 两份拷贝左右拼接，copy_from 在尺寸匹配时不会失败
            if doubled.copy_from(source, 0, 0).is_err() || doubled.copy_from(source, w, 0).is_err() {
                return None;
            }
            log::debug!("rebuilt wrapped panorama cache for {identity} ({w}x{h})");
            self.key = Some(key);
            self.wrapped = Some(doubled);
        }
        self.wrapped.as_ref()
    }

    pub fn key(&self) -> Option<&SourceKey> {
        self.key.as_ref()
    }

    pub fn invalidate(&mut self) {
        self.key = None;
        self.wrapped = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use image::Rgba;

    #[test]
    fn forward_maps_to_image_centre() {
        let uv = dir_to_uv(DVec3::Z, 2048.0, 1024.0);
        assert_abs_diff_eq!(uv.x, 1024.0, epsilon = 1e-9);
        assert_abs_diff_eq!(uv.y, 512.0, epsilon = 1e-9);
    }

    #[test]
    fn u_wraps_into_range() {
        let uv = dir_to_uv(DVec3::new(-1e-12, 0.0, -1.0), 100.0, 50.0);
        assert!(uv.x >= 0.0 && uv.x < 100.0);
    }

    #[test]
    fn seam_cells_are_shifted_into_one_copy() {
        let mut s = [DVec2::new(98.0, 0.0), DVec2::new(2.0, 0.0), DVec2::new(99.0, 1.0)];
        unwrap_seam(&mut s, 100.0);
        assert_abs_diff_eq!(s[1].x, 102.0);
        assert_abs_diff_eq!(s[0].x, 98.0);

        let mut calm = [DVec2::new(10.0, 0.0), DVec2::new(20.0, 0.0)];
        unwrap_seam(&mut calm, 100.0);
        assert_abs_diff_eq!(calm[0].x, 10.0);
    }

    #[test]
    fn unwrap_projection_follows_reference() {
        let rect = Rect::new(0.0, 0.0, 360.0, 180.0);
        let d = crate::math::yaw_pitch_to_dir(-179.0, 0.0);
        let plain = project_unwrap(d, &rect, None);
        assert_abs_diff_eq!(plain.x, 1.0, epsilon = 1e-9);
        let near_right = project_unwrap(d, &rect, Some(359.0));
        assert_abs_diff_eq!(near_right.x, 361.0, epsilon = 1e-9);
    }

    #[test]
    fn unwrap_rect_is_two_to_one() {
        let wide = unwrap_rect(1000.0, 300.0);
        assert_abs_diff_eq!(wide.w, 600.0);
        assert_abs_diff_eq!(wide.x, 200.0);
        let tall = unwrap_rect(400.0, 400.0);
        assert_abs_diff_eq!(tall.h, 200.0);
        assert_abs_diff_eq!(tall.y, 100.0);
    }

    #[test]
    fn cache_rebuilds_on_identity_change() {
        let mut cache = WrappedErpCache::new();
        let img = RgbaImage::from_pixel(4, 2, Rgba([1, 2, 3, 255]));
        assert_eq!(cache.get_or_build("a", &img).map(|i| i.dimensions()), Some((8, 2)));
        assert_eq!(cache.key().map(|k| k.identity.as_str()), Some("a"));
        cache.get_or_build("b", &img);
        assert_eq!(cache.key().map(|k| k.identity.as_str()), Some("b"));
        cache.invalidate();
        assert!(cache.key().is_none());
        assert!(cache.get_or_build("c", &RgbaImage::new(0, 0)).is_none());
        // 2x1 仍可采样
        assert_eq!(cache.get_or_build("d", &RgbaImage::new(2, 1)).map(|i| i.dimensions()), Some((4, 1)));
    }
}
