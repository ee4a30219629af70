// cutout.rs — 裁切画框：宽高比、输出尺寸与旋转

use crate::math::{clamp, clamp_pitch, round_to_multiple, wrap_yaw};
use crate::state::{make_id, CutoutShot};

/// Aspect presets offered by the editor, as (label, w, h).
pub const ASPECT_PRESETS: [(&str, f64, f64); 4] = [("1:1", 1.0, 1.0), ("3:2", 3.0, 2.0), ("4:3", 4.0, 3.0), ("16:9", 16.0, 9.0)];

pub const NEW_FRAME_HFOV: f64 = 64.0;
pub const NEW_FRAME_VFOV: f64 = 40.0;
pub const NEW_FRAME_SIDE: u32 = 1024;

/// Reduced `w:h` label for a pair of positive numbers (three decimals of precision).
pub fn ratio_label(w: f64, h: f64) -> String {
    let pos = |v: f64| if v.is_finite() && v > 0.0 { v } else { 1.0 };
    let wi = ((pos(w) * 1000.0).round() as u64).max(1);
    let hi = ((pos(h) * 1000.0).round() as u64).max(1);
    let g = gcd(wi, hi).max(1);
    format!("{}:{}", wi / g, hi / g)
}

fn gcd(a: u64, b: u64) -> u64 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

/// Parses a `w:h` label into positive numbers.
pub fn parse_ratio(label: &str) -> Option<(f64, f64)> {
    let (a, b) = label.split_once(':')?;
    let w: f64 = a.trim().parse().ok()?;
    let h: f64 = b.trim().parse().ok()?;
    (w.is_finite() && h.is_finite() && w > 0.0 && h > 0.0).then_some((w, h))
}

fn is_landscape(shot: &CutoutShot) -> bool {
    if (shot.hfov_deg - shot.vfov_deg).abs() > 1e-6 {
        shot.hfov_deg >= shot.vfov_deg
    } else {
        shot.out_w >= shot.out_h
    }
}

/// Orients `(aw, ah)` to match the shot's current landscape/portrait orientation.
fn oriented(shot: &CutoutShot, aw: f64, ah: f64) -> (f64, f64) {
    if (aw >= ah) != is_landscape(shot) {
        (ah, aw)
    } else {
        (aw, ah)
    }
}

/// Redistributes the geometric-mean span of the FOVs so that `h / v == ratio`.
pub fn aspect_to_fov(h_fov: f64, v_fov: f64, ratio: f64) -> (f64, f64) {
    let hf = clamp(h_fov, 1.0, 179.0);
    let vf = clamp(v_fov, 1.0, 179.0);
    let span = (hf * vf).max(1.0).sqrt();
    let r = ratio.sqrt();
    (clamp(span * r, 1.0, 179.0), clamp(span / r, 1.0, 179.0))
}

/// Pixel size for an oriented ratio, sized from the larger current side (at least 512).
pub fn aspect_to_output_size(out_w: u32, out_h: u32, aw: f64, ah: f64) -> (u32, u32) {
    let base = f64::from(out_w.max(out_h).max(512));
    let scale = base / aw.max(ah);
    (round_to_multiple(aw * scale, 8, 256), round_to_multiple(ah * scale, 8, 256))
}

impl CutoutShot {
    /// A fresh frame looking where the view looks.
    pub fn new_at(yaw: f64, pitch: f64) -> Self {
        Self {
            id: make_id("shot"),
            yaw_deg: wrap_yaw(yaw),
            pitch_deg: clamp_pitch(pitch),
            hfov_deg: NEW_FRAME_HFOV,
            vfov_deg: NEW_FRAME_VFOV,
            roll_deg: 0.0,
            out_w: NEW_FRAME_SIDE,
            out_h: NEW_FRAME_SIDE,
            aspect_id: "1:1".to_owned(),
        }
    }

    fn apply_ratio(&mut self, w: f64, h: f64) {
        let (aw, ah) = oriented(self, w, h);
        let (hf, vf) = aspect_to_fov(self.hfov_deg, self.vfov_deg, aw / ah);
        let (ow, oh) = aspect_to_output_size(self.out_w, self.out_h, aw, ah);
        self.hfov_deg = hf;
        self.vfov_deg = vf;
        self.out_w = ow;
        self.out_h = oh;
    }

    /// Applies one of [`ASPECT_PRESETS`]; unknown labels fall back to 1:1.
    pub fn apply_aspect_preset(&mut self, label: &str) {
        let (label, w, h) = ASPECT_PRESETS.iter().copied().find(|(l, _, _)| *l == label).unwrap_or(ASPECT_PRESETS[0]);
        self.apply_ratio(w, h);
        self.aspect_id = label.to_owned();
    }

    /// Arbitrary ratio; each side is floored at 1. Returns `false` for non-finite input.
    pub fn apply_aspect_custom(&mut self, w: f64, h: f64) -> bool {
        if !w.is_finite() || !h.is_finite() {
            return false;
        }
        let (rw, rh) = (w.max(1.0), h.max(1.0));
        self.apply_ratio(rw, rh);
        self.aspect_id = format!("{}:{}", rw.round(), rh.round());
        true
    }

    /// Swaps output width/height and horizontal/vertical FOV; a `w:h` label is flipped too.
    pub fn rotate90(&mut self) {
        std::mem::swap(&mut self.out_w, &mut self.out_h);
        std::mem::swap(&mut self.hfov_deg, &mut self.vfov_deg);
        if let Some((w, h)) = parse_ratio(&self.aspect_id) {
            self.aspect_id = format!("{h}:{w}");
        }
    }

    /// `tan(h/2) / tan(v/2)`, the shape of the frustum; used to size previews.
    pub fn effective_aspect(&self) -> f64 {
        let th = (self.hfov_deg.to_radians() * 0.5).tan();
        let tv = (self.vfov_deg.to_radians() * 0.5).tan();
        clamp(th / tv.max(1e-6), 0.1, 10.0)
    }

    /// Stored label, or one derived from the output size.
    pub fn aspect_label(&self) -> String {
        let stored = self.aspect_id.trim();
        if !stored.is_empty() {
            return stored.to_owned();
        }
        ratio_label(f64::from(self.out_w), f64::from(self.out_h))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn shot(h: f64, v: f64, w: u32, hh: u32) -> CutoutShot {
        CutoutShot { hfov_deg: h, vfov_deg: v, out_w: w, out_h: hh, ..CutoutShot::new_at(0.0, 0.0) }
    }

    #[test]
    fn labels_reduce_by_gcd() {
        assert_eq!(ratio_label(1920.0, 1080.0), "16:9");
        assert_eq!(ratio_label(1.5, 1.0), "3:2");
        assert_eq!(ratio_label(0.0, f64::NAN), "1:1");
    }

    #[test]
    fn preset_keeps_span_and_orientation() {
        let mut s = shot(64.0, 40.0, 1024, 1024);
        s.apply_aspect_preset("16:9");
        assert!(s.hfov_deg > s.vfov_deg);
        assert_abs_diff_eq!(s.hfov_deg * s.vfov_deg, 64.0 * 40.0, epsilon = 1e-9);
        assert_abs_diff_eq!(s.hfov_deg / s.vfov_deg, 16.0 / 9.0, epsilon = 1e-9);
        assert_eq!((s.out_w, s.out_h), (1024, 576));
        assert_eq!(s.aspect_id, "16:9");

        let mut p = shot(40.0, 64.0, 1024, 1024);
        p.apply_aspect_preset("4:3");
        assert!(p.vfov_deg > p.hfov_deg);
        assert_eq!((p.out_w, p.out_h), (768, 1024));
    }

    #[test]
    fn output_size_has_floors() {
        assert_eq!(aspect_to_output_size(100, 100, 16.0, 1.0), (512, 256));
    }

    #[test]
    fn custom_ratio_sets_label() {
        let mut s = shot(90.0, 60.0, 1024, 1024);
        assert!(s.apply_aspect_custom(21.0, 9.0));
        assert_eq!(s.aspect_id, "21:9");
        assert!(!s.apply_aspect_custom(f64::NAN, 1.0));
    }

    #[test]
    fn rotate_twice_is_identity() {
        let mut s = shot(90.0, 60.0, 1600, 900);
        s.aspect_id = "16:9".into();
        let before = s.clone();
        s.rotate90();
        assert_eq!((s.out_w, s.out_h), (900, 1600));
        assert_eq!((s.hfov_deg, s.vfov_deg), (60.0, 90.0));
        assert_eq!(s.aspect_id, "9:16");
        s.rotate90();
        assert_eq!(s, before);
    }

    #[test]
    fn effective_aspect_uses_tangents() {
        let s = shot(90.0, 60.0, 1024, 1024);
        assert_abs_diff_eq!(s.effective_aspect(), 3f64.sqrt(), epsilon = 1e-9);
        assert_abs_diff_eq!(shot(179.0, 1.0, 8, 8).effective_aspect(), 10.0);
    }
}
