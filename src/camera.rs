// camera.rs — 相机基、透视投影与反投影

use glam::{DVec2, DVec3};

use crate::equirect::{project_unwrap, unproject_unwrap};
use crate::math::{dir_to_yaw_pitch, normalize_or_forward, yaw_pitch_to_dir};

/// Directions whose forward component is at or below this are off-screen.
pub const FORWARD_EPSILON: f64 = 1e-4;

// |up × forward| below this (forward within ~0.06° of world up) uses a fixed right axis
const DEGENERATE_CROSS: f64 = 1e-3;

/// Orthonormal view frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Basis {
    pub forward: DVec3,
    pub right: DVec3,
    pub up: DVec3,
}

impl Basis {
    /// Builds the frame for a yaw/pitch/roll triple in degrees.
    pub fn new(yaw_deg: f64, pitch_deg: f64, roll_deg: f64) -> Self {
        Self::from_forward(yaw_pitch_to_dir(yaw_deg, pitch_deg), roll_deg)
    }

    pub fn from_forward(forward: DVec3, roll_deg: f64) -> Self {
        let forward = normalize_or_forward(forward);
        let mut right = DVec3::Y.cross(forward);
        if right.length() < DEGENERATE_CROSS {
            // 接近天顶/天底：用固定轴并正交化
            right = DVec3::X - forward * DVec3::X.dot(forward);
        }
        let right = normalize_or_forward(right);
        let up = normalize_or_forward(forward.cross(right));

        let (sr, cr) = roll_deg.to_radians().sin_cos();
        if sr == 0.0 {
            return Self { forward, right, up };
        }
        Self {
            forward,
            right: normalize_or_forward(right * cr + up * sr),
            up: normalize_or_forward(right * -sr + up * cr),
        }
    }

    /// View-space components (right, up, forward) of a world direction.
    pub fn to_view(&self, dir: DVec3) -> DVec3 {
        DVec3::new(dir.dot(self.right), dir.dot(self.up), dir.dot(self.forward))
    }

    /// Unit world direction through tangent-plane offsets `(x, y)`.
    pub fn ray(&self, x: f64, y: f64) -> DVec3 {
        normalize_or_forward(self.forward + self.right * x + self.up * y)
    }
}

/// Axis-aligned rectangle in raster coordinates (y grows downward).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl Rect {
    pub const fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { x, y, w, h }
    }

    pub fn center(&self) -> DVec2 {
        DVec2::new(self.x + self.w * 0.5, self.y + self.h * 0.5)
    }

    pub fn contains(&self, p: DVec2) -> bool {
        p.x >= self.x && p.x <= self.x + self.w && p.y >= self.y && p.y <= self.y + self.h
    }

    /// Too small to hold a mesh (a single pixel or less on either axis).
    pub fn is_degenerate(&self) -> bool {
        !(self.w.is_finite() && self.h.is_finite()) || self.w <= 1.0 || self.h <= 1.0
    }

    /// Largest rect of the given aspect (w / h) centred inside `self`.
    pub fn contain(&self, aspect: f64) -> Rect {
        let ow = self.w.max(1.0);
        let oh = self.h.max(1.0);
        let a = if aspect > 0.0 && aspect.is_finite() { aspect } else { 1.0 };
        let (mut w, mut h) = (ow, ow / a);
        if h > oh {
            h = oh;
            w = oh * a;
        }
        Rect::new(self.x + (ow - w) * 0.5, self.y + (oh - h) * 0.5, w, h)
    }
}

/// Which axis a single stored field of view refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FovAxis {
    Horizontal,
    Vertical,
}

/// A destination rect plus the tangent half-extents of the frustum drawn into it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub rect: Rect,
    pub tan_x: f64,
    pub tan_y: f64,
}

impl Viewport {
    /// Derives the other axis from the rect aspect.
    pub fn from_fov(rect: Rect, fov_deg: f64, axis: FovAxis) -> Self {
        let t = (fov_deg.to_radians() * 0.5).tan();
        let w = rect.w.max(1.0);
        let h = rect.h.max(1.0);
        match axis {
            FovAxis::Horizontal => Self { rect, tan_x: t, tan_y: t * h / w },
            FovAxis::Vertical => Self { rect, tan_x: t * w / h, tan_y: t },
        }
    }

    pub fn from_fovs(rect: Rect, h_fov_deg: f64, v_fov_deg: f64) -> Self {
        Self {
            rect,
            tan_x: (h_fov_deg.to_radians() * 0.5).tan(),
            tan_y: (v_fov_deg.to_radians() * 0.5).tan(),
        }
    }

    /// Screen point → tangent-plane offsets.
    pub fn to_tangent(&self, p: DVec2) -> DVec2 {
        let c = self.rect.center();
        let hw = (self.rect.w * 0.5).max(1e-9);
        let hh = (self.rect.h * 0.5).max(1e-9);
        DVec2::new((p.x - c.x) / hw * self.tan_x, (c.y - p.y) / hh * self.tan_y)
    }

    /// Tangent-plane offsets → screen point (vertical axis flipped).
    pub fn from_tangent(&self, t: DVec2) -> DVec2 {
        let c = self.rect.center();
        DVec2::new(
            c.x + t.x / self.tan_x * self.rect.w * 0.5,
            c.y - t.y / self.tan_y * self.rect.h * 0.5,
        )
    }
}

/// Forward projection. `None` means the direction is behind (or grazing) the camera.
pub fn project(dir: DVec3, basis: &Basis, viewport: &Viewport) -> Option<DVec2> {
    let v = basis.to_view(dir);
    if v.z <= FORWARD_EPSILON {
        return None;
    }
    Some(viewport.from_tangent(DVec2::new(v.x / v.z, v.y / v.z)))
}

/// Projection for handle/outline geometry: never fails, but keeps points in a
/// guard band around the viewport so shapes partly behind the camera stay drawable.
pub fn project_clamped(dir: DVec3, basis: &Basis, viewport: &Viewport) -> DVec2 {
    let v = basis.to_view(dir);
    let z = v.z.max(FORWARD_EPSILON);
    let p = viewport.from_tangent(DVec2::new(v.x / z, v.y / z));
    let r = viewport.rect;
    let guard = r.w.max(r.h) * 2.0;
    DVec2::new(
        p.x.clamp(r.x - guard, r.x + r.w + guard),
        p.y.clamp(r.y - guard, r.y + r.h + guard),
    )
}

/// Inverse projection: the unit direction seen through screen point `p`.
pub fn unproject(p: DVec2, basis: &Basis, viewport: &Viewport) -> DVec3 {
    let t = viewport.to_tangent(p);
    basis.ray(t.x, t.y)
}

/// How sphere directions reach the screen in the current editor mode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projector {
    Perspective { basis: Basis, viewport: Viewport },
    /// Flat equirectangular layout inside a 2:1 rect.
    Unwrap { rect: Rect },
}

impl Projector {
    pub fn rect(&self) -> Rect {
        match self {
            Projector::Perspective { viewport, .. } => viewport.rect,
            Projector::Unwrap { rect } => *rect,
        }
    }

    /// `ref_x` only matters in unwrap mode, where it keeps a shape on one side of the seam.
    pub fn project(&self, dir: DVec3, ref_x: Option<f64>) -> Option<DVec2> {
        match self {
            Projector::Perspective { basis, viewport } => project(dir, basis, viewport),
            Projector::Unwrap { rect } => Some(project_unwrap(dir, rect, ref_x)),
        }
    }

    pub fn project_clamped(&self, dir: DVec3, ref_x: Option<f64>) -> DVec2 {
        match self {
            Projector::Perspective { basis, viewport } => project_clamped(dir, basis, viewport),
            Projector::Unwrap { rect } => project_unwrap(dir, rect, ref_x),
        }
    }

    /// Screen point → (yaw, pitch) in degrees.
    pub fn unproject_yaw_pitch(&self, p: DVec2) -> (f64, f64) {
        match self {
            Projector::Perspective { basis, viewport } => dir_to_yaw_pitch(unproject(p, basis, viewport)),
            Projector::Unwrap { rect } => unproject_unwrap(p, rect),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn assert_orthonormal(b: &Basis) {
        assert_abs_diff_eq!(b.forward.length(), 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(b.right.length(), 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(b.up.length(), 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(b.forward.dot(b.right), 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(b.forward.dot(b.up), 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(b.right.dot(b.up), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn front_basis_is_canonical() {
        let b = Basis::new(0.0, 0.0, 0.0);
        assert_abs_diff_eq!(b.forward.z, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(b.right.x, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(b.up.y, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn basis_survives_the_poles() {
        for pitch in [90.0, -90.0, 89.99, -89.999] {
            assert_orthonormal(&Basis::new(37.0, pitch, 0.0));
        }
        assert_orthonormal(&Basis::from_forward(DVec3::Y, 0.0));
    }

    #[test]
    fn roll_rotates_right_toward_up() {
        let b = Basis::new(0.0, 0.0, 90.0);
        assert_orthonormal(&b);
        assert_abs_diff_eq!(b.right.y, 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(b.up.x, -1.0, epsilon = 1e-9);
    }

    #[test]
    fn behind_the_camera_is_skipped() {
        let b = Basis::new(0.0, 0.0, 0.0);
        let vp = Viewport::from_fov(Rect::new(0.0, 0.0, 200.0, 100.0), 90.0, FovAxis::Horizontal);
        assert!(project(DVec3::NEG_Z, &b, &vp).is_none());
        assert!(project(DVec3::X, &b, &vp).is_none());
        let p = project(DVec3::Z, &b, &vp).unwrap();
        assert_abs_diff_eq!(p.x, 100.0, epsilon = 1e-9);
        assert_abs_diff_eq!(p.y, 50.0, epsilon = 1e-9);
    }

    #[test]
    fn up_maps_to_smaller_rows() {
        let b = Basis::new(0.0, 0.0, 0.0);
        let vp = Viewport::from_fov(Rect::new(0.0, 0.0, 100.0, 100.0), 90.0, FovAxis::Vertical);
        let p = project(DVec3::new(0.0, 0.5, 1.0).normalize(), &b, &vp).unwrap();
        assert!(p.y < 50.0);
        // tan(45°) = 1, so y = 0.5 lands a quarter of the way up
        assert_abs_diff_eq!(p.y, 25.0, epsilon = 1e-9);
    }

    #[test]
    fn unproject_inverts_project() {
        let b = Basis::new(120.0, -20.0, 15.0);
        let vp = Viewport::from_fov(Rect::new(10.0, 20.0, 320.0, 180.0), 100.0, FovAxis::Horizontal);
        let d = b.ray(0.3, -0.2);
        let p = project(d, &b, &vp).unwrap();
        let back = unproject(p, &b, &vp);
        assert_abs_diff_eq!(back.x, d.x, epsilon = 1e-9);
        assert_abs_diff_eq!(back.y, d.y, epsilon = 1e-9);
        assert_abs_diff_eq!(back.z, d.z, epsilon = 1e-9);
    }

    #[test]
    fn clamped_projection_stays_in_guard_band() {
        let b = Basis::new(0.0, 0.0, 0.0);
        let vp = Viewport::from_fov(Rect::new(0.0, 0.0, 100.0, 50.0), 90.0, FovAxis::Horizontal);
        let p = project_clamped(DVec3::new(1.0, 0.0, -1.0).normalize(), &b, &vp);
        assert!(p.x <= 300.0 && p.x >= -200.0);
    }

    #[test]
    fn contain_keeps_aspect() {
        let r = Rect::new(0.0, 0.0, 400.0, 100.0).contain(2.0);
        assert_abs_diff_eq!(r.w, 200.0);
        assert_abs_diff_eq!(r.h, 100.0);
        assert_abs_diff_eq!(r.x, 100.0);
    }
}
