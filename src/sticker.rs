// sticker.rs — 贴纸/画框的局部切平面、屏幕手柄几何、命中测试与拖拽

use glam::{DVec2, DVec3};

use crate::camera::{Basis, Projector};
use crate::math::{clamp, normalize_or_forward, wrap_yaw, yaw_pitch_to_dir};
use crate::state::{Crop, CutoutShot, Sticker};

pub const EDGE_HANDLE_RADIUS: f64 = 13.0;
pub const CORNER_HANDLE_RADIUS: f64 = 11.0;
pub const ROTATE_HANDLE_RADIUS: f64 = 12.0;
/// Screen distance from the top edge midpoint to the rotate handle.
pub const ROTATE_STEM_PX: f64 = 30.0;

// 旋转手柄方向：顶边再向外偏移半高的 0.43 倍（至少 0.053）
const ROTATE_OFFSET_FRACTION: f64 = 0.43;
const ROTATE_OFFSET_MIN: f64 = 0.053;

/// Local tangent frame of a placed rectangle on the sphere.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    pub center: DVec3,
    pub right: DVec3,
    pub up: DVec3,
    pub tan_x: f64,
    pub tan_y: f64,
    pub cos_roll: f64,
    pub sin_roll: f64,
}

impl Frame {
    pub fn new(yaw: f64, pitch: f64, roll: f64, h_fov: f64, v_fov: f64) -> Self {
        let b = Basis::from_forward(yaw_pitch_to_dir(yaw, pitch), 0.0);
        let half_tan = |f: f64| (clamp(f, 0.1, 179.0).to_radians() * 0.5).tan();
        let (sin_roll, cos_roll) = roll.to_radians().sin_cos();
        Self {
            center: b.forward,
            right: b.right,
            up: b.up,
            tan_x: half_tan(h_fov),
            tan_y: half_tan(v_fov),
            cos_roll,
            sin_roll,
        }
    }

    /// World direction at local tangent offsets `(x, y)`, roll applied.
    pub fn direction(&self, x: f64, y: f64) -> DVec3 {
        let xr = x * self.cos_roll - y * self.sin_roll;
        let yr = x * self.sin_roll + y * self.cos_roll;
        normalize_or_forward(self.center + self.right * xr + self.up * yr)
    }

    /// `(u, v)` in `[0, 1]²` with `v` growing downward.
    pub fn direction_at_uv(&self, u: f64, v: f64) -> DVec3 {
        self.direction((u * 2.0 - 1.0) * self.tan_x, (1.0 - v * 2.0) * self.tan_y)
    }

    /// Inverse of [`Frame::direction_at_uv`]. `None` behind the tangent plane.
    pub fn uv_of(&self, d: DVec3) -> Option<(f64, f64)> {
        let z = d.dot(self.center);
        if z <= 1e-9 {
            return None;
        }
        let (xr, yr) = (d.dot(self.right) / z, d.dot(self.up) / z);
        // 反转 roll
        let x = xr * self.cos_roll + yr * self.sin_roll;
        let y = -xr * self.sin_roll + yr * self.cos_roll;
        Some(((x / self.tan_x + 1.0) * 0.5, (1.0 - y / self.tan_y) * 0.5))
    }

    /// Top-left, top-right, bottom-right, bottom-left. Handle code depends on this order.
    pub fn corner_directions(&self) -> [DVec3; 4] {
        let (x, y) = (self.tan_x, self.tan_y);
        [self.direction(-x, y), self.direction(x, y), self.direction(x, -y), self.direction(-x, -y)]
    }

    /// Top, right, bottom, left.
    pub fn edge_midpoint_directions(&self) -> [DVec3; 4] {
        let (x, y) = (self.tan_x, self.tan_y);
        [self.direction(0.0, y), self.direction(x, 0.0), self.direction(0.0, -y), self.direction(-x, 0.0)]
    }

    /// Direction just beyond the top edge that the rotate handle points toward.
    pub fn rotate_direction(&self) -> DVec3 {
        let off = (self.tan_y * ROTATE_OFFSET_FRACTION).max(ROTATE_OFFSET_MIN);
        self.direction(0.0, self.tan_y + off)
    }
}

/// Anything placed on the sphere with a center, two FOVs and a roll.
pub trait Placement {
    fn id(&self) -> &str;
    fn yaw(&self) -> f64;
    fn pitch(&self) -> f64;
    fn roll(&self) -> f64;
    /// (horizontal, vertical) in degrees.
    fn fovs(&self) -> (f64, f64);
    fn set_center(&mut self, yaw: f64, pitch: f64);
    fn set_fovs(&mut self, h: f64, v: f64);
    fn set_roll(&mut self, roll: f64);

    fn z(&self) -> u32 {
        0
    }

    fn crop(&self) -> Crop {
        Crop::FULL
    }

    fn frame(&self) -> Frame {
        let (h, v) = self.fovs();
        Frame::new(self.yaw(), self.pitch(), self.roll(), h, v)
    }
}

impl Placement for Sticker {
    fn id(&self) -> &str {
        &self.id
    }
    fn yaw(&self) -> f64 {
        self.yaw_deg
    }
    fn pitch(&self) -> f64 {
        self.pitch_deg
    }
    fn roll(&self) -> f64 {
        self.rot_deg
    }
    fn fovs(&self) -> (f64, f64) {
        (self.hfov_deg, self.vfov_deg)
    }
    fn set_center(&mut self, yaw: f64, pitch: f64) {
        self.yaw_deg = yaw;
        self.pitch_deg = pitch;
    }
    fn set_fovs(&mut self, h: f64, v: f64) {
        self.hfov_deg = h;
        self.vfov_deg = v;
    }
    fn set_roll(&mut self, roll: f64) {
        self.rot_deg = roll;
    }
    fn z(&self) -> u32 {
        self.z_index
    }
    fn crop(&self) -> Crop {
        self.crop_or_full()
    }
}

impl Placement for CutoutShot {
    fn id(&self) -> &str {
        &self.id
    }
    fn yaw(&self) -> f64 {
        self.yaw_deg
    }
    fn pitch(&self) -> f64 {
        self.pitch_deg
    }
    fn roll(&self) -> f64 {
        self.roll_deg
    }
    fn fovs(&self) -> (f64, f64) {
        (self.hfov_deg, self.vfov_deg)
    }
    fn set_center(&mut self, yaw: f64, pitch: f64) {
        self.yaw_deg = yaw;
        self.pitch_deg = pitch;
    }
    fn set_fovs(&mut self, h: f64, v: f64) {
        self.hfov_deg = h;
        self.vfov_deg = v;
    }
    fn set_roll(&mut self, roll: f64) {
        self.roll_deg = roll;
    }
}

pub fn corner_directions<P: Placement + ?Sized>(p: &P) -> [DVec3; 4] {
    p.frame().corner_directions()
}

/// Patch coordinate → world direction, through the placement's crop.
pub fn sample_direction<P: Placement + ?Sized>(p: &P, u: f64, v: f64) -> DVec3 {
    let (cu, cv) = p.crop().map(u, v);
    p.frame().direction_at_uv(cu, cv)
}

/// Ray-casting point-in-polygon test.
pub fn point_in_poly(p: DVec2, poly: &[DVec2]) -> bool {
    let mut inside = false;
    let n = poly.len();
    let mut j = n.wrapping_sub(1);
    for i in 0..n {
        let (a, b) = (poly[i], poly[j]);
        if (a.y > p.y) != (b.y > p.y) && p.x < (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x {
            inside = !inside;
        }
        j = i;
    }
    inside
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Top,
    Right,
    Bottom,
    Left,
}

const EDGES: [Edge; 4] = [Edge::Top, Edge::Right, Edge::Bottom, Edge::Left];

/// Where on a selected placement the pointer landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handle {
    Edge(Edge),
    /// Index into the fixed corner order.
    Corner(usize),
    Rotate,
    Body,
}

/// Screen-space outline and handles of one placement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenGeometry {
    pub center: DVec2,
    pub corners: [DVec2; 4],
    pub edge_midpoints: [DVec2; 4],
    pub rotate_stem_base: DVec2,
    pub rotate_handle: DVec2,
}

impl ScreenGeometry {
    /// `None` when the center itself cannot be projected (behind the camera).
    pub fn of<P: Placement + ?Sized>(p: &P, proj: &Projector) -> Option<Self> {
        let f = p.frame();
        let center = proj.project(f.center, None)?;
        let rx = Some(center.x);
        let corners = f.corner_directions().map(|d| proj.project_clamped(d, rx));
        let edge_midpoints = f.edge_midpoint_directions().map(|d| proj.project_clamped(d, rx));
        let stem = edge_midpoints[0];
        let hint = proj.project_clamped(f.rotate_direction(), Some(stem.x));
        let dir = (hint - stem).try_normalize().unwrap_or(DVec2::NEG_Y);
        Some(Self {
            center,
            corners,
            edge_midpoints,
            rotate_stem_base: stem,
            rotate_handle: stem + dir * ROTATE_STEM_PX,
        })
    }

    pub fn contains(&self, p: DVec2) -> bool {
        point_in_poly(p, &self.corners)
    }

    /// Handle under `p`, edges first, then corners, rotate, body.
    pub fn hit(&self, p: DVec2, with_edges: bool) -> Option<Handle> {
        if with_edges {
            if let Some(i) = self.edge_midpoints.iter().position(|m| m.distance(p) <= EDGE_HANDLE_RADIUS) {
                return Some(Handle::Edge(EDGES[i]));
            }
        }
        if let Some(i) = self.corners.iter().position(|c| c.distance(p) <= CORNER_HANDLE_RADIUS) {
            return Some(Handle::Corner(i));
        }
        if self.rotate_handle.distance(p) <= ROTATE_HANDLE_RADIUS {
            return Some(Handle::Rotate);
        }
        self.contains(p).then_some(Handle::Body)
    }
}

/// The topmost (highest z) placement whose outline contains `p`.
pub fn hit_topmost<'a, P: Placement>(items: &'a [P], proj: &Projector, p: DVec2) -> Option<&'a P> {
    let mut order: Vec<&P> = items.iter().collect();
    order.sort_by_key(|it| std::cmp::Reverse(it.z()));
    order
        .into_iter()
        .find(|it| ScreenGeometry::of(*it, proj).is_some_and(|g| g.contains(p)))
}

/// Points along the four edges of a placement's patch, in screen space.
pub fn boundary_points<P: Placement + ?Sized>(p: &P, proj: &Projector, steps: u32) -> Vec<DVec2> {
    let steps = steps.max(1);
    let f = p.frame();
    let rx = match proj {
        Projector::Unwrap { .. } => proj.project(f.center, None).map(|c| c.x),
        Projector::Perspective { .. } => None,
    };
    let mut out = Vec::with_capacity(4 * (steps as usize + 1));
    for edge in EDGES {
        for i in 0..=steps {
            let t = f64::from(i) / f64::from(steps);
            let (u, v) = match edge {
                Edge::Top => (t, 0.0),
                Edge::Right => (1.0, t),
                Edge::Bottom => (1.0 - t, 1.0),
                Edge::Left => (0.0, 1.0 - t),
            };
            if let Some(q) = proj.project(f.direction_at_uv(u, v), rx) {
                out.push(q);
            }
        }
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleAxes {
    Both,
    Horizontal,
    Vertical,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DragKind {
    Move { offset: DVec2 },
    Scale { axes: ScaleAxes, center: DVec2, start_dist: f64, start_h: f64, start_v: f64 },
    Rotate { center: DVec2, start_roll: f64, start_angle: f64 },
}

/// An in-progress move/scale/rotate of one placement.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacementDrag {
    pub target_id: String,
    pub kind: DragKind,
}

impl PlacementDrag {
    pub fn begin<P: Placement + ?Sized>(p: &P, geom: &ScreenGeometry, handle: Handle, pointer: DVec2) -> Self {
        let (start_h, start_v) = p.fovs();
        let scale = |axes| DragKind::Scale {
            axes,
            center: geom.center,
            start_dist: pointer.distance(geom.center).max(1.0),
            start_h,
            start_v,
        };
        let kind = match handle {
            Handle::Body => DragKind::Move { offset: pointer - geom.center },
            Handle::Corner(_) => scale(ScaleAxes::Both),
            Handle::Edge(Edge::Left | Edge::Right) => scale(ScaleAxes::Horizontal),
            Handle::Edge(Edge::Top | Edge::Bottom) => scale(ScaleAxes::Vertical),
            Handle::Rotate => DragKind::Rotate {
                center: geom.center,
                start_roll: p.roll(),
                start_angle: (pointer - geom.center).to_angle(),
            },
        };
        Self { target_id: p.id().to_owned(), kind }
    }

    /// Applies the pointer position; `snap` rounds rotation to 45° steps.
    pub fn update<P: Placement + ?Sized>(&self, p: &mut P, proj: &Projector, pointer: DVec2, snap: bool) {
        match self.kind {
            DragKind::Move { offset } => {
                let (yaw, pitch) = proj.unproject_yaw_pitch(pointer - offset);
                p.set_center(yaw, pitch);
            }
            DragKind::Scale { axes, center, start_dist, start_h, start_v } => {
                let ratio = pointer.distance(center).max(1.0) / start_dist;
                let (h, v) = p.fovs();
                let scaled = |f: f64| clamp(f * ratio, 1.0, 179.0);
                match axes {
                    ScaleAxes::Both => p.set_fovs(scaled(start_h), scaled(start_v)),
                    ScaleAxes::Horizontal => p.set_fovs(scaled(start_h), v),
                    ScaleAxes::Vertical => p.set_fovs(h, scaled(start_v)),
                }
            }
            DragKind::Rotate { center, start_roll, start_angle } => {
                let a = (pointer - center).to_angle();
                let mut out = start_roll - (a - start_angle).to_degrees();
                if snap {
                    out = (out / 45.0).round() * 45.0;
                }
                p.set_roll(wrap_yaw(out));
            }
        }
    }
}
