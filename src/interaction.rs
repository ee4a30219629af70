// interaction.rs — 视角交互控制：拖拽、惯性、滚轮缩放、补间动画

use std::time::Duration;

use glam::DVec2;

use crate::camera::Rect;
use crate::math::{clamp, clamp_pitch, clamp_safe, ease_in_out_cubic, finite_or, shortest_yaw_delta, wrap_yaw};

/// The navigable camera of an editor or preview session. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct View {
    pub yaw: f64,
    pub pitch: f64,
    pub fov: f64,
}

impl Default for View {
    fn default() -> Self {
        let c = NavConfig::default();
        Self { yaw: 0.0, pitch: 0.0, fov: c.initial_fov }
    }
}

impl View {
    pub fn new(yaw: f64, pitch: f64, fov: f64) -> Self {
        Self { yaw, pitch, fov }
    }

    /// Wraps yaw, clamps pitch to the pole limit and fov to the configured range.
    pub fn normalized(self, cfg: &NavConfig) -> Self {
        Self {
            yaw: wrap_yaw(self.yaw),
            pitch: clamp_pitch(finite_or(self.pitch, 0.0)),
            fov: clamp_safe(finite_or(self.fov, cfg.initial_fov), cfg.fov_min, cfg.fov_max),
        }
    }

    pub fn is_finite(&self) -> bool {
        self.yaw.is_finite() && self.pitch.is_finite() && self.fov.is_finite()
    }
}

/// Navigation tuning. Angles in degrees, speeds in degrees per second.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NavConfig {
    /// Degrees of yaw/pitch per dragged pixel in the perspective view.
    pub drag_sensitivity: f64,
    pub wheel_step: f64,
    pub fov_min: f64,
    pub fov_max: f64,
    pub initial_fov: f64,
    pub blend_old: f64,
    pub blend_new: f64,
    /// Exponential velocity decay rate (1/s).
    pub damping: f64,
    pub inertia_start_speed: f64,
    pub inertia_stop_speed: f64,
    pub tween_min: Duration,
    pub tween_max: Duration,
}

impl Default for NavConfig {
    fn default() -> Self {
        Self {
            drag_sensitivity: 0.12,
            wheel_step: 3.0,
            fov_min: 35.0,
            fov_max: 140.0,
            initial_fov: 100.0,
            blend_old: 0.4,
            blend_new: 0.6,
            damping: 5.5,
            inertia_start_speed: 20.0,
            inertia_stop_speed: 0.8,
            tween_min: Duration::from_millis(140),
            tween_max: Duration::from_millis(620),
        }
    }
}

/// How pixel deltas turn into angles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragMode {
    /// Perspective view: fixed degrees per pixel.
    Pano,
    /// Flat view: the unwrap rect width is one full turn, its height 180°.
    Unwrap,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InteractionEvent {
    ViewChanged,
    DragStarted,
    DragEnded { inertia: bool },
    InertiaStopped,
    TweenFinished,
    Zoomed { fov: f64 },
}

/// What the frame driver should do after a [`InteractionController::tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameRequest {
    Continue,
    Idle,
}

/// Whatever owns the view: an editor window, a node preview, a test double.
pub trait ViewHost {
    fn view(&self) -> View;
    fn set_view(&mut self, view: View);

    /// Per-axis inversion (x, y).
    fn invert(&self) -> (bool, bool) {
        (false, false)
    }

    fn unwrap_rect(&self) -> Rect {
        Rect::new(0.0, 0.0, 1.0, 1.0)
    }

    fn notify(&mut self, _event: InteractionEvent) {}
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Tween {
    start: Duration,
    duration: Duration,
    from: View,
    delta_yaw: f64,
    to_pitch: f64,
    to_fov: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Phase {
    Idle,
    Dragging { last: DVec2, last_ts: Duration },
    Inertia { last_ts: Duration },
    Tweening(Tween),
}

/// Public view of the controller's state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseKind {
    Idle,
    Dragging,
    Inertia,
    Tweening,
}

fn seconds_between(earlier: Duration, now: Duration) -> f64 {
    now.saturating_sub(earlier).as_secs_f64().max(0.001)
}

/// Pointer/wheel navigation with momentum and eased transitions over one pointer stream.
#[derive(Debug, Clone)]
pub struct InteractionController {
    config: NavConfig,
    phase: Phase,
    velocity: DVec2,
}

impl Default for InteractionController {
    fn default() -> Self {
        Self::new(NavConfig::default())
    }
}

impl InteractionController {
    pub fn new(config: NavConfig) -> Self {
        Self { config, phase: Phase::Idle, velocity: DVec2::ZERO }
    }

    pub fn config(&self) -> &NavConfig {
        &self.config
    }

    pub fn phase(&self) -> PhaseKind {
        match self.phase {
            Phase::Idle => PhaseKind::Idle,
            Phase::Dragging { .. } => PhaseKind::Dragging,
            Phase::Inertia { .. } => PhaseKind::Inertia,
            Phase::Tweening(_) => PhaseKind::Tweening,
        }
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.phase, Phase::Dragging { .. })
    }

    /// Blended angular velocity (yaw, pitch) in degrees per second.
    pub fn velocity(&self) -> DVec2 {
        self.velocity
    }

    fn commit<H: ViewHost + ?Sized>(&self, host: &mut H, view: View) {
        host.set_view(view.normalized(&self.config));
        host.notify(InteractionEvent::ViewChanged);
    }

    /// Begins a drag. Refused (returns `false`) while another drag is open.
    pub fn start_drag<H: ViewHost + ?Sized>(&mut self, host: &mut H, p: DVec2, now: Duration) -> bool {
        if self.is_dragging() {
            log::debug!("start_drag ignored: a drag is already open");
            return false;
        }
        self.phase = Phase::Dragging { last: p, last_ts: now };
        self.velocity = DVec2::ZERO;
        host.notify(InteractionEvent::DragStarted);
        true
    }

    pub fn move_drag<H: ViewHost + ?Sized>(&mut self, host: &mut H, p: DVec2, mode: DragMode, now: Duration) -> bool {
        let Phase::Dragging { last, last_ts } = self.phase else {
            return false;
        };
        if !p.is_finite() {
            return false;
        }
        let dt = seconds_between(last_ts, now);
        let d = p - last;
        self.phase = Phase::Dragging { last: p, last_ts: now };

        let (ix, iy) = host.invert();
        let inv_x = if ix { -1.0 } else { 1.0 };
        let inv_y = if iy { -1.0 } else { 1.0 };
        let (d_yaw, d_pitch) = match mode {
            DragMode::Unwrap => {
                let r = host.unwrap_rect();
                let rw = r.w.max(1.0);
                let rh = r.h.max(1.0);
                (-d.x / rw * 360.0 * inv_x, d.y / rh * 180.0 * inv_y)
            }
            DragMode::Pano => {
                let s = self.config.drag_sensitivity;
                (-d.x * s * inv_x, d.y * s * inv_y)
            }
        };

        let v = host.view();
        self.commit(host, View { yaw: v.yaw + d_yaw, pitch: v.pitch + d_pitch, ..v });

        let inst = DVec2::new(d_yaw / dt, d_pitch / dt);
        self.velocity = self.velocity * self.config.blend_old + inst * self.config.blend_new;
        true
    }

    /// Ends the drag; hands the blended velocity to inertia when it is fast enough.
    pub fn end_drag<H: ViewHost + ?Sized>(&mut self, host: &mut H, now: Duration) -> bool {
        if !self.is_dragging() {
            return false;
        }
        let speed = self.velocity.length();
        let inertia = speed.is_finite() && speed > self.config.inertia_start_speed;
        if inertia {
            self.phase = Phase::Inertia { last_ts: now };
        } else {
            self.phase = Phase::Idle;
            self.velocity = DVec2::ZERO;
        }
        log::debug!("drag ended: speed {speed:.1}°/s, inertia {inertia}");
        host.notify(InteractionEvent::DragEnded { inertia });
        true
    }

    /// Advances momentum by one frame. Returns whether inertia is still running;
    /// a no-op returning `false` in any other phase.
    pub fn step_inertia<H: ViewHost + ?Sized>(&mut self, host: &mut H, now: Duration) -> bool {
        let Phase::Inertia { last_ts } = self.phase else {
            return false;
        };
        let dt = seconds_between(last_ts, now);
        let v = host.view();
        let next = View { yaw: v.yaw + self.velocity.x * dt, pitch: v.pitch + self.velocity.y * dt, ..v };

        if !self.velocity.is_finite() || !next.is_finite() {
            log::warn!("non-finite inertia state; resetting view");
            self.phase = Phase::Idle;
            self.velocity = DVec2::ZERO;
            self.commit(host, View::new(0.0, 0.0, finite_or(v.fov, self.config.initial_fov)));
            host.notify(InteractionEvent::InertiaStopped);
            return false;
        }

        self.velocity *= (-self.config.damping * dt).exp();
        let stop = self.config.inertia_stop_speed;
        let running = self.velocity.x.abs() >= stop || self.velocity.y.abs() >= stop;
        if running {
            self.phase = Phase::Inertia { last_ts: now };
        } else {
            self.velocity = DVec2::ZERO;
            self.phase = Phase::Idle;
        }
        self.commit(host, next);
        if !running {
            host.notify(InteractionEvent::InertiaStopped);
        }
        running
    }

    /// Zooms by one wheel step in the direction of `sign`; zero is a no-op.
    pub fn apply_wheel<H: ViewHost + ?Sized>(&mut self, host: &mut H, sign: f64) -> bool {
        if !sign.is_finite() || sign == 0.0 {
            return false;
        }
        let v = host.view();
        let before = finite_or(v.fov, self.config.initial_fov);
        let fov = clamp(before + sign.signum() * self.config.wheel_step, self.config.fov_min, self.config.fov_max);
        self.commit(host, View { fov, ..v });
        host.notify(InteractionEvent::Zoomed { fov });
        true
    }

    /// Raw wheel delta as delivered by the windowing layer (positive zooms out).
    pub fn apply_wheel_delta<H: ViewHost + ?Sized>(&mut self, host: &mut H, raw: f64) -> bool {
        if !raw.is_finite() || raw == 0.0 {
            return false;
        }
        self.apply_wheel(host, raw.signum())
    }

    /// Starts an eased move toward the target, taking the short way round in yaw.
    /// Cancels any drag or inertia.
    pub fn tween_to<H: ViewHost + ?Sized>(&mut self, host: &mut H, target: View, now: Duration) {
        let from = host.view().normalized(&self.config);
        let target = target.normalized(&self.config);
        let delta_yaw = shortest_yaw_delta(from.yaw, target.yaw);
        let d_pitch = target.pitch - from.pitch;
        let d_fov = target.fov - from.fov;
        let dist = delta_yaw.hypot(d_pitch) + d_fov.abs() * 0.6;

        let min_ms = self.config.tween_min.as_secs_f64() * 1000.0;
        let max_ms = self.config.tween_max.as_secs_f64() * 1000.0;
        let ms = clamp(min_ms + dist * 2.2, min_ms, max_ms.max(min_ms)).round();
        let duration = Duration::from_millis(ms as u64);

        self.velocity = DVec2::ZERO;
        self.phase = Phase::Tweening(Tween {
            start: now,
            duration,
            from,
            delta_yaw,
            to_pitch: target.pitch,
            to_fov: target.fov,
        });
        log::debug!("view tween over {ms}ms ({dist:.1}° away)");
    }

    /// Advances an active tween. Returns whether it is still running.
    pub fn step_tween<H: ViewHost + ?Sized>(&mut self, host: &mut H, now: Duration) -> bool {
        let Phase::Tweening(tw) = self.phase else {
            return false;
        };
        let t = if tw.duration.is_zero() {
            1.0
        } else {
            clamp(now.saturating_sub(tw.start).as_secs_f64() / tw.duration.as_secs_f64(), 0.0, 1.0)
        };
        let e = ease_in_out_cubic(t);
        let v = View {
            yaw: tw.from.yaw + tw.delta_yaw * e,
            pitch: tw.from.pitch + (tw.to_pitch - tw.from.pitch) * e,
            fov: tw.from.fov + (tw.to_fov - tw.from.fov) * e,
        };
        self.commit(host, v);
        if t >= 1.0 {
            self.phase = Phase::Idle;
            host.notify(InteractionEvent::TweenFinished);
            return false;
        }
        true
    }

    /// Drops any drag, inertia or tween without touching the view.
    pub fn stop(&mut self) {
        if self.phase != Phase::Idle {
            log::debug!("interaction stopped from {:?}", self.phase());
        }
        self.phase = Phase::Idle;
        self.velocity = DVec2::ZERO;
    }

    /// Back to the front-facing initial view; stops all motion.
    pub fn reset_view<H: ViewHost + ?Sized>(&mut self, host: &mut H) {
        self.phase = Phase::Idle;
        self.velocity = DVec2::ZERO;
        self.commit(host, View::new(0.0, 0.0, self.config.initial_fov));
    }

    /// One frame of the scheduler: tween first, then inertia.
    pub fn tick<H: ViewHost + ?Sized>(&mut self, host: &mut H, now: Duration) -> FrameRequest {
        let active = match self.phase {
            Phase::Tweening(_) => self.step_tween(host, now),
            Phase::Inertia { .. } => self.step_inertia(host, now),
            Phase::Dragging { .. } | Phase::Idle => false,
        };
        if active {
            FrameRequest::Continue
        } else {
            FrameRequest::Idle
        }
    }
}
