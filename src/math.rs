// math.rs — 角度、夹取与方向向量工具

use glam::DVec3;

/// Pitch never reaches ±90°: the camera basis would be singular there.
pub const PITCH_LIMIT_DEG: f64 = 89.9;

pub fn clamp(v: f64, lo: f64, hi: f64) -> f64 {
    v.max(lo).min(hi)
}

/// Like [`clamp`], but a non-finite value collapses to `lo`.
pub fn clamp_safe(v: f64, lo: f64, hi: f64) -> f64 {
    if !v.is_finite() {
        return lo;
    }
    clamp(v, lo, hi)
}

pub fn finite_or(v: f64, fallback: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        fallback
    }
}

/// Wraps a yaw angle into (-180, 180].
pub fn wrap_yaw(yaw: f64) -> f64 {
    if !yaw.is_finite() {
        return 0.0;
    }
    let r = (yaw + 180.0).rem_euclid(360.0) - 180.0;
    if r <= -180.0 {
        180.0
    } else {
        r
    }
}

/// Signed yaw change that goes from `from` to `to` the short way round.
pub fn shortest_yaw_delta(from: f64, to: f64) -> f64 {
    let mut d = wrap_yaw(to) - wrap_yaw(from);
    if d > 180.0 {
        d -= 360.0;
    }
    if d < -180.0 {
        d += 360.0;
    }
    d
}

pub fn clamp_pitch(pitch: f64) -> f64 {
    clamp_safe(pitch, -PITCH_LIMIT_DEG, PITCH_LIMIT_DEG)
}

/// Unit direction for a yaw/pitch pair in degrees.
///
/// Yaw 0 / pitch 0 looks down +Z, yaw 90 looks down +X, positive pitch tilts
/// toward +Y (world up).
pub fn yaw_pitch_to_dir(yaw_deg: f64, pitch_deg: f64) -> DVec3 {
    let yaw = yaw_deg.to_radians();
    let pitch = pitch_deg.to_radians();
    let cp = pitch.cos();
    DVec3::new(cp * yaw.sin(), pitch.sin(), cp * yaw.cos())
}

/// Inverse of [`yaw_pitch_to_dir`]; the pitch is kept inside the camera limit.
pub fn dir_to_yaw_pitch(d: DVec3) -> (f64, f64) {
    let yaw = wrap_yaw(d.x.atan2(d.z).to_degrees());
    let pitch = clamp_pitch(clamp(d.y, -1.0, 1.0).asin().to_degrees());
    (yaw, pitch)
}

/// Normalises, falling back to +Z for a zero-length input.
pub fn normalize_or_forward(v: DVec3) -> DVec3 {
    v.try_normalize().unwrap_or(DVec3::Z)
}

pub fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

pub fn ease_in_out_cubic(t: f64) -> f64 {
    if t < 0.5 {
        4.0 * t * t * t
    } else {
        1.0 - (-2.0 * t + 2.0).powi(3) / 2.0
    }
}

pub fn ease_out_cubic(t: f64) -> f64 {
    1.0 - (1.0 - t).powi(3)
}

pub fn ease_in_cubic(t: f64) -> f64 {
    t * t * t
}

/// Rounds to the nearest multiple, never going below `min`.
pub fn round_to_multiple(x: f64, multiple: u32, min: u32) -> u32 {
    let m = f64::from(multiple.max(1));
    let rounded = (x / m).round() * m;
    if rounded.is_finite() && rounded > f64::from(min) {
        rounded as u32
    } else {
        min
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn wrap_yaw_keeps_half_open_range() {
        assert_eq!(wrap_yaw(180.0), 180.0);
        assert_eq!(wrap_yaw(-180.0), 180.0);
        assert_eq!(wrap_yaw(540.0), 180.0);
        assert_abs_diff_eq!(wrap_yaw(190.0), -170.0, epsilon = 1e-9);
        assert_abs_diff_eq!(wrap_yaw(-190.0), 170.0, epsilon = 1e-9);
        assert_eq!(wrap_yaw(f64::NAN), 0.0);
    }

    #[test]
    fn shortest_delta_crosses_the_seam() {
        assert_abs_diff_eq!(shortest_yaw_delta(170.0, -170.0), 20.0, epsilon = 1e-9);
        assert_abs_diff_eq!(shortest_yaw_delta(-170.0, 170.0), -20.0, epsilon = 1e-9);
        assert_abs_diff_eq!(shortest_yaw_delta(10.0, 30.0), 20.0, epsilon = 1e-9);
    }

    #[test]
    fn pitch_clamp_rejects_poles_and_nan() {
        assert_eq!(clamp_pitch(95.0), PITCH_LIMIT_DEG);
        assert_eq!(clamp_pitch(-90.0), -PITCH_LIMIT_DEG);
        assert_eq!(clamp_pitch(f64::INFINITY), -PITCH_LIMIT_DEG);
    }

    #[test]
    fn yaw_pitch_round_trip() {
        let d = yaw_pitch_to_dir(-135.0, 30.0);
        let (yaw, pitch) = dir_to_yaw_pitch(d);
        assert_abs_diff_eq!(yaw, -135.0, epsilon = 1e-9);
        assert_abs_diff_eq!(pitch, 30.0, epsilon = 1e-9);
    }

    #[test]
    fn easing_hits_endpoints() {
        for ease in [ease_in_out_cubic, ease_out_cubic, ease_in_cubic] {
            assert_abs_diff_eq!(ease(0.0), 0.0);
            assert_abs_diff_eq!(ease(1.0), 1.0);
        }
        assert_abs_diff_eq!(ease_in_out_cubic(0.5), 0.5);
    }

    #[test]
    fn round_to_multiple_respects_floor() {
        assert_eq!(round_to_multiple(1021.0, 8, 256), 1024);
        assert_eq!(round_to_multiple(100.0, 8, 256), 256);
        assert_eq!(round_to_multiple(f64::NAN, 8, 8), 8);
    }
}
