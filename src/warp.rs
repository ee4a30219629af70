// warp.rs — 网格扭曲渲染器：把球面投影拆成仿射三角形
//
// 所有调用方（编辑器背景、节点预览、裁切预览、贴纸、离线导出）共用这一份实现。

use glam::DVec2;
use image::{Rgba, RgbaImage};

use crate::camera::{unproject, Basis, Projector, Rect, Viewport};
use crate::equirect::{dir_to_uv, unwrap_seam, WrappedErpCache};
use crate::math::clamp;
use crate::raster::{inflate_triangle, solve_affine, RasterSurface};
use crate::state::{Crop, PreviewQuality};
use crate::sticker::Frame;

/// Grid subdivision of a warp: `nu × nv` cells, two triangles each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshDensity {
    pub nu: u32,
    pub nv: u32,
}

/// Which pass of a sticker draw a density is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StickerPass {
    Interacting,
    Settled,
    Refine,
}

impl MeshDensity {
    pub const fn new(nu: u32, nv: u32) -> Self {
        Self { nu, nv }
    }

    /// Editor background panorama.
    pub fn background(q: PreviewQuality) -> Self {
        match q {
            PreviewQuality::Draft => Self::new(24, 14),
            PreviewQuality::Balanced => Self::new(32, 20),
            PreviewQuality::High => Self::new(44, 28),
        }
    }

    /// Small always-on node preview.
    pub fn node_preview(q: PreviewQuality) -> Self {
        match q {
            PreviewQuality::Draft => Self::new(14, 9),
            PreviewQuality::Balanced => Self::new(24, 14),
            PreviewQuality::High => Self::new(32, 20),
        }
    }

    /// Cutout output inset drawn in the editor corner.
    pub fn cutout_preview(q: PreviewQuality) -> Self {
        match q {
            PreviewQuality::Draft => Self::new(10, 7),
            PreviewQuality::Balanced => Self::new(14, 10),
            PreviewQuality::High => Self::new(20, 14),
        }
    }

    pub fn sticker(q: PreviewQuality, pass: StickerPass) -> Self {
        use PreviewQuality::*;
        use StickerPass::*;
        match (q, pass) {
            (Draft, Interacting) => Self::new(12, 9),
            (Draft, Settled) => Self::new(20, 14),
            (Draft, Refine) => Self::new(28, 20),
            (Balanced, Interacting) => Self::new(16, 12),
            (Balanced, Settled) => Self::new(28, 20),
            (Balanced, Refine) => Self::new(40, 30),
            (High, Interacting) => Self::new(20, 14),
            (High, Settled) => Self::new(36, 26),
            (High, Refine) => Self::new(48, 36),
        }
    }

    /// Final output renders: roughly one cell per 16 output pixels.
    pub fn export(out_w: u32, out_h: u32) -> Self {
        let cells = |px: u32| (px / 16).clamp(16, 256);
        Self::new(cells(out_w), cells(out_h))
    }
}

/// Per-call warp settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WarpOptions {
    pub density: MeshDensity,
    /// Outward clip inflation in destination pixels.
    pub inflate: f64,
    pub opacity: f64,
}

impl WarpOptions {
    pub fn new(density: MeshDensity) -> Self {
        // 粗网格的三角形更大，膨胀量略小以免重叠处发虚
        let inflate = if density.nu < 10 { 0.35 } else { 0.45 };
        Self { density, inflate, opacity: 1.0 }
    }

    pub fn with_opacity(mut self, opacity: f64) -> Self {
        self.opacity = clamp(opacity, 0.0, 1.0);
        self
    }
}

/// One evaluated grid vertex: where it lands and where it samples from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshVertex {
    pub dest: DVec2,
    pub src: DVec2,
}

/// Evaluates grid vertices for a warp. `(u, v)` run over `[0, 1]²`.
pub trait MeshSampler {
    /// `None` marks a vertex that cannot be placed (behind the camera); cells
    /// touching it are skipped.
    fn sample(&self, u: f64, v: f64) -> Option<MeshVertex>;

    /// Source width in pixels when the source wraps horizontally and is drawn
    /// from a doubled copy.
    fn seam_width(&self) -> Option<f64> {
        None
    }

    /// Extra horizontal destination copies at `±repeat` (unwrap views).
    fn repeat_x(&self) -> Option<f64> {
        None
    }
}

/// Equirectangular source seen through a pinhole camera into `viewport.rect`.
#[derive(Debug, Clone, Copy)]
pub struct PerspectiveSampler {
    pub basis: Basis,
    pub viewport: Viewport,
    pub src_w: f64,
    pub src_h: f64,
}

impl MeshSampler for PerspectiveSampler {
    fn sample(&self, u: f64, v: f64) -> Option<MeshVertex> {
        let r = self.viewport.rect;
        let dest = DVec2::new(r.x + u * r.w, r.y + v * r.h);
        let dir = unproject(dest, &self.basis, &self.viewport);
        Some(MeshVertex { dest, src: dir_to_uv(dir, self.src_w, self.src_h) })
    }

    fn seam_width(&self) -> Option<f64> {
        Some(self.src_w)
    }
}

/// Equirectangular source drawn flat into a 2:1 rect.
#[derive(Debug, Clone, Copy)]
pub struct FlatSampler {
    pub rect: Rect,
    pub src_w: f64,
    pub src_h: f64,
}

impl MeshSampler for FlatSampler {
    fn sample(&self, u: f64, v: f64) -> Option<MeshVertex> {
        Some(MeshVertex {
            dest: DVec2::new(self.rect.x + u * self.rect.w, self.rect.y + v * self.rect.h),
            src: DVec2::new(u * self.src_w, v * self.src_h),
        })
    }
}

/// A sticker bitmap laid onto its sphere patch, then projected.
#[derive(Debug, Clone, Copy)]
pub struct StickerSampler {
    pub frame: Frame,
    pub crop: Crop,
    pub projector: Projector,
    pub src_w: f64,
    pub src_h: f64,
    ref_x: Option<f64>,
}

impl StickerSampler {
    pub fn new(frame: Frame, crop: Crop, projector: Projector, src_w: f64, src_h: f64) -> Self {
        let ref_x = match projector {
            Projector::Unwrap { .. } => projector.project(frame.center, None).map(|p| p.x),
            Projector::Perspective { .. } => None,
        };
        Self { frame, crop, projector, src_w, src_h, ref_x }
    }
}

impl MeshSampler for StickerSampler {
    fn sample(&self, u: f64, v: f64) -> Option<MeshVertex> {
        let (cu, cv) = self.crop.map(u, v);
        let dir = self.frame.direction_at_uv(cu, cv);
        let dest = self.projector.project(dir, self.ref_x)?;
        Some(MeshVertex { dest, src: DVec2::new(cu * self.src_w, cv * self.src_h) })
    }

    fn repeat_x(&self) -> Option<f64> {
        match self.projector {
            Projector::Unwrap { rect } => Some(rect.w),
            Projector::Perspective { .. } => None,
        }
    }
}

fn draw_triangle<S: RasterSurface + ?Sized>(
    surface: &mut S,
    source: &RgbaImage,
    mut src: [DVec2; 3],
    dst: [DVec2; 3],
    seam: Option<f64>,
    options: &WarpOptions,
) -> bool {
    if let Some(w) = seam {
        unwrap_seam(&mut src, w);
    }
    let Some(t) = solve_affine(&src, &dst) else {
        return false;
    };
    let clip = inflate_triangle(&dst, options.inflate);
    surface.draw_image_triangle(source, &t, &clip, options.opacity)
}

/// Draws `source` through `sampler`'s grid. Returns the number of triangles drawn;
/// `0` means nothing visible and callers should treat it as a failed draw.
///
/// When the sampler reports a seam width, `source` must be the horizontally doubled
/// copy (see [`WrappedErpCache`]).
pub fn warp<S, M>(surface: &mut S, source: &RgbaImage, sampler: &M, options: &WarpOptions) -> usize
where
    S: RasterSurface + ?Sized,
    M: MeshSampler + ?Sized,
{
    let MeshDensity { nu, nv } = options.density;
    if nu == 0 || nv == 0 || source.width() == 0 || source.height() == 0 {
        return 0;
    }
    let cols = nu as usize + 1;
    let mut grid = Vec::with_capacity(cols * (nv as usize + 1));
    for j in 0..=nv {
        for i in 0..=nu {
            let v = sampler.sample(f64::from(i) / f64::from(nu), f64::from(j) / f64::from(nv));
            grid.push(v.filter(|m| m.dest.is_finite() && m.src.is_finite()));
        }
    }

    let seam = sampler.seam_width();
    let shifts: Vec<f64> = match sampler.repeat_x() {
        Some(r) => vec![0.0, r, -r],
        None => vec![0.0],
    };

    let mut drawn = 0;
    for j in 0..nv as usize {
        for i in 0..nu as usize {
            let cell = (
                grid[j * cols + i],
                grid[j * cols + i + 1],
                grid[(j + 1) * cols + i + 1],
                grid[(j + 1) * cols + i],
            );
            let (Some(v00), Some(v10), Some(v11), Some(v01)) = cell else {
                continue;
            };
            for &dx in &shifts {
                let off = DVec2::new(dx, 0.0);
                let tris = [
                    ([v00.src, v10.src, v11.src], [v00.dest + off, v10.dest + off, v11.dest + off]),
                    ([v00.src, v11.src, v01.src], [v00.dest + off, v11.dest + off, v01.dest + off]),
                ];
                for (src, dst) in tris {
                    if draw_triangle(surface, source, src, dst, seam, options) {
                        drawn += 1;
                    }
                }
            }
        }
    }
    drawn
}

/// Owns the seam-safe panorama copy and draws panoramas through it.
#[derive(Debug, Default)]
pub struct MeshWarpRenderer {
    cache: WrappedErpCache,
}

impl MeshWarpRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cache(&self) -> &WrappedErpCache {
        &self.cache
    }

    pub fn invalidate(&mut self) {
        self.cache.invalidate();
    }

    /// Panorama through a pinhole camera. `identity` keys the doubled-copy cache.
    pub fn draw_perspective<S: RasterSurface + ?Sized>(
        &mut self,
        surface: &mut S,
        identity: &str,
        erp: &RgbaImage,
        basis: Basis,
        viewport: Viewport,
        options: &WarpOptions,
    ) -> usize {
        if viewport.rect.is_degenerate() {
            return 0;
        }
        let (w, h) = erp.dimensions();
        let Some(wrapped) = self.cache.get_or_build(identity, erp) else {
            return 0;
        };
        let sampler = PerspectiveSampler { basis, viewport, src_w: f64::from(w), src_h: f64::from(h) };
        warp(surface, wrapped, &sampler, options)
    }

    /// Panorama drawn flat into `rect`.
    pub fn draw_flat<S: RasterSurface + ?Sized>(&mut self, surface: &mut S, erp: &RgbaImage, rect: Rect) -> usize {
        if rect.is_degenerate() || erp.width() == 0 || erp.height() == 0 {
            return 0;
        }
        let sampler = FlatSampler { rect, src_w: f64::from(erp.width()), src_h: f64::from(erp.height()) };
        warp(surface, erp, &sampler, &WarpOptions::new(MeshDensity::new(1, 1)))
    }
}

/// Parses `#rrggbb` into an opaque pixel, falling back to green.
pub fn hex_to_rgba(hex: &str) -> Rgba<u8> {
    let s = hex.trim().trim_start_matches('#');
    let channel = |i: usize| s.get(i..i + 2).and_then(|c| u8::from_str_radix(c, 16).ok());
    match (s.len(), channel(0), channel(2), channel(4)) {
        (6, Some(r), Some(g), Some(b)) => Rgba([r, g, b, 255]),
        _ => Rgba([0, 255, 0, 255]),
    }
}

/// Rectilinear aspect (w / h) of a frustum, as used for output sizing.
fn rectilinear_aspect(h_fov_deg: f64, v_fov_deg: f64) -> f64 {
    let th = (h_fov_deg.max(0.1).to_radians() * 0.5).tan();
    let tv = (v_fov_deg.max(0.1).to_radians() * 0.5).tan();
    clamp(th / tv.max(1e-6), 0.05, 20.0)
}

/// Output size whose long side is `long_side` and whose aspect follows the FOVs.
pub fn output_size_from_long_side(h_fov_deg: f64, v_fov_deg: f64, long_side: u32, max_side: u32) -> (u32, u32) {
    use crate::math::round_to_multiple;
    let max_side = max_side.max(8);
    let long = f64::from(long_side.clamp(8, max_side));
    let ratio = rectilinear_aspect(h_fov_deg, v_fov_deg);
    let (w, h) = if ratio >= 1.0 {
        (round_to_multiple(long, 8, 8), round_to_multiple(long / ratio, 8, 8))
    } else {
        (round_to_multiple(long * ratio, 8, 8), round_to_multiple(long, 8, 8))
    };
    (w.clamp(8, max_side), h.clamp(8, max_side))
}

/// Output size with roughly `megapixels` million pixels and the FOV aspect.
pub fn output_size_from_megapixels(megapixels: f64, h_fov_deg: f64, v_fov_deg: f64, max_side: u32) -> (u32, u32) {
    use crate::math::round_to_multiple;
    let target = crate::math::finite_or(megapixels, 1.0).max(0.01) * 1_000_000.0;
    let th = (h_fov_deg.max(0.01).to_radians() * 0.5).tan();
    let tv = (v_fov_deg.max(0.01).to_radians() * 0.5).tan();
    let mut aspect = th / tv.max(1e-6);
    if !aspect.is_finite() || aspect <= 1e-6 {
        aspect = 1.0;
    }
    let h = (target / aspect).sqrt();
    let w = h * aspect;
    let max_side = max_side.max(8);
    (
        round_to_multiple(w, 8, 8).clamp(8, max_side),
        round_to_multiple(h, 8, 8).clamp(8, max_side),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::FovAxis;

    fn erp(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_fn(w, h, |x, _| if x < w / 2 { Rgba([255, 0, 0, 255]) } else { Rgba([0, 0, 255, 255]) })
    }

    #[test]
    fn presets_follow_quality() {
        assert_eq!(MeshDensity::background(PreviewQuality::Balanced), MeshDensity::new(32, 20));
        assert_eq!(MeshDensity::node_preview(PreviewQuality::Draft), MeshDensity::new(14, 9));
        assert_eq!(MeshDensity::cutout_preview(PreviewQuality::High), MeshDensity::new(20, 14));
        assert_eq!(
            MeshDensity::sticker(PreviewQuality::Balanced, StickerPass::Refine),
            MeshDensity::new(40, 30)
        );
        assert_eq!(WarpOptions::new(MeshDensity::new(8, 6)).inflate, 0.35);
        assert_eq!(WarpOptions::new(MeshDensity::new(32, 20)).inflate, 0.45);
    }

    #[test]
    fn perspective_warp_draws_triangles() {
        let mut r = MeshWarpRenderer::new();
        let mut out = RgbaImage::new(100, 100);
        let vp = Viewport::from_fov(Rect::new(0.0, 0.0, 100.0, 100.0), 100.0, FovAxis::Horizontal);
        let n = r.draw_perspective(&mut out, "pano", &erp(64, 32), Basis::new(0.0, 0.0, 0.0), vp, &WarpOptions::new(MeshDensity::new(8, 8)));
        assert!(n > 0);
        assert_eq!(out.get_pixel(50, 50)[3], 255);
    }

    #[test]
    fn seam_view_is_fully_covered() {
        // 朝向 yaw=180 时接缝正好在画面中央
        let mut r = MeshWarpRenderer::new();
        let src = RgbaImage::from_pixel(64, 32, Rgba([10, 200, 10, 255]));
        let mut out = RgbaImage::new(60, 60);
        let vp = Viewport::from_fov(Rect::new(0.0, 0.0, 60.0, 60.0), 90.0, FovAxis::Horizontal);
        let n = r.draw_perspective(&mut out, "g", &src, Basis::new(180.0, 0.0, 0.0), vp, &WarpOptions::new(MeshDensity::new(12, 12)));
        assert!(n > 0);
        for x in 0..60 {
            assert_eq!(out.get_pixel(x, 30).0, [10, 200, 10, 255]);
        }
    }

    #[test]
    fn missing_or_degenerate_input_draws_nothing() {
        let mut r = MeshWarpRenderer::new();
        let mut out = RgbaImage::new(10, 10);
        let vp = Viewport::from_fov(Rect::new(0.0, 0.0, 10.0, 10.0), 90.0, FovAxis::Horizontal);
        let opts = WarpOptions::new(MeshDensity::new(4, 4));
        assert_eq!(r.draw_perspective(&mut out, "none", &RgbaImage::new(0, 0), Basis::new(0.0, 0.0, 0.0), vp, &opts), 0);
        let flat = Viewport::from_fov(Rect::new(0.0, 0.0, 0.5, 10.0), 90.0, FovAxis::Horizontal);
        assert_eq!(r.draw_perspective(&mut out, "p", &erp(8, 4), Basis::new(0.0, 0.0, 0.0), flat, &opts), 0);
    }

    #[test]
    fn hex_colour_parsing() {
        assert_eq!(hex_to_rgba("#102030"), Rgba([16, 32, 48, 255]));
        assert_eq!(hex_to_rgba("nope"), Rgba([0, 255, 0, 255]));
    }

    #[test]
    fn output_sizes_follow_fov_aspect() {
        assert_eq!(output_size_from_long_side(90.0, 90.0, 1024, 4096), (1024, 1024));
        let (w, h) = output_size_from_long_side(120.0, 60.0, 1024, 4096);
        assert_eq!(w, 1024);
        assert!(h < w && h % 8 == 0);
        let (w, h) = output_size_from_megapixels(1.0, 90.0, 90.0, 8192);
        assert_eq!((w, h), (1000, 1000));
    }
}
