// export.rs — 离线输出：裁切画框渲染、贴纸合成到全景图

use glam::{DVec2, DVec3};
use image::RgbaImage;

use crate::assets::BitmapSource;
use crate::camera::{Basis, Projector, Rect, Viewport};
use crate::equirect::{dir_to_lon_lat, lon_lat_to_dir, uv_to_lon_lat};
use crate::error::{Error, Result};
use crate::raster::{blend_over, sample_bilinear, RasterSurface};
use crate::state::{Crop, CutoutShot, EditorState, PreviewQuality};
use crate::sticker::{Frame, Placement};
use crate::warp::{hex_to_rgba, warp, MeshDensity, MeshWarpRenderer, StickerPass, StickerSampler, WarpOptions};

/// Renders the rectilinear view a cutout frame describes, at its output size.
pub fn render_cutout(erp: &RgbaImage, shot: &CutoutShot) -> Result<RgbaImage> {
    let (w, h) = (shot.out_w.max(8), shot.out_h.max(8));
    let mut out = RgbaImage::new(w, h);
    let rect = Rect::new(0.0, 0.0, f64::from(w), f64::from(h));
    let viewport = Viewport::from_fovs(rect, shot.hfov_deg, shot.vfov_deg);
    let basis = Basis::new(shot.yaw_deg, shot.pitch_deg, shot.roll_deg);
    let options = WarpOptions::new(MeshDensity::export(w, h));

    let drawn = MeshWarpRenderer::new().draw_perspective(&mut out, &shot.id, erp, basis, viewport, &options);
    if drawn == 0 {
        log::warn!("cutout {} rendered no triangles", shot.id);
        return Err(Error::NothingDrawn("cutout"));
    }
    log::debug!("cutout {} rendered {w}x{h} from {drawn} triangles", shot.id);
    Ok(out)
}

/// [`render_cutout`] for the document's active frame.
pub fn render_state_cutout(erp: &RgbaImage, state: &EditorState) -> Result<RgbaImage> {
    let shot = state.shot().ok_or(Error::NothingDrawn("no cutout frame"))?;
    render_cutout(erp, shot)
}

/// Equirectangular output size for a sticker composite: `preset × preset/2`.
pub fn erp_output_size(state: &EditorState) -> (u32, u32) {
    let w = state.output_preset.max(8);
    (w, (w / 2).max(4))
}

/// Bakes every sticker into an equirectangular image, in z order, over either the
/// background panorama or a flat `bg_color` fill. Stickers without a bitmap are skipped.
pub fn compose_stickers_to_erp(
    state: &EditorState,
    bitmaps: &dyn BitmapSource,
    background: Option<&RgbaImage>,
    out_w: u32,
    out_h: u32,
) -> RgbaImage {
    let mut out = RgbaImage::new(out_w.max(2), out_h.max(2));
    let rect = Rect::new(0.0, 0.0, f64::from(out.width()), f64::from(out.height()));
    out.fill(hex_to_rgba(&state.bg_color));
    if let Some(bg) = background {
        if MeshWarpRenderer::new().draw_flat(&mut out, bg, rect) == 0 {
            log::warn!("background panorama could not be drawn; using bg_color");
        }
    }

    let projector = Projector::Unwrap { rect };
    let options = WarpOptions::new(MeshDensity::sticker(PreviewQuality::High, StickerPass::Refine));
    let mut drawn = 0;
    for s in state.stickers_by_z() {
        let Some(bmp) = bitmaps.bitmap(&s.asset_id) else {
            log::debug!("sticker {} skipped: asset {} not loaded", s.id, s.asset_id);
            continue;
        };
        let (frame, crop) = (s.frame(), s.crop());
        if let Some(rows) = pole_rows(&frame, &crop, out.height()) {
            log::debug!("sticker {} covers a pole; resampling rows {rows:?}", s.id);
            resample_rows(&mut out, bmp, &frame, &crop, rows);
            continue;
        }
        let sampler = StickerSampler::new(frame, crop, projector, f64::from(bmp.width()), f64::from(bmp.height()));
        drawn += warp(&mut out, bmp, &sampler, &options);
    }
    log::debug!("composited {} stickers ({drawn} triangles)", state.stickers.len());
    out
}

/// Slack in patch UV when testing whether a pole falls inside a sticker.
const POLE_UV_MARGIN: f64 = 0.02;
const POLE_BOUNDARY_STEPS: u32 = 32;

/// Output rows `[y0, y1)` spanned by a patch that covers a pole, `None` otherwise.
/// Mesh cells around a pole fan across every longitude and leave a gap in the unwrap,
/// so such patches are inverse-mapped per pixel instead.
fn pole_rows(frame: &Frame, crop: &Crop, h: u32) -> Option<(u32, u32)> {
    let covers = |pole: DVec3| {
        frame.uv_of(pole).is_some_and(|(u, v)| {
            u >= crop.x0 - POLE_UV_MARGIN
                && u <= crop.x1 + POLE_UV_MARGIN
                && v >= crop.y0 - POLE_UV_MARGIN
                && v <= crop.y1 + POLE_UV_MARGIN
        })
    };
    let (north, south) = (covers(DVec3::Y), covers(DVec3::NEG_Y));
    if !north && !south {
        return None;
    }

    // 纬度极值落在边界上（极点除外）
    let mut lat_lo = f64::INFINITY;
    let mut lat_hi = f64::NEG_INFINITY;
    let n = POLE_BOUNDARY_STEPS;
    for i in 0..n {
        let t = f64::from(i) / f64::from(n);
        for (u, v) in [(t, 0.0), (1.0, t), (1.0 - t, 1.0), (0.0, 1.0 - t)] {
            let (cu, cv) = crop.map(u, v);
            let lat = dir_to_lon_lat(frame.direction_at_uv(cu, cv)).lat;
            lat_lo = lat_lo.min(lat);
            lat_hi = lat_hi.max(lat);
        }
    }
    if north {
        lat_hi = std::f64::consts::FRAC_PI_2;
    }
    if south {
        lat_lo = -std::f64::consts::FRAC_PI_2;
    }
    let row = |lat: f64| (0.5 - lat / std::f64::consts::PI) * f64::from(h);
    let y0 = (row(lat_hi).floor() - 1.0).max(0.0) as u32;
    let y1 = ((row(lat_lo).ceil() + 1.0).max(0.0) as u32).min(h);
    (y0 < y1).then_some((y0, y1))
}

fn resample_rows(out: &mut RgbaImage, bmp: &RgbaImage, frame: &Frame, crop: &Crop, (y0, y1): (u32, u32)) {
    let (w, h) = (f64::from(out.width()), f64::from(out.height()));
    let (bw, bh) = (f64::from(bmp.width()), f64::from(bmp.height()));
    for y in y0..y1 {
        for x in 0..out.width() {
            let uv = DVec2::new(f64::from(x) + 0.5, f64::from(y) + 0.5);
            let Some((u, v)) = frame.uv_of(lon_lat_to_dir(uv_to_lon_lat(uv, w, h))) else {
                continue;
            };
            if u < crop.x0 || u > crop.x1 || v < crop.y0 || v > crop.y1 {
                continue;
            }
            let c = sample_bilinear(bmp, u * bw, v * bh);
            blend_over(out.get_pixel_mut(x, y), c, 1.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{Asset, AssetSource};
    use image::Rgba;
    use std::collections::HashMap;

    #[test]
    fn cutout_renders_at_output_size() {
        let erp = RgbaImage::from_pixel(128, 64, Rgba([9, 99, 199, 255]));
        let mut shot = CutoutShot::new_at(30.0, 10.0);
        shot.out_w = 64;
        shot.out_h = 48;
        let img = render_cutout(&erp, &shot).unwrap();
        assert_eq!(img.dimensions(), (64, 48));
        assert_eq!(img.get_pixel(32, 24).0, [9, 99, 199, 255]);
        assert_eq!(img.get_pixel(0, 0).0, [9, 99, 199, 255]);
    }

    #[test]
    fn empty_panorama_draws_nothing() {
        let shot = CutoutShot::new_at(0.0, 0.0);
        assert!(matches!(render_cutout(&RgbaImage::new(0, 0), &shot), Err(Error::NothingDrawn(_))));
        assert!(matches!(render_state_cutout(&RgbaImage::new(8, 4), &EditorState::default()), Err(Error::NothingDrawn(_))));
    }

    #[test]
    fn stickers_bake_over_bg_color() {
        let mut state = EditorState::default();
        let asset = state.add_asset(Asset::new(AssetSource::Path { value: "red.png".into() }));
        state.add_sticker(&asset, (16, 16), 0.0, 0.0);
        // 资源缺失的贴纸被跳过
        state.add_sticker("missing", (16, 16), 180.0, 0.0);

        let mut bitmaps = HashMap::new();
        bitmaps.insert(asset, RgbaImage::from_pixel(16, 16, Rgba([255, 0, 0, 255])));

        let (w, h) = (256, 128);
        let out = compose_stickers_to_erp(&state, &bitmaps, None, w, h);
        assert_eq!(out.get_pixel(w / 2, h / 2).0, [255, 0, 0, 255]);
        assert_eq!(out.get_pixel(10, 10).0, [0, 255, 0, 255]);
        assert_eq!(out.get_pixel(0, h / 2).0, [0, 255, 0, 255]);
    }

    #[test]
    fn seam_sticker_appears_on_both_edges() {
        let mut state = EditorState::default();
        let asset = state.add_asset(Asset::new(AssetSource::Path { value: "b.png".into() }));
        state.add_sticker(&asset, (16, 16), 180.0, 0.0);
        let mut bitmaps = HashMap::new();
        bitmaps.insert(asset, RgbaImage::from_pixel(16, 16, Rgba([0, 0, 255, 255])));

        let out = compose_stickers_to_erp(&state, &bitmaps, None, 256, 128);
        assert_eq!(out.get_pixel(2, 64).0, [0, 0, 255, 255]);
        assert_eq!(out.get_pixel(253, 64).0, [0, 0, 255, 255]);
    }

    #[test]
    fn sticker_over_the_pole_closes_the_cap() {
        let mut state = EditorState::default();
        let asset = state.add_asset(Asset::new(AssetSource::Path { value: "cap.png".into() }));
        let id = state.add_sticker(&asset, (16, 16), 0.0, 89.9);
        if let Some(s) = state.stickers.iter_mut().find(|s| s.id == id) {
            s.pitch_deg = 89.9;
            s.hfov_deg = 30.0;
            s.vfov_deg = 30.0;
        }
        let mut bitmaps = HashMap::new();
        bitmaps.insert(asset, RgbaImage::from_pixel(16, 16, Rgba([255, 0, 0, 255])));

        let out = compose_stickers_to_erp(&state, &bitmaps, None, 512, 256);
        // 纬度 75° 以上整圈都应被覆盖
        for y in 0..20 {
            for x in 0..512 {
                assert_eq!(out.get_pixel(x, y).0, [255, 0, 0, 255], "gap at ({x}, {y})");
            }
        }
        assert_eq!(out.get_pixel(100, 60).0, [0, 255, 0, 255]);
    }

    #[test]
    fn equator_sticker_keeps_the_mesh_path() {
        let f = Frame::new(0.0, 0.0, 0.0, 30.0, 30.0);
        assert!(pole_rows(&f, &Crop::FULL, 256).is_none());
        let (y0, y1) = pole_rows(&Frame::new(40.0, -80.0, 10.0, 30.0, 30.0), &Crop::FULL, 256).unwrap();
        assert!(y0 > 128 && y1 == 256);
    }

    #[test]
    fn erp_size_is_two_to_one() {
        let state = EditorState { output_preset: 1024, ..EditorState::default() };
        assert_eq!(erp_output_size(&state), (1024, 512));
    }
}
