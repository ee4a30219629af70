// scenarios.rs — 端到端场景：裁切渲染、贴纸合成、文档存取

use std::collections::HashMap;
use std::time::Duration;

use glam::DVec2;
use image::{Rgba, RgbaImage};

use pano_suite::export::{erp_output_size, render_state_cutout};
use pano_suite::warp::{MeshDensity, MeshWarpRenderer, StickerPass, WarpOptions};
use pano_suite::{
    compose_stickers_to_erp, render_cutout, Asset, AssetSource, Basis, CutoutShot, EditorKind, EditorSession,
    EditorState, Error, FovAxis, PointerButton, PreviewQuality, Rect, Sticker, Viewport,
};

const A: Rgba<u8> = Rgba([255, 0, 0, 255]);
const B: Rgba<u8> = Rgba([0, 0, 255, 255]);
const C: Rgba<u8> = Rgba([255, 255, 0, 255]);
const D: Rgba<u8> = Rgba([0, 255, 255, 255]);

/// Four longitude bands: [-180,-90) A, [-90,0) B, [0,90) C, [90,180) D.
fn banded_erp() -> RgbaImage {
    RgbaImage::from_fn(256, 128, |x, _| match x / 64 {
        0 => A,
        1 => B,
        2 => C,
        _ => D,
    })
}

fn shot(yaw: f64, pitch: f64) -> CutoutShot {
    let mut s = CutoutShot::new_at(yaw, pitch);
    s.hfov_deg = 20.0;
    s.vfov_deg = 20.0;
    s.out_w = 32;
    s.out_h = 32;
    s
}

fn center(img: &RgbaImage) -> Rgba<u8> {
    *img.get_pixel(img.width() / 2, img.height() / 2)
}

#[test]
fn cutout_looks_where_the_frame_points() {
    let erp = banded_erp();
    for (yaw, want) in [(-135.0, A), (-45.0, B), (45.0, C), (135.0, D)] {
        let img = render_cutout(&erp, &shot(yaw, 0.0)).unwrap();
        assert_eq!(img.dimensions(), (32, 32));
        assert_eq!(center(&img), want, "yaw {yaw}");
    }
}

#[test]
fn cutout_across_the_seam_sees_both_sides() {
    let erp = banded_erp();
    let mut s = shot(180.0, 0.0);
    s.hfov_deg = 40.0;
    let img = render_cutout(&erp, &s).unwrap();
    // 左半边是 yaw < 180（D），右半边跨过接缝（A）
    assert_eq!(*img.get_pixel(4, 16), D);
    assert_eq!(*img.get_pixel(27, 16), A);
}

#[test]
fn cutout_pitch_selects_sky_or_ground() {
    let erp = RgbaImage::from_fn(128, 64, |_, y| if y < 32 { Rgba([255, 255, 255, 255]) } else { Rgba([0, 0, 0, 255]) });
    assert_eq!(center(&render_cutout(&erp, &shot(0.0, 60.0)).unwrap()).0, [255, 255, 255, 255]);
    assert_eq!(center(&render_cutout(&erp, &shot(0.0, -60.0)).unwrap()).0, [0, 0, 0, 255]);
}

#[test]
fn two_pixel_panorama_still_fills_the_view() {
    let erp = RgbaImage::from_pixel(2, 1, A);
    let mut surface = RgbaImage::new(100, 100);
    let viewport = Viewport::from_fov(Rect::new(0.0, 0.0, 100.0, 100.0), 100.0, FovAxis::Horizontal);
    let options = WarpOptions::new(MeshDensity::new(8, 8));
    let drawn = MeshWarpRenderer::new().draw_perspective(&mut surface, "tiny", &erp, Basis::new(0.0, 0.0, 0.0), viewport, &options);
    assert!(drawn > 0);
    assert_eq!(*surface.get_pixel(50, 50), A);
}

#[test]
fn state_without_a_frame_cannot_be_cut() {
    let err = render_state_cutout(&banded_erp(), &EditorState::default()).unwrap_err();
    assert!(matches!(err, Error::NothingDrawn(_)));
}

#[test]
fn composite_places_stickers_by_longitude() {
    let mut state = EditorState::default();
    state.output_preset = 256;
    state.assets.insert("red".into(), Asset::new(AssetSource::Path { value: "red.png".into() }));
    state.stickers.push(Sticker {
        id: "s1".into(),
        asset_id: "red".into(),
        yaw_deg: 90.0,
        pitch_deg: 0.0,
        hfov_deg: 20.0,
        vfov_deg: 20.0,
        rot_deg: 0.0,
        crop: None,
        z_index: 0,
    });
    let mut bitmaps = HashMap::new();
    bitmaps.insert("red".to_owned(), RgbaImage::from_pixel(8, 8, A));

    let (w, h) = erp_output_size(&state);
    assert_eq!((w, h), (256, 128));
    let out = compose_stickers_to_erp(&state, &bitmaps, None, w, h);
    assert_eq!(*out.get_pixel(192, 64), A);
    // 默认背景色 #00ff00
    assert_eq!(out.get_pixel(64, 64).0, [0, 255, 0, 255]);

    let bg = RgbaImage::from_pixel(64, 32, B);
    let out = compose_stickers_to_erp(&state, &bitmaps, Some(&bg), w, h);
    assert_eq!(*out.get_pixel(192, 64), A);
    assert_eq!(*out.get_pixel(64, 64), B);
}

#[test]
fn higher_sticker_wins_where_they_overlap() {
    let mut state = EditorState::default();
    for (id, z) in [("low", 0), ("high", 1)] {
        state.assets.insert(id.into(), Asset::new(AssetSource::Path { value: format!("{id}.png") }));
        state.stickers.push(Sticker {
            id: id.into(),
            asset_id: id.into(),
            yaw_deg: 0.0,
            pitch_deg: 0.0,
            hfov_deg: 30.0,
            vfov_deg: 30.0,
            rot_deg: 0.0,
            crop: None,
            z_index: z,
        });
    }
    // 低层在向量里排在后面，绘制顺序仍由 z 决定
    state.stickers.reverse();
    let mut bitmaps = HashMap::new();
    bitmaps.insert("low".to_owned(), RgbaImage::from_pixel(4, 4, B));
    bitmaps.insert("high".to_owned(), RgbaImage::from_pixel(4, 4, C));
    let out = compose_stickers_to_erp(&state, &bitmaps, None, 256, 128);
    assert_eq!(*out.get_pixel(128, 64), C);
}

#[test]
fn document_survives_a_save_and_reload() {
    let mut s = EditorSession::new(EditorKind::Stickers, EditorState::default());
    s.resize(640, 480);
    let mut asset = Asset::new(AssetSource::Path { value: "stickers/cat.png".into() });
    asset.name = Some("cat".into());
    let first = s.add_sticker(asset, (200, 100));
    s.duplicate_selected();
    s.send_selected_to_back();
    s.state_mut().ui_settings.preview_quality = PreviewQuality::High;

    let text = s.state().to_json_string().unwrap();
    let reloaded = EditorState::from_json_str(&text);
    assert_eq!(reloaded.stickers, s.state().stickers);
    assert_eq!(reloaded.assets, s.state().assets);
    assert_eq!(reloaded.ui_settings.preview_quality, PreviewQuality::High);
    assert!(reloaded.sticker(&first).is_some());
    assert_eq!(reloaded.stickers_by_z().last().map(|st| st.id.as_str()), Some(first.as_str()));
}

#[test]
fn later_layers_override_earlier_ones() {
    let base = r##"{"bg_color": "#112233", "output_preset": 1024}"##;
    let overlay = r##"{"output_preset": 4096}"##;
    let s = EditorState::from_layers(&[base, overlay], 2048, "#00ff00");
    assert_eq!(s.bg_color, "#112233");
    assert_eq!(s.output_preset, 4096);
    let s = EditorState::from_layers(&[], 512, "#abcdef");
    assert_eq!((s.output_preset, s.bg_color.as_str()), (512, "#abcdef"));
}

#[test]
fn editing_session_drags_then_refines() {
    let ms = Duration::from_millis;
    let mut s = EditorSession::new(EditorKind::Stickers, EditorState::default());
    let id = s.add_sticker(Asset::new(AssetSource::Path { value: "p.png".into() }), (64, 64));
    let asset_id = s.state().sticker(&id).unwrap().asset_id.clone();
    let mut bitmaps = HashMap::new();
    bitmaps.insert(asset_id, RgbaImage::from_pixel(8, 8, A));
    let mut surface = RgbaImage::new(320, 240);
    s.render_preview(&mut surface, &bitmaps, ms(0));

    assert!(s.pointer_down(DVec2::new(160.0, 120.0), PointerButton::Primary, ms(10)));
    s.pointer_move(DVec2::new(200.0, 120.0), false, ms(20));
    let stats = s.render_preview(&mut surface, &bitmaps, ms(20));
    assert_eq!((stats.quality, stats.pass), (PreviewQuality::Draft, StickerPass::Interacting));

    s.pointer_up(ms(30));
    assert!(s.state().sticker(&id).unwrap().yaw_deg > 0.0);
    let stats = s.render_preview(&mut surface, &bitmaps, ms(40));
    assert_eq!((stats.quality, stats.pass), (PreviewQuality::High, StickerPass::Refine));
}
