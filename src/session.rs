// session.rs — 编辑器会话：视角、选择、拖拽、画质调度与预览绘制

use std::time::{Duration, Instant};

use glam::DVec2;
use image::{Rgba, RgbaImage};

use crate::assets::BitmapSource;
use crate::camera::{Basis, FovAxis, Projector, Rect, Viewport};
use crate::equirect::unwrap_rect;
use crate::interaction::{
    DragMode, FrameRequest, InteractionController, InteractionEvent, NavConfig, PhaseKind, View, ViewHost,
};
use crate::math::{clamp, ease_in_cubic, ease_out_cubic, lerp};
use crate::overlay;
use crate::raster::RasterSurface;
use crate::state::{Asset, CutoutShot, EditorState, PreviewQuality};
use crate::sticker::{hit_topmost, Placement, PlacementDrag, ScreenGeometry};
use crate::warp::{warp, MeshDensity, MeshWarpRenderer, StickerPass, StickerSampler, WarpOptions};

const BACKDROP: Rgba<u8> = Rgba([16, 16, 20, 255]);

/// Duration of the cutout inset expand/collapse animation.
pub const INSET_ANIM: Duration = Duration::from_millis(180);
// 预览小窗占画布的比例与边距
const INSET_FRACTION: f64 = 0.3;
const INSET_MARGIN: f64 = 12.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorKind {
    Stickers,
    Cutout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewMode {
    /// Perspective look-around.
    Pano,
    /// Whole panorama laid out flat.
    Unwrap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    Primary,
    Middle,
}

/// Picks mesh quality per frame from interaction state and measured frame time.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct QualityGovernor {
    ema_ms: Option<f64>,
    refine_frames: u32,
}

impl QualityGovernor {
    pub const EMA_ALPHA: f64 = 0.16;
    pub const SLOW_FRAME_MS: f64 = 26.0;
    pub const REFINE_FRAMES: u32 = 10;

    pub fn record_frame(&mut self, ms: f64) {
        if !ms.is_finite() || ms < 0.0 {
            return;
        }
        self.ema_ms = Some(match self.ema_ms {
            Some(e) => e + (ms - e) * Self::EMA_ALPHA,
            None => ms,
        });
    }

    pub fn frame_ms(&self) -> Option<f64> {
        self.ema_ms
    }

    pub fn is_slow(&self) -> bool {
        self.ema_ms.is_some_and(|e| e > Self::SLOW_FRAME_MS)
    }

    /// Schedules a burst of high-quality frames once an interaction settles.
    pub fn begin_refine(&mut self) {
        self.refine_frames = Self::REFINE_FRAMES;
    }

    pub fn refine_pending(&self) -> bool {
        self.refine_frames > 0
    }

    /// Quality for the next frame; consumes one refine frame when one is pending.
    pub fn pick(&mut self, user: PreviewQuality, interacting: bool) -> (PreviewQuality, StickerPass) {
        if interacting {
            return (PreviewQuality::Draft, StickerPass::Interacting);
        }
        if self.refine_frames > 0 {
            self.refine_frames -= 1;
            return (PreviewQuality::High, StickerPass::Refine);
        }
        let q = if self.is_slow() { user.lower() } else { user };
        (q, StickerPass::Settled)
    }
}

/// The view plus what the controller needs to know about its host.
#[derive(Debug, Clone, Copy)]
struct ViewSlot {
    view: View,
    invert: (bool, bool),
    unwrap: Rect,
    dirty: bool,
}

impl ViewHost for ViewSlot {
    fn view(&self) -> View {
        self.view
    }

    fn set_view(&mut self, view: View) {
        self.view = view;
        self.dirty = true;
    }

    fn invert(&self) -> (bool, bool) {
        self.invert
    }

    fn unwrap_rect(&self) -> Rect {
        self.unwrap
    }

    fn notify(&mut self, event: InteractionEvent) {
        if !matches!(event, InteractionEvent::ViewChanged) {
            self.dirty = true;
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum ActiveDrag {
    View,
    Placement(PlacementDrag),
}

#[derive(Debug, Clone, Copy)]
struct InsetAnim {
    expanded: bool,
    from: f64,
    started: Option<Duration>,
}

impl InsetAnim {
    fn target(&self) -> f64 {
        if self.expanded {
            1.0
        } else {
            0.0
        }
    }

    fn value(&self, now: Duration) -> f64 {
        let Some(start) = self.started else {
            return self.target();
        };
        let t = clamp(now.saturating_sub(start).as_secs_f64() / INSET_ANIM.as_secs_f64(), 0.0, 1.0);
        let e = if self.expanded { ease_out_cubic(t) } else { ease_in_cubic(t) };
        lerp(self.from, self.target(), e)
    }

    fn running(&self, now: Duration) -> bool {
        self.started.is_some_and(|s| now.saturating_sub(s) < INSET_ANIM)
    }
}

/// A loaded panorama and the identity its seam cache is keyed by.
#[derive(Debug, Clone)]
pub struct Panorama {
    pub identity: String,
    pub image: RgbaImage,
}

/// What one preview frame did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreviewStats {
    pub triangles: usize,
    pub quality: PreviewQuality,
    pub pass: StickerPass,
}

/// One open editor: a document, the camera looking at it and the pointer state.
pub struct EditorSession {
    kind: EditorKind,
    mode: ViewMode,
    slot: ViewSlot,
    state: EditorState,
    controller: InteractionController,
    canvas: Rect,
    drag: Option<ActiveDrag>,
    governor: QualityGovernor,
    renderer: MeshWarpRenderer,
    panorama: Option<Panorama>,
    inset: InsetAnim,
    redraw: bool,
}

impl EditorSession {
    pub fn new(kind: EditorKind, state: EditorState) -> Self {
        Self::with_config(kind, state, NavConfig::default())
    }

    pub fn with_config(kind: EditorKind, mut state: EditorState, config: NavConfig) -> Self {
        state.normalize();
        let canvas = Rect::new(0.0, 0.0, 1.0, 1.0);
        let invert = (state.ui_settings.invert_view_x, state.ui_settings.invert_view_y);
        Self {
            kind,
            mode: ViewMode::Pano,
            slot: ViewSlot {
                view: View::new(0.0, 0.0, config.initial_fov),
                invert,
                unwrap: unwrap_rect(canvas.w, canvas.h),
                dirty: false,
            },
            state,
            controller: InteractionController::new(config),
            canvas,
            drag: None,
            governor: QualityGovernor::default(),
            renderer: MeshWarpRenderer::new(),
            panorama: None,
            inset: InsetAnim { expanded: true, from: 1.0, started: None },
            redraw: true,
        }
    }

    pub fn kind(&self) -> EditorKind {
        self.kind
    }

    pub fn mode(&self) -> ViewMode {
        self.mode
    }

    /// Switching modes abandons any drag or motion in progress.
    pub fn set_mode(&mut self, mode: ViewMode) {
        if self.mode == mode {
            return;
        }
        self.controller.stop();
        self.drag = None;
        self.mode = mode;
        self.redraw = true;
    }

    pub fn view(&self) -> View {
        self.slot.view
    }

    pub fn set_view(&mut self, view: View) {
        self.slot.set_view(view.normalized(self.controller.config()));
    }

    pub fn controller(&self) -> &InteractionController {
        &self.controller
    }

    pub fn governor(&self) -> &QualityGovernor {
        &self.governor
    }

    pub fn state(&self) -> &EditorState {
        &self.state
    }

    /// Replaces the document; drags are dropped and invariants re-established.
    pub fn set_state(&mut self, mut state: EditorState) {
        state.normalize();
        self.slot.invert = (state.ui_settings.invert_view_x, state.ui_settings.invert_view_y);
        self.state = state;
        self.drag = None;
        self.redraw = true;
    }

    /// Direct document access for hosts; marks the preview dirty.
    pub fn state_mut(&mut self) -> &mut EditorState {
        self.redraw = true;
        &mut self.state
    }

    pub fn set_invert_view(&mut self, x: bool, y: bool) {
        self.state.ui_settings.invert_view_x = x;
        self.state.ui_settings.invert_view_y = y;
        self.slot.invert = (x, y);
    }

    pub fn canvas(&self) -> Rect {
        self.canvas
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        let canvas = Rect::new(0.0, 0.0, f64::from(width.max(1)), f64::from(height.max(1)));
        if canvas == self.canvas {
            return;
        }
        self.canvas = canvas;
        self.slot.unwrap = unwrap_rect(canvas.w, canvas.h);
        self.redraw = true;
    }

    pub fn set_panorama(&mut self, identity: impl Into<String>, image: RgbaImage) {
        let identity = identity.into();
        log::info!("panorama {identity} set ({}x{})", image.width(), image.height());
        self.renderer.invalidate();
        self.panorama = Some(Panorama { identity, image });
        self.redraw = true;
    }

    pub fn clear_panorama(&mut self) {
        self.renderer.invalidate();
        self.panorama = None;
        self.redraw = true;
    }

    pub fn panorama(&self) -> Option<&Panorama> {
        self.panorama.as_ref()
    }

    pub fn request_redraw(&mut self) {
        self.redraw = true;
    }

    /// Returns and clears the pending-redraw flag.
    pub fn take_redraw(&mut self) -> bool {
        let r = self.redraw || self.slot.dirty;
        self.redraw = false;
        self.slot.dirty = false;
        r
    }

    pub fn projector(&self) -> Projector {
        match self.mode {
            ViewMode::Pano => {
                let v = self.slot.view;
                Projector::Perspective {
                    basis: Basis::new(v.yaw, v.pitch, 0.0),
                    viewport: Viewport::from_fov(self.canvas, v.fov, FovAxis::Horizontal),
                }
            }
            ViewMode::Unwrap => Projector::Unwrap { rect: self.slot.unwrap },
        }
    }

    pub fn is_interacting(&self) -> bool {
        self.drag.is_some() || self.controller.phase() != PhaseKind::Idle
    }

    pub fn is_placement_dragging(&self) -> bool {
        matches!(self.drag, Some(ActiveDrag::Placement(_)))
    }

    // ---- 选择 ----

    pub fn selected_id(&self) -> Option<&str> {
        match self.kind {
            EditorKind::Stickers => self.state.active.selected_sticker_id.as_deref(),
            EditorKind::Cutout => self.state.active.selected_shot_id.as_deref(),
        }
    }

    pub fn select(&mut self, id: Option<String>) {
        let slot = match self.kind {
            EditorKind::Stickers => &mut self.state.active.selected_sticker_id,
            EditorKind::Cutout => &mut self.state.active.selected_shot_id,
        };
        if *slot != id {
            *slot = id;
            self.redraw = true;
        }
    }

    fn placement(&self, id: &str) -> Option<&dyn Placement> {
        match self.kind {
            EditorKind::Stickers => self.state.sticker(id).map(|s| s as &dyn Placement),
            EditorKind::Cutout => self.state.shot().filter(|s| s.id == id).map(|s| s as &dyn Placement),
        }
    }

    fn with_placement_mut<R>(&mut self, id: &str, f: impl FnOnce(&mut dyn Placement) -> R) -> Option<R> {
        match self.kind {
            EditorKind::Stickers => self.state.sticker_mut(id).map(|s| f(s)),
            EditorKind::Cutout => self.state.shot_mut().filter(|s| s.id == id).map(|s| f(s)),
        }
    }

    /// Id of the item under `p` that is not the current selection.
    fn hit_other(&self, p: DVec2, proj: &Projector) -> Option<String> {
        let id = match self.kind {
            EditorKind::Stickers => hit_topmost(&self.state.stickers, proj, p).map(|s| s.id.clone()),
            EditorKind::Cutout => self
                .state
                .shot()
                .filter(|s| ScreenGeometry::of(*s, proj).is_some_and(|g| g.contains(p)))
                .map(|s| s.id.clone()),
        }?;
        (self.selected_id() != Some(id.as_str())).then_some(id)
    }

    // ---- 指针 ----

    fn begin_view_drag(&mut self, p: DVec2, now: Duration) -> bool {
        if self.controller.start_drag(&mut self.slot, p, now) {
            self.drag = Some(ActiveDrag::View);
            true
        } else {
            false
        }
    }

    /// Returns whether the press was consumed.
    pub fn pointer_down(&mut self, p: DVec2, button: PointerButton, now: Duration) -> bool {
        if self.drag.is_some() || !p.is_finite() {
            return false;
        }
        if button == PointerButton::Middle {
            return self.begin_view_drag(p, now);
        }
        let proj = self.projector();

        // 先测试当前选中项的手柄
        let begun = self.selected_id().and_then(|id| {
            let target = self.placement(id)?;
            let geom = ScreenGeometry::of(target, &proj)?;
            let handle = geom.hit(p, true)?;
            Some(PlacementDrag::begin(target, &geom, handle, p))
        });
        if let Some(drag) = begun {
            log::debug!("placement drag {:?} on {}", drag.kind, drag.target_id);
            self.controller.stop();
            self.drag = Some(ActiveDrag::Placement(drag));
            self.redraw = true;
            return true;
        }

        if let Some(id) = self.hit_other(p, &proj) {
            self.select(Some(id));
            return true;
        }

        self.select(None);
        match self.mode {
            ViewMode::Pano => self.begin_view_drag(p, now),
            ViewMode::Unwrap => true,
        }
    }

    /// `snap` (shift held) rounds rotation to 45° steps.
    pub fn pointer_move(&mut self, p: DVec2, snap: bool, now: Duration) -> bool {
        let Some(drag) = self.drag.clone() else {
            return false;
        };
        match drag {
            ActiveDrag::View => {
                let mode = match self.mode {
                    ViewMode::Pano => DragMode::Pano,
                    ViewMode::Unwrap => DragMode::Unwrap,
                };
                self.controller.move_drag(&mut self.slot, p, mode, now)
            }
            ActiveDrag::Placement(d) => {
                if !p.is_finite() {
                    return false;
                }
                let proj = self.projector();
                let moved = self.with_placement_mut(&d.target_id, |t| d.update(t, &proj, p, snap)).is_some();
                if !moved {
                    log::debug!("drag target {} vanished", d.target_id);
                    self.drag = None;
                }
                self.redraw = true;
                moved
            }
        }
    }

    pub fn pointer_up(&mut self, now: Duration) -> bool {
        match self.drag.take() {
            None => false,
            Some(ActiveDrag::View) => self.controller.end_drag(&mut self.slot, now),
            Some(ActiveDrag::Placement(d)) => {
                log::debug!("placement drag on {} finished", d.target_id);
                self.governor.begin_refine();
                self.redraw = true;
                true
            }
        }
    }

    /// Raw wheel delta; zooms only in the perspective view.
    pub fn wheel(&mut self, raw: f64) -> bool {
        if self.mode != ViewMode::Pano {
            return false;
        }
        self.controller.apply_wheel_delta(&mut self.slot, raw)
    }

    /// One animation frame: view motion, inset animation and pending refine frames.
    pub fn tick(&mut self, now: Duration) -> FrameRequest {
        let mut req = self.controller.tick(&mut self.slot, now);
        if self.inset.running(now) || self.governor.refine_pending() {
            self.redraw = true;
            req = FrameRequest::Continue;
        }
        req
    }

    pub fn reset_view(&mut self) {
        self.controller.reset_view(&mut self.slot);
    }

    /// Eases the camera onto the selected item, keeping the current fov.
    pub fn look_at_selection(&mut self, now: Duration) -> bool {
        let Some((yaw, pitch)) = self.selected_id().and_then(|id| self.placement(id)).map(|p| (p.yaw(), p.pitch())) else {
            return false;
        };
        let fov = self.slot.view.fov;
        self.controller.tween_to(&mut self.slot, View::new(yaw, pitch, fov), now);
        true
    }

    pub fn toggle_inset(&mut self, now: Duration) {
        let current = self.inset.value(now);
        self.inset = InsetAnim { expanded: !self.inset.expanded, from: current, started: Some(now) };
        self.redraw = true;
    }

    pub fn inset_expanded(&self) -> bool {
        self.inset.expanded
    }

    // ---- 贴纸编辑 ----

    /// Adds `asset` as a new sticker at the view center. Returns the sticker id.
    pub fn add_sticker(&mut self, mut asset: Asset, natural: (u32, u32)) -> String {
        asset.w = Some(natural.0.max(1));
        asset.h = Some(natural.1.max(1));
        let asset_id = self.state.add_asset(asset);
        let v = self.slot.view;
        let id = self.state.add_sticker(&asset_id, natural, v.yaw, v.pitch);
        log::info!("added sticker {id} (asset {asset_id})");
        self.redraw = true;
        id
    }

    pub fn duplicate_selected(&mut self) -> Option<String> {
        let id = self.state.active.selected_sticker_id.clone()?;
        let new_id = self.state.duplicate_sticker(&id)?;
        self.redraw = true;
        Some(new_id)
    }

    pub fn delete_selected(&mut self) -> bool {
        let Some(id) = self.state.active.selected_sticker_id.clone() else {
            return false;
        };
        self.drag = None;
        let removed = self.state.delete_sticker(&id);
        self.redraw |= removed;
        removed
    }

    pub fn bring_selected_to_front(&mut self) -> bool {
        let Some(id) = self.state.active.selected_sticker_id.clone() else {
            return false;
        };
        let ok = self.state.bring_to_front(&id);
        self.redraw |= ok;
        ok
    }

    pub fn send_selected_to_back(&mut self) -> bool {
        let Some(id) = self.state.active.selected_sticker_id.clone() else {
            return false;
        };
        let ok = self.state.send_to_back(&id);
        self.redraw |= ok;
        ok
    }

    pub fn clear_stickers(&mut self) {
        self.drag = None;
        self.state.clear_stickers();
        self.redraw = true;
    }

    // ---- 裁切画框编辑 ----

    /// Replaces the frame with a new one at the view center.
    pub fn add_cutout_frame(&mut self) -> String {
        let v = self.slot.view;
        let shot = CutoutShot::new_at(v.yaw, v.pitch);
        let id = shot.id.clone();
        self.drag = None;
        self.state.set_cutout(shot);
        self.redraw = true;
        id
    }

    pub fn clear_cutout_frame(&mut self) {
        self.drag = None;
        self.state.clear_cutout();
        self.redraw = true;
    }

    pub fn apply_aspect_preset(&mut self, label: &str) -> bool {
        let Some(shot) = self.state.shot_mut() else {
            return false;
        };
        shot.apply_aspect_preset(label);
        self.redraw = true;
        true
    }

    pub fn apply_aspect_custom(&mut self, w: f64, h: f64) -> bool {
        let ok = self.state.shot_mut().is_some_and(|s| s.apply_aspect_custom(w, h));
        self.redraw |= ok;
        ok
    }

    pub fn rotate_cutout_90(&mut self) -> bool {
        let Some(shot) = self.state.shot_mut() else {
            return false;
        };
        shot.rotate90();
        self.redraw = true;
        true
    }

    // ---- 绘制 ----

    /// Draws the editor preview into `surface` and feeds the frame time back into
    /// the quality governor.
    pub fn render_preview<S: RasterSurface + ?Sized>(
        &mut self,
        surface: &mut S,
        bitmaps: &dyn BitmapSource,
        now: Duration,
    ) -> PreviewStats {
        let started = Instant::now();
        let (w, h) = surface.size();
        self.resize(w, h);
        let interacting = self.is_interacting();
        let (quality, pass) = self.governor.pick(self.state.ui_settings.preview_quality, interacting);
        let proj = self.projector();

        surface.fill(BACKDROP);
        let mut triangles = 0;
        if let Some(pano) = &self.panorama {
            triangles += match proj {
                Projector::Perspective { basis, viewport } => {
                    let opts = WarpOptions::new(MeshDensity::background(quality));
                    self.renderer.draw_perspective(surface, &pano.identity, &pano.image, basis, viewport, &opts)
                }
                Projector::Unwrap { rect } => self.renderer.draw_flat(surface, &pano.image, rect),
            };
        }
        let no_stickers = self.kind == EditorKind::Stickers && self.state.stickers.is_empty();
        if triangles == 0 || no_stickers {
            overlay::draw_sphere_grid(surface, &proj);
        }

        triangles += match self.kind {
            EditorKind::Stickers => self.draw_stickers(surface, bitmaps, &proj, quality, pass),
            EditorKind::Cutout => self.draw_cutout(surface, &proj, quality, now),
        };

        self.redraw = false;
        self.slot.dirty = false;
        if pass != StickerPass::Refine {
            self.governor.record_frame(started.elapsed().as_secs_f64() * 1000.0);
        }
        log::debug!("preview frame: {triangles} triangles at {} ({pass:?})", quality.as_str());
        PreviewStats { triangles, quality, pass }
    }

    fn draw_stickers<S: RasterSurface + ?Sized>(
        &self,
        surface: &mut S,
        bitmaps: &dyn BitmapSource,
        proj: &Projector,
        quality: PreviewQuality,
        pass: StickerPass,
    ) -> usize {
        let options = WarpOptions::new(MeshDensity::sticker(quality, pass));
        let mut total = 0;
        for s in self.state.stickers_by_z() {
            let drawn = bitmaps.bitmap(&s.asset_id).map_or(0, |bmp| {
                let sampler =
                    StickerSampler::new(s.frame(), s.crop(), *proj, f64::from(bmp.width()), f64::from(bmp.height()));
                warp(surface, bmp, &sampler, &options)
            });
            if drawn == 0 {
                overlay::draw_placeholder(surface, s, proj);
            }
            total += drawn;
        }

        if let Some(sel) = self.state.active.selected_sticker_id.as_deref().and_then(|id| self.state.sticker(id)) {
            overlay::draw_outline(surface, sel, proj, overlay::SELECTION_COLOR, 2.0);
            if let Some(g) = ScreenGeometry::of(sel, proj) {
                overlay::draw_handles(surface, &g, true, overlay::SELECTION_COLOR);
            }
        }
        total
    }

    fn draw_cutout<S: RasterSurface + ?Sized>(
        &mut self,
        surface: &mut S,
        proj: &Projector,
        quality: PreviewQuality,
        now: Duration,
    ) -> usize {
        let Some(shot) = self.state.shot() else {
            return 0;
        };
        overlay::draw_outline(surface, shot, proj, overlay::CUTOUT_COLOR, 2.0);
        if self.state.active.selected_shot_id.as_deref() == Some(shot.id.as_str()) {
            if let Some(g) = ScreenGeometry::of(shot, proj) {
                overlay::draw_handles(surface, &g, true, overlay::CUTOUT_COLOR);
            }
        }

        let t = self.inset.value(now);
        let Some(pano) = &self.panorama else {
            return 0;
        };
        if t <= 0.01 {
            return 0;
        }
        let c = self.canvas;
        let bw = c.w * INSET_FRACTION * t;
        let bh = c.h * INSET_FRACTION * t;
        let bounds = Rect::new(c.x + c.w - bw - INSET_MARGIN, c.y + c.h - bh - INSET_MARGIN, bw, bh);
        let inset = bounds.contain(shot.effective_aspect());
        if inset.is_degenerate() {
            return 0;
        }
        let viewport = Viewport::from_fovs(inset, shot.hfov_deg, shot.vfov_deg);
        let basis = Basis::new(shot.yaw_deg, shot.pitch_deg, shot.roll_deg);
        let opts = WarpOptions::new(MeshDensity::cutout_preview(quality));
        let n = self.renderer.draw_perspective(surface, &pano.identity, &pano.image, basis, viewport, &opts);
        let border = [
            DVec2::new(inset.x, inset.y),
            DVec2::new(inset.x + inset.w, inset.y),
            DVec2::new(inset.x + inset.w, inset.y + inset.h),
            DVec2::new(inset.x, inset.y + inset.h),
        ];
        surface.stroke_polyline(&border, true, overlay::CUTOUT_COLOR, 1.5);
        n
    }
}

/// The small always-on preview: a vertical-FOV camera over the panorama with
/// stickers or the cutout frame drawn on top, sharing the editor's interaction model.
pub struct NodePreview {
    slot: ViewSlot,
    controller: InteractionController,
    renderer: MeshWarpRenderer,
}

impl Default for NodePreview {
    fn default() -> Self {
        let config = NavConfig::default();
        Self {
            slot: ViewSlot {
                view: View::new(0.0, 0.0, config.initial_fov),
                invert: (false, false),
                unwrap: Rect::new(0.0, 0.0, 1.0, 1.0),
                dirty: false,
            },
            controller: InteractionController::new(config),
            renderer: MeshWarpRenderer::new(),
        }
    }
}

impl NodePreview {
    pub fn view(&self) -> View {
        self.slot.view
    }

    pub fn controller(&self) -> &InteractionController {
        &self.controller
    }

    pub fn pointer_down(&mut self, p: DVec2, now: Duration) -> bool {
        self.controller.start_drag(&mut self.slot, p, now)
    }

    pub fn pointer_move(&mut self, p: DVec2, now: Duration) -> bool {
        self.controller.move_drag(&mut self.slot, p, DragMode::Pano, now)
    }

    pub fn pointer_up(&mut self, now: Duration) -> bool {
        self.controller.end_drag(&mut self.slot, now)
    }

    pub fn wheel(&mut self, raw: f64) -> bool {
        self.controller.apply_wheel_delta(&mut self.slot, raw)
    }

    pub fn tick(&mut self, now: Duration) -> FrameRequest {
        self.controller.tick(&mut self.slot, now)
    }

    /// Returns the number of triangles drawn.
    pub fn render<S: RasterSurface + ?Sized>(
        &mut self,
        surface: &mut S,
        panorama: Option<&Panorama>,
        state: &EditorState,
        bitmaps: &dyn BitmapSource,
    ) -> usize {
        let (w, h) = surface.size();
        let rect = Rect::new(0.0, 0.0, f64::from(w), f64::from(h));
        let v = self.slot.view;
        let basis = Basis::new(v.yaw, v.pitch, 0.0);
        let viewport = Viewport::from_fov(rect, v.fov, FovAxis::Vertical);
        let proj = Projector::Perspective { basis, viewport };
        let quality = state.ui_settings.preview_quality;

        surface.fill(BACKDROP);
        let mut n = 0;
        if let Some(p) = panorama {
            let opts = WarpOptions::new(MeshDensity::node_preview(quality));
            n += self.renderer.draw_perspective(surface, &p.identity, &p.image, basis, viewport, &opts);
        }
        if n == 0 {
            overlay::draw_sphere_grid(surface, &proj);
        }
        let options = WarpOptions::new(MeshDensity::sticker(quality, StickerPass::Settled));
        for s in state.stickers_by_z() {
            let drawn = bitmaps.bitmap(&s.asset_id).map_or(0, |bmp| {
                let sampler =
                    StickerSampler::new(s.frame(), s.crop(), proj, f64::from(bmp.width()), f64::from(bmp.height()));
                warp(surface, bmp, &sampler, &options)
            });
            if drawn == 0 {
                overlay::draw_placeholder(surface, s, &proj);
            }
            n += drawn;
        }
        if let Some(shot) = state.shot() {
            overlay::draw_outline(surface, shot, &proj, overlay::CUTOUT_COLOR, 1.5);
        }
        n
    }
}
