// main.rs — 编辑器窗口与命令行导出入口

#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")] // 在 Release 模式下隐藏控制台窗口

mod renderer;
mod ui;

use renderer::Renderer;
use ui::{UiAction, UiStatus};

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use glam::DVec2;
use image::RgbaImage;
use winit::{
    dpi::LogicalSize,
    event::*,
    event_loop::{ControlFlow, EventLoop},
    window::{Fullscreen, Window, WindowBuilder},
};

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use pano_suite::assets::{embed_image_file, load_asset, load_image_file};
use pano_suite::export::{erp_output_size, render_state_cutout};
use pano_suite::{
    compose_stickers_to_erp, BitmapStore, EditorKind, EditorSession, EditorState, FrameRequest, PointerButton, ViewMode,
};

#[derive(Parser, Debug)]
#[command(name = "pano_suite", version, about = "Panorama sticker and cutout editor")]
struct Cli {
    /// Equirectangular panorama to open.
    panorama: Option<PathBuf>,

    /// Editor state document (JSON).
    #[arg(long)]
    state: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = KindArg::Stickers)]
    kind: KindArg,

    /// Directory relative `path` assets are resolved against. Defaults to the state file's directory.
    #[arg(long)]
    assets: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render the state's cutout frame from a panorama.
    Render {
        panorama: PathBuf,
        #[arg(long)]
        state: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Bake the state's stickers into an equirectangular image.
    Compose {
        #[arg(long)]
        state: PathBuf,
        #[arg(long)]
        background: Option<PathBuf>,
        #[arg(short, long)]
        output: PathBuf,
        #[arg(long)]
        assets: Option<PathBuf>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum KindArg {
    Stickers,
    Cutout,
}

impl From<KindArg> for EditorKind {
    fn from(k: KindArg) -> Self {
        match k {
            KindArg::Stickers => EditorKind::Stickers,
            KindArg::Cutout => EditorKind::Cutout,
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Some(Command::Render { panorama, state, output }) => run_render(&panorama, &state, &output),
        Some(Command::Compose { state, background, output, assets }) => {
            run_compose(&state, background.as_deref(), &output, assets.as_deref())
        }
        None => run_editor(cli.panorama, cli.state, cli.kind.into(), cli.assets),
    }
}

fn read_state(path: &Path) -> anyhow::Result<EditorState> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading state {}", path.display()))?;
    Ok(EditorState::from_json_str(&text))
}

fn assets_base(explicit: Option<&Path>, state: Option<&Path>) -> Option<PathBuf> {
    explicit.map(Path::to_path_buf).or_else(|| state.and_then(Path::parent).map(Path::to_path_buf))
}

fn run_render(panorama: &Path, state: &Path, output: &Path) -> anyhow::Result<()> {
    let erp = load_image_file(panorama).with_context(|| format!("loading panorama {}", panorama.display()))?;
    let state = read_state(state)?;
    let img = render_state_cutout(&erp, &state).context("rendering cutout")?;
    img.save(output).with_context(|| format!("writing {}", output.display()))?;
    log::info!("cutout {}x{} written to {}", img.width(), img.height(), output.display());
    Ok(())
}

fn run_compose(state_path: &Path, background: Option<&Path>, output: &Path, assets: Option<&Path>) -> anyhow::Result<()> {
    let state = read_state(state_path)?;
    let base = assets_base(assets, Some(state_path));
    let mut bitmaps = HashMap::new();
    for (id, asset) in &state.assets {
        match load_asset(asset, base.as_deref()) {
            Ok(img) => {
                bitmaps.insert(id.clone(), img);
            }
            Err(e) => log::warn!("asset {id} skipped: {e}"),
        }
    }
    let bg = background.map(load_image_file).transpose().context("loading background panorama")?;
    let (w, h) = erp_output_size(&state);
    let img = compose_stickers_to_erp(&state, &bitmaps, bg.as_ref(), w, h);
    img.save(output).with_context(|| format!("writing {}", output.display()))?;
    log::info!("sticker panorama {w}x{h} written to {}", output.display());
    Ok(())
}

fn start_load_image(path: PathBuf, tx: Sender<(PathBuf, RgbaImage)>) {
    thread::spawn(move || {
        log::info!("loading panorama {:?} in background", path);
        match load_image_file(&path) {
            Ok(rgba) => {
                if tx.send((path, rgba)).is_err() {
                    log::error!("event loop gone before panorama finished loading");
                }
            }
            Err(e) => log::error!("failed to load {:?}: {e}", path),
        }
    });
}

fn toggle_fullscreen(window: &Window, status: &mut UiStatus) {
    status.fullscreen = !status.fullscreen;
    if status.fullscreen {
        window.set_fullscreen(Some(Fullscreen::Borderless(None)));
    } else {
        window.set_fullscreen(None);
    }
}

fn pick_panorama() -> Option<PathBuf> {
    rfd::FileDialog::new().add_filter("Images", &["jpg", "jpeg", "png", "bmp", "webp"]).pick_file()
}

struct Host {
    session: EditorSession,
    store: BitmapStore,
    status: UiStatus,
    tx: Sender<(PathBuf, RgbaImage)>,
}

impl Host {
    fn run_action(&mut self, action: UiAction, window: &Window, control_flow: &mut ControlFlow) -> anyhow::Result<()> {
        match action {
            UiAction::OpenPanorama(path) => {
                self.status.loading = true;
                start_load_image(path, self.tx.clone());
            }
            UiAction::AddSticker(path) => {
                let (asset, img) = embed_image_file(&path).with_context(|| format!("reading sticker {}", path.display()))?;
                let id = self.session.add_sticker(asset, img.dimensions());
                if let Some(asset_id) = self.session.state().sticker(&id).map(|s| s.asset_id.clone()) {
                    self.store.insert_ready(&asset_id, img);
                }
            }
            UiAction::LoadState(path) => {
                let state = read_state(&path)?;
                self.session.set_state(state);
                self.store.sync(self.session.state());
                log::info!("state loaded from {}", path.display());
            }
            UiAction::SaveState(path) => {
                let text = self.session.state().to_json_string()?;
                std::fs::write(&path, text).with_context(|| format!("writing {}", path.display()))?;
                log::info!("state saved to {}", path.display());
            }
            UiAction::ExportCutout(path) => {
                let pano = self.session.panorama().context("no panorama loaded")?;
                let img = render_state_cutout(&pano.image, self.session.state())?;
                img.save(&path).with_context(|| format!("writing {}", path.display()))?;
                log::info!("cutout exported to {}", path.display());
            }
            UiAction::ExportStickers(path) => {
                let state = self.session.state();
                let (w, h) = erp_output_size(state);
                let bg = self.session.panorama().map(|p| &p.image);
                let img = compose_stickers_to_erp(state, &self.store, bg, w, h);
                img.save(&path).with_context(|| format!("writing {}", path.display()))?;
                log::info!("sticker panorama exported to {}", path.display());
            }
            UiAction::ToggleFullscreen => toggle_fullscreen(window, &mut self.status),
            UiAction::Exit => *control_flow = ControlFlow::Exit,
        }
        Ok(())
    }

    fn on_key(&mut self, key: VirtualKeyCode, window: &Window, now: Duration) {
        match key {
            VirtualKeyCode::O => {
                if let Some(path) = pick_panorama() {
                    self.status.loading = true;
                    start_load_image(path, self.tx.clone());
                }
            }
            VirtualKeyCode::Delete | VirtualKeyCode::Back => match self.session.kind() {
                EditorKind::Stickers => {
                    self.session.delete_selected();
                }
                EditorKind::Cutout => self.session.clear_cutout_frame(),
            },
            VirtualKeyCode::Escape => self.session.select(None),
            VirtualKeyCode::F => {
                self.session.look_at_selection(now);
            }
            VirtualKeyCode::R => self.session.reset_view(),
            VirtualKeyCode::Tab => {
                let next = match self.session.mode() {
                    ViewMode::Pano => ViewMode::Unwrap,
                    ViewMode::Unwrap => ViewMode::Pano,
                };
                self.session.set_mode(next);
            }
            VirtualKeyCode::F11 => toggle_fullscreen(window, &mut self.status),
            _ => {}
        }
    }
}

fn run_editor(panorama: Option<PathBuf>, state_path: Option<PathBuf>, kind: EditorKind, assets: Option<PathBuf>) -> anyhow::Result<()> {
    let state = match &state_path {
        Some(p) => read_state(p)?,
        None => EditorState::default(),
    };

    let event_loop = EventLoop::new();
    let window = Arc::new(
        WindowBuilder::new()
            .with_title(match kind {
                EditorKind::Stickers => "Panorama Stickers",
                EditorKind::Cutout => "Panorama Cutout",
            })
            .with_inner_size(LogicalSize::new(1280, 720))
            .build(&event_loop)
            .context("creating window")?,
    );
    let mut renderer = pollster::block_on(Renderer::new(window.clone()))?;

    let (tx, rx) = channel();
    let mut host = Host {
        session: EditorSession::new(kind, state),
        store: BitmapStore::new(assets_base(assets.as_deref(), state_path.as_deref())),
        status: UiStatus { custom_w: "2".into(), custom_h: "1".into(), ..UiStatus::default() },
        tx,
    };
    host.store.sync(host.session.state());
    if let Some(path) = panorama {
        host.status.loading = true;
        start_load_image(path, host.tx.clone());
    }

    let started = Instant::now();
    let mut frame = RgbaImage::new(1, 1);
    let mut cursor = DVec2::ZERO;
    let mut shift = false;

    event_loop.run(move |event, _, control_flow| {
        let now = started.elapsed();

        // 检查是否有新加载的全景图
        if let Ok((path, rgba)) = rx.try_recv() {
            host.session.set_panorama(path.to_string_lossy(), rgba);
            host.status.loading = false;
        }

        match event {
            Event::WindowEvent { event, .. } => {
                // 先让 egui 处理事件
                let response = renderer.egui_state.on_event(&renderer.egui_ctx, &event);
                if response.repaint {
                    window.request_redraw();
                }
                if response.consumed {
                    return;
                }

                match event {
                    WindowEvent::CloseRequested => *control_flow = ControlFlow::Exit,
                    WindowEvent::Resized(new_size) => {
                        renderer.resize(new_size);
                        host.session.request_redraw();
                    }
                    WindowEvent::ModifiersChanged(m) => shift = m.shift(),
                    WindowEvent::KeyboardInput { input, .. } => {
                        if input.state == ElementState::Pressed {
                            if let Some(key) = input.virtual_keycode {
                                host.on_key(key, &window, now);
                            }
                        }
                    }
                    WindowEvent::CursorMoved { position, .. } => {
                        cursor = DVec2::new(position.x, position.y);
                        host.session.pointer_move(cursor, shift, now);
                    }
                    WindowEvent::MouseInput { state, button, .. } => {
                        let button = match button {
                            MouseButton::Left => PointerButton::Primary,
                            MouseButton::Middle => PointerButton::Middle,
                            _ => return,
                        };
                        match state {
                            ElementState::Pressed => {
                                host.session.pointer_down(cursor, button, now);
                            }
                            ElementState::Released => {
                                host.session.pointer_up(now);
                            }
                        }
                    }
                    WindowEvent::MouseWheel { delta, .. } => {
                        let raw = match delta {
                            MouseScrollDelta::LineDelta(_, y) => -f64::from(y),
                            MouseScrollDelta::PixelDelta(pos) => -pos.y,
                        };
                        host.session.wheel(raw);
                    }
                    WindowEvent::DroppedFile(path) => {
                        host.status.loading = true;
                        start_load_image(path, host.tx.clone());
                    }
                    _ => {}
                }
            }

            Event::RedrawRequested(_) => {
                let size = renderer.size;
                if size.width == 0 || size.height == 0 {
                    return;
                }
                if frame.dimensions() != (size.width, size.height) {
                    frame = RgbaImage::new(size.width, size.height);
                }
                let stats = host.session.render_preview(&mut frame, &host.store, now);
                log::trace!("preview: {} triangles at {:?}/{:?}", stats.triangles, stats.quality, stats.pass);
                renderer.upload_frame(&frame);

                let mut actions = Vec::new();
                let render_result = renderer.render_with_ui(&window, |ctx| {
                    actions = ui::draw_ui(ctx, &mut host.session, &mut host.status, now);
                });
                for action in actions {
                    if let Err(e) = host.run_action(action, &window, control_flow) {
                        log::error!("{e:#}");
                    }
                }

                match render_result {
                    Ok(_) => {}
                    Err(wgpu::SurfaceError::Lost) => renderer.resize(renderer.size),
                    Err(wgpu::SurfaceError::OutOfMemory) => *control_flow = ControlFlow::Exit,
                    Err(e) => log::error!("render error: {:?}", e),
                }
            }

            Event::MainEventsCleared => {
                if host.store.poll() > 0 {
                    host.session.request_redraw();
                }
                let request = host.session.tick(now);
                if host.session.take_redraw() || request == FrameRequest::Continue {
                    window.request_redraw();
                }
                if !matches!(*control_flow, ControlFlow::ExitWithCode(_)) {
                    *control_flow = if request == FrameRequest::Continue {
                        ControlFlow::Poll
                    } else if host.status.loading || host.store.is_loading() {
                        // 后台线程无法唤醒事件循环，加载期间轮询
                        ControlFlow::WaitUntil(Instant::now() + Duration::from_millis(50))
                    } else {
                        ControlFlow::Wait
                    };
                }
            }

            _ => {}
        }
    })
}
