// ui.rs — 菜单栏与状态栏

use std::path::PathBuf;

use pano_suite::cutout::ASPECT_PRESETS;
use pano_suite::{EditorKind, EditorSession, PreviewQuality, ViewMode};

const IMAGE_EXTS: [&str; 5] = ["jpg", "jpeg", "png", "bmp", "webp"];

/// Work the event loop has to carry out after the UI pass: loading, saving and
/// window-level changes that need more than the session.
#[derive(Debug)]
pub enum UiAction {
    OpenPanorama(PathBuf),
    AddSticker(PathBuf),
    LoadState(PathBuf),
    SaveState(PathBuf),
    ExportCutout(PathBuf),
    ExportStickers(PathBuf),
    ToggleFullscreen,
    Exit,
}

/// Host-side flags the UI displays but the session does not own.
#[derive(Debug, Default)]
pub struct UiStatus {
    pub loading: bool,
    pub fullscreen: bool,
    pub custom_w: String,
    pub custom_h: String,
}

fn pick_image(title: &str) -> Option<PathBuf> {
    rfd::FileDialog::new().set_title(title).add_filter("Images", &IMAGE_EXTS).pick_file()
}

fn pick_json(save: bool) -> Option<PathBuf> {
    let dialog = rfd::FileDialog::new().add_filter("Editor state", &["json"]);
    if save {
        dialog.set_file_name("state.json").save_file()
    } else {
        dialog.pick_file()
    }
}

fn save_png(name: &str) -> Option<PathBuf> {
    rfd::FileDialog::new().add_filter("PNG", &["png"]).set_file_name(name).save_file()
}

pub fn draw_ui(ctx: &egui::Context, session: &mut EditorSession, status: &mut UiStatus, now: std::time::Duration) -> Vec<UiAction> {
    let mut actions = Vec::new();

    egui::TopBottomPanel::top("menu_bar").show(ctx, |ui| {
        egui::menu::bar(ui, |ui| {
            // File
            ui.menu_button("File", |ui| {
                if ui.button("Open panorama…").clicked() {
                    ui.close_menu();
                    if let Some(path) = pick_image("Open panorama") {
                        actions.push(UiAction::OpenPanorama(path));
                    }
                }
                if session.kind() == EditorKind::Stickers && ui.button("Add sticker…").clicked() {
                    ui.close_menu();
                    if let Some(path) = pick_image("Add sticker") {
                        actions.push(UiAction::AddSticker(path));
                    }
                }
                ui.separator();
                if ui.button("Load state…").clicked() {
                    ui.close_menu();
                    if let Some(path) = pick_json(false) {
                        actions.push(UiAction::LoadState(path));
                    }
                }
                if ui.button("Save state…").clicked() {
                    ui.close_menu();
                    if let Some(path) = pick_json(true) {
                        actions.push(UiAction::SaveState(path));
                    }
                }
                ui.separator();
                let can_export = session.panorama().is_some();
                match session.kind() {
                    EditorKind::Cutout => {
                        let enabled = can_export && session.state().shot().is_some();
                        if ui.add_enabled(enabled, egui::Button::new("Export cutout…")).clicked() {
                            ui.close_menu();
                            if let Some(path) = save_png("cutout.png") {
                                actions.push(UiAction::ExportCutout(path));
                            }
                        }
                    }
                    EditorKind::Stickers => {
                        if ui.button("Export sticker panorama…").clicked() {
                            ui.close_menu();
                            if let Some(path) = save_png("stickers.png") {
                                actions.push(UiAction::ExportStickers(path));
                            }
                        }
                    }
                }
                ui.separator();
                if ui.button("Exit").clicked() {
                    actions.push(UiAction::Exit);
                }
            });

            // View
            ui.menu_button("View", |ui| {
                if ui.button("Reset view").clicked() {
                    session.reset_view();
                    ui.close_menu();
                }
                if ui.add_enabled(session.selected_id().is_some(), egui::Button::new("Look at selection")).clicked() {
                    session.look_at_selection(now);
                    ui.close_menu();
                }
                ui.separator();
                let mut mode = session.mode();
                let pano = ui.radio_value(&mut mode, ViewMode::Pano, "Panorama").clicked();
                let unwrap = ui.radio_value(&mut mode, ViewMode::Unwrap, "Unwrapped").clicked();
                if pano || unwrap {
                    session.set_mode(mode);
                    ui.close_menu();
                }
                ui.separator();
                let mut quality = session.state().ui_settings.preview_quality;
                egui::ComboBox::from_label("Preview quality")
                    .selected_text(quality.as_str())
                    .show_ui(ui, |ui| {
                        for q in [PreviewQuality::Draft, PreviewQuality::Balanced, PreviewQuality::High] {
                            ui.selectable_value(&mut quality, q, q.as_str());
                        }
                    });
                if quality != session.state().ui_settings.preview_quality {
                    session.state_mut().ui_settings.preview_quality = quality;
                }
                let settings = session.state().ui_settings;
                let (mut ix, mut iy) = (settings.invert_view_x, settings.invert_view_y);
                let toggled_x = ui.checkbox(&mut ix, "Invert horizontal drag").changed();
                let toggled_y = ui.checkbox(&mut iy, "Invert vertical drag").changed();
                if toggled_x || toggled_y {
                    session.set_invert_view(ix, iy);
                }
                ui.separator();
                let label = if status.fullscreen { "Exit fullscreen" } else { "Fullscreen" };
                if ui.button(label).clicked() {
                    actions.push(UiAction::ToggleFullscreen);
                    ui.close_menu();
                }
            });

            match session.kind() {
                EditorKind::Stickers => sticker_menu(ui, session),
                EditorKind::Cutout => cutout_menu(ui, session, status, now),
            }
        });
    });

    egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
        ui.horizontal(|ui| {
            if status.loading {
                ui.label(egui::RichText::new("Loading…").color(egui::Color32::YELLOW));
                ui.label("|");
            }
            let v = session.view();
            ui.label(format!("Yaw: {:.1}°", v.yaw));
            ui.label("|");
            ui.label(format!("Pitch: {:.1}°", v.pitch));
            ui.label("|");
            ui.label(format!("FOV: {:.1}°", v.fov));
            ui.label("|");
            match session.kind() {
                EditorKind::Stickers => ui.label(format!("Stickers: {}", session.state().stickers.len())),
                EditorKind::Cutout => match session.state().shot() {
                    Some(shot) => ui.label(format!("Frame {} → {}×{}", shot.aspect_label(), shot.out_w, shot.out_h)),
                    None => ui.label("No frame"),
                },
            };
            if let Some(ms) = session.governor().frame_ms() {
                ui.label("|");
                let color = if session.governor().is_slow() { egui::Color32::LIGHT_RED } else { egui::Color32::GREEN };
                ui.label(egui::RichText::new(format!("{ms:.1} ms")).color(color));
            }
        });
    });

    actions
}

fn sticker_menu(ui: &mut egui::Ui, session: &mut EditorSession) {
    ui.menu_button("Stickers", |ui| {
        let selected = session.selected_id().is_some();
        if ui.add_enabled(selected, egui::Button::new("Duplicate")).clicked() {
            session.duplicate_selected();
            ui.close_menu();
        }
        if ui.add_enabled(selected, egui::Button::new("Delete")).clicked() {
            session.delete_selected();
            ui.close_menu();
        }
        if ui.add_enabled(selected, egui::Button::new("Bring to front")).clicked() {
            session.bring_selected_to_front();
            ui.close_menu();
        }
        if ui.add_enabled(selected, egui::Button::new("Send to back")).clicked() {
            session.send_selected_to_back();
            ui.close_menu();
        }
        ui.separator();
        if ui.add_enabled(!session.state().stickers.is_empty(), egui::Button::new("Clear all")).clicked() {
            session.clear_stickers();
            ui.close_menu();
        }
    });
}

fn cutout_menu(ui: &mut egui::Ui, session: &mut EditorSession, status: &mut UiStatus, now: std::time::Duration) {
    ui.menu_button("Cutout", |ui| {
        let has_frame = session.state().shot().is_some();
        if ui.add_enabled(!has_frame, egui::Button::new("Add frame")).clicked() {
            session.add_cutout_frame();
            ui.close_menu();
        }
        ui.menu_button("Aspect", |ui| {
            for (label, _, _) in ASPECT_PRESETS {
                if ui.add_enabled(has_frame, egui::Button::new(label)).clicked() {
                    session.apply_aspect_preset(label);
                    ui.close_menu();
                }
            }
            ui.separator();
            ui.horizontal(|ui| {
                ui.add(egui::TextEdit::singleline(&mut status.custom_w).desired_width(40.0));
                ui.label(":");
                ui.add(egui::TextEdit::singleline(&mut status.custom_h).desired_width(40.0));
                if ui.add_enabled(has_frame, egui::Button::new("Apply")).clicked() {
                    let parsed = status.custom_w.trim().parse::<f64>().ok().zip(status.custom_h.trim().parse::<f64>().ok());
                    match parsed {
                        Some((w, h)) if session.apply_aspect_custom(w, h) => ui.close_menu(),
                        _ => log::warn!("invalid custom aspect {}:{}", status.custom_w, status.custom_h),
                    }
                }
            });
        });
        if ui.add_enabled(has_frame, egui::Button::new("Rotate 90°")).clicked() {
            session.rotate_cutout_90();
            ui.close_menu();
        }
        let inset = if session.inset_expanded() { "Collapse preview" } else { "Expand preview" };
        if ui.add_enabled(has_frame, egui::Button::new(inset)).clicked() {
            session.toggle_inset(now);
            ui.close_menu();
        }
        ui.separator();
        if ui.add_enabled(has_frame, egui::Button::new("Remove frame")).clicked() {
            session.clear_cutout_frame();
            ui.close_menu();
        }
    });
}
