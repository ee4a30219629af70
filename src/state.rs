// state.rs — 编辑器状态文档：类型化结构、容错解析、贴纸编辑操作

use std::collections::BTreeMap;

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use crate::math::{clamp, clamp_pitch, clamp_safe, finite_or, wrap_yaw};

pub const STATE_VERSION: u32 = 1;
pub const PROJECTION_MODEL: &str = "pinhole_rectilinear";
pub const ALPHA_MODE: &str = "straight";
pub const DEFAULT_BG: &str = "#00ff00";
pub const DEFAULT_OUTPUT_PRESET: u32 = 2048;
pub const MAX_OUTPUT_SIDE: u32 = 4096;

pub const STICKER_DEFAULT_FOV: f64 = 30.0;
pub const SHOT_DEFAULT_HFOV: f64 = 90.0;
pub const SHOT_DEFAULT_VFOV: f64 = 60.0;
/// Yaw offset of a duplicated sticker.
pub const DUPLICATE_YAW_STEP: f64 = 8.0;

/// `prefix_` plus eight hex digits.
pub fn make_id(prefix: &str) -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("{prefix}_{}", &hex[..8])
}

/// Lowercase `#rrggbb`; `#abc` expands, anything else becomes [`DEFAULT_BG`].
pub fn normalize_hex_color(raw: &str) -> String {
    let s = raw.trim().trim_start_matches('#');
    let s: String = if s.len() == 3 { s.chars().flat_map(|c| [c, c]).collect() } else { s.to_owned() };
    if s.len() == 6 && s.chars().all(|c| c.is_ascii_hexdigit()) {
        format!("#{}", s.to_ascii_lowercase())
    } else {
        DEFAULT_BG.to_owned()
    }
}

// ---- 宽松读取工具：JSON 中任何字段都可能缺失或类型错误 ----

fn read_f64(obj: &Map<String, Value>, key: &str) -> Option<f64> {
    let v = match obj.get(key)? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    v.is_finite().then_some(v)
}

fn read_num(obj: &Map<String, Value>, key: &str, fallback: f64) -> f64 {
    read_f64(obj, key).unwrap_or(fallback)
}

fn read_bool(obj: &Map<String, Value>, key: &str) -> bool {
    matches!(obj.get(key), Some(Value::Bool(true)))
}

fn read_str(obj: &Map<String, Value>, key: &str) -> Option<String> {
    match obj.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn read_id(obj: &Map<String, Value>, key: &str) -> Option<String> {
    read_str(obj, key).filter(|s| !s.trim().is_empty())
}

fn clamp_fov(v: f64) -> f64 {
    clamp_safe(v, 1.0, 179.0)
}

/// Preview mesh quality chosen by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PreviewQuality {
    Draft,
    #[default]
    Balanced,
    High,
}

impl PreviewQuality {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "draft" | "low" => Self::Draft,
            "high" => Self::High,
            _ => Self::Balanced,
        }
    }

    /// One tier cheaper; draft stays draft.
    pub fn lower(self) -> Self {
        match self {
            Self::High => Self::Balanced,
            Self::Balanced | Self::Draft => Self::Draft,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Balanced => "balanced",
            Self::High => "high",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct UiSettings {
    pub invert_view_x: bool,
    pub invert_view_y: bool,
    pub preview_quality: PreviewQuality,
}

impl UiSettings {
    fn from_value(v: Option<&Value>) -> Self {
        let Some(Value::Object(o)) = v else {
            return Self::default();
        };
        Self {
            invert_view_x: read_bool(o, "invert_view_x"),
            invert_view_y: read_bool(o, "invert_view_y"),
            preview_quality: o
                .get("preview_quality")
                .and_then(Value::as_str)
                .map(PreviewQuality::parse)
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Active {
    pub selected_sticker_id: Option<String>,
    pub selected_shot_id: Option<String>,
}

/// Where an asset's pixels come from.
#[derive(Debug, Clone, PartialEq)]
pub enum AssetSource {
    DataUrl { value: String },
    ExternalUrl { value: String },
    ComfyImage { filename: String, subfolder: String, storage: String },
    /// Local file path, resolved against the asset base directory.
    Path { value: String },
    /// An asset kind this build does not understand; kept verbatim.
    Other(Map<String, Value>),
}

/// An identified bitmap source plus its cached natural size.
#[derive(Debug, Clone, PartialEq)]
pub struct Asset {
    pub source: AssetSource,
    pub name: Option<String>,
    pub w: Option<u32>,
    pub h: Option<u32>,
}

impl Asset {
    pub fn new(source: AssetSource) -> Self {
        Self { source, name: None, w: None, h: None }
    }

    pub fn kind(&self) -> &str {
        match &self.source {
            AssetSource::DataUrl { .. } => "dataurl",
            AssetSource::ExternalUrl { .. } => "external_url",
            AssetSource::ComfyImage { .. } => "comfy_image",
            AssetSource::Path { .. } => "path",
            AssetSource::Other(m) => m.get("type").and_then(Value::as_str).unwrap_or("unknown"),
        }
    }

    pub fn from_value(v: &Value) -> Option<Self> {
        let Value::Object(o) = v else {
            return None;
        };
        let text = |k: &str| o.get(k).and_then(Value::as_str).unwrap_or_default().to_owned();
        let source = match o.get("type").and_then(Value::as_str).unwrap_or_default() {
            "dataurl" => AssetSource::DataUrl { value: text("value") },
            "external_url" => AssetSource::ExternalUrl { value: text("value") },
            "comfy_image" => AssetSource::ComfyImage {
                filename: text("filename"),
                subfolder: text("subfolder"),
                storage: {
                    let s = text("storage");
                    if s.is_empty() { "input".to_owned() } else { s }
                },
            },
            "path" => AssetSource::Path { value: text("value") },
            _ => return Some(Self::new(AssetSource::Other(o.clone()))),
        };
        let dim = |k: &str| read_f64(o, k).filter(|d| *d >= 1.0).map(|d| d.round() as u32);
        Some(Self { source, name: read_str(o, "name"), w: dim("w"), h: dim("h") })
    }

    pub fn to_value(&self) -> Value {
        let mut o = match &self.source {
            AssetSource::Other(m) => return Value::Object(m.clone()),
            _ => Map::new(),
        };
        o.insert("type".into(), Value::from(self.kind()));
        match &self.source {
            AssetSource::DataUrl { value } | AssetSource::ExternalUrl { value } | AssetSource::Path { value } => {
                o.insert("value".into(), Value::from(value.as_str()));
            }
            AssetSource::ComfyImage { filename, subfolder, storage } => {
                o.insert("filename".into(), Value::from(filename.as_str()));
                o.insert("subfolder".into(), Value::from(subfolder.as_str()));
                o.insert("storage".into(), Value::from(storage.as_str()));
            }
            AssetSource::Other(_) => {}
        }
        if let Some(n) = &self.name {
            o.insert("name".into(), Value::from(n.as_str()));
        }
        if let Some(w) = self.w {
            o.insert("w".into(), Value::from(w));
        }
        if let Some(h) = self.h {
            o.insert("h".into(), Value::from(h));
        }
        Value::Object(o)
    }
}

impl Serialize for Asset {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

/// Normalised sub-rectangle of a sticker bitmap.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Crop {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl Default for Crop {
    fn default() -> Self {
        Self::FULL
    }
}

impl Crop {
    pub const FULL: Crop = Crop { x0: 0.0, y0: 0.0, x1: 1.0, y1: 1.0 };

    /// Clamped to the unit square with ordered corners and a minimal extent.
    pub fn normalized(self) -> Self {
        let c = |v: f64, d: f64| clamp(finite_or(v, d), 0.0, 1.0);
        let (ax, bx) = (c(self.x0, 0.0), c(self.x1, 1.0));
        let (ay, by) = (c(self.y0, 0.0), c(self.y1, 1.0));
        let (x0, x1) = (ax.min(bx), ax.max(bx));
        let (y0, y1) = (ay.min(by), ay.max(by));
        Self { x0, y0, x1: x1.max(x0 + 1e-4), y1: y1.max(y0 + 1e-4) }
    }

    /// Patch coordinate → position inside the crop, both in `[0, 1]²`.
    pub fn map(&self, u: f64, v: f64) -> (f64, f64) {
        (self.x0 + u * (self.x1 - self.x0), self.y0 + v * (self.y1 - self.y0))
    }

    pub fn is_full(&self) -> bool {
        *self == Self::FULL
    }

    fn from_value(v: Option<&Value>) -> Option<Self> {
        let Some(Value::Object(o)) = v else {
            return None;
        };
        Some(
            Self {
                x0: read_num(o, "x0", 0.0),
                y0: read_num(o, "y0", 0.0),
                x1: read_num(o, "x1", 1.0),
                y1: read_num(o, "y1", 1.0),
            }
            .normalized(),
        )
    }
}

/// A flat image patch placed on the sphere.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sticker {
    pub id: String,
    pub asset_id: String,
    pub yaw_deg: f64,
    pub pitch_deg: f64,
    #[serde(rename = "hFOV_deg")]
    pub hfov_deg: f64,
    #[serde(rename = "vFOV_deg")]
    pub vfov_deg: f64,
    pub rot_deg: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crop: Option<Crop>,
    pub z_index: u32,
}

impl Sticker {
    fn from_value(v: &Value, index: usize) -> Option<Self> {
        let Value::Object(o) = v else {
            return None;
        };
        let rot = read_f64(o, "rot_deg").or_else(|| read_f64(o, "roll_deg")).unwrap_or(0.0);
        Some(Self {
            id: read_id(o, "id").unwrap_or_else(|| make_id("st")),
            asset_id: read_str(o, "asset_id").unwrap_or_default(),
            yaw_deg: wrap_yaw(read_num(o, "yaw_deg", 0.0)),
            pitch_deg: clamp_pitch(read_num(o, "pitch_deg", 0.0)),
            hfov_deg: clamp_fov(read_num(o, "hFOV_deg", STICKER_DEFAULT_FOV)),
            vfov_deg: clamp_fov(read_num(o, "vFOV_deg", STICKER_DEFAULT_FOV)),
            rot_deg: wrap_yaw(rot),
            crop: Crop::from_value(o.get("crop")),
            z_index: read_f64(o, "z_index").map_or(index as u32, |z| z.max(0.0) as u32),
        })
    }

    pub fn crop_or_full(&self) -> Crop {
        self.crop.unwrap_or(Crop::FULL)
    }
}

/// The single output frame of the cutout editor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CutoutShot {
    pub id: String,
    pub yaw_deg: f64,
    pub pitch_deg: f64,
    #[serde(rename = "hFOV_deg")]
    pub hfov_deg: f64,
    #[serde(rename = "vFOV_deg")]
    pub vfov_deg: f64,
    pub roll_deg: f64,
    pub out_w: u32,
    pub out_h: u32,
    /// Cached label; the FOVs and output size are authoritative.
    pub aspect_id: String,
}

impl CutoutShot {
    fn from_value(v: &Value) -> Option<Self> {
        let Value::Object(o) = v else {
            return None;
        };
        let roll = read_f64(o, "roll_deg").or_else(|| read_f64(o, "rot_deg")).unwrap_or(0.0);
        let side = |k: &str| clamp_safe(read_num(o, k, 1024.0), 8.0, 8192.0).round() as u32;
        let (out_w, out_h) = (side("out_w"), side("out_h"));
        Some(Self {
            id: read_id(o, "id").unwrap_or_else(|| make_id("shot")),
            yaw_deg: wrap_yaw(read_num(o, "yaw_deg", 0.0)),
            pitch_deg: clamp_pitch(read_num(o, "pitch_deg", 0.0)),
            hfov_deg: clamp_fov(read_num(o, "hFOV_deg", SHOT_DEFAULT_HFOV)),
            vfov_deg: clamp_fov(read_num(o, "vFOV_deg", SHOT_DEFAULT_VFOV)),
            roll_deg: wrap_yaw(roll),
            out_w,
            out_h,
            aspect_id: read_str(o, "aspect_id")
                .unwrap_or_else(|| crate::cutout::ratio_label(f64::from(out_w), f64::from(out_h))),
        })
    }
}

/// The persisted editor document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EditorState {
    pub version: u32,
    pub projection_model: String,
    pub alpha_mode: String,
    pub bg_color: String,
    pub output_preset: u32,
    pub assets: BTreeMap<String, Asset>,
    pub stickers: Vec<Sticker>,
    pub shots: Vec<CutoutShot>,
    pub ui_settings: UiSettings,
    pub active: Active,
}

impl Default for EditorState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            projection_model: PROJECTION_MODEL.to_owned(),
            alpha_mode: ALPHA_MODE.to_owned(),
            bg_color: DEFAULT_BG.to_owned(),
            output_preset: DEFAULT_OUTPUT_PRESET,
            assets: BTreeMap::new(),
            stickers: Vec::new(),
            shots: Vec::new(),
            ui_settings: UiSettings::default(),
            active: Active::default(),
        }
    }
}

impl EditorState {
    /// Never fails: anything unusable falls back to defaults.
    pub fn from_json_str(text: &str) -> Self {
        let text = text.trim();
        if text.is_empty() {
            return Self::default();
        }
        match serde_json::from_str::<Value>(text) {
            Ok(v) => Self::from_value(&v),
            Err(e) => {
                log::warn!("state json unreadable ({e}); starting from defaults");
                Self::default()
            }
        }
    }

    /// Total constructor over arbitrary JSON.
    pub fn from_value(v: &Value) -> Self {
        let Value::Object(o) = v else {
            return Self::default();
        };
        let mut s = Self {
            bg_color: o.get("bg_color").and_then(Value::as_str).map_or_else(|| DEFAULT_BG.to_owned(), normalize_hex_color),
            output_preset: clamp_safe(read_num(o, "output_preset", f64::from(DEFAULT_OUTPUT_PRESET)), 8.0, f64::from(MAX_OUTPUT_SIDE))
                as u32,
            ui_settings: UiSettings::from_value(o.get("ui_settings")),
            ..Self::default()
        };

        if let Some(Value::Object(assets)) = o.get("assets") {
            for (id, a) in assets {
                if let Some(asset) = Asset::from_value(a) {
                    s.assets.insert(id.clone(), asset);
                }
            }
        }
        if let Some(Value::Array(items)) = o.get("stickers") {
            s.stickers = items.iter().enumerate().filter_map(|(i, v)| Sticker::from_value(v, i)).collect();
        }
        if let Some(Value::Array(items)) = o.get("shots") {
            s.shots = items.iter().filter_map(CutoutShot::from_value).collect();
        }
        if let Some(Value::Object(a)) = o.get("active") {
            s.active.selected_sticker_id = read_id(a, "selected_sticker_id");
            s.active.selected_shot_id = read_id(a, "selected_shot_id");
        }
        s.normalize();
        s
    }

    /// Layers several documents (later layers win per top-level key) over the given fallbacks.
    pub fn from_layers(layers: &[&str], fallback_preset: u32, fallback_bg: &str) -> Self {
        let mut merged = Map::new();
        merged.insert("output_preset".into(), Value::from(fallback_preset));
        merged.insert("bg_color".into(), Value::from(fallback_bg));
        for text in layers {
            if let Ok(Value::Object(o)) = serde_json::from_str::<Value>(text.trim()) {
                merged.extend(o);
            }
        }
        Self::from_value(&Value::Object(merged))
    }

    pub fn to_json_string(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Re-establishes every document invariant.
    pub fn normalize(&mut self) {
        self.version = STATE_VERSION;
        self.projection_model = PROJECTION_MODEL.to_owned();
        self.alpha_mode = ALPHA_MODE.to_owned();
        self.bg_color = normalize_hex_color(&self.bg_color);
        self.output_preset = self.output_preset.clamp(8, MAX_OUTPUT_SIDE);

        if self.shots.len() > 1 {
            let keep = self
                .active
                .selected_shot_id
                .as_ref()
                .and_then(|id| self.shots.iter().position(|s| &s.id == id))
                .unwrap_or(0);
            let shot = self.shots.swap_remove(keep);
            log::warn!("state carried {} cutout shots; keeping {}", self.shots.len() + 1, shot.id);
            self.shots = vec![shot];
        }
        self.normalize_z();

        if let Some(id) = &self.active.selected_sticker_id {
            if self.sticker(id).is_none() {
                self.active.selected_sticker_id = None;
            }
        }
        if let Some(id) = &self.active.selected_shot_id {
            if !self.shots.iter().any(|s| &s.id == id) {
                self.active.selected_shot_id = None;
            }
        }
        let dangling = self.dangling_asset_ids();
        if !dangling.is_empty() {
            log::warn!("stickers reference missing assets: {dangling:?}");
        }
    }

    /// Re-densifies `z_index` into `0..n`, keeping the current paint order.
    pub fn normalize_z(&mut self) {
        let mut order: Vec<usize> = (0..self.stickers.len()).collect();
        order.sort_by_key(|&i| (self.stickers[i].z_index, i));
        for (z, i) in order.into_iter().enumerate() {
            self.stickers[i].z_index = z as u32;
        }
    }

    /// Stickers in paint order (bottom first).
    pub fn stickers_by_z(&self) -> Vec<&Sticker> {
        let mut v: Vec<&Sticker> = self.stickers.iter().collect();
        v.sort_by_key(|s| s.z_index);
        v
    }

    pub fn sticker(&self, id: &str) -> Option<&Sticker> {
        self.stickers.iter().find(|s| s.id == id)
    }

    pub fn sticker_mut(&mut self, id: &str) -> Option<&mut Sticker> {
        self.stickers.iter_mut().find(|s| s.id == id)
    }

    pub fn shot(&self) -> Option<&CutoutShot> {
        self.shots.first()
    }

    pub fn shot_mut(&mut self) -> Option<&mut CutoutShot> {
        self.shots.first_mut()
    }

    /// Asset ids referenced by a sticker but missing from the table.
    pub fn dangling_asset_ids(&self) -> Vec<String> {
        let mut v: Vec<String> = self
            .stickers
            .iter()
            .filter(|s| !self.assets.contains_key(&s.asset_id))
            .map(|s| s.asset_id.clone())
            .collect();
        v.sort();
        v.dedup();
        v
    }

    pub fn add_asset(&mut self, asset: Asset) -> String {
        let id = make_id("asset");
        self.assets.insert(id.clone(), asset);
        id
    }

    /// Drops assets no sticker refers to. Returns how many were removed.
    pub fn prune_assets(&mut self) -> usize {
        let before = self.assets.len();
        let used: Vec<&str> = self.stickers.iter().map(|s| s.asset_id.as_str()).collect();
        self.assets.retain(|id, _| used.contains(&id.as_str()));
        before - self.assets.len()
    }

    /// New sticker at the given direction, 30° wide, height from the bitmap aspect; selected and on top.
    pub fn add_sticker(&mut self, asset_id: &str, natural: (u32, u32), yaw: f64, pitch: f64) -> String {
        let (w, h) = (f64::from(natural.0.max(1)), f64::from(natural.1.max(1)));
        let sticker = Sticker {
            id: make_id("st"),
            asset_id: asset_id.to_owned(),
            yaw_deg: wrap_yaw(yaw),
            pitch_deg: clamp_pitch(pitch),
            hfov_deg: STICKER_DEFAULT_FOV,
            vfov_deg: clamp_fov(STICKER_DEFAULT_FOV * (h / w)),
            rot_deg: 0.0,
            crop: None,
            z_index: self.stickers.len() as u32,
        };
        let id = sticker.id.clone();
        self.stickers.push(sticker);
        self.normalize_z();
        self.active.selected_sticker_id = Some(id.clone());
        id
    }

    pub fn duplicate_sticker(&mut self, id: &str) -> Option<String> {
        let mut copy = self.sticker(id)?.clone();
        copy.id = make_id("st");
        copy.yaw_deg = wrap_yaw(copy.yaw_deg + DUPLICATE_YAW_STEP);
        copy.z_index = self.stickers.len() as u32;
        let new_id = copy.id.clone();
        self.stickers.push(copy);
        self.normalize_z();
        self.active.selected_sticker_id = Some(new_id.clone());
        Some(new_id)
    }

    pub fn delete_sticker(&mut self, id: &str) -> bool {
        let before = self.stickers.len();
        self.stickers.retain(|s| s.id != id);
        if self.stickers.len() == before {
            return false;
        }
        if self.active.selected_sticker_id.as_deref() == Some(id) {
            self.active.selected_sticker_id = self.stickers.first().map(|s| s.id.clone());
        }
        self.normalize_z();
        self.prune_assets();
        true
    }

    pub fn bring_to_front(&mut self, id: &str) -> bool {
        let top = self.stickers.len() as u32;
        let Some(s) = self.sticker_mut(id) else {
            return false;
        };
        s.z_index = top;
        self.normalize_z();
        true
    }

    pub fn send_to_back(&mut self, id: &str) -> bool {
        if self.sticker(id).is_none() {
            return false;
        }
        for s in &mut self.stickers {
            s.z_index = if s.id == id { 0 } else { s.z_index + 1 };
        }
        self.normalize_z();
        true
    }

    pub fn clear_stickers(&mut self) {
        self.stickers.clear();
        self.active.selected_sticker_id = None;
        self.prune_assets();
    }

    /// Replaces the cutout collection with `shot` and selects it.
    pub fn set_cutout(&mut self, shot: CutoutShot) {
        self.active.selected_shot_id = Some(shot.id.clone());
        self.shots = vec![shot];
    }

    pub fn clear_cutout(&mut self) {
        self.shots.clear();
        self.active.selected_shot_id = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_and_garbage_input_yield_defaults() {
        for text in ["", "   ", "not json", "[1,2]", "42"] {
            let s = EditorState::from_json_str(text);
            assert_eq!(s, EditorState::default());
        }
    }

    #[test]
    fn wrong_container_types_are_replaced() {
        let s = EditorState::from_json_str(r#"{"assets":[],"stickers":{},"shots":"bad","active":[]}"#);
        assert!(s.assets.is_empty() && s.stickers.is_empty() && s.shots.is_empty());
        assert_eq!(s.active, Active::default());
    }

    #[test]
    fn header_and_scalars_are_normalised() {
        let s = EditorState::from_value(&json!({
            "version": 7, "projection_model": "fisheye", "alpha_mode": "premultiplied",
            "bg_color": "#ABC", "output_preset": 99999,
            "ui_settings": {"invert_view_x": true, "preview_quality": "HIGH"}
        }));
        assert_eq!(s.version, 1);
        assert_eq!(s.projection_model, "pinhole_rectilinear");
        assert_eq!(s.alpha_mode, "straight");
        assert_eq!(s.bg_color, "#aabbcc");
        assert_eq!(s.output_preset, 4096);
        assert!(s.ui_settings.invert_view_x && !s.ui_settings.invert_view_y);
        assert_eq!(s.ui_settings.preview_quality, PreviewQuality::High);
        assert_eq!(normalize_hex_color("#12345g"), "#00ff00");
    }

    #[test]
    fn sticker_fields_fall_back_and_clamp() {
        let s = EditorState::from_value(&json!({
            "assets": {"a1": {"type": "dataurl", "value": "data:image/png;base64,AA=="}},
            "stickers": [
                {"id": "s1", "asset_id": "a1", "yaw_deg": 190, "pitch_deg": 120, "hFOV_deg": "NaN", "roll_deg": 15, "z_index": 5},
                {"id": "s2", "asset_id": "a1", "vFOV_deg": 500, "z_index": 2, "crop": {"x0": 0.8, "x1": 0.2}}
            ]
        }));
        let a = s.sticker("s1").unwrap();
        assert_eq!(a.yaw_deg, -170.0);
        assert_eq!(a.pitch_deg, 89.9);
        assert_eq!(a.hfov_deg, 30.0);
        assert_eq!(a.rot_deg, 15.0);
        assert_eq!(a.z_index, 1);
        let b = s.sticker("s2").unwrap();
        assert_eq!(b.vfov_deg, 179.0);
        assert_eq!(b.z_index, 0);
        let crop = b.crop.unwrap();
        assert!((crop.x0 - 0.2).abs() < 1e-12 && (crop.x1 - 0.8).abs() < 1e-12);
    }

    #[test]
    fn shot_defaults_and_roll_fallback() {
        let s = EditorState::from_value(&json!({"shots": [{"id": "c", "rot_deg": 12, "out_w": 1600, "out_h": 900}]}));
        let c = s.shot().unwrap();
        assert_eq!((c.hfov_deg, c.vfov_deg), (90.0, 60.0));
        assert_eq!(c.roll_deg, 12.0);
        assert_eq!(c.aspect_id, "16:9");
    }

    #[test]
    fn only_one_shot_survives_preferring_selection() {
        let s = EditorState::from_value(&json!({
            "shots": [{"id": "a"}, {"id": "b"}, {"id": "c"}],
            "active": {"selected_shot_id": "b"}
        }));
        assert_eq!(s.shots.len(), 1);
        assert_eq!(s.shots[0].id, "b");
        assert_eq!(s.active.selected_shot_id.as_deref(), Some("b"));
    }

    #[test]
    fn unknown_asset_kinds_round_trip() {
        let raw = json!({"assets": {"x": {"type": "s3_object", "bucket": "b", "key": "k"},
                                    "p": {"type": "comfy_image", "filename": "f.png", "subfolder": "", "name": "F", "w": 64, "h": 32}}});
        let s = EditorState::from_value(&raw);
        assert_eq!(s.assets["x"].kind(), "s3_object");
        let out: Value = serde_json::from_str(&s.to_json_string().unwrap()).unwrap();
        assert_eq!(out["assets"]["x"]["bucket"], "b");
        assert_eq!(out["assets"]["p"]["storage"], "input");
        assert_eq!(out["assets"]["p"]["w"], 64);
        assert!(out["stickers"].as_array().unwrap().is_empty());
        assert!(out["active"]["selected_sticker_id"].is_null());
    }

    #[test]
    fn serialised_field_names_match_the_wire_format() {
        let mut s = EditorState::default();
        let asset = s.add_asset(Asset::new(AssetSource::Path { value: "a.png".into() }));
        s.add_sticker(&asset, (200, 100), 10.0, 0.0);
        let out: Value = serde_json::from_str(&s.to_json_string().unwrap()).unwrap();
        let st = &out["stickers"][0];
        assert_eq!(st["hFOV_deg"], 30.0);
        assert_eq!(st["vFOV_deg"], 15.0);
        assert!(st.get("crop").is_none());
        assert_eq!(out["ui_settings"]["preview_quality"], "balanced");
    }

    #[test]
    fn layers_override_per_key() {
        let s = EditorState::from_layers(&[r##"{"bg_color":"#111111"}"##, "{}"], 1024, "#112233");
        assert_eq!(s.bg_color, "#111111");
        assert_eq!(s.output_preset, 1024);
        let s = EditorState::from_layers(&[], 1024, "#112233");
        assert_eq!(s.bg_color, "#112233");
    }

    #[test]
    fn editing_keeps_z_dense_and_prunes_assets() {
        let mut s = EditorState::default();
        let a = s.add_asset(Asset::new(AssetSource::Path { value: "a.png".into() }));
        let b = s.add_asset(Asset::new(AssetSource::Path { value: "b.png".into() }));
        let s1 = s.add_sticker(&a, (100, 100), 0.0, 0.0);
        let s2 = s.add_sticker(&b, (100, 100), 0.0, 0.0);
        let s3 = s.duplicate_sticker(&s1).unwrap();
        assert_eq!(s.sticker(&s3).unwrap().yaw_deg, 8.0);
        assert_eq!(s.active.selected_sticker_id.as_deref(), Some(s3.as_str()));

        assert!(s.send_to_back(&s2));
        assert_eq!(s.sticker(&s2).unwrap().z_index, 0);
        assert!(s.bring_to_front(&s1));
        assert_eq!(s.sticker(&s1).unwrap().z_index, 2);
        let mut zs: Vec<u32> = s.stickers.iter().map(|x| x.z_index).collect();
        zs.sort_unstable();
        assert_eq!(zs, vec![0, 1, 2]);

        assert!(s.delete_sticker(&s2));
        assert!(!s.assets.contains_key(&b));
        assert!(s.assets.contains_key(&a));
        s.clear_stickers();
        assert!(s.assets.is_empty());
    }

    #[test]
    fn dangling_assets_are_reported_not_dropped() {
        let s = EditorState::from_value(&json!({"stickers": [{"id": "s", "asset_id": "gone"}]}));
        assert_eq!(s.stickers.len(), 1);
        assert_eq!(s.dangling_asset_ids(), vec!["gone".to_owned()]);
    }
}
