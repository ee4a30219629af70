// assets.rs — 贴纸位图加载：data URL 解码、本地路径解析、后台线程加载

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Cursor};
use std::path::{Component, Path, PathBuf};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::thread;

use base64::Engine;
use image::io::Reader as ImageReader;
use image::RgbaImage;

use crate::error::{Error, Result};
use crate::state::{Asset, AssetSource, EditorState};

/// Decoded bitmaps by asset id, as the renderers consume them.
pub trait BitmapSource {
    /// `None` while the bitmap is missing, loading or failed.
    fn bitmap(&self, asset_id: &str) -> Option<&RgbaImage>;
}

impl BitmapSource for HashMap<String, RgbaImage> {
    fn bitmap(&self, asset_id: &str) -> Option<&RgbaImage> {
        self.get(asset_id)
    }
}

fn decode_bytes(bytes: &[u8]) -> Result<RgbaImage> {
    let mut reader = ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;
    reader.no_limits();
    Ok(reader.decode()?.to_rgba8())
}

/// Reads any image file the `image` crate can guess the format of.
pub fn load_image_file(path: &Path) -> Result<RgbaImage> {
    let file = File::open(path)?;
    let mut reader = ImageReader::new(BufReader::new(file)).with_guessed_format()?;
    reader.no_limits();
    let img = reader.decode()?;
    log::info!("loaded image {:?} ({}x{})", path, img.width(), img.height());
    Ok(img.to_rgba8())
}

/// `data:[<mime>];base64,<payload>`. Only base64 payloads are accepted.
pub fn decode_data_url(url: &str) -> Result<RgbaImage> {
    let rest = url.trim().strip_prefix("data:").ok_or(Error::MalformedDataUrl)?;
    let (meta, payload) = rest.split_once(',').ok_or(Error::MalformedDataUrl)?;
    if !meta.split(';').any(|p| p.eq_ignore_ascii_case("base64")) {
        return Err(Error::MalformedDataUrl);
    }
    let cleaned: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = base64::engine::general_purpose::STANDARD.decode(cleaned)?;
    decode_bytes(&bytes)
}

/// Joins `rel` onto `base` lexically. Absolute paths and `..` that climb out of
/// `base` are rejected.
pub fn resolve_asset_path(base: &Path, rel: &str) -> Result<PathBuf> {
    let mut depth = 0usize;
    let mut out = base.to_path_buf();
    for comp in Path::new(rel).components() {
        match comp {
            Component::Normal(part) => {
                out.push(part);
                depth += 1;
            }
            Component::CurDir => {}
            Component::ParentDir if depth > 0 => {
                out.pop();
                depth -= 1;
            }
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(Error::PathEscapesBase(PathBuf::from(rel)));
            }
        }
    }
    if depth == 0 {
        return Err(Error::PathEscapesBase(PathBuf::from(rel)));
    }
    Ok(out)
}

/// Embeds an image file into a `dataurl` asset so the document stays self-contained.
/// Returns the asset together with the decoded bitmap.
pub fn embed_image_file(path: &Path) -> Result<(Asset, RgbaImage)> {
    let bytes = std::fs::read(path)?;
    let img = decode_bytes(&bytes)?;
    let mime = match image::guess_format(&bytes)? {
        image::ImageFormat::Png => "image/png",
        image::ImageFormat::Jpeg => "image/jpeg",
        image::ImageFormat::WebP => "image/webp",
        image::ImageFormat::Gif => "image/gif",
        image::ImageFormat::Bmp => "image/bmp",
        _ => "application/octet-stream",
    };
    let value = format!("data:{mime};base64,{}", base64::engine::general_purpose::STANDARD.encode(&bytes));
    let mut asset = Asset::new(AssetSource::DataUrl { value });
    asset.name = path.file_name().map(|n| n.to_string_lossy().into_owned());
    asset.w = Some(img.width());
    asset.h = Some(img.height());
    Ok((asset, img))
}

/// Synchronously materialises one asset.
pub fn load_asset(asset: &Asset, base_dir: Option<&Path>) -> Result<RgbaImage> {
    match &asset.source {
        AssetSource::DataUrl { value } => decode_data_url(value),
        AssetSource::Path { value } => {
            let path = match base_dir {
                Some(base) => resolve_asset_path(base, value)?,
                None => PathBuf::from(value),
            };
            load_image_file(&path)
        }
        // 远程来源需要宿主提供下载通道
        AssetSource::ExternalUrl { .. } | AssetSource::ComfyImage { .. } | AssetSource::Other(_) => {
            Err(Error::UnsupportedAsset(asset.kind().to_owned()))
        }
    }
}

#[derive(Debug)]
pub enum Slot {
    Loading,
    Ready(RgbaImage),
    Failed(String),
}

type LoadResult = (String, Result<RgbaImage>);

/// Per-asset bitmap cache fed by background loader threads.
pub struct BitmapStore {
    base_dir: Option<PathBuf>,
    slots: HashMap<String, Slot>,
    tx: Sender<LoadResult>,
    rx: Receiver<LoadResult>,
}

impl Default for BitmapStore {
    fn default() -> Self {
        Self::new(None)
    }
}

impl BitmapStore {
    pub fn new(base_dir: Option<PathBuf>) -> Self {
        let (tx, rx) = channel();
        Self { base_dir, slots: HashMap::new(), tx, rx }
    }

    pub fn slot(&self, asset_id: &str) -> Option<&Slot> {
        self.slots.get(asset_id)
    }

    pub fn is_loading(&self) -> bool {
        self.slots.values().any(|s| matches!(s, Slot::Loading))
    }

    /// Hands in a bitmap decoded elsewhere (e.g. a freshly picked file).
    pub fn insert_ready(&mut self, asset_id: &str, img: RgbaImage) {
        self.slots.insert(asset_id.to_owned(), Slot::Ready(img));
    }

    /// Starts loading `asset` unless a slot for it already exists.
    pub fn request(&mut self, asset_id: &str, asset: &Asset) {
        if self.slots.contains_key(asset_id) {
            return;
        }
        self.slots.insert(asset_id.to_owned(), Slot::Loading);
        let id = asset_id.to_owned();
        let asset = asset.clone();
        let base = self.base_dir.clone();
        let tx = self.tx.clone();
        thread::spawn(move || {
            let result = load_asset(&asset, base.as_deref());
            if tx.send((id, result)).is_err() {
                log::warn!("asset loader: store dropped before load finished");
            }
        });
    }

    /// Requests every asset of `state` and forgets slots that no longer have an asset.
    pub fn sync(&mut self, state: &EditorState) {
        self.slots.retain(|id, _| state.assets.contains_key(id));
        for (id, asset) in &state.assets {
            self.request(id, asset);
        }
    }

    /// Drains finished loads. Returns how many slots changed, so the host can redraw.
    pub fn poll(&mut self) -> usize {
        let mut changed = 0;
        while let Ok((id, result)) = self.rx.try_recv() {
            // 加载期间被移除的资源直接丢弃
            if !matches!(self.slots.get(&id), Some(Slot::Loading)) {
                continue;
            }
            let slot = match result {
                Ok(img) => {
                    log::info!("asset {id} ready ({}x{})", img.width(), img.height());
                    Slot::Ready(img)
                }
                Err(e) => {
                    log::warn!("asset {id} failed to load: {e}");
                    Slot::Failed(e.to_string())
                }
            };
            self.slots.insert(id, slot);
            changed += 1;
        }
        changed
    }
}

impl BitmapSource for BitmapStore {
    fn bitmap(&self, asset_id: &str) -> Option<&RgbaImage> {
        match self.slots.get(asset_id)? {
            Slot::Ready(img) => Some(img),
            Slot::Loading | Slot::Failed(_) => None,
        }
    }
}
