// error.rs — 库级错误类型

use std::path::PathBuf;

/// Errors surfaced by the fallible (I/O and export) parts of the crate.
///
/// Interactive and preview paths never produce these: a bitmap that is not
/// loaded yet or a degenerate triangle is reported as "nothing drawn" instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed data url")]
    MalformedDataUrl,

    #[error("base64 decode failed: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("asset path {0:?} escapes its base directory")]
    PathEscapesBase(PathBuf),

    #[error("asset kind `{0}` cannot be loaded locally")]
    UnsupportedAsset(String),

    #[error("render produced no triangles ({0})")]
    NothingDrawn(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;
