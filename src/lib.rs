// lib.rs — 全景贴纸/裁切投影引擎

//! Spherical panorama sticker and cutout engine.
//!
//! Everything is expressed in one direction convention (yaw 0 looks down +Z, yaw 90
//! down +X, positive pitch toward +Y) and drawn through a software mesh warp that
//! only needs affine triangle blits from its [`RasterSurface`].

pub mod assets;
pub mod camera;
pub mod cutout;
pub mod equirect;
pub mod error;
pub mod export;
pub mod interaction;
pub mod math;
pub mod overlay;
pub mod raster;
pub mod session;
pub mod state;
pub mod sticker;
pub mod warp;

pub use assets::{BitmapSource, BitmapStore};
pub use camera::{Basis, FovAxis, Projector, Rect, Viewport};
pub use error::{Error, Result};
pub use export::{compose_stickers_to_erp, render_cutout};
pub use interaction::{FrameRequest, InteractionController, NavConfig, View, ViewHost};
pub use raster::RasterSurface;
pub use session::{EditorKind, EditorSession, PointerButton, ViewMode};
pub use state::{Asset, AssetSource, CutoutShot, EditorState, PreviewQuality, Sticker};
pub use sticker::Placement;
pub use warp::{MeshDensity, MeshWarpRenderer, WarpOptions};
