use std::path::PathBuf;

use thiserror::Error;

use cartograph_core::geometry::BBox;
use cartograph_io::EncodeError;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Map has no view box; zoom to an extent before rendering")]
    NoViewBox,

    #[error("View box {0:?} has zero width or height")]
    DegenerateViewBox(BBox),

    #[error("Invalid canvas size {width}x{height}")]
    InvalidCanvas { width: u32, height: u32 },

    #[error("{symbolizer} cannot draw feature {feature} of layer '{layer}': {reason}")]
    Unsupported {
        symbolizer: &'static str,
        layer: String,
        feature: u64,
        reason: &'static str,
    },

    #[error("Font face '{0}' not found")]
    FontNotFound(String),

    #[error("Failed to load image '{path}': {message}")]
    Image { path: PathBuf, message: String },

    #[error("UTFGrid has {0} keys, more than its codepoints can encode")]
    TooManyGridKeys(usize),

    #[error("Layer '{0}' not found")]
    LayerNotFound(String),

    #[error(transparent)]
    Map(#[from] cartograph_core::Error),

    #[error(transparent)]
    Encode(#[from] EncodeError),
}

pub type Result<T> = std::result::Result<T, RenderError>;
