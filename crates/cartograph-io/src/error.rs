use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading a stylesheet.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("XML syntax error: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("Expected root element <Map>, found <{0}>")]
    NotAMap(String),

    #[error("Missing required attribute '{attribute}' on <{element}>")]
    MissingAttribute { element: String, attribute: String },

    #[error("Invalid value '{value}' for '{attribute}' on <{element}>: {message}")]
    InvalidAttribute {
        element: String,
        attribute: String,
        value: String,
        message: String,
    },

    #[error("Unknown element <{element}> inside <{parent}>")]
    UnknownElement { element: String, parent: String },

    #[error("Unknown attribute '{attribute}' on <{element}>")]
    UnknownAttribute { element: String, attribute: String },

    #[error("Invalid filter in rule '{rule}': {source}")]
    Filter {
        rule: String,
        #[source]
        source: cartograph_core::Error,
    },

    #[error("Rule '{0}' has more than one filter")]
    ConflictingFilters(String),

    #[error("Style '{0}' is defined more than once")]
    DuplicateStyle(String),

    #[error("Style '{style}' used by layer '{layer}' is not defined")]
    UndefinedStyle { style: String, layer: String },

    #[error("Datasource template '{0}' is not defined")]
    UndefinedTemplate(String),

    #[error("Datasource of layer '{0}' has no 'type' parameter")]
    MissingDatasourceType(String),

    #[error("Unknown datasource type '{0}'")]
    UnknownDatasourceType(String),

    #[error("Failed to bind datasource of layer '{layer}': {source}")]
    Datasource {
        layer: String,
        #[source]
        source: cartograph_core::Error,
    },
}

/// Errors raised while encoding an image.
#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("Unsupported image format '{0}'")]
    UnsupportedFormat(String),

    #[error("Image encoding failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
