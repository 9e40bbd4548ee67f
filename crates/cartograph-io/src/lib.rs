//! # Cartograph I/O
//!
//! Everything that crosses the filesystem: the XML stylesheet loader, the
//! datasource plugins it binds (GeoJSON, CSV, georeferenced rasters) and
//! the image encoders for rendered output.

pub mod csv;
pub mod encode;
pub mod error;
pub mod geojson;
pub mod raster;
pub mod registry;
pub mod stylesheet;
pub mod wkt;

pub use encode::{encode_to_vec, save, save_as, ImageFormat};
pub use error::{EncodeError, ParseError};
pub use registry::{DatasourceFactory, DatasourceRegistry};
pub use stylesheet::{load_map, load_map_string, LoadOptions, StylesheetLoader};
