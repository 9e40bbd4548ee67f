//! # Cartograph Core
//!
//! Map model for the Cartograph renderer: geometry primitives, features and
//! attribute values, filter expressions, symbolizers, rule-based styles,
//! layers bound to datasources, and the extent resolver.
//!
//! Datasources are indexed with an R-tree so that render queries only touch
//! features intersecting the view.

pub mod color;
pub mod datasource;
pub mod error;
pub mod expression;
pub mod feature;
pub mod geometry;
pub mod layer;
pub mod map;
pub mod projection;
pub mod spatial;
pub mod style;
pub mod symbolizer;

pub use color::Color;
pub use datasource::{Datasource, DatasourceKind, MemoryDatasource, Parameters, Query};
pub use error::{Error, Result};
pub use expression::Expression;
pub use feature::{Feature, ImageData, RasterData, Value};
pub use geometry::{BBox, Geometry, GeometryType, Point, Polygon};
pub use layer::Layer;
pub use map::{AspectFixMode, Map};
pub use projection::{ProjTransform, Projection};
pub use style::{Filter, FilterMode, Rule, Style};
pub use symbolizer::Symbolizer;
