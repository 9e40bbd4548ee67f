//! # Cartograph Renderer
//!
//! Software rasterizer for Cartograph maps, built on tiny-skia.
//! Layers are drawn in order, each style in order, each feature through the
//! symbolizers of its matching rules. Styles with opacity or a compositing
//! operation are rendered offscreen and composited.
//!
//! Also provides UTFGrid interactivity output and feature queries by
//! position.

pub mod canvas;
pub mod error;
pub mod font;
pub mod grid;
pub mod labels;
pub mod query;
pub mod renderer;
pub mod transform;

pub use error::{RenderError, Result};
pub use font::FontEngine;
pub use grid::{render_grid, GridOptions, UtfGrid};
pub use query::{query_map_point, query_point};
pub use renderer::{render, render_to_file, render_to_file_with, render_to_pixmap, RenderOptions};
pub use transform::ViewTransform;
