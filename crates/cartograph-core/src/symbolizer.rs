use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::color::Color;
use crate::expression::Expression;

/// Porter-Duff and separable blend modes accepted in `comp-op`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompositeOp {
    Clear,
    Src,
    Dst,
    SrcOver,
    DstOver,
    SrcIn,
    DstIn,
    SrcOut,
    DstOut,
    SrcAtop,
    DstAtop,
    Xor,
    Plus,
    Multiply,
    Screen,
    Overlay,
    Darken,
    Lighten,
    ColorDodge,
    ColorBurn,
    HardLight,
    SoftLight,
    Difference,
    Exclusion,
}

impl CompositeOp {
    pub fn from_name(name: &str) -> Option<Self> {
        let op = match name {
            "clear" => CompositeOp::Clear,
            "src" => CompositeOp::Src,
            "dst" => CompositeOp::Dst,
            "src-over" => CompositeOp::SrcOver,
            "dst-over" => CompositeOp::DstOver,
            "src-in" => CompositeOp::SrcIn,
            "dst-in" => CompositeOp::DstIn,
            "src-out" => CompositeOp::SrcOut,
            "dst-out" => CompositeOp::DstOut,
            "src-atop" => CompositeOp::SrcAtop,
            "dst-atop" => CompositeOp::DstAtop,
            "xor" => CompositeOp::Xor,
            "plus" => CompositeOp::Plus,
            "multiply" => CompositeOp::Multiply,
            "screen" => CompositeOp::Screen,
            "overlay" => CompositeOp::Overlay,
            "darken" => CompositeOp::Darken,
            "lighten" => CompositeOp::Lighten,
            "color-dodge" => CompositeOp::ColorDodge,
            "color-burn" => CompositeOp::ColorBurn,
            "hard-light" => CompositeOp::HardLight,
            "soft-light" => CompositeOp::SoftLight,
            "difference" => CompositeOp::Difference,
            "exclusion" => CompositeOp::Exclusion,
            _ => return None,
        };
        Some(op)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineCap {
    Butt,
    Round,
    Square,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineJoin {
    Miter,
    Round,
    Bevel,
}

/// Strokes lines and polygon outlines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineSymbolizer {
    pub stroke: Color,
    pub stroke_width: f64,
    pub stroke_opacity: f64,
    pub line_cap: LineCap,
    pub line_join: LineJoin,
    /// Alternating dash and gap lengths in pixels; empty for a solid line.
    pub dasharray: Vec<f64>,
    pub comp_op: Option<CompositeOp>,
}

impl Default for LineSymbolizer {
    fn default() -> Self {
        Self {
            stroke: Color::BLACK,
            stroke_width: 1.0,
            stroke_opacity: 1.0,
            line_cap: LineCap::Butt,
            line_join: LineJoin::Miter,
            dasharray: Vec::new(),
            comp_op: None,
        }
    }
}

/// Fills polygons with a solid colour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolygonSymbolizer {
    pub fill: Color,
    pub fill_opacity: f64,
    pub comp_op: Option<CompositeOp>,
}

impl Default for PolygonSymbolizer {
    fn default() -> Self {
        Self {
            fill: Color::rgb(128, 128, 128),
            fill_opacity: 1.0,
            comp_op: None,
        }
    }
}

/// Fills polygons with a repeating image tile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolygonPatternSymbolizer {
    pub file: PathBuf,
    pub opacity: f64,
    pub comp_op: Option<CompositeOp>,
}

/// Draws an image (or a small square when no file is given) at each anchor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointSymbolizer {
    pub file: Option<PathBuf>,
    pub opacity: f64,
    pub allow_overlap: bool,
    pub ignore_placement: bool,
    pub comp_op: Option<CompositeOp>,
}

impl Default for PointSymbolizer {
    fn default() -> Self {
        Self {
            file: None,
            opacity: 1.0,
            allow_overlap: false,
            ignore_placement: false,
            comp_op: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarkerType {
    Ellipse,
    Arrow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarkerPlacement {
    /// One marker at each geometry anchor.
    Point,
    /// Markers repeated along lines every `spacing` pixels.
    Line,
}

/// Vector markers: ellipses or arrows, or an image file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkersSymbolizer {
    pub file: Option<PathBuf>,
    pub marker_type: MarkerType,
    pub width: f64,
    pub height: f64,
    pub fill: Color,
    pub fill_opacity: f64,
    pub stroke: Color,
    pub stroke_width: f64,
    pub stroke_opacity: f64,
    pub placement: MarkerPlacement,
    pub spacing: f64,
    pub allow_overlap: bool,
    pub ignore_placement: bool,
    pub comp_op: Option<CompositeOp>,
}

impl Default for MarkersSymbolizer {
    fn default() -> Self {
        Self {
            file: None,
            marker_type: MarkerType::Ellipse,
            width: 10.0,
            height: 10.0,
            fill: Color::rgb(0, 0, 255),
            fill_opacity: 1.0,
            stroke: Color::BLACK,
            stroke_width: 0.5,
            stroke_opacity: 1.0,
            placement: MarkerPlacement::Point,
            spacing: 100.0,
            allow_overlap: false,
            ignore_placement: false,
            comp_op: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextPlacement {
    /// Horizontal label centred on the anchor.
    Point,
    /// Label rotated along the line at its midpoint.
    Line,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextTransform {
    None,
    Uppercase,
    Lowercase,
}

/// Labels features with the value of an expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextSymbolizer {
    pub name: Expression,
    pub face_name: String,
    pub size: f64,
    pub fill: Color,
    pub opacity: f64,
    pub halo_fill: Color,
    pub halo_radius: f64,
    pub placement: TextPlacement,
    pub dx: f64,
    pub dy: f64,
    pub allow_overlap: bool,
    pub text_transform: TextTransform,
    pub comp_op: Option<CompositeOp>,
}

impl TextSymbolizer {
    pub fn new(name: Expression) -> Self {
        Self {
            name,
            face_name: "DejaVu Sans Book".to_string(),
            size: 10.0,
            fill: Color::BLACK,
            opacity: 1.0,
            halo_fill: Color::WHITE,
            halo_radius: 0.0,
            placement: TextPlacement::Point,
            dx: 0.0,
            dy: 0.0,
            allow_overlap: false,
            text_transform: TextTransform::None,
            comp_op: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RasterScaling {
    Near,
    Bilinear,
}

/// Draws the raster payload of a feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RasterSymbolizer {
    pub opacity: f64,
    pub scaling: RasterScaling,
    pub comp_op: Option<CompositeOp>,
}

impl Default for RasterSymbolizer {
    fn default() -> Self {
        Self {
            opacity: 1.0,
            scaling: RasterScaling::Near,
            comp_op: None,
        }
    }
}

/// A rendering instruction attached to a rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Symbolizer {
    Point(PointSymbolizer),
    Line(LineSymbolizer),
    Polygon(PolygonSymbolizer),
    PolygonPattern(PolygonPatternSymbolizer),
    Markers(MarkersSymbolizer),
    Text(TextSymbolizer),
    Raster(RasterSymbolizer),
}

impl Symbolizer {
    /// Stylesheet element name.
    pub fn name(&self) -> &'static str {
        match self {
            Symbolizer::Point(_) => "PointSymbolizer",
            Symbolizer::Line(_) => "LineSymbolizer",
            Symbolizer::Polygon(_) => "PolygonSymbolizer",
            Symbolizer::PolygonPattern(_) => "PolygonPatternSymbolizer",
            Symbolizer::Markers(_) => "MarkersSymbolizer",
            Symbolizer::Text(_) => "TextSymbolizer",
            Symbolizer::Raster(_) => "RasterSymbolizer",
        }
    }

    pub fn comp_op(&self) -> Option<CompositeOp> {
        match self {
            Symbolizer::Point(s) => s.comp_op,
            Symbolizer::Line(s) => s.comp_op,
            Symbolizer::Polygon(s) => s.comp_op,
            Symbolizer::PolygonPattern(s) => s.comp_op,
            Symbolizer::Markers(s) => s.comp_op,
            Symbolizer::Text(s) => s.comp_op,
            Symbolizer::Raster(s) => s.comp_op,
        }
    }
}
