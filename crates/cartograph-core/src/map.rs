use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::color::Color;
use crate::datasource::Parameters;
use crate::error::{Error, Result};
use crate::geometry::{BBox, Point};
use crate::layer::Layer;
use crate::projection::{ProjTransform, Projection, EARTH_RADIUS};
use crate::style::Style;

/// Size of a rendered pixel in metres (0.28 mm).
pub const PIXEL_SIZE_METRES: f64 = 0.00028;

/// How a requested box is reconciled with the canvas aspect ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum AspectFixMode {
    /// Grow the smaller dimension of the box.
    #[default]
    GrowBbox,
    /// Shrink the larger dimension of the box.
    ShrinkBbox,
    AdjustBboxWidth,
    AdjustBboxHeight,
    /// Keep the box as given; the image is stretched.
    Respect,
}

impl AspectFixMode {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "grow-bbox" | "GROW_BBOX" => Some(AspectFixMode::GrowBbox),
            "shrink-bbox" | "SHRINK_BBOX" => Some(AspectFixMode::ShrinkBbox),
            "adjust-bbox-width" | "ADJUST_BBOX_WIDTH" => Some(AspectFixMode::AdjustBboxWidth),
            "adjust-bbox-height" | "ADJUST_BBOX_HEIGHT" => Some(AspectFixMode::AdjustBboxHeight),
            "respect" | "RESPECT" => Some(AspectFixMode::Respect),
            _ => None,
        }
    }
}

/// The map model: canvas, spatial reference, styles and layers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Map {
    pub width: u32,
    pub height: u32,
    /// Canvas fill; transparent when unset.
    pub background: Option<Color>,
    pub srs: String,
    /// Padding in pixels around the view box when querying datasources.
    pub buffer_size: u32,
    pub maximum_extent: Option<BBox>,
    pub aspect_fix_mode: AspectFixMode,
    pub font_directory: Option<PathBuf>,
    /// Named datasource parameter sets that layers can inherit from.
    pub datasource_templates: BTreeMap<String, Parameters>,
    view_box: Option<BBox>,
    styles: Vec<Style>,
    layers: Vec<Layer>,
}

impl Map {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            background: None,
            srs: Projection::Geographic.srs().to_string(),
            buffer_size: 0,
            maximum_extent: None,
            aspect_fix_mode: AspectFixMode::default(),
            font_directory: None,
            datasource_templates: BTreeMap::new(),
            view_box: None,
            styles: Vec::new(),
            layers: Vec::new(),
        }
    }

    pub fn projection(&self) -> Result<Projection> {
        Projection::from_srs(&self.srs)
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        if let Some(b) = self.view_box {
            self.zoom_to_box(b);
        }
    }

    // ── Styles ───────────────────────────────────────────────────────

    /// Add a style; returns `false` if one with the same name exists.
    pub fn add_style(&mut self, style: Style) -> bool {
        if self.find_style(&style.name).is_some() {
            return false;
        }
        self.styles.push(style);
        true
    }

    pub fn find_style(&self, name: &str) -> Option<&Style> {
        self.styles.iter().find(|s| s.name == name)
    }

    pub fn styles(&self) -> &[Style] {
        &self.styles
    }

    // ── Layers ───────────────────────────────────────────────────────

    pub fn add_layer(&mut self, layer: Layer) {
        self.layers.push(layer);
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layers_mut(&mut self) -> &mut [Layer] {
        &mut self.layers
    }

    pub fn get_layer(&self, name: &str) -> Option<&Layer> {
        self.layers.iter().find(|l| l.name == name)
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    // ── View ─────────────────────────────────────────────────────────

    pub fn view_box(&self) -> Option<BBox> {
        self.view_box
    }

    /// Set the view box, fixing it to the canvas aspect ratio.
    /// A degenerate box is stored as given.
    pub fn zoom_to_box(&mut self, bbox: BBox) {
        self.view_box = Some(self.fix_aspect(bbox));
    }

    /// Fit the view to the union of all active layers' extents.
    pub fn zoom_all(&mut self) -> Result<()> {
        let map_proj = self.projection()?;
        let mut extent: Option<BBox> = None;
        for layer in self.layers.iter().filter(|l| l.active) {
            let Some(envelope) = layer.envelope() else {
                log::debug!("Layer '{}' has no extent, skipped", layer.name);
                continue;
            };
            let transform = ProjTransform::new(layer.projection()?, map_proj);
            let projected = transform.forward_bbox(&envelope);
            log::debug!("Layer '{}' extent {:?}", layer.name, projected);
            extent = Some(match extent {
                Some(e) => e.union(&projected),
                None => projected,
            });
        }
        let mut extent = extent.ok_or(Error::EmptyExtent)?;
        if let Some(max) = self.maximum_extent {
            extent = extent.intersection(&max).ok_or(Error::EmptyExtent)?;
        }
        self.zoom_to_box(extent);
        log::info!("Zoomed to {:?}", self.view_box);
        Ok(())
    }

    /// Re-centre the view on a pixel position.
    pub fn pan(&mut self, x: i32, y: i32) {
        let Some(b) = self.view_box else { return };
        let s = self.scale();
        let dx = (x as f64 - self.width as f64 / 2.0) * s;
        let dy = (self.height as f64 / 2.0 - y as f64) * s;
        self.view_box = Some(BBox::new(
            b.min.translate(dx, dy),
            b.max.translate(dx, dy),
        ));
    }

    /// Scale the view box about its centre; factors below 1 zoom in.
    pub fn zoom(&mut self, factor: f64) {
        let Some(b) = self.view_box else { return };
        let c = b.center();
        let hw = b.width() * factor / 2.0;
        let hh = b.height() * factor / 2.0;
        self.view_box = Some(BBox::new(
            Point::new(c.x - hw, c.y - hh),
            Point::new(c.x + hw, c.y + hh),
        ));
    }

    /// Map units per pixel, or 0 without a view box.
    pub fn scale(&self) -> f64 {
        match self.view_box {
            Some(b) if self.width > 0 => b.width() / self.width as f64,
            _ => 0.0,
        }
    }

    /// OGC scale denominator of the current view.
    pub fn scale_denominator(&self) -> f64 {
        let geographic = self.projection().map(|p| p.is_geographic()).unwrap_or(false);
        scale_denominator(self.scale(), geographic)
    }

    /// The view box grown by `buffer_size` pixels on each side.
    pub fn buffered_extent(&self) -> Option<BBox> {
        let s = self.scale();
        self.view_box.map(|b| b.pad(self.buffer_size as f64 * s))
    }

    fn fix_aspect(&self, b: BBox) -> BBox {
        if b.is_degenerate() || self.width == 0 || self.height == 0 {
            return b;
        }
        let canvas = self.width as f64 / self.height as f64;
        let current = b.width() / b.height();
        if (canvas - current).abs() < f64::EPSILON {
            return b;
        }
        let with_height = |h: f64| resize_about_center(&b, b.width(), h);
        let with_width = |w: f64| resize_about_center(&b, w, b.height());
        match self.aspect_fix_mode {
            AspectFixMode::AdjustBboxHeight => with_height(b.width() / canvas),
            AspectFixMode::AdjustBboxWidth => with_width(b.height() * canvas),
            AspectFixMode::GrowBbox if current > canvas => with_height(b.width() / canvas),
            AspectFixMode::GrowBbox => with_width(b.height() * canvas),
            AspectFixMode::ShrinkBbox if current < canvas => with_height(b.width() / canvas),
            AspectFixMode::ShrinkBbox => with_width(b.height() * canvas),
            AspectFixMode::Respect => b,
        }
    }

    // ── Serialization ────────────────────────────────────────────────

    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

fn resize_about_center(b: &BBox, width: f64, height: f64) -> BBox {
    let c = b.center();
    BBox::new(
        Point::new(c.x - width / 2.0, c.y - height / 2.0),
        Point::new(c.x + width / 2.0, c.y + height / 2.0),
    )
}

/// Scale denominator for a resolution in map units per pixel.
pub fn scale_denominator(scale: f64, geographic: bool) -> f64 {
    let denom = scale / PIXEL_SIZE_METRES;
    if geographic {
        denom * EARTH_RADIUS * 2.0 * std::f64::consts::PI / 360.0
    } else {
        denom
    }
}
