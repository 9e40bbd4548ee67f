use std::collections::HashMap;
use std::f64::consts::{FRAC_PI_2, PI};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tiny_skia::{
    FillRule, FilterQuality, Paint, Path as SkPath, PathBuilder, Pattern, Pixmap, PixmapPaint,
    Rect, SpreadMode, Transform,
};

use cartograph_core::datasource::Query;
use cartograph_core::feature::{Feature, ImageData, RasterData};
use cartograph_core::geometry::{BBox, Geometry, Point};
use cartograph_core::layer::Layer;
use cartograph_core::map::Map;
use cartograph_core::projection::{ProjTransform, Projection};
use cartograph_core::style::Style;
use cartograph_core::symbolizer::{
    LineCap, LineJoin, LineSymbolizer, MarkerPlacement, MarkerType, MarkersSymbolizer,
    PointSymbolizer, PolygonPatternSymbolizer, PolygonSymbolizer, RasterScaling,
    RasterSymbolizer, Symbolizer, TextPlacement, TextSymbolizer, TextTransform,
};
use cartograph_io::encode::{save_as, ImageFormat};

use crate::canvas::{
    blend_mode, image_from_pixmap, outlines, pixmap_from_image, polygon_path, polygons,
    polyline_path, skia_color, solid_paint, stroke,
};
use crate::error::{RenderError, Result};
use crate::font::FontEngine;
use crate::labels::LabelCollisionDetector;
use crate::transform::ViewTransform;

/// Side of the square drawn by a point symbolizer without an image.
const DEFAULT_POINT_SIZE: u32 = 4;

/// Rendering options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderOptions {
    /// Multiplier for stroke widths, marker and text sizes.
    pub scale_factor: f64,
    /// Pixel offset applied to all output.
    pub offset_x: f64,
    pub offset_y: f64,
    pub antialias: bool,
    /// Searched for fonts after the map's own font directory.
    pub font_directories: Vec<PathBuf>,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            scale_factor: 1.0,
            offset_x: 0.0,
            offset_y: 0.0,
            antialias: true,
            font_directories: Vec::new(),
        }
    }
}

/// A feature with its geometry (and raster extent) in the map's reference system.
pub(crate) struct ProjectedFeature {
    pub feature: Feature,
    pub geometry: Option<Geometry>,
    pub raster_extent: Option<BBox>,
}

/// Render the map to a straight-alpha RGBA image.
pub fn render(map: &Map, options: &RenderOptions) -> Result<ImageData> {
    let pixmap = render_to_pixmap(map, options)?;
    image_from_pixmap(&pixmap).ok_or(RenderError::InvalidCanvas {
        width: pixmap.width(),
        height: pixmap.height(),
    })
}

/// Render with default options and write the image to `path`, choosing the
/// format from its extension.
pub fn render_to_file(map: &Map, path: impl AsRef<Path>) -> Result<()> {
    render_to_file_with(map, path, &RenderOptions::default())
}

pub fn render_to_file_with(map: &Map, path: impl AsRef<Path>, options: &RenderOptions) -> Result<()> {
    let path = path.as_ref();
    let format = ImageFormat::from_path(path)?;
    let image = render(map, options)?;
    save_as(&image, path, format)?;
    Ok(())
}

/// Render the map into a premultiplied tiny-skia pixmap.
pub fn render_to_pixmap(map: &Map, options: &RenderOptions) -> Result<Pixmap> {
    let transform = view_transform(map, map.width, map.height, options)?;
    let mut canvas = Pixmap::new(map.width, map.height).ok_or(RenderError::InvalidCanvas {
        width: map.width,
        height: map.height,
    })?;
    if let Some(background) = map.background {
        canvas.fill(skia_color(background, 1.0));
    }

    let scale_denominator = map.scale_denominator() * options.scale_factor;
    let map_proj = map.projection()?;
    log::info!(
        "Rendering {}x{} map, {} layers, scale 1:{:.0}",
        map.width,
        map.height,
        map.layer_count(),
        scale_denominator
    );

    let mut renderer = Renderer {
        map,
        options,
        transform,
        scale_denominator,
        fonts: None,
        images: HashMap::new(),
        labels: LabelCollisionDetector::new(),
    };
    for layer in map.layers() {
        if !layer.visible(scale_denominator) {
            log::debug!("Layer '{}' not visible at 1:{:.0}", layer.name, scale_denominator);
            continue;
        }
        renderer.render_layer(&mut canvas, layer, map_proj)?;
    }
    Ok(canvas)
}

/// The world-to-pixel transform for a canvas of the given size, checking
/// that the map's view box can be rendered.
pub(crate) fn view_transform(
    map: &Map,
    width: u32,
    height: u32,
    options: &RenderOptions,
) -> Result<ViewTransform> {
    let view = map.view_box().ok_or(RenderError::NoViewBox)?;
    if view.is_degenerate() || !view.is_valid() {
        return Err(RenderError::DegenerateViewBox(view));
    }
    if width == 0 || height == 0 {
        return Err(RenderError::InvalidCanvas { width, height });
    }
    Ok(ViewTransform::new(view, width, height).with_offset(options.offset_x, options.offset_y))
}

/// Query a layer's datasource with the buffered view and project the
/// results into the map's reference system. `None` for unbound layers.
pub(crate) fn layer_features(
    map: &Map,
    layer: &Layer,
    map_proj: Projection,
    scale_denominator: f64,
) -> Result<Option<Vec<ProjectedFeature>>> {
    let Some(datasource) = layer.datasource() else {
        log::debug!("Layer '{}' has no datasource", layer.name);
        return Ok(None);
    };
    let Some(extent) = map.buffered_extent() else {
        return Err(RenderError::NoViewBox);
    };
    let transform = ProjTransform::new(layer.projection()?, map_proj);
    let mut query = Query::new(transform.backward_bbox(&extent));
    let scale = map.scale();
    query.resolution = (scale, scale);
    query.scale_denominator = scale_denominator;

    let features = datasource.features(&query)?;
    log::debug!(
        "Layer '{}': {} features in {:?}",
        layer.name,
        features.len(),
        query.bbox
    );
    Ok(Some(
        features
            .into_iter()
            .map(|feature| ProjectedFeature {
                geometry: feature.geometry.as_ref().map(|g| transform.forward_geometry(g)),
                raster_extent: feature.raster.as_ref().map(|r| transform.forward_bbox(&r.extent)),
                feature,
            })
            .collect(),
    ))
}

/// Geometry a vector symbolizer should draw: `Ok(None)` when the feature
/// has nothing to draw, an error when it only carries raster data.
fn vector_geometry(pf: &ProjectedFeature) -> std::result::Result<Option<&Geometry>, &'static str> {
    match (&pf.geometry, &pf.feature.raster) {
        (Some(g), _) => Ok(Some(g)),
        (None, Some(_)) => Err("feature only carries raster data"),
        (None, None) => Ok(None),
    }
}

struct Renderer<'a> {
    map: &'a Map,
    options: &'a RenderOptions,
    transform: ViewTransform,
    scale_denominator: f64,
    fonts: Option<FontEngine>,
    images: HashMap<PathBuf, Arc<Pixmap>>,
    labels: LabelCollisionDetector,
}

impl Renderer<'_> {
    fn render_layer(&mut self, canvas: &mut Pixmap, layer: &Layer, map_proj: Projection) -> Result<()> {
        if layer.clear_label_cache {
            self.labels.clear();
        }
        let Some(features) = layer_features(self.map, layer, map_proj, self.scale_denominator)? else {
            return Ok(());
        };
        let map = self.map;
        for style_name in &layer.styles {
            let Some(style) = map.find_style(style_name) else {
                log::warn!("Layer '{}' uses undefined style '{}'", layer.name, style_name);
                continue;
            };
            if !style.rules.iter().any(|r| r.active(self.scale_denominator)) {
                continue;
            }
            if style.needs_offscreen() {
                let mut surface = Pixmap::new(canvas.width(), canvas.height()).ok_or(
                    RenderError::InvalidCanvas {
                        width: canvas.width(),
                        height: canvas.height(),
                    },
                )?;
                self.render_style(&mut surface, layer, style, &features)?;
                let paint = PixmapPaint {
                    opacity: style.opacity.clamp(0.0, 1.0) as f32,
                    blend_mode: blend_mode(style.comp_op),
                    quality: FilterQuality::Nearest,
                };
                canvas.draw_pixmap(0, 0, surface.as_ref(), &paint, Transform::identity(), None);
            } else {
                self.render_style(canvas, layer, style, &features)?;
            }
        }
        Ok(())
    }

    fn render_style(
        &mut self,
        surface: &mut Pixmap,
        layer: &Layer,
        style: &Style,
        features: &[ProjectedFeature],
    ) -> Result<()> {
        for pf in features {
            for rule in style.matching_rules(&pf.feature, self.scale_denominator) {
                for symbolizer in &rule.symbolizers {
                    self.draw(surface, layer, symbolizer, pf)?;
                }
            }
        }
        Ok(())
    }

    fn draw(
        &mut self,
        surface: &mut Pixmap,
        layer: &Layer,
        symbolizer: &Symbolizer,
        pf: &ProjectedFeature,
    ) -> Result<()> {
        let unsupported = |reason: &'static str| RenderError::Unsupported {
            symbolizer: symbolizer.name(),
            layer: layer.name.clone(),
            feature: pf.feature.id,
            reason,
        };
        if let Symbolizer::Raster(s) = symbolizer {
            return match (&pf.feature.raster, pf.raster_extent) {
                (Some(raster), Some(extent)) => self.draw_raster(surface, s, raster, &extent),
                _ => Err(unsupported("feature has no raster data")),
            };
        }
        let geometry = match vector_geometry(pf) {
            Ok(Some(g)) => g,
            Ok(None) => return Ok(()),
            Err(reason) => return Err(unsupported(reason)),
        };
        match symbolizer {
            Symbolizer::Line(s) => self.draw_line(surface, s, geometry),
            Symbolizer::Polygon(s) => self.draw_polygon(surface, s, geometry),
            Symbolizer::PolygonPattern(s) => self.draw_pattern(surface, s, geometry),
            Symbolizer::Point(s) => self.draw_point(surface, s, geometry),
            Symbolizer::Markers(s) => self.draw_markers(surface, s, geometry),
            Symbolizer::Text(s) => self.draw_text(surface, s, &pf.feature, geometry),
            Symbolizer::Raster(_) => Ok(()),
        }
    }

    fn draw_line(&mut self, surface: &mut Pixmap, s: &LineSymbolizer, g: &Geometry) -> Result<()> {
        let paint = solid_paint(s.stroke, s.stroke_opacity, s.comp_op, self.options.antialias);
        let stroke = stroke(
            s.stroke_width,
            s.line_cap,
            s.line_join,
            &s.dasharray,
            self.options.scale_factor,
        );
        let lines = outlines(g);
        if lines.is_empty() {
            log::debug!("LineSymbolizer skips {:?} geometry", g.geometry_type());
        }
        for (points, closed) in lines {
            if let Some(path) = polyline_path(points, &self.transform, closed) {
                surface.stroke_path(&path, &paint, &stroke, Transform::identity(), None);
            }
        }
        Ok(())
    }

    fn draw_polygon(&mut self, surface: &mut Pixmap, s: &PolygonSymbolizer, g: &Geometry) -> Result<()> {
        let Some(path) = polygon_path(&polygons(g), &self.transform) else {
            log::debug!("PolygonSymbolizer skips {:?} geometry", g.geometry_type());
            return Ok(());
        };
        let paint = solid_paint(s.fill, s.fill_opacity, s.comp_op, self.options.antialias);
        surface.fill_path(&path, &paint, FillRule::EvenOdd, Transform::identity(), None);
        Ok(())
    }

    fn draw_pattern(
        &mut self,
        surface: &mut Pixmap,
        s: &PolygonPatternSymbolizer,
        g: &Geometry,
    ) -> Result<()> {
        let Some(path) = polygon_path(&polygons(g), &self.transform) else {
            log::debug!("PolygonPatternSymbolizer skips {:?} geometry", g.geometry_type());
            return Ok(());
        };
        let tile = self.image(&s.file)?;
        let mut paint = Paint::default();
        paint.shader = Pattern::new(
            Pixmap::as_ref(&tile),
            SpreadMode::Repeat,
            FilterQuality::Nearest,
            s.opacity.clamp(0.0, 1.0) as f32,
            Transform::identity(),
        );
        paint.blend_mode = blend_mode(s.comp_op);
        paint.anti_alias = self.options.antialias;
        surface.fill_path(&path, &paint, FillRule::EvenOdd, Transform::identity(), None);
        Ok(())
    }

    fn draw_point(&mut self, surface: &mut Pixmap, s: &PointSymbolizer, g: &Geometry) -> Result<()> {
        let image = match &s.file {
            Some(file) => self.image(file)?,
            None => Arc::new(default_point()?),
        };
        let sf = self.options.scale_factor;
        let (w, h) = (image.width() as f64 * sf, image.height() as f64 * sf);
        let paint = PixmapPaint {
            opacity: s.opacity.clamp(0.0, 1.0) as f32,
            blend_mode: blend_mode(s.comp_op),
            quality: FilterQuality::Bilinear,
        };
        for (anchor, _) in g.anchors() {
            let c = self.transform.forward(anchor);
            let bbox = BBox::from_coords(c.x - w / 2.0, c.y - h / 2.0, c.x + w / 2.0, c.y + h / 2.0);
            if !self.place(&bbox, s.allow_overlap, s.ignore_placement) {
                continue;
            }
            let ts = Transform::from_row(
                sf as f32,
                0.0,
                0.0,
                sf as f32,
                bbox.min.x as f32,
                bbox.min.y as f32,
            );
            surface.draw_pixmap(0, 0, Pixmap::as_ref(&image), &paint, ts, None);
        }
        Ok(())
    }

    fn draw_markers(&mut self, surface: &mut Pixmap, s: &MarkersSymbolizer, g: &Geometry) -> Result<()> {
        let sf = self.options.scale_factor;
        let positions: Vec<(Point, f64)> = match s.placement {
            MarkerPlacement::Line if g.geometry_type() != cartograph_core::GeometryType::Point => {
                outlines(g)
                    .into_iter()
                    .flat_map(|(pts, _)| {
                        let screen: Vec<Point> = pts.iter().map(|p| self.transform.forward(*p)).collect();
                        points_along(&screen, s.spacing * sf)
                    })
                    .collect()
            }
            _ => g
                .anchors()
                .into_iter()
                .map(|(p, angle)| (self.transform.forward(p), -angle))
                .collect(),
        };

        let image = match &s.file {
            Some(file) => Some(self.image(file)?),
            None => None,
        };
        let (w, h) = match &image {
            Some(img) => (img.width() as f64 * sf, img.height() as f64 * sf),
            None => (s.width * sf, s.height * sf),
        };
        let shape = if image.is_none() {
            marker_path(s.marker_type, w as f32, h as f32)
        } else {
            None
        };
        let fill = solid_paint(s.fill, s.fill_opacity, s.comp_op, self.options.antialias);
        let outline = solid_paint(s.stroke, s.stroke_opacity, s.comp_op, self.options.antialias);
        let outline_stroke = stroke(s.stroke_width, LineCap::Butt, LineJoin::Miter, &[], sf);

        for (pos, angle) in positions {
            let rotate = if s.placement == MarkerPlacement::Line { angle } else { 0.0 };
            let ts = Transform::from_translate(pos.x as f32, pos.y as f32)
                .pre_rotate(rotate.to_degrees() as f32);
            let bounds = Rect::from_xywh((-w / 2.0) as f32, (-h / 2.0) as f32, w as f32, h as f32)
                .and_then(|r| r.transform(ts));
            let Some(bounds) = bounds else { continue };
            let bbox = BBox::from_coords(
                bounds.left() as f64,
                bounds.top() as f64,
                bounds.right() as f64,
                bounds.bottom() as f64,
            );
            if !self.place(&bbox, s.allow_overlap, s.ignore_placement) {
                continue;
            }
            match (&image, &shape) {
                (Some(img), _) => {
                    let paint = PixmapPaint {
                        opacity: s.fill_opacity.clamp(0.0, 1.0) as f32,
                        blend_mode: blend_mode(s.comp_op),
                        quality: FilterQuality::Bilinear,
                    };
                    let ts = ts.pre_translate((-w / 2.0) as f32, (-h / 2.0) as f32).pre_scale(sf as f32, sf as f32);
                    surface.draw_pixmap(0, 0, Pixmap::as_ref(img), &paint, ts, None);
                }
                (None, Some(path)) => {
                    surface.fill_path(path, &fill, FillRule::Winding, ts, None);
                    if s.stroke_width > 0.0 {
                        surface.stroke_path(path, &outline, &outline_stroke, ts, None);
                    }
                }
                (None, None) => {}
            }
        }
        Ok(())
    }

    fn draw_text(
        &mut self,
        surface: &mut Pixmap,
        s: &TextSymbolizer,
        feature: &Feature,
        g: &Geometry,
    ) -> Result<()> {
        let raw = s.name.evaluate(feature).to_string();
        let text = match s.text_transform {
            TextTransform::None => raw,
            TextTransform::Uppercase => raw.to_uppercase(),
            TextTransform::Lowercase => raw.to_lowercase(),
        };
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }

        let sf = self.options.scale_factor;
        let engine = self.fonts();
        let Some(face) = engine.resolve(&s.face_name).cloned() else {
            log::warn!("Font faces available: {:?}", engine.face_names());
            return Err(RenderError::FontNotFound(s.face_name.clone()));
        };
        let Some(layout) = engine.layout(&face, text, (s.size * sf) as f32) else {
            return Ok(());
        };
        let Some(glyphs) = layout.path else {
            return Ok(());
        };

        let fill = solid_paint(s.fill, s.opacity, s.comp_op, self.options.antialias);
        let halo = solid_paint(s.halo_fill, s.opacity, s.comp_op, self.options.antialias);
        let halo_stroke = stroke(s.halo_radius * 2.0, LineCap::Round, LineJoin::Round, &[], sf);
        let line_geometry = g.geometry_type() == cartograph_core::GeometryType::LineString;

        for (anchor, angle) in g.anchors() {
            let c = self.transform.forward(anchor);
            let rotate = if s.placement == TextPlacement::Line && line_geometry {
                upright(-angle)
            } else {
                0.0
            };
            let ts = Transform::from_translate((c.x + s.dx * sf) as f32, (c.y + s.dy * sf) as f32)
                .pre_rotate(rotate.to_degrees() as f32)
                .pre_translate(-layout.width / 2.0, (layout.ascent - layout.descent) / 2.0);
            let Some(placed) = glyphs.clone().transform(ts) else { continue };
            let b = placed.bounds();
            let pad = s.halo_radius * sf;
            let bbox = BBox::from_coords(
                b.left() as f64 - pad,
                b.top() as f64 - pad,
                b.right() as f64 + pad,
                b.bottom() as f64 + pad,
            );
            if !self.place(&bbox, s.allow_overlap, false) {
                continue;
            }
            if s.halo_radius > 0.0 {
                surface.stroke_path(&placed, &halo, &halo_stroke, Transform::identity(), None);
            }
            surface.fill_path(&placed, &fill, FillRule::Winding, Transform::identity(), None);
        }
        Ok(())
    }

    fn draw_raster(
        &mut self,
        surface: &mut Pixmap,
        s: &RasterSymbolizer,
        raster: &RasterData,
        extent: &BBox,
    ) -> Result<()> {
        let Some(pixmap) = pixmap_from_image(&raster.image) else {
            log::debug!("Empty raster skipped");
            return Ok(());
        };
        let (left, top, width, height) = self.transform.forward_box(extent);
        let ts = Transform::from_row(
            (width / raster.image.width() as f64) as f32,
            0.0,
            0.0,
            (height / raster.image.height() as f64) as f32,
            left as f32,
            top as f32,
        );
        let paint = PixmapPaint {
            opacity: s.opacity.clamp(0.0, 1.0) as f32,
            blend_mode: blend_mode(s.comp_op),
            quality: match s.scaling {
                RasterScaling::Near => FilterQuality::Nearest,
                RasterScaling::Bilinear => FilterQuality::Bilinear,
            },
        };
        surface.draw_pixmap(0, 0, pixmap.as_ref(), &paint, ts, None);
        Ok(())
    }

    /// Collision check; records the box unless placement is ignored.
    fn place(&mut self, bbox: &BBox, allow_overlap: bool, ignore_placement: bool) -> bool {
        if !allow_overlap && !self.labels.has_placement(bbox) {
            return false;
        }
        if !ignore_placement {
            self.labels.insert(*bbox);
        }
        true
    }

    fn fonts(&mut self) -> &FontEngine {
        let map = self.map;
        let options = self.options;
        self.fonts.get_or_insert_with(|| {
            let mut engine = FontEngine::new();
            for dir in map.font_directory.iter().chain(options.font_directories.iter()) {
                let added = engine.register_directory(dir);
                log::debug!("Registered {} font faces from {}", added, dir.display());
            }
            engine
        })
    }

    fn image(&mut self, path: &Path) -> Result<Arc<Pixmap>> {
        if let Some(cached) = self.images.get(path) {
            return Ok(Arc::clone(cached));
        }
        let image = cartograph_io::raster::load_image(path).map_err(|e| RenderError::Image {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let pixmap = pixmap_from_image(&image).ok_or_else(|| RenderError::Image {
            path: path.to_path_buf(),
            message: "image has no pixels".to_string(),
        })?;
        let pixmap = Arc::new(pixmap);
        self.images.insert(path.to_path_buf(), Arc::clone(&pixmap));
        Ok(pixmap)
    }
}

fn default_point() -> Result<Pixmap> {
    let mut pixmap = Pixmap::new(DEFAULT_POINT_SIZE, DEFAULT_POINT_SIZE).ok_or(
        RenderError::InvalidCanvas {
            width: DEFAULT_POINT_SIZE,
            height: DEFAULT_POINT_SIZE,
        },
    )?;
    pixmap.fill(tiny_skia::Color::BLACK);
    Ok(pixmap)
}

/// Marker outline centred on the origin, pointing along +x.
fn marker_path(kind: MarkerType, w: f32, h: f32) -> Option<SkPath> {
    match kind {
        MarkerType::Ellipse => PathBuilder::from_oval(Rect::from_xywh(-w / 2.0, -h / 2.0, w, h)?),
        MarkerType::Arrow => {
            let head = (w / 2.0 - h / 2.0).max(-w / 2.0);
            let mut pb = PathBuilder::new();
            pb.move_to(-w / 2.0, -h / 4.0);
            pb.line_to(head, -h / 4.0);
            pb.line_to(head, -h / 2.0);
            pb.line_to(w / 2.0, 0.0);
            pb.line_to(head, h / 2.0);
            pb.line_to(head, h / 4.0);
            pb.line_to(-w / 2.0, h / 4.0);
            pb.close();
            pb.finish()
        }
    }
}

/// Positions every `spacing` pixels along a screen-space polyline, starting
/// half a spacing in, with the direction of travel.
fn points_along(points: &[Point], spacing: f64) -> Vec<(Point, f64)> {
    let mut out = Vec::new();
    if spacing <= 0.0 {
        return out;
    }
    let mut next = spacing / 2.0;
    let mut travelled = 0.0;
    for w in points.windows(2) {
        let seg = w[0].distance_to(&w[1]);
        if seg <= 0.0 {
            continue;
        }
        let angle = (w[1].y - w[0].y).atan2(w[1].x - w[0].x);
        while next <= travelled + seg {
            let t = (next - travelled) / seg;
            out.push((
                Point::new(w[0].x + (w[1].x - w[0].x) * t, w[0].y + (w[1].y - w[0].y) * t),
                angle,
            ));
            next += spacing;
        }
        travelled += seg;
    }
    out
}

/// Fold an angle into (-90°, 90°] so text never reads upside down.
fn upright(angle: f64) -> f64 {
    let mut a = angle;
    while a > FRAC_PI_2 {
        a -= PI;
    }
    while a <= -FRAC_PI_2 {
        a += PI;
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;
    use cartograph_core::color::Color;
    use cartograph_core::datasource::MemoryDatasource;
    use cartograph_core::expression::Expression;
    use cartograph_core::geometry::Polygon;
    use cartograph_core::style::{Filter, Rule};

    fn pixel(image: &ImageData, x: u32, y: u32) -> [u8; 4] {
        image.pixel(x, y).unwrap()
    }

    fn square(x0: f64, y0: f64, x1: f64, y1: f64) -> Geometry {
        Geometry::Polygon(Polygon::new(
            vec![
                Point::new(x0, y0),
                Point::new(x1, y0),
                Point::new(x1, y1),
                Point::new(x0, y1),
            ],
            Vec::new(),
        ))
    }

    fn map_with(features: Vec<Feature>, style: Style) -> Map {
        let mut map = Map::new(100, 100);
        map.background = Some(Color::WHITE);
        let name = style.name.clone();
        map.add_style(style);
        map.add_layer(
            Layer::new("layer")
                .with_style(&name)
                .with_datasource(Arc::new(MemoryDatasource::new(features))),
        );
        map.zoom_to_box(BBox::from_coords(0.0, 0.0, 10.0, 10.0));
        map
    }

    fn fill_style(color: Color) -> Style {
        Style::new("fill").with_rule(Rule::new("r").with_symbolizer(Symbolizer::Polygon(
            PolygonSymbolizer {
                fill: color,
                ..Default::default()
            },
        )))
    }

    #[test]
    fn test_view_box_required() {
        let map = Map::new(10, 10);
        assert!(matches!(render(&map, &RenderOptions::default()), Err(RenderError::NoViewBox)));
        let mut map = Map::new(10, 10);
        map.zoom_to_box(BBox::from_coords(1.0, 1.0, 1.0, 1.0));
        assert!(matches!(
            render(&map, &RenderOptions::default()),
            Err(RenderError::DegenerateViewBox(_))
        ));
    }

    #[test]
    fn test_polygon_fill_covers_its_pixels() {
        let map = map_with(
            vec![Feature::new(1).with_geometry(square(0.0, 0.0, 5.0, 10.0))],
            fill_style(Color::rgb(255, 0, 0)),
        );
        let image = render(&map, &RenderOptions::default()).unwrap();
        assert_eq!(pixel(&image, 10, 50), [255, 0, 0, 255]);
        assert_eq!(pixel(&image, 90, 50), [255, 255, 255, 255]);
    }

    #[test]
    fn test_filters_select_symbolizers() {
        let style = Style::new("s")
            .with_rule(
                Rule::new("big")
                    .with_filter(Filter::Expr(Expression::parse("[kind] = 'big'").unwrap()))
                    .with_symbolizer(Symbolizer::Polygon(PolygonSymbolizer {
                        fill: Color::rgb(0, 0, 255),
                        ..Default::default()
                    })),
            )
            .with_rule(Rule::new("other").with_filter(Filter::Else).with_symbolizer(
                Symbolizer::Polygon(PolygonSymbolizer {
                    fill: Color::rgb(0, 255, 0),
                    ..Default::default()
                }),
            ));
        let map = map_with(
            vec![
                Feature::new(1)
                    .with_geometry(square(0.0, 0.0, 5.0, 10.0))
                    .with_attribute("kind", "big"),
                Feature::new(2)
                    .with_geometry(square(5.0, 0.0, 10.0, 10.0))
                    .with_attribute("kind", "small"),
            ],
            style,
        );
        let image = render(&map, &RenderOptions::default()).unwrap();
        assert_eq!(pixel(&image, 20, 50), [0, 0, 255, 255]);
        assert_eq!(pixel(&image, 80, 50), [0, 255, 0, 255]);
    }

    #[test]
    fn test_style_opacity_composites_offscreen() {
        let mut style = fill_style(Color::BLACK);
        style.opacity = 0.5;
        let map = map_with(vec![Feature::new(1).with_geometry(square(0.0, 0.0, 10.0, 10.0))], style);
        let image = render(&map, &RenderOptions::default()).unwrap();
        let [r, g, b, a] = pixel(&image, 50, 50);
        assert_eq!(a, 255);
        assert!((120..=135).contains(&r) && r == g && g == b, "got {:?}", [r, g, b]);
    }

    #[test]
    fn test_raster_symbolizer_needs_raster_data() {
        let style = Style::new("r").with_rule(
            Rule::new("r").with_symbolizer(Symbolizer::Raster(RasterSymbolizer::default())),
        );
        let map = map_with(vec![Feature::new(1).with_geometry(square(0.0, 0.0, 5.0, 5.0))], style);
        assert!(matches!(
            render(&map, &RenderOptions::default()),
            Err(RenderError::Unsupported { symbolizer: "RasterSymbolizer", .. })
        ));
    }

    #[test]
    fn test_raster_draws_into_extent() {
        let image = ImageData::new(1, 1, vec![0, 128, 0, 255]).unwrap();
        let raster = Feature::new(1).with_raster(RasterData {
            extent: BBox::from_coords(0.0, 0.0, 5.0, 10.0),
            image,
        });
        let style = Style::new("r").with_rule(
            Rule::new("r").with_symbolizer(Symbolizer::Raster(RasterSymbolizer::default())),
        );
        let map = map_with(vec![raster.clone()], style);
        let out = render(&map, &RenderOptions::default()).unwrap();
        assert_eq!(pixel(&out, 25, 50), [0, 128, 0, 255]);
        assert_eq!(pixel(&out, 75, 50), [255, 255, 255, 255]);

        let map = map_with(vec![raster], fill_style(Color::BLACK));
        assert!(matches!(
            render(&map, &RenderOptions::default()),
            Err(RenderError::Unsupported { symbolizer: "PolygonSymbolizer", .. })
        ));
    }

    #[test]
    fn test_mismatched_geometry_is_skipped() {
        let map = map_with(
            vec![Feature::new(1).with_geometry(Geometry::Point(Point::new(5.0, 5.0)))],
            fill_style(Color::BLACK),
        );
        let image = render(&map, &RenderOptions::default()).unwrap();
        assert_eq!(pixel(&image, 50, 50), [255, 255, 255, 255]);
    }

    #[test]
    fn test_points_avoid_collisions() {
        let style = Style::new("p").with_rule(
            Rule::new("p").with_symbolizer(Symbolizer::Point(PointSymbolizer::default())),
        );
        let mut map = map_with(
            vec![
                Feature::new(1).with_geometry(Geometry::Point(Point::new(5.0, 5.0))),
                Feature::new(2).with_geometry(Geometry::Point(Point::new(5.1, 5.1))),
            ],
            style,
        );
        map.background = None;
        let image = render(&map, &RenderOptions::default()).unwrap();
        let drawn = image.data().chunks_exact(4).filter(|p| p[3] > 0).count();
        assert_eq!(drawn, 16);
    }

    #[test]
    fn test_text_without_font_fails() {
        let style = Style::new("t").with_rule(Rule::new("t").with_symbolizer(Symbolizer::Text(
            TextSymbolizer::new(Expression::parse("[name]").unwrap()),
        )));
        let map = map_with(
            vec![Feature::new(1)
                .with_geometry(Geometry::Point(Point::new(5.0, 5.0)))
                .with_attribute("name", "Oslo")],
            style,
        );
        assert!(matches!(
            render(&map, &RenderOptions::default()),
            Err(RenderError::FontNotFound(ref f)) if f == "DejaVu Sans Book"
        ));
    }

    #[test]
    fn test_hidden_layers_are_skipped() {
        let mut map = map_with(
            vec![Feature::new(1).with_geometry(square(0.0, 0.0, 10.0, 10.0))],
            fill_style(Color::BLACK),
        );
        map.layers_mut()[0].max_scale = 1.0;
        let image = render(&map, &RenderOptions::default()).unwrap();
        assert_eq!(pixel(&image, 50, 50), [255, 255, 255, 255]);
    }

    #[test]
    fn test_points_along_and_upright() {
        let line = [Point::new(0.0, 0.0), Point::new(100.0, 0.0)];
        let pts = points_along(&line, 40.0);
        assert_eq!(pts.len(), 3);
        assert_eq!(pts[0].0, Point::new(20.0, 0.0));
        assert!((upright(PI) - 0.0).abs() < 1e-12);
        assert!((upright(-FRAC_PI_2 - 0.1) - (FRAC_PI_2 - 0.1)).abs() < 1e-12);
    }
}
