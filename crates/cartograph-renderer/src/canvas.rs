//! Conversions between the map model and tiny-skia drawing primitives.

use tiny_skia::{
    BlendMode, Color as SkColor, ColorU8, IntSize, LineCap as SkLineCap,
    LineJoin as SkLineJoin, Paint, Path, PathBuilder, Pixmap, Stroke, StrokeDash,
};

use cartograph_core::color::Color;
use cartograph_core::feature::ImageData;
use cartograph_core::geometry::{Geometry, Point, Polygon};
use cartograph_core::symbolizer::{CompositeOp, LineCap, LineJoin};

use crate::transform::ViewTransform;

pub fn skia_color(color: Color, opacity: f64) -> SkColor {
    let c = color.with_opacity(opacity);
    SkColor::from_rgba8(c.r, c.g, c.b, c.a)
}

pub fn blend_mode(op: Option<CompositeOp>) -> BlendMode {
    match op {
        None | Some(CompositeOp::SrcOver) => BlendMode::SourceOver,
        Some(CompositeOp::Clear) => BlendMode::Clear,
        Some(CompositeOp::Src) => BlendMode::Source,
        Some(CompositeOp::Dst) => BlendMode::Destination,
        Some(CompositeOp::DstOver) => BlendMode::DestinationOver,
        Some(CompositeOp::SrcIn) => BlendMode::SourceIn,
        Some(CompositeOp::DstIn) => BlendMode::DestinationIn,
        Some(CompositeOp::SrcOut) => BlendMode::SourceOut,
        Some(CompositeOp::DstOut) => BlendMode::DestinationOut,
        Some(CompositeOp::SrcAtop) => BlendMode::SourceAtop,
        Some(CompositeOp::DstAtop) => BlendMode::DestinationAtop,
        Some(CompositeOp::Xor) => BlendMode::Xor,
        Some(CompositeOp::Plus) => BlendMode::Plus,
        Some(CompositeOp::Multiply) => BlendMode::Multiply,
        Some(CompositeOp::Screen) => BlendMode::Screen,
        Some(CompositeOp::Overlay) => BlendMode::Overlay,
        Some(CompositeOp::Darken) => BlendMode::Darken,
        Some(CompositeOp::Lighten) => BlendMode::Lighten,
        Some(CompositeOp::ColorDodge) => BlendMode::ColorDodge,
        Some(CompositeOp::ColorBurn) => BlendMode::ColorBurn,
        Some(CompositeOp::HardLight) => BlendMode::HardLight,
        Some(CompositeOp::SoftLight) => BlendMode::SoftLight,
        Some(CompositeOp::Difference) => BlendMode::Difference,
        Some(CompositeOp::Exclusion) => BlendMode::Exclusion,
    }
}

pub fn solid_paint(
    color: Color,
    opacity: f64,
    comp_op: Option<CompositeOp>,
    antialias: bool,
) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color(skia_color(color, opacity));
    paint.blend_mode = blend_mode(comp_op);
    paint.anti_alias = antialias;
    paint
}

/// A stroke of `width` pixels; dash lengths are scaled with the width factor.
pub fn stroke(width: f64, cap: LineCap, join: LineJoin, dasharray: &[f64], scale_factor: f64) -> Stroke {
    let mut dashes: Vec<f32> = dasharray.iter().map(|d| (d * scale_factor) as f32).collect();
    // An odd list repeats to make dash/gap pairs.
    if dashes.len() % 2 == 1 {
        dashes.extend_from_within(..);
    }
    Stroke {
        width: (width * scale_factor) as f32,
        line_cap: match cap {
            LineCap::Butt => SkLineCap::Butt,
            LineCap::Round => SkLineCap::Round,
            LineCap::Square => SkLineCap::Square,
        },
        line_join: match join {
            LineJoin::Miter => SkLineJoin::Miter,
            LineJoin::Round => SkLineJoin::Round,
            LineJoin::Bevel => SkLineJoin::Bevel,
        },
        dash: if dashes.is_empty() {
            None
        } else {
            StrokeDash::new(dashes, 0.0)
        },
        ..Stroke::default()
    }
}

fn push_ring(pb: &mut PathBuilder, points: &[Point], t: &ViewTransform, close: bool) {
    let mut iter = points.iter().map(|p| t.forward(*p));
    let Some(first) = iter.next() else { return };
    pb.move_to(first.x as f32, first.y as f32);
    for p in iter {
        pb.line_to(p.x as f32, p.y as f32);
    }
    if close {
        pb.close();
    }
}

/// Screen-space path through `points`.
pub fn polyline_path(points: &[Point], t: &ViewTransform, close: bool) -> Option<Path> {
    if points.len() < 2 {
        return None;
    }
    let mut pb = PathBuilder::new();
    push_ring(&mut pb, points, t, close);
    pb.finish()
}

/// One path holding every ring of every polygon; fill it even-odd so
/// interior rings cut holes.
pub fn polygon_path(polygons: &[&Polygon], t: &ViewTransform) -> Option<Path> {
    let mut pb = PathBuilder::new();
    for polygon in polygons {
        for ring in polygon.rings().filter(|r| r.len() >= 3) {
            push_ring(&mut pb, ring, t, true);
        }
    }
    pb.finish()
}

/// Polygons contained in a geometry, flattening multi-parts.
pub fn polygons(geometry: &Geometry) -> Vec<&Polygon> {
    geometry
        .parts()
        .into_iter()
        .flat_map(|part| match part {
            Geometry::Polygon(p) => vec![p],
            Geometry::MultiPolygon(ps) => ps.iter().collect(),
            _ => Vec::new(),
        })
        .collect()
}

/// Strokable paths of a geometry: lines open, polygon rings closed.
pub fn outlines(geometry: &Geometry) -> Vec<(&[Point], bool)> {
    let mut out: Vec<(&[Point], bool)> = Vec::new();
    for part in geometry.parts() {
        match part {
            Geometry::LineString(pts) => out.push((pts.as_slice(), false)),
            Geometry::MultiLineString(lines) => {
                out.extend(lines.iter().map(|l| (l.as_slice(), false)))
            }
            Geometry::Polygon(p) => out.extend(p.rings().map(|r| (r.as_slice(), true))),
            Geometry::MultiPolygon(ps) => {
                for p in ps {
                    out.extend(p.rings().map(|r| (r.as_slice(), true)));
                }
            }
            _ => {}
        }
    }
    out
}

/// Convert straight RGBA into a premultiplied pixmap.
pub fn pixmap_from_image(image: &ImageData) -> Option<Pixmap> {
    let size = IntSize::from_wh(image.width(), image.height())?;
    let data: Vec<u8> = image
        .data()
        .chunks_exact(4)
        .flat_map(|p| {
            let c = ColorU8::from_rgba(p[0], p[1], p[2], p[3]).premultiply();
            [c.red(), c.green(), c.blue(), c.alpha()]
        })
        .collect();
    Pixmap::from_vec(data, size)
}

/// Convert a premultiplied pixmap back to straight RGBA.
pub fn image_from_pixmap(pixmap: &Pixmap) -> Option<ImageData> {
    let data: Vec<u8> = pixmap
        .pixels()
        .iter()
        .flat_map(|p| {
            let c = p.demultiply();
            [c.red(), c.green(), c.blue(), c.alpha()]
        })
        .collect();
    ImageData::new(pixmap.width(), pixmap.height(), data)
}
