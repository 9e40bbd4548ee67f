//! UTFGrid interactivity grids.
//!
//! A grid is a coarse raster of feature keys: each cell holds one
//! character of a row string, whose codepoint encodes an index into
//! `keys`. Index 0 (the empty key) marks cells no feature covers.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use tiny_skia::{FillRule, Mask, PathBuilder, Rect, Transform};

use cartograph_core::feature::{Feature, Value};
use cartograph_core::geometry::Geometry;
use cartograph_core::map::Map;
use cartograph_core::symbolizer::{LineCap, LineJoin, Symbolizer};

use crate::canvas::{outlines, polygon_path, polygons, polyline_path, stroke};
use crate::error::{RenderError, Result};
use crate::renderer::{layer_features, view_transform, ProjectedFeature, RenderOptions};
use crate::transform::ViewTransform;

/// Attribute name that selects the feature id as the grid key.
pub const FEATURE_ID_KEY: &str = "__id__";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridOptions {
    /// Canvas pixels per grid cell.
    pub resolution: u32,
    /// Attribute whose value identifies features.
    pub key: String,
    /// Attributes copied into the grid's data table.
    pub fields: Vec<String>,
}

impl Default for GridOptions {
    fn default() -> Self {
        Self {
            resolution: 4,
            key: FEATURE_ID_KEY.to_string(),
            fields: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UtfGrid {
    pub grid: Vec<String>,
    pub keys: Vec<String>,
    pub data: BTreeMap<String, BTreeMap<String, Json>>,
}

impl UtfGrid {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Key of the feature covering a grid cell, if any.
    pub fn key_at(&self, col: usize, row: usize) -> Option<&str> {
        let c = self.grid.get(row)?.chars().nth(col)?;
        let index = decode_id(c)?;
        match self.keys.get(index)?.as_str() {
            "" => None,
            key => Some(key),
        }
    }
}

/// Codepoint for key index `i`, skipping `"` and `\`.
///
/// `None` when the codepoint would be a surrogate or past `char::MAX`.
pub fn encode_id(i: usize) -> Option<char> {
    let mut c = u32::try_from(i).ok()?.checked_add(32)?;
    if c >= 34 {
        c += 1;
    }
    if c >= 92 {
        c = c.checked_add(1)?;
    }
    char::from_u32(c)
}

pub fn decode_id(c: char) -> Option<usize> {
    let mut c = c as u32;
    if c < 32 || c == 34 || c == 92 {
        return None;
    }
    if c >= 93 {
        c -= 1;
    }
    if c >= 35 {
        c -= 1;
    }
    Some((c - 32) as usize)
}

/// Render the UTFGrid of one layer. Later features overwrite earlier ones.
pub fn render_grid(map: &Map, layer_name: &str, options: &GridOptions) -> Result<UtfGrid> {
    let layer = map
        .get_layer(layer_name)
        .ok_or_else(|| RenderError::LayerNotFound(layer_name.to_string()))?;
    let resolution = options.resolution.max(1);
    let cols = map.width.div_ceil(resolution);
    let rows = map.height.div_ceil(resolution);
    let render_options = RenderOptions::default();
    let transform = view_transform(map, cols, rows, &render_options)?;
    let scale_denominator = map.scale_denominator();

    let mut cells = vec![0usize; cols as usize * rows as usize];
    let mut keys: Vec<String> = vec![String::new()];
    let mut key_index: HashMap<String, usize> = HashMap::new();
    let mut data = BTreeMap::new();

    let features = if layer.visible(scale_denominator) {
        layer_features(map, layer, map.projection()?, scale_denominator)?.unwrap_or_default()
    } else {
        Vec::new()
    };
    for pf in &features {
        let symbolizers: Vec<&Symbolizer> = layer
            .styles
            .iter()
            .filter_map(|name| map.find_style(name))
            .flat_map(|style| style.matching_rules(&pf.feature, scale_denominator))
            .flat_map(|rule| rule.symbolizers.iter())
            .collect();
        if symbolizers.is_empty() {
            continue;
        }
        let Some(key) = feature_key(&pf.feature, &options.key) else {
            continue;
        };
        let Some(mask) = coverage(pf, &symbolizers, &transform, resolution as f64, cols, rows) else {
            continue;
        };

        let index = *key_index.entry(key.clone()).or_insert_with(|| {
            keys.push(key.clone());
            keys.len() - 1
        });
        for (cell, covered) in cells.iter_mut().zip(mask.data()) {
            if *covered > 0 {
                *cell = index;
            }
        }
        if !options.fields.is_empty() {
            let row: BTreeMap<String, Json> = options
                .fields
                .iter()
                .filter_map(|f| pf.feature.get(f).map(|v| (f.clone(), to_json(v))))
                .collect();
            data.insert(key, row);
        }
    }

    // Keep only keys still visible after overdraw, renumbered by first use.
    let mut used: Vec<usize> = Vec::new();
    let mut remap = vec![0usize; keys.len()];
    for &cell in &cells {
        if cell != 0 && remap[cell] == 0 {
            used.push(cell);
            remap[cell] = used.len();
        }
    }
    let grid = cells
        .chunks(cols as usize)
        .map(|row| {
            row.iter()
                .map(|&c| encode_id(remap[c]).ok_or_else(|| RenderError::TooManyGridKeys(used.len())))
                .collect::<Result<String>>()
        })
        .collect::<Result<Vec<_>>>()?;
    let mut final_keys = vec![String::new()];
    final_keys.extend(used.iter().map(|&i| keys[i].clone()));
    data.retain(|k, _| final_keys.contains(k));

    log::debug!(
        "UTFGrid for '{}': {}x{} cells, {} keys",
        layer_name,
        cols,
        rows,
        final_keys.len() - 1
    );
    Ok(UtfGrid {
        grid,
        keys: final_keys,
        data,
    })
}

fn feature_key(feature: &Feature, key: &str) -> Option<String> {
    if key == FEATURE_ID_KEY {
        return Some(feature.id.to_string());
    }
    match feature.get(key) {
        None | Some(Value::Null) => None,
        Some(v) => Some(v.to_string()),
    }
}

fn to_json(value: &Value) -> Json {
    match value {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Integer(i) => Json::from(*i),
        Value::Float(f) => serde_json::Number::from_f64(*f).map_or(Json::Null, Json::Number),
        Value::String(s) => Json::String(s.clone()),
    }
}

/// Cells covered by what the symbolizers would draw for a feature.
fn coverage(
    pf: &ProjectedFeature,
    symbolizers: &[&Symbolizer],
    t: &ViewTransform,
    resolution: f64,
    cols: u32,
    rows: u32,
) -> Option<Mask> {
    let mut mask = Mask::new(cols, rows)?;
    let mut painted = false;
    for symbolizer in symbolizers {
        let (geometry, extent) = match (&pf.geometry, pf.raster_extent) {
            (_, Some(extent)) if matches!(symbolizer, Symbolizer::Raster(_)) => (None, Some(extent)),
            (Some(g), _) => (Some(g), None),
            _ => continue,
        };
        if let Some(extent) = extent {
            let (left, top, w, h) = t.forward_box(&extent);
            if let Some(rect) = Rect::from_xywh(left as f32, top as f32, w as f32, h as f32) {
                mask.fill_path(&PathBuilder::from_rect(rect), FillRule::Winding, false, Transform::identity());
                painted = true;
            }
            continue;
        }
        let Some(g) = geometry else { continue };
        painted |= match symbolizer {
            Symbolizer::Polygon(_) | Symbolizer::PolygonPattern(_) => fill_polygons(&mut mask, g, t),
            Symbolizer::Line(s) => stroke_lines(&mut mask, g, t, s.stroke_width / resolution),
            Symbolizer::Point(_) => mark_anchors(&mut mask, g, t, 4.0 / resolution),
            Symbolizer::Markers(s) => mark_anchors(&mut mask, g, t, s.width.max(s.height) / resolution),
            Symbolizer::Text(s) => mark_anchors(&mut mask, g, t, s.size / resolution),
            Symbolizer::Raster(_) => false,
        };
    }
    painted.then_some(mask)
}

fn fill_polygons(mask: &mut Mask, g: &Geometry, t: &ViewTransform) -> bool {
    match polygon_path(&polygons(g), t) {
        Some(path) => {
            mask.fill_path(&path, FillRule::EvenOdd, false, Transform::identity());
            true
        }
        None => false,
    }
}

fn stroke_lines(mask: &mut Mask, g: &Geometry, t: &ViewTransform, width: f64) -> bool {
    let pen = stroke(width.max(1.0), LineCap::Butt, LineJoin::Miter, &[], 1.0);
    let mut painted = false;
    for (points, closed) in outlines(g) {
        let outline = polyline_path(points, t, closed).and_then(|p| p.stroke(&pen, 1.0));
        if let Some(outline) = outline {
            mask.fill_path(&outline, FillRule::Winding, false, Transform::identity());
            painted = true;
        }
    }
    painted
}

fn mark_anchors(mask: &mut Mask, g: &Geometry, t: &ViewTransform, size: f64) -> bool {
    let size = size.max(1.0) as f32;
    let mut painted = false;
    for (anchor, _) in g.anchors() {
        let c = t.forward(anchor);
        let rect = Rect::from_xywh(c.x as f32 - size / 2.0, c.y as f32 - size / 2.0, size, size);
        if let Some(rect) = rect {
            mask.fill_path(&PathBuilder::from_rect(rect), FillRule::Winding, false, Transform::identity());
            painted = true;
        }
    }
    painted
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use cartograph_core::datasource::MemoryDatasource;
    use cartograph_core::geometry::{BBox, Point, Polygon};
    use cartograph_core::layer::Layer;
    use cartograph_core::style::{Rule, Style};
    use cartograph_core::symbolizer::PolygonSymbolizer;

    fn square(x0: f64, x1: f64) -> Geometry {
        Geometry::Polygon(Polygon::new(
            vec![
                Point::new(x0, 0.0),
                Point::new(x1, 0.0),
                Point::new(x1, 10.0),
                Point::new(x0, 10.0),
            ],
            Vec::new(),
        ))
    }

    fn grid_map(features: Vec<Feature>) -> Map {
        let mut map = Map::new(16, 16);
        map.add_style(Style::new("fill").with_rule(
            Rule::new("r").with_symbolizer(Symbolizer::Polygon(PolygonSymbolizer::default())),
        ));
        map.add_layer(
            Layer::new("parcels")
                .with_style("fill")
                .with_datasource(Arc::new(MemoryDatasource::new(features))),
        );
        map.zoom_to_box(BBox::from_coords(0.0, 0.0, 10.0, 10.0));
        map
    }

    #[test]
    fn test_codepoints_skip_quote_and_backslash() {
        assert_eq!(encode_id(0), Some(' '));
        assert_eq!(encode_id(1), Some('!'));
        assert_eq!(encode_id(2), Some('#'));
        assert_eq!(encode_id(58), Some('['));
        assert_eq!(encode_id(59), Some(']'));
        for i in 0..200 {
            let c = encode_id(i).unwrap();
            assert!(c != '"' && c != '\\');
            assert_eq!(decode_id(c), Some(i));
        }
    }

    #[test]
    fn test_codepoints_stop_before_surrogates() {
        assert_eq!(encode_id(55261), Some('\u{D7FF}'));
        assert_eq!(decode_id('\u{D7FF}'), Some(55261));
        assert_eq!(encode_id(55262), None);
        assert_eq!(encode_id(usize::MAX), None);
        let ids: Vec<char> = (0..20_000).filter_map(encode_id).collect();
        let mut unique = ids.clone();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(unique.len(), 20_000);
    }

    #[test]
    fn test_grid_covers_features() {
        let map = grid_map(vec![
            Feature::new(7)
                .with_geometry(square(0.0, 5.0))
                .with_attribute("name", "west"),
            Feature::new(9).with_geometry(square(5.0, 10.0)),
        ]);
        let options = GridOptions {
            fields: vec!["name".to_string()],
            ..Default::default()
        };
        let grid = render_grid(&map, "parcels", &options).unwrap();
        assert_eq!(grid.grid.len(), 4);
        assert_eq!(grid.grid[0], "!!##");
        assert_eq!(grid.keys, vec!["", "7", "9"]);
        assert_eq!(grid.key_at(0, 3), Some("7"));
        assert_eq!(grid.data["7"]["name"], Json::String("west".to_string()));
        assert!(grid.data["9"].is_empty());
        let json: Json = serde_json::from_str(&grid.to_json().unwrap()).unwrap();
        assert!(json["grid"].is_array() && json["keys"].is_array() && json["data"].is_object());
    }

    #[test]
    fn test_overdrawn_keys_are_dropped() {
        let map = grid_map(vec![
            Feature::new(1).with_geometry(square(0.0, 10.0)),
            Feature::new(2).with_geometry(square(0.0, 10.0)),
        ]);
        let grid = render_grid(&map, "parcels", &GridOptions::default()).unwrap();
        assert_eq!(grid.keys, vec!["", "2"]);
        assert!(grid.grid.iter().all(|row| row == "!!!!"));
    }

    #[test]
    fn test_unknown_layer() {
        let map = grid_map(Vec::new());
        assert!(matches!(
            render_grid(&map, "roads", &GridOptions::default()),
            Err(RenderError::LayerNotFound(_))
        ));
        let grid = render_grid(&map, "parcels", &GridOptions::default()).unwrap();
        assert_eq!(grid.keys, vec![""]);
        assert_eq!(grid.key_at(0, 0), None);
    }
}
