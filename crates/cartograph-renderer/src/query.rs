//! Feature lookup at a map or screen position.

use cartograph_core::datasource::Query;
use cartograph_core::feature::Feature;
use cartograph_core::geometry::{BBox, Geometry, Point, Polygon};
use cartograph_core::map::Map;
use cartograph_core::projection::ProjTransform;

use crate::error::{RenderError, Result};
use crate::renderer::{view_transform, RenderOptions};

/// Hit tolerance in pixels around the queried position.
pub const QUERY_TOLERANCE_PX: f64 = 3.0;

/// Features of the layer at `layer_index` under a point given in the map's
/// reference system, in datasource order.
pub fn query_point(map: &Map, layer_index: usize, x: f64, y: f64) -> Result<Vec<Feature>> {
    let layer = map
        .layers()
        .get(layer_index)
        .ok_or_else(|| RenderError::LayerNotFound(layer_index.to_string()))?;
    let Some(datasource) = layer.datasource() else {
        return Ok(Vec::new());
    };
    let transform = ProjTransform::new(layer.projection()?, map.projection()?);
    let p = Point::new(x, y);
    let tolerance = map.scale() * QUERY_TOLERANCE_PX;
    let window = BBox::new(p, p).pad(tolerance);

    let features = datasource.features(&Query::new(transform.backward_bbox(&window)))?;
    let hits: Vec<Feature> = features
        .into_iter()
        .filter(|f| {
            let on_raster = f
                .raster
                .as_ref()
                .is_some_and(|r| transform.forward_bbox(&r.extent).contains_point(&p));
            on_raster
                || f.geometry
                    .as_ref()
                    .is_some_and(|g| hit_test(&transform.forward_geometry(g), &p, tolerance))
        })
        .collect();
    log::debug!("Query at ({}, {}) on '{}': {} hits", x, y, layer.name, hits.len());
    Ok(hits)
}

/// Like [`query_point`], with the position in canvas pixels.
pub fn query_map_point(map: &Map, layer_index: usize, px: f64, py: f64) -> Result<Vec<Feature>> {
    let t = view_transform(map, map.width, map.height, &RenderOptions::default())?;
    let p = t.backward(px, py);
    query_point(map, layer_index, p.x, p.y)
}

/// Whether `p` lies on `geometry`, within `tolerance` for points and lines.
pub fn hit_test(geometry: &Geometry, p: &Point, tolerance: f64) -> bool {
    let near_line = |pts: &[Point]| match pts {
        [] => false,
        [only] => only.distance_to(p) <= tolerance,
        _ => pts.windows(2).any(|w| segment_distance(p, &w[0], &w[1]) <= tolerance),
    };
    match geometry {
        Geometry::Point(q) => q.distance_to(p) <= tolerance,
        Geometry::MultiPoint(pts) => pts.iter().any(|q| q.distance_to(p) <= tolerance),
        Geometry::LineString(pts) => near_line(pts),
        Geometry::MultiLineString(lines) => lines.iter().any(|l| near_line(l)),
        Geometry::Polygon(poly) => polygon_contains(poly, p),
        Geometry::MultiPolygon(polys) => polys.iter().any(|poly| polygon_contains(poly, p)),
        Geometry::Collection(parts) => parts.iter().any(|g| hit_test(g, p, tolerance)),
    }
}

fn polygon_contains(poly: &Polygon, p: &Point) -> bool {
    ring_contains(&poly.exterior, p) && !poly.interiors.iter().any(|hole| ring_contains(hole, p))
}

/// Even-odd ray casting.
fn ring_contains(ring: &[Point], p: &Point) -> bool {
    let mut inside = false;
    let n = ring.len();
    for i in 0..n {
        let a = ring[i];
        let b = ring[(i + 1) % n];
        if (a.y > p.y) != (b.y > p.y) && p.x < (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x {
            inside = !inside;
        }
    }
    inside
}

fn segment_distance(p: &Point, a: &Point, b: &Point) -> f64 {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let len2 = dx * dx + dy * dy;
    if len2 == 0.0 {
        return p.distance_to(a);
    }
    let t = (((p.x - a.x) * dx + (p.y - a.y) * dy) / len2).clamp(0.0, 1.0);
    p.distance_to(&Point::new(a.x + t * dx, a.y + t * dy))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use cartograph_core::datasource::MemoryDatasource;
    use cartograph_core::layer::Layer;

    fn donut() -> Geometry {
        Geometry::Polygon(Polygon::new(
            vec![
                Point::new(0.0, 0.0),
                Point::new(10.0, 0.0),
                Point::new(10.0, 10.0),
                Point::new(0.0, 10.0),
            ],
            vec![vec![
                Point::new(4.0, 4.0),
                Point::new(6.0, 4.0),
                Point::new(6.0, 6.0),
                Point::new(4.0, 6.0),
            ]],
        ))
    }

    #[test]
    fn test_hit_test() {
        assert!(hit_test(&donut(), &Point::new(1.0, 1.0), 0.0));
        assert!(!hit_test(&donut(), &Point::new(5.0, 5.0), 0.0));
        assert!(!hit_test(&donut(), &Point::new(11.0, 5.0), 0.0));
        let line = Geometry::LineString(vec![Point::new(0.0, 0.0), Point::new(10.0, 0.0)]);
        assert!(hit_test(&line, &Point::new(5.0, 0.5), 1.0));
        assert!(!hit_test(&line, &Point::new(5.0, 2.0), 1.0));
    }

    #[test]
    fn test_query_layer() {
        let mut map = Map::new(100, 100);
        map.add_layer(Layer::new("shapes").with_datasource(Arc::new(MemoryDatasource::new(vec![
            Feature::new(1).with_geometry(donut()),
            Feature::new(2).with_geometry(Geometry::Point(Point::new(20.0, 20.0))),
        ]))));
        map.add_layer(Layer::new("empty"));
        map.zoom_to_box(BBox::from_coords(0.0, 0.0, 100.0, 100.0));

        let ids = |v: Vec<Feature>| v.into_iter().map(|f| f.id).collect::<Vec<_>>();
        assert_eq!(ids(query_point(&map, 0, 2.0, 2.0).unwrap()), vec![1]);
        assert_eq!(ids(query_point(&map, 0, 21.0, 21.0).unwrap()), vec![2]);
        assert!(query_point(&map, 0, 5.0, 5.0).unwrap().is_empty());
        // Pixel (20, 80) is world (20, 20).
        assert_eq!(ids(query_map_point(&map, 0, 20.0, 80.0).unwrap()), vec![2]);
        assert!(query_point(&map, 1, 0.0, 0.0).unwrap().is_empty());
        assert!(matches!(query_point(&map, 5, 0.0, 0.0), Err(RenderError::LayerNotFound(_))));
    }
}
