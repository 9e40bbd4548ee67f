use std::path::Path;
use std::sync::Arc;

use serde_json::Value as Json;

use cartograph_core::datasource::{Datasource, MemoryDatasource, Parameters};
use cartograph_core::error::{Error, Result};
use cartograph_core::feature::{Feature, Value};
use cartograph_core::geometry::{Geometry, Point, Polygon};

use crate::registry::read_source;

/// Bind a `type="geojson"` datasource from a `file` or `inline` parameter.
pub fn create(params: &Parameters, base: &Path) -> Result<Arc<dyn Datasource>> {
    let text = read_source(params, base)?;
    let features = parse_feature_collection(&text)?;
    Ok(Arc::new(MemoryDatasource::with_name("geojson", features)))
}

/// Parse a FeatureCollection, a single Feature or a bare geometry.
pub fn parse_feature_collection(text: &str) -> Result<Vec<Feature>> {
    let doc: Json = serde_json::from_str(text)
        .map_err(|e| Error::Datasource(format!("invalid GeoJSON: {}", e)))?;
    match doc.get("type").and_then(Json::as_str) {
        Some("FeatureCollection") => {
            let items = doc
                .get("features")
                .and_then(Json::as_array)
                .ok_or_else(|| Error::Datasource("FeatureCollection without 'features'".into()))?;
            items
                .iter()
                .enumerate()
                .map(|(i, f)| parse_feature(f, i as u64 + 1))
                .collect()
        }
        Some("Feature") => Ok(vec![parse_feature(&doc, 1)?]),
        Some(_) => Ok(vec![Feature::new(1).with_geometry(parse_geometry(&doc)?)]),
        None => Err(Error::Datasource("GeoJSON object without 'type'".into())),
    }
}

fn parse_feature(obj: &Json, fallback_id: u64) -> Result<Feature> {
    let id = obj.get("id").and_then(Json::as_u64).unwrap_or(fallback_id);
    let mut feature = Feature::new(id);
    match obj.get("geometry") {
        Some(Json::Null) | None => {}
        Some(g) => feature.geometry = Some(parse_geometry(g)?),
    }
    if let Some(props) = obj.get("properties").and_then(Json::as_object) {
        for (key, value) in props {
            feature.attributes.insert(key.clone(), json_to_value(value));
        }
    }
    Ok(feature)
}

fn json_to_value(v: &Json) -> Value {
    match v {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => match n.as_i64() {
            Some(i) => Value::Integer(i),
            None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        Json::String(s) => Value::String(s.clone()),
        other => Value::String(other.to_string()),
    }
}

pub fn parse_geometry(g: &Json) -> Result<Geometry> {
    let kind = g
        .get("type")
        .and_then(Json::as_str)
        .ok_or_else(|| Error::Datasource("geometry without 'type'".into()))?;
    if kind == "GeometryCollection" {
        let members = g
            .get("geometries")
            .and_then(Json::as_array)
            .ok_or_else(|| Error::Datasource("GeometryCollection without 'geometries'".into()))?;
        return Ok(Geometry::Collection(
            members.iter().map(parse_geometry).collect::<Result<_>>()?,
        ));
    }
    let coords = g
        .get("coordinates")
        .ok_or_else(|| Error::Datasource(format!("{} without 'coordinates'", kind)))?;
    let geometry = match kind {
        "Point" => Geometry::Point(position(coords)?),
        "MultiPoint" => Geometry::MultiPoint(positions(coords)?),
        "LineString" => Geometry::LineString(positions(coords)?),
        "MultiLineString" => Geometry::MultiLineString(
            array(coords)?.iter().map(positions).collect::<Result<_>>()?,
        ),
        "Polygon" => Geometry::Polygon(polygon(coords)?),
        "MultiPolygon" => Geometry::MultiPolygon(
            array(coords)?.iter().map(polygon).collect::<Result<_>>()?,
        ),
        other => {
            return Err(Error::Datasource(format!(
                "unsupported geometry type '{}'",
                other
            )))
        }
    };
    Ok(geometry)
}

fn array(v: &Json) -> Result<&Vec<Json>> {
    v.as_array()
        .ok_or_else(|| Error::Datasource(format!("expected an array, found {}", v)))
}

fn position(v: &Json) -> Result<Point> {
    let a = array(v)?;
    match (a.first().and_then(Json::as_f64), a.get(1).and_then(Json::as_f64)) {
        (Some(x), Some(y)) => Ok(Point::new(x, y)),
        _ => Err(Error::Datasource(format!("invalid position {}", v))),
    }
}

fn positions(v: &Json) -> Result<Vec<Point>> {
    array(v)?.iter().map(position).collect()
}

fn polygon(v: &Json) -> Result<Polygon> {
    let mut rings: Vec<Vec<Point>> = array(v)?.iter().map(positions).collect::<Result<_>>()?;
    if rings.is_empty() {
        return Err(Error::Datasource("polygon without rings".into()));
    }
    let exterior = rings.remove(0);
    Ok(Polygon::new(exterior, rings))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cartograph_core::datasource::Query;
    use cartograph_core::geometry::BBox;

    const SAMPLE: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature", "id": 7,
             "geometry": {"type": "Point", "coordinates": [1.0, 2.0]},
             "properties": {"name": "a", "pop": 1200, "area": 3.5, "capital": true}},
            {"type": "Feature",
             "geometry": {"type": "Polygon", "coordinates": [[[0,0],[4,0],[4,4],[0,4],[0,0]]]},
             "properties": {"tags": ["x", "y"]}},
            {"type": "Feature", "geometry": null, "properties": {}}
        ]
    }"#;

    #[test]
    fn test_parse_collection() {
        let features = parse_feature_collection(SAMPLE).unwrap();
        assert_eq!(features.len(), 3);
        assert_eq!(features[0].id, 7);
        assert_eq!(features[1].id, 2);
        assert_eq!(features[0].get("pop"), Some(&Value::Integer(1200)));
        assert_eq!(features[0].get("area"), Some(&Value::Float(3.5)));
        assert_eq!(features[0].get("capital"), Some(&Value::Bool(true)));
        assert_eq!(
            features[1].get("tags"),
            Some(&Value::String("[\"x\",\"y\"]".to_string()))
        );
        assert!(features[2].geometry.is_none());
    }

    #[test]
    fn test_inline_datasource() {
        let params = Parameters::new()
            .with("type", "geojson")
            .with("inline", SAMPLE);
        let ds = create(&params, Path::new(".")).unwrap();
        assert_eq!(ds.name(), "geojson");
        assert_eq!(ds.envelope(), Some(BBox::from_coords(0.0, 0.0, 4.0, 4.0)));
        let hits = ds
            .features(&Query::new(BBox::from_coords(0.5, 1.5, 1.5, 2.5)))
            .unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn test_bare_geometry_and_errors() {
        let f = parse_feature_collection(r#"{"type":"LineString","coordinates":[[0,0],[1,1]]}"#)
            .unwrap();
        assert_eq!(f.len(), 1);
        assert!(parse_feature_collection("{").is_err());
        assert!(parse_feature_collection(r#"{"type":"Point","coordinates":[1]}"#).is_err());
        assert!(parse_feature_collection(r#"{"features":[]}"#).is_err());
    }
}
