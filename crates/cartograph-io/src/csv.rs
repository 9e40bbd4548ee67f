//! Delimited-text datasource.
//!
//! Geometry comes from a `wkt` or `geojson` column, or from a pair of
//! coordinate columns (`x`/`y`, `lon`/`lat`, `longitude`/`latitude` ...).
//! Every other column becomes an attribute with its type inferred.

use std::path::Path;
use std::sync::Arc;

use cartograph_core::datasource::{Datasource, MemoryDatasource, Parameters};
use cartograph_core::error::{Error, Result};
use cartograph_core::feature::{Feature, Value};
use cartograph_core::geometry::{Geometry, Point};

use crate::registry::read_source;

const X_NAMES: &[&str] = &["x", "lon", "lng", "long", "longitude", "easting"];
const Y_NAMES: &[&str] = &["y", "lat", "latitude", "northing"];

pub fn create(params: &Parameters, base: &Path) -> Result<Arc<dyn Datasource>> {
    let text = read_source(params, base)?;
    let separator = match params.get("separator") {
        Some("\\t") => Some('\t'),
        Some(s) => s.chars().next(),
        None => None,
    };
    let quote = params.get("quote").and_then(|q| q.chars().next()).unwrap_or('"');
    let features = parse_csv(&text, separator, quote)?;
    Ok(Arc::new(MemoryDatasource::with_name("csv", features)))
}

#[derive(Clone, Copy)]
enum GeometrySource {
    Wkt(usize),
    GeoJson(usize),
    Coords(usize, usize),
}

/// Parse delimited text into features. Without an explicit separator the
/// header line decides between `,`, tab, `|` and `;`.
pub fn parse_csv(text: &str, separator: Option<char>, quote: char) -> Result<Vec<Feature>> {
    let text = text.trim_start_matches('\u{feff}');
    let header_line = text.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    let separator = separator.unwrap_or_else(|| detect_separator(header_line));
    let mut records = split_records(text, separator, quote).into_iter();

    let headers: Vec<String> = records
        .next()
        .ok_or_else(|| Error::Datasource("CSV input has no header line".into()))?
        .into_iter()
        .map(|h| h.trim().to_string())
        .collect();
    let lower: Vec<String> = headers.iter().map(|h| h.to_ascii_lowercase()).collect();
    let find = |names: &[&str]| lower.iter().position(|h| names.contains(&h.as_str()));

    let source = if let Some(i) = find(&["wkt", "geometry"]) {
        GeometrySource::Wkt(i)
    } else if let Some(i) = find(&["geojson"]) {
        GeometrySource::GeoJson(i)
    } else {
        match (find(X_NAMES), find(Y_NAMES)) {
            (Some(x), Some(y)) => GeometrySource::Coords(x, y),
            _ => {
                return Err(Error::Datasource(format!(
                    "CSV header has no geometry column: {}",
                    headers.join(",")
                )))
            }
        }
    };

    let mut features = Vec::new();
    for (line, record) in records.enumerate() {
        if record.iter().all(|f| f.trim().is_empty()) {
            continue;
        }
        let field = |i: usize| record.get(i).map(|s| s.trim()).unwrap_or("");
        let geometry = match source {
            GeometrySource::Wkt(i) => crate::wkt::parse_wkt(field(i)),
            GeometrySource::GeoJson(i) => serde_json::from_str::<serde_json::Value>(field(i))
                .map_err(|e| Error::Datasource(e.to_string()))
                .and_then(|g| crate::geojson::parse_geometry(&g)),
            GeometrySource::Coords(x, y) => match (field(x).parse::<f64>(), field(y).parse::<f64>()) {
                (Ok(x), Ok(y)) => Ok(Geometry::Point(Point::new(x, y))),
                _ => Err(Error::Datasource(format!(
                    "invalid coordinates '{}', '{}'",
                    field(x),
                    field(y)
                ))),
            },
        };
        let geometry = match geometry {
            Ok(g) => g,
            Err(e) => {
                log::warn!("Skipping CSV record {}: {}", line + 2, e);
                continue;
            }
        };

        let mut feature = Feature::new(features.len() as u64 + 1).with_geometry(geometry);
        for (i, name) in headers.iter().enumerate() {
            let is_geometry = match source {
                GeometrySource::Wkt(g) | GeometrySource::GeoJson(g) => g == i,
                GeometrySource::Coords(_, _) => false,
            };
            if is_geometry || name.is_empty() {
                continue;
            }
            let raw = field(i);
            let value = if raw.is_empty() {
                Value::String(String::new())
            } else {
                Value::infer(raw)
            };
            feature.attributes.insert(name.clone(), value);
        }
        features.push(feature);
    }
    Ok(features)
}

fn detect_separator(header: &str) -> char {
    [',', '\t', '|', ';']
        .into_iter()
        .max_by_key(|c| header.matches(*c).count())
        .filter(|c| header.contains(*c))
        .unwrap_or(',')
}

/// Split text into records of fields, honouring quoted fields that contain
/// separators, doubled quotes or newlines.
fn split_records(text: &str, separator: char, quote: char) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == quote {
                if chars.peek() == Some(&quote) {
                    field.push(quote);
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                field.push(c);
            }
        } else if c == quote {
            in_quotes = true;
        } else if c == separator {
            record.push(std::mem::take(&mut field));
        } else if c == '\n' || c == '\r' {
            if c == '\r' && chars.peek() == Some(&'\n') {
                chars.next();
            }
            record.push(std::mem::take(&mut field));
            records.push(std::mem::take(&mut record));
        } else {
            field.push(c);
        }
    }
    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinate_columns() {
        let text = "name,Longitude,Latitude,pop\nOslo,10.75,59.91,700000\nBergen,5.32,60.39,\n";
        let features = parse_csv(text, None, '"').unwrap();
        assert_eq!(features.len(), 2);
        assert_eq!(features[0].id, 1);
        assert_eq!(features[0].geometry, Some(Geometry::Point(Point::new(10.75, 59.91))));
        assert_eq!(features[0].get("pop"), Some(&Value::Integer(700_000)));
        assert_eq!(features[1].get("pop"), Some(&Value::String(String::new())));
        assert_eq!(features[0].get("Longitude"), Some(&Value::Float(10.75)));
    }

    #[test]
    fn test_wkt_column_with_quotes() {
        let text = "id|wkt|label\n1|\"LINESTRING (0 0, 1 1)\"|\"say \"\"hi\"\"\"\n";
        let features = parse_csv(text, None, '"').unwrap();
        assert_eq!(features.len(), 1);
        assert!(matches!(features[0].geometry, Some(Geometry::LineString(_))));
        assert_eq!(features[0].get("label"), Some(&Value::String("say \"hi\"".into())));
        assert!(features[0].get("wkt").is_none());
    }

    #[test]
    fn test_quoted_separator_and_bad_rows() {
        let text = "x,y,desc\r\n1,2,\"a, b\"\r\nnope,3,c\r\n\r\n4,5,d";
        let features = parse_csv(text, Some(','), '"').unwrap();
        assert_eq!(features.len(), 2);
        assert_eq!(features[0].get("desc"), Some(&Value::String("a, b".into())));
        assert_eq!(features[1].geometry, Some(Geometry::Point(Point::new(4.0, 5.0))));
    }

    #[test]
    fn test_missing_geometry_columns() {
        assert!(parse_csv("a,b\n1,2\n", None, '"').is_err());
        assert!(parse_csv("", None, '"').is_err());
    }

    #[test]
    fn test_detect_separator() {
        assert_eq!(detect_separator("a;b;c"), ';');
        assert_eq!(detect_separator("a\tb"), '\t');
        assert_eq!(detect_separator("single"), ',');
    }
}
