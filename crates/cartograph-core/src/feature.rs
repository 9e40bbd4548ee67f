use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::geometry::{BBox, Geometry};

/// An attribute value carried by a feature or produced by an expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Integer(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::String(s) => !s.is_empty(),
        }
    }

    /// Compare two values. Numbers compare numerically, strings
    /// lexicographically; mixed kinds are unordered except that `Null`
    /// only equals `Null`.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, Value::Null) => Some(Ordering::Equal),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x.partial_cmp(&y),
                _ => None,
            },
        }
    }

    /// Convert a raw text value into the narrowest matching kind.
    pub fn infer(raw: &str) -> Value {
        if let Ok(i) = raw.parse::<i64>() {
            Value::Integer(i)
        } else if let Ok(f) = raw.parse::<f64>() {
            Value::Float(f)
        } else {
            match raw {
                "true" => Value::Bool(true),
                "false" => Value::Bool(false),
                _ => Value::String(raw.to_string()),
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::String(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// A straight-alpha RGBA8 pixel buffer, row-major, top row first.
///
/// The buffer always holds exactly `width * height` pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawImage")]
pub struct ImageData {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

#[derive(Deserialize)]
struct RawImage {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl TryFrom<RawImage> for ImageData {
    type Error = String;

    fn try_from(raw: RawImage) -> Result<Self, Self::Error> {
        let (w, h, len) = (raw.width, raw.height, raw.data.len());
        ImageData::new(raw.width, raw.height, raw.data)
            .ok_or_else(|| format!("{}x{} image needs {} bytes, got {}", w, h, w as usize * h as usize * 4, len))
    }
}

impl ImageData {
    /// Returns `None` when `data` does not hold `width * height` pixels.
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        if data.len() != width as usize * height as usize * 4 {
            return None;
        }
        Some(Self {
            width,
            height,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// RGBA bytes, four per pixel.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y as usize * self.width as usize + x as usize) * 4;
        Some([self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3]])
    }
}

/// Georeferenced raster payload of a feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RasterData {
    pub extent: BBox,
    pub image: ImageData,
}

/// A single feature returned by a datasource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub id: u64,
    pub attributes: BTreeMap<String, Value>,
    pub geometry: Option<Geometry>,
    pub raster: Option<RasterData>,
}

impl Feature {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            attributes: BTreeMap::new(),
            geometry: None,
            raster: None,
        }
    }

    pub fn with_geometry(mut self, geometry: Geometry) -> Self {
        self.geometry = Some(geometry);
        self
    }

    pub fn with_attribute(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.to_string(), value.into());
        self
    }

    pub fn with_raster(mut self, raster: RasterData) -> Self {
        self.raster = Some(raster);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    pub fn bbox(&self) -> Option<BBox> {
        match (&self.geometry, &self.raster) {
            (Some(g), Some(r)) => g.bbox().map(|b| b.union(&r.extent)).or(Some(r.extent)),
            (Some(g), None) => g.bbox(),
            (None, Some(r)) => Some(r.extent),
            (None, None) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_compare_mixed_numbers() {
        assert_eq!(
            Value::Integer(3).compare(&Value::Float(3.0)),
            Some(Ordering::Equal)
        );
        assert_eq!(
            Value::Float(2.5).compare(&Value::Integer(3)),
            Some(Ordering::Less)
        );
        assert_eq!(Value::from("a").compare(&Value::Integer(1)), None);
        assert_eq!(Value::Null.compare(&Value::Integer(0)), None);
    }

    #[test]
    fn test_value_infer() {
        assert_eq!(Value::infer("42"), Value::Integer(42));
        assert_eq!(Value::infer("4.5"), Value::Float(4.5));
        assert_eq!(Value::infer("true"), Value::Bool(true));
        assert_eq!(Value::infer("Oslo"), Value::from("Oslo"));
    }

    #[test]
    fn test_image_data_rejects_bad_length() {
        assert!(ImageData::new(2, 2, vec![0; 15]).is_none());
        let img = ImageData::new(1, 1, vec![1, 2, 3, 4]).unwrap();
        assert_eq!(img.pixel(0, 0), Some([1, 2, 3, 4]));
        assert_eq!(img.pixel(1, 0), None);
        assert_eq!((img.width(), img.height(), img.data()), (1, 1, &[1u8, 2, 3, 4][..]));
    }

    #[test]
    fn test_image_data_deserialize_checks_length() {
        let ok: ImageData = serde_json::from_str(r#"{"width":1,"height":1,"data":[9,8,7,6]}"#).unwrap();
        assert_eq!(ok.pixel(0, 0), Some([9, 8, 7, 6]));
        let short = serde_json::from_str::<ImageData>(r#"{"width":2,"height":1,"data":[9,8,7,6]}"#);
        assert!(short.is_err());
    }
}
