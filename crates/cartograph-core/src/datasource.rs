use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::feature::Feature;
use crate::geometry::{BBox, GeometryType, Point};
use crate::spatial::{SpatialEntry, SpatialIndex};

/// Key/value parameters describing a datasource, as written in a stylesheet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameters(BTreeMap<String, String>);

impl Parameters {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn insert(&mut self, key: &str, value: &str) {
        self.0.insert(key.to_string(), value.to_string());
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Parse a parameter, returning `Ok(None)` when it is absent.
    pub fn get_parsed<T: FromStr>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key) {
            None => Ok(None),
            Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|_| {
                Error::Datasource(format!("invalid value '{}' for parameter '{}'", raw, key))
            }),
        }
    }

    /// Overlay `other` on top of `self`; keys in `other` win.
    pub fn merged(&self, other: &Parameters) -> Parameters {
        let mut out = self.clone();
        for (k, v) in &other.0 {
            out.0.insert(k.clone(), v.clone());
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DatasourceKind {
    Vector,
    Raster,
}

/// A spatial query against a datasource.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    /// Query box in the datasource's own spatial reference.
    pub bbox: BBox,
    /// Map units per pixel along x and y.
    pub resolution: (f64, f64),
    pub scale_denominator: f64,
}

impl Query {
    pub fn new(bbox: BBox) -> Self {
        Self {
            bbox,
            resolution: (1.0, 1.0),
            scale_denominator: 0.0,
        }
    }
}

/// A source of features for a layer.
///
/// Implementations are bound once (for example when a stylesheet is loaded)
/// and then queried read-only by the renderers.
pub trait Datasource: fmt::Debug + Send + Sync {
    /// Plugin type name, e.g. `"geojson"`.
    fn name(&self) -> &str;

    fn kind(&self) -> DatasourceKind;

    /// Full extent of the data, if known.
    fn envelope(&self) -> Option<BBox>;

    fn geometry_type(&self) -> Option<GeometryType>;

    /// Features intersecting the query box.
    fn features(&self, query: &Query) -> Result<Vec<Feature>>;

    /// Features within `tolerance` map units of a point.
    fn features_at_point(&self, point: &Point, tolerance: f64) -> Result<Vec<Feature>> {
        let around = BBox::new(*point, *point).pad(tolerance);
        self.features(&Query::new(around))
    }
}

/// An in-memory vector datasource with an R-tree index.
#[derive(Debug)]
pub struct MemoryDatasource {
    name: String,
    features: Vec<Feature>,
    index: SpatialIndex,
    envelope: Option<BBox>,
}

impl MemoryDatasource {
    pub fn new(features: Vec<Feature>) -> Self {
        Self::with_name("memory", features)
    }

    /// Build a memory datasource reporting a plugin name of its origin.
    pub fn with_name(name: &str, features: Vec<Feature>) -> Self {
        let entries: Vec<SpatialEntry> = features
            .iter()
            .enumerate()
            .filter_map(|(i, f)| {
                f.bbox().map(|bbox| SpatialEntry {
                    feature_index: i,
                    bbox,
                })
            })
            .collect();
        let envelope = entries
            .iter()
            .map(|e| e.bbox)
            .reduce(|a, b| a.union(&b));
        log::debug!(
            "{} datasource: {} features, extent {:?}",
            name,
            features.len(),
            envelope
        );
        Self {
            name: name.to_string(),
            index: SpatialIndex::build(entries),
            features,
            envelope,
        }
    }

    fn collect(&self, hits: Vec<&SpatialEntry>) -> Vec<Feature> {
        let mut indices: Vec<usize> = hits.iter().map(|e| e.feature_index).collect();
        // Keep source order so rendering is deterministic.
        indices.sort_unstable();
        indices
            .into_iter()
            .map(|i| self.features[i].clone())
            .collect()
    }
}

impl Datasource for MemoryDatasource {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> DatasourceKind {
        if !self.features.is_empty() && self.features.iter().all(|f| f.raster.is_some()) {
            DatasourceKind::Raster
        } else {
            DatasourceKind::Vector
        }
    }

    fn envelope(&self) -> Option<BBox> {
        self.envelope
    }

    fn geometry_type(&self) -> Option<GeometryType> {
        let mut types = self
            .features
            .iter()
            .filter_map(|f| f.geometry.as_ref().map(|g| g.geometry_type()));
        let first = types.next()?;
        if types.all(|t| t == first) {
            Some(first)
        } else {
            Some(GeometryType::Collection)
        }
    }

    fn features(&self, query: &Query) -> Result<Vec<Feature>> {
        Ok(self.collect(self.index.query_bbox(&query.bbox)))
    }

    fn features_at_point(&self, point: &Point, tolerance: f64) -> Result<Vec<Feature>> {
        Ok(self.collect(self.index.query_point(point, tolerance)))
    }
}
