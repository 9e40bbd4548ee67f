use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::datasource::{Datasource, Parameters};
use crate::error::Result;
use crate::geometry::BBox;
use crate::projection::Projection;
use crate::style::MAX_SCALE_DENOMINATOR;

/// A data layer: a datasource drawn with an ordered list of named styles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Layer {
    pub name: String,
    /// Spatial reference of the layer's data.
    pub srs: String,
    /// Style names, applied in order.
    pub styles: Vec<String>,
    pub active: bool,
    /// Inclusive lower bound on the scale denominator.
    pub min_scale: f64,
    /// Exclusive upper bound on the scale denominator.
    pub max_scale: f64,
    /// Reset label collisions before this layer is drawn.
    pub clear_label_cache: bool,
    /// Parameters the datasource was bound from.
    pub datasource_params: Parameters,
    #[serde(skip)]
    datasource: Option<Arc<dyn Datasource>>,
}

impl Layer {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            srs: Projection::Geographic.srs().to_string(),
            styles: Vec::new(),
            active: true,
            min_scale: 0.0,
            max_scale: MAX_SCALE_DENOMINATOR,
            clear_label_cache: false,
            datasource_params: Parameters::new(),
            datasource: None,
        }
    }

    pub fn with_srs(mut self, srs: &str) -> Self {
        self.srs = srs.to_string();
        self
    }

    pub fn with_style(mut self, style: &str) -> Self {
        self.styles.push(style.to_string());
        self
    }

    pub fn with_datasource(mut self, datasource: Arc<dyn Datasource>) -> Self {
        self.datasource = Some(datasource);
        self
    }

    pub fn set_datasource(&mut self, datasource: Arc<dyn Datasource>) {
        self.datasource = Some(datasource);
    }

    pub fn datasource(&self) -> Option<&Arc<dyn Datasource>> {
        self.datasource.as_ref()
    }

    /// Active and within `[min_scale, max_scale)`.
    pub fn visible(&self, scale_denominator: f64) -> bool {
        self.active && self.min_scale <= scale_denominator && scale_denominator < self.max_scale
    }

    /// Extent of the bound datasource, in the layer's own reference system.
    pub fn envelope(&self) -> Option<BBox> {
        self.datasource.as_ref().and_then(|ds| ds.envelope())
    }

    pub fn projection(&self) -> Result<Projection> {
        Projection::from_srs(&self.srs)
    }
}
