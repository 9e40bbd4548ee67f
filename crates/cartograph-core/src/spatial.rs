use rstar::{RTree, RTreeObject, AABB};

use crate::geometry::{BBox, Point};

/// An entry in the R-tree spatial index, referencing a feature by position.
#[derive(Debug, Clone)]
pub struct SpatialEntry {
    /// Index into the datasource's feature vector.
    pub feature_index: usize,
    /// Bounding box of the feature.
    pub bbox: BBox,
}

impl RTreeObject for SpatialEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(
            [self.bbox.min.x, self.bbox.min.y],
            [self.bbox.max.x, self.bbox.max.y],
        )
    }
}

/// Spatial index for query-box culling and point lookups.
#[derive(Debug)]
pub struct SpatialIndex {
    tree: RTree<SpatialEntry>,
}

impl SpatialIndex {
    /// Build the index from a list of feature bounding boxes.
    pub fn build(entries: Vec<SpatialEntry>) -> Self {
        Self {
            tree: RTree::bulk_load(entries),
        }
    }

    /// Entries whose box lies within `tolerance` of the point.
    pub fn query_point(&self, point: &Point, tolerance: f64) -> Vec<&SpatialEntry> {
        let around = BBox::new(*point, *point).pad(tolerance);
        self.query_bbox(&around)
    }

    /// Entries intersecting the query box.
    pub fn query_bbox(&self, bbox: &BBox) -> Vec<&SpatialEntry> {
        let envelope = AABB::from_corners([bbox.min.x, bbox.min.y], [bbox.max.x, bbox.max.y]);
        self.tree
            .locate_in_envelope_intersecting(&envelope)
            .collect()
    }
}
