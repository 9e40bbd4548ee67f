use rstar::primitives::Rectangle;
use rstar::{RTree, AABB};

use cartograph_core::geometry::BBox;

/// Tracks the screen boxes of placed labels and markers so later ones can
/// avoid them.
#[derive(Debug, Default)]
pub struct LabelCollisionDetector {
    tree: RTree<Rectangle<[f64; 2]>>,
}

impl LabelCollisionDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when `bbox` overlaps none of the boxes placed so far.
    pub fn has_placement(&self, bbox: &BBox) -> bool {
        let envelope = AABB::from_corners([bbox.min.x, bbox.min.y], [bbox.max.x, bbox.max.y]);
        self.tree
            .locate_in_envelope_intersecting(&envelope)
            .next()
            .is_none()
    }

    pub fn insert(&mut self, bbox: BBox) {
        self.tree.insert(Rectangle::from_corners(
            [bbox.min.x, bbox.min.y],
            [bbox.max.x, bbox.max.y],
        ));
    }

    pub fn clear(&mut self) {
        self.tree = RTree::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collisions() {
        let mut detector = LabelCollisionDetector::new();
        let a = BBox::from_coords(0.0, 0.0, 10.0, 10.0);
        assert!(detector.has_placement(&a));
        detector.insert(a);
        assert!(!detector.has_placement(&BBox::from_coords(5.0, 5.0, 15.0, 15.0)));
        assert!(detector.has_placement(&BBox::from_coords(11.0, 0.0, 20.0, 10.0)));
        detector.clear();
        assert!(detector.has_placement(&a));
        assert!(detector.has_placement(&BBox::from_coords(5.0, 5.0, 15.0, 15.0)));
    }
}
