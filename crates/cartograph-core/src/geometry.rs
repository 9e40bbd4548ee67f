use serde::{Deserialize, Serialize};

/// A 2D point in map coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    pub fn translate(&self, dx: f64, dy: f64) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }
}

/// An axis-aligned bounding box.
///
/// A box whose min equals its max on either axis is *degenerate*: it is a
/// valid extent (a single point has one) but cannot be used as a view box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub min: Point,
    pub max: Point,
}

impl BBox {
    pub fn new(min: Point, max: Point) -> Self {
        Self { min, max }
    }

    /// Build a box from two arbitrary corners, normalising the order.
    pub fn from_coords(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self {
            min: Point::new(x1.min(x2), y1.min(y2)),
            max: Point::new(x1.max(x2), y1.max(y2)),
        }
    }

    pub fn from_points(points: &[Point]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        let mut min_x = f64::MAX;
        let mut min_y = f64::MAX;
        let mut max_x = f64::MIN;
        let mut max_y = f64::MIN;
        for p in points {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        Some(Self {
            min: Point::new(min_x, min_y),
            max: Point::new(max_x, max_y),
        })
    }

    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    pub fn center(&self) -> Point {
        Point::new(
            (self.min.x + self.max.x) / 2.0,
            (self.min.y + self.max.y) / 2.0,
        )
    }

    /// Finite and correctly ordered. Degenerate boxes are valid.
    pub fn is_valid(&self) -> bool {
        [self.min.x, self.min.y, self.max.x, self.max.y]
            .iter()
            .all(|v| v.is_finite())
            && self.min.x <= self.max.x
            && self.min.y <= self.max.y
    }

    pub fn is_degenerate(&self) -> bool {
        self.width() <= 0.0 || self.height() <= 0.0
    }

    pub fn contains_point(&self, p: &Point) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }

    pub fn intersects(&self, other: &BBox) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
    }

    pub fn union(&self, other: &BBox) -> Self {
        Self {
            min: Point::new(self.min.x.min(other.min.x), self.min.y.min(other.min.y)),
            max: Point::new(self.max.x.max(other.max.x), self.max.y.max(other.max.y)),
        }
    }

    pub fn intersection(&self, other: &BBox) -> Option<Self> {
        if !self.intersects(other) {
            return None;
        }
        Some(Self {
            min: Point::new(self.min.x.max(other.min.x), self.min.y.max(other.min.y)),
            max: Point::new(self.max.x.min(other.max.x), self.max.y.min(other.max.y)),
        })
    }

    /// Grow the box by `d` on every side.
    pub fn pad(&self, d: f64) -> Self {
        Self {
            min: Point::new(self.min.x - d, self.min.y - d),
            max: Point::new(self.max.x + d, self.max.y + d),
        }
    }

    pub fn corners(&self) -> [Point; 4] {
        [
            self.min,
            Point::new(self.max.x, self.min.y),
            self.max,
            Point::new(self.min.x, self.max.y),
        ]
    }

    /// Parse `minx,miny,maxx,maxy` (comma or whitespace separated).
    pub fn parse(s: &str) -> Option<Self> {
        let values: Vec<f64> = s
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|t| !t.is_empty())
            .map(|t| t.parse::<f64>())
            .collect::<Result<_, _>>()
            .ok()?;
        match values.as_slice() {
            [x1, y1, x2, y2] => Some(Self::from_coords(*x1, *y1, *x2, *y2)),
            _ => None,
        }
    }
}

/// Geometry type codes, matching the values exposed to filter expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeometryType {
    Point = 1,
    LineString = 2,
    Polygon = 3,
    Collection = 4,
}

/// A polygon with one exterior ring and any number of holes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    pub exterior: Vec<Point>,
    pub interiors: Vec<Vec<Point>>,
}

impl Polygon {
    pub fn new(exterior: Vec<Point>, interiors: Vec<Vec<Point>>) -> Self {
        Self {
            exterior,
            interiors,
        }
    }

    pub fn bbox(&self) -> Option<BBox> {
        BBox::from_points(&self.exterior)
    }

    pub fn rings(&self) -> impl Iterator<Item = &Vec<Point>> {
        std::iter::once(&self.exterior).chain(self.interiors.iter())
    }

    /// Exterior ring edges, including the closing edge for open rings.
    fn exterior_edges(&self) -> impl Iterator<Item = (Point, Point)> + '_ {
        let n = self.exterior.len();
        (0..n).map(move |i| (self.exterior[i], self.exterior[(i + 1) % n]))
    }

    /// Signed area of the exterior ring (shoelace).
    fn exterior_signed_area(&self) -> f64 {
        self.exterior_edges()
            .map(|(a, b)| a.x * b.y - b.x * a.y)
            .sum::<f64>()
            / 2.0
    }

    /// Area-weighted centroid of the exterior ring, falling back to the
    /// vertex mean for zero-area rings.
    pub fn centroid(&self) -> Option<Point> {
        if self.exterior.is_empty() {
            return None;
        }
        let area = self.exterior_signed_area();
        if area.abs() < f64::EPSILON {
            return mean_point(&self.exterior);
        }
        let (mut cx, mut cy) = (0.0, 0.0);
        for (a, b) in self.exterior_edges() {
            let cross = a.x * b.y - b.x * a.y;
            cx += (a.x + b.x) * cross;
            cy += (a.y + b.y) * cross;
        }
        Some(Point::new(cx / (6.0 * area), cy / (6.0 * area)))
    }
}

fn mean_point(points: &[Point]) -> Option<Point> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f64;
    let (sx, sy) = points
        .iter()
        .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
    Some(Point::new(sx / n, sy / n))
}

/// Point halfway along a polyline, by length.
pub fn line_midpoint(points: &[Point]) -> Option<(Point, f64)> {
    if points.len() < 2 {
        return points.first().map(|p| (*p, 0.0));
    }
    let total: f64 = points.windows(2).map(|w| w[0].distance_to(&w[1])).sum();
    let mut remaining = total / 2.0;
    for w in points.windows(2) {
        let seg = w[0].distance_to(&w[1]);
        if seg > 0.0 && remaining <= seg {
            let t = remaining / seg;
            let angle = (w[1].y - w[0].y).atan2(w[1].x - w[0].x);
            return Some((
                Point::new(w[0].x + (w[1].x - w[0].x) * t, w[0].y + (w[1].y - w[0].y) * t),
                angle,
            ));
        }
        remaining -= seg;
    }
    points.last().map(|p| (*p, 0.0))
}

/// A feature geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Geometry {
    Point(Point),
    LineString(Vec<Point>),
    Polygon(Polygon),
    MultiPoint(Vec<Point>),
    MultiLineString(Vec<Vec<Point>>),
    MultiPolygon(Vec<Polygon>),
    Collection(Vec<Geometry>),
}

impl Geometry {
    pub fn bbox(&self) -> Option<BBox> {
        match self {
            Geometry::Point(p) => Some(BBox::new(*p, *p)),
            Geometry::LineString(pts) | Geometry::MultiPoint(pts) => BBox::from_points(pts),
            Geometry::Polygon(p) => p.bbox(),
            Geometry::MultiLineString(lines) => union_all(lines.iter().map(|l| BBox::from_points(l))),
            Geometry::MultiPolygon(polys) => union_all(polys.iter().map(|p| p.bbox())),
            Geometry::Collection(geoms) => union_all(geoms.iter().map(|g| g.bbox())),
        }
    }

    pub fn geometry_type(&self) -> GeometryType {
        match self {
            Geometry::Point(_) | Geometry::MultiPoint(_) => GeometryType::Point,
            Geometry::LineString(_) | Geometry::MultiLineString(_) => GeometryType::LineString,
            Geometry::Polygon(_) | Geometry::MultiPolygon(_) => GeometryType::Polygon,
            Geometry::Collection(_) => GeometryType::Collection,
        }
    }

    /// Apply `f` to every vertex, producing a new geometry.
    pub fn map_points<F>(&self, f: &mut F) -> Geometry
    where
        F: FnMut(Point) -> Point,
    {
        let ring = |pts: &Vec<Point>, f: &mut F| pts.iter().map(|p| f(*p)).collect::<Vec<_>>();
        match self {
            Geometry::Point(p) => Geometry::Point(f(*p)),
            Geometry::LineString(pts) => Geometry::LineString(ring(pts, f)),
            Geometry::MultiPoint(pts) => Geometry::MultiPoint(ring(pts, f)),
            Geometry::Polygon(p) => Geometry::Polygon(map_polygon(p, f)),
            Geometry::MultiLineString(lines) => {
                Geometry::MultiLineString(lines.iter().map(|l| ring(l, f)).collect())
            }
            Geometry::MultiPolygon(polys) => {
                Geometry::MultiPolygon(polys.iter().map(|p| map_polygon(p, f)).collect())
            }
            Geometry::Collection(geoms) => {
                Geometry::Collection(geoms.iter().map(|g| g.map_points(f)).collect())
            }
        }
    }

    /// Flatten multi-geometries and collections into simple parts.
    pub fn parts(&self) -> Vec<&Geometry> {
        match self {
            Geometry::Collection(geoms) => geoms.iter().flat_map(|g| g.parts()).collect(),
            other => vec![other],
        }
    }

    /// Anchor points used for point-like placement (markers, labels).
    ///
    /// Points anchor at themselves, lines at their length midpoint with the
    /// segment angle, polygons at their centroid.
    pub fn anchors(&self) -> Vec<(Point, f64)> {
        match self {
            Geometry::Point(p) => vec![(*p, 0.0)],
            Geometry::MultiPoint(pts) => pts.iter().map(|p| (*p, 0.0)).collect(),
            Geometry::LineString(pts) => line_midpoint(pts).into_iter().collect(),
            Geometry::MultiLineString(lines) => {
                lines.iter().filter_map(|l| line_midpoint(l)).collect()
            }
            Geometry::Polygon(p) => p.centroid().map(|c| (c, 0.0)).into_iter().collect(),
            Geometry::MultiPolygon(polys) => polys
                .iter()
                .filter_map(|p| p.centroid().map(|c| (c, 0.0)))
                .collect(),
            Geometry::Collection(geoms) => geoms.iter().flat_map(|g| g.anchors()).collect(),
        }
    }
}

fn map_polygon<F>(p: &Polygon, f: &mut F) -> Polygon
where
    F: FnMut(Point) -> Point,
{
    Polygon {
        exterior: p.exterior.iter().map(|pt| f(*pt)).collect(),
        interiors: p
            .interiors
            .iter()
            .map(|r| r.iter().map(|pt| f(*pt)).collect())
            .collect(),
    }
}

fn union_all(boxes: impl Iterator<Item = Option<BBox>>) -> Option<BBox> {
    boxes.flatten().reduce(|a, b| a.union(&b))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x0: f64, y0: f64, size: f64) -> Polygon {
        Polygon::new(
            vec![
                Point::new(x0, y0),
                Point::new(x0 + size, y0),
                Point::new(x0 + size, y0 + size),
                Point::new(x0, y0 + size),
                Point::new(x0, y0),
            ],
            Vec::new(),
        )
    }

    #[test]
    fn test_point_distance() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(3.0, 4.0);
        assert!((a.distance_to(&b) - 5.0).abs() < 1e-10);
    }

    #[test]
    fn test_bbox_intersection() {
        let a = BBox::new(Point::new(0.0, 0.0), Point::new(10.0, 10.0));
        let b = BBox::new(Point::new(5.0, 5.0), Point::new(15.0, 15.0));
        let c = BBox::new(Point::new(20.0, 20.0), Point::new(30.0, 30.0));
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
        let i = a.intersection(&b).unwrap();
        assert_eq!(i, BBox::from_coords(5.0, 5.0, 10.0, 10.0));
    }

    #[test]
    fn test_point_bbox_is_degenerate_but_valid() {
        let g = Geometry::Point(Point::new(3.0, -2.0));
        let bb = g.bbox().unwrap();
        assert!(bb.is_valid());
        assert!(bb.is_degenerate());
        assert_eq!(bb.min, bb.max);
    }

    #[test]
    fn test_bbox_parse() {
        let bb = BBox::parse("-180,-90, 180 90").unwrap();
        assert_eq!(bb.width(), 360.0);
        assert_eq!(bb.height(), 180.0);
        assert!(BBox::parse("1,2,3").is_none());
        assert!(BBox::parse("a,b,c,d").is_none());
    }

    #[test]
    fn test_polygon_centroid() {
        let c = square(0.0, 0.0, 10.0).centroid().unwrap();
        assert!((c.x - 5.0).abs() < 1e-10);
        assert!((c.y - 5.0).abs() < 1e-10);
    }

    #[test]
    fn test_line_midpoint_follows_length() {
        let pts = vec![Point::new(0.0, 0.0), Point::new(10.0, 0.0), Point::new(10.0, 30.0)];
        let (mid, angle) = line_midpoint(&pts).unwrap();
        assert!((mid.x - 10.0).abs() < 1e-10);
        assert!((mid.y - 10.0).abs() < 1e-10);
        assert!((angle - std::f64::consts::FRAC_PI_2).abs() < 1e-10);
    }

    #[test]
    fn test_collection_bbox_and_parts() {
        let g = Geometry::Collection(vec![
            Geometry::Point(Point::new(-5.0, 1.0)),
            Geometry::Polygon(square(0.0, 0.0, 4.0)),
        ]);
        assert_eq!(g.bbox().unwrap(), BBox::from_coords(-5.0, 0.0, 4.0, 4.0));
        assert_eq!(g.parts().len(), 2);
        assert_eq!(g.geometry_type(), GeometryType::Collection);
    }

    #[test]
    fn test_map_points_translates_rings() {
        let g = Geometry::Polygon(square(0.0, 0.0, 1.0));
        let moved = g.map_points(&mut |p| p.translate(2.0, 3.0));
        assert_eq!(moved.bbox().unwrap(), BBox::from_coords(2.0, 3.0, 3.0, 4.0));
    }
}
