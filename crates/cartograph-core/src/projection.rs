use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::geometry::{BBox, Geometry, Point};

/// WGS84 equatorial radius in metres.
pub const EARTH_RADIUS: f64 = 6_378_137.0;

/// Latitude limit of the spherical mercator square.
const MAX_MERCATOR_LAT: f64 = 85.051_128_779_806_6;

/// Spatial reference systems understood by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Projection {
    /// Geographic longitude/latitude in degrees (EPSG:4326).
    Geographic,
    /// Spherical web mercator in metres (EPSG:3857).
    WebMercator,
}

impl Projection {
    /// Parse a proj4 string or an `epsg:` code.
    pub fn from_srs(srs: &str) -> Result<Self, Error> {
        let s = srs.trim().to_ascii_lowercase();
        let code = s
            .strip_prefix("+init=")
            .unwrap_or(&s)
            .strip_prefix("epsg:")
            .map(|c| c.split_whitespace().next().unwrap_or(""));
        match code {
            Some("4326") => return Ok(Projection::Geographic),
            Some("3857") | Some("900913") | Some("3785") => return Ok(Projection::WebMercator),
            Some(_) => return Err(Error::UnknownProjection(srs.to_string())),
            None => {}
        }

        let proj = s
            .split_whitespace()
            .find_map(|t| t.strip_prefix("+proj="))
            .ok_or_else(|| Error::UnknownProjection(srs.to_string()))?;
        match proj {
            "longlat" | "latlong" | "lonlat" | "latlon" => Ok(Projection::Geographic),
            "merc" => Ok(Projection::WebMercator),
            _ => Err(Error::UnknownProjection(srs.to_string())),
        }
    }

    pub fn is_geographic(&self) -> bool {
        matches!(self, Projection::Geographic)
    }

    /// Default proj4 definition for this projection.
    pub fn srs(&self) -> &'static str {
        match self {
            Projection::Geographic => "+proj=longlat +ellps=WGS84 +datum=WGS84 +no_defs",
            Projection::WebMercator => {
                "+proj=merc +a=6378137 +b=6378137 +lat_ts=0.0 +lon_0=0.0 +x_0=0.0 +y_0=0.0 +k=1.0 +units=m +nadgrids=@null +wktext +no_defs"
            }
        }
    }
}

fn lonlat_to_merc(p: Point) -> Point {
    let lat = p.y.clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT).to_radians();
    Point::new(
        p.x.to_radians() * EARTH_RADIUS,
        (std::f64::consts::FRAC_PI_4 + lat / 2.0).tan().ln() * EARTH_RADIUS,
    )
}

fn merc_to_lonlat(p: Point) -> Point {
    Point::new(
        (p.x / EARTH_RADIUS).to_degrees(),
        (2.0 * (p.y / EARTH_RADIUS).exp().atan() - std::f64::consts::FRAC_PI_2).to_degrees(),
    )
}

/// Transformation between two projections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProjTransform {
    pub source: Projection,
    pub dest: Projection,
}

impl ProjTransform {
    pub fn new(source: Projection, dest: Projection) -> Self {
        Self { source, dest }
    }

    pub fn is_identity(&self) -> bool {
        self.source == self.dest
    }

    pub fn forward(&self, p: Point) -> Point {
        convert(self.source, self.dest, p)
    }

    pub fn backward(&self, p: Point) -> Point {
        convert(self.dest, self.source, p)
    }

    pub fn forward_geometry(&self, g: &Geometry) -> Geometry {
        if self.is_identity() {
            return g.clone();
        }
        g.map_points(&mut |p| self.forward(p))
    }

    pub fn forward_bbox(&self, b: &BBox) -> BBox {
        if self.is_identity() {
            return *b;
        }
        transform_bbox(b, |p| self.forward(p))
    }

    pub fn backward_bbox(&self, b: &BBox) -> BBox {
        if self.is_identity() {
            return *b;
        }
        transform_bbox(b, |p| self.backward(p))
    }
}

fn convert(from: Projection, to: Projection, p: Point) -> Point {
    match (from, to) {
        (Projection::Geographic, Projection::WebMercator) => lonlat_to_merc(p),
        (Projection::WebMercator, Projection::Geographic) => merc_to_lonlat(p),
        _ => p,
    }
}

/// Transform a box by sampling its edges, since the image of a box under a
/// non-affine projection is not itself a box.
fn transform_bbox<F: Fn(Point) -> Point>(b: &BBox, f: F) -> BBox {
    const STEPS: usize = 8;
    let mut pts = Vec::with_capacity(STEPS * 4);
    for i in 0..=STEPS {
        let t = i as f64 / STEPS as f64;
        let x = b.min.x + b.width() * t;
        let y = b.min.y + b.height() * t;
        pts.push(f(Point::new(x, b.min.y)));
        pts.push(f(Point::new(x, b.max.y)));
        pts.push(f(Point::new(b.min.x, y)));
        pts.push(f(Point::new(b.max.x, y)));
    }
    BBox::from_points(&pts).unwrap_or(*b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_srs_variants() {
        assert_eq!(
            Projection::from_srs("+proj=latlong +datum=WGS84").unwrap(),
            Projection::Geographic
        );
        assert_eq!(
            Projection::from_srs("+init=epsg:3857").unwrap(),
            Projection::WebMercator
        );
        assert_eq!(Projection::from_srs("EPSG:4326").unwrap(), Projection::Geographic);
        assert_eq!(
            Projection::from_srs(Projection::WebMercator.srs()).unwrap(),
            Projection::WebMercator
        );
        assert!(Projection::from_srs("+proj=utm +zone=33").is_err());
        assert!(Projection::from_srs("epsg:2154").is_err());
        assert!(Projection::from_srs("").is_err());
    }

    #[test]
    fn test_mercator_round_trip() {
        let t = ProjTransform::new(Projection::Geographic, Projection::WebMercator);
        let p = Point::new(10.75, 59.91);
        let m = t.forward(p);
        let back = t.backward(m);
        assert!((back.x - p.x).abs() < 1e-9);
        assert!((back.y - p.y).abs() < 1e-9);
        let edge = t.forward(Point::new(180.0, 0.0));
        assert!((edge.x - 20_037_508.342_789_244).abs() < 1e-6);
    }

    #[test]
    fn test_forward_bbox_covers_world() {
        let t = ProjTransform::new(Projection::Geographic, Projection::WebMercator);
        let b = t.forward_bbox(&BBox::from_coords(-180.0, -85.0511287798066, 180.0, 85.0511287798066));
        assert!((b.width() - 2.0 * 20_037_508.342_789_244).abs() < 1e-3);
        assert!((b.width() - b.height()).abs() < 1.0);
    }
}
