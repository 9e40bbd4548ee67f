//! Well-known text geometry reader, used by the CSV datasource.

use cartograph_core::error::{Error, Result};
use cartograph_core::geometry::{Geometry, Point, Polygon};

/// Parse a WKT geometry such as `POINT (1 2)` or `MULTIPOLYGON (((...)))`.
pub fn parse_wkt(input: &str) -> Result<Geometry> {
    let mut parser = WktParser {
        src: input,
        pos: 0,
    };
    let geometry = parser.geometry()?;
    parser.skip_ws();
    if parser.pos != input.len() {
        return Err(parser.error("trailing characters"));
    }
    Ok(geometry)
}

struct WktParser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> WktParser<'a> {
    fn error(&self, message: &str) -> Error {
        Error::Datasource(format!(
            "invalid WKT '{}' at offset {}: {}",
            self.src, self.pos, message
        ))
    }

    fn skip_ws(&mut self) {
        let rest = &self.src[self.pos..];
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn peek(&mut self) -> Option<char> {
        self.skip_ws();
        self.src[self.pos..].chars().next()
    }

    fn expect(&mut self, c: char) -> Result<()> {
        if self.peek() == Some(c) {
            self.pos += c.len_utf8();
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", c)))
        }
    }

    fn word(&mut self) -> String {
        self.skip_ws();
        let rest = &self.src[self.pos..];
        let len = rest
            .find(|c: char| !c.is_ascii_alphabetic())
            .unwrap_or(rest.len());
        self.pos += len;
        rest[..len].to_ascii_uppercase()
    }

    fn number(&mut self) -> Result<f64> {
        self.skip_ws();
        let rest = &self.src[self.pos..];
        let len = rest
            .find(|c: char| !(c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E')))
            .unwrap_or(rest.len());
        let value = rest[..len]
            .parse::<f64>()
            .map_err(|_| self.error("expected a number"))?;
        self.pos += len;
        Ok(value)
    }

    /// `EMPTY` after a tag, consumed if present.
    fn empty(&mut self) -> bool {
        let save = self.pos;
        if self.word() == "EMPTY" {
            true
        } else {
            self.pos = save;
            false
        }
    }

    fn geometry(&mut self) -> Result<Geometry> {
        let tag = self.word();
        // Z and M variants are read as 2D.
        let save = self.pos;
        if !matches!(self.word().as_str(), "Z" | "M" | "ZM") {
            self.pos = save;
        }
        if self.empty() {
            return Ok(Geometry::Collection(Vec::new()));
        }
        match tag.as_str() {
            "POINT" => {
                self.expect('(')?;
                let p = self.point()?;
                self.expect(')')?;
                Ok(Geometry::Point(p))
            }
            "LINESTRING" => Ok(Geometry::LineString(self.point_list()?)),
            "POLYGON" => Ok(Geometry::Polygon(self.polygon()?)),
            "MULTIPOINT" => Ok(Geometry::MultiPoint(self.multipoint()?)),
            "MULTILINESTRING" => Ok(Geometry::MultiLineString(
                self.list(|p| p.point_list())?,
            )),
            "MULTIPOLYGON" => Ok(Geometry::MultiPolygon(self.list(|p| p.polygon())?)),
            "GEOMETRYCOLLECTION" => Ok(Geometry::Collection(self.list(|p| p.geometry())?)),
            "" => Err(self.error("expected a geometry tag")),
            other => Err(self.error(&format!("unsupported geometry '{}'", other))),
        }
    }

    fn point(&mut self) -> Result<Point> {
        let x = self.number()?;
        let y = self.number()?;
        // Drop any Z/M ordinates.
        while matches!(self.peek(), Some(c) if c != ',' && c != ')') {
            self.number()?;
        }
        Ok(Point::new(x, y))
    }

    fn list<T>(&mut self, mut item: impl FnMut(&mut Self) -> Result<T>) -> Result<Vec<T>> {
        self.expect('(')?;
        let mut out = vec![item(self)?];
        while self.peek() == Some(',') {
            self.pos += 1;
            out.push(item(self)?);
        }
        self.expect(')')?;
        Ok(out)
    }

    fn point_list(&mut self) -> Result<Vec<Point>> {
        self.list(|p| p.point())
    }

    fn polygon(&mut self) -> Result<Polygon> {
        let mut rings = self.list(|p| p.point_list())?;
        let exterior = rings.remove(0);
        Ok(Polygon::new(exterior, rings))
    }

    /// Both `MULTIPOINT (1 2, 3 4)` and `MULTIPOINT ((1 2), (3 4))`.
    fn multipoint(&mut self) -> Result<Vec<Point>> {
        self.list(|p| {
            if p.peek() == Some('(') {
                p.pos += 1;
                let pt = p.point()?;
                p.expect(')')?;
                Ok(pt)
            } else {
                p.point()
            }
        })
    }
}
