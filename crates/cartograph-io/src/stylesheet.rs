//! XML stylesheet loader.
//!
//! Reads the Mapnik XML dialect: a `<Map>` root holding `<Style>`,
//! `<Layer>` and template `<Datasource>` elements. Datasources are bound
//! through a [`DatasourceRegistry`] as layers are read.

use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use roxmltree::{Document, Node};
use serde::{Deserialize, Serialize};

use cartograph_core::color::Color;
use cartograph_core::datasource::Parameters;
use cartograph_core::expression::Expression;
use cartograph_core::geometry::BBox;
use cartograph_core::layer::Layer;
use cartograph_core::map::{AspectFixMode, Map};
use cartograph_core::projection::Projection;
use cartograph_core::style::{Filter, FilterMode, Rule, Style};
use cartograph_core::symbolizer::{
    CompositeOp, LineCap, LineJoin, LineSymbolizer, MarkerPlacement, MarkerType,
    MarkersSymbolizer, PointSymbolizer, PolygonPatternSymbolizer, PolygonSymbolizer,
    RasterScaling, RasterSymbolizer, Symbolizer, TextPlacement, TextSymbolizer, TextTransform,
};

use crate::error::ParseError;
use crate::registry::{resolve_path, DatasourceRegistry};

type Result<T> = std::result::Result<T, ParseError>;

const MAP_ATTRS: &[&str] = &[
    "srs",
    "background-color",
    "buffer-size",
    "maximum-extent",
    "font-directory",
    "aspect-fix-mode",
    "base",
    "minimum-version",
];
const STYLE_ATTRS: &[&str] = &["name", "filter-mode", "opacity", "comp-op"];
const LAYER_ATTRS: &[&str] = &["name", "srs", "status", "minzoom", "maxzoom", "clear-label-cache"];
const LINE_ATTRS: &[&str] = &[
    "stroke",
    "stroke-width",
    "stroke-opacity",
    "stroke-linecap",
    "stroke-linejoin",
    "stroke-dasharray",
    "comp-op",
];
const POLYGON_ATTRS: &[&str] = &["fill", "fill-opacity", "comp-op"];
const PATTERN_ATTRS: &[&str] = &["file", "opacity", "comp-op"];
const POINT_ATTRS: &[&str] = &["file", "opacity", "allow-overlap", "ignore-placement", "comp-op"];
const MARKERS_ATTRS: &[&str] = &[
    "file",
    "marker-type",
    "width",
    "height",
    "fill",
    "fill-opacity",
    "stroke",
    "stroke-width",
    "stroke-opacity",
    "placement",
    "spacing",
    "allow-overlap",
    "ignore-placement",
    "comp-op",
];
const TEXT_ATTRS: &[&str] = &[
    "name",
    "face-name",
    "size",
    "fill",
    "opacity",
    "halo-fill",
    "halo-radius",
    "placement",
    "dx",
    "dy",
    "allow-overlap",
    "text-transform",
    "comp-op",
];
const RASTER_ATTRS: &[&str] = &["opacity", "scaling", "comp-op"];

/// Options controlling how a stylesheet is read.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadOptions {
    /// Reject unknown elements and attributes instead of ignoring them.
    pub strict: bool,
    /// Directory that relative file paths resolve against. Defaults to the
    /// stylesheet's own directory, or the working directory for strings.
    pub base_path: Option<PathBuf>,
}

/// Load the stylesheet at `path` into `map` using the built-in datasources.
pub fn load_map(map: &mut Map, path: impl AsRef<Path>, options: &LoadOptions) -> Result<()> {
    StylesheetLoader::new(options.clone()).load_file(map, path)
}

/// Load an in-memory stylesheet into `map`.
pub fn load_map_string(map: &mut Map, xml: &str, options: &LoadOptions) -> Result<()> {
    StylesheetLoader::new(options.clone()).load_str(map, xml)
}

/// Stylesheet reader bound to a datasource registry.
#[derive(Debug)]
pub struct StylesheetLoader {
    options: LoadOptions,
    registry: DatasourceRegistry,
}

impl StylesheetLoader {
    pub fn new(options: LoadOptions) -> Self {
        Self::with_registry(options, DatasourceRegistry::with_builtins())
    }

    pub fn with_registry(options: LoadOptions, registry: DatasourceRegistry) -> Self {
        Self { options, registry }
    }

    pub fn registry_mut(&mut self) -> &mut DatasourceRegistry {
        &mut self.registry
    }

    pub fn load_file(&self, map: &mut Map, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let xml = fs::read_to_string(path).map_err(|source| ParseError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let base = match &self.options.base_path {
            Some(base) => base.clone(),
            None => match path.parent() {
                Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
                _ => PathBuf::from("."),
            },
        };
        log::info!("Loading stylesheet {}", path.display());
        self.parse(map, &xml, base)
    }

    pub fn load_str(&self, map: &mut Map, xml: &str) -> Result<()> {
        let base = self
            .options
            .base_path
            .clone()
            .unwrap_or_else(|| PathBuf::from("."));
        self.parse(map, xml, base)
    }

    /// Parse into a copy of the map so a failed load leaves it untouched.
    fn parse(&self, map: &mut Map, xml: &str, base: PathBuf) -> Result<()> {
        let doc = Document::parse(xml)?;
        let root = doc.root_element();
        if root.tag_name().name() != "Map" {
            return Err(ParseError::NotAMap(root.tag_name().name().to_string()));
        }
        let mut ctx = Context {
            strict: self.options.strict,
            base,
            registry: &self.registry,
        };
        let mut staged = map.clone();
        ctx.parse_map(&mut staged, root)?;
        *map = staged;
        Ok(())
    }
}

struct Context<'r> {
    strict: bool,
    base: PathBuf,
    registry: &'r DatasourceRegistry,
}

impl Context<'_> {
    fn unknown_element(&self, node: Node, parent: Node) -> Result<()> {
        let element = node.tag_name().name().to_string();
        let parent = parent.tag_name().name().to_string();
        if self.strict {
            return Err(ParseError::UnknownElement { element, parent });
        }
        log::warn!("Ignoring unknown element <{}> inside <{}>", element, parent);
        Ok(())
    }

    fn check_attributes(&self, node: Node, known: &[&str]) -> Result<()> {
        for attr in node.attributes() {
            if known.contains(&attr.name()) {
                continue;
            }
            let element = node.tag_name().name().to_string();
            if self.strict {
                return Err(ParseError::UnknownAttribute {
                    element,
                    attribute: attr.name().to_string(),
                });
            }
            log::warn!("Ignoring unknown attribute '{}' on <{}>", attr.name(), element);
        }
        Ok(())
    }

    fn path_attr(&self, node: Node, name: &str) -> Option<PathBuf> {
        node.attribute(name).map(|f| resolve_path(&self.base, f.trim()))
    }

    fn parse_map(&mut self, map: &mut Map, node: Node) -> Result<()> {
        self.check_attributes(node, MAP_ATTRS)?;
        if let Some(base) = node.attribute("base") {
            self.base = resolve_path(&self.base, base);
        }
        if let Some(srs) = node.attribute("srs") {
            Projection::from_srs(srs).map_err(|e| invalid(node, "srs", srs, e))?;
            map.srs = srs.to_string();
        }
        if let Some(color) = attr::<Color>(node, "background-color")? {
            map.background = Some(color);
        }
        set(&mut map.buffer_size, attr(node, "buffer-size")?);
        if let Some(raw) = node.attribute("maximum-extent") {
            let extent = BBox::parse(raw)
                .ok_or_else(|| invalid(node, "maximum-extent", raw, "expected minx,miny,maxx,maxy"))?;
            map.maximum_extent = Some(extent);
        }
        if let Some(dir) = self.path_attr(node, "font-directory") {
            map.font_directory = Some(dir);
        }
        set(
            &mut map.aspect_fix_mode,
            enum_attr(node, "aspect-fix-mode", AspectFixMode::from_name)?,
        );

        let children: Vec<Node> = node.children().filter(Node::is_element).collect();
        // Templates and styles first, so layers may refer to them in any order.
        for child in &children {
            match child.tag_name().name() {
                "Datasource" => {
                    let name = required(*child, "name")?.to_string();
                    self.check_attributes(*child, &["name"])?;
                    let params = self.parse_parameters(*child)?;
                    map.datasource_templates.insert(name, params);
                }
                "Style" => {
                    let style = self.parse_style(*child)?;
                    let name = style.name.clone();
                    if !map.add_style(style) {
                        return Err(ParseError::DuplicateStyle(name));
                    }
                }
                "Layer" => {}
                _ => self.unknown_element(*child, node)?,
            }
        }
        for child in children.iter().filter(|c| c.tag_name().name() == "Layer") {
            let layer = self.parse_layer(map, *child)?;
            map.add_layer(layer);
        }

        for layer in map.layers() {
            if let Some(style) = layer.styles.iter().find(|s| map.find_style(s).is_none()) {
                return Err(ParseError::UndefinedStyle {
                    style: style.clone(),
                    layer: layer.name.clone(),
                });
            }
        }
        log::info!(
            "Stylesheet loaded: {} styles, {} layers",
            map.styles().len(),
            map.layer_count()
        );
        Ok(())
    }

    fn parse_parameters(&self, node: Node) -> Result<Parameters> {
        let mut params = Parameters::new();
        for child in node.children().filter(Node::is_element) {
            if child.tag_name().name() != "Parameter" {
                self.unknown_element(child, node)?;
                continue;
            }
            self.check_attributes(child, &["name"])?;
            let name = required(child, "name")?;
            params.insert(name, &text(child));
        }
        Ok(params)
    }

    fn parse_style(&self, node: Node) -> Result<Style> {
        self.check_attributes(node, STYLE_ATTRS)?;
        let mut style = Style::new(required(node, "name")?);
        set(
            &mut style.filter_mode,
            enum_attr(node, "filter-mode", |s| match s {
                "all" => Some(FilterMode::All),
                "first" => Some(FilterMode::First),
                _ => None,
            })?,
        );
        set(&mut style.opacity, attr(node, "opacity")?);
        style.comp_op = enum_attr(node, "comp-op", CompositeOp::from_name)?;

        for child in node.children().filter(Node::is_element) {
            match child.tag_name().name() {
                "Rule" => style.rules.push(self.parse_rule(child)?),
                _ => self.unknown_element(child, node)?,
            }
        }
        log::debug!("Style '{}' with {} rules", style.name, style.rules.len());
        Ok(style)
    }

    fn parse_rule(&self, node: Node) -> Result<Rule> {
        self.check_attributes(node, &["name"])?;
        let mut rule = Rule::new(node.attribute("name").unwrap_or(""));
        let mut filtered = false;
        for child in node.children().filter(Node::is_element) {
            let filter = match child.tag_name().name() {
                "Filter" => Some(Filter::Expr(Expression::parse(&text(child)).map_err(
                    |source| ParseError::Filter {
                        rule: rule.name.clone(),
                        source,
                    },
                )?)),
                "ElseFilter" => Some(Filter::Else),
                "AlsoFilter" => Some(Filter::Also),
                "MinScaleDenominator" => {
                    rule.min_scale = number_text(child)?;
                    None
                }
                "MaxScaleDenominator" => {
                    rule.max_scale = number_text(child)?;
                    None
                }
                _ => {
                    match self.parse_symbolizer(child)? {
                        Some(symbolizer) => rule.symbolizers.push(symbolizer),
                        None => self.unknown_element(child, node)?,
                    }
                    None
                }
            };
            if let Some(filter) = filter {
                if filtered {
                    return Err(ParseError::ConflictingFilters(rule.name.clone()));
                }
                filtered = true;
                rule.filter = filter;
            }
        }
        Ok(rule)
    }

    /// `None` when the element is not a symbolizer.
    fn parse_symbolizer(&self, node: Node) -> Result<Option<Symbolizer>> {
        let symbolizer = match node.tag_name().name() {
            "LineSymbolizer" => {
                self.check_attributes(node, LINE_ATTRS)?;
                let mut s = LineSymbolizer::default();
                set(&mut s.stroke, attr(node, "stroke")?);
                set(&mut s.stroke_width, attr(node, "stroke-width")?);
                set(&mut s.stroke_opacity, attr(node, "stroke-opacity")?);
                set(&mut s.line_cap, enum_attr(node, "stroke-linecap", line_cap)?);
                set(&mut s.line_join, enum_attr(node, "stroke-linejoin", line_join)?);
                if let Some(raw) = node.attribute("stroke-dasharray") {
                    s.dasharray = dasharray(raw)
                        .ok_or_else(|| invalid(node, "stroke-dasharray", raw, "expected dash,gap,..."))?;
                }
                s.comp_op = enum_attr(node, "comp-op", CompositeOp::from_name)?;
                Symbolizer::Line(s)
            }
            "PolygonSymbolizer" => {
                self.check_attributes(node, POLYGON_ATTRS)?;
                let mut s = PolygonSymbolizer::default();
                set(&mut s.fill, attr(node, "fill")?);
                set(&mut s.fill_opacity, attr(node, "fill-opacity")?);
                s.comp_op = enum_attr(node, "comp-op", CompositeOp::from_name)?;
                Symbolizer::Polygon(s)
            }
            "PolygonPatternSymbolizer" => {
                self.check_attributes(node, PATTERN_ATTRS)?;
                required(node, "file")?;
                Symbolizer::PolygonPattern(PolygonPatternSymbolizer {
                    file: self.path_attr(node, "file").unwrap_or_default(),
                    opacity: attr(node, "opacity")?.unwrap_or(1.0),
                    comp_op: enum_attr(node, "comp-op", CompositeOp::from_name)?,
                })
            }
            "PointSymbolizer" => {
                self.check_attributes(node, POINT_ATTRS)?;
                let mut s = PointSymbolizer::default();
                s.file = self.path_attr(node, "file");
                set(&mut s.opacity, attr(node, "opacity")?);
                set(&mut s.allow_overlap, bool_attr(node, "allow-overlap")?);
                set(&mut s.ignore_placement, bool_attr(node, "ignore-placement")?);
                s.comp_op = enum_attr(node, "comp-op", CompositeOp::from_name)?;
                Symbolizer::Point(s)
            }
            "MarkersSymbolizer" => {
                self.check_attributes(node, MARKERS_ATTRS)?;
                let mut s = MarkersSymbolizer::default();
                s.file = self.path_attr(node, "file");
                set(
                    &mut s.marker_type,
                    enum_attr(node, "marker-type", |v| match v {
                        "ellipse" => Some(MarkerType::Ellipse),
                        "arrow" => Some(MarkerType::Arrow),
                        _ => None,
                    })?,
                );
                set(&mut s.width, attr(node, "width")?);
                set(&mut s.height, attr(node, "height")?);
                set(&mut s.fill, attr(node, "fill")?);
                set(&mut s.fill_opacity, attr(node, "fill-opacity")?);
                set(&mut s.stroke, attr(node, "stroke")?);
                set(&mut s.stroke_width, attr(node, "stroke-width")?);
                set(&mut s.stroke_opacity, attr(node, "stroke-opacity")?);
                set(
                    &mut s.placement,
                    enum_attr(node, "placement", |v| match v {
                        "point" => Some(MarkerPlacement::Point),
                        "line" => Some(MarkerPlacement::Line),
                        _ => None,
                    })?,
                );
                set(&mut s.spacing, attr(node, "spacing")?);
                set(&mut s.allow_overlap, bool_attr(node, "allow-overlap")?);
                set(&mut s.ignore_placement, bool_attr(node, "ignore-placement")?);
                s.comp_op = enum_attr(node, "comp-op", CompositeOp::from_name)?;
                Symbolizer::Markers(s)
            }
            "TextSymbolizer" => {
                self.check_attributes(node, TEXT_ATTRS)?;
                // The label expression is either the name attribute or the
                // element content.
                let content = text(node);
                let source = match node.attribute("name") {
                    Some(name) => name.to_string(),
                    None if !content.is_empty() => content,
                    None => {
                        return Err(ParseError::MissingAttribute {
                            element: "TextSymbolizer".into(),
                            attribute: "name".into(),
                        })
                    }
                };
                let name = Expression::parse(&source).map_err(|e| invalid(node, "name", &source, e))?;
                let mut s = TextSymbolizer::new(name);
                if let Some(face) = node.attribute("face-name") {
                    s.face_name = face.to_string();
                }
                set(&mut s.size, attr(node, "size")?);
                set(&mut s.fill, attr(node, "fill")?);
                set(&mut s.opacity, attr(node, "opacity")?);
                set(&mut s.halo_fill, attr(node, "halo-fill")?);
                set(&mut s.halo_radius, attr(node, "halo-radius")?);
                set(
                    &mut s.placement,
                    enum_attr(node, "placement", |v| match v {
                        "point" => Some(TextPlacement::Point),
                        "line" => Some(TextPlacement::Line),
                        _ => None,
                    })?,
                );
                set(&mut s.dx, attr(node, "dx")?);
                set(&mut s.dy, attr(node, "dy")?);
                set(&mut s.allow_overlap, bool_attr(node, "allow-overlap")?);
                set(
                    &mut s.text_transform,
                    enum_attr(node, "text-transform", |v| match v {
                        "none" => Some(TextTransform::None),
                        "uppercase" | "toupper" => Some(TextTransform::Uppercase),
                        "lowercase" | "tolower" => Some(TextTransform::Lowercase),
                        _ => None,
                    })?,
                );
                s.comp_op = enum_attr(node, "comp-op", CompositeOp::from_name)?;
                Symbolizer::Text(s)
            }
            "RasterSymbolizer" => {
                self.check_attributes(node, RASTER_ATTRS)?;
                let mut s = RasterSymbolizer::default();
                set(&mut s.opacity, attr(node, "opacity")?);
                set(
                    &mut s.scaling,
                    enum_attr(node, "scaling", |v| match v {
                        "near" | "fast" => Some(RasterScaling::Near),
                        "bilinear" | "bilinear8" => Some(RasterScaling::Bilinear),
                        _ => None,
                    })?,
                );
                s.comp_op = enum_attr(node, "comp-op", CompositeOp::from_name)?;
                Symbolizer::Raster(s)
            }
            _ => return Ok(None),
        };
        Ok(Some(symbolizer))
    }

    fn parse_layer(&self, map: &Map, node: Node) -> Result<Layer> {
        self.check_attributes(node, LAYER_ATTRS)?;
        let name = node.attribute("name").unwrap_or("Unnamed");
        let srs = node.attribute("srs").unwrap_or(map.srs.as_str());
        Projection::from_srs(srs).map_err(|e| invalid(node, "srs", srs, e))?;
        let mut layer = Layer::new(name).with_srs(srs);
        set(&mut layer.active, bool_attr(node, "status")?);
        set(&mut layer.min_scale, attr(node, "minzoom")?);
        set(&mut layer.max_scale, attr(node, "maxzoom")?);
        set(&mut layer.clear_label_cache, bool_attr(node, "clear-label-cache")?);

        for child in node.children().filter(Node::is_element) {
            match child.tag_name().name() {
                "StyleName" => layer.styles.push(text(child)),
                "Datasource" => {
                    self.check_attributes(child, &["base"])?;
                    let own = self.parse_parameters(child)?;
                    let params = match child.attribute("base") {
                        Some(base) => map
                            .datasource_templates
                            .get(base)
                            .ok_or_else(|| ParseError::UndefinedTemplate(base.to_string()))?
                            .merged(&own),
                        None => own,
                    };
                    let datasource = self.registry.create(&layer.name, &params, &self.base)?;
                    layer.datasource_params = params;
                    layer.set_datasource(datasource);
                }
                _ => self.unknown_element(child, node)?,
            }
        }
        log::debug!(
            "Layer '{}' ({}) styles {:?}",
            layer.name,
            layer.srs,
            layer.styles
        );
        Ok(layer)
    }
}

fn set<T>(slot: &mut T, value: Option<T>) {
    if let Some(v) = value {
        *slot = v;
    }
}

fn invalid(node: Node, attribute: &str, value: &str, message: impl Display) -> ParseError {
    ParseError::InvalidAttribute {
        element: node.tag_name().name().to_string(),
        attribute: attribute.to_string(),
        value: value.to_string(),
        message: message.to_string(),
    }
}

fn required<'a>(node: Node<'a, '_>, name: &str) -> Result<&'a str> {
    node.attribute(name)
        .ok_or_else(|| ParseError::MissingAttribute {
            element: node.tag_name().name().to_string(),
            attribute: name.to_string(),
        })
}

fn attr<T>(node: Node, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
{
    match node.attribute(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| invalid(node, name, raw, e)),
    }
}

fn enum_attr<T>(node: Node, name: &str, parse: impl Fn(&str) -> Option<T>) -> Result<Option<T>> {
    match node.attribute(name) {
        None => Ok(None),
        Some(raw) => parse(raw.trim())
            .map(Some)
            .ok_or_else(|| invalid(node, name, raw, "unrecognised value")),
    }
}

fn bool_attr(node: Node, name: &str) -> Result<Option<bool>> {
    enum_attr(node, name, |v| match v.to_ascii_lowercase().as_str() {
        "true" | "on" | "yes" | "1" => Some(true),
        "false" | "off" | "no" | "0" => Some(false),
        _ => None,
    })
}

fn line_cap(v: &str) -> Option<LineCap> {
    match v {
        "butt" => Some(LineCap::Butt),
        "round" => Some(LineCap::Round),
        "square" => Some(LineCap::Square),
        _ => None,
    }
}

fn line_join(v: &str) -> Option<LineJoin> {
    match v {
        "miter" | "miter-revert" => Some(LineJoin::Miter),
        "round" => Some(LineJoin::Round),
        "bevel" => Some(LineJoin::Bevel),
        _ => None,
    }
}

fn dasharray(raw: &str) -> Option<Vec<f64>> {
    let values: Vec<f64> = raw
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
        .map(|t| t.parse::<f64>().ok().filter(|v| *v >= 0.0))
        .collect::<Option<_>>()?;
    if values.is_empty() || values.iter().all(|v| *v == 0.0) {
        return None;
    }
    Some(values)
}

/// Concatenated text and CDATA content, trimmed.
fn text(node: Node) -> String {
    node.children()
        .filter(|c| c.is_text())
        .filter_map(|c| c.text())
        .collect::<String>()
        .trim()
        .to_string()
}

fn number_text(node: Node) -> Result<f64> {
    let raw = text(node);
    raw.parse::<f64>()
        .map_err(|e| invalid(node, "#text", &raw, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cartograph_core::geometry::Point;

    const POINTS: &str = r#"{"type":"FeatureCollection","features":[
        {"type":"Feature","geometry":{"type":"Point","coordinates":[5,10]},"properties":{"name":"a"}}]}"#;

    fn stylesheet(body: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="utf-8"?>
<Map srs="+proj=longlat +datum=WGS84" background-color="steelblue" buffer-size="16">
{}
</Map>"#,
            body
        )
    }

    fn inline_layer(name: &str, style: &str) -> String {
        format!(
            r#"<Layer name="{}"><StyleName>{}</StyleName>
  <Datasource><Parameter name="type">geojson</Parameter>
  <Parameter name="inline"><![CDATA[{}]]></Parameter></Datasource></Layer>"#,
            name, style, POINTS
        )
    }

    #[test]
    fn test_layers_in_document_order() {
        let xml = stylesheet(&format!(
            r#"<Style name="s"><Rule><PointSymbolizer/></Rule></Style>
            {}{}{}"#,
            inline_layer("first", "s"),
            inline_layer("second", "s"),
            inline_layer("third", "s")
        ));
        let mut map = Map::new(600, 300);
        load_map_string(&mut map, &xml, &LoadOptions::default()).unwrap();
        let names: Vec<&str> = map.layers().iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, ["first", "second", "third"]);
        assert_eq!(map.background, Some(Color::rgb(70, 130, 180)));
        assert_eq!(map.buffer_size, 16);
        assert_eq!(map.layers()[0].envelope(), Some(BBox::new(Point::new(5.0, 10.0), Point::new(5.0, 10.0))));
    }

    #[test]
    fn test_rules_and_symbolizers() {
        let xml = stylesheet(
            r##"<Style name="roads" filter-mode="first" opacity="0.5" comp-op="multiply">
  <Rule name="major">
    <Filter>[type] = 'motorway' or [lanes] &gt;= 4</Filter>
    <MaxScaleDenominator>500000</MaxScaleDenominator>
    <LineSymbolizer stroke="#ff0000" stroke-width="3" stroke-linecap="round" stroke-dasharray="4, 2"/>
  </Rule>
  <Rule><ElseFilter/>
    <PolygonSymbolizer fill="rgba(0,0,0,0.5)"/>
    <TextSymbolizer face-name="DejaVu Sans Bold" size="12" halo-radius="1">[name]</TextSymbolizer>
  </Rule>
</Style>"##,
        );
        let mut map = Map::new(100, 100);
        load_map_string(&mut map, &xml, &LoadOptions::default()).unwrap();
        let style = map.find_style("roads").unwrap();
        assert_eq!(style.filter_mode, FilterMode::First);
        assert_eq!(style.opacity, 0.5);
        assert_eq!(style.comp_op, Some(CompositeOp::Multiply));
        assert_eq!(style.rules.len(), 2);

        let major = &style.rules[0];
        assert!(matches!(major.filter, Filter::Expr(_)));
        assert_eq!(major.max_scale, 500_000.0);
        match &major.symbolizers[0] {
            Symbolizer::Line(l) => {
                assert_eq!(l.stroke, Color::rgb(255, 0, 0));
                assert_eq!(l.stroke_width, 3.0);
                assert_eq!(l.line_cap, LineCap::Round);
                assert_eq!(l.dasharray, vec![4.0, 2.0]);
            }
            other => panic!("expected a line symbolizer, got {:?}", other),
        }

        let fallback = &style.rules[1];
        assert_eq!(fallback.filter, Filter::Else);
        match &fallback.symbolizers[1] {
            Symbolizer::Text(t) => {
                assert_eq!(t.name.source(), "[name]");
                assert_eq!(t.face_name, "DejaVu Sans Bold");
                assert_eq!(t.size, 12.0);
            }
            other => panic!("expected a text symbolizer, got {:?}", other),
        }
    }

    #[test]
    fn test_datasource_templates() {
        let xml = stylesheet(&format!(
            r#"<Datasource name="points"><Parameter name="type">geojson</Parameter>
  <Parameter name="inline"><![CDATA[{}]]></Parameter></Datasource>
<Style name="s"/>
<Layer name="l"><StyleName>s</StyleName><Datasource base="points"/></Layer>"#,
            POINTS
        ));
        let mut map = Map::new(100, 100);
        load_map_string(&mut map, &xml, &LoadOptions::default()).unwrap();
        assert_eq!(map.layers()[0].datasource_params.get("type"), Some("geojson"));
        assert!(map.layers()[0].datasource().is_some());

        let missing = stylesheet(r#"<Layer name="l"><Datasource base="nope"/></Layer>"#);
        let err = load_map_string(&mut Map::new(1, 1), &missing, &LoadOptions::default()).unwrap_err();
        assert!(matches!(err, ParseError::UndefinedTemplate(ref t) if t == "nope"));
    }

    #[test]
    fn test_strict_mode_rejects_unknown_items() {
        let xml = stylesheet(r#"<Style name="s" bogus="1"/><Wibble/>"#);
        let mut map = Map::new(100, 100);
        load_map_string(&mut map, &xml, &LoadOptions::default()).unwrap();
        assert!(map.find_style("s").is_some());

        let strict = LoadOptions {
            strict: true,
            ..Default::default()
        };
        let err = load_map_string(&mut Map::new(100, 100), &xml, &strict).unwrap_err();
        assert!(matches!(err, ParseError::UnknownAttribute { .. } | ParseError::UnknownElement { .. }));
    }

    #[test]
    fn test_reference_errors() {
        let undefined = stylesheet(&inline_layer("l", "missing"));
        let err = load_map_string(&mut Map::new(1, 1), &undefined, &LoadOptions::default()).unwrap_err();
        assert!(matches!(err, ParseError::UndefinedStyle { ref style, .. } if style == "missing"));

        let dup = stylesheet(r#"<Style name="a"/><Style name="a"/>"#);
        let err = load_map_string(&mut Map::new(1, 1), &dup, &LoadOptions::default()).unwrap_err();
        assert!(matches!(err, ParseError::DuplicateStyle(ref s) if s == "a"));

        let bad_type = stylesheet(r#"<Layer name="l"><Datasource><Parameter name="type">shape</Parameter></Datasource></Layer>"#);
        let err = load_map_string(&mut Map::new(1, 1), &bad_type, &LoadOptions::default()).unwrap_err();
        assert!(matches!(err, ParseError::UnknownDatasourceType(_)));

        let bad_filter = stylesheet(r#"<Style name="s"><Rule name="r"><Filter>[a] = </Filter></Rule></Style>"#);
        let err = load_map_string(&mut Map::new(1, 1), &bad_filter, &LoadOptions::default()).unwrap_err();
        assert!(matches!(err, ParseError::Filter { ref rule, .. } if rule == "r"));
    }

    #[test]
    fn test_malformed_documents() {
        let mut map = Map::new(1, 1);
        assert!(matches!(
            load_map_string(&mut map, "<Map><Style></Map>", &LoadOptions::default()),
            Err(ParseError::Xml(_))
        ));
        assert!(matches!(
            load_map_string(&mut map, "<Stylesheet/>", &LoadOptions::default()),
            Err(ParseError::NotAMap(_))
        ));
        let bad_color = stylesheet(r#"<Style name="s"><Rule><PolygonSymbolizer fill="notacolor"/></Rule></Style>"#);
        assert!(matches!(
            load_map_string(&mut map, &bad_color, &LoadOptions::default()),
            Err(ParseError::InvalidAttribute { ref attribute, .. }) if attribute == "fill"
        ));
    }

    #[test]
    fn test_failed_load_leaves_map_untouched() {
        let mut map = Map::new(10, 10);
        map.add_style(Style::new("existing"));
        let xml = stylesheet(r#"<Style name="new"/><Style name="existing"/>"#);
        assert!(load_map_string(&mut map, &xml, &LoadOptions::default()).is_err());
        assert_eq!(map.styles().len(), 1);
        assert!(map.background.is_none());
    }

    #[test]
    fn test_load_file_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("data")).unwrap();
        fs::write(dir.path().join("data/cities.csv"), "name,x,y\nA,1,2\nB,3,4\n").unwrap();
        let xml = stylesheet(
            r#"<Style name="s"><Rule><PointSymbolizer file="icons/pin.png"/></Rule></Style>
<Layer name="cities"><StyleName>s</StyleName>
  <Datasource><Parameter name="type">csv</Parameter><Parameter name="file">data/cities.csv</Parameter></Datasource>
</Layer>"#,
        );
        let path = dir.path().join("map.xml");
        fs::write(&path, xml).unwrap();

        let mut map = Map::new(600, 300);
        load_map(&mut map, &path, &LoadOptions::default()).unwrap();
        assert_eq!(map.layers()[0].envelope(), Some(BBox::from_coords(1.0, 2.0, 3.0, 4.0)));
        match &map.find_style("s").unwrap().rules[0].symbolizers[0] {
            Symbolizer::Point(p) => assert_eq!(p.file, Some(dir.path().join("icons/pin.png"))),
            other => panic!("expected a point symbolizer, got {:?}", other),
        }

        let err = load_map(&mut map, dir.path().join("absent.xml"), &LoadOptions::default()).unwrap_err();
        assert!(matches!(err, ParseError::Io { .. }));
    }

    #[test]
    fn test_layer_attributes() {
        let xml = stylesheet(
            r#"<Style name="s"/>
<Layer name="l" status="off" minzoom="1000" maxzoom="50000" clear-label-cache="on" srs="epsg:3857"><StyleName>s</StyleName></Layer>
<Layer><StyleName>s</StyleName></Layer>"#,
        );
        let mut map = Map::new(1, 1);
        load_map_string(&mut map, &xml, &LoadOptions::default()).unwrap();
        let l = &map.layers()[0];
        assert!(!l.active);
        assert_eq!((l.min_scale, l.max_scale), (1000.0, 50_000.0));
        assert!(l.clear_label_cache);
        assert_eq!(l.projection().unwrap(), Projection::WebMercator);
        let unnamed = &map.layers()[1];
        assert_eq!(unnamed.name, "Unnamed");
        assert_eq!(unnamed.srs, map.srs);
    }
}
