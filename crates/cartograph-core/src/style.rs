use serde::{Deserialize, Serialize};

use crate::expression::Expression;
use crate::feature::Feature;
use crate::symbolizer::{CompositeOp, Symbolizer};

/// Upper scale bound used when a rule or layer sets none.
pub const MAX_SCALE_DENOMINATOR: f64 = 1e100;

/// How the rules of a style combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum FilterMode {
    /// Every matching rule fires.
    #[default]
    All,
    /// Evaluation stops at the first matching rule.
    First,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub enum Filter {
    /// No filter: the rule matches every feature.
    #[default]
    Always,
    Expr(Expression),
    /// Fires only when no ordinary rule of the style matched.
    Else,
    /// Fires only when at least one ordinary rule matched.
    Also,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub name: String,
    pub filter: Filter,
    pub min_scale: f64,
    pub max_scale: f64,
    pub symbolizers: Vec<Symbolizer>,
}

impl Default for Rule {
    fn default() -> Self {
        Self {
            name: String::new(),
            filter: Filter::Always,
            min_scale: 0.0,
            max_scale: MAX_SCALE_DENOMINATOR,
            symbolizers: Vec::new(),
        }
    }
}

impl Rule {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_symbolizer(mut self, symbolizer: Symbolizer) -> Self {
        self.symbolizers.push(symbolizer);
        self
    }

    pub fn active(&self, scale_denominator: f64) -> bool {
        self.min_scale <= scale_denominator && scale_denominator < self.max_scale
    }

    /// True for ordinary rules whose filter accepts the feature.
    /// `Else` and `Also` rules never match here.
    pub fn matches(&self, feature: &Feature) -> bool {
        match &self.filter {
            Filter::Always => true,
            Filter::Expr(e) => e.matches(feature),
            Filter::Else | Filter::Also => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Style {
    pub name: String,
    pub filter_mode: FilterMode,
    pub opacity: f64,
    pub comp_op: Option<CompositeOp>,
    pub rules: Vec<Rule>,
}

impl Style {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            filter_mode: FilterMode::All,
            opacity: 1.0,
            comp_op: None,
            rules: Vec::new(),
        }
    }

    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Whether this style must be rendered to its own surface and
    /// composited afterwards.
    pub fn needs_offscreen(&self) -> bool {
        self.opacity < 1.0 || self.comp_op.is_some()
    }

    /// The rules that fire for `feature` at the given scale, in document
    /// order, following filter-mode, else and also semantics.
    pub fn matching_rules<'a>(&'a self, feature: &Feature, scale_denominator: f64) -> Vec<&'a Rule> {
        let mut fired = Vec::new();
        let mut matched = false;
        for rule in self.rules.iter().filter(|r| r.active(scale_denominator)) {
            if rule.matches(feature) {
                matched = true;
                fired.push(rule);
                if self.filter_mode == FilterMode::First {
                    break;
                }
            }
        }
        let wanted = |f: &Filter| match f {
            Filter::Else => !matched,
            Filter::Also => matched,
            _ => false,
        };
        fired.extend(
            self.rules
                .iter()
                .filter(|r| r.active(scale_denominator) && wanted(&r.filter)),
        );
        fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbolizer::{LineSymbolizer, PolygonSymbolizer};

    fn expr(src: &str) -> Filter {
        Filter::Expr(Expression::parse(src).unwrap())
    }

    fn sample_style(mode: FilterMode) -> Style {
        let mut style = Style::new("roads")
            .with_rule(Rule::new("big").with_filter(expr("[lanes] >= 4")))
            .with_rule(Rule::new("any").with_filter(expr("[lanes] >= 1")))
            .with_rule(Rule::new("fallback").with_filter(Filter::Else))
            .with_rule(Rule::new("extra").with_filter(Filter::Also));
        style.filter_mode = mode;
        style
    }

    fn names(rules: &[&Rule]) -> Vec<String> {
        rules.iter().map(|r| r.name.clone()).collect()
    }

    #[test]
    fn test_all_mode_fires_every_match() {
        let style = sample_style(FilterMode::All);
        let f = Feature::new(1).with_attribute("lanes", 6i64);
        assert_eq!(names(&style.matching_rules(&f, 1000.0)), ["big", "any", "extra"]);
    }

    #[test]
    fn test_first_mode_stops_at_first_match() {
        let style = sample_style(FilterMode::First);
        let f = Feature::new(1).with_attribute("lanes", 6i64);
        assert_eq!(names(&style.matching_rules(&f, 1000.0)), ["big", "extra"]);
    }

    #[test]
    fn test_else_fires_without_match() {
        let style = sample_style(FilterMode::All);
        let f = Feature::new(1).with_attribute("lanes", 0i64);
        assert_eq!(names(&style.matching_rules(&f, 1000.0)), ["fallback"]);
    }

    #[test]
    fn test_scale_range_filters_rules() {
        let mut rule = Rule::new("zoomed")
            .with_symbolizer(Symbolizer::Line(LineSymbolizer::default()))
            .with_symbolizer(Symbolizer::Polygon(PolygonSymbolizer::default()));
        rule.min_scale = 100.0;
        rule.max_scale = 5000.0;
        assert!(rule.active(100.0));
        assert!(!rule.active(5000.0));
        assert!(!rule.active(50.0));
        let style = Style::new("s").with_rule(rule);
        assert!(style.matching_rules(&Feature::new(1), 1e6).is_empty());
        assert_eq!(style.matching_rules(&Feature::new(1), 1000.0).len(), 1);
    }
}
