use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cartograph_core::datasource::{Datasource, Parameters};
use cartograph_core::error::{Error, Result};

use crate::error::ParseError;

/// Builds a datasource from its parameters. The path is the directory
/// relative file parameters resolve against.
pub type DatasourceFactory =
    Box<dyn Fn(&Parameters, &Path) -> Result<Arc<dyn Datasource>> + Send + Sync>;

/// Maps datasource `type` names to factories.
pub struct DatasourceRegistry {
    factories: BTreeMap<String, DatasourceFactory>,
}

impl DatasourceRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// A registry with the `geojson`, `csv` and `raster` plugins.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("geojson", crate::geojson::create);
        registry.register("csv", crate::csv::create);
        registry.register("raster", crate::raster::create);
        registry
    }

    /// Register a factory, replacing any previous one with the same name.
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&Parameters, &Path) -> Result<Arc<dyn Datasource>> + Send + Sync + 'static,
    {
        self.factories.insert(name.to_string(), Box::new(factory));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Bind the datasource described by `params` for `layer`.
    pub fn create(
        &self,
        layer: &str,
        params: &Parameters,
        base: &Path,
    ) -> std::result::Result<Arc<dyn Datasource>, ParseError> {
        let kind = params
            .get("type")
            .ok_or_else(|| ParseError::MissingDatasourceType(layer.to_string()))?;
        let factory = self
            .factories
            .get(kind)
            .ok_or_else(|| ParseError::UnknownDatasourceType(kind.to_string()))?;
        log::debug!("Binding {} datasource for layer '{}'", kind, layer);
        factory(params, base).map_err(|source| ParseError::Datasource {
            layer: layer.to_string(),
            source,
        })
    }
}

impl Default for DatasourceRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl fmt::Debug for DatasourceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatasourceRegistry")
            .field("types", &self.names())
            .finish()
    }
}

/// Resolve `file` against `base` unless it is absolute.
pub fn resolve_path(base: &Path, file: &str) -> PathBuf {
    let path = Path::new(file);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// The `inline` parameter, or the contents of the `file` parameter.
pub(crate) fn read_source(params: &Parameters, base: &Path) -> Result<String> {
    if let Some(inline) = params.get("inline") {
        return Ok(inline.to_string());
    }
    let file = params
        .get("file")
        .ok_or_else(|| Error::Datasource("either 'file' or 'inline' is required".into()))?;
    let path = resolve_path(base, file);
    fs::read_to_string(&path)
        .map_err(|e| Error::Datasource(format!("cannot read '{}': {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cartograph_core::datasource::MemoryDatasource;

    #[test]
    fn test_builtins_registered() {
        let registry = DatasourceRegistry::default();
        assert_eq!(registry.names(), vec!["csv", "geojson", "raster"]);
        assert!(!registry.contains("shape"));
    }

    #[test]
    fn test_create_errors() {
        let registry = DatasourceRegistry::with_builtins();
        let base = Path::new(".");
        let err = registry.create("l", &Parameters::new(), base).unwrap_err();
        assert!(matches!(err, ParseError::MissingDatasourceType(ref l) if l == "l"));
        let err = registry
            .create("l", &Parameters::new().with("type", "postgis"), base)
            .unwrap_err();
        assert!(matches!(err, ParseError::UnknownDatasourceType(ref t) if t == "postgis"));
        let err = registry
            .create("l", &Parameters::new().with("type", "geojson").with("file", "missing.json"), base)
            .unwrap_err();
        assert!(matches!(err, ParseError::Datasource { .. }));
    }

    #[test]
    fn test_custom_factory() {
        let mut registry = DatasourceRegistry::new();
        registry.register("memory", |_params: &Parameters, _base: &Path| {
            let ds: Arc<dyn Datasource> = Arc::new(MemoryDatasource::new(Vec::new()));
            Ok(ds)
        });
        let ds = registry
            .create("l", &Parameters::new().with("type", "memory"), Path::new("."))
            .unwrap();
        assert_eq!(ds.name(), "memory");
    }

    #[test]
    fn test_resolve_path() {
        assert_eq!(
            resolve_path(Path::new("/data/styles"), "shapes/world.json"),
            PathBuf::from("/data/styles/shapes/world.json")
        );
        assert_eq!(
            resolve_path(Path::new("/data"), "/abs/file.csv"),
            PathBuf::from("/abs/file.csv")
        );
    }
}
