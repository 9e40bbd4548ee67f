use std::path::Path;
use std::sync::Arc;

use cartograph_core::datasource::{Datasource, MemoryDatasource, Parameters};
use cartograph_core::error::{Error, Result};
use cartograph_core::feature::{Feature, ImageData, RasterData};
use cartograph_core::geometry::BBox;

use crate::registry::resolve_path;

/// Bind a `type="raster"` datasource: one georeferenced image given by
/// `file` and either `extent` or `lox`, `loy`, `hix`, `hiy`.
pub fn create(params: &Parameters, base: &Path) -> Result<Arc<dyn Datasource>> {
    let file = params
        .get("file")
        .ok_or_else(|| Error::Datasource("raster datasource requires 'file'".into()))?;
    let extent = raster_extent(params)?;
    let image = load_image(&resolve_path(base, file))?;
    log::debug!(
        "Raster {} ({}x{}) covering {:?}",
        file,
        image.width(),
        image.height(),
        extent
    );
    let feature = Feature::new(1).with_raster(RasterData { extent, image });
    Ok(Arc::new(MemoryDatasource::with_name("raster", vec![feature])))
}

fn raster_extent(params: &Parameters) -> Result<BBox> {
    if let Some(raw) = params.get("extent") {
        return BBox::parse(raw)
            .ok_or_else(|| Error::Datasource(format!("invalid raster extent '{}'", raw)));
    }
    let corner = |key: &str| -> Result<f64> {
        params
            .get_parsed::<f64>(key)?
            .ok_or_else(|| Error::Datasource(format!("raster datasource requires '{}'", key)))
    };
    let extent = BBox::from_coords(corner("lox")?, corner("loy")?, corner("hix")?, corner("hiy")?);
    if extent.is_degenerate() {
        return Err(Error::Datasource(format!("raster extent {:?} is empty", extent)));
    }
    Ok(extent)
}

/// Decode an image file into straight RGBA.
pub fn load_image(path: &Path) -> Result<ImageData> {
    let decoded = image::open(path)
        .map_err(|e| Error::Datasource(format!("cannot decode '{}': {}", path.display(), e)))?
        .to_rgba8();
    let (width, height) = decoded.dimensions();
    ImageData::new(width, height, decoded.into_raw())
        .ok_or_else(|| Error::Datasource(format!("bad pixel buffer in '{}'", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cartograph_core::datasource::{DatasourceKind, Query};

    fn write_png(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("tile.png");
        let img = image::RgbaImage::from_pixel(4, 2, image::Rgba([10, 20, 30, 255]));
        img.save(&path).unwrap();
        path
    }

    #[test]
    fn test_raster_from_corners() {
        let dir = tempfile::tempdir().unwrap();
        write_png(dir.path());
        let params = Parameters::new()
            .with("type", "raster")
            .with("file", "tile.png")
            .with("lox", "-10")
            .with("loy", "-5")
            .with("hix", "10")
            .with("hiy", "5");
        let ds = create(&params, dir.path()).unwrap();
        assert_eq!(ds.kind(), DatasourceKind::Raster);
        assert_eq!(ds.envelope(), Some(BBox::from_coords(-10.0, -5.0, 10.0, 5.0)));
        let features = ds.features(&Query::new(BBox::from_coords(0.0, 0.0, 1.0, 1.0))).unwrap();
        let raster = features[0].raster.as_ref().unwrap();
        assert_eq!((raster.image.width(), raster.image.height()), (4, 2));
        assert_eq!(raster.image.pixel(3, 1), Some([10, 20, 30, 255]));
    }

    #[test]
    fn test_raster_extent_param_and_errors() {
        let dir = tempfile::tempdir().unwrap();
        let abs = write_png(dir.path());
        let params = Parameters::new()
            .with("file", abs.to_str().unwrap())
            .with("extent", "0,0,8,4");
        assert!(create(&params, Path::new("/nonexistent")).is_ok());

        let missing_corner = Parameters::new().with("file", "tile.png").with("lox", "0");
        assert!(create(&missing_corner, dir.path()).is_err());
        let missing_file = Parameters::new().with("file", "nope.png").with("extent", "0,0,1,1");
        assert!(create(&missing_file, dir.path()).is_err());
    }
}
