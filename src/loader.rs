//! Field data sources.
//!
//! The engine itself never parses files. A [`FieldSource`] produces a ready
//! [`WindFieldDescriptor`]; [`ImageFieldLoader`] reads the common layout of a
//! PNG whose red and green channels hold `u` and `v`, plus a JSON sidecar with
//! the quantization bounds:
//!
//! ```json
//! { "width": 360, "height": 180, "uMin": -21.32, "uMax": 26.8, "vMin": -21.57, "vMax": 21.42 }
//! ```

use std::path::{Path, PathBuf};

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::{Result, WindError};
use crate::field::{VelocityBounds, WindFieldDescriptor};

/// Anything that can produce a wind field.
pub trait FieldSource {
    fn load(&self) -> Result<WindFieldDescriptor>;
}

impl FieldSource for WindFieldDescriptor {
    fn load(&self) -> Result<WindFieldDescriptor> {
        Ok(self.clone())
    }
}

/// JSON sidecar describing a field image. Unknown keys (source, date, ...)
/// are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMetadata {
    pub width: u32,
    pub height: u32,
    #[serde(flatten)]
    pub bounds: VelocityBounds,
}

impl FieldMetadata {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_json_str(&std::fs::read_to_string(path)?)
    }
}

/// Loads a field from a PNG image and its JSON metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFieldLoader {
    pub image_path: PathBuf,
    pub metadata_path: PathBuf,
}

impl ImageFieldLoader {
    pub fn new(image_path: impl Into<PathBuf>, metadata_path: impl Into<PathBuf>) -> Self {
        Self {
            image_path: image_path.into(),
            metadata_path: metadata_path.into(),
        }
    }

    /// Use `<stem>.json` next to `<stem>.png`.
    pub fn from_image_path(image_path: impl Into<PathBuf>) -> Self {
        let image_path = image_path.into();
        let metadata_path = image_path.with_extension("json");
        Self {
            image_path,
            metadata_path,
        }
    }
}

impl FieldSource for ImageFieldLoader {
    fn load(&self) -> Result<WindFieldDescriptor> {
        let metadata = FieldMetadata::from_file(&self.metadata_path)?;
        let img = image::open(&self.image_path)?.to_rgba8();
        let (width, height) = img.dimensions();

        if (width, height) != (metadata.width, metadata.height) {
            return Err(WindError::InvalidField(format!(
                "{} is {}x{} but metadata says {}x{}",
                self.image_path.display(),
                width,
                height,
                metadata.width,
                metadata.height
            )));
        }

        info!("loaded wind field {} ({}x{})", self.image_path.display(), width, height);
        WindFieldDescriptor::new(width, height, metadata.bounds, img.into_raw())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    const METADATA: &str = r#"{
        "source": "http://nomads.ncep.noaa.gov",
        "date": "2016-11-20T00:00Z",
        "width": 4,
        "height": 2,
        "uMin": -21.32,
        "uMax": 26.8,
        "vMin": -21.57,
        "vMax": 21.42
    }"#;

    #[test]
    fn test_metadata_ignores_extra_keys() {
        let meta = FieldMetadata::from_json_str(METADATA).unwrap();
        assert_eq!((meta.width, meta.height), (4, 2));
        let expected = VelocityBounds::new(-21.32, 26.8, -21.57, 21.42);
        assert!((meta.bounds.min() - expected.min()).abs().max_element() < 1e-5);
        assert!((meta.bounds.max() - expected.max()).abs().max_element() < 1e-5);
    }

    #[test]
    fn test_load_png_with_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let png = dir.path().join("wind.png");
        std::fs::write(dir.path().join("wind.json"), METADATA).unwrap();

        let mut img = RgbaImage::new(4, 2);
        img.put_pixel(1, 0, Rgba([255, 0, 0, 255]));
        img.save(&png).unwrap();

        let field = ImageFieldLoader::from_image_path(&png).load().unwrap();
        assert_eq!((field.width(), field.height()), (4, 2));
        assert_eq!(field.image().len(), 4 * 2 * 4);
        assert_eq!(&field.image()[4..8], &[255, 0, 0, 255]);
        assert!((field.velocity_at_texel(1, 0).x - 26.8).abs() < 1e-4);
    }

    #[test]
    fn test_size_mismatch_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let png = dir.path().join("small.png");
        let json = dir.path().join("small.json");
        RgbaImage::new(2, 2).save(&png).unwrap();
        std::fs::write(&json, METADATA).unwrap();

        let err = ImageFieldLoader::new(&png, &json).load().unwrap_err();
        assert!(matches!(err, WindError::InvalidField(_)));
    }

    #[test]
    fn test_missing_files_report_io() {
        let loader = ImageFieldLoader::new("/nonexistent/wind.png", "/nonexistent/wind.json");
        assert!(matches!(loader.load(), Err(WindError::Io(_))));
    }
}
