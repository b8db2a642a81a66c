//! Pipeline configuration.
//!
//! Every field has a default, so a configuration file only needs to name the
//! values it changes:
//!
//! ```json
//! { "trim_z": 1.0, "landmark_count": 478, "mask": { "inside": 255, "outside": 0 } }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::landmarks::FACE_MESH_LANDMARKS;
use crate::raster::MaskValues;

/// Depth floor applied by default, as a fraction of the deepest centered vertex.
pub const DEFAULT_TRIM_Z: f64 = 0.875;

/// Settings shared by every extraction in a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Marker values used inside raster masks.
    pub mask: MaskValues,

    /// Colour of keypoint markers when a rendered marker image is supplied.
    pub marker_color: [u8; 3],

    /// Center vertex positions on the origin before writing.
    pub center: bool,

    /// Depth trim factor in (0, 1]; 1.0 disables trimming.
    /// Defaults to [`DEFAULT_TRIM_Z`].
    pub trim_z: f64,

    /// Landmark count the provider must return, if fixed.
    pub landmark_count: Option<usize>,

    /// Root of the contour index table.
    pub contours: PathBuf,

    /// `name index` file of keypoint anchors; built-in anchors when unset.
    pub keypoints: Option<PathBuf>,

    /// `name index` file of metric-point anchors.
    pub metric_points: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            mask: MaskValues::default(),
            marker_color: [255, 0, 0],
            center: true,
            trim_z: DEFAULT_TRIM_Z,
            landmark_count: Some(FACE_MESH_LANDMARKS),
            contours: PathBuf::from("contours"),
            keypoints: None,
            metric_points: None,
        }
    }
}

impl PipelineConfig {
    /// Load a JSON configuration file and validate it.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.mask.inside == self.mask.outside {
            return Err(Error::InvalidConfig(format!(
                "mask inside and outside values are both {}",
                self.mask.inside
            )));
        }
        if !(self.trim_z > 0.0 && self.trim_z <= 1.0) {
            return Err(Error::InvalidConfig(format!(
                "trim_z must lie in (0, 1], got {}",
                self.trim_z
            )));
        }
        if self.landmark_count == Some(0) {
            return Err(Error::InvalidConfig("landmark_count must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = PipelineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.landmark_count, Some(478));
        assert!(config.center);
        assert_eq!(config.trim_z, 0.875);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{ "trim_z": 1.0, "landmark_count": null }"#).unwrap();
        assert_eq!(config.trim_z, 1.0);
        assert_eq!(config.landmark_count, None);
        assert_eq!(config.mask, MaskValues::default());
        assert_eq!(config.contours, PathBuf::from("contours"));
    }

    #[test]
    fn rejects_invalid_values() {
        let mut config = PipelineConfig::default();
        config.trim_z = 1.5;
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

        let mut config = PipelineConfig::default();
        config.mask = MaskValues { inside: 1, outside: 1 };
        assert!(config.validate().is_err());
    }

    #[test]
    fn loads_from_file() {
        let path = std::env::temp_dir().join(format!("face_submesh_config_{}.json", std::process::id()));
        fs::write(&path, r#"{ "center": false, "marker_color": [0, 0, 255] }"#).unwrap();
        let config = PipelineConfig::load(&path).unwrap();
        assert!(!config.center);
        assert_eq!(config.marker_color, [0, 0, 255]);
        fs::remove_file(path).ok();
    }
}
