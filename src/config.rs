//! Configuration of the converter.

use std::fs;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use serde::Deserialize;
use thiserror::Error;
use crate::class::LayerTable;
use crate::error::Error;
use crate::names::{default_categories, NameCategory};
use crate::projection::{BoundingBox, Dimension, InvalidBoundingBoxError};
use crate::render::RenderOptions;
use crate::render::label::LabelStyle;
use crate::scalebar::ScaleBarStyle;


//------------ MapConfig -----------------------------------------------------

/// The converter configuration.
#[derive(Clone, Debug, Deserialize)]
pub struct MapConfig {
    /// The directory where the OSM exports live.
    #[serde(default = "default_osm_dir")]
    pub osm_dir: PathBuf,

    /// The directory where results are written to.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// The projects by name.
    #[serde(default)]
    pub projects: HashMap<String, Project>,

    #[serde(default)]
    pub render: RenderOptions,

    #[serde(default)]
    pub scale_bar: ScaleBarStyle,

    /// The layers in priority order.
    #[serde(default)]
    pub layers: LayerTable,

    /// The definitions of the name categories.
    #[serde(default = "default_categories")]
    pub name_groups: Vec<NameCategory>,

    /// The name categories to extract. All if empty.
    #[serde(default)]
    pub name_categories: Vec<String>,

    #[serde(default)]
    pub labels: LabelStyle,
}

fn default_osm_dir() -> PathBuf {
    "osm".into()
}

fn default_output_dir() -> PathBuf {
    "res".into()
}

impl MapConfig {
    /// Loads the configuration from a TOML file.
    ///
    /// Relative paths are resolved against the directory of the file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let data = fs::read_to_string(path).map_err(|err| {
            Error::io(path, err)
        })?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new(""));
        Self::from_toml(&data, base_dir).map_err(|source| {
            Error::ConfigFormat { path: path.into(), source }
        })
    }

    /// Parses the configuration from a string.
    pub fn from_toml(
        data: &str, base_dir: &Path
    ) -> Result<Self, toml::de::Error> {
        let mut res: Self = toml::from_str(data)?;
        res.prepare(base_dir);
        Ok(res)
    }

    fn prepare(&mut self, base_dir: &Path) {
        self.osm_dir = base_dir.join(&self.osm_dir);
        self.output_dir = base_dir.join(&self.output_dir);
        self.projects.values_mut().for_each(|project| {
            project.prepare(base_dir)
        });
    }

    pub fn project(&self, name: &str) -> Result<&Project, ConfigError> {
        self.projects.get(name).ok_or_else(|| {
            ConfigError::UnknownProject(name.into())
        })
    }

    /// Returns the path of a project’s OSM export.
    pub fn osm_path(&self, name: &str) -> Result<PathBuf, ConfigError> {
        let project = self.project(name)?;
        Ok(match project.osm {
            Some(ref path) => path.clone(),
            None => self.osm_dir.join(format!("{}.osm", name)),
        })
    }

    /// Returns the output directory for a project.
    pub fn project_dir(&self, name: &str, suffix: &str) -> PathBuf {
        self.output_dir.join(format!("{}{}", name, suffix))
    }
}


//------------ Project -------------------------------------------------------

/// A single drawing to produce.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Project {
    /// The bounding box as north, west, east, south.
    ///
    /// If missing, the bounds of the export are used.
    pub nwes: Option<[f64; 4]>,

    pub width_cm: Option<f64>,
    pub height_cm: Option<f64>,

    /// The OSM export if not in the default location.
    pub osm: Option<PathBuf>,
}

impl Project {
    fn prepare(&mut self, base_dir: &Path) {
        if let Some(osm) = self.osm.as_mut() {
            *osm = base_dir.join(&*osm);
        }
    }

    /// Returns the requested drawing size in millimetres.
    pub fn dimension(&self) -> Result<Dimension, ConfigError> {
        match (self.width_cm, self.height_cm) {
            (Some(width), None) => Ok(Dimension::Width(width * 10.)),
            (None, Some(height)) => Ok(Dimension::Height(height * 10.)),
            (Some(_), Some(_)) => Err(ConfigError::DimensionConflict),
            (None, None) => Err(ConfigError::DimensionMissing),
        }
    }

    /// Returns the bounding box, falling back to the export’s bounds.
    pub fn bounding_box(
        &self, fallback: Option<BoundingBox>
    ) -> Result<BoundingBox, Error> {
        match self.nwes {
            Some(nwes) => {
                BoundingBox::from_nwes(nwes).map_err(Error::BoundingBox)
            }
            None => {
                match fallback {
                    Some(bbox) => {
                        tracing::info!("using bounds of the export: {}", bbox);
                        Ok(bbox)
                    }
                    None => Err(ConfigError::MissingBounds.into())
                }
            }
        }
    }

    /// Checks the bounding box without an export.
    pub fn check_bounding_box(&self) -> Result<(), InvalidBoundingBoxError> {
        match self.nwes {
            Some(nwes) => BoundingBox::from_nwes(nwes).map(|_| ()),
            None => Ok(())
        }
    }
}


//------------ ConfigError ---------------------------------------------------

#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    #[error("unknown project '{0}'")]
    UnknownProject(String),

    #[error("either width_cm or height_cm must be given")]
    DimensionMissing,

    #[error("only one of width_cm and height_cm may be given")]
    DimensionConflict,

    #[error("no bounding box configured and none found in the export")]
    MissingBounds,
}


//============ Tests =========================================================

#[cfg(test)]
mod test {
    use super::*;
    use crate::class::LayerKind;

    #[test]
    fn load_config() {
        let config = MapConfig::from_toml(r##"
            osm_dir = "data"
            name_categories = ["Streets/Roads"]

            [projects.montpellier]
            nwes = [43.62, 3.86, 3.89, 43.60]
            width_cm = 30

            [projects.sete]
            height_cm = 20.5
            osm = "other/sete.osm"

            [render]
            seed = 7
            frame = "#ff0000"

            [[layers]]
            name = "buildings"
            match = [{ key = "building" }]
            style = { fill = "#cccccc" }

            [[layers]]
            name = "roads"
            kind = "line"
            match = [{ key = "highway", value = ["primary", "secondary"] }]
        "##, Path::new("/base")).unwrap();

        assert_eq!(config.osm_dir, Path::new("/base/data"));
        assert_eq!(config.output_dir, Path::new("/base/res"));
        assert_eq!(config.render.seed, 7);
        assert!(config.render.frame.is_some());
        assert_eq!(config.layers.len(), 2);
        assert_eq!(config.layers.get(1).unwrap().kind, LayerKind::Line);
        assert_eq!(config.name_groups.len(), default_categories().len());

        let project = config.project("montpellier").unwrap();
        assert_eq!(project.dimension(), Ok(Dimension::Width(300.)));
        let bbox = project.bounding_box(None).unwrap();
        assert_eq!(bbox.north(), 43.62);
        assert_eq!(
            config.osm_path("montpellier").unwrap(),
            Path::new("/base/data/montpellier.osm")
        );

        let project = config.project("sete").unwrap();
        assert_eq!(project.dimension(), Ok(Dimension::Height(205.)));
        assert!(project.bounding_box(None).is_err());
        assert_eq!(
            config.osm_path("sete").unwrap(),
            Path::new("/base/other/sete.osm")
        );
        assert_eq!(
            config.project("nowhere").unwrap_err(),
            ConfigError::UnknownProject("nowhere".into())
        );
    }

    #[test]
    fn dimension_must_be_unique() {
        let project = Project {
            width_cm: Some(10.), height_cm: Some(10.), .. Default::default()
        };
        assert_eq!(project.dimension(), Err(ConfigError::DimensionConflict));
        let project = Project::default();
        assert_eq!(project.dimension(), Err(ConfigError::DimensionMissing));
    }

    #[test]
    fn defaults_without_layers() {
        let config = MapConfig::from_toml("", Path::new("")).unwrap();
        assert_eq!(config.layers, LayerTable::default());
        assert!(config.projects.is_empty());
        assert_eq!(config.render, RenderOptions::default());
    }
}
