//! Processing a project from export to output files.
//!
//! Everything is computed in memory first and collected into
//! [`Outputs`]. Files are only written once the whole project has been
//! processed successfully.

use std::fs;
use std::collections::HashSet;
use std::path::PathBuf;
use crate::config::{MapConfig, Project};
use crate::error::Error;
use crate::import::{self, OsmData};
use crate::names::{self, NameListing, Selection};
use crate::path::{self, BuiltMap};
use crate::projection::{ProjectionScale, ScaleReport};
use crate::render::MapDrawing;
use crate::render::label;
use crate::scalebar::ScaleBar;


//------------ Converted -----------------------------------------------------

/// The drawings of a project.
#[derive(Clone, Debug)]
pub struct Converted {
    pub scale: ProjectionScale,
    pub map: BuiltMap,
    pub drawing: MapDrawing,
    pub scale_bar: ScaleBar,
}

impl Converted {
    pub fn report(&self) -> ScaleReport {
        self.scale.report()
    }
}

/// Converts the features of a project into drawings.
pub fn convert(
    config: &MapConfig, project: &Project, data: &OsmData
) -> Result<Converted, Error> {
    let dimension = project.dimension()?;
    let bbox = project.bounding_box(data.bounds)?;
    let scale = ProjectionScale::new(bbox, dimension)?;
    let map = path::build(&config.layers, &scale, &data.features);
    let drawing = MapDrawing::render(&map, &config.layers, &config.render);
    let scale_bar = ScaleBar::for_style(&scale, &config.scale_bar);
    Ok(Converted { scale, map, drawing, scale_bar })
}


//------------ ConvertOptions ------------------------------------------------

#[derive(Clone, Debug, Default)]
pub struct ConvertOptions {
    /// Also produce the name listing and name drawings.
    pub names: bool,

    /// Appended to the project name for the output directory.
    pub suffix: String,

    /// Log every extracted name.
    pub print_names: bool,
}


//------------ Outputs -------------------------------------------------------

/// The files produced by a run.
#[derive(Clone, Debug, Default)]
pub struct Outputs {
    files: Vec<(PathBuf, String)>,
}

impl Outputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, path: PathBuf, content: impl Into<String>) {
        self.files.push((path, content.into()))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Writes all files, creating directories as necessary.
    pub fn write(self) -> Result<(), Error> {
        for (path, content) in self.files {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).map_err(|err| {
                    Error::io(parent, err)
                })?;
            }
            fs::write(&path, content).map_err(|err| Error::io(&path, err))?;
            tracing::debug!("wrote {}", path.display());
        }
        Ok(())
    }
}


//------------ Running Projects ----------------------------------------------

/// Loads the export of a project after checking its configuration.
fn load_project<'a>(
    config: &'a MapConfig, name: &str
) -> Result<(&'a Project, OsmData), Error> {
    let project = config.project(name)?;
    project.dimension()?;
    project.check_bounding_box()?;
    let osm_path = config.osm_path(name)?;
    tracing::info!("reading {}", osm_path.display());
    let data = import::load(&osm_path)?;
    if !data.errors.is_empty() {
        tracing::warn!(
            "{} malformed features were dropped", data.errors.len()
        );
    }
    tracing::info!("{} features read", data.features.len());
    Ok((project, data))
}

/// Produces all outputs of the convert command.
pub fn plan_convert(
    config: &MapConfig, name: &str, options: &ConvertOptions
) -> Result<Outputs, Error> {
    let (project, data) = load_project(config, name)?;
    let converted = convert(config, project, &data)?;
    converted.report().log();
    tracing::info!("scale bar: {}", converted.scale_bar);

    let dir = config.project_dir(name, &options.suffix);
    let main = converted.drawing.document().to_string();
    let mut res = Outputs::new();
    res.add(dir.join(format!("{}.svg", name)), main.as_str());
    res.add(
        dir.join(format!("{}_scale_bar.svg", name)),
        converted.scale_bar.render(&config.scale_bar).to_string()
    );

    if options.names {
        let entries = names::extract(
            &data.features, &converted.scale,
            &config.name_groups, &config.name_categories,
        );
        names::log_names_by_category(&entries, options.print_names);
        let names_dir = dir.join("names");
        let individual_dir = names_dir.join("individual_maps");
        let mut used = HashSet::new();
        for entry in &entries {
            let stem = unique_stem(&entry.name, &mut used);
            res.add(
                individual_dir.join(format!("{}.svg", stem)),
                label::overlay(
                    &converted.drawing, &[entry.label()], &config.labels
                ).to_string()
            );
        }
        res.add(
            names_dir.join("name_positions.toml"),
            NameListing::new(entries).to_toml()?
        );
        res.add(names_dir.join("map_no_names.svg"), main);
    }
    Ok(res)
}

pub fn run_convert(
    config: &MapConfig, name: &str, options: &ConvertOptions
) -> Result<(), Error> {
    let outputs = plan_convert(config, name, options)?;
    tracing::info!(
        "writing {} files to {}",
        outputs.len(),
        config.project_dir(name, &options.suffix).display()
    );
    outputs.write()
}

/// Produces all outputs of the select command.
pub fn plan_select(
    config: &MapConfig, name: &str, suffix: &str
) -> Result<Outputs, Error> {
    let names_dir = config.project_dir(name, suffix).join("names");
    let listing_path = names_dir.join("name_positions.toml");
    let listing = fs::read_to_string(&listing_path).map_err(|err| {
        Error::io(&listing_path, err)
    })?;
    let curated = NameListing::from_toml(&listing).map_err(|source| {
        Error::Listing { path: listing_path.clone(), source }
    })?;

    let (project, data) = load_project(config, name)?;
    let converted = convert(config, project, &data)?;
    let extracted = names::extract(
        &data.features, &converted.scale,
        &config.name_groups, &config.name_categories,
    );
    let selection = select_names(&extracted, &curated);

    let mut res = Outputs::new();
    res.add(
        names_dir.join("map_selected_names.svg"),
        label::overlay(
            &converted.drawing, &selection.labels(), &config.labels
        ).to_string()
    );
    res.add(names_dir.join("selected_names.txt"), selection.name_list());
    Ok(res)
}

pub fn run_select(
    config: &MapConfig, name: &str, suffix: &str
) -> Result<(), Error> {
    plan_select(config, name, suffix)?.write()
}

fn select_names(
    extracted: &[names::NameEntry], curated: &NameListing
) -> Selection {
    let selection = names::select(extracted, &curated.entries);
    for warning in &selection.warnings {
        tracing::warn!("{}", warning);
    }
    tracing::info!(
        "{} of {} names selected",
        selection.retained.len(), curated.entries.len()
    );
    selection
}

/// Returns a file name for a name, unique among those already used.
///
/// Characters that cannot appear in file names are replaced and clashing
/// names get underscores appended.
fn unique_stem(name: &str, used: &mut HashSet<String>) -> String {
    let mut stem: String = name.chars().map(|ch| {
        if ch.is_control() || "/\\:*?\"<>|".contains(ch) { '_' }
        else { ch }
    }).collect();
    while !used.insert(stem.clone()) {
        tracing::warn!("duplicate file name for '{}'", name);
        stem.push('_');
    }
    stem
}


//============ Tests =========================================================

#[cfg(test)]
mod test {
    use super::*;
    use std::path::Path;
    use crate::import::osm::read_str;
    use crate::projection::InvalidBoundingBoxError;

    fn config() -> MapConfig {
        MapConfig::from_toml(r#"
            [projects.town]
            nwes = [0.01, 0.0, 0.01, 0.0]
            width_cm = 20

            [projects.inverted]
            nwes = [0.0, 0.0, 0.01, 0.01]
            width_cm = 20
        "#, Path::new("/out")).unwrap()
    }

    const EXPORT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
        <osm version="0.6">
          <node id="1" lat="0.002" lon="0.002"/>
          <node id="2" lat="0.008" lon="0.008"/>
          <node id="3" lat="0.005" lon="0.005">
            <tag k="name" v="Place A"/>
            <tag k="place" v="square"/>
          </node>
          <way id="10">
            <nd ref="1"/><nd ref="2"/>
            <tag k="highway" v="primary"/>
          </way>
        </osm>"#;

    #[test]
    fn convert_in_memory() {
        let config = config();
        let data = read_str(EXPORT).unwrap();
        let converted = convert(
            &config, config.project("town").unwrap(), &data
        ).unwrap();
        assert_eq!(converted.drawing.width_mm(), 200.);
        let roads = config.layers.iter().position(|layer| {
            layer.name == "major_roads"
        }).unwrap();
        assert_eq!(converted.map.layer(roads).unwrap().paths.len(), 1);
    }

    #[test]
    fn inverted_box_fails() {
        let config = config();
        let data = read_str(EXPORT).unwrap();
        let err = convert(
            &config, config.project("inverted").unwrap(), &data
        ).unwrap_err();
        assert!(matches!(
            err, Error::BoundingBox(InvalidBoundingBoxError::Latitude { .. })
        ));
    }

    #[test]
    fn unique_stems() {
        let mut used = HashSet::new();
        assert_eq!(unique_stem("Rue A", &mut used), "Rue A");
        assert_eq!(unique_stem("Rue A", &mut used), "Rue A_");
        assert_eq!(unique_stem("Rue A", &mut used), "Rue A__");
        assert_eq!(unique_stem("Quai: Nord", &mut used), "Quai_ Nord");
    }
}
