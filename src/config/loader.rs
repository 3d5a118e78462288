// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{RawSettings, Settings};
use crate::errors::Result;
use crate::types::BackendKind;

/// Command-line values that take precedence over the settings file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub staging: Option<PathBuf>,
    pub publication: Option<PathBuf>,
    pub archive: Option<PathBuf>,
    pub status_root: Option<PathBuf>,
    pub catalog: Option<PathBuf>,
    pub graph: Option<PathBuf>,
    pub index: Option<PathBuf>,
    pub backend: Option<BackendKind>,
    pub workers: Option<usize>,
    pub serial: bool,
    pub strict: bool,
    /// Replace, not extend, the file's `run.dataset_ids`.
    pub dataset_ids: Vec<String>,
}

impl Overrides {
    pub fn apply(&self, raw: &mut RawSettings) {
        let paths = &mut raw.paths;
        for (slot, value) in [
            (&mut paths.staging, &self.staging),
            (&mut paths.publication, &self.publication),
            (&mut paths.archive, &self.archive),
            (&mut paths.status_root, &self.status_root),
            (&mut paths.catalog, &self.catalog),
            (&mut paths.graph, &self.graph),
            (&mut paths.index, &self.index),
        ] {
            if value.is_some() {
                slot.clone_from(value);
            }
        }
        if let Some(backend) = self.backend {
            raw.scheduler.backend = backend;
        }
        if self.workers.is_some() {
            raw.run.workers = self.workers;
        }
        raw.run.serial |= self.serial;
        raw.run.strict |= self.strict;
        if !self.dataset_ids.is_empty() {
            raw.run.dataset_ids.clone_from(&self.dataset_ids);
        }
    }
}

/// Deserialize a settings file without semantic checks.
///
/// Relative paths inside the file are resolved against the file's own
/// directory.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawSettings> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;
    let mut raw: RawSettings = toml::from_str(&contents)?;
    anchor_paths(&mut raw, &config_root_dir(path));
    Ok(raw)
}

/// Load the settings file (if it exists), apply CLI overrides, validate.
///
/// A missing file is only acceptable when it is the default path; the
/// command line must then supply every required path.
pub fn load_settings(path: impl AsRef<Path>, explicit: bool, overrides: &Overrides) -> Result<Settings> {
    let path = path.as_ref();
    let mut raw = if explicit || path.exists() {
        load_from_path(path)?
    } else {
        RawSettings::default()
    };
    overrides.apply(&mut raw);
    Settings::try_from(raw)
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("warehouse.toml")
}

/// Directory that relative settings paths are anchored to.
fn config_root_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn anchor_paths(raw: &mut RawSettings, base: &Path) {
    let p = &mut raw.paths;
    for slot in [
        &mut p.staging,
        &mut p.publication,
        &mut p.archive,
        &mut p.status_root,
        &mut p.scripts,
        &mut p.catalog,
        &mut p.graph,
        &mut p.index,
    ] {
        if let Some(path) = slot.as_mut() {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }
    if let Some(dir) = raw.scheduler.output_dir.as_mut() {
        if dir.is_relative() {
            *dir = base.join(&*dir);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_overrides_win_over_file_values() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("warehouse.toml");
        fs::write(
            &path,
            r#"
[paths]
staging = "staging"
publication = "/p"
archive = "/a"
status_root = "status"
catalog = "catalog.toml"
graph = "graph.toml"

[run]
dataset_ids = ["E3SM.*"]
"#,
        )
        .unwrap();

        let overrides = Overrides {
            publication: Some(PathBuf::from("/override/pub")),
            dataset_ids: vec!["CMIP6.*".to_string()],
            strict: true,
            ..Default::default()
        };
        let settings = load_settings(&path, true, &overrides).unwrap();
        assert_eq!(settings.roots.staging, tmp.path().join("staging"));
        assert_eq!(settings.roots.publication, PathBuf::from("/override/pub"));
        assert_eq!(settings.run.dataset_filters, vec!["CMIP6.*".to_string()]);
        assert!(settings.run.strict);
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nope.toml");
        assert!(load_settings(&path, true, &Overrides::default()).is_err());
    }
}
