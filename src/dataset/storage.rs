// src/dataset/storage.rs

//! Storage-root layout: `<root>/<facet path>/<vN>/`.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::trace;

use crate::dataset::id::DatasetId;
use crate::fs::FileSystem;

static VERSION_DIR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^v(\d+)(?:\.(\d+))?$").expect("static regex"));

/// The three roots every dataset may live under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageRoots {
    pub staging: PathBuf,
    pub publication: PathBuf,
    pub archive: PathBuf,
}

/// Latest populated version directory under each root, if any.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageLocations {
    pub staging: Option<PathBuf>,
    pub publication: Option<PathBuf>,
    pub archive: Option<PathBuf>,
}

impl StorageLocations {
    /// Whether any root holds a populated version directory.
    pub fn is_populated(&self) -> bool {
        self.staging.is_some() || self.publication.is_some() || self.archive.is_some()
    }
}

impl StorageRoots {
    /// `<staging>/<facet path>`: the dataset's working directory.
    pub fn working_dir(&self, id: &DatasetId) -> PathBuf {
        self.staging.join(facet_path(id))
    }

    pub fn resolve(&self, fs: &dyn FileSystem, id: &DatasetId) -> StorageLocations {
        StorageLocations {
            staging: latest_version_dir(fs, &self.staging, id),
            publication: latest_version_dir(fs, &self.publication, id),
            archive: latest_version_dir(fs, &self.archive, id),
        }
    }
}

/// Dataset id with `.` replaced by path separators.
pub fn facet_path(id: &DatasetId) -> PathBuf {
    id.as_str().split('.').collect()
}

/// `vN` → `(N, 0)`, `vN.M` → `(N, M)`.
pub fn parse_version(name: &str) -> Option<(u64, u64)> {
    let caps = VERSION_DIR.captures(name)?;
    let major = caps.get(1)?.as_str().parse().ok()?;
    let minor = match caps.get(2) {
        Some(m) => m.as_str().parse().ok()?,
        None => 0,
    };
    Some((major, minor))
}

/// Numerically highest version directory that contains at least one file.
pub fn latest_version_dir(fs: &dyn FileSystem, root: &Path, id: &DatasetId) -> Option<PathBuf> {
    let base = root.join(facet_path(id));
    if !fs.is_dir(&base) {
        return None;
    }

    let mut versions: Vec<((u64, u64), PathBuf)> = fs
        .read_dir(&base)
        .ok()?
        .into_iter()
        .filter(|p| fs.is_dir(p))
        .filter_map(|p| {
            let v = parse_version(p.file_name()?.to_str()?)?;
            Some((v, p))
        })
        .collect();
    versions.sort_by(|a, b| b.0.cmp(&a.0));

    let found = versions
        .into_iter()
        .map(|(_, p)| p)
        .find(|dir| has_file(fs, dir));
    trace!(base = ?base, found = ?found, "resolved version directory");
    found
}

fn has_file(fs: &dyn FileSystem, dir: &Path) -> bool {
    fs.read_dir(dir)
        .map(|entries| entries.iter().any(|p| fs.is_file(p)))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;

    fn id() -> DatasetId {
        DatasetId::parse("E3SM.1_0.historical.LR.atmos.native.model-output.mon.ens1").unwrap()
    }

    #[test]
    fn version_names() {
        assert_eq!(parse_version("v2"), Some((2, 0)));
        assert_eq!(parse_version("v10.3"), Some((10, 3)));
        assert_eq!(parse_version("v1.a"), None);
        assert_eq!(parse_version("latest"), None);
    }

    #[test]
    fn highest_populated_version_wins() {
        let fs = MockFileSystem::new();
        let base = Path::new("/pub").join(facet_path(&id()));
        fs.add_file(base.join("v2/a.nc"), "x");
        fs.add_file(base.join("v10/b.nc"), "x");
        fs.add_dir(base.join("v11"));
        fs.add_file(base.join("v9.5/c.nc"), "x");

        assert_eq!(
            latest_version_dir(&fs, Path::new("/pub"), &id()),
            Some(base.join("v10"))
        );
        assert_eq!(latest_version_dir(&fs, Path::new("/staging"), &id()), None);
    }
}
