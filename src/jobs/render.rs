// src/jobs/render.rs

//! `{placeholder}` command templates for job kinds.
//!
//! Recognised placeholders:
//!
//! | placeholder     | value                                              |
//! |-----------------|----------------------------------------------------|
//! | `{dataset_id}`  | target dataset id                                  |
//! | `{input:<key>}` | dataset filling requirement slot `<key>`           |
//! | `{start}`       | first year from the catalog                        |
//! | `{end}`         | last year from the catalog                         |
//! | `{variables}`   | comma-joined time-series variables                 |
//! | `{staging}`     | latest staging version dir, else the working dir   |
//! | `{publication}` | latest publication version dir, else the base dir  |
//! | `{archive}`     | latest archive version dir, else the base dir      |
//! | `{job}`         | job kind name                                      |
//! | `{namespace}`   | workflow namespace of the job                      |

use std::path::PathBuf;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::dataset::storage::facet_path;
use crate::dataset::{Dataset, StorageRoots};
use crate::errors::{Result, WarehouseError};
use crate::jobs::WorkflowJob;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([a-z_]+)(?::([^}]+))?\}").expect("static regex"));

pub struct RenderContext<'a> {
    pub job: &'a WorkflowJob,
    pub target: &'a Dataset,
    pub roots: &'a StorageRoots,
}

impl RenderContext<'_> {
    fn value(&self, name: &str, arg: Option<&str>) -> Result<String> {
        let id = &self.target.id;
        let missing = |what: &str| {
            WarehouseError::Configuration(format!(
                "template for {} uses {{{name}}} but dataset {id} has no {what}",
                self.job.kind
            ))
        };

        let value = match (name, arg) {
            ("dataset_id", None) => id.to_string(),
            ("job", None) => self.job.kind.to_string(),
            ("namespace", None) => self.job.namespace.clone(),
            ("start", None) => self.target.start_year.ok_or_else(|| missing("start year"))?.to_string(),
            ("end", None) => self.target.end_year.ok_or_else(|| missing("end year"))?.to_string(),
            ("variables", None) => self.target.variables.join(","),
            ("staging", None) => path_or(&self.target.locations.staging, || self.roots.working_dir(id)),
            ("publication", None) => path_or(&self.target.locations.publication, || {
                self.roots.publication.join(facet_path(id))
            }),
            ("archive", None) => path_or(&self.target.locations.archive, || {
                self.roots.archive.join(facet_path(id))
            }),
            ("input", Some(key)) => self
                .job
                .input(key)
                .ok_or_else(|| missing(&format!("input for slot '{key}'")))?
                .to_string(),
            _ => {
                return Err(WarehouseError::Configuration(format!(
                    "unknown placeholder {{{name}{}}} in template for {}",
                    arg.map(|a| format!(":{a}")).unwrap_or_default(),
                    self.job.kind
                )));
            }
        };
        Ok(value)
    }
}

fn path_or(found: &Option<PathBuf>, fallback: impl FnOnce() -> PathBuf) -> String {
    found
        .clone()
        .unwrap_or_else(fallback)
        .display()
        .to_string()
}

/// Fill every placeholder in `template`. The first unknown or unfillable
/// placeholder aborts rendering.
pub fn render_command(template: &str, ctx: &RenderContext<'_>) -> Result<String> {
    let mut first_error = None;
    let rendered = PLACEHOLDER.replace_all(template, |caps: &Captures<'_>| {
        let name = caps.get(1).map_or("", |m| m.as_str());
        let arg = caps.get(2).map(|m| m.as_str());
        match ctx.value(name, arg) {
            Ok(v) => v,
            Err(e) => {
                first_error.get_or_insert(e);
                String::new()
            }
        }
    });
    match first_error {
        Some(e) => Err(e),
        None => Ok(rendered.into_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{DatasetId, StorageLocations};
    use crate::jobs::JobKind;

    fn roots() -> StorageRoots {
        StorageRoots {
            staging: PathBuf::from("/staging"),
            publication: PathBuf::from("/pub"),
            archive: PathBuf::from("/archive"),
        }
    }

    fn target() -> Dataset {
        let id = DatasetId::parse("E3SM.1_0.piControl.LR.atmos.180x360.climo.mon.ens1").unwrap();
        let mut ds = Dataset::synthesized(id, StorageLocations::default());
        ds.start_year = Some(1850);
        ds.end_year = Some(1869);
        ds
    }

    #[test]
    fn fills_known_placeholders() {
        let ds = target();
        let companion =
            DatasetId::parse("E3SM.1_0.piControl.LR.atmos.native.model-output.mon.ens1").unwrap();
        let mut job = WorkflowJob::new(JobKind::ClimoGen, "POSTPROCESS", ds.id.clone());
        job.fill("*-native-mon", companion);
        let roots = roots();
        let ctx = RenderContext { job: &job, target: &ds, roots: &roots };

        let out = render_command("climo --in {input:*-native-mon} --years {start}-{end} --out {staging}", &ctx).unwrap();
        assert_eq!(
            out,
            "climo --in E3SM.1_0.piControl.LR.atmos.native.model-output.mon.ens1 --years 1850-1869 \
             --out /staging/E3SM/1_0/piControl/LR/atmos/180x360/climo/mon/ens1"
        );
    }

    #[test]
    fn unknown_placeholder_is_a_configuration_error() {
        let ds = target();
        let job = WorkflowJob::new(JobKind::ClimoGen, "POSTPROCESS", ds.id.clone());
        let roots = roots();
        let ctx = RenderContext { job: &job, target: &ds, roots: &roots };
        let err = render_command("run {nope}", &ctx).unwrap_err();
        assert!(matches!(err, WarehouseError::Configuration(_)));
    }
}
