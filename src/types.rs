use std::str::FromStr;
use serde::Deserialize;

/// Which scheduler adapter submits wrapper scripts.
///
/// - `Slurm`: `sbatch` / `squeue` / `scancel` on a cluster login node
///   (default).
/// - `Local`: run each wrapper under `sh` on this host, for workstation
///   runs and demos.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Slurm,
    Local,
}

impl Default for BackendKind {
    fn default() -> Self {
        BackendKind::Slurm
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "slurm" => Ok(BackendKind::Slurm),
            "local" => Ok(BackendKind::Local),
            other => Err(format!(
                "invalid scheduler backend: {other} (expected \"slurm\" or \"local\")"
            )),
        }
    }
}
