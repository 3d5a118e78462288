// src/dataset/companion.rs

//! Pure mapping from a derived (or post-processed) dataset to the native
//! model-output dataset its jobs read from.

use tracing::debug;

use crate::dataset::id::{DatasetId, Encoding, ensemble_index, normalize_model_version};

/// CMIP table → (native realm, frequency).
const TABLES: &[(&str, &str, &str)] = &[
    ("Amon", "atmos", "mon"),
    ("AERmon", "atmos", "mon"),
    ("CFmon", "atmos", "mon"),
    ("day", "atmos", "day"),
    ("3hr", "atmos", "3hr"),
    ("6hrLev", "atmos", "6hr"),
    ("6hrPlev", "atmos", "6hr"),
    ("fx", "atmos", "fixed"),
    ("Lmon", "land", "mon"),
    ("LImon", "land", "mon"),
    ("Omon", "ocean", "mon"),
    ("Ofx", "ocean", "fixed"),
    ("SImon", "sea-ice", "mon"),
];

/// (source prefix, CMIP experiment, native experiment). First match wins.
const EXPERIMENT_REMAPS: &[(&str, &str, &str)] = &[
    ("E3SM-1-1", "historical", "hist-BDRD"),
    ("E3SM-1-1", "hist-bgc", "hist-BCRC"),
    ("E3SM-1-1", "ssp585", "ssp585-BDRD"),
    ("E3SM-1-1", "ssp585-bgc", "ssp585-BCRC"),
];

/// Normalized model version → native grid resolution facet.
const RESOLUTIONS: &[(&str, &str)] = &[
    ("1_0", "1deg_atm_60-30km_ocean"),
    ("1_1", "1deg_atm_60-30km_ocean"),
    ("1_1_ECA", "1deg_atm_60-30km_ocean"),
    ("1_2", "1deg_atm_60-30km_ocean"),
    ("2_0", "LR"),
    ("2_1", "LR"),
];

const NATIVE_PROJECT: &str = "E3SM";
const NATIVE_GRID: &str = "native";
const NATIVE_DATA_TYPE: &str = "model-output";

pub fn table_realm_freq(table: &str) -> Option<(&'static str, &'static str)> {
    TABLES
        .iter()
        .find(|(t, _, _)| *t == table)
        .map(|(_, realm, freq)| (*realm, *freq))
}

/// Native experiment name for a CMIP `(source, experiment)` pair.
pub fn remap_experiment(source: &str, experiment: &str) -> String {
    EXPERIMENT_REMAPS
        .iter()
        .find(|(prefix, cmip, _)| source.starts_with(prefix) && *cmip == experiment)
        .map(|(_, _, native)| native.to_string())
        .unwrap_or_else(|| experiment.to_string())
}

fn resolution_for(model_version: &str) -> Option<&'static str> {
    RESOLUTIONS
        .iter()
        .find(|(v, _)| *v == model_version)
        .map(|(_, r)| *r)
}

/// The companion native model-output dataset, or `None` when no mapping is
/// defined (unknown model version, unparseable ensemble, or the dataset is
/// already native model output).
pub fn companion_native_id(id: &DatasetId) -> Option<DatasetId> {
    companion_from_declared(id, None)
}

/// Like [`companion_native_id`], but a derived dataset whose catalog entry
/// declares its native `(model version, experiment)` uses that pair instead
/// of the built-in remap table.
pub fn companion_from_declared(
    id: &DatasetId,
    declared: Option<(String, String)>,
) -> Option<DatasetId> {
    let f = id.facets();
    let raw = match id.encoding() {
        Encoding::Derived { .. } => {
            let (model_version, experiment) = declared.unwrap_or_else(|| {
                (
                    f.model_version.clone(),
                    remap_experiment(&f.model_version, &f.experiment),
                )
            });
            let model_version = normalize_model_version(&model_version);
            let resolution = resolution_for(&model_version)?;
            let ensemble = format!("ens{}", ensemble_index(&f.ensemble)?);
            // Fixed fields are taken from the monthly output.
            let freq = if f.freq == "fixed" { "mon" } else { f.freq.as_str() };
            format!(
                "{NATIVE_PROJECT}.{model_version}.{experiment}.{resolution}.{}.{NATIVE_GRID}.{NATIVE_DATA_TYPE}.{freq}.{ensemble}",
                f.realm
            )
        }
        Encoding::Native { resolution } if id.is_postprocessed_type() => format!(
            "{}.{}.{}.{resolution}.{}.{NATIVE_GRID}.{NATIVE_DATA_TYPE}.{}.{}",
            f.project, f.model_version, f.experiment, f.realm, f.freq, f.ensemble
        ),
        Encoding::Native { .. } => return None,
    };

    let companion = DatasetId::parse(&raw).ok();
    debug!(dataset = %id, companion = ?companion.as_ref().map(|c| c.as_str()), "companion mapping");
    companion
}
