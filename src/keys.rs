//! Composite key synthesis.
//!
//! Every track, sample and replicate row is stored under a single text key
//! made of its natural identifier and the owning experiment id. Import and
//! query code both go through these functions so the two can never disagree
//! on the format.

use crate::domain::ExperimentId;
use crate::error::CuffError;
use crate::record::NA;

pub const SEPARATOR: &str = "-exp-";

/// Key for a track or sample: `{natural_id}-exp-{experiment_id}`.
pub fn synth_key(natural_id: &str, experiment: ExperimentId) -> String {
    format!("{natural_id}{SEPARATOR}{experiment}")
}

/// Key for a replicate: `{sample}_{replicate}-exp-{experiment_id}`.
pub fn synth_replicate_key(sample_name: &str, replicate: i64, experiment: ExperimentId) -> String {
    synth_key(&replicate_name(sample_name, replicate), experiment)
}

/// Display name of a replicate, `{sample}_{replicate}`.
pub fn replicate_name(sample_name: &str, replicate: i64) -> String {
    format!("{sample_name}_{replicate}")
}

/// Splits a synthesized key back into its natural id and experiment id.
pub fn split_key(key: &str) -> Option<(&str, ExperimentId)> {
    let (natural, experiment) = key.rsplit_once(SEPARATOR)?;
    let experiment = experiment.parse::<i64>().ok()?;
    Some((natural, ExperimentId::new(experiment)))
}

/// Checks that a natural id can take part in a key.
pub fn validate_natural_id(value: &str) -> Result<&str, CuffError> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed == NA || trimmed.contains(SEPARATOR) {
        return Err(CuffError::InvalidIdentifier(value.to_string()));
    }
    Ok(trimmed)
}

/// Validates `natural_id` and synthesizes its key.
pub fn try_synth_key(natural_id: &str, experiment: ExperimentId) -> Result<String, CuffError> {
    validate_natural_id(natural_id).map(|id| synth_key(id, experiment))
}
