//! Replicate registry (`read_groups.info`) and per-track replicate rows
//! (`*.read_group_tracking`).

use std::collections::BTreeSet;
use std::path::Path;

use crate::domain::ExperimentId;
use crate::error::CuffError;
use crate::keys::{replicate_name, synth_key, synth_replicate_key, try_synth_key};
use crate::record::{FieldType, Record, coerce};
use crate::schema::{REP_PK, REPLICATE_DATA_FIELDS, SAMPLE_PK, TRACKING_ID, TrackSchema};
use crate::tsv::{Row, TsvReader};

const CONDITION: &str = "condition";
const REPLICATE: &str = "replicate";
const REPLICATE_NUM: &str = "replicate_num";
const FILE: &str = "file";

/// One line of `read_groups.info`.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplicateEntry {
    pub condition: String,
    pub replicate: i64,
    pub file_name: Option<String>,
    pub total_mass: Option<f64>,
    pub norm_mass: Option<f64>,
    pub internal_scale: Option<f64>,
    pub external_scale: Option<f64>,
}

impl ReplicateEntry {
    pub fn name(&self) -> String {
        replicate_name(&self.condition, self.replicate)
    }

    pub fn key(&self, experiment: ExperimentId) -> String {
        synth_replicate_key(&self.condition, self.replicate, experiment)
    }

    /// Storage row, without the sample reference.
    pub fn to_record(&self, experiment: ExperimentId) -> Record {
        let mut record = Record::new()
            .with(REP_PK, self.key(experiment))
            .with("rep_name", self.name())
            .with("replicate", self.replicate);
        if let Some(file_name) = &self.file_name {
            record.insert("file_name", file_name.as_str());
        }
        let masses = [
            ("total_mass", self.total_mass),
            ("norm_mass", self.norm_mass),
            ("internal_scale", self.internal_scale),
            ("external_scale", self.external_scale),
        ];
        for (field, value) in masses {
            if let Some(value) = value {
                record.insert(field, value);
            }
        }
        record
    }
}

fn real(row: &Row, column: &str) -> Option<f64> {
    row.get(column)
        .and_then(|raw| coerce(FieldType::Real, raw))
        .and_then(|value| value.as_f64())
}

/// Reads `read_groups.info`. Lines without a condition or with an
/// unparseable replicate number are skipped with a warning.
pub fn read_replicates(path: &Path) -> Result<Vec<ReplicateEntry>, CuffError> {
    let mut reader = TsvReader::open(path)?;
    reader.require_column(CONDITION)?;
    reader.require_column(REPLICATE_NUM)?;

    let mut entries = Vec::new();
    for row in reader.rows() {
        let row = row?;
        let condition = row.get(CONDITION).map(str::trim).unwrap_or_default();
        if condition.is_empty() {
            tracing::warn!(line = row.line, "replicate without condition skipped");
            continue;
        }
        let Some(replicate) = row
            .get(REPLICATE_NUM)
            .and_then(|raw| raw.trim().parse::<i64>().ok())
        else {
            tracing::warn!(line = row.line, condition, "unparseable replicate_num, skipped");
            continue;
        };
        entries.push(ReplicateEntry {
            condition: condition.to_string(),
            replicate,
            file_name: row
                .get(FILE)
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string),
            total_mass: real(&row, "total_mass"),
            norm_mass: real(&row, "norm_mass"),
            internal_scale: real(&row, "internal_scale"),
            external_scale: real(&row, "external_scale"),
        });
    }
    Ok(entries)
}

/// Conditions in first-seen order, without duplicates.
pub fn conditions(entries: &[ReplicateEntry]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    entries
        .iter()
        .filter(|entry| seen.insert(entry.condition.as_str()))
        .map(|entry| entry.condition.clone())
        .collect()
}

/// Builds replicate measurement rows from a read group tracking file.
pub struct ReplicateRowBuilder<'a> {
    track: &'static TrackSchema,
    samples: &'a [String],
    replicates: &'a BTreeSet<String>,
    experiment: ExperimentId,
}

impl<'a> ReplicateRowBuilder<'a> {
    /// `replicates` holds the registered replicate keys of the experiment.
    pub fn new(
        track: &'static TrackSchema,
        samples: &'a [String],
        replicates: &'a BTreeSet<String>,
        experiment: ExperimentId,
    ) -> Self {
        Self {
            track,
            samples,
            replicates,
            experiment,
        }
    }

    pub fn build(&self, row: &Row) -> Result<Record, CuffError> {
        let tracking_id = row
            .get(TRACKING_ID)
            .ok_or_else(|| CuffError::InvalidIdentifier(format!("missing {TRACKING_ID}")))?;
        let mut record = Record::new();
        record.insert(self.track.key_column, try_synth_key(tracking_id, self.experiment)?);

        for (column, raw) in row.iter() {
            if column == TRACKING_ID || column == CONDITION {
                continue;
            }
            let name = column.to_ascii_lowercase();
            let Some(field) = REPLICATE_DATA_FIELDS.iter().find(|field| field.name == name) else {
                continue;
            };
            if let Some(value) = coerce(field.ty, raw) {
                record.insert(field.name, value);
            }
        }

        let Some(condition) = row.get(CONDITION).map(str::trim) else {
            return Ok(record);
        };
        if !self.samples.iter().any(|sample| sample == condition) {
            tracing::debug!(condition, line = row.line, "unknown condition, references dropped");
            return Ok(record);
        }
        record.insert(SAMPLE_PK, synth_key(condition, self.experiment));

        if let Some(replicate) = row
            .get(REPLICATE)
            .and_then(|raw| raw.trim().parse::<i64>().ok())
        {
            let key = synth_replicate_key(condition, replicate, self.experiment);
            if self.replicates.contains(&key) {
                record.insert(REP_PK, key);
            }
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TrackKind;
    use crate::schema::track_schema;

    #[test]
    fn reads_read_groups_info() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("read_groups.info");
        std::fs::write(
            &path,
            "file\tcondition\treplicate_num\ttotal_mass\tnorm_mass\tinternal_scale\texternal_scale\n\
             ctrl_0.bam\tctrl\t0\t100\t90\t1.1\t1\n\
             ctrl_1.bam\tctrl\tx\t100\t90\t1.1\t1\n\
             treat_0.bam\ttreat\t0\t120\t-\t0.9\t1\n",
        )
        .unwrap();
        let entries = read_replicates(&path).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].name(), "treat_0");
        assert_eq!(entries[1].norm_mass, None);
        assert_eq!(conditions(&entries), vec!["ctrl".to_string(), "treat".to_string()]);

        let record = entries[0].to_record(ExperimentId::new(3));
        assert_eq!(record.get_str(REP_PK), Some("ctrl_0-exp-3"));
        assert_eq!(record.get_str("file_name"), Some("ctrl_0.bam"));
    }

    #[test]
    fn replicate_row_references() {
        let samples = vec!["ctrl".to_string()];
        let replicates: BTreeSet<String> = ["ctrl_0-exp-1".to_string()].into();
        let builder = ReplicateRowBuilder::new(
            track_schema(TrackKind::Gene),
            &samples,
            &replicates,
            ExperimentId::new(1),
        );
        let row = Row::from_pairs(&[
            ("tracking_id", "XLOC_1"),
            ("condition", "ctrl"),
            ("replicate", "0"),
            ("raw_frags", "12"),
            ("FPKM", "4.5"),
            ("status", "OK"),
        ]);
        let record = builder.build(&row).unwrap();
        assert_eq!(record.get_str("gene_pk"), Some("XLOC_1-exp-1"));
        assert_eq!(record.get_str(SAMPLE_PK), Some("ctrl-exp-1"));
        assert_eq!(record.get_str(REP_PK), Some("ctrl_0-exp-1"));
        assert_eq!(record.get_f64("fpkm"), Some(4.5));
        assert_eq!(record.get_i64("replicate"), Some(0));

        let row = Row::from_pairs(&[
            ("tracking_id", "XLOC_1"),
            ("condition", "ctrl"),
            ("replicate", "7"),
        ]);
        let record = builder.build(&row).unwrap();
        assert!(record.contains(SAMPLE_PK));
        assert!(!record.contains(REP_PK));
    }
}
