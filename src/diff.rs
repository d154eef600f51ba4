//! Differential records from `*_exp.diff` and the distribution-level
//! `promoters.diff`, `splicing.diff` and `cds.diff` files.

use crate::domain::ExperimentId;
use crate::error::CuffError;
use crate::keys::{synth_key, try_synth_key};
use crate::record::{Record, coerce};
use crate::schema::{Entity, Field, SAMPLE_1_PK, SAMPLE_2_PK, TEST_ID, TrackSchema};
use crate::tsv::Row;

const JS_DIST: &str = "js_dist";
const LOG2_FOLD_CHANGE: &str = "log2_fold_change";

pub struct DiffBuilder<'a> {
    entity: Entity,
    parent: &'static TrackSchema,
    samples: &'a [String],
    experiment: ExperimentId,
}

impl<'a> DiffBuilder<'a> {
    /// `parent` is the track the rows are keyed to: the diff's own track for
    /// expression diffs, gene or TSS group for distribution diffs.
    pub fn new(
        entity: Entity,
        parent: &'static TrackSchema,
        samples: &'a [String],
        experiment: ExperimentId,
    ) -> Self {
        Self {
            entity,
            parent,
            samples,
            experiment,
        }
    }

    pub fn entity(&self) -> Entity {
        self.entity
    }

    fn vocabulary_field(&self, name: &str) -> Option<&'static Field> {
        self.entity.fields().iter().find(|field| field.name == name)
    }

    fn sample_key(&self, column: &str, value: &str, line: u64) -> Option<String> {
        let name = value.trim();
        if self.samples.iter().any(|known| known == name) {
            return Some(synth_key(name, self.experiment));
        }
        tracing::debug!(column, sample = name, line, "unknown sample, reference dropped");
        None
    }

    pub fn build(&self, row: &Row) -> Result<Record, CuffError> {
        let test_id = row
            .get(TEST_ID)
            .ok_or_else(|| CuffError::InvalidIdentifier(format!("missing {TEST_ID}")))?;

        let mut record = Record::new();
        record.insert(
            self.parent.key_column,
            try_synth_key(test_id, self.experiment)?,
        );

        for (column, raw) in row.iter() {
            if column == TEST_ID {
                continue;
            }
            let target = if let Some(field) = self.vocabulary_field(column) {
                Some(field)
            } else if column.starts_with("sample") {
                let key_column = match column {
                    "sample_1" => SAMPLE_1_PK,
                    "sample_2" => SAMPLE_2_PK,
                    _ => continue,
                };
                if let Some(key) = self.sample_key(column, raw, row.line) {
                    record.insert(key_column, key);
                }
                continue;
            } else if column.starts_with("sqrt") {
                self.vocabulary_field(JS_DIST)
            } else if column.starts_with("log2") {
                self.vocabulary_field(LOG2_FOLD_CHANGE)
            } else {
                None
            };
            let Some(field) = target else {
                continue;
            };
            if let Some(value) = coerce(field.ty, raw) {
                record.insert(field.name, value);
            }
        }
        Ok(record)
    }
}
