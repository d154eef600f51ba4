//! Wide-to-long reshaping of Cuffdiff tracking files.
//!
//! `*.fpkm_tracking` and `*.count_tracking` carry one row per feature and a
//! block of `{sample}_{field}` columns per condition. The melt turns each
//! such row into one record per known sample.

use crate::domain::ExperimentId;
use crate::error::CuffError;
use crate::keys::{synth_key, try_synth_key};
use crate::record::{Record, coerce};
use crate::schema::{Field, SAMPLE_PK, TRACKING_ID, TrackSchema};
use crate::tsv::Row;

/// One sample's share of a wide row.
#[derive(Debug, Clone, PartialEq)]
pub struct MeltedRecord {
    pub sample: String,
    pub sample_key: String,
    pub track_key: String,
    /// Vocabulary fields only; NA and malformed values are absent.
    pub values: Record,
}

impl MeltedRecord {
    /// Storage row: the values plus track and sample keys.
    pub fn to_row(&self, track: &TrackSchema) -> Record {
        let mut row = self.values.clone();
        row.insert(track.key_column, self.track_key.as_str());
        row.insert(SAMPLE_PK, self.sample_key.as_str());
        row
    }
}

/// Every way `column` splits into a known sample name and a non-empty
/// rest, longest sample name first. Yields the index of the sample in
/// `samples` and the rest of the column name.
pub fn sample_splits<'c, 's, S: AsRef<str>>(
    column: &'c str,
    samples: &'s [S],
) -> impl Iterator<Item = (usize, &'c str)> {
    let mut order: Vec<usize> = (0..samples.len()).collect();
    order.sort_by_key(|index| std::cmp::Reverse(samples[*index].as_ref().len()));
    order.into_iter().filter_map(move |index| {
        column
            .strip_prefix(samples[index].as_ref())
            .and_then(|rest| rest.strip_prefix('_'))
            .filter(|rest| !rest.is_empty())
            .map(|rest| (index, rest))
    })
}

/// Splits the leading sample name off `column`, preferring the longest
/// name so that `ctrl_2_FPKM` resolves to `ctrl_2` rather than `ctrl`.
pub fn split_sample<'c, S: AsRef<str>>(column: &'c str, samples: &[S]) -> Option<(usize, &'c str)> {
    sample_splits(column, samples).next()
}

/// Matches a column-name remainder against the vocabulary.
///
/// Comparison is case-insensitive. A spelling matches when it equals the
/// remainder or ends it after an underscore; the longest matching spelling
/// wins so that `conf_hi` is never taken for a shorter entry.
pub fn match_field(remainder: &str, vocabulary: &'static [Field]) -> Option<&'static Field> {
    let remainder = remainder.to_ascii_lowercase();
    let mut best: Option<(&'static Field, usize)> = None;
    for field in vocabulary {
        for spelling in field.spellings() {
            let matches = remainder == spelling
                || remainder
                    .strip_suffix(spelling)
                    .map(|head| head.ends_with('_'))
                    .unwrap_or(false);
            if matches && best.map(|(_, len)| spelling.len() > len).unwrap_or(true) {
                best = Some((field, spelling.len()));
            }
        }
    }
    best.map(|(field, _)| field)
}

/// Column-to-target resolution for one file header.
#[derive(Debug, Clone)]
pub struct MeltPlan {
    targets: Vec<Option<(usize, &'static Field)>>,
}

impl MeltPlan {
    pub fn resolved_columns(&self) -> usize {
        self.targets.iter().filter(|target| target.is_some()).count()
    }
}

pub struct Melter<'a> {
    track: &'static TrackSchema,
    vocabulary: &'static [Field],
    samples: &'a [String],
    experiment: ExperimentId,
}

impl<'a> Melter<'a> {
    pub fn new(
        track: &'static TrackSchema,
        vocabulary: &'static [Field],
        samples: &'a [String],
        experiment: ExperimentId,
    ) -> Self {
        Self {
            track,
            vocabulary,
            samples,
            experiment,
        }
    }

    pub fn plan(&self, columns: &[String]) -> MeltPlan {
        let targets = columns
            .iter()
            .map(|column| {
                if column == TRACKING_ID {
                    return None;
                }
                // A longer sample name only wins if the rest is a known field:
                // with `ctrl` and `ctrl_conf`, `ctrl_conf_hi` is ctrl's conf_hi.
                sample_splits(column, self.samples).find_map(|(sample, rest)| {
                    match_field(rest, self.vocabulary).map(|field| (sample, field))
                })
            })
            .collect();
        MeltPlan { targets }
    }

    /// Melts a single row, building a plan from its own columns. Callers
    /// melting a whole file should build the plan once and use
    /// [`Melter::melt_with`].
    pub fn melt(&self, row: &Row) -> Result<Vec<MeltedRecord>, CuffError> {
        let plan = self.plan(row.columns());
        self.melt_with(&plan, row)
    }

    /// Melts `row` using a plan built from the same header.
    pub fn melt_with(&self, plan: &MeltPlan, row: &Row) -> Result<Vec<MeltedRecord>, CuffError> {
        let tracking_id = row
            .get(TRACKING_ID)
            .ok_or_else(|| CuffError::InvalidIdentifier(format!("missing {TRACKING_ID}")))?;
        let track_key = try_synth_key(tracking_id, self.experiment)?;

        let mut melts: Vec<MeltedRecord> = self
            .samples
            .iter()
            .map(|sample| MeltedRecord {
                sample: sample.clone(),
                sample_key: synth_key(sample, self.experiment),
                track_key: track_key.clone(),
                values: Record::new(),
            })
            .collect();

        for ((column, raw), target) in row.iter().zip(plan.targets.iter()) {
            let Some((sample, field)) = target else {
                continue;
            };
            let melt = &mut melts[*sample];
            if melt.values.contains(field.name) {
                continue;
            }
            match coerce(field.ty, raw) {
                Some(value) => melt.values.insert(field.name, value),
                None => tracing::trace!(
                    track = %self.track.kind,
                    column,
                    line = row.line,
                    "field left absent"
                ),
            }
        }
        Ok(melts)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::domain::TrackKind;
    use crate::record::{FieldType, Value};
    use crate::schema::{COUNT_FIELDS, DATA_FIELDS, track_schema};

    fn samples(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn split_prefers_longest_sample() {
        let known = samples(&["ctrl", "ctrl_2"]);
        assert_eq!(split_sample("ctrl_2_FPKM", &known), Some((1, "FPKM")));
        assert_eq!(split_sample("ctrl_FPKM", &known), Some((0, "FPKM")));
        assert_eq!(split_sample("treat_FPKM", &known), None);
        assert_eq!(split_sample("ctrl_", &known), None);
    }

    #[test]
    fn every_sample_prefix_is_offered() {
        let known = samples(&["ctrl", "ctrl_conf"]);
        let splits: Vec<_> = sample_splits("ctrl_conf_hi", &known).collect();
        assert_eq!(splits, vec![(1, "hi"), (0, "conf_hi")]);

        let melter = Melter::new(track_schema(TrackKind::Gene), DATA_FIELDS, &known, ExperimentId::new(1));
        let plan = melter.plan(&samples(&["ctrl_conf_hi", "ctrl_conf_FPKM"]));
        assert_eq!(plan.targets[0].map(|(sample, field)| (sample, field.name)), Some((0, "conf_hi")));
        assert_eq!(plan.targets[1].map(|(sample, field)| (sample, field.name)), Some((1, "fpkm")));
    }

    #[test]
    fn longest_vocabulary_entry_wins() {
        static VOCAB: &[Field] = &[Field::real("hi"), Field::real("conf_hi")];
        assert_eq!(match_field("conf_hi", VOCAB).unwrap().name, "conf_hi");
        assert_eq!(match_field("HI", VOCAB).unwrap().name, "hi");
        assert!(match_field("high", VOCAB).is_none());
    }

    #[test]
    fn count_aliases() {
        assert_eq!(match_field("count", COUNT_FIELDS).unwrap().name, "count");
        assert_eq!(
            match_field("count_variance", COUNT_FIELDS).unwrap().name,
            "variance"
        );
        assert_eq!(
            match_field("count_uncertainty_var", COUNT_FIELDS).unwrap().name,
            "uncertainty"
        );
        assert_eq!(
            match_field("count_dispersion_var", COUNT_FIELDS).unwrap().name,
            "dispersion"
        );
    }

    #[test]
    fn unknown_tracking_id_is_rejected() {
        let known = samples(&["ctrl"]);
        let melter = Melter::new(
            track_schema(TrackKind::Gene),
            DATA_FIELDS,
            &known,
            ExperimentId::new(1),
        );
        let row = Row::from_pairs(&[("tracking_id", "-"), ("ctrl_FPKM", "1.0")]);
        assert_matches!(melter.melt(&row), Err(CuffError::InvalidIdentifier(_)));
    }

    #[test]
    fn keys_follow_experiment() {
        let known = samples(&["ctrl"]);
        let melter = Melter::new(
            track_schema(TrackKind::Tss),
            DATA_FIELDS,
            &known,
            ExperimentId::new(4),
        );
        let row = Row::from_pairs(&[("tracking_id", "TSS7"), ("ctrl_FPKM", "2")]);
        let melts = melter.melt(&row).unwrap();
        let stored = melts[0].to_row(track_schema(TrackKind::Tss));
        assert_eq!(stored.get_str("tss_group_pk"), Some("TSS7-exp-4"));
        assert_eq!(stored.get_str(SAMPLE_PK), Some("ctrl-exp-4"));
        assert_eq!(stored.get("fpkm"), Some(&Value::Real(2.0)));
        assert_eq!(FieldType::Real, DATA_FIELDS[0].ty);
    }
}
