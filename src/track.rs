use crate::domain::{ExperimentId, TrackKind};
use crate::error::CuffError;
use crate::keys::{synth_key, try_synth_key, validate_natural_id};
use crate::record::{Record, coerce};
use crate::schema::{TRACK_FIELDS, TRACK_PK, TRACKING_ID, TrackSchema, track_schema};
use crate::tsv::Row;

/// Builds base track rows from the non-sample columns of a tracking file.
pub struct TrackBuilder<'a> {
    schema: &'static TrackSchema,
    experiment: ExperimentId,
    loaded: &'a [TrackKind],
}

impl<'a> TrackBuilder<'a> {
    /// `loaded` lists the track kinds already stored for this experiment;
    /// parent references to any other kind are left unset.
    pub fn new(schema: &'static TrackSchema, experiment: ExperimentId, loaded: &'a [TrackKind]) -> Self {
        Self {
            schema,
            experiment,
            loaded,
        }
    }

    pub fn build(&self, row: &Row) -> Result<Record, CuffError> {
        let tracking_id = row
            .get(TRACKING_ID)
            .ok_or_else(|| CuffError::InvalidIdentifier(format!("missing {TRACKING_ID}")))?;
        let natural_id = validate_natural_id(tracking_id)?;

        let mut record = Record::new();
        record.insert(TRACK_PK, try_synth_key(natural_id, self.experiment)?);
        record.insert(self.schema.natural_id_column, natural_id);

        for parent in self.schema.parents {
            if !self.loaded.contains(&parent.kind) {
                continue;
            }
            let Some(raw) = row.get(parent.source_column) else {
                continue;
            };
            match validate_natural_id(raw) {
                Ok(parent_id) => record.insert(
                    track_schema(parent.kind).key_column,
                    synth_key(parent_id, self.experiment),
                ),
                Err(_) => tracing::trace!(
                    track = %self.schema.kind,
                    parent = %parent.kind,
                    line = row.line,
                    "no parent reference"
                ),
            }
        }

        for field in TRACK_FIELDS {
            if let Some(value) = row.get(field.name).and_then(|raw| coerce(field.ty, raw)) {
                record.insert(field.name, value);
            }
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn isoform_row() -> Row {
        Row::from_pairs(&[
            ("tracking_id", "TCONS_00000001"),
            ("class_code", "="),
            ("nearest_ref_id", "NM_001"),
            ("gene_id", "XLOC_000001"),
            ("gene_short_name", "unc-54"),
            ("tss_id", "TSS1"),
            ("locus", "I:14826-17061"),
            ("length", "2235"),
            ("coverage", "-"),
            ("ctrl_FPKM", "3.1"),
        ])
    }

    #[test]
    fn builds_isoform_with_loaded_parents() {
        let loaded = [TrackKind::Gene, TrackKind::Tss];
        let builder = TrackBuilder::new(
            track_schema(TrackKind::Isoform),
            ExperimentId::new(2),
            &loaded,
        );
        let record = builder.build(&isoform_row()).unwrap();
        assert_eq!(record.get_str(TRACK_PK), Some("TCONS_00000001-exp-2"));
        assert_eq!(record.get_str("isoform_id"), Some("TCONS_00000001"));
        assert_eq!(record.get_str("gene_pk"), Some("XLOC_000001-exp-2"));
        assert_eq!(record.get_str("tss_group_pk"), Some("TSS1-exp-2"));
        assert!(!record.contains("cds_pk"));
        assert_eq!(record.get_i64("length"), Some(2235));
        assert!(!record.contains("coverage"));
        assert!(!record.contains("fpkm"));
    }

    #[test]
    fn skips_parents_not_loaded() {
        let loaded = [TrackKind::Gene];
        let builder = TrackBuilder::new(
            track_schema(TrackKind::Isoform),
            ExperimentId::new(2),
            &loaded,
        );
        let record = builder.build(&isoform_row()).unwrap();
        assert!(record.contains("gene_pk"));
        assert!(!record.contains("tss_group_pk"));
    }
}
