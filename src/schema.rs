//! Track schema registry.
//!
//! Static declaration of every stored entity: its table, its value fields,
//! its key columns and the Cuffdiff files each track kind is loaded from.

use std::fmt;
use std::str::FromStr;

use crate::domain::{DistributionKind, TrackKind};
use crate::error::CuffError;
use crate::record::FieldType;

pub const EXPERIMENT_ID: &str = "experiment_id";
pub const TRACK_PK: &str = "track_pk";
pub const SAMPLE_PK: &str = "sample_pk";
pub const SAMPLE_1_PK: &str = "sample_1_pk";
pub const SAMPLE_2_PK: &str = "sample_2_pk";
pub const REP_PK: &str = "rep_pk";
pub const ROW_ID: &str = "id";

/// Column holding the feature identifier in wide and replicate files.
pub const TRACKING_ID: &str = "tracking_id";
/// Column holding the feature identifier in differential files.
pub const TEST_ID: &str = "test_id";

/// A value field and the column-name spellings Cuffdiff uses for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub ty: FieldType,
    pub aliases: &'static [&'static str],
}

impl Field {
    pub const fn text(name: &'static str) -> Self {
        Self {
            name,
            ty: FieldType::Text,
            aliases: &[],
        }
    }

    pub const fn real(name: &'static str) -> Self {
        Self {
            name,
            ty: FieldType::Real,
            aliases: &[],
        }
    }

    pub const fn integer(name: &'static str) -> Self {
        Self {
            name,
            ty: FieldType::Integer,
            aliases: &[],
        }
    }

    pub const fn aliased(self, aliases: &'static [&'static str]) -> Self {
        Self {
            name: self.name,
            ty: self.ty,
            aliases,
        }
    }

    /// Every spelling that selects this field, the canonical name first.
    pub fn spellings(&self) -> impl Iterator<Item = &'static str> + '_ {
        std::iter::once(self.name).chain(self.aliases.iter().copied())
    }
}

pub const EXPERIMENT_FIELDS: &[Field] = &[
    Field::text("title"),
    Field::text("species"),
    Field::text("library"),
    Field::text("description"),
    Field::text("run_date"),
    Field::text("analysis_date"),
    Field::integer("active"),
    Field::integer("next_sample_index"),
];

pub const RUN_INFO_FIELDS: &[Field] = &[Field::text("key"), Field::text("value")];

pub const SAMPLE_FIELDS: &[Field] = &[Field::text("sample_name"), Field::integer("sample_index")];

pub const REPLICATE_FIELDS: &[Field] = &[
    Field::text("rep_name"),
    Field::text("file_name"),
    Field::integer("replicate"),
    Field::real("total_mass"),
    Field::real("norm_mass"),
    Field::real("internal_scale"),
    Field::real("external_scale"),
];

pub const EXP_STAT_FIELDS: &[Field] = &[
    Field::integer("gene_count"),
    Field::integer("promoter_count"),
    Field::integer("tss_count"),
    Field::integer("splicing_count"),
    Field::integer("isoform_count"),
    Field::integer("cds_count"),
    Field::integer("relcds_count"),
];

pub const TRACK_FIELDS: &[Field] = &[
    Field::text("class_code"),
    Field::text("nearest_ref_id"),
    Field::text("gene_short_name"),
    Field::text("locus"),
    Field::integer("length"),
    Field::real("coverage"),
];

pub const DATA_FIELDS: &[Field] = &[
    Field::real("fpkm"),
    Field::real("conf_hi"),
    Field::real("conf_lo"),
    Field::text("status"),
];

pub const COUNT_FIELDS: &[Field] = &[
    Field::real("count"),
    Field::real("variance"),
    Field::real("uncertainty").aliased(&["uncertainty_var"]),
    Field::real("dispersion").aliased(&["dispersion_var"]),
    Field::text("status"),
];

pub const REPLICATE_DATA_FIELDS: &[Field] = &[
    Field::integer("replicate"),
    Field::real("raw_frags"),
    Field::real("internal_scaled_frags"),
    Field::real("external_scaled_frags"),
    Field::real("fpkm"),
    Field::real("effective_length"),
    Field::text("status"),
];

pub const EXP_DIFF_FIELDS: &[Field] = &[
    Field::text("status"),
    Field::real("value_1"),
    Field::real("value_2"),
    Field::real("log2_fold_change"),
    Field::real("test_stat"),
    Field::real("p_value"),
    Field::real("q_value"),
    Field::text("significant"),
];

pub const DIST_DIFF_FIELDS: &[Field] = &[
    Field::text("status"),
    Field::real("value_1"),
    Field::real("value_2"),
    Field::real("js_dist"),
    Field::real("test_stat"),
    Field::real("p_value"),
    Field::real("q_value"),
    Field::text("significant"),
];

/// Foreign key from a track row to a parent track, with the column of the
/// tracking file that carries the parent's natural id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParentLink {
    pub kind: TrackKind,
    pub source_column: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackFiles {
    pub fpkm: &'static str,
    pub exp_diff: &'static str,
    pub count: &'static str,
    pub read_group: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackSchema {
    pub kind: TrackKind,
    pub natural_id_column: &'static str,
    pub key_column: &'static str,
    pub table: &'static str,
    pub parents: &'static [ParentLink],
    pub files: TrackFiles,
    pub distribution: Option<DistributionKind>,
}

static GENE: TrackSchema = TrackSchema {
    kind: TrackKind::Gene,
    natural_id_column: "gene_id",
    key_column: "gene_pk",
    table: "gene",
    parents: &[],
    files: TrackFiles {
        fpkm: "genes.fpkm_tracking",
        exp_diff: "gene_exp.diff",
        count: "genes.count_tracking",
        read_group: "genes.read_group_tracking",
    },
    distribution: Some(DistributionKind::Promoter),
};

static TSS: TrackSchema = TrackSchema {
    kind: TrackKind::Tss,
    natural_id_column: "tss_group_id",
    key_column: "tss_group_pk",
    table: "tss_group",
    parents: &[ParentLink {
        kind: TrackKind::Gene,
        source_column: "gene_id",
    }],
    files: TrackFiles {
        fpkm: "tss_groups.fpkm_tracking",
        exp_diff: "tss_group_exp.diff",
        count: "tss_groups.count_tracking",
        read_group: "tss_groups.read_group_tracking",
    },
    distribution: Some(DistributionKind::Splicing),
};

static ISOFORM: TrackSchema = TrackSchema {
    kind: TrackKind::Isoform,
    natural_id_column: "isoform_id",
    key_column: "isoform_pk",
    table: "isoform",
    parents: &[
        ParentLink {
            kind: TrackKind::Gene,
            source_column: "gene_id",
        },
        ParentLink {
            kind: TrackKind::Tss,
            source_column: "tss_id",
        },
        ParentLink {
            kind: TrackKind::Cds,
            source_column: "p_id",
        },
    ],
    files: TrackFiles {
        fpkm: "isoforms.fpkm_tracking",
        exp_diff: "isoform_exp.diff",
        count: "isoforms.count_tracking",
        read_group: "isoforms.read_group_tracking",
    },
    distribution: None,
};

static CDS: TrackSchema = TrackSchema {
    kind: TrackKind::Cds,
    natural_id_column: "cds_id",
    key_column: "cds_pk",
    table: "cds",
    parents: &[
        ParentLink {
            kind: TrackKind::Gene,
            source_column: "gene_id",
        },
        ParentLink {
            kind: TrackKind::Tss,
            source_column: "tss_id",
        },
    ],
    files: TrackFiles {
        fpkm: "cds.fpkm_tracking",
        exp_diff: "cds_exp.diff",
        count: "cds.count_tracking",
        read_group: "cds.read_group_tracking",
    },
    distribution: Some(DistributionKind::RelativeCds),
};

pub fn track_schema(kind: TrackKind) -> &'static TrackSchema {
    match kind {
        TrackKind::Gene => &GENE,
        TrackKind::Tss => &TSS,
        TrackKind::Isoform => &ISOFORM,
        TrackKind::Cds => &CDS,
    }
}

/// Resolves a track name (`gene`, `TSS`, `tss_group`, ...) to its schema.
pub fn lookup_track(name: &str) -> Result<&'static TrackSchema, CuffError> {
    name.parse::<TrackKind>().map(track_schema)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DistributionSchema {
    pub kind: DistributionKind,
    /// Track the rows are keyed to.
    pub parent: TrackKind,
    /// Track stage that loads this diff.
    pub loaded_with: TrackKind,
    pub file: &'static str,
    pub table: &'static str,
}

static PROMOTER: DistributionSchema = DistributionSchema {
    kind: DistributionKind::Promoter,
    parent: TrackKind::Gene,
    loaded_with: TrackKind::Gene,
    file: "promoters.diff",
    table: "promoter_diff_data",
};

static SPLICING: DistributionSchema = DistributionSchema {
    kind: DistributionKind::Splicing,
    parent: TrackKind::Tss,
    loaded_with: TrackKind::Tss,
    file: "splicing.diff",
    table: "splicing_diff_data",
};

static RELATIVE_CDS: DistributionSchema = DistributionSchema {
    kind: DistributionKind::RelativeCds,
    parent: TrackKind::Gene,
    loaded_with: TrackKind::Cds,
    file: "cds.diff",
    table: "cds_diff_data",
};

pub fn distribution_schema(kind: DistributionKind) -> &'static DistributionSchema {
    match kind {
        DistributionKind::Promoter => &PROMOTER,
        DistributionKind::Splicing => &SPLICING,
        DistributionKind::RelativeCds => &RELATIVE_CDS,
    }
}

/// Role of a column in the stored table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnRole {
    /// Auto-incremented integer primary key.
    RowId,
    /// Synthesized text primary key.
    Key,
    /// Owning experiment.
    Experiment,
    /// Owning experiment used as the primary key.
    ExperimentKey,
    /// Natural identifier, unique per experiment.
    NaturalId,
    ForeignKey {
        table: &'static str,
        required: bool,
    },
    Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub ty: FieldType,
    pub role: ColumnRole,
}

impl Column {
    const fn new(name: &'static str, ty: FieldType, role: ColumnRole) -> Self {
        Self { name, ty, role }
    }

    fn foreign(name: &'static str, table: &'static str, required: bool) -> Self {
        Self::new(name, FieldType::Text, ColumnRole::ForeignKey { table, required })
    }
}

/// Every stored entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Entity {
    Experiment,
    RunInfo,
    Sample,
    Replicate,
    ExpStat,
    Track(TrackKind),
    Data(TrackKind),
    Count(TrackKind),
    ExpDiff(TrackKind),
    ReplicateData(TrackKind),
    DistributionDiff(DistributionKind),
}

impl Entity {
    /// All entities in creation order (parents before children).
    pub fn all() -> Vec<Entity> {
        let mut entities = vec![
            Entity::Experiment,
            Entity::RunInfo,
            Entity::Sample,
            Entity::Replicate,
            Entity::ExpStat,
        ];
        entities.extend(TrackKind::ALL.iter().map(|kind| Entity::Track(*kind)));
        for kind in TrackKind::ALL {
            entities.extend([
                Entity::Data(kind),
                Entity::Count(kind),
                Entity::ExpDiff(kind),
                Entity::ReplicateData(kind),
            ]);
        }
        entities.extend(
            DistributionKind::ALL
                .iter()
                .map(|kind| Entity::DistributionDiff(*kind)),
        );
        entities
    }

    pub fn table(&self) -> &'static str {
        match self {
            Entity::Experiment => "experiment",
            Entity::RunInfo => "run_info",
            Entity::Sample => "sample",
            Entity::Replicate => "replicate",
            Entity::ExpStat => "exp_stat",
            Entity::Track(kind) => track_schema(*kind).table,
            Entity::Data(kind) => match kind {
                TrackKind::Gene => "gene_data",
                TrackKind::Tss => "tss_group_data",
                TrackKind::Isoform => "isoform_data",
                TrackKind::Cds => "cds_data",
            },
            Entity::Count(kind) => match kind {
                TrackKind::Gene => "gene_count",
                TrackKind::Tss => "tss_group_count",
                TrackKind::Isoform => "isoform_count",
                TrackKind::Cds => "cds_count",
            },
            Entity::ExpDiff(kind) => match kind {
                TrackKind::Gene => "gene_exp_diff_data",
                TrackKind::Tss => "tss_group_exp_diff_data",
                TrackKind::Isoform => "isoform_exp_diff_data",
                TrackKind::Cds => "cds_exp_diff_data",
            },
            Entity::ReplicateData(kind) => match kind {
                TrackKind::Gene => "gene_replicate_data",
                TrackKind::Tss => "tss_group_replicate_data",
                TrackKind::Isoform => "isoform_replicate_data",
                TrackKind::Cds => "cds_replicate_data",
            },
            Entity::DistributionDiff(kind) => distribution_schema(*kind).table,
        }
    }

    /// Value field vocabulary, excluding key and relation columns.
    pub fn fields(&self) -> &'static [Field] {
        match self {
            Entity::Experiment => EXPERIMENT_FIELDS,
            Entity::RunInfo => RUN_INFO_FIELDS,
            Entity::Sample => SAMPLE_FIELDS,
            Entity::Replicate => REPLICATE_FIELDS,
            Entity::ExpStat => EXP_STAT_FIELDS,
            Entity::Track(_) => TRACK_FIELDS,
            Entity::Data(_) => DATA_FIELDS,
            Entity::Count(_) => COUNT_FIELDS,
            Entity::ExpDiff(_) => EXP_DIFF_FIELDS,
            Entity::ReplicateData(_) => REPLICATE_DATA_FIELDS,
            Entity::DistributionDiff(_) => DIST_DIFF_FIELDS,
        }
    }

    /// Column naming the row's parent track, for track-derived entities.
    pub fn track_key_column(&self) -> Option<&'static str> {
        match self {
            Entity::Data(kind)
            | Entity::Count(kind)
            | Entity::ExpDiff(kind)
            | Entity::ReplicateData(kind) => Some(track_schema(*kind).key_column),
            Entity::DistributionDiff(kind) => {
                Some(track_schema(distribution_schema(*kind).parent).key_column)
            }
            _ => None,
        }
    }

    /// Key and relation columns followed by the value fields.
    pub fn columns(&self) -> Vec<Column> {
        let mut columns = match self {
            Entity::Experiment => vec![Column::new(ROW_ID, FieldType::Integer, ColumnRole::RowId)],
            Entity::RunInfo => vec![
                Column::new(ROW_ID, FieldType::Integer, ColumnRole::RowId),
                Column::new(EXPERIMENT_ID, FieldType::Integer, ColumnRole::Experiment),
            ],
            Entity::Sample => vec![
                Column::new(SAMPLE_PK, FieldType::Text, ColumnRole::Key),
                Column::new(EXPERIMENT_ID, FieldType::Integer, ColumnRole::Experiment),
            ],
            Entity::Replicate => vec![
                Column::new(REP_PK, FieldType::Text, ColumnRole::Key),
                Column::new(EXPERIMENT_ID, FieldType::Integer, ColumnRole::Experiment),
                Column::foreign(SAMPLE_PK, "sample", true),
            ],
            Entity::ExpStat => vec![Column::new(
                EXPERIMENT_ID,
                FieldType::Integer,
                ColumnRole::ExperimentKey,
            )],
            Entity::Track(kind) => {
                let schema = track_schema(*kind);
                let mut columns = vec![
                    Column::new(TRACK_PK, FieldType::Text, ColumnRole::Key),
                    Column::new(EXPERIMENT_ID, FieldType::Integer, ColumnRole::Experiment),
                    Column::new(schema.natural_id_column, FieldType::Text, ColumnRole::NaturalId),
                ];
                columns.extend(schema.parents.iter().map(|parent| {
                    let parent = track_schema(parent.kind);
                    Column::foreign(parent.key_column, parent.table, false)
                }));
                columns
            }
            Entity::Data(kind) | Entity::Count(kind) => {
                let schema = track_schema(*kind);
                vec![
                    Column::new(ROW_ID, FieldType::Integer, ColumnRole::RowId),
                    Column::new(EXPERIMENT_ID, FieldType::Integer, ColumnRole::Experiment),
                    Column::foreign(schema.key_column, schema.table, true),
                    Column::foreign(SAMPLE_PK, "sample", true),
                ]
            }
            Entity::ReplicateData(kind) => {
                let schema = track_schema(*kind);
                vec![
                    Column::new(ROW_ID, FieldType::Integer, ColumnRole::RowId),
                    Column::new(EXPERIMENT_ID, FieldType::Integer, ColumnRole::Experiment),
                    Column::foreign(schema.key_column, schema.table, true),
                    Column::foreign(SAMPLE_PK, "sample", false),
                    Column::foreign(REP_PK, "replicate", false),
                ]
            }
            Entity::ExpDiff(kind) => diff_columns(track_schema(*kind)),
            Entity::DistributionDiff(kind) => {
                diff_columns(track_schema(distribution_schema(*kind).parent))
            }
        };
        columns.extend(
            self.fields()
                .iter()
                .map(|field| Column::new(field.name, field.ty, ColumnRole::Value)),
        );
        columns
    }

    pub fn column(&self, name: &str) -> Option<Column> {
        self.columns().into_iter().find(|column| column.name == name)
    }

    pub fn primary_key(&self) -> &'static str {
        match self {
            Entity::Experiment => ROW_ID,
            Entity::Sample => SAMPLE_PK,
            Entity::Replicate => REP_PK,
            Entity::ExpStat => EXPERIMENT_ID,
            Entity::Track(_) => TRACK_PK,
            _ => ROW_ID,
        }
    }

    /// Field that must be unique within one experiment.
    pub fn unique_field(&self) -> Option<&'static str> {
        match self {
            Entity::Sample => Some("sample_name"),
            Entity::Replicate => Some("rep_name"),
            Entity::Track(kind) => Some(track_schema(*kind).natural_id_column),
            _ => None,
        }
    }

    /// Columns rendered by generic list views, in display order.
    pub fn display_fields(&self) -> Vec<&'static str> {
        match self {
            Entity::Experiment => vec![
                ROW_ID,
                "run_date",
                "analysis_date",
                "title",
                "species",
                "library",
                "description",
            ],
            Entity::RunInfo => vec!["key", "value"],
            Entity::Sample => vec!["sample_index", "sample_name"],
            Entity::Replicate => vec![
                SAMPLE_PK,
                "replicate",
                "file_name",
                "total_mass",
                "norm_mass",
                "internal_scale",
                "external_scale",
            ],
            Entity::ExpStat => EXP_STAT_FIELDS.iter().map(|field| field.name).collect(),
            Entity::Track(kind) => {
                let mut fields = vec![track_schema(*kind).natural_id_column];
                fields.extend(
                    ["gene_short_name", "locus", "length", "coverage", "class_code"].iter(),
                );
                fields
            }
            Entity::Data(_) => self.keyed_display(&[SAMPLE_PK, "fpkm", "conf_lo", "conf_hi", "status"]),
            Entity::Count(_) => self.keyed_display(&[
                SAMPLE_PK,
                "count",
                "variance",
                "uncertainty",
                "dispersion",
                "status",
            ]),
            Entity::ReplicateData(_) => self.keyed_display(&[
                SAMPLE_PK,
                "replicate",
                "raw_frags",
                "internal_scaled_frags",
                "external_scaled_frags",
                "fpkm",
                "effective_length",
                "status",
            ]),
            Entity::ExpDiff(_) => self.keyed_display(&[
                SAMPLE_1_PK,
                SAMPLE_2_PK,
                "status",
                "value_1",
                "value_2",
                "log2_fold_change",
                "test_stat",
                "p_value",
                "q_value",
                "significant",
            ]),
            Entity::DistributionDiff(_) => self.keyed_display(&[
                SAMPLE_1_PK,
                SAMPLE_2_PK,
                "status",
                "value_1",
                "value_2",
                "js_dist",
                "test_stat",
                "p_value",
                "q_value",
                "significant",
            ]),
        }
    }

    fn keyed_display(&self, rest: &[&'static str]) -> Vec<&'static str> {
        self.track_key_column()
            .into_iter()
            .chain(rest.iter().copied())
            .collect()
    }
}

fn diff_columns(parent: &TrackSchema) -> Vec<Column> {
    vec![
        Column::new(ROW_ID, FieldType::Integer, ColumnRole::RowId),
        Column::new(EXPERIMENT_ID, FieldType::Integer, ColumnRole::Experiment),
        Column::foreign(parent.key_column, parent.table, true),
        Column::foreign(SAMPLE_1_PK, "sample", false),
        Column::foreign(SAMPLE_2_PK, "sample", false),
    ]
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.table())
    }
}

impl FromStr for Entity {
    type Err = CuffError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let wanted = value.trim().to_ascii_lowercase();
        Entity::all()
            .into_iter()
            .find(|entity| entity.table() == wanted)
            .ok_or_else(|| CuffError::UnknownEntity(value.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn tss_uses_tss_group_field() {
        let schema = lookup_track("TSS").unwrap();
        assert_eq!(schema.table, "tss_group");
        assert_eq!(schema.key_column, "tss_group_pk");
    }

    #[test]
    fn keys_are_columns() {
        for entity in Entity::all() {
            assert!(entity.column(entity.primary_key()).is_some(), "{entity}");
            if let Some(field) = entity.unique_field() {
                assert!(entity.column(field).is_some(), "{entity}");
            }
        }
    }

    #[test]
    fn table_names_are_unique() {
        let entities = Entity::all();
        let tables: HashSet<_> = entities.iter().map(Entity::table).collect();
        assert_eq!(tables.len(), entities.len());
    }

    #[test]
    fn display_fields_exist_as_columns() {
        for entity in Entity::all() {
            for field in entity.display_fields() {
                assert!(
                    entity.column(field).is_some(),
                    "{entity} has no column {field}"
                );
            }
        }
    }
}
