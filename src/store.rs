use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use regex::Regex;
use rusqlite::functions::FunctionFlags;
use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::{Connection, ErrorCode, OptionalExtension, ToSql, Transaction, params};
use serde::Serialize;

use crate::domain::ExperimentId;
use crate::error::CuffError;
use crate::keys::synth_key;
use crate::query::Query;
use crate::record::{Record, Value};
use crate::schema::{Column, ColumnRole, EXPERIMENT_ID, Entity};

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Experiment {
    pub id: i64,
    pub title: String,
    pub species: String,
    pub library: String,
    pub description: Option<String>,
    pub run_date: Option<String>,
    pub analysis_date: Option<String>,
    pub active: bool,
}

#[derive(Debug, Clone)]
pub struct NewExperiment {
    pub title: String,
    pub species: String,
    pub library: String,
    pub description: Option<String>,
    pub run_date: Option<String>,
    pub analysis_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Sample {
    pub key: String,
    pub name: String,
    pub index: i64,
}

/// Per-experiment summary counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExpStat {
    pub gene_count: i64,
    pub promoter_count: i64,
    pub tss_count: i64,
    pub splicing_count: i64,
    pub isoform_count: i64,
    pub cds_count: i64,
    pub relcds_count: i64,
}

impl ExpStat {
    fn to_record(&self) -> Record {
        Record::new()
            .with("gene_count", self.gene_count)
            .with("promoter_count", self.promoter_count)
            .with("tss_count", self.tss_count)
            .with("splicing_count", self.splicing_count)
            .with("isoform_count", self.isoform_count)
            .with("cds_count", self.cds_count)
            .with("relcds_count", self.relcds_count)
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Text(value) => ToSqlOutput::Borrowed(ValueRef::Text(value.as_bytes())),
            Value::Integer(value) => ToSqlOutput::Owned(rusqlite::types::Value::Integer(*value)),
            Value::Real(value) => ToSqlOutput::Owned(rusqlite::types::Value::Real(*value)),
        })
    }
}

fn read_value(value: ValueRef<'_>) -> Option<Value> {
    match value {
        ValueRef::Null | ValueRef::Blob(_) => None,
        ValueRef::Integer(value) => Some(Value::Integer(value)),
        ValueRef::Real(value) => Some(Value::Real(value)),
        ValueRef::Text(bytes) => Some(Value::Text(String::from_utf8_lossy(bytes).into_owned())),
    }
}

fn write_error(entity: Entity, err: rusqlite::Error) -> CuffError {
    match &err {
        rusqlite::Error::SqliteFailure(failure, _) if failure.code == ErrorCode::ConstraintViolation => {
            CuffError::Integrity {
                stage: entity.to_string(),
                file: String::new(),
                message: err.to_string(),
            }
        }
        _ => CuffError::from(err),
    }
}

fn column_sql(column: &Column) -> Result<String, CuffError> {
    let name = column.name;
    let ty = column.ty.sql_type();
    Ok(match column.role {
        ColumnRole::RowId => format!("{name} INTEGER PRIMARY KEY AUTOINCREMENT"),
        ColumnRole::Key => format!("{name} TEXT PRIMARY KEY NOT NULL"),
        ColumnRole::Experiment => {
            format!("{name} INTEGER NOT NULL REFERENCES experiment(id) ON DELETE CASCADE")
        }
        ColumnRole::ExperimentKey => {
            format!("{name} INTEGER PRIMARY KEY REFERENCES experiment(id) ON DELETE CASCADE")
        }
        ColumnRole::NaturalId => format!("{name} {ty} NOT NULL"),
        ColumnRole::ForeignKey { table, required } => {
            let target: Entity = table.parse()?;
            let null = if required { " NOT NULL" } else { "" };
            format!(
                "{name} {ty}{null} REFERENCES {table}({}) ON DELETE CASCADE",
                target.primary_key()
            )
        }
        ColumnRole::Value => format!("{name} {ty}"),
    })
}

/// DDL for one entity: the table, its per-experiment uniqueness constraint
/// and indexes on the experiment and relation columns.
pub fn create_table_sql(entity: Entity) -> Result<String, CuffError> {
    let table = entity.table();
    let columns = entity.columns();
    let mut definitions = columns
        .iter()
        .map(column_sql)
        .collect::<Result<Vec<_>, _>>()?;
    if let Some(field) = entity.unique_field() {
        definitions.push(format!("UNIQUE ({EXPERIMENT_ID}, {field})"));
    }
    let mut sql = format!(
        "CREATE TABLE IF NOT EXISTS {table} (\n    {}\n);\n",
        definitions.join(",\n    ")
    );
    for column in &columns {
        let indexed = matches!(
            column.role,
            ColumnRole::Experiment | ColumnRole::ForeignKey { .. }
        );
        if indexed {
            sql.push_str(&format!(
                "CREATE INDEX IF NOT EXISTS {table}_{name}_idx ON {table}({name});\n",
                name = column.name
            ));
        }
    }
    Ok(sql)
}

fn register_regexp(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        "regexp",
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let regex = ctx.get_or_create_aux(0, |pattern| -> Result<Regex, BoxError> {
                Ok(Regex::new(pattern.as_str()?)?)
            })?;
            let text = match ctx.get_raw(1) {
                ValueRef::Text(bytes) => String::from_utf8_lossy(bytes).into_owned(),
                ValueRef::Integer(value) => value.to_string(),
                ValueRef::Real(value) => value.to_string(),
                ValueRef::Null | ValueRef::Blob(_) => return Ok(false),
            };
            Ok(regex.is_match(&text))
        },
    )
}

fn experiment_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Experiment> {
    Ok(Experiment {
        id: row.get(0)?,
        title: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
        species: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
        library: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
        description: row.get(4)?,
        run_date: row.get(5)?,
        analysis_date: row.get(6)?,
        active: row.get::<_, Option<i64>>(7)?.unwrap_or(0) != 0,
    })
}

const EXPERIMENT_COLUMNS: &str =
    "id, title, species, library, description, run_date, analysis_date, active";

/// SQLite-backed storage for imported experiments.
#[derive(Debug)]
pub struct Store {
    conn: Connection,
    path: Option<Utf8PathBuf>,
}

impl Store {
    /// `cuffbase.sqlite` under the user data directory.
    pub fn default_path() -> Result<Utf8PathBuf, CuffError> {
        BaseDirs::new()
            .and_then(|dirs| {
                Utf8PathBuf::from_path_buf(dirs.data_dir().join("cuffbase").join("cuffbase.sqlite"))
                    .ok()
            })
            .ok_or_else(|| CuffError::Filesystem("unable to resolve data directory".to_string()))
    }

    pub fn open(path: &Utf8Path) -> Result<Self, CuffError> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_str().is_empty()) {
            fs::create_dir_all(parent.as_std_path())
                .map_err(|err| CuffError::Filesystem(err.to_string()))?;
        }
        let conn = Connection::open(path.as_std_path())?;
        Self::init(conn, Some(path.to_path_buf()))
    }

    pub fn open_in_memory() -> Result<Self, CuffError> {
        Self::init(Connection::open_in_memory()?, None)
    }

    fn init(conn: Connection, path: Option<Utf8PathBuf>) -> Result<Self, CuffError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        register_regexp(&conn)?;
        let store = Self { conn, path };
        store.migrate()?;
        Ok(store)
    }

    pub fn path(&self) -> Option<&Utf8Path> {
        self.path.as_deref()
    }

    pub fn migrate(&self) -> Result<(), CuffError> {
        let mut ddl = String::new();
        for entity in Entity::all() {
            ddl.push_str(&create_table_sql(entity)?);
        }
        self.conn.execute_batch(&ddl)?;
        tracing::debug!(path = ?self.path, "schema ready");
        Ok(())
    }

    /// Starts a write transaction. Dropping the writer without committing
    /// rolls everything back.
    pub fn writer(&mut self) -> Result<Writer<'_>, CuffError> {
        Ok(Writer {
            tx: self.conn.transaction()?,
        })
    }

    /// Active experiments, oldest first.
    pub fn experiments(&self) -> Result<Vec<Experiment>, CuffError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {EXPERIMENT_COLUMNS} FROM experiment WHERE active = 1 ORDER BY id"
        ))?;
        let experiments = stmt
            .query_map([], experiment_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(experiments)
    }

    pub fn experiment(&self, id: ExperimentId) -> Result<Experiment, CuffError> {
        self.conn
            .query_row(
                &format!("SELECT {EXPERIMENT_COLUMNS} FROM experiment WHERE id = ?1"),
                params![id.get()],
                experiment_from_row,
            )
            .optional()?
            .ok_or(CuffError::ExperimentNotFound(id.get()))
    }

    /// Samples in index order.
    pub fn samples(&self, id: ExperimentId) -> Result<Vec<Sample>, CuffError> {
        let mut stmt = self.conn.prepare(
            "SELECT sample_pk, sample_name, sample_index FROM sample
             WHERE experiment_id = ?1 ORDER BY sample_index",
        )?;
        let samples = stmt
            .query_map(params![id.get()], |row| {
                Ok(Sample {
                    key: row.get(0)?,
                    name: row.get(1)?,
                    index: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(samples)
    }

    pub fn run_info(&self, id: ExperimentId) -> Result<Vec<(String, String)>, CuffError> {
        let mut stmt = self
            .conn
            .prepare("SELECT key, value FROM run_info WHERE experiment_id = ?1 ORDER BY id")?;
        let entries = stmt
            .query_map(params![id.get()], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    pub fn stats(&self, id: ExperimentId) -> Result<Option<ExpStat>, CuffError> {
        let stat = self
            .conn
            .query_row(
                "SELECT gene_count, promoter_count, tss_count, splicing_count,
                        isoform_count, cds_count, relcds_count
                 FROM exp_stat WHERE experiment_id = ?1",
                params![id.get()],
                |row| {
                    Ok(ExpStat {
                        gene_count: row.get(0)?,
                        promoter_count: row.get(1)?,
                        tss_count: row.get(2)?,
                        splicing_count: row.get(3)?,
                        isoform_count: row.get(4)?,
                        cds_count: row.get(5)?,
                        relcds_count: row.get(6)?,
                    })
                },
            )
            .optional()?;
        Ok(stat)
    }

    /// Number of rows of `entity` owned by the experiment.
    pub fn count(&self, entity: Entity, id: ExperimentId) -> Result<i64, CuffError> {
        let filter = match entity {
            Entity::Experiment => "id",
            _ => EXPERIMENT_ID,
        };
        let count = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {} WHERE {filter} = ?1", entity.table()),
            params![id.get()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn query(&self, query: &Query) -> Result<Vec<Record>, CuffError> {
        let compiled = query.compile()?;
        tracing::debug!(sql = %compiled.sql, "query");
        let mut stmt = self.conn.prepare(&compiled.sql)?;
        let mut rows = stmt.query(rusqlite::params_from_iter(compiled.params.iter()))?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            let mut record = Record::new();
            for (index, column) in compiled.columns.iter().copied().enumerate() {
                if let Some(value) = read_value(row.get_ref(index)?) {
                    record.insert(column, value);
                }
            }
            records.push(record);
        }
        Ok(records)
    }

    /// Deletes an experiment and, through cascading keys, everything it owns.
    pub fn delete_experiment(&mut self, id: ExperimentId) -> Result<(), CuffError> {
        let tx = self.conn.transaction()?;
        let deleted = tx.execute("DELETE FROM experiment WHERE id = ?1", params![id.get()])?;
        if deleted == 0 {
            return Err(CuffError::ExperimentNotFound(id.get()));
        }
        tx.commit()?;
        tracing::info!(experiment = %id, "experiment deleted");
        Ok(())
    }
}

/// Write side of the store, bound to one transaction.
pub struct Writer<'a> {
    tx: Transaction<'a>,
}

impl Writer<'_> {
    /// Inserts an inactive experiment with its sample counter at 1.
    pub fn create_experiment(&self, new: &NewExperiment) -> Result<ExperimentId, CuffError> {
        self.tx
            .execute(
                "INSERT INTO experiment
                    (title, species, library, description, run_date, analysis_date,
                     active, next_sample_index)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, 1)",
                params![
                    new.title,
                    new.species,
                    new.library,
                    new.description,
                    new.run_date,
                    new.analysis_date,
                ],
            )
            .map_err(|err| write_error(Entity::Experiment, err))?;
        Ok(ExperimentId::new(self.tx.last_insert_rowid()))
    }

    pub fn insert_run_info(&self, id: ExperimentId, key: &str, value: &str) -> Result<(), CuffError> {
        self.tx
            .execute(
                "INSERT INTO run_info (experiment_id, key, value) VALUES (?1, ?2, ?3)",
                params![id.get(), key, value],
            )
            .map_err(|err| write_error(Entity::RunInfo, err))?;
        Ok(())
    }

    /// Returns the key of sample `name`, creating it with the experiment's
    /// next sample index when it does not exist yet.
    pub fn register_sample(&self, id: ExperimentId, name: &str) -> Result<String, CuffError> {
        let existing: Option<String> = self
            .tx
            .query_row(
                "SELECT sample_pk FROM sample WHERE experiment_id = ?1 AND sample_name = ?2",
                params![id.get(), name],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(key) = existing {
            return Ok(key);
        }

        let index: i64 = self
            .tx
            .query_row(
                "SELECT next_sample_index FROM experiment WHERE id = ?1",
                params![id.get()],
                |row| row.get(0),
            )
            .optional()?
            .ok_or(CuffError::ExperimentNotFound(id.get()))?;
        let key = synth_key(name, id);
        self.tx
            .execute(
                "INSERT INTO sample (sample_pk, experiment_id, sample_name, sample_index)
                 VALUES (?1, ?2, ?3, ?4)",
                params![key, id.get(), name, index],
            )
            .map_err(|err| write_error(Entity::Sample, err))?;
        self.tx.execute(
            "UPDATE experiment SET next_sample_index = ?1 WHERE id = ?2",
            params![index + 1, id.get()],
        )?;
        Ok(key)
    }

    /// Inserts `records` into the table of `entity`. Columns missing from a
    /// record are written as NULL; the experiment column is always set.
    pub fn bulk_insert(
        &self,
        entity: Entity,
        id: ExperimentId,
        records: &[Record],
    ) -> Result<usize, CuffError> {
        if entity == Entity::Experiment {
            return Err(CuffError::InvalidArgument(
                "experiments are created with create_experiment".to_string(),
            ));
        }
        if records.is_empty() {
            return Ok(0);
        }
        let columns: Vec<Column> = entity
            .columns()
            .into_iter()
            .filter(|column| column.role != ColumnRole::RowId)
            .collect();
        let names = columns
            .iter()
            .map(|column| column.name)
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = vec!["?"; columns.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({names}) VALUES ({placeholders})",
            entity.table()
        );

        let experiment = Value::Integer(id.get());
        let mut stmt = self.tx.prepare_cached(&sql)?;
        for record in records {
            let values = columns.iter().map(|column| match column.role {
                ColumnRole::Experiment | ColumnRole::ExperimentKey => Some(&experiment),
                _ => record.get(column.name),
            });
            stmt.execute(rusqlite::params_from_iter(values))
                .map_err(|err| write_error(entity, err))?;
        }
        Ok(records.len())
    }

    pub fn write_stats(&self, id: ExperimentId, stats: &ExpStat) -> Result<(), CuffError> {
        self.bulk_insert(Entity::ExpStat, id, &[stats.to_record()])?;
        Ok(())
    }

    pub fn activate(&self, id: ExperimentId) -> Result<(), CuffError> {
        self.tx.execute(
            "UPDATE experiment SET active = 1 WHERE id = ?1",
            params![id.get()],
        )?;
        Ok(())
    }

    pub fn commit(self) -> Result<(), CuffError> {
        self.tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::domain::TrackKind;

    fn new_experiment(title: &str) -> NewExperiment {
        NewExperiment {
            title: title.to_string(),
            species: "C.elegans".to_string(),
            library: "RNA-Seq".to_string(),
            description: None,
            run_date: None,
            analysis_date: None,
        }
    }

    #[test]
    fn track_ddl_has_unique_natural_id() {
        let sql = create_table_sql(Entity::Track(TrackKind::Isoform)).unwrap();
        assert!(sql.contains("UNIQUE (experiment_id, isoform_id)"));
        assert!(sql.contains("gene_pk TEXT REFERENCES gene(track_pk) ON DELETE CASCADE"));
    }

    #[test]
    fn missing_parent_is_integrity_error() {
        let mut store = Store::open_in_memory().unwrap();
        let writer = store.writer().unwrap();
        let id = writer.create_experiment(&new_experiment("orphans")).unwrap();
        let record = Record::new()
            .with("gene_pk", "XLOC_1-exp-1")
            .with("sample_pk", "ctrl-exp-1")
            .with("fpkm", 1.0);
        assert_matches!(
            writer.bulk_insert(Entity::Data(TrackKind::Gene), id, &[record]),
            Err(CuffError::Integrity { .. })
        );
    }

    #[test]
    fn uncommitted_writer_rolls_back() {
        let mut store = Store::open_in_memory().unwrap();
        {
            let writer = store.writer().unwrap();
            let id = writer.create_experiment(&new_experiment("dropped")).unwrap();
            writer.activate(id).unwrap();
        }
        assert!(store.experiments().unwrap().is_empty());
    }
}
