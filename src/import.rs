use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::diff::DiffBuilder;
use crate::domain::{ExperimentId, TrackKind};
use crate::error::CuffError;
use crate::keys::synth_key;
use crate::melt::Melter;
use crate::record::Record;
use crate::replicate::{ReplicateRowBuilder, conditions, read_replicates};
use crate::schema::{
    COUNT_FIELDS, DATA_FIELDS, DistributionSchema, Entity, SAMPLE_PK, TEST_ID, TRACKING_ID,
    TrackSchema, distribution_schema, track_schema,
};
use crate::store::{ExpStat, NewExperiment, Store, Writer};
use crate::track::TrackBuilder;
use crate::tsv::{Row, TsvReader, resolve_input};

pub const RUN_INFO_FILE: &str = "run.info";
pub const REPLICATES_FILE: &str = "read_groups.info";

pub const DEFAULT_SPECIES: &str = "C.elegans";
pub const DEFAULT_LIBRARY: &str = "RNA-Seq";
pub const DEFAULT_BATCH_SIZE: usize = 10_000;

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

/// Discards progress events.
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn event(&self, _event: ProgressEvent) {}
}

#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub title: Option<String>,
    pub species: String,
    pub library: String,
    pub description: Option<String>,
    pub exclude: Vec<TrackKind>,
    pub genome_build: Option<String>,
    pub gtf: Option<PathBuf>,
    pub batch_size: usize,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            title: None,
            species: DEFAULT_SPECIES.to_string(),
            library: DEFAULT_LIBRARY.to_string(),
            description: None,
            exclude: Vec::new(),
            genome_build: None,
            gtf: None,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl ImportOptions {
    fn includes(&self, kind: TrackKind) -> bool {
        !self.exclude.contains(&kind)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportStage {
    RunInfoLoaded,
    SamplesLoaded,
    GeneTrackLoaded,
    TssTrackLoaded,
    IsoformTrackLoaded,
    CdsTrackLoaded,
    StatsFinalized,
    AnnotationLoaded,
    Done,
}

impl ImportStage {
    pub fn track_loaded(kind: TrackKind) -> Self {
        match kind {
            TrackKind::Gene => ImportStage::GeneTrackLoaded,
            TrackKind::Tss => ImportStage::TssTrackLoaded,
            TrackKind::Isoform => ImportStage::IsoformTrackLoaded,
            TrackKind::Cds => ImportStage::CdsTrackLoaded,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ImportStage::RunInfoLoaded => "RunInfoLoaded",
            ImportStage::SamplesLoaded => "SamplesLoaded",
            ImportStage::GeneTrackLoaded => "GeneTrackLoaded",
            ImportStage::TssTrackLoaded => "TSSTrackLoaded",
            ImportStage::IsoformTrackLoaded => "IsoformTrackLoaded",
            ImportStage::CdsTrackLoaded => "CDSTrackLoaded",
            ImportStage::StatsFinalized => "StatsFinalized",
            ImportStage::AnnotationLoaded => "AnnotationLoaded",
            ImportStage::Done => "Done",
        }
    }
}

impl fmt::Display for ImportStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TrackSummary {
    pub track: TrackKind,
    pub features: usize,
    pub data: usize,
    pub diffs: usize,
    pub distribution_diffs: usize,
    pub counts: usize,
    pub replicates: usize,
    pub skipped_rows: usize,
}

impl TrackSummary {
    fn new(track: TrackKind) -> Self {
        Self {
            track,
            features: 0,
            data: 0,
            diffs: 0,
            distribution_diffs: 0,
            counts: 0,
            replicates: 0,
            skipped_rows: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportSummary {
    pub experiment: i64,
    pub title: String,
    pub samples: Vec<String>,
    pub replicates: usize,
    pub tracks: Vec<TrackSummary>,
    pub stats: ExpStat,
    pub stages: Vec<ImportStage>,
    pub annotation: Option<String>,
}

/// Files of one track, located before anything is written.
#[derive(Debug, Clone)]
struct TrackInputs {
    schema: &'static TrackSchema,
    fpkm: PathBuf,
    exp_diff: PathBuf,
    distribution: Option<(&'static DistributionSchema, PathBuf)>,
    count: Option<PathBuf>,
    read_group: Option<PathBuf>,
}

#[derive(Debug, Clone)]
struct Inputs {
    run_info: PathBuf,
    replicates: PathBuf,
    tracks: Vec<TrackInputs>,
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn required(dir: &Path, name: &str, track: &str, role: &str) -> Result<PathBuf, CuffError> {
    resolve_input(dir, name).ok_or_else(|| CuffError::MissingRequiredFile {
        track: track.to_string(),
        role: role.to_string(),
        path: dir.join(name),
    })
}

fn check_columns(path: &Path, columns: &[&str]) -> Result<(), CuffError> {
    let reader = TsvReader::open(path)?;
    for column in columns {
        reader.require_column(column)?;
    }
    Ok(())
}

fn preflight(dir: &Path, options: &ImportOptions) -> Result<Inputs, CuffError> {
    let run_info = required(dir, RUN_INFO_FILE, "experiment", "run info")?;
    check_columns(&run_info, &["param", "value"])?;
    let replicates = required(dir, REPLICATES_FILE, "experiment", "read groups")?;

    let mut tracks = Vec::new();
    for kind in TrackKind::ALL {
        if !options.includes(kind) {
            tracing::info!(track = %kind, "track excluded");
            continue;
        }
        let schema = track_schema(kind);
        let fpkm = required(dir, schema.files.fpkm, kind.as_str(), "FPKM tracking")?;
        let exp_diff = required(dir, schema.files.exp_diff, kind.as_str(), "expression diff")?;
        check_columns(&fpkm, &[TRACKING_ID])?;
        check_columns(&exp_diff, &[TEST_ID])?;

        let distribution = schema
            .distribution
            .map(distribution_schema)
            .filter(|dist| dist.loaded_with == kind)
            .and_then(|dist| match resolve_input(dir, dist.file) {
                Some(path) => Some((dist, path)),
                None => {
                    tracing::warn!(file = dist.file, "distribution diff not found, skipped");
                    None
                }
            });
        tracks.push(TrackInputs {
            schema,
            fpkm,
            exp_diff,
            distribution,
            count: resolve_input(dir, schema.files.count),
            read_group: resolve_input(dir, schema.files.read_group),
        });
    }
    Ok(Inputs {
        run_info,
        replicates,
        tracks,
    })
}

fn default_title(dir: &Path) -> String {
    dir.canonicalize()
        .ok()
        .as_deref()
        .unwrap_or(dir)
        .file_name()
        .map(|name| name.to_string_lossy().replace('_', " "))
        .unwrap_or_else(|| "Untitled".to_string())
}

fn directory_date(dir: &Path) -> String {
    let modified = std::fs::metadata(dir).and_then(|meta| meta.modified());
    match modified {
        Ok(time) => DateTime::<Utc>::from(time).to_rfc3339(),
        Err(err) => {
            tracing::debug!(error = %err, "directory time unavailable, using now");
            Utc::now().to_rfc3339()
        }
    }
}

/// Drops the current row when its identifier is unusable or the line could
/// not be parsed; any other error aborts.
fn skip_row(err: CuffError, path: &Path, line: u64) -> Result<(), CuffError> {
    match err {
        CuffError::InvalidIdentifier(id) => {
            tracing::warn!(file = %file_name(path), line, id = %id, "row skipped");
            Ok(())
        }
        CuffError::MalformedRow { line, message, .. } => {
            tracing::warn!(file = %file_name(path), line, %message, "malformed row skipped");
            Ok(())
        }
        other => Err(other),
    }
}

/// Rows waiting for one bulk insert.
struct Batch {
    entity: Entity,
    rows: Vec<Record>,
    written: usize,
}

impl Batch {
    fn new(entity: Entity) -> Self {
        Self {
            entity,
            rows: Vec::new(),
            written: 0,
        }
    }

    fn flush(&mut self, writer: &Writer<'_>, experiment: ExperimentId) -> Result<(), CuffError> {
        self.written += writer.bulk_insert(self.entity, experiment, &self.rows)?;
        self.rows.clear();
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct FileCount {
    written: usize,
    skipped: usize,
}

struct TrackLoader<'a, 'c> {
    writer: &'a Writer<'c>,
    experiment: ExperimentId,
    samples: &'a [String],
    replicates: &'a BTreeSet<String>,
    batch_size: usize,
}

impl TrackLoader<'_, '_> {
    /// Streams `path` into `entity`, `build` turning each row into zero or
    /// more records.
    fn load<F>(&self, entity: Entity, path: &Path, mut build: F) -> Result<FileCount, CuffError>
    where
        F: FnMut(&Row) -> Result<Vec<Record>, CuffError>,
    {
        let mut reader = TsvReader::open(path)?;
        let mut batch = Batch::new(entity);
        let mut skipped = 0;
        for row in reader.rows() {
            let row = match row {
                Ok(row) => row,
                Err(err) => {
                    skip_row(err, path, 0)?;
                    skipped += 1;
                    continue;
                }
            };
            match build(&row) {
                Ok(records) => batch.rows.extend(records),
                Err(err) => {
                    skip_row(err, path, row.line)?;
                    skipped += 1;
                }
            }
            if batch.rows.len() >= self.batch_size {
                batch.flush(self.writer, self.experiment)?;
            }
        }
        batch.flush(self.writer, self.experiment)?;
        Ok(FileCount {
            written: batch.written,
            skipped,
        })
    }

    /// Base tracks and their FPKM measurements. Tracks are flushed before
    /// the measurements that reference them.
    fn load_fpkm(
        &self,
        schema: &'static TrackSchema,
        path: &Path,
        loaded: &[TrackKind],
    ) -> Result<(FileCount, usize), CuffError> {
        let mut reader = TsvReader::open(path)?;
        let melter = Melter::new(schema, DATA_FIELDS, self.samples, self.experiment);
        let plan = melter.plan(reader.headers());
        tracing::debug!(
            track = %schema.kind,
            columns = plan.resolved_columns(),
            "sample columns resolved"
        );
        let builder = TrackBuilder::new(schema, self.experiment, loaded);

        let mut tracks = Batch::new(Entity::Track(schema.kind));
        let mut data = Batch::new(Entity::Data(schema.kind));
        let mut skipped = 0;
        for row in reader.rows() {
            let row = match row {
                Ok(row) => row,
                Err(err) => {
                    skip_row(err, path, 0)?;
                    skipped += 1;
                    continue;
                }
            };
            let built = builder
                .build(&row)
                .and_then(|track| Ok((track, melter.melt_with(&plan, &row)?)));
            match built {
                Ok((track, melts)) => {
                    tracks.rows.push(track);
                    data.rows
                        .extend(melts.iter().map(|melt| melt.to_row(schema)));
                }
                Err(err) => {
                    skip_row(err, path, row.line)?;
                    skipped += 1;
                }
            }
            if tracks.rows.len() >= self.batch_size || data.rows.len() >= self.batch_size {
                tracks.flush(self.writer, self.experiment)?;
                data.flush(self.writer, self.experiment)?;
            }
        }
        tracks.flush(self.writer, self.experiment)?;
        data.flush(self.writer, self.experiment)?;
        Ok((
            FileCount {
                written: tracks.written,
                skipped,
            },
            data.written,
        ))
    }

    fn load_track(
        &self,
        inputs: &TrackInputs,
        loaded: &[TrackKind],
        sink: &dyn ProgressSink,
    ) -> Result<TrackSummary, CuffError> {
        let schema = inputs.schema;
        let kind = schema.kind;
        let stage = format!("{kind} track");
        let mut summary = TrackSummary::new(kind);
        let in_stage = |path: &Path| {
            let stage = stage.clone();
            let file = file_name(path);
            move |err: CuffError| err.in_stage(&stage, &file)
        };

        let step = |message: String| {
            tracing::info!(track = %kind, "{message}");
            sink.event(ProgressEvent {
                message: format!("track={kind}; {message}"),
                elapsed: None,
            });
        };

        step(format!("processing {}", file_name(&inputs.fpkm)));
        let (features, data) = self
            .load_fpkm(schema, &inputs.fpkm, loaded)
            .map_err(in_stage(&inputs.fpkm))?;
        summary.features = features.written;
        summary.data = data;
        summary.skipped_rows += features.skipped;

        step(format!("processing {}", file_name(&inputs.exp_diff)));
        let builder = DiffBuilder::new(Entity::ExpDiff(kind), schema, self.samples, self.experiment);
        let diffs = self
            .load(builder.entity(), &inputs.exp_diff, |row| {
                builder.build(row).map(|record| vec![record])
            })
            .map_err(in_stage(&inputs.exp_diff))?;
        summary.diffs = diffs.written;
        summary.skipped_rows += diffs.skipped;

        if let Some((dist, path)) = &inputs.distribution {
            if dist.parent == kind || loaded.contains(&dist.parent) {
                step(format!("processing {}", file_name(path)));
                let builder = DiffBuilder::new(
                    Entity::DistributionDiff(dist.kind),
                    track_schema(dist.parent),
                    self.samples,
                    self.experiment,
                );
                let diffs = self
                    .load(builder.entity(), path, |row| {
                        builder.build(row).map(|record| vec![record])
                    })
                    .map_err(in_stage(path))?;
                summary.distribution_diffs = diffs.written;
                summary.skipped_rows += diffs.skipped;
            } else {
                tracing::warn!(
                    file = dist.file,
                    parent = %dist.parent,
                    "parent track not loaded, distribution diff skipped"
                );
            }
        }

        if let Some(path) = &inputs.count {
            step(format!("processing {}", file_name(path)));
            let melter = Melter::new(schema, COUNT_FIELDS, self.samples, self.experiment);
            let mut plan = None;
            let counts = self
                .load(Entity::Count(kind), path, |row| {
                    let plan = plan.get_or_insert_with(|| melter.plan(row.columns()));
                    let melts = melter.melt_with(plan, row)?;
                    Ok(melts.iter().map(|melt| melt.to_row(schema)).collect())
                })
                .map_err(in_stage(path))?;
            summary.counts = counts.written;
            summary.skipped_rows += counts.skipped;
        }

        if let Some(path) = &inputs.read_group {
            step(format!("processing {}", file_name(path)));
            let builder =
                ReplicateRowBuilder::new(schema, self.samples, self.replicates, self.experiment);
            let replicates = self
                .load(Entity::ReplicateData(kind), path, |row| {
                    builder.build(row).map(|record| vec![record])
                })
                .map_err(in_stage(path))?;
            summary.replicates = replicates.written;
            summary.skipped_rows += replicates.skipped;
        }

        if summary.skipped_rows > 0 {
            tracing::warn!(track = %kind, skipped = summary.skipped_rows, "rows skipped");
        }
        Ok(summary)
    }
}

fn stats_from(summaries: &[TrackSummary]) -> ExpStat {
    let mut stats = ExpStat::default();
    for summary in summaries {
        let features = summary.features as i64;
        let distribution = summary.distribution_diffs as i64;
        match summary.track {
            TrackKind::Gene => {
                stats.gene_count = features;
                stats.promoter_count = distribution;
            }
            TrackKind::Tss => {
                stats.tss_count = features;
                stats.splicing_count = distribution;
            }
            TrackKind::Isoform => stats.isoform_count = features,
            TrackKind::Cds => {
                stats.cds_count = features;
                stats.relcds_count = distribution;
            }
        }
    }
    stats
}

/// Imports one Cuffdiff output directory as a new experiment.
///
/// Every required file is located before anything is written. The whole
/// import runs in one transaction; on error nothing is committed.
pub fn import_experiment(
    store: &mut Store,
    dir: &Path,
    options: &ImportOptions,
    sink: &dyn ProgressSink,
) -> Result<ImportSummary, CuffError> {
    if !dir.is_dir() {
        return Err(CuffError::MissingDirectory(dir.to_path_buf()));
    }
    if options.batch_size == 0 {
        return Err(CuffError::InvalidArgument("batch size must be positive".to_string()));
    }
    let start = Instant::now();
    let inputs = preflight(dir, options)?;

    let mut stages = Vec::new();
    let mut reached = |stage: ImportStage, detail: String| {
        tracing::info!(stage = %stage, "{detail}");
        sink.event(ProgressEvent {
            message: format!("stage={stage}; {detail}"),
            elapsed: Some(start.elapsed()),
        });
        stages.push(stage);
    };

    let title = options
        .title
        .clone()
        .unwrap_or_else(|| default_title(dir));
    let date = directory_date(dir);
    let writer = store.writer()?;
    let experiment = writer.create_experiment(&NewExperiment {
        title: title.clone(),
        species: options.species.clone(),
        library: options.library.clone(),
        description: options.description.clone(),
        run_date: Some(date.clone()),
        analysis_date: Some(date),
    })?;
    tracing::info!(experiment = %experiment, title = %title, "experiment created");

    let mut run_info = TsvReader::open(&inputs.run_info)?;
    let mut entries = 0;
    for row in run_info.rows() {
        let row = row?;
        let (Some(key), Some(value)) = (row.get("param"), row.get("value")) else {
            continue;
        };
        writer
            .insert_run_info(experiment, key, value)
            .map_err(|err| err.in_stage("run info", RUN_INFO_FILE))?;
        entries += 1;
    }
    if let Some(build) = &options.genome_build {
        writer.insert_run_info(experiment, "genome", build)?;
        entries += 1;
    }
    reached(ImportStage::RunInfoLoaded, format!("{entries} run info entries"));

    let replicate_entries = read_replicates(&inputs.replicates)?;
    let samples = conditions(&replicate_entries);
    for sample in &samples {
        writer
            .register_sample(experiment, sample)
            .map_err(|err| err.in_stage("samples", REPLICATES_FILE))?;
    }
    let replicate_records: Vec<Record> = replicate_entries
        .iter()
        .map(|entry| {
            let mut record = entry.to_record(experiment);
            record.insert(SAMPLE_PK, synth_key(&entry.condition, experiment));
            record
        })
        .collect();
    writer
        .bulk_insert(Entity::Replicate, experiment, &replicate_records)
        .map_err(|err| err.in_stage("samples", REPLICATES_FILE))?;
    let replicate_keys: BTreeSet<String> = replicate_entries
        .iter()
        .map(|entry| entry.key(experiment))
        .collect();
    reached(
        ImportStage::SamplesLoaded,
        format!(
            "{} samples, {} replicates",
            samples.len(),
            replicate_entries.len()
        ),
    );

    let loader = TrackLoader {
        writer: &writer,
        experiment,
        samples: &samples,
        replicates: &replicate_keys,
        batch_size: options.batch_size,
    };
    let mut loaded = Vec::new();
    let mut summaries = Vec::new();
    for track in &inputs.tracks {
        let summary = loader.load_track(track, &loaded, sink)?;
        loaded.push(track.schema.kind);
        reached(
            ImportStage::track_loaded(track.schema.kind),
            format!("{} features", summary.features),
        );
        summaries.push(summary);
    }

    let stats = stats_from(&summaries);
    writer.write_stats(experiment, &stats)?;
    reached(ImportStage::StatsFinalized, "summary counts stored".to_string());

    let mut annotation = None;
    if let Some(gtf) = &options.gtf {
        if gtf.is_file() {
            let path = gtf.display().to_string();
            writer.insert_run_info(experiment, "gtf", &path)?;
            reached(ImportStage::AnnotationLoaded, format!("annotation {path} recorded"));
            annotation = Some(path);
        } else {
            tracing::warn!(path = %gtf.display(), "annotation file not found, skipped");
        }
    }

    writer.activate(experiment)?;
    writer.commit()?;
    reached(ImportStage::Done, format!("experiment {experiment} imported"));

    Ok(ImportSummary {
        experiment: experiment.get(),
        title,
        samples,
        replicates: replicate_entries.len(),
        tracks: summaries,
        stats,
        stages,
        annotation,
    })
}
