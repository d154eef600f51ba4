use std::io::{self, Write};

use serde::Serialize;

use crate::import::{ImportSummary, ProgressEvent, ProgressSink};
use crate::record::{NA, Record};
use crate::store::{ExpStat, Experiment, Sample};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListEntry {
    #[serde(flatten)]
    pub experiment: Experiment,
    pub stats: Option<ExpStat>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListResult {
    pub experiments: Vec<ListEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsResult {
    pub experiment: Experiment,
    pub samples: Vec<Sample>,
    pub run_info: Vec<(String, String)>,
    pub stats: Option<ExpStat>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub experiment: i64,
    pub entity: String,
    pub fields: Vec<&'static str>,
    pub rows: Vec<Record>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteResult {
    pub experiment: i64,
    pub deleted: bool,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_import(result: &ImportSummary) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_list(result: &ListResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_stats(result: &StatsResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_query(result: &QueryResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_delete(result: &DeleteResult) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Human-readable output: progress on stderr, results on stdout.
pub struct ConsoleOutput;

impl ProgressSink for ConsoleOutput {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => eprintln!("[{:>7.2}s] {}", elapsed.as_secs_f64(), event.message),
            None => eprintln!("          {}", event.message),
        }
    }
}

fn stat_line(stats: &ExpStat) -> String {
    format!(
        "genes={} promoters={} tss={} splicing={} isoforms={} cds={} relcds={}",
        stats.gene_count,
        stats.promoter_count,
        stats.tss_count,
        stats.splicing_count,
        stats.isoform_count,
        stats.cds_count,
        stats.relcds_count
    )
}

impl ConsoleOutput {
    pub fn print_import(result: &ImportSummary) {
        println!("Imported experiment {}: {}", result.experiment, result.title);
        println!(
            "  samples: {} ({} replicates)",
            result.samples.join(", "),
            result.replicates
        );
        for track in &result.tracks {
            println!(
                "  {:<8} features={} fpkm={} diff={} dist={} counts={} replicates={}",
                track.track.as_str(),
                track.features,
                track.data,
                track.diffs,
                track.distribution_diffs,
                track.counts,
                track.replicates
            );
            if track.skipped_rows > 0 {
                println!("           skipped rows: {}", track.skipped_rows);
            }
        }
        if let Some(annotation) = &result.annotation {
            println!("  annotation: {annotation}");
        }
        println!("  {}", stat_line(&result.stats));
    }

    pub fn print_list(result: &ListResult) {
        if result.experiments.is_empty() {
            println!("No experiments.");
            return;
        }
        for entry in &result.experiments {
            let experiment = &entry.experiment;
            println!(
                "{:>4}  {}  [{} / {}]",
                experiment.id, experiment.title, experiment.species, experiment.library
            );
            if let Some(stats) = &entry.stats {
                println!("      {}", stat_line(stats));
            }
        }
    }

    pub fn print_stats(result: &StatsResult) {
        let experiment = &result.experiment;
        println!("Experiment {}: {}", experiment.id, experiment.title);
        println!("  species: {}", experiment.species);
        println!("  library: {}", experiment.library);
        if let Some(description) = &experiment.description {
            println!("  description: {description}");
        }
        if let Some(date) = &experiment.run_date {
            println!("  run date: {date}");
        }
        for sample in &result.samples {
            println!("  sample {}: {}", sample.index, sample.name);
        }
        for (key, value) in &result.run_info {
            println!("  {key}: {value}");
        }
        match &result.stats {
            Some(stats) => println!("  {}", stat_line(stats)),
            None => println!("  no summary counts"),
        }
    }

    /// Tab-separated table of the display fields.
    pub fn print_query(result: &QueryResult) {
        println!("{}", result.fields.join("\t"));
        for row in &result.rows {
            let cells: Vec<String> = result
                .fields
                .iter()
                .map(|field| {
                    row.get(field)
                        .map(ToString::to_string)
                        .unwrap_or_else(|| NA.to_string())
                })
                .collect();
            println!("{}", cells.join("\t"));
        }
        eprintln!("{} rows", result.rows.len());
    }

    pub fn print_delete(result: &DeleteResult) {
        println!("Deleted experiment {}", result.experiment);
    }
}
