use std::path::PathBuf;
use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use cuffbase::config::{ConfigLoader, ResolvedConfig};
use cuffbase::domain::{ExperimentId, TrackKind};
use cuffbase::error::{CuffError, ErrorClass};
use cuffbase::import::{ImportOptions, import_experiment};
use cuffbase::output::{
    ConsoleOutput, DeleteResult, JsonOutput, ListEntry, ListResult, OutputMode, QueryResult,
    StatsResult,
};
use cuffbase::query::{Filter, Ordering, Query};
use cuffbase::schema::Entity;
use cuffbase::store::Store;

#[derive(Parser)]
#[command(name = "cuffbase")]
#[command(about = "Import Cuffdiff output into a relational store and query it")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    non_interactive: bool,

    /// SQLite database file.
    #[arg(long, global = true)]
    db: Option<Utf8PathBuf>,

    /// JSON config file (defaults to ./cuffbase.json when present).
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Import a Cuffdiff output directory as a new experiment")]
    Import(ImportArgs),
    #[command(about = "List imported experiments")]
    List,
    #[command(about = "Show an experiment and its summary counts")]
    Stats(ExperimentArgs),
    #[command(about = "Query rows of one entity within an experiment")]
    Query(QueryArgs),
    #[command(about = "Delete an experiment and everything it owns")]
    Delete(ExperimentArgs),
}

#[derive(Args)]
struct ImportArgs {
    dir: PathBuf,

    #[arg(long)]
    title: Option<String>,

    #[arg(long)]
    species: Option<String>,

    #[arg(long)]
    library: Option<String>,

    #[arg(long)]
    description: Option<String>,

    /// Track kind to skip; repeatable.
    #[arg(long)]
    exclude: Vec<TrackKind>,

    #[arg(long)]
    genome_build: Option<String>,

    #[arg(long)]
    gtf: Option<PathBuf>,

    #[arg(long)]
    batch_size: Option<usize>,
}

#[derive(Args)]
struct ExperimentArgs {
    experiment: ExperimentId,
}

#[derive(Args)]
struct QueryArgs {
    experiment: ExperimentId,

    /// Table name, e.g. gene_exp_diff_data.
    entity: Entity,

    /// `field__lookup=value`; repeatable.
    #[arg(long = "filter")]
    filters: Vec<Filter>,

    /// Field name, `-` prefix for descending; repeatable.
    #[arg(long = "order", allow_hyphen_values = true)]
    ordering: Vec<Ordering>,

    #[arg(long)]
    limit: Option<u64>,

    #[arg(long)]
    offset: Option<u64>,

    /// Print every column instead of the display fields.
    #[arg(long)]
    all_fields: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<CuffError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &CuffError) -> u8 {
    match error.class() {
        ErrorClass::Configuration => 2,
        ErrorClass::Integrity => 3,
        ErrorClass::Data | ErrorClass::Other => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    let config = ConfigLoader::resolve(cli.config.as_deref())?;
    let db_path = match cli.db.clone().or_else(|| config.database.clone()) {
        Some(path) => path,
        None => Store::default_path()?,
    };
    tracing::debug!(db = %db_path, "opening store");
    let mut store = Store::open(&db_path)?;

    match cli.command {
        Commands::Import(args) => run_import(args, &config, &mut store, output_mode),
        Commands::List => run_list(&store, output_mode),
        Commands::Stats(args) => run_stats(args, &store, output_mode),
        Commands::Query(args) => run_query(args, &store, output_mode),
        Commands::Delete(args) => run_delete(args, &mut store, output_mode),
    }
}

fn import_options(args: ImportArgs, config: &ResolvedConfig) -> ImportOptions {
    let mut exclude = config.exclude.clone();
    for kind in args.exclude {
        if !exclude.contains(&kind) {
            exclude.push(kind);
        }
    }
    ImportOptions {
        title: args.title,
        species: args.species.unwrap_or_else(|| config.species.clone()),
        library: args.library.unwrap_or_else(|| config.library.clone()),
        description: args.description,
        exclude,
        genome_build: args.genome_build.or_else(|| config.genome_build.clone()),
        gtf: args.gtf,
        batch_size: args.batch_size.unwrap_or(config.batch_size),
    }
}

fn run_import(
    args: ImportArgs,
    config: &ResolvedConfig,
    store: &mut Store,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let dir = args.dir.clone();
    let options = import_options(args, config);
    match output_mode {
        OutputMode::Interactive => {
            let summary = import_experiment(store, &dir, &options, &ConsoleOutput)?;
            ConsoleOutput::print_import(&summary);
        }
        OutputMode::NonInteractive => {
            let summary = import_experiment(store, &dir, &options, &JsonOutput)?;
            JsonOutput::print_import(&summary).into_diagnostic()?;
        }
    }
    Ok(())
}

fn run_list(store: &Store, output_mode: OutputMode) -> miette::Result<()> {
    let experiments = store
        .experiments()?
        .into_iter()
        .map(|experiment| {
            let stats = store.stats(ExperimentId::new(experiment.id))?;
            Ok(ListEntry { experiment, stats })
        })
        .collect::<Result<Vec<_>, CuffError>>()?;
    let result = ListResult { experiments };
    match output_mode {
        OutputMode::Interactive => ConsoleOutput::print_list(&result),
        OutputMode::NonInteractive => JsonOutput::print_list(&result).into_diagnostic()?,
    }
    Ok(())
}

fn run_stats(args: ExperimentArgs, store: &Store, output_mode: OutputMode) -> miette::Result<()> {
    let id = args.experiment;
    let result = StatsResult {
        experiment: store.experiment(id)?,
        samples: store.samples(id)?,
        run_info: store.run_info(id)?,
        stats: store.stats(id)?,
    };
    match output_mode {
        OutputMode::Interactive => ConsoleOutput::print_stats(&result),
        OutputMode::NonInteractive => JsonOutput::print_stats(&result).into_diagnostic()?,
    }
    Ok(())
}

fn run_query(args: QueryArgs, store: &Store, output_mode: OutputMode) -> miette::Result<()> {
    let id = args.experiment;
    store.experiment(id)?;

    let mut query = Query::new(args.entity, id);
    for filter in args.filters {
        query = query.filter(filter);
    }
    for ordering in args.ordering {
        query = query.order_by(ordering);
    }
    if let Some(limit) = args.limit {
        query = query.limit(limit);
    }
    if let Some(offset) = args.offset {
        query = query.offset(offset);
    }

    let fields = if args.all_fields {
        args.entity.columns().iter().map(|column| column.name).collect()
    } else {
        args.entity.display_fields()
    };
    let result = QueryResult {
        experiment: id.get(),
        entity: args.entity.to_string(),
        fields,
        rows: store.query(&query)?,
    };
    match output_mode {
        OutputMode::Interactive => ConsoleOutput::print_query(&result),
        OutputMode::NonInteractive => JsonOutput::print_query(&result).into_diagnostic()?,
    }
    Ok(())
}

fn run_delete(args: ExperimentArgs, store: &mut Store, output_mode: OutputMode) -> miette::Result<()> {
    let id = args.experiment;
    store.delete_experiment(id)?;
    let result = DeleteResult {
        experiment: id.get(),
        deleted: true,
    };
    match output_mode {
        OutputMode::Interactive => ConsoleOutput::print_delete(&result),
        OutputMode::NonInteractive => JsonOutput::print_delete(&result).into_diagnostic()?,
    }
    Ok(())
}
