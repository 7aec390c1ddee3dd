use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};

use notspam::config::NotspamConfig;
use notspam::engine::{EngineRegistry, Meat, null};
use notspam::error::{ConfigError, Error, RegistryError};
use notspam::pipeline::{
    ClassifyOptions, Reporter, TrainOptions, classify, parse_directives, train,
};
use notspam::store::{
    AccessMode, IndexReport, LibSqlStore, MessageStore, Query, StoreSession, index_path,
};

/// Exit status for configuration and usage errors.
const EXIT_CONFIG: u8 = 2;
/// Exit status for errors that aborted a batch.
const EXIT_FATAL: u8 = 1;
/// Exit status after Ctrl-C.
const EXIT_INTERRUPTED: u8 = 130;

#[derive(Parser)]
#[command(
    name = "notspam",
    version,
    about = "Train and run spam filters against a tagged mail index"
)]
struct Cli {
    /// Engine to use instead of NOTSPAM_CLASSIFIER.
    #[arg(long, global = true, value_name = "NAME")]
    engine: Option<String>,

    /// Print run summaries as JSON.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Train the engine on matching messages.
    Train(TrainArgs),
    /// Classify matching messages and tag them by verdict.
    Classify(ClassifyArgs),
    /// Classify matching messages without tagging (classify --dry).
    Check(Terms),
    /// List available engines; the selected one is marked.
    Engines,
    /// Add mail files or maildirs to the index.
    Index {
        #[arg(required = true, value_name = "PATH")]
        paths: Vec<PathBuf>,
    },
    /// List matching messages with their tags.
    Search(Terms),
}

#[derive(Args)]
struct TrainArgs {
    /// Go through the motions: no engine state or tag is touched.
    #[arg(long)]
    dry: bool,

    /// Unlearn each message from the other class first.
    #[arg(long)]
    retrain: bool,

    /// Tag directives applied to each trained message, e.g. `+spam,-inbox`.
    #[arg(long, value_name = "TAGS", default_value = "")]
    tags: String,

    /// `ham` or `spam`.
    meat: String,

    #[command(flatten)]
    terms: Terms,
}

#[derive(Args)]
struct ClassifyArgs {
    /// Tag directives for spam verdicts.
    #[arg(long, value_name = "TAGS", default_value = "")]
    spam: String,

    /// Tag directives for ham verdicts.
    #[arg(long, value_name = "TAGS", default_value = "")]
    ham: String,

    /// Tag directives for unknown verdicts.
    #[arg(long, value_name = "TAGS", default_value = "")]
    unk: String,

    /// Classify without tagging.
    #[arg(long)]
    dry: bool,

    #[command(flatten)]
    terms: Terms,
}

#[derive(Args)]
struct Terms {
    /// Search terms, e.g. `tag:inbox not tag:spam`.
    #[arg(value_name = "TERMS", trailing_var_arg = true, allow_hyphen_values = true)]
    terms: Vec<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();

    tokio::select! {
        result = run(cli) => match result {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("Error: {e:#}");
                ExitCode::from(exit_status(&e))
            }
        },
        _ = tokio::signal::ctrl_c() => {
            eprintln!("\nInterrupted");
            ExitCode::from(EXIT_INTERRUPTED)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = NotspamConfig::from_env()?;
    let engine_name = match cli.engine.as_deref() {
        Some(name) => name.trim().to_lowercase(),
        None => config.engine.clone(),
    };
    let registry = EngineRegistry::builtin(config.engine_options.clone());
    tracing::debug!(
        engines = registry.count(),
        engine = %engine_name,
        db = %config.db_path.display(),
        "Starting"
    );

    match cli.command {
        Command::Engines => {
            for name in registry.list() {
                let marker = if name == engine_name { "*" } else { " " };
                println!("{marker} {name}");
            }
        }

        Command::Train(args) => {
            let meat: Meat = args.meat.parse()?;
            let tags = parse_directives(&args.tags)?;
            let search = search_terms(&args.terms.terms)?;
            let mut engine = registry.load(&engine_name)?;
            if args.dry {
                engine = registry.load(null::NAME)?;
            }

            let store = open_store(&config).await?;
            let mut reporter = Reporter::stdio(config.audit_log, cli.json);
            let options = TrainOptions {
                meat,
                retrain: args.retrain,
                tags,
                dry: args.dry,
            };
            train(engine.as_ref(), &store, &search, &options, &mut reporter).await?;
        }

        Command::Classify(args) => {
            let options = ClassifyOptions {
                spam_tags: parse_directives(&args.spam)?,
                ham_tags: parse_directives(&args.ham)?,
                unk_tags: parse_directives(&args.unk)?,
                dry: args.dry,
            };
            run_classify(&config, cli.json, &registry, &engine_name, &args.terms, options).await?;
        }

        Command::Check(terms) => {
            let options = ClassifyOptions {
                dry: true,
                ..ClassifyOptions::default()
            };
            run_classify(&config, cli.json, &registry, &engine_name, &terms, options).await?;
        }

        Command::Index { paths } => {
            let store = open_store(&config).await?;
            let session = store.open_session(AccessMode::ReadWrite).await?;
            let mut total = IndexReport::default();
            for path in &paths {
                let report = index_path(&session, path, &config.new_tags)
                    .await
                    .with_context(|| format!("Failed to index {}", path.display()))?;
                total.added += report.added;
                total.duplicates += report.duplicates;
                total.skipped += report.skipped;
            }
            Box::new(session).close().await?;

            if cli.json {
                eprintln!("{}", serde_json::to_string(&total)?);
            } else {
                eprintln!(
                    "indexed {} new messages ({} already indexed, {} skipped)",
                    total.added, total.duplicates, total.skipped
                );
            }
        }

        Command::Search(terms) => {
            let search = search_terms(&terms.terms)?;
            let store = open_store(&config).await?;
            let session = store.open(AccessMode::ReadOnly).await?;
            let Query {
                mut messages, ..
            } = session.query(&search).await?;
            while let Some(message) = messages.next().await? {
                let tags: Vec<String> = message.tags().await?.into_iter().collect();
                println!("id:{} ({})", message.id(), tags.join(" "));
            }
        }
    }

    Ok(())
}

async fn run_classify(
    config: &NotspamConfig,
    json: bool,
    registry: &EngineRegistry,
    engine_name: &str,
    terms: &Terms,
    options: ClassifyOptions,
) -> anyhow::Result<()> {
    let search = search_terms(&terms.terms)?;
    let engine = registry.load(engine_name)?;

    let store = open_store(config).await?;
    let mut reporter = Reporter::stdio(config.audit_log, json);
    classify(engine.as_ref(), &store, &search, &options, &mut reporter).await?;
    Ok(())
}

async fn open_store(config: &NotspamConfig) -> anyhow::Result<LibSqlStore> {
    LibSqlStore::new_local(&config.db_path)
        .await
        .with_context(|| format!("Failed to open index at {}", config.db_path.display()))
}

/// Join search terms into one search string. Empty terms are refused.
fn search_terms(terms: &[String]) -> Result<String, ConfigError> {
    let search = terms
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    if search.is_empty() {
        return Err(ConfigError::MissingRequired {
            key: "search terms".into(),
            hint: "Pass at least one term, e.g. `tag:inbox`.".into(),
        });
    }
    Ok(search)
}

fn exit_status(err: &anyhow::Error) -> u8 {
    let configuration = err.chain().any(|cause| {
        cause.downcast_ref::<ConfigError>().is_some()
            || cause.downcast_ref::<RegistryError>().is_some()
            || cause
                .downcast_ref::<Error>()
                .is_some_and(Error::is_configuration)
    });
    if configuration { EXIT_CONFIG } else { EXIT_FATAL }
}
