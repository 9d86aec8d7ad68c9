#![deny(clippy::all, warnings)]

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

use repomill_core::{
    load_persisted, load_tag_file, materialize_all, promote_tag, resolve_tags, run_fleet, Config,
    ExecutionOutcome, Overrides, PipelineError, TagReport, EXIT_CONFIG, EXIT_EMPTY, EXIT_FAILURES,
    EXIT_OK,
};

const EXAMPLES: &str = "\
Examples:
  repomill resolve --prune
  repomill promote osg-24-main-el9-release
  repomill promote-all --tag 'osg-24-*' --tag 'devops-*'
";

#[derive(Parser)]
#[command(
    name = "repomill",
    version,
    about = "Mirror and promote build-tag package repositories",
    after_help = EXAMPLES
)]
struct Cli {
    /// Config file (defaults to /etc/repomill.toml when present)
    #[arg(long, global = true, env = "REPOMILL_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Emit the result as JSON on stdout
    #[arg(long, global = true)]
    json: bool,

    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Only log warnings and errors
    #[arg(long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Publish under this root instead of the configured one
    #[arg(long, global = true, value_name = "DIR")]
    destroot: Option<PathBuf>,

    /// Directory for lock files
    #[arg(long, global = true, value_name = "DIR")]
    lock_dir: Option<PathBuf>,

    /// Directory for per-tag logs
    #[arg(long, global = true, value_name = "DIR")]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Refresh the tag set from the build-system catalog and regenerate
    /// repo definitions
    Resolve(ResolveArgs),
    /// Run the full pipeline for a single tag
    Promote(PromoteArgs),
    /// Run the full pipeline for every tag in the persisted set
    PromoteAll(PromoteAllArgs),
}

#[derive(Args)]
struct ResolveArgs {
    /// Reuse the persisted tag set instead of querying the catalog
    #[arg(long)]
    skip_refresh: bool,

    /// Only refresh the tag set, skip repo definition generation
    #[arg(long, conflicts_with = "prune")]
    tags_only: bool,

    /// Remove repo definitions for tags that left the set
    #[arg(long)]
    prune: bool,
}

#[derive(Args)]
struct PromoteArgs {
    /// Build tag, e.g. osg-24-main-el9-release
    tag: String,
}

#[derive(Args)]
struct PromoteAllArgs {
    /// Only promote tags matching this glob (repeatable)
    #[arg(long = "tag", value_name = "GLOB")]
    tags: Vec<String>,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);
    let (outcome, code) = run(&cli);
    emit(&outcome, cli.json);
    std::process::exit(code);
}

fn init_tracing(verbosity: u8, quiet: bool) {
    let level = if quiet {
        "warn"
    } else {
        match verbosity {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "repomill={level},repomill_core={level},repomill_domain={level}"
        ))
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: &Cli) -> (ExecutionOutcome, i32) {
    let overrides = Overrides {
        dest_root: cli.destroot.clone(),
        lock_dir: cli.lock_dir.clone(),
        log_dir: cli.log_dir.clone(),
    };
    let config = match Config::load(cli.config.as_deref(), &overrides) {
        Ok(config) => config,
        Err(err) => {
            return (
                ExecutionOutcome::failure(format!("{err:#}"), Value::Null),
                EXIT_CONFIG,
            )
        }
    };

    match &cli.command {
        Commands::Resolve(args) => cmd_resolve(&config, args),
        Commands::Promote(args) => cmd_promote(&config, args),
        Commands::PromoteAll(args) => cmd_promote_all(&config, args),
    }
}

fn cmd_resolve(config: &Config, args: &ResolveArgs) -> (ExecutionOutcome, i32) {
    let tags = if args.skip_refresh {
        load_persisted(config)
    } else {
        resolve_tags(config)
    };
    let tags = match tags {
        Ok(tags) => tags,
        Err(err) => {
            return (
                ExecutionOutcome::failure(err.to_string(), Value::Null),
                err.exit_code(),
            )
        }
    };

    let mut details = json!({ "tags": tags.iter().collect::<Vec<_>>() });
    let mut message = format!("resolved {} tag(s)", tags.len());
    if !args.tags_only {
        match materialize_all(config, &tags, args.prune) {
            Ok(summary) => {
                message.push_str(&format!(
                    ", wrote {} repo definition(s)",
                    summary.written
                ));
                if summary.pruned > 0 {
                    message.push_str(&format!(", pruned {}", summary.pruned));
                }
                details["materialized"] = json!(summary);
            }
            Err(err) => {
                return (
                    ExecutionOutcome::failure(format!("{err:#}"), Value::Null),
                    EXIT_FAILURES,
                )
            }
        }
    }
    (ExecutionOutcome::success(message, details), EXIT_OK)
}

fn cmd_promote(config: &Config, args: &PromoteArgs) -> (ExecutionOutcome, i32) {
    let create_only = match load_tag_file(&config.create_only_path()) {
        Ok(set) => set,
        Err(err) => {
            return (
                ExecutionOutcome::failure(format!("{err:#}"), Value::Null),
                EXIT_FAILURES,
            )
        }
    };

    let mut report = TagReport::new();
    let result = promote_tag(config, &args.tag, &create_only, &mut report);
    if let Err(err) = report.write_to(&config.paths.log_dir, &args.tag) {
        tracing::error!(tag = %args.tag, %err, "could not write tag logs");
    }

    match result {
        Ok(()) => (
            ExecutionOutcome::success(
                format!("{} promoted", args.tag),
                json!({ "tag": args.tag }),
            ),
            EXIT_OK,
        ),
        Err(err @ PipelineError::Usage(_)) => {
            let code = err.exit_code();
            (ExecutionOutcome::user_error(err.to_string()), code)
        }
        Err(err) => {
            let code = err.exit_code();
            (
                ExecutionOutcome::failure(err.to_string(), json!({ "tag": args.tag })),
                code,
            )
        }
    }
}

fn cmd_promote_all(config: &Config, args: &PromoteAllArgs) -> (ExecutionOutcome, i32) {
    match run_fleet(config, &args.tags) {
        Ok(summary) if summary.total() == 0 => (
            ExecutionOutcome::user_error("no tags to promote"),
            EXIT_EMPTY,
        ),
        Ok(summary) if summary.failed.is_empty() => (
            ExecutionOutcome::success(
                format!("promoted {} tag(s)", summary.succeeded.len()),
                json!(summary),
            ),
            EXIT_OK,
        ),
        Ok(summary) => (
            ExecutionOutcome::failure(
                format!(
                    "{} of {} tag(s) failed",
                    summary.failed.len(),
                    summary.total()
                ),
                json!(summary),
            ),
            EXIT_FAILURES,
        ),
        Err(err) => (
            ExecutionOutcome::failure(err.to_string(), Value::Null),
            err.exit_code(),
        ),
    }
}

fn emit(outcome: &ExecutionOutcome, json: bool) {
    if json {
        match serde_json::to_string_pretty(outcome) {
            Ok(text) => println!("{text}"),
            Err(err) => eprintln!("could not serialize outcome: {err}"),
        }
    } else if matches!(outcome.status, repomill_core::CommandStatus::Ok) {
        println!("{}", outcome.message);
    } else {
        eprintln!("{}", outcome.message);
    }
}
