//! Library interface for the stagecheck CLI

use anyhow::{Context, Result};
use clap::{ArgAction, Args, CommandFactory, FromArgMatches, Parser, Subcommand, ValueEnum};
use std::ffi::OsString;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use tracing::{error, info};

use stagecheck_core::{StoreLocation, ValidationKey};
use stagecheck_verification::{validate, ConfigError, Registry, RunReport, RunSummary};

/// Exit status for configuration errors (unknown variant, bad `--id`,
/// unreadable repository).
pub const CONFIG_ERROR_EXIT: i32 = 2;

#[derive(Parser, Debug)]
#[command(name = "stagecheck")]
#[command(version, about = "Acceptance checks for pipeline stage outputs", long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Enable debug output
    #[arg(short, long)]
    pub debug: bool,

    /// Log line format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate the outputs of one pipeline stage
    Validate(ValidateArgs),

    /// List the registered validation variants
    List,
}

#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Validation variant, e.g. SfmValidation
    pub variant: String,

    /// Repository root
    #[arg(env = "STAGECHECK_REPO")]
    pub repo: PathBuf,

    /// Read outputs of this rerun
    #[arg(long)]
    pub rerun: Option<String>,

    /// Read outputs of this collection
    #[arg(long)]
    pub collection: Option<String>,

    /// Reference catalog for resolving match reference ids
    #[arg(long)]
    pub refcat: Option<PathBuf>,

    /// Validation key; repeat for more keys. `^` separates alternatives,
    /// e.g. `--id visit=903334^903336 detector=16`
    #[arg(long = "id", value_name = "KEY=VALUE", num_args = 1.., action = ArgAction::Append)]
    pub ids: Vec<String>,

    /// Write a run report to this file
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Emit the report as JSON instead of markdown
    #[arg(long)]
    pub json: bool,
}

/// Parsed command line, with `--id` tokens grouped by occurrence.
#[derive(Debug)]
pub struct Invocation {
    pub cli: Cli,
    pub id_groups: Vec<Vec<String>>,
}

pub fn parse_from<I, T>(args: I) -> Result<Invocation, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let matches = Cli::command().try_get_matches_from(args)?;
    let cli = Cli::from_arg_matches(&matches)?;

    let id_groups = matches
        .subcommand_matches("validate")
        .and_then(|m| m.get_occurrences::<String>("ids"))
        .map(|occurrences| occurrences.map(|group| group.cloned().collect()).collect())
        .unwrap_or_default();

    Ok(Invocation { cli, id_groups })
}

/// Turn `--id` groups into keys, expanding `^` alternatives.
pub fn keys_from_groups(groups: &[Vec<String>]) -> Result<Vec<ValidationKey>, ConfigError> {
    let mut keys = Vec::new();
    for group in groups {
        keys.extend(ValidationKey::parse_tokens(group)?);
    }
    Ok(keys)
}

/// Run the parsed command and return the process exit code.
pub fn run(invocation: &Invocation) -> Result<i32> {
    let registry = Registry::builtin().context("Built-in variant registry is inconsistent")?;

    match invocation.cli.command {
        Commands::List => {
            list_variants(&registry, &mut io::stdout().lock())?;
            Ok(0)
        }
        Commands::Validate(ref args) => run_validate(&registry, args, &invocation.id_groups),
    }
}

pub fn list_variants<W: Write>(registry: &Registry, out: &mut W) -> io::Result<()> {
    for spec in registry.iter() {
        writeln!(out, "{:<30} {}", spec.name, spec.description)?;
    }
    Ok(())
}

fn run_validate(
    registry: &Registry,
    args: &ValidateArgs,
    id_groups: &[Vec<String>],
) -> Result<i32> {
    let keys = keys_from_groups(id_groups).context("Invalid --id")?;

    let mut location = StoreLocation::new(&args.repo);
    if let Some(ref rerun) = args.rerun {
        location = location.with_rerun(rerun);
    }
    if let Some(ref collection) = args.collection {
        location = location.with_collection(collection);
    }

    info!(
        "Validating {} in {} ({} keys)",
        args.variant,
        location.data_root().display(),
        keys.len().max(1)
    );

    let summary = validate(registry, &args.variant, &location, args.refcat.as_deref(), &keys)
        .with_context(|| format!("Cannot run {}", args.variant))?;

    // Output failures are reported but never mask the validation result.
    if let Err(e) = emit(&summary, args) {
        error!("{:#}", e);
        eprintln!("Error: {:#}", e);
    }

    Ok(summary.exit_code())
}

fn emit(summary: &RunSummary, args: &ValidateArgs) -> Result<()> {
    let report = RunReport::from_summary(summary);
    let rendered = if args.json {
        report.to_json()?
    } else {
        report.to_markdown()
    };

    match args.report {
        Some(ref path) => {
            fs::write(path, &rendered)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            info!("Report written to: {}", path.display());
            print_summary(summary, &mut io::stdout().lock())?;
        }
        None if args.json => writeln!(io::stdout().lock(), "{}", rendered)?,
        None => print_summary(summary, &mut io::stdout().lock())?,
    }
    Ok(())
}

/// Process exit status for an error returned by [`run`]: configuration
/// errors exit 2, anything else 1.
pub fn error_exit_code(error: &anyhow::Error) -> i32 {
    if error.downcast_ref::<ConfigError>().is_some() {
        CONFIG_ERROR_EXIT
    } else {
        1
    }
}

/// One line per key: `<variant> <key>: PASS|FAIL`.
pub fn print_summary<W: Write>(summary: &RunSummary, out: &mut W) -> io::Result<()> {
    for outcome in &summary.outcomes {
        let status = if outcome.passed() { "PASS" } else { "FAIL" };
        writeln!(out, "{} {}: {}", summary.variant, outcome.key, status)?;
        if let Some(ref failure) = outcome.failure {
            writeln!(out, "    {}", failure)?;
        }
    }
    Ok(())
}
