use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use similar::{ChangeTag, TextDiff};
use sigpatch::codec::{self, hex_dump, window_range};
use sigpatch::definition::{self, PatchDefinition, Transition};
use sigpatch::runner::{
    run_definition, AppliedTransition, FailurePolicy, Progress, RunError, RunOptions,
    SequenceReport, Silent,
};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Definition read when neither --definition nor SIGPATCH_DEFINITION is set.
const DEFAULT_DEFINITION: &str = "patch-seq.def";

#[derive(Parser)]
#[command(name = "sigpatch")]
#[command(about = "In-place binary patching driven by unique byte signatures", long_about = None)]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct DefinitionArgs {
    /// Patch definition file, or a directory of *.def / *.json definitions
    #[arg(short, long, env = "SIGPATCH_DEFINITION", default_value = DEFAULT_DEFINITION)]
    definition: PathBuf,

    /// Resolve relative input/output paths against this directory
    #[arg(long)]
    base_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply every file sequence in the definition
    Apply {
        #[command(flatten)]
        source: DefinitionArgs,

        /// Dry run - patch in memory but write no output files
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Continue with remaining files after a file sequence fails
        #[arg(short, long)]
        keep_going: bool,

        /// How much of the buffer to dump around each transition
        #[arg(long, value_enum, default_value_t = DumpMode::Full)]
        dump: DumpMode,

        /// Show a hex dump diff between input and patched output
        #[arg(long)]
        diff: bool,
    },

    /// Check that every transition would apply, without writing anything
    Check {
        #[command(flatten)]
        source: DefinitionArgs,
    },

    /// List file sequences and their transitions
    List {
        #[command(flatten)]
        source: DefinitionArgs,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum DumpMode {
    /// Whole buffer as hex before and after each transition
    Full,
    /// Aligned hex dump of the lines around each patched span
    Window,
    /// No dumps
    #[value(name = "none")]
    Off,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Apply {
            source,
            dry_run,
            keep_going,
            dump,
            diff,
        } => cmd_apply(source, dry_run, keep_going, dump, diff),

        Commands::Check { source } => cmd_check(source),

        Commands::List { source } => cmd_list(source),
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("sigpatch={level}")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_definition(source: &DefinitionArgs) -> Result<PatchDefinition> {
    println!("Loading definition from {}...", source.definition.display());
    let definition = definition::load(&source.definition)
        .with_context(|| format!("cannot load {}", source.definition.display()))?;
    println!(
        "{}",
        format!(
            "  {} file sequence(s), {} transition(s)",
            definition.files.len(),
            definition.transition_count()
        )
        .dimmed()
    );
    println!();
    Ok(definition)
}

/// Prints hex dumps of each buffer as it moves through its transitions.
struct ConsoleProgress {
    dump: DumpMode,
    diff: bool,
    original: Option<Vec<u8>>,
    signature: Vec<u8>,
}

impl ConsoleProgress {
    fn new(dump: DumpMode, diff: bool) -> Self {
        Self {
            dump,
            diff,
            original: None,
            signature: Vec::new(),
        }
    }
}

impl Progress for ConsoleProgress {
    fn sequence_started(&mut self, input: &Path, buffer: &[u8]) {
        println!(
            "{} ({} bytes)",
            format!("Patching {}", input.display()).bold(),
            buffer.len()
        );
        if self.diff {
            self.original = Some(buffer.to_vec());
        }
    }

    fn before_transition(&mut self, index: usize, transition: &Transition, buffer: &[u8]) {
        if !transition.desc.is_empty() {
            println!("  [{index}] {}", transition.desc.cyan());
        }
        match self.dump {
            DumpMode::Full => println!("before ({index}): {}", codec::encode(buffer)),
            DumpMode::Window => {
                self.signature =
                    codec::decode(&transition.transition.signature).unwrap_or_default();
            }
            DumpMode::Off => {}
        }
    }

    fn after_transition(&mut self, applied: &AppliedTransition, buffer: &[u8]) {
        let index = applied.index;
        match self.dump {
            DumpMode::Full => println!("after  ({index}): {}", codec::encode(buffer)),
            DumpMode::Window => {
                let range = window_range(buffer.len(), applied.offset, applied.len);
                let mut before = buffer[range.clone()].to_vec();
                let at = applied.offset - range.start;
                if self.signature.len() == applied.len {
                    before[at..at + applied.len].copy_from_slice(&self.signature);
                }
                print!("before ({index}):\n{}", hex_dump(&before, range.start));
                let base = range.start;
                print!("after  ({index}):\n{}", hex_dump(&buffer[range], base));
            }
            DumpMode::Off => {}
        }
        let note = if applied.changed { "" } else { " (already patched)" };
        println!(
            "  {} [{index}] {} bytes at {:#x}{note}",
            "✓".green(),
            applied.len,
            applied.offset
        );
    }

    fn sequence_finished(&mut self, report: &SequenceReport, buffer: &[u8]) {
        if let Some(original) = self.original.take() {
            display_diff(&report.input, &original, buffer);
        }
    }
}

/// Helper: Show a diff of the canonical hex dumps of two buffers
fn display_diff(file: &Path, original: &[u8], modified: &[u8]) {
    let before = hex_dump(original, 0);
    let after = hex_dump(modified, 0);

    println!(
        "\n{}",
        format!("--- {} (original)", file.display()).dimmed()
    );
    println!("{}", format!("+++ {} (patched)", file.display()).dimmed());

    let diff = TextDiff::from_lines(&before, &after);
    for group in diff.grouped_ops(1) {
        for op in group {
            for change in diff.iter_changes(&op) {
                let line = match change.tag() {
                    ChangeTag::Delete => format!("-{}", change).red(),
                    ChangeTag::Insert => format!("+{}", change).green(),
                    ChangeTag::Equal => format!(" {}", change).normal(),
                };
                print!("{}", line);
            }
        }
    }
}

/// Helper: Print the extra context we have for a failed sequence
fn explain_failure(error: &RunError) {
    match error {
        RunError::SignatureNotFound {
            patch_found_at: Some(offset),
            ..
        } => {
            eprintln!(
                "  {}",
                format!("NOTE: patch bytes already present at {offset:#x}").yellow()
            );
            eprintln!("  The sequence may already have been applied to this file.");
        }
        RunError::SignatureNotFound { .. } => {
            eprintln!("  Possible causes:");
            eprintln!("    - Input file is a different version than the definition targets");
            eprintln!("    - An earlier transition rewrote part of this signature");
        }
        RunError::AmbiguousSignature { count, .. } => {
            eprintln!(
                "  {}",
                format!("CONFLICT: signature matched {count} locations (expected 1)").red()
            );
            eprintln!("  Action: Extend the signature with surrounding bytes");
        }
        RunError::SizeMismatch { .. } => {
            eprintln!("  Action: Signature and patch must decode to the same byte length");
        }
        _ => {}
    }
}

fn cmd_apply(
    source: DefinitionArgs,
    dry_run: bool,
    keep_going: bool,
    dump: DumpMode,
    show_diff: bool,
) -> Result<()> {
    let definition = load_definition(&source)?;

    let options = RunOptions {
        base_dir: source.base_dir,
        dry_run,
    };
    let policy = if keep_going {
        FailurePolicy::Continue
    } else {
        FailurePolicy::Abort
    };

    if dry_run {
        println!("{}", "[DRY RUN - no output files will be written]".cyan());
        println!();
    }

    let mut progress = ConsoleProgress::new(dump, show_diff);
    let results = run_definition(&definition, &options, policy, &mut progress);

    let mut total_written = 0;
    let mut total_in_memory = 0;
    let mut total_failed = 0;

    for (input, result) in &results {
        match result {
            Ok(report) => {
                match (&report.output, report.persisted) {
                    (Some(output), true) => {
                        println!(
                            "{} {}: Wrote {} ({:016x})",
                            "✓".green(),
                            input,
                            output.display(),
                            report.digest_after
                        );
                        total_written += 1;
                    }
                    (Some(output), false) => {
                        println!(
                            "{} {}: Would write {}",
                            "✓".green(),
                            input,
                            output.display()
                        );
                        total_in_memory += 1;
                    }
                    (None, _) => {
                        println!(
                            "{} {}: Patched in memory only (no output-file)",
                            "⊙".yellow(),
                            input
                        );
                        total_in_memory += 1;
                    }
                }
            }
            Err(e) => {
                eprintln!("{} {}: Error - {}", "✗".red(), input, e);
                explain_failure(e);
                total_failed += 1;
            }
        }
        println!();
    }

    let not_attempted = definition.files.len() - results.len();

    println!("{}", "Summary:".bold());
    println!("  {} written", format!("{}", total_written).green());
    println!("  {} not persisted", format!("{}", total_in_memory).yellow());
    println!("  {} failed", format!("{}", total_failed).red());
    if not_attempted > 0 {
        println!("  {} not attempted", format!("{}", not_attempted).cyan());
    }

    if total_failed > 0 {
        std::process::exit(1);
    }

    Ok(())
}

fn cmd_check(source: DefinitionArgs) -> Result<()> {
    let definition = load_definition(&source)?;

    let options = RunOptions {
        base_dir: source.base_dir,
        dry_run: true,
    };
    let results = run_definition(&definition, &options, FailurePolicy::Continue, &mut Silent);

    let mut ok = 0;
    let mut failed = 0;

    for (input, result) in &results {
        match result {
            Ok(report) => {
                println!(
                    "{} {}: {} transition(s) apply",
                    "✓".green(),
                    input,
                    report.transitions.len()
                );
                for applied in &report.transitions {
                    println!(
                        "    [{}] {:#x} ({} bytes) {}",
                        applied.index,
                        applied.offset,
                        applied.len,
                        applied.desc.dimmed()
                    );
                }
                ok += 1;
            }
            Err(e) => {
                eprintln!("{} {}: {}", "✗".red(), input, e);
                explain_failure(e);
                failed += 1;
            }
        }
    }

    println!();
    println!("{}", "Summary:".bold());
    println!("  {} ok", format!("{}", ok).green());
    println!("  {} failing", format!("{}", failed).red());

    if failed > 0 {
        std::process::exit(1);
    }

    Ok(())
}

fn cmd_list(source: DefinitionArgs) -> Result<()> {
    let definition = load_definition(&source)?;

    for file in &definition.files {
        let output = file.output().unwrap_or("(not persisted)");
        println!("{} -> {}", file.input_file.bold(), output);

        for (index, transition) in file.sequence.iter().enumerate() {
            let size = match codec::decode(&transition.transition.signature) {
                Ok(bytes) => format!("{} bytes", bytes.len()),
                Err(e) => format!("invalid hex: {e}").red().to_string(),
            };
            let desc = if transition.desc.is_empty() {
                "(no description)"
            } else {
                transition.desc.as_str()
            };
            println!("  [{index}] {desc} ({size})");
        }
    }

    Ok(())
}
