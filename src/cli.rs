//! CLI argument parsing for gildash.
//!
//! Defines the Command enum and parse_args() for all CLI commands.

use std::path::PathBuf;

use anyhow::{bail, Result};

/// Output format for command results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Human,
    Json,
}

/// Parsed CLI command.
#[derive(Debug, Clone)]
pub enum Command {
    /// One-shot full index of the project root.
    Index { root: PathBuf },
    /// Index, then watch for changes until interrupted.
    Watch { root: PathBuf, debounce_ms: Option<u64> },
    /// Store statistics.
    Status { root: PathBuf },
    /// List symbols in one file.
    Query {
        root: PathBuf,
        project: String,
        file: String,
    },
    /// Prefix search over symbol names.
    Find {
        root: PathBuf,
        name: String,
        kind: Option<String>,
        project: Option<String>,
    },
    /// Direct and transitive dependencies of a file.
    Deps {
        root: PathBuf,
        file: String,
        reverse: bool,
        transitive: bool,
    },
    /// Impact set of a change set.
    Affected { root: PathBuf, files: Vec<String> },
    /// Dependency cycles.
    Cycles {
        root: PathBuf,
        max_cycles: Option<usize>,
        max_length: Option<usize>,
    },
}

pub fn print_usage() {
    eprintln!("gildash - code intelligence for TypeScript source trees");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  gildash <command> [arguments]");
    eprintln!();
    eprintln!("  gildash index --root <DIR>");
    eprintln!("  gildash watch --root <DIR> [--debounce-ms <N>]");
    eprintln!("  gildash status --root <DIR>");
    eprintln!("  gildash query --root <DIR> --project <NAME> --file <PATH>");
    eprintln!("  gildash find --root <DIR> --name <PREFIX> [--kind <KIND>] [--project <NAME>]");
    eprintln!("  gildash deps --root <DIR> --file <PATH> [--reverse] [--transitive]");
    eprintln!("  gildash affected --root <DIR> --file <PATH> [--file <PATH>]...");
    eprintln!("  gildash cycles --root <DIR> [--max-cycles <N>] [--max-length <N>]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  index     Index the project root once and exit");
    eprintln!("  watch     Index, then watch for changes until interrupted");
    eprintln!("  status    Show store statistics");
    eprintln!("  query     List symbols in a file");
    eprintln!("  find      Find symbols by name prefix");
    eprintln!("  deps      Show dependencies (or dependents) of a file");
    eprintln!("  affected  Show the impact set of changed files");
    eprintln!("  cycles    Detect dependency cycles between files");
    eprintln!();
    eprintln!("Global arguments:");
    eprintln!("  --root <DIR>        Project root (default: current directory)");
    eprintln!("  --output <FORMAT>   Output format: human (default) or json");
}

/// Parse argv (without the program name) into a command and output format.
pub fn parse_args(args: &[String]) -> Result<(Command, OutputFormat)> {
    let Some(command_name) = args.first() else {
        bail!("missing command");
    };

    let mut root = PathBuf::from(".");
    let mut output = OutputFormat::Human;
    let mut project: Option<String> = None;
    let mut file_args: Vec<String> = Vec::new();
    let mut name: Option<String> = None;
    let mut kind: Option<String> = None;
    let mut debounce_ms: Option<u64> = None;
    let mut max_cycles: Option<usize> = None;
    let mut max_length: Option<usize> = None;
    let mut reverse = false;
    let mut transitive = false;

    let mut i = 1;
    while i < args.len() {
        let arg = args[i].as_str();
        match arg {
            "--root" => root = PathBuf::from(value_of(args, &mut i, "--root")?),
            "--output" => {
                output = match value_of(args, &mut i, "--output")?.as_str() {
                    "human" => OutputFormat::Human,
                    "json" => OutputFormat::Json,
                    other => bail!("unknown output format: {other}"),
                }
            }
            "--project" => project = Some(value_of(args, &mut i, "--project")?),
            "--file" => file_args.push(value_of(args, &mut i, "--file")?),
            "--name" => name = Some(value_of(args, &mut i, "--name")?),
            "--kind" => kind = Some(value_of(args, &mut i, "--kind")?),
            "--debounce-ms" => {
                debounce_ms = Some(value_of(args, &mut i, "--debounce-ms")?.parse()?)
            }
            "--max-cycles" => max_cycles = Some(value_of(args, &mut i, "--max-cycles")?.parse()?),
            "--max-length" => max_length = Some(value_of(args, &mut i, "--max-length")?.parse()?),
            "--reverse" => reverse = true,
            "--transitive" => transitive = true,
            other => bail!("unknown argument: {other}"),
        }
        i += 1;
    }

    let command = match command_name.as_str() {
        "index" => Command::Index { root },
        "watch" => Command::Watch { root, debounce_ms },
        "status" => Command::Status { root },
        "query" => Command::Query {
            root,
            project: project.unwrap_or_else(|| "root".to_string()),
            file: single_file(file_args, "query")?,
        },
        "find" => Command::Find {
            root,
            name: name.ok_or_else(|| anyhow::anyhow!("find requires --name"))?,
            kind,
            project,
        },
        "deps" => Command::Deps {
            root,
            file: single_file(file_args, "deps")?,
            reverse,
            transitive,
        },
        "affected" => {
            if file_args.is_empty() {
                bail!("affected requires at least one --file");
            }
            Command::Affected {
                root,
                files: file_args,
            }
        }
        "cycles" => Command::Cycles {
            root,
            max_cycles,
            max_length,
        },
        other => bail!("unknown command: {other}"),
    };

    Ok((command, output))
}

fn value_of(args: &[String], i: &mut usize, flag: &str) -> Result<String> {
    *i += 1;
    args.get(*i)
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("{flag} requires a value"))
}

fn single_file(mut files: Vec<String>, command: &str) -> Result<String> {
    match files.len() {
        1 => Ok(files.remove(0)),
        0 => bail!("{command} requires --file"),
        _ => bail!("{command} takes exactly one --file"),
    }
}
