//! gildash CLI entry point.

mod cli;

use anyhow::Result;
use cli::{Command, OutputFormat};
use gildash::{CycleOptions, EngineConfig, EngineEvent, Gildash};

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();

    if args.iter().any(|a| a == "--help" || a == "-h") || args.is_empty() {
        cli::print_usage();
        std::process::exit(if args.is_empty() { 2 } else { 0 });
    }
    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("gildash {}", env!("CARGO_PKG_VERSION"));
        return;
    }

    let (command, output) = match cli::parse_args(&args) {
        Ok(parsed) => parsed,
        Err(err) => {
            eprintln!("error: {err}");
            eprintln!();
            cli::print_usage();
            std::process::exit(2);
        }
    };

    if let Err(err) = run(command, output) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run(command: Command, output: OutputFormat) -> Result<()> {
    match command {
        Command::Index { root } => {
            let mut engine = Gildash::open(EngineConfig::new(root))?;
            let report = engine.full_index()?;
            match output {
                OutputFormat::Human => {
                    println!(
                        "indexed {} file(s): {} changed, {} deleted, {} symbols, {} relations",
                        report.files_seen,
                        report.changed.len(),
                        report.deleted.len(),
                        report.symbols_written,
                        report.relations_written,
                    );
                    for failure in &report.failures {
                        eprintln!("  {} failure: {}: {}", failure.stage, failure.path, failure.message);
                    }
                }
                OutputFormat::Json => {
                    println!(
                        "{}",
                        serde_json::json!({
                            "filesSeen": report.files_seen,
                            "changed": report.changed,
                            "deleted": report.deleted,
                            "symbols": report.symbols_written,
                            "relations": report.relations_written,
                            "failures": report.failures,
                        })
                    );
                }
            }
            engine.close()?;
            Ok(())
        }

        Command::Watch { root, debounce_ms } => {
            let mut config = EngineConfig::new(root);
            config.watch_mode = true;
            if let Some(ms) = debounce_ms {
                config.debounce_ms = ms;
            }

            let mut engine = Gildash::open(config)?;
            engine.on_event(|event| match event {
                EngineEvent::Indexed { changed, deleted } => {
                    println!("indexed: {} changed, {} deleted", changed.len(), deleted.len());
                }
                EngineEvent::RoleChanged(role) => println!("role: {role}"),
                EngineEvent::Error(message) => eprintln!("error: {message}"),
                EngineEvent::FileChanged { .. } => {}
            });

            println!("gildash watching (role: {})", engine.role());
            engine.run()?;
            println!("shutdown");
            Ok(())
        }

        Command::Status { root } => {
            let engine = Gildash::open(EngineConfig::new(root))?;
            let stats = engine.stats()?;
            match output {
                OutputFormat::Human => {
                    println!("role:          {}", stats.role);
                    println!("files:         {}", stats.files);
                    println!("symbols:       {} ({} exported)", stats.symbols.total, stats.symbols.exported);
                    for (kind, count) in &stats.symbols.by_kind {
                        println!("  {kind:<12} {count}");
                    }
                    println!("relations:     {}", stats.relations);
                    println!("index version: {}", stats.index_version);
                }
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
            }
            Ok(())
        }

        Command::Query { root, project, file } => {
            let engine = Gildash::open(EngineConfig::new(root))?;
            let symbols = engine.symbols_in_file(&project, &file)?;
            print_symbols(&symbols, output)
        }

        Command::Find {
            root,
            name,
            kind,
            project,
        } => {
            let engine = Gildash::open(EngineConfig::new(root))?;
            let symbols = engine.search_symbols(&name, kind.as_deref(), project.as_deref())?;
            print_symbols(&symbols, output)
        }

        Command::Deps {
            root,
            file,
            reverse,
            transitive,
        } => {
            let mut engine = Gildash::open(EngineConfig::new(root))?;
            let files = match (reverse, transitive) {
                (false, false) => engine.dependencies(None, &file, None)?,
                (true, false) => engine.dependents(None, &file, None)?,
                (false, true) => engine.transitive_dependencies(None, &file)?,
                (true, true) => engine.transitive_dependents(None, &file)?,
            };
            print_paths(&files, output)
        }

        Command::Affected { root, files } => {
            let mut engine = Gildash::open(EngineConfig::new(root))?;
            let affected = engine.affected(None, &files)?;
            print_paths(&affected, output)
        }

        Command::Cycles {
            root,
            max_cycles,
            max_length,
        } => {
            let mut engine = Gildash::open(EngineConfig::new(root))?;
            let cycles = engine.cycle_paths(
                None,
                CycleOptions {
                    max_cycles,
                    max_length,
                },
            )?;
            match output {
                OutputFormat::Human => {
                    if cycles.is_empty() {
                        println!("no dependency cycles detected");
                    } else {
                        println!("detected {} cycle(s):", cycles.len());
                        for (i, cycle) in cycles.iter().enumerate() {
                            println!("  [{}] {}", i + 1, cycle.join(" -> "));
                        }
                    }
                }
                OutputFormat::Json => {
                    println!(
                        "{}",
                        serde_json::json!({ "count": cycles.len(), "cycles": cycles })
                    );
                }
            }
            Ok(())
        }
    }
}

fn print_symbols(symbols: &[gildash::SymbolRecord], output: OutputFormat) -> Result<()> {
    match output {
        OutputFormat::Human => {
            if symbols.is_empty() {
                println!("no symbols found");
            }
            for s in symbols {
                let export = if s.is_exported { "export " } else { "" };
                println!(
                    "{}{} {} in {} [{}..{}]",
                    export, s.kind, s.name, s.file_path, s.span_start, s.span_end
                );
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(symbols)?),
    }
    Ok(())
}

fn print_paths(paths: &[String], output: OutputFormat) -> Result<()> {
    match output {
        OutputFormat::Human => {
            for path in paths {
                println!("{path}");
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string(paths)?),
    }
    Ok(())
}
