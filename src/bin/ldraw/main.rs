//! ldraw CLI tool
//!
//! Command-line interface for indexing an LDraw parts library and inspecting models against it.
//!
//! ## Commands
//!
//! - `index`: Build (or refresh) the library index and summarise it
//! - `parse <file>`: Parse a file and report its pages and diagnostics
//! - `resolve <file>`: Parse a file and resolve its references against the library
//! - `watch`: Keep the index live and print library changes until Ctrl-C
//!
//! The library comes from `--config` (the `[library]` table of a TOML file), from `--library`
//! roots, or from the `LDRAWDIR` environment variable, in that order of precedence.

use clap::{Parser, Subcommand};
use ldraw_core::{
    codec::{DocumentParser, PageWriter},
    config::{LibraryConfig, LibraryConfigProvider, TomlConfigProvider},
    model::ResolutionState,
    service::LibraryService,
};
use std::{
    collections::BTreeMap,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

#[derive(Parser)]
#[command(name = "ldraw")]
#[command(author, version, about = "Index an LDraw library and inspect models against it", long_about = None)]
struct Cli {
    /// Configuration file with a [library] table
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Library root, highest precedence first (repeatable)
    #[arg(short = 'L', long = "library", global = true)]
    library: Vec<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the library index and summarise it by page type
    Index {
        /// Write the index snapshot to this path
        #[arg(long)]
        save: Option<PathBuf>,
    },

    /// Parse a file once and display its pages and diagnostics
    Parse {
        /// Path to the LDraw file
        path: PathBuf,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,

        /// Print the canonical source of the parsed document
        #[arg(long)]
        canonical: bool,
    },

    /// Parse a file and resolve its references against the library
    Resolve {
        /// Path to the LDraw file
        path: PathBuf,

        /// List every reference, not just the failed ones
        #[arg(short, long)]
        verbose: bool,
    },

    /// Watch the library for changes
    Watch,
}

fn library_config(cli: &Cli) -> Result<LibraryConfig, Box<dyn std::error::Error>> {
    let mut config = match cli.config.as_ref() {
        Some(path) => TomlConfigProvider::new(path.clone()).get_library()?,
        None => LibraryConfig::default(),
    };
    if !cli.library.is_empty() {
        config.search_path = cli.library.clone();
    }
    if config.search_path.is_empty() {
        if let Some(dir) = std::env::var_os("LDRAWDIR") {
            config.search_path.push(PathBuf::from(dir));
        }
    }
    if config.search_path.is_empty() {
        tracing::warn!("No library configured; references resolve against local files only");
    }
    Ok(config)
}

/// Logs every tenth percent of progress.
fn progress_logger(label: &'static str) -> impl FnMut(&str, u8) -> bool {
    let mut last = 0;
    move |_, percent| {
        if percent / 10 > last / 10 {
            tracing::info!("{label}: {percent}%");
        }
        last = percent;
        true
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = library_config(&cli)?;

    match cli.command {
        Commands::Index { save } => {
            let service = LibraryService::with_progress(config, &mut progress_logger("Indexing"))?;
            let mut by_type: BTreeMap<String, usize> = BTreeMap::new();
            for card in service.index().cards() {
                *by_type.entry(card.page_type.to_string()).or_default() += 1;
            }
            println!("{} library files", service.index().len());
            for (page_type, count) in by_type {
                println!("  {page_type:<26} {count}");
            }
            if let Some(path) = save {
                service.index().save(&path)?;
                println!("Saved index to {}", path.display());
            } else if service.save_index()? {
                println!("Saved index to the configured snapshot");
            }
            Ok(())
        }

        Commands::Parse {
            path,
            verbose,
            canonical,
        } => {
            let document = DocumentParser::parse_file(&path, &mut progress_logger("Parsing"))?;
            let mut diagnostics = 0;
            for page in document.pages() {
                println!(
                    "{} ({}): {} step(s), {} element(s), {} reference(s)",
                    page.target_name(),
                    page.page_type(),
                    page.steps().len(),
                    page.element_count(),
                    page.references().len()
                );
                if verbose {
                    if let Some(title) = page.title() {
                        println!("  title: {title}");
                    }
                    for reference in page.references() {
                        println!("  -> {}", reference.target_name());
                    }
                }
                for diagnostic in page.diagnostics() {
                    println!("  {diagnostic}");
                    diagnostics += 1;
                }
            }
            if canonical {
                print!("{}", PageWriter::write_document(&document));
            }
            if diagnostics > 0 {
                eprintln!("{diagnostics} diagnostic(s)");
            }
            Ok(())
        }

        Commands::Resolve { path, verbose } => {
            let service = LibraryService::with_progress(config, &mut progress_logger("Indexing"))?;
            let document = service.open(&path, &mut progress_logger("Parsing"))?;
            let summary = service.resolver().resolve_all(&document);
            for page in document.pages() {
                for reference in page.references() {
                    let state = reference.state();
                    if verbose || state != ResolutionState::Resolved {
                        println!(
                            "{}: {} -> {state:?}",
                            page.target_name(),
                            reference.target_name()
                        );
                    }
                }
            }
            println!("{summary}");
            println!("{} document(s) cached", service.cache().len());
            if summary.total() != summary.resolved {
                std::process::exit(2);
            }
            Ok(())
        }

        Commands::Watch => {
            if !config.watch {
                eprintln!("Error: watching is disabled by the configuration (watch = false)");
                std::process::exit(1);
            }
            let service = LibraryService::with_progress(config, &mut progress_logger("Indexing"))?;
            let changes = service.subscribe();
            service.start_watching()?;
            println!(
                "Watching {} root(s), {} library files. Press Ctrl-C to stop.",
                service.config().search_path.len(),
                service.index().len()
            );

            let running = Arc::new(AtomicBool::new(true));
            let r = running.clone();
            ctrlc::set_handler(move || {
                println!("\nShutting down...");
                r.store(false, Ordering::SeqCst);
            })?;

            while running.load(Ordering::SeqCst) {
                while let Ok(change) = changes.try_recv() {
                    println!("{change}");
                }
                std::thread::sleep(Duration::from_millis(100));
            }

            service.stop_watching();
            if service.save_index()? {
                println!("Saved index snapshot");
            }
            println!("Shutdown complete");
            Ok(())
        }
    }
}
