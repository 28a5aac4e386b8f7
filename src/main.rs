//! CLI entry point for `trace2sql`.

use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;
use tracing_subscriber::EnvFilter;
use trace2sql::classifier::function_registry::FunctionRegistry;
use trace2sql::{Catalog, QueryTrace, QuoteStyle, TranslateOptions, TranslationCache, Translator};

#[derive(Parser)]
#[command(
    name = "trace2sql",
    about = "Translate query-predicate instruction traces into SQL SELECT statements"
)]
struct Cli {
    /// Query trace JSON files
    #[arg(required = true)]
    traces: Vec<PathBuf>,

    /// Entity catalog JSON
    #[arg(long)]
    catalog: PathBuf,

    /// Additional JSON function registry, merged over the built-ins
    #[arg(long)]
    function_registry: Option<PathBuf>,

    /// Replace string and numeric literals with numbered placeholders
    #[arg(long)]
    parameterize: bool,

    /// Identifier quoting style (`double` or `backtick`)
    #[arg(long, default_value = "double")]
    quote: QuoteStyle,

    /// Print one JSON object per query instead of plain SQL
    #[arg(long)]
    json: bool,

    /// Print verbose diagnostics
    #[arg(long)]
    verbose: bool,
}

fn read(path: &Path, what: &str) -> String {
    std::fs::read_to_string(path).unwrap_or_else(|e| {
        eprintln!("Error reading {what} {}: {e}", path.display());
        process::exit(2);
    })
}

fn main() {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if cli.verbose {
            "trace2sql=debug"
        } else {
            "warn"
        })
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut catalog = Catalog::new();
    if let Err(e) = catalog.load_from_json(&read(&cli.catalog, "catalog")) {
        eprintln!("Error parsing catalog: {e}");
        process::exit(2);
    }

    let mut registry = FunctionRegistry::new();
    if let Some(path) = &cli.function_registry {
        if let Err(e) = registry.load_from_json(&read(path, "function registry")) {
            eprintln!("Error parsing function registry: {e}");
            process::exit(2);
        }
    }

    let options = TranslateOptions {
        quote: cli.quote,
        parameterize: cli.parameterize,
    };
    let translator = Translator::new(&catalog)
        .with_registry(&registry)
        .with_options(options)
        .with_cache(TranslationCache::global());

    for path in &cli.traces {
        let trace = match QueryTrace::from_json(&read(path, "trace")) {
            Ok(trace) => trace,
            Err(e) => {
                eprintln!("Error parsing {}: {e}", path.display());
                process::exit(2);
            }
        };

        let rendered = match translator.translate(&trace) {
            Ok(rendered) => rendered,
            Err(e) => {
                eprintln!("Error translating {}: {e}", path.display());
                process::exit(2);
            }
        };

        if cli.json {
            match serde_json::to_string(&rendered) {
                Ok(json) => println!("{json}"),
                Err(e) => {
                    eprintln!("Error serializing result: {e}");
                    process::exit(2);
                }
            }
        } else {
            println!("{rendered}");
        }
    }

    if cli.verbose {
        eprintln!(
            "Translated {} trace(s); {} cached result(s)",
            cli.traces.len(),
            TranslationCache::global().len()
        );
    }
}
