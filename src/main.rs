//! ontoprofile CLI: compile OWL/RDFS ontologies into schema models.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use miette::{IntoDiagnostic, Result};

use ontoprofile::config::CompilerConfig;
use ontoprofile::diagnostics::Severity;
use ontoprofile::graph::{load_graph, Graph};
use ontoprofile::pipeline::{Compilation, Compiler};
use ontoprofile::ProfileError;

#[derive(Parser)]
#[command(name = "ontoprofile", version, about = "Ontology-to-schema compiler")]
struct Cli {
    /// TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Extra expansion rule files, applied after the configured ones.
    #[arg(long = "rules", global = true)]
    rules: Vec<PathBuf>,

    /// Output format.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Summary)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// JSON on stdout.
    Json,
    /// Human-readable summary.
    Summary,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile an ontology into a schema model.
    Compile {
        /// Ontology file (.ttl, .nt, .rdf, .owl, .xml).
        file: PathBuf,
    },

    /// Run only the expansion rules and print the expanded graph.
    Expand {
        /// Ontology file.
        file: PathBuf,
    },

    /// Expand and classify, printing the fact ledger.
    Facts {
        /// Ontology file.
        file: PathBuf,
    },

    /// List the expansion rules in effect.
    Rules,
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let compiler = build_compiler(cli.config.as_deref(), &cli.rules)?;

    match cli.command {
        Commands::Compile { file } => {
            let graph = load(&file)?;
            let compilation = compiler.compile(&graph).map_err(ProfileError::from)?;
            match cli.format {
                OutputFormat::Json => {
                    let json = serde_json::json!({
                        "model": compilation.model,
                        "diagnostics": compilation.diagnostics,
                        "expansion": compilation.expansion,
                        "normalization": compilation.normalization,
                    });
                    print_json(&json)?;
                }
                OutputFormat::Summary => print_compilation(&compilation),
            }
        }

        Commands::Expand { file } => {
            let graph = load(&file)?;
            let (expanded, report) = compiler.expand(&graph).map_err(ProfileError::from)?;
            match cli.format {
                OutputFormat::Json => {
                    let triples: Vec<_> = expanded.iter().collect();
                    print_json(&serde_json::json!({ "report": report, "triples": triples }))?;
                }
                OutputFormat::Summary => {
                    for triple in &expanded {
                        println!("{triple}");
                    }
                    eprintln!(
                        "{} passes, {} → {} triples ({} derived, {} cleaned)",
                        report.passes,
                        report.initial_triples,
                        report.final_triples,
                        report.derived(),
                        report.cleaned
                    );
                }
            }
        }

        Commands::Facts { file } => {
            let graph = load(&file)?;
            let (facts, diagnostics) = compiler.classify(&graph).map_err(ProfileError::from)?;
            match cli.format {
                OutputFormat::Json => {
                    print_json(&serde_json::json!({ "facts": facts, "diagnostics": diagnostics }))?;
                }
                OutputFormat::Summary => {
                    println!("Facts ({}):", facts.len());
                    let mut by_kind: BTreeMap<String, usize> = BTreeMap::new();
                    for record in facts.records() {
                        *by_kind.entry(format!("{:?}", record.fact.kind())).or_insert(0) += 1;
                        println!("  {} {}", record.id, record.fact);
                    }
                    println!("\nBy kind:");
                    for (kind, count) in &by_kind {
                        println!("  {kind:<28} {count}");
                    }
                    print_reasons(&diagnostics);
                }
            }
        }

        Commands::Rules => match cli.format {
            OutputFormat::Json => print_json(compiler.rules())?,
            OutputFormat::Summary => {
                println!("Expansion rules ({}):", compiler.rules().len());
                for rule in &compiler.rules().rules {
                    let cleanup = if rule.cleanup.is_some() { " [cleanup]" } else { "" };
                    println!("  {}{cleanup}", rule.name);
                }
            }
        },
    }

    Ok(())
}

fn build_compiler(config: Option<&Path>, extra_rules: &[PathBuf]) -> Result<Compiler> {
    let mut config = match config {
        Some(path) => CompilerConfig::load(path).map_err(ProfileError::from)?,
        None => CompilerConfig::default(),
    };
    config.expansion.rule_files.extend(extra_rules.iter().cloned());
    Ok(Compiler::from_config(config).map_err(ProfileError::from)?)
}

fn load(path: &Path) -> Result<Graph> {
    let graph = load_graph(path).map_err(ProfileError::from)?;
    tracing::info!(path = %path.display(), triples = graph.len(), "ontology loaded");
    Ok(graph)
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).into_diagnostic()?;
    println!("{json}");
    Ok(())
}

fn print_compilation(compilation: &Compilation) {
    let model = &compilation.model;
    println!("Schema <{}> ({} types):", model.uri, model.len());
    for type_def in model.types() {
        let supers = type_def.super_class_ids();
        if supers.is_empty() {
            println!("  {}", type_def.class_id);
        } else {
            let supers: Vec<&str> = supers.iter().map(String::as_str).collect();
            println!("  {} : {}", type_def.class_id, supers.join(", "));
        }
        for attribute in type_def.attributes() {
            let bounds = match (attribute.min_cardinality(), attribute.max_cardinality()) {
                (None, None) => String::new(),
                (min, max) => format!(
                    " [{}..{}]",
                    min.unwrap_or(0),
                    max.map_or_else(|| "*".to_string(), |m| m.to_string())
                ),
            };
            let range = attribute
                .range()
                .map(|r| format!(" -> {r}"))
                .unwrap_or_default();
            println!("    {} ({}){bounds}{range}", attribute.attribute_id, attribute.kind);
        }
    }

    let coverage = compilation.diagnostics.coverage();
    println!(
        "\nCoverage: {}/{} triples ({:.1}%), {} remaining",
        coverage.processed,
        coverage.original,
        coverage.ratio() * 100.0,
        coverage.remaining
    );
    print_reasons(&compilation.diagnostics);
}

fn print_reasons(diagnostics: &ontoprofile::Diagnostics) {
    for (severity, title) in [(Severity::Unresolved, "Unresolved"), (Severity::Warning, "Warnings")] {
        let entries: Vec<_> = diagnostics
            .entries()
            .filter(|(_, e)| e.severity == severity)
            .collect();
        if entries.is_empty() {
            continue;
        }
        println!("\n{title} ({}):", entries.len());
        for (reason, entry) in entries {
            println!("  {reason} ({} triples)", entry.triples.len());
        }
    }
}
