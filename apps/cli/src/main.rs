//! basalt CLI
//!
//! `translate` prints the SQL a dialect would run for an expression,
//! `validate` reports structural issues and complexity, and `compliance`
//! executes the official corpus against a live engine and writes the
//! JSON report.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use basalt_compliance::{load_corpus, compare_dialects, ComplianceRunner, RunnerConfig};
use basalt_dialect::{Dialect, DialectConfig, PoolConfig};
use basalt_fhirpath::FhirPathParser;
use basalt_translator::translate_expression;

#[derive(Parser)]
#[command(name = "basalt", version, about = "FHIRPath to SQL for population analytics")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Engine {
    Duckdb,
    Postgres,
}

#[derive(Subcommand)]
enum Command {
    /// Parse an expression and print the emitted SQL.
    Translate {
        /// Target engine.
        #[arg(long, value_enum, default_value = "duckdb")]
        dialect: Engine,
        /// PostgreSQL connection string (postgres only).
        #[arg(long)]
        connection: Option<String>,
        /// The FHIRPath expression.
        expression: String,
    },

    /// Parse an expression and report validation issues and complexity.
    Validate {
        /// The FHIRPath expression.
        expression: String,
    },

    /// Run the official compliance corpus.
    Compliance {
        /// Corpus XML file.
        #[arg(long)]
        tests: PathBuf,
        /// Engine to run against.
        #[arg(long, value_enum, default_value = "duckdb")]
        db: Engine,
        /// PostgreSQL connection string (postgres only).
        #[arg(long)]
        connection: Option<String>,
        /// Directory of XML fixtures referenced by inputfile attributes.
        #[arg(long)]
        fixtures: Option<PathBuf>,
        /// Where to write the JSON report.
        #[arg(long)]
        output: Option<PathBuf>,
        /// Also run the second engine and report disagreements.
        #[arg(long)]
        cross_check: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    match Cli::parse().command {
        Command::Translate {
            dialect,
            connection,
            expression,
        } => translate(dialect, connection, &expression),
        Command::Validate { expression } => validate(&expression),
        Command::Compliance {
            tests,
            db,
            connection,
            fixtures,
            output,
            cross_check,
        } => compliance(tests, db, connection, fixtures, output, cross_check),
    }
}

fn connect(engine: Engine, connection: Option<String>) -> Result<Box<dyn Dialect>> {
    let config = match engine {
        Engine::Duckdb => DialectConfig::DuckDb { path: None },
        Engine::Postgres => {
            let Some(connection) = connection else {
                bail!("--connection is required for the postgres dialect");
            };
            DialectConfig::Postgres(PoolConfig::new(connection))
        }
    };
    config.connect().context("failed to open database")
}

fn translate(engine: Engine, connection: Option<String>, expression: &str) -> Result<()> {
    let dialect = connect(engine, connection)?;
    let parser = FhirPathParser::new();
    let parsed = parser
        .parse(expression)
        .with_context(|| format!("failed to parse '{}'", expression))?;
    let translation =
        translate_expression(&parsed, dialect.as_ref()).context("translation failed")?;
    println!("{}", translation.sql);
    Ok(())
}

fn validate(expression: &str) -> Result<()> {
    let parser = FhirPathParser::new();
    let parsed = parser
        .parse(expression)
        .with_context(|| format!("failed to parse '{}'", expression))?;

    let report = parsed.validate();
    if report.issues.is_empty() {
        println!("structure: ok");
    } else {
        for issue in &report.issues {
            println!("{:?} at {}: {}", issue.severity, issue.location, issue.message);
        }
    }

    let complexity = parsed.complexity();
    println!(
        "complexity: {:?} ({} nodes, depth {}, {} function call(s))",
        complexity.grade, complexity.node_count, complexity.depth, complexity.function_count
    );
    for opportunity in parsed.optimization_opportunities() {
        println!(
            "repeated subtree ({}x): {}",
            opportunity.occurrences, opportunity.subtree
        );
    }
    Ok(())
}

fn compliance(
    tests: PathBuf,
    engine: Engine,
    connection: Option<String>,
    fixtures: Option<PathBuf>,
    output: Option<PathBuf>,
    cross_check: bool,
) -> Result<()> {
    let corpus_xml = std::fs::read_to_string(&tests)
        .with_context(|| format!("failed to read corpus {}", tests.display()))?;
    let cases = load_corpus(&corpus_xml).context("failed to parse corpus")?;
    println!("loaded {} test case(s)", cases.len());

    let dialect = connect(engine, connection.clone())?;
    let config = RunnerConfig {
        fixtures_dir: fixtures,
    };
    let mut runner = ComplianceRunner::new(dialect.as_ref(), config.clone());
    let report = runner.run_suite(&cases);
    print!("{}", report.summary());

    if let Some(path) = output {
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(&path, json)
            .with_context(|| format!("failed to write report {}", path.display()))?;
        println!("report written to {}", path.display());
    }

    if cross_check {
        let other_engine = match engine {
            Engine::Duckdb => Engine::Postgres,
            Engine::Postgres => Engine::Duckdb,
        };
        let other = connect(other_engine, connection)?;
        let cross = compare_dialects(&cases, dialect.as_ref(), other.as_ref(), config);
        println!(
            "cross-dialect agreement: {}/{} ({:.1}%)",
            cross.agreeing,
            cross.compared,
            cross.agreement_percentage()
        );
        for disagreement in cross.disagreements.iter().take(10) {
            println!(
                "  {}: {} | {} vs {}",
                disagreement.name,
                disagreement.expression,
                disagreement.first,
                disagreement.second
            );
        }
    }

    Ok(())
}
