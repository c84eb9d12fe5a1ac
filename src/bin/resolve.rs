//! Resolve statements from the command line.
//!
//! ```bash
//! $ resolve "2x + 3 = 7; 2 * (3 + 4)"
//! x = 2
//! 14
//!
//! # every line on stdin is its own batch
//! $ echo "x^2 = 4" | resolve --steps
//! ```

use anyhow::{Context as _, Error};
use clap::Parser;
use resolver::{BatchResult, Resolver, ResolverConfig};
use std::{
    io::{self, BufRead, BufReader},
    path::PathBuf,
};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "resolve", version)]
#[command(about = "Simplify expressions and solve equations", long_about = None)]
struct Args {
    /// Statements separated by ";". Lines are read from stdin when omitted.
    input: Option<String>,

    /// Print each batch as JSON
    #[arg(long)]
    json: bool,

    /// Print the steps taken to resolve each statement
    #[arg(long)]
    steps: bool,

    /// A YAML file overriding the resolver's limits
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => ResolverConfig::load(path).with_context(|| {
            format!("Unable to load the config from \"{}\"", path.display())
        })?,
        None => ResolverConfig::default(),
    };
    let resolver = Resolver::new(config)?;

    match &args.input {
        Some(input) => print_batch(&resolver.resolve(input), &args)?,
        None => {
            let stdin = io::stdin();

            for line in BufReader::new(stdin.lock()).lines() {
                let line = line.context("Unable to read from stdin")?;
                if line.trim().is_empty() {
                    continue;
                }

                print_batch(&resolver.resolve(&line), &args)?;
            }
        },
    }

    Ok(())
}

fn print_batch(batch: &BatchResult, args: &Args) -> Result<(), Error> {
    if args.json {
        println!("{}", serde_json::to_string_pretty(batch)?);
        return Ok(());
    }

    for entry in batch {
        if args.steps {
            println!("{}", entry.steps);
            continue;
        }

        match &entry.outcome {
            Ok(solution) => println!("{}", solution),
            Err(e) => println!("error in \"{}\": {}", entry.statement, e),
        }
    }

    Ok(())
}
