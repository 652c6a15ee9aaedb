use anyhow::{bail, Context, Result};
use archload::{Loader, STRING_FUNCTION};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "archload")]
#[command(about = "Load classes from native libraries packed in zip archives")]
#[command(version)]
struct Cli {
    /// Log loader activity to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Directory under which loading scopes are created
    #[arg(long, global = true)]
    scratch_dir: Option<PathBuf>,

    /// Largest library accepted from an archive, in bytes
    #[arg(long, global = true)]
    max_library_size: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Instantiate a class and apply it, as a string function, to each input
    Run {
        /// Archive holding the class
        archive: PathBuf,

        /// Class to instantiate; read from the archive's descriptor when omitted
        #[arg(short, long)]
        class: Option<String>,

        /// Strings to transform, one output line each
        inputs: Vec<String>,
    },
    /// List the libraries and classes an archive provides
    Inspect {
        archive: PathBuf,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut builder = Loader::builder();
    if let Some(dir) = cli.scratch_dir {
        builder = builder.scratch_dir(dir);
    }
    if let Some(size) = cli.max_library_size {
        builder = builder.max_library_size(size);
    }
    let loader = builder.build();

    match cli.command {
        Commands::Run {
            archive,
            class,
            inputs,
        } => {
            let instance = match class {
                Some(class) => loader.get(&archive, &class),
                None => loader.get_by_descriptor(&archive),
            }
            .with_context(|| format!("Failed to load from {}", archive.display()))?;

            let Some(function) = instance.as_string_function() else {
                bail!(
                    "Class {} does not implement {}",
                    instance.class_name(),
                    STRING_FUNCTION.to_string_lossy()
                );
            };

            for input in &inputs {
                let output = function
                    .apply(input)
                    .with_context(|| format!("{} failed on {:?}", instance.class_name(), input))?;
                println!("{}", output);
            }
        }
        Commands::Inspect { archive, json } => {
            let report = loader
                .inspect(&archive)
                .with_context(|| format!("Failed to inspect {}", archive.display()))?;

            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&report).context("Failed to serialize report")?
                );
            } else {
                print!("{}", report);
            }
        }
    }

    Ok(())
}
