//! Command-line front end: corrects the partitions of a raw NAND dump according to a layout
//! configuration, and reports on or extracts them.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{error, info};

use nandtool::config::{builtin_configs, Config};
use nandtool::image::RawImage;
use nandtool::{Error, PartitionSet, Resource};

#[derive(Args, Debug)]
struct ImageOptions {
    /// Path to the raw NAND dump
    image: PathBuf,

    /// Name of a built-in configuration, or path to a configuration file
    #[clap(short, long)]
    config: String,
}

impl ImageOptions {
    /// Map the image, load the configuration, and correct every partition
    fn build(&self, only: &[String]) -> Result<PartitionSet> {
        let image = RawImage::open(&self.image)?;
        let mut config = Config::find(&self.config)?;

        if !only.is_empty() {
            for name in only {
                anyhow::ensure!(
                    config.names().any(|n| n == name.as_str()),
                    "no partition named {name} in configuration {}",
                    self.config
                );
            }
            config.partitions.retain(|p| only.contains(&p.name));
        }

        info!(
            "Correcting {} ({} bytes) with configuration {}",
            self.image.display(),
            image.len(),
            self.config
        );
        let partitions = PartitionSet::build(&image, &config.partitions)
            .with_context(|| format!("failed to correct {}", self.image.display()))?;
        Ok(partitions)
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the built-in configurations
    List,

    /// Correct every partition and summarize the result
    Info {
        #[clap(flatten)]
        image: ImageOptions,
    },

    /// Correct partitions and write each one to a file in the output directory
    Extract {
        #[clap(flatten)]
        image: ImageOptions,

        /// Directory to write the corrected partitions into
        #[clap(short, long)]
        output: PathBuf,

        /// Only extract these partitions
        #[clap(short, long)]
        partition: Vec<String>,
    },
}

impl Command {
    fn execute(&self) -> Result<()> {
        match self {
            Command::List => {
                println!("Available configurations:");
                for name in builtin_configs() {
                    println!("  {name}");
                }
            }

            Command::Info { image } => {
                let partitions = image.build(&[])?;
                for partition in &partitions {
                    let blocks = partition.blocks();
                    println!(
                        "{:<16} blocks {:>5}..={:<5} {:>12} bytes  {} bits corrected, {} uncorrectable pages",
                        partition.name(),
                        blocks.start(),
                        blocks.end(),
                        partition.size(),
                        partition.corrected_bits(),
                        partition.uncorrectable_pages().len(),
                    );
                }
            }

            Command::Extract {
                image,
                output,
                partition,
            } => {
                if !output.is_dir() {
                    return Err(Error::MissingResource {
                        resource: Resource::OutputDir,
                        path: output.clone(),
                    }
                    .into());
                }

                let partitions = image.build(partition)?;
                for partition in &partitions {
                    let path = output.join(partition.name());
                    write_partition(&path, partition.bytes())?;
                    info!(
                        "Wrote {} ({} bytes) to {}",
                        partition.name(),
                        partition.size(),
                        path.display()
                    );
                }
            }
        }

        Ok(())
    }
}

fn write_partition(path: &Path, contents: &[u8]) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("cannot write {}", path.display()))
}

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Cli {
    /// Log per-chunk corrections as well
    #[clap(short, long, global = true)]
    verbose: bool,

    #[clap(subcommand)]
    cmd: Command,
}

fn main() -> ExitCode {
    let args = Cli::parse();

    let level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
    howudoin::init(howudoin::consumers::TermLine::default());

    let result = args.cmd.execute();
    howudoin::disable();

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            match err.downcast_ref::<Error>() {
                Some(Error::MissingResource { resource, .. }) => {
                    ExitCode::from(resource.status() as u8)
                }
                _ => ExitCode::FAILURE,
            }
        }
    }
}
