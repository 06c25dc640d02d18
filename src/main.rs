use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::prelude::*;
use clap::{Parser, Subcommand};
use log::info;
use prost::Message;

use profpack::codec::{self, Merged};
use profpack::{sampled, stackdump, Config, MappingKeyPolicy, ProfileKind};

/// Merge pprof profiles or goroutine stack dumps into one compact artifact, and get any one of
/// them back out again.
#[derive(Debug, Parser)]
#[command(name = "profpack", version)]
struct Cli {
    /// JSON file with merge settings
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
    /// How binary mappings are keyed when pooled. Overrides the config file.
    #[arg(long, global = true, value_enum)]
    mapping_key: Option<MappingKeyPolicy>,
    /// gzip level for compressed output, 0-9. Overrides the config file.
    #[arg(long, global = true)]
    compression_level: Option<u32>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Merge profiles into one artifact
    Merge {
        #[arg(long, value_enum)]
        kind: ProfileKind,
        /// Write the protobuf encoding without gzip
        #[arg(long)]
        uncompressed: bool,
        /// File to write the artifact to
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },
    /// Reconstruct one input of an artifact
    Unpack {
        #[arg(long, value_enum)]
        kind: ProfileKind,
        /// Position of the input in the merge, starting at 0
        #[arg(long)]
        index: usize,
        /// File to write the profile to. Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
        artifact: PathBuf,
    },
    /// Print a JSON summary of an artifact
    Inspect {
        #[arg(long, value_enum)]
        kind: ProfileKind,
        artifact: PathBuf,
    },
    /// Compare compressing inputs one by one against compressing their merge
    Sizes {
        #[arg(long, value_enum)]
        kind: ProfileKind,
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    match cli.command {
        Command::Merge {
            kind,
            uncompressed,
            output,
            inputs,
        } => {
            let merged = merge_files(kind, &inputs, &config)?;
            let path = output.unwrap_or_else(|| default_output_name(uncompressed));
            let mut out = BufWriter::new(
                File::create(&path).context(format!("Failed to create {}", path.display()))?,
            );
            if uncompressed {
                merged.write_uncompressed(&mut out)?;
            } else {
                merged.write_compressed(&mut out, config.compression_level)?;
            }
            out.flush()?;
            info!("Wrote {} merged {} profiles to {}", merged.num_inputs(), kind, path.display());
        }
        Command::Unpack {
            kind,
            index,
            output,
            artifact,
        } => {
            let merged = Merged::decode(kind, &read(&artifact)?)
                .context(format!("Failed to decode {}", artifact.display()))?;
            let unpacked = merged
                .unpack(index)
                .context(format!("Failed to unpack input {} of {}", index, artifact.display()))?;
            match output {
                Some(path) => {
                    let file = File::create(&path)
                        .context(format!("Failed to create {}", path.display()))?;
                    let mut out = BufWriter::new(file);
                    unpacked.write(&mut out, &config)?;
                    out.flush()?;
                    info!("Wrote input {} to {}", index, path.display());
                }
                None => {
                    let stdout = io::stdout();
                    let mut out = stdout.lock();
                    unpacked.write(&mut out, &config)?;
                    out.flush()?;
                }
            }
        }
        Command::Inspect { kind, artifact } => {
            let raw = read(&artifact)?;
            let merged = Merged::decode(kind, &raw)
                .context(format!("Failed to decode {}", artifact.display()))?;
            println!("{}", serde_json::to_string_pretty(&merged.summary())?);
        }
        Command::Sizes { kind, inputs } => {
            let (independent, merged) = sizes(kind, &inputs, &config)?;
            println!("independently compressed: {}", independent);
            println!("merged and compressed:    {}", merged);
        }
    }
    Ok(())
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_json_file(path)?,
        None => Config::default(),
    };
    if let Some(mapping_key) = cli.mapping_key {
        config.mapping_key = mapping_key;
    }
    if let Some(level) = cli.compression_level {
        config.compression_level = level;
    }
    Ok(config)
}

fn read(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).context(format!("Failed to read {}", path.display()))
}

fn default_output_name(uncompressed: bool) -> PathBuf {
    let extension = if uncompressed { "pb" } else { "pb.gz" };
    PathBuf::from(format!("profpack-{}.{}", Utc::now().to_rfc3339(), extension))
}

fn merge_files(kind: ProfileKind, paths: &[PathBuf], config: &Config) -> Result<Merged> {
    let inputs = paths.iter().map(|p| read(p)).collect::<Result<Vec<_>>>()?;
    info!("Merging {} {} profiles", inputs.len(), kind);
    Ok(Merged::merge(kind, &inputs, config)?)
}

/// Returns the summed size of gzipping each input's encoding on its own, and the size of the
/// gzipped merged artifact.
fn sizes(kind: ProfileKind, paths: &[PathBuf], config: &Config) -> Result<(usize, usize)> {
    let mut independent = 0;
    for path in paths {
        let raw = read(path)?;
        let encoded = match kind {
            ProfileKind::Sampled => sampled::decode_profile(&raw)?.encode_to_vec(),
            ProfileKind::StackDump => stackdump::parse_stack_dump(&raw)?.encode_to_vec(),
            ProfileKind::Opaque => raw,
        };
        independent += codec::gzip(&encoded, config.compression_level)?.len();
    }

    let mut merged = Vec::new();
    merge_files(kind, paths, config)?.write_compressed(&mut merged, config.compression_level)?;
    Ok((independent, merged.len()))
}
