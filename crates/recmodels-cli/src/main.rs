//! Recmodels CLI - inspect and populate a local model repository.
//!
//! Resolves model archives, queries the model index and maps jars to project
//! coordinates using the same services an IDE integration would use.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "recmodels")]
#[command(about = "Resolve and inspect code recommender models")]
struct Args {
    /// Base directory holding `repository/` and `index/` (defaults to the user data dir)
    #[arg(long, global = true)]
    basedir: Option<PathBuf>,

    /// Remote repository URL, overriding the settings file
    #[arg(long, global = true)]
    remote: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download a model archive (groupId:artifactId[:extension[:classifier]]:version)
    Resolve {
        coordinate: String,
        /// Download again even if the archive is present
        #[arg(long)]
        force: bool,
    },
    /// Best model archive for a project (groupId:artifactId:version)
    Suggest {
        project: String,
        model_type: String,
    },
    /// All model archives of a type for any version of a project
    Candidates {
        project: String,
        model_type: String,
    },
    /// Identify the project a jar belongs to
    MapJar { path: PathBuf },
    /// Build an index catalog from a JSON list of catalog documents
    BuildIndex { json: PathBuf, out_dir: PathBuf },
    /// Fetch the latest index and swap it in
    UpdateIndex,
    /// List archives present in the local repository
    ListLocal,
}

fn init_logging(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();
}

fn default_basedir() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("recmodels"))
        .unwrap_or_else(|| PathBuf::from(".recmodels"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.debug);

    let basedir = args.basedir.unwrap_or_else(default_basedir);
    debug!("Base directory: {}", basedir.display());

    let context = commands::Context {
        basedir,
        remote: args.remote,
    };
    commands::run(&context, args.command).await
}
