//! Asset Publisher CLI
//!
//! Lists, checks and publishes the assets of an asset manifest

use anyhow::{Context, Result};
use asset_publisher::{
    AssetIdentifier, AssetPublishing, AwsCliOperations, ConfigLoadOptions, ConfigLoader,
    DockerCli, Manifest, PublishContext, PublishSection, PublisherConfig, RetryManager,
    SafeCommandExecutor, StdoutSink,
};
use clap::{ArgAction, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

/// Publish manifest assets to their cloud destinations
#[derive(Parser)]
#[command(name = "asset-publisher")]
#[command(version)]
#[command(about = "Publish manifest assets to their cloud destinations", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the assets and destinations of a manifest
    Ls {
        /// Manifest file or directory containing assets.json (defaults to current directory)
        #[arg(value_name = "PATH")]
        path: Option<PathBuf>,
    },

    /// Check that every entry of a manifest has a handler
    Check {
        /// Manifest file or directory containing assets.json (defaults to current directory)
        #[arg(value_name = "PATH")]
        path: Option<PathBuf>,
    },

    /// Publish assets
    Publish {
        /// Manifest file or directory containing assets.json (defaults to current directory)
        #[arg(value_name = "PATH")]
        path: Option<PathBuf>,

        /// Only publish these entries (ASSET or ASSET:DESTINATION)
        #[arg(value_name = "ASSET_ID")]
        assets: Vec<String>,

        /// Stop at the first failing entry
        #[arg(long)]
        abort_on_first_error: bool,

        /// Maximum number of entries published at once
        #[arg(long)]
        max_concurrency: Option<usize>,

        /// Config file to use instead of <manifest dir>/.asset-publish.yaml
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(exit_code) => process::exit(exit_code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    }
}

/// RUST_LOG wins over -v
fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<i32> {
    let verbose = cli.verbose > 0;

    match cli.command {
        Commands::Ls { path } => {
            let manifest = load_manifest(path).await?;
            ls_command(&manifest)
        }
        Commands::Check { path } => {
            let manifest = load_manifest(path).await?;
            check_command(&manifest, verbose).await
        }
        Commands::Publish {
            path,
            assets,
            abort_on_first_error,
            max_concurrency,
            config,
        } => {
            let manifest = load_manifest(path).await?;
            let cli_args = PublisherConfig {
                publish: Some(PublishSection {
                    abort_on_first_error: abort_on_first_error.then_some(true),
                    max_concurrency,
                }),
                ..Default::default()
            };
            publish_command(&manifest, &assets, config, cli_args, verbose).await
        }
    }
}

async fn load_manifest(path: Option<PathBuf>) -> Result<Manifest> {
    let path = path.unwrap_or_else(|| PathBuf::from("."));
    let manifest = Manifest::load_from_path_or_directory(&path).await?;
    debug!(
        directory = %manifest.directory().display(),
        assets = manifest.asset_count(),
        entries = manifest.entry_count(),
        "loaded manifest"
    );
    Ok(manifest)
}

fn ls_command(manifest: &Manifest) -> Result<i32> {
    for line in manifest.describe() {
        println!("{}", line);
    }
    Ok(0)
}

async fn check_command(manifest: &Manifest, verbose: bool) -> Result<i32> {
    let config = load_config(manifest.directory(), None, None).await?;
    let publishing = AssetPublishing::new(
        manifest,
        build_context(manifest.directory(), &config, verbose)?,
        config.publishing_options(),
    );

    match publishing.check() {
        Ok(count) => {
            println!("{} entries OK", count);
            Ok(0)
        }
        Err(e) => {
            eprintln!("{}", e);
            Ok(1)
        }
    }
}

async fn publish_command(
    manifest: &Manifest,
    assets: &[String],
    config_file: Option<PathBuf>,
    cli_args: PublisherConfig,
    verbose: bool,
) -> Result<i32> {
    let selection = assets
        .iter()
        .map(|a| AssetIdentifier::parse(a))
        .collect::<Result<Vec<_>, _>>()?;
    let selected = manifest.select((!selection.is_empty()).then_some(selection.as_slice()));
    if selected.entry_count() == 0 {
        warn!("no entries selected");
    }

    let config = load_config(manifest.directory(), config_file, Some(cli_args)).await?;
    let publishing = AssetPublishing::new(
        &selected,
        build_context(manifest.directory(), &config, verbose)?,
        config.publishing_options(),
    );

    // first Ctrl-C stops starting new entries; in-flight ones finish
    let cancellation = publishing.cancellation_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Interrupted, waiting for in-flight assets to finish");
            cancellation.cancel();
        }
    });

    match publishing.publish().await {
        Ok(_) => Ok(0),
        Err(e) => {
            eprintln!("{}", e);
            Ok(1)
        }
    }
}

async fn load_config(
    project_path: &Path,
    config_file: Option<PathBuf>,
    cli_args: Option<PublisherConfig>,
) -> Result<PublisherConfig> {
    let config = ConfigLoader::load(ConfigLoadOptions {
        project_path: project_path.to_path_buf(),
        config_file,
        cli_args,
        env: std::env::vars().collect(),
    })
    .await?;
    Ok(config)
}

fn build_context(
    directory: &Path,
    config: &PublisherConfig,
    verbose: bool,
) -> Result<Arc<PublishContext>> {
    let mut executor = SafeCommandExecutor::new(directory)
        .with_context(|| format!("Cannot run commands in {}", directory.display()))?;
    executor.set_timeout(config.command_timeout());

    let aws = AwsCliOperations::new(executor.clone())
        .with_profile(config.aws_profile())
        .with_region(config.aws_region());

    Ok(Arc::new(PublishContext {
        aws: Arc::new(aws),
        engine: Arc::new(DockerCli::new(executor)),
        sink: Arc::new(StdoutSink::new(verbose)),
        retry: RetryManager::new(config.retry_options()),
    }))
}
