//! catalog-cd - Tekton resource catalog delivery
//!
//! Releases Tekton resources with a checksummed contract and generates
//! file-based catalogs from the releases of external repositories.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use catalog_cd_core::attestation::Cosign;
use catalog_cd_core::contract::{self, Contract};
use catalog_cd_core::release::{self, ReleaseOptions};
use catalog_cd_core::render;

mod catalog_cli;

/// Log levels
#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_filter_directive(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[derive(Parser, Debug)]
#[clap(
    name = "catalog-cd",
    about = "Release Tekton resources and generate file-based catalogs"
)]
struct Cli {
    #[clap(subcommand)]
    command: Command,

    /// Set log level
    #[clap(long, default_value = "info", global = true)]
    log_level: LogLevel,
}

#[derive(Parser, Debug)]
enum Command {
    /// Generate file-based catalogs from external repositories
    Catalog(catalog_cli::CatalogCommand),

    /// Create a contract and resources tarball from Tekton resource files
    Release {
        /// Release version recorded on every resource
        #[clap(long)]
        version: String,

        /// Directory receiving the contract, the tarball and the resources
        #[clap(long, default_value = ".")]
        output: PathBuf,

        /// Contract file name
        #[clap(long, default_value = contract::FILENAME)]
        catalog_name: String,

        /// Resources tarball name
        #[clap(long, default_value = contract::RESOURCES_NAME)]
        resources_tarball_name: String,

        /// Resource files or directories to release
        #[clap(default_value = ".")]
        paths: Vec<PathBuf>,
    },

    /// Sign the resources of a contract with cosign
    Sign {
        /// Private key file location
        #[clap(long)]
        private_key: String,

        /// Contract file or the directory holding it
        #[clap(default_value = ".")]
        contract: PathBuf,
    },

    /// Verify the resource signatures of a contract with cosign
    Verify {
        /// Public key file location (defaults to the contract's publicKeyRef)
        #[clap(long)]
        public_key: Option<String>,

        /// Contract file or the directory holding it
        contract: PathBuf,
    },

    /// Render a Tekton resource file as Markdown
    Render {
        /// Resource file
        file: PathBuf,
    },

    /// Print the version
    Version,
}

/// Initialize tracing from the --log-level flag
///
/// Logs go to stderr so JSON and Markdown output on stdout stays clean.
fn initialize_tracing(log_level: &LogLevel) {
    let filter = EnvFilter::new(log_level.to_filter_directive());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    initialize_tracing(&cli.log_level);

    match cli.command {
        Command::Catalog(command) => command.execute().await,
        Command::Release {
            version,
            output,
            catalog_name,
            resources_tarball_name,
            paths,
        } => {
            let options = ReleaseOptions {
                version,
                output,
                catalog_name,
                resources_name: resources_tarball_name,
            };
            release_command(&paths, &options)
        }
        Command::Sign {
            private_key,
            contract,
        } => sign_command(&private_key, &contract),
        Command::Verify {
            public_key,
            contract,
        } => verify_command(public_key, &contract),
        Command::Render { file } => {
            print!("{}", render::render_file(&file)?);
            Ok(())
        }
        Command::Version => {
            println!("{}", catalog_cd_core::version());
            Ok(())
        }
    }
}

fn release_command(paths: &[PathBuf], options: &ReleaseOptions) -> Result<()> {
    let artifacts = release::build_release(paths, options)?;

    info!(
        "Released {} resource(s) at version {}",
        artifacts.contract.catalog.resources.len(),
        options.version
    );
    info!("Contract: {}", artifacts.contract_path.display());
    info!("Tarball:  {}", artifacts.tarball_path.display());

    Ok(())
}

fn sign_command(private_key: &str, location: &std::path::Path) -> Result<()> {
    let mut contract = Contract::from_path(location)?;
    let cosign = Cosign::new(private_key)?;

    contract.sign_resources(|payload, signature| {
        info!(
            "Signing resource {} on {}",
            payload.display(),
            signature.display()
        );
        cosign.sign(payload, signature)
    })?;

    contract.save().context("Failed to save signed contract")
}

fn verify_command(public_key: Option<String>, location: &std::path::Path) -> Result<()> {
    let contract = Contract::from_path(location)?;

    let public_key = match public_key.filter(|k| !k.is_empty()) {
        Some(key) => key,
        None => contract.public_key()?.to_string(),
    };
    info!("Public key: {}", public_key);

    let cosign = Cosign::new(public_key)?;
    contract.verify_resources(|blob, signature| {
        info!(
            "Verifying resource {} against signature {}",
            blob.display(),
            signature.display()
        );
        cosign.verify(blob, signature)
    })?;

    info!("All resource signatures verified");
    Ok(())
}
