use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cloudinary_store::cloudinary::MockGateway;
use cloudinary_store::{AssetRequest, CloudinaryStore, ReadOptions, StorageAdapter, StoreConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "cloudinary-store")]
#[command(about = "Store and retrieve images on Cloudinary")]
struct CliArgs {
    /// JSON store configuration. Falls back to CLOUDINARY_* environment variables.
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Use an in-memory gateway instead of calling Cloudinary.
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Check whether an image has been stored.
    Exists { filename: String },
    /// Upload an image and print its delivery URL.
    Save {
        path: PathBuf,
        /// Name to store the image under (defaults to the file name).
        #[arg(long)]
        name: Option<String>,
    },
    /// Delete a stored image.
    Delete { filename: String },
    /// Download an image by URL.
    Read {
        url: String,
        #[arg(long, short)]
        output: PathBuf,
    },
}

fn load_config(path: Option<&Path>) -> Result<StoreConfig> {
    match path {
        Some(path) => StoreConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        None => StoreConfig::from_env().context("Failed to load configuration from environment"),
    }
}

fn asset_for(path: &Path, name: Option<String>) -> Result<AssetRequest> {
    let name = match name {
        Some(name) => name,
        None => path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .with_context(|| format!("Invalid image path: {}", path.display()))?,
    };
    Ok(AssetRequest::new(name, path.to_string_lossy()))
}

async fn run(args: CliArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;

    let store = if args.dry_run {
        info!("Dry run enabled, uploads stay in memory");
        CloudinaryStore::with_gateway(config, Arc::new(MockGateway::new()))
    } else {
        CloudinaryStore::new(config)
    };

    match args.command {
        Command::Exists { filename } => {
            let exists = store.exists(&filename).await;
            info!("{} -> {}", store.remote_id(&filename), exists);
            println!("{}", exists);
        }
        Command::Save { path, name } => {
            let asset = asset_for(&path, name)?;
            let url = store.save(&asset).await?;
            info!("Saved {}", asset.path);
            if let Some(url) = url {
                println!("{}", url);
            }
        }
        Command::Delete { filename } => {
            let ack = store.delete(&filename).await?;
            println!("{}", serde_json::to_string(&ack)?);
        }
        Command::Read { url, output } => {
            let bytes = store.read(&ReadOptions::new(url)).await?;
            tokio::fs::write(&output, &bytes).await?;
            info!("Wrote {} bytes to {}", bytes.len(), output.display());
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cloudinary_store=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = CliArgs::parse();

    if let Err(e) = run(args).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
    Ok(())
}
