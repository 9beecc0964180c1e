//! CLI commands and argument parsing
//!
//! This module defines the command-line interface structure using clap,
//! including all commands, subcommands, and their arguments.

use crate::blob::{BlobInfoContract, BlobStorage, StorageContainerContract};
use crate::cli::output::{render_json, render_rows, OutputOptions};
use crate::config::{AzureBlobStorageOptions, Settings};
use crate::error::{Result, StorageError};
use crate::health::{HealthChecksBuilder, HealthStatus};
use crate::registry::ServiceRegistry;
use bytes::Bytes;
use clap::{Parser, Subcommand};
use futures::TryStreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

#[derive(Parser)]
#[command(name = "azblob")]
#[command(about = "Manage containers and blobs in Azure Blob Storage")]
#[command(version, author)]
pub struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Print JSON instead of tables
    #[arg(long, global = true)]
    pub json: bool,

    /// Disable colored table headers
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Configuration file (defaults to ~/.config/azblob/azblob.toml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Container to use instead of the configured default
    #[arg(short, long, global = true, env = "AZBLOB_CONTAINER")]
    pub container: Option<String>,

    /// Use a named account from an [accounts.<name>] section
    #[arg(long, global = true, value_name = "NAME")]
    pub account: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Container management
    Containers {
        #[command(subcommand)]
        command: ContainerCommands,
    },
    /// Blob management
    Blobs {
        #[command(subcommand)]
        command: BlobCommands,
    },
    /// Check that the storage account and container are reachable
    Health {
        /// Name of the check in the report
        #[arg(long)]
        name: Option<String>,
        /// Probe timeout in seconds
        #[arg(long, value_name = "SECS", default_value = "30")]
        timeout: u64,
        /// Report failures as Degraded instead of Unhealthy
        #[arg(long)]
        degraded: bool,
        /// Tags attached to the check (can be specified multiple times)
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
}

#[derive(Subcommand)]
pub enum ContainerCommands {
    /// List containers in the account (alias: ls)
    #[command(alias = "ls")]
    List,
    /// Create a container unless it already exists
    Create {
        /// Container name (defaults to --container or the configured container)
        name: Option<String>,
    },
    /// Delete a container and everything in it (alias: rm)
    #[command(alias = "rm")]
    Delete {
        /// Container name (defaults to --container or the configured container)
        name: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum BlobCommands {
    /// List blobs, optionally under a folder (alias: ls)
    #[command(alias = "ls")]
    List {
        /// Name prefix to filter by, e.g. 'reports/2024'
        #[arg(short, long)]
        folder: Option<String>,
    },
    /// Upload a local file
    Upload {
        /// Path to the file
        file_path: PathBuf,
        /// Blob name (defaults to the file name)
        #[arg(short, long)]
        name: Option<String>,
        /// Folder to upload into
        #[arg(short, long)]
        folder: Option<String>,
        /// Content type (guessed from the file extension if omitted)
        #[arg(long)]
        content_type: Option<String>,
    },
    /// Download a blob to a local file
    Download {
        /// Blob name, including any folder
        name: String,
        /// Output path (defaults to the last segment of the blob name)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Overwrite an existing output file
        #[arg(long)]
        force: bool,
    },
    /// Print a time-limited read URL for a blob
    Url {
        /// Blob name, including any folder
        name: String,
    },
    /// Delete a blob (alias: rm)
    #[command(alias = "rm")]
    Delete {
        /// Blob name, including any folder
        name: String,
    },
    /// Delete every blob under a folder
    DeleteFolder {
        /// Folder name, e.g. 'reports/2024'
        folder: String,
    },
}

impl Cli {
    pub fn output(&self) -> OutputOptions {
        OutputOptions {
            json: self.json,
            no_color: self.no_color,
        }
    }

    pub async fn execute(self, settings: Settings) -> Result<()> {
        let output = self.output();
        let container = self.container.as_deref();
        let account = self.account.as_deref();

        match self.command {
            Commands::Containers { command } => {
                let storage = resolve_storage(&settings, account)?;
                execute_container_command(storage.as_ref(), command, container, output).await
            }
            Commands::Blobs { command } => {
                let storage = resolve_storage(&settings, account)?;
                execute_blob_command(storage.as_ref(), command, container, output).await
            }
            Commands::Health {
                name,
                timeout,
                degraded,
                tags,
            } => {
                let options = settings.account_options(account)?;
                execute_health(
                    options,
                    container,
                    name,
                    Duration::from_secs(timeout),
                    degraded,
                    tags,
                    output,
                )
                .await
            }
        }
    }
}

fn resolve_storage(settings: &Settings, account: Option<&str>) -> Result<Arc<dyn BlobStorage>> {
    let registry = ServiceRegistry::from_settings(settings)?;
    match account {
        Some(name) => registry.named_blob_storage(name),
        None => registry.default_blob_storage(),
    }
}

fn container_label(container: Option<&str>) -> String {
    match container {
        Some(container) => format!("'{container}'"),
        None => "default container".to_string(),
    }
}

async fn execute_container_command(
    storage: &dyn BlobStorage,
    command: ContainerCommands,
    container: Option<&str>,
    output: OutputOptions,
) -> Result<()> {
    match command {
        ContainerCommands::List => {
            let containers: Vec<StorageContainerContract> =
                storage.list_containers().try_collect().await?;
            println!(
                "{}",
                render_rows(&containers, output, "No containers found")?
            );
        }
        ContainerCommands::Create { name } => {
            let target = name.as_deref().or(container);
            storage.create_container_if_not_exists(target).await?;
            println!("✅ Container {} is ready", container_label(target));
        }
        ContainerCommands::Delete { name } => {
            let target = name.as_deref().or(container);
            storage.delete_container(target).await?;
            println!("✅ Deleted container {}", container_label(target));
        }
    }

    Ok(())
}

async fn execute_blob_command(
    storage: &dyn BlobStorage,
    command: BlobCommands,
    container: Option<&str>,
    output: OutputOptions,
) -> Result<()> {
    match command {
        BlobCommands::List { folder } => {
            execute_blob_list(storage, container, folder.as_deref(), output).await
        }
        BlobCommands::Upload {
            file_path,
            name,
            folder,
            content_type,
        } => {
            execute_blob_upload(
                storage,
                &file_path,
                name,
                folder.as_deref(),
                content_type,
                container,
            )
            .await
        }
        BlobCommands::Download {
            name,
            output: output_path,
            force,
        } => execute_blob_download(storage, &name, output_path, force, container).await,
        BlobCommands::Url { name } => {
            match storage.get_blob_url(&name, container).await? {
                Some(url) if output.json => {
                    println!("{}", render_json(&serde_json::json!({ "name": name, "url": url }))?)
                }
                Some(url) => println!("{url}"),
                None => println!("The account credentials cannot sign URLs; no URL for '{name}'"),
            }
            Ok(())
        }
        BlobCommands::Delete { name } => {
            storage.delete_blob(&name, container).await?;
            println!("✅ Deleted blob '{name}'");
            Ok(())
        }
        BlobCommands::DeleteFolder { folder } => {
            storage.delete_folder(&folder, container).await?;
            println!("✅ Deleted folder '{}'", folder.trim_end_matches('/'));
            Ok(())
        }
    }
}

async fn execute_blob_list(
    storage: &dyn BlobStorage,
    container: Option<&str>,
    folder: Option<&str>,
    output: OutputOptions,
) -> Result<()> {
    let blobs: Vec<BlobInfoContract> = storage.list_blobs(container, folder).try_collect().await?;

    println!("{}", render_rows(&blobs, output, "No blobs found")?);
    if !output.json && !blobs.is_empty() {
        println!("\nTotal blobs: {}", blobs.len());
    }

    Ok(())
}

async fn execute_blob_upload(
    storage: &dyn BlobStorage,
    file_path: &Path,
    name: Option<String>,
    folder: Option<&str>,
    content_type: Option<String>,
    container: Option<&str>,
) -> Result<()> {
    if !file_path.is_file() {
        return Err(StorageError::invalid_argument(format!(
            "File not found: {}",
            file_path.display()
        )));
    }

    let remote_name = match name {
        Some(name) => name,
        None => file_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| {
                StorageError::invalid_argument(format!(
                    "Cannot derive a blob name from '{}'",
                    file_path.display()
                ))
            })?,
    };

    let content_type = content_type.unwrap_or_else(|| {
        mime_guess::from_path(file_path)
            .first_or_octet_stream()
            .to_string()
    });

    let content = Bytes::from(tokio::fs::read(file_path).await?);
    let size = content.len();

    println!("Uploading '{}' as '{remote_name}'...", file_path.display());
    storage
        .upload_blob(&remote_name, &content_type, content, container, folder)
        .await?;

    println!("✅ Successfully uploaded '{remote_name}'");
    println!("   Size: {size} bytes");
    println!("   Content-Type: {content_type}");

    Ok(())
}

async fn execute_blob_download(
    storage: &dyn BlobStorage,
    name: &str,
    output: Option<PathBuf>,
    force: bool,
    container: Option<&str>,
) -> Result<()> {
    let output_path =
        output.unwrap_or_else(|| PathBuf::from(name.rsplit('/').next().unwrap_or(name)));

    if output_path.exists() && !force {
        return Err(StorageError::invalid_argument(format!(
            "File '{}' already exists. Use --force to overwrite.",
            output_path.display()
        )));
    }

    let (info, mut content) = storage.get_blob_contents(name, container).await?.into_parts();

    let mut file = tokio::fs::File::create(&output_path).await?;
    let written = tokio::io::copy(&mut content, &mut file).await?;
    file.flush().await?;

    println!(
        "✅ Downloaded '{}' to '{}' ({written} bytes, {})",
        info.name,
        output_path.display(),
        info.content_type
    );

    Ok(())
}

async fn execute_health(
    options: &AzureBlobStorageOptions,
    container: Option<&str>,
    name: Option<String>,
    timeout: Duration,
    degraded: bool,
    tags: Vec<String>,
    output: OutputOptions,
) -> Result<()> {
    let container = container.or(options.container_name.as_deref());
    let failure_status = degraded.then_some(HealthStatus::Degraded);

    let mut builder = HealthChecksBuilder::new();
    builder.add_blob_storage(
        options,
        container,
        name.as_deref(),
        failure_status,
        tags,
        Some(timeout),
    )?;

    let report = builder.run().await;

    if output.json {
        println!("{}", render_json(&report)?);
    } else {
        println!("{}", render_rows(&report.entries, output, "No health checks registered")?);
        println!("\nOverall: {} ({}ms)", report.status, report.total_duration_ms);
    }

    if report.status == HealthStatus::Unhealthy {
        return Err(StorageError::backend("Storage account is unhealthy"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_blob_upload() {
        let cli = Cli::try_parse_from([
            "azblob",
            "--container",
            "uploads",
            "blobs",
            "upload",
            "report.pdf",
            "--folder",
            "reports/2024",
        ])
        .unwrap();

        assert_eq!(cli.container.as_deref(), Some("uploads"));
        match cli.command {
            Commands::Blobs {
                command:
                    BlobCommands::Upload {
                        file_path,
                        name,
                        folder,
                        content_type,
                    },
            } => {
                assert_eq!(file_path, PathBuf::from("report.pdf"));
                assert_eq!(name, None);
                assert_eq!(folder.as_deref(), Some("reports/2024"));
                assert_eq!(content_type, None);
            }
            _ => panic!("expected blobs upload"),
        }
    }

    #[test]
    fn test_parse_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["azblob", "containers", "ls", "--json", "--debug"]).unwrap();
        assert!(cli.json);
        assert!(cli.debug);
        assert!(matches!(
            cli.command,
            Commands::Containers {
                command: ContainerCommands::List
            }
        ));
    }

    #[test]
    fn test_parse_health_defaults() {
        let cli = Cli::try_parse_from(["azblob", "health", "--tag", "storage"]).unwrap();
        match cli.command {
            Commands::Health {
                name,
                timeout,
                degraded,
                tags,
            } => {
                assert_eq!(name, None);
                assert_eq!(timeout, 30);
                assert!(!degraded);
                assert_eq!(tags, vec!["storage"]);
            }
            _ => panic!("expected health"),
        }
    }

    #[test]
    fn test_delete_folder_requires_folder() {
        assert!(Cli::try_parse_from(["azblob", "blobs", "delete-folder"]).is_err());
    }
}
