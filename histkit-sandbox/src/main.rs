//! histkit: sandbox for the two-branch history workflow.
//!
//! Drives a workspace stored in a local directory with the reference engine
//! and a real HTTP transport.
//!
//! # Usage
//!
//! ```bash
//! # Create the repository (shared + working branch)
//! histkit --root ./notes --user alice init
//!
//! # List changed files and save them on the working branch
//! histkit --root ./notes --user alice status
//! histkit --root ./notes --user alice save -m "Draft"
//!
//! # Publish and mirror the shared branch
//! histkit --root ./notes --user alice remote set https://example.com/notes.git
//! histkit --root ./notes --user alice push
//! histkit --root ./notes --user alice sync
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Result, anyhow};
use clap::{Parser, Subcommand};
use futures::TryStreamExt;
use histkit_core::{GitHistory, HistoryConfig, HttpTransport, RemoteConfig, SaveOptions};
use histkit_engine::RefEngine;
use histkit_storage::LocalFilesApi;

#[derive(Parser, Debug)]
#[command(name = "histkit")]
#[command(author = "histkit Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Save, share and synchronize a workspace history")]
struct Cli {
    /// Directory holding the workspace
    #[arg(short, long, default_value = ".")]
    root: PathBuf,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Author name (overrides the configuration)
    #[arg(long)]
    user: Option<String>,

    /// Author email (overrides the configuration)
    #[arg(long)]
    email: Option<String>,

    /// Username for the remote server
    #[arg(long)]
    remote_user: Option<String>,

    /// Password for the remote server
    #[arg(long)]
    remote_password: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the repository if needed and switch to the working branch
    Init,

    /// List the files of the workspace with their status
    Status {
        /// Also list unchanged files
        #[arg(short, long)]
        all: bool,
    },

    /// Commit every changed file
    Save {
        /// Commit message (defaults to the list of saved files)
        #[arg(short, long)]
        message: Option<String>,
        /// Branch receiving the commit (default: current branch)
        #[arg(short, long)]
        branch: Option<String>,
    },

    /// Show the history of the current branch
    Log {
        /// Print entries as JSON
        #[arg(long)]
        json: bool,
    },

    /// List local branches
    Branches,

    /// Switch the workspace to a branch or commit, discarding changes
    Checkout {
        /// Branch name, ref or commit id
        reference: String,
    },

    /// Inspect or change the remote server
    Remote {
        #[command(subcommand)]
        command: RemoteCommands,
    },

    /// Push the current branch to the remote server
    Push,

    /// Replace the shared branch with the remote one
    Sync,
}

#[derive(Subcommand, Debug)]
enum RemoteCommands {
    /// Print the remote server URL
    Get,
    /// Set the remote server URL
    Set { url: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("histkit=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let history = open_history(&cli.root, config.clone())?;

    match cli.command {
        Commands::Init => cmd_init(&history).await,
        Commands::Status { all } => cmd_status(&history, all).await,
        Commands::Save { message, branch } => cmd_save(&history, message, branch).await,
        Commands::Log { json } => cmd_log(&history, json).await,
        Commands::Branches => cmd_branches(&history).await,
        Commands::Checkout { reference } => cmd_checkout(&history, &reference).await,
        Commands::Remote { command } => match command {
            RemoteCommands::Get => cmd_remote_get(&history).await,
            RemoteCommands::Set { url } => {
                cmd_remote_set(&history, cli.config.as_deref(), config, &url).await
            }
        },
        Commands::Push => cmd_push(&history).await,
        Commands::Sync => cmd_sync(&history).await,
    }
}

/// Configuration file merged with the command-line overrides
fn load_config(cli: &Cli) -> Result<HistoryConfig> {
    let mut config = match &cli.config {
        Some(path) => HistoryConfig::load(path)?,
        None => HistoryConfig::default(),
    };
    if let Some(user) = &cli.user {
        config.user_name = Some(user.clone());
    }
    if let Some(email) = &cli.email {
        config.user_email = Some(email.clone());
    }
    if cli.remote_user.is_some() || cli.remote_password.is_some() {
        let remote = config.remote.get_or_insert_with(RemoteConfig::default);
        if let Some(user) = &cli.remote_user {
            remote.username = Some(user.clone());
        }
        if let Some(password) = &cli.remote_password {
            remote.password = Some(password.clone());
        }
    }
    Ok(config)
}

fn open_history(root: &Path, config: HistoryConfig) -> Result<GitHistory> {
    let files = LocalFilesApi::open(root)
        .map_err(|e| anyhow!("Cannot open workspace {:?}: {}", root, e))?;
    let history = GitHistory::builder()
        .engine(Arc::new(RefEngine::new()))
        .transport(Arc::new(HttpTransport::new()?))
        .files(Arc::new(files))
        .config(config)
        .build()?;
    Ok(history)
}

async fn cmd_init(history: &GitHistory) -> Result<()> {
    history.init().await?;
    println!("Workspace ready");
    println!("  Control directory: {}", history.git_dir());
    println!("  Shared branch:     {}", history.main_branch());
    println!("  Working branch:    {}", history.working_branch());
    Ok(())
}

async fn cmd_status(history: &GitHistory, all: bool) -> Result<()> {
    let records: Vec<_> = history.get_files_status(None).await?.try_collect().await?;
    let mut changed = 0;
    for record in records.iter().filter(|r| all || r.is_dirty()) {
        println!("{:>18}  {}", record.status, record.path);
        changed += usize::from(record.is_dirty());
    }
    if changed == 0 && !all {
        println!("Nothing to save");
    }
    Ok(())
}

async fn cmd_save(
    history: &GitHistory,
    message: Option<String>,
    branch: Option<String>,
) -> Result<()> {
    let result = history
        .save_files(SaveOptions {
            filter: None,
            branch_name: branch,
            message,
        })
        .await?;
    match result.commit_id {
        Some(id) => {
            println!("Saved {} file(s) as {}", result.files.len(), id);
            for file in &result.files {
                println!("  {}", file);
            }
        }
        None => println!("Nothing to save"),
    }
    Ok(())
}

async fn cmd_log(history: &GitHistory, json: bool) -> Result<()> {
    let entries = history.get_log().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }
    for entry in &entries {
        let date = chrono::DateTime::from_timestamp(entry.commit.timestamp, 0)
            .map(|d| d.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_default();
        println!("commit {}", entry.oid);
        println!(
            "Author: {} <{}>",
            entry.commit.author.name, entry.commit.author.email
        );
        println!("Date:   {}", date);
        println!();
        for line in entry.commit.message.lines() {
            println!("    {}", line);
        }
        println!();
    }
    Ok(())
}

async fn cmd_branches(history: &GitHistory) -> Result<()> {
    let current = history.get_current_branch().await?;
    for branch in history.get_branches().await? {
        let marker = if current.as_deref() == Some(branch.as_str()) {
            "*"
        } else {
            " "
        };
        println!("{} {}", marker, branch);
    }
    Ok(())
}

async fn cmd_checkout(history: &GitHistory, reference: &str) -> Result<()> {
    history.checkout(reference).await?;
    match history.get_current_branch().await? {
        Some(branch) => println!("On branch {}", branch),
        None => println!("HEAD detached at {}", reference),
    }
    Ok(())
}

async fn cmd_remote_get(history: &GitHistory) -> Result<()> {
    match history.get_remote_server_url().await? {
        Some(url) => println!("{}", url),
        None => println!("No remote server configured"),
    }
    Ok(())
}

async fn cmd_remote_set(
    history: &GitHistory,
    config_path: Option<&Path>,
    mut config: HistoryConfig,
    url: &str,
) -> Result<()> {
    history.set_remote_server_url(url).await?;
    if let Some(path) = config_path {
        config
            .remote
            .get_or_insert_with(RemoteConfig::default)
            .url = Some(url.to_string());
        config.save(path)?;
        tracing::debug!("Remote URL stored in {:?}", path);
    }
    println!("Remote server set to {}", url);
    Ok(())
}

async fn cmd_push(history: &GitHistory) -> Result<()> {
    let result = history.send_to_remote().await?;
    for (name, status) in &result.refs {
        println!("  {}: {}", name, status);
    }
    if !result.ok {
        return Err(anyhow!(
            "Push failed: {}",
            result.error.as_deref().unwrap_or("unknown error")
        ));
    }
    println!("Push complete");
    Ok(())
}

async fn cmd_sync(history: &GitHistory) -> Result<()> {
    history.sync_with_remote().await?;
    let head = history
        .get_log()
        .await?
        .into_iter()
        .next()
        .map(|entry| entry.oid)
        .unwrap_or_default();
    println!("{} synchronized at {}", history.main_branch(), head);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("histkit.json");
        let stored = HistoryConfig {
            user_name: Some("alice".to_string()),
            user_email: Some("alice@example.com".to_string()),
            remote: Some(RemoteConfig {
                url: Some("http://hub.local/team.git".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        stored.save(&path).unwrap();

        let cli = Cli::parse_from([
            "histkit",
            "--config",
            path.to_str().unwrap(),
            "--user",
            "bob",
            "--remote-user",
            "admin",
            "status",
        ]);
        let config = load_config(&cli).unwrap();
        assert_eq!(config.user_name.as_deref(), Some("bob"));
        assert_eq!(config.user_email.as_deref(), Some("alice@example.com"));
        let remote = config.remote.unwrap();
        assert_eq!(remote.url.as_deref(), Some("http://hub.local/team.git"));
        assert_eq!(remote.username.as_deref(), Some("admin"));
        assert_eq!(remote.password, None);
    }

    #[test]
    fn test_missing_config_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");
        let cli = Cli::parse_from(["histkit", "--config", path.to_str().unwrap(), "log"]);
        let config = load_config(&cli).unwrap();
        assert_eq!(config, HistoryConfig::default());
        assert!(open_history(dir.path(), config).is_err());
    }

    #[tokio::test]
    async fn test_save_in_local_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.md"), "# Notes").unwrap();
        let config = HistoryConfig {
            user_name: Some("alice".to_string()),
            ..Default::default()
        };
        let history = open_history(dir.path(), config).unwrap();
        history.init().await.unwrap();
        assert!(dir.path().join(".git/HEAD").is_file());

        let saved = history.save_files(SaveOptions::default()).await.unwrap();
        assert_eq!(saved.files, vec!["notes.md"]);
        assert_eq!(history.get_log().await.unwrap().len(), 2);
        assert!(dir.path().join(".gitkeep").is_file());
    }
}
