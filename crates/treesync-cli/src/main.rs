//! Treesync CLI
//!
//! Thin wrapper around treesync-core for command-line usage.
//!
//! ## Usage
//!
//! ```bash
//! # Seed the local tree from a JSON export
//! treesync import tree.json
//!
//! # Show the tree and the publish status
//! treesync show
//!
//! # Move nodes under another directory (omit --to for the top level)
//! treesync mv docs/intro docs/setup --to guides --index 0
//!
//! # Rename, delete and create
//! treesync rename guides handbook
//! treesync rm notes/old
//! treesync new --parent handbook --kind file --name faq
//!
//! # Inspect and publish queued changes
//! treesync queue
//! treesync publish
//!
//! # Drop unpublished changes
//! treesync discard
//! ```

mod outbox;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use treesync_core::engine::DATABASE_FILE_NAME;
use treesync_core::{
    NewNode, NodeLevel, PublishOutcome, RenameMode, Storage, TracingNotifier, Tree, TreeNode,
    TreeSyncConfig, TreeSyncEngine,
};

use crate::outbox::{DirectoryRemote, PathIndexer};

/// Treesync - offline-first knowledge tree restructuring
#[derive(Parser)]
#[command(name = "treesync")]
#[command(version = "0.1.0")]
#[command(about = "Treesync - offline-first knowledge tree restructuring")]
#[command(
    long_about = "Reorganize a hierarchical knowledge base offline. Every move, rename, delete and create is queued locally and published to the remote only on request."
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Data directory (default: ~/.treesync/data)
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    /// Remote directory to publish into (default: <data-dir>/remote)
    #[arg(short, long, global = true)]
    remote: Option<PathBuf>,

    /// Rename changes only the name; paths and ids keep their old values
    #[arg(long, global = true)]
    loose_rename: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replace the local tree with a JSON array of nodes
    Import {
        /// Path to the JSON file
        file: PathBuf,
    },

    /// Print the tree and publish status
    Show,

    /// Move nodes under a directory
    Mv {
        /// Ids of the nodes to move
        #[arg(required = true)]
        ids: Vec<String>,
        /// Destination directory id (top level when omitted)
        #[arg(long)]
        to: Option<String>,
        /// Position among the destination's children
        #[arg(long, default_value_t = 0)]
        index: usize,
    },

    /// Rename a node
    Rename {
        /// Id of the node
        id: String,
        /// New name
        name: String,
    },

    /// Delete nodes and everything below them
    Rm {
        /// Ids of the nodes to delete
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Create a file or directory
    New {
        /// Parent directory id (top level when omitted)
        #[arg(long)]
        parent: Option<String>,
        #[arg(long, value_enum, default_value_t = Kind::File)]
        kind: Kind,
        /// Name (generated when omitted)
        #[arg(long)]
        name: Option<String>,
        /// Initial file content
        #[arg(long)]
        content: Option<String>,
        #[arg(long, default_value_t = 0)]
        index: usize,
    },

    /// List queued changes
    Queue,

    /// Publish pending changes to the remote
    Publish,

    /// Return failed changes to pending and publish again
    Retry,

    /// Drop every unpublished change
    Discard,
}

#[derive(Clone, Copy, ValueEnum)]
enum Kind {
    File,
    Dir,
}

fn setup_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Get the default data directory (~/.treesync/data)
fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".treesync")
        .join("data")
}

fn open_engine(data_dir: &Path, remote_dir: &Path, loose_rename: bool) -> Result<TreeSyncEngine> {
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("Cannot create data directory {}", data_dir.display()))?;

    let mut config = TreeSyncConfig::load(data_dir)?;
    if loose_rename {
        config.mutation.rename_mode = RenameMode::Loose;
    }
    let storage = Storage::new(data_dir.join(DATABASE_FILE_NAME))?;

    let engine = TreeSyncEngine::with_store(
        Arc::new(storage),
        config,
        Arc::new(DirectoryRemote::new(remote_dir)),
        Arc::new(PathIndexer::new(remote_dir)),
        Arc::new(TracingNotifier::new()),
    )?;
    Ok(engine)
}

fn level_label(level: NodeLevel) -> &'static str {
    match level {
        NodeLevel::Root => "root",
        NodeLevel::Collection => "collection",
        NodeLevel::Module => "module",
        NodeLevel::Unit => "unit",
        NodeLevel::Other => "other",
    }
}

fn print_tree(tree: &Tree) {
    if tree.is_empty() {
        println!("(empty tree)");
        return;
    }
    let mut stack: Vec<(&TreeNode, usize)> = tree.roots().iter().rev().map(|n| (n, 0)).collect();
    while let Some((node, depth)) = stack.pop() {
        let indent = "  ".repeat(depth);
        if node.is_directory() {
            let counts = node.descendant_counts();
            println!(
                "{}{}/ [{}] ({} files, {} dirs)",
                indent,
                node.name,
                level_label(node.level),
                counts.files,
                counts.directories
            );
        } else {
            println!("{}{} [{}]", indent, node.name, level_label(node.level));
        }
        stack.extend(node.children().iter().rev().map(|c| (c, depth + 1)));
    }
}

fn report(outcome: &PublishOutcome) -> Result<()> {
    match outcome {
        PublishOutcome::NothingToPublish => println!("Nothing to publish"),
        PublishOutcome::AlreadyInFlight => println!("A publish is already running"),
        PublishOutcome::Published { count, reindex } => {
            println!("Published {} changes", count);
            if let treesync_core::ReindexStatus::Delayed { error } = reindex {
                println!("Search indexing delayed: {}", error);
            }
        }
        PublishOutcome::Failed { count, error } => {
            anyhow::bail!("Publish failed for {} changes: {}", count, error);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let data_dir = cli.data_dir.unwrap_or_else(default_data_dir);
    let remote_dir = cli.remote.unwrap_or_else(|| data_dir.join("remote"));
    let mut engine = open_engine(&data_dir, &remote_dir, cli.loose_rename)?;

    match cli.command {
        Commands::Import { file } => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("Cannot read {}", file.display()))?;
            let tree = Tree::from_json(&raw)?;
            let tree = engine.import_tree(tree)?;
            println!("Imported {} nodes", tree.len());
        }

        Commands::Show => {
            print_tree(engine.tree());
            println!();
            println!("Status: {}", engine.status());
        }

        Commands::Mv { ids, to, index } => {
            engine.move_nodes(ids.as_slice(), to.as_deref(), index)?;
            println!(
                "Moved {} node(s) to {}",
                ids.len(),
                to.as_deref().unwrap_or("(top level)")
            );
            println!("Status: {}", engine.status());
        }

        Commands::Rename { id, name } => {
            engine.rename(&id, &name)?;
            println!("Renamed {} to {}", id, name);
            println!("Status: {}", engine.status());
        }

        Commands::Rm { ids } => {
            let before = engine.tree().len();
            let after = engine.delete(ids.as_slice())?.len();
            println!("Deleted {} node(s)", before - after);
            println!("Status: {}", engine.status());
        }

        Commands::New {
            parent,
            kind,
            name,
            content,
            index,
        } => {
            let mut node = match kind {
                Kind::File => NewNode::file(),
                Kind::Dir => NewNode::directory(),
            };
            if let Some(name) = name {
                node = node.named(name);
            }
            if let Some(content) = content {
                node = node.with_content(content);
            }
            let id = engine.create(parent.as_deref(), index, node)?;
            println!("Created:");
            println!("  ID: {}", id);
            println!("Status: {}", engine.status());
        }

        Commands::Queue => {
            let records = engine.records();
            if records.is_empty() {
                println!("No queued changes");
            } else {
                for record in &records {
                    println!(
                        "{:<10} {:<7} {} (retries: {})",
                        record.status.to_string(),
                        record.kind().to_string(),
                        record.payload.subject_path(),
                        record.retry_count
                    );
                }
            }
            println!();
            println!("Status: {}", engine.status());
        }

        Commands::Publish => {
            let outcome = engine.publish().await;
            keep_failed(&engine, &outcome);
            report(&outcome)?;
        }

        Commands::Retry => {
            let outcome = engine.retry_failed().await;
            keep_failed(&engine, &outcome);
            report(&outcome)?;
        }

        Commands::Discard => {
            let count = engine.discard();
            println!("Discarded {} changes", count);
        }
    }

    Ok(())
}

/// Failed records are not durable; return retryable ones to pending so the
/// next run can publish them
fn keep_failed(engine: &TreeSyncEngine, outcome: &PublishOutcome) {
    if !matches!(outcome, PublishOutcome::Failed { .. }) {
        return;
    }
    let kept = engine.coordinator().with_queue(|queue| queue.requeue_failed());
    let dropped = engine.counts().failed;
    if kept > 0 {
        eprintln!("{} changes kept for the next publish", kept);
    }
    if dropped > 0 {
        eprintln!("{} changes reached the retry limit and were dropped", dropped);
    }
}
