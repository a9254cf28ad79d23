//! One collection cycle: walk the stats directory, resolve every player,
//! and extract the configured stats from each save file.
//!
//! A cycle is all-or-nothing. Samples are buffered and only returned once
//! every file has been processed; any fatal error discards them. A player the
//! identity service does not know is skipped, and a path missing from a
//! document simply produces no sample.

use crate::document::{self, StatPath, StatValue};
use crate::identity::{IdentityError, IdentityResolver, PlayerIdentity};
use crate::walker::{self, PlayerFile, WalkError};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// One configured stat: the `stat` label value and where to find it.
#[derive(Debug, Clone, PartialEq)]
pub struct StatDefinition {
    pub name: String,
    pub path: StatPath,
}

/// Immutable inputs shared by every cycle.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub stats_dir: PathBuf,
    pub namespace: String,
    pub stats: Vec<StatDefinition>,
}

/// A labeled counter value ready for exposition.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    pub player: String,
    pub namespace: String,
    pub stat: String,
    pub value: f64,
}

/// Errors that abort a collection cycle.
#[derive(Debug)]
pub enum CollectError {
    Walk(WalkError),
    /// The directory walk panicked or was cancelled on the blocking pool.
    WalkTask(tokio::task::JoinError),
    Identity(IdentityError),
    /// A player file could not be read.
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    /// A player file is not valid JSON.
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    /// A configured path points at something that is not a number.
    SchemaMismatch {
        path: PathBuf,
        stat: String,
        stat_path: String,
        found: &'static str,
    },
}

impl std::fmt::Display for CollectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollectError::Walk(e) => write!(f, "{e}"),
            CollectError::WalkTask(e) => write!(f, "directory walk did not complete: {e}"),
            CollectError::Identity(e) => write!(f, "{e}"),
            CollectError::Read { path, source } => {
                write!(f, "failed to read {}: {}", path.display(), source)
            }
            CollectError::Parse { path, source } => {
                write!(f, "failed to parse {}: {}", path.display(), source)
            }
            CollectError::SchemaMismatch {
                path,
                stat,
                stat_path,
                found,
            } => write!(
                f,
                "stat '{stat}' at '{stat_path}' in {} is a {found}, expected a number",
                path.display()
            ),
        }
    }
}

impl std::error::Error for CollectError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CollectError::Walk(e) => Some(e),
            CollectError::WalkTask(e) => Some(e),
            CollectError::Identity(e) => Some(e),
            CollectError::Read { source, .. } => Some(source),
            CollectError::Parse { source, .. } => Some(source),
            CollectError::SchemaMismatch { .. } => None,
        }
    }
}

impl From<WalkError> for CollectError {
    fn from(e: WalkError) -> Self {
        CollectError::Walk(e)
    }
}

/// Run a full collection cycle.
pub async fn collect<R: IdentityResolver>(
    config: &CollectorConfig,
    resolver: &R,
) -> Result<Vec<MetricSample>, CollectError> {
    let start = Instant::now();
    let root = config.stats_dir.clone();
    let files = tokio::task::spawn_blocking(move || walker::list_player_files(&root))
        .await
        .map_err(CollectError::WalkTask)??;

    let mut samples = Vec::new();
    let mut skipped = 0usize;

    for file in &files {
        tracing::debug!(player_id = %file.player_id, path = %file.path.display(), "processing player file");

        let identity = match resolver.resolve(&file.player_id).await {
            Ok(identity) => identity,
            Err(e) if e.is_not_found() => {
                tracing::warn!(player_id = %file.player_id, "player not found, skipping");
                skipped += 1;
                continue;
            }
            Err(e) => return Err(CollectError::Identity(e)),
        };
        tracing::debug!(uuid = %identity.id, name = %identity.display_name, "resolved player");

        let document = read_document(file).await?;
        extract_stats(config, &identity, &file.path, &document, &mut samples)?;
    }

    tracing::info!(
        files = files.len(),
        skipped,
        samples = samples.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "collection cycle complete"
    );
    Ok(samples)
}

async fn read_document(file: &PlayerFile) -> Result<Value, CollectError> {
    let bytes = tokio::fs::read(&file.path)
        .await
        .map_err(|source| CollectError::Read {
            path: file.path.clone(),
            source,
        })?;
    document::parse_document(&bytes).map_err(|source| CollectError::Parse {
        path: file.path.clone(),
        source,
    })
}

/// Evaluate every stat against one document, appending a sample per number found.
fn extract_stats(
    config: &CollectorConfig,
    identity: &PlayerIdentity,
    path: &Path,
    document: &Value,
    samples: &mut Vec<MetricSample>,
) -> Result<(), CollectError> {
    for stat in &config.stats {
        match document::resolve_stat(document, &stat.path) {
            StatValue::Absent => {
                tracing::trace!(stat = %stat.name, path = %stat.path, "stat absent");
            }
            StatValue::Number(value) => samples.push(MetricSample {
                player: identity.display_name.clone(),
                namespace: config.namespace.clone(),
                stat: stat.name.clone(),
                value,
            }),
            StatValue::Mismatch(found) => {
                return Err(CollectError::SchemaMismatch {
                    path: path.to_path_buf(),
                    stat: stat.name.clone(),
                    stat_path: stat.path.to_string(),
                    found,
                });
            }
        }
    }
    Ok(())
}
