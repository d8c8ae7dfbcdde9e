use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::utils::validate_and_normalize_url;
use crate::Result;

/// One unit of batch work: a remote video reference or a local audio file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkItem {
    /// URL handed to the audio extractor
    RemoteReference(String),

    /// Path to an audio file already on disk; skips straight to transcription
    LocalFile(PathBuf),
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkItem::RemoteReference(url) => write!(f, "{}", url),
            WorkItem::LocalFile(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Ordered sequence of work items.
///
/// Duplicate remote references are dropped on construction (first occurrence
/// wins); duplicate local files are kept as-is.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    items: Vec<WorkItem>,
}

impl Batch {
    pub fn new(items: Vec<WorkItem>) -> Self {
        let mut seen_urls: Vec<String> = Vec::new();
        let mut deduped = Vec::with_capacity(items.len());

        for item in items {
            match &item {
                WorkItem::RemoteReference(url) => {
                    if seen_urls.iter().any(|u| u == url) {
                        continue;
                    }
                    seen_urls.push(url.clone());
                    deduped.push(item);
                }
                WorkItem::LocalFile(_) => deduped.push(item),
            }
        }

        Self { items: deduped }
    }

    /// Build a batch from raw CLI inputs: URLs (validated and normalized)
    /// followed by local file paths, in that order.
    pub fn from_inputs(urls: &[String], files: &[PathBuf]) -> Result<Self> {
        let mut items = Vec::with_capacity(urls.len() + files.len());

        for url in urls {
            let url = url.trim();
            if url.is_empty() {
                continue;
            }
            let normalized = validate_and_normalize_url(url)?;
            items.push(WorkItem::RemoteReference(normalized));
        }

        for file in files {
            items.push(WorkItem::LocalFile(file.clone()));
        }

        Ok(Self::new(items))
    }

    pub fn items(&self) -> &[WorkItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Per-item aggregate outcome, derived from the item's step results
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    /// The transcription step ended in `Succeeded` or `Skipped`
    Succeeded(PathBuf),

    /// A required step failed; the batch moved on to the next item
    Failed,
}

impl ItemOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ItemOutcome::Succeeded(_))
    }
}

/// Final accounting for a batch run, emitted once as the last event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Number of items the batch was started with
    pub total: usize,

    /// Items whose subtitle step ended in success or skip
    pub succeeded: usize,

    /// Whether the run ended because the user requested a stop
    pub stopped: bool,
}
