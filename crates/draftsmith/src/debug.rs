use anyhow::{Context, Result};
use lazy_static::lazy_static;
use regex::Regex;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

lazy_static! {
    static ref HTML_DOCUMENT: Regex = Regex::new(r"(?s)(<html.*?>.*?</html>)").unwrap();
}

/// A named intermediate result of the refinement loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugArtifact {
    /// The primary content produced by a pass
    Content { pass: u32 },
    /// The reasoning text a pass produced before its answer
    Thinking { pass: u32 },
    /// Every pass's text, concatenated
    FullStream,
}

impl DebugArtifact {
    pub fn file_name(&self) -> String {
        match self {
            DebugArtifact::Content { pass } => format!("pass_{}.html", pass),
            DebugArtifact::Thinking { pass } => format!("thinking_pass_{}.txt", pass),
            DebugArtifact::FullStream => "full_stream.txt".to_string(),
        }
    }
}

impl fmt::Display for DebugArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.file_name())
    }
}

/// Best-effort side channel for intermediate results.
///
/// Callers log and drop errors; a failing sink never fails a completion.
pub trait DebugSink: Send + Sync {
    fn record(&self, artifact: DebugArtifact, content: &str) -> Result<()>;
}

/// Writes each artifact to its own file in a per-run directory
pub struct DebugFileWriter {
    dir: PathBuf,
}

impl DebugFileWriter {
    /// Create a fresh run directory below `root`
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let dir = root.as_ref().join(Uuid::new_v4().to_string());
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create debug directory {}", dir.display()))?;
        tracing::info!(dir = %dir.display(), "writing debug artifacts");
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl DebugSink for DebugFileWriter {
    fn record(&self, artifact: DebugArtifact, content: &str) -> Result<()> {
        let path = self.dir.join(artifact.file_name());
        fs::write(&path, content)
            .with_context(|| format!("failed to write {}", path.display()))
    }
}

/// The first `<html ...>...</html>` document in the text, or the whole text if there is none
pub fn extract_html_content(text: &str) -> &str {
    HTML_DOCUMENT
        .captures(text)
        .and_then(|captures| captures.get(1))
        .map_or(text, |document| document.as_str())
}
