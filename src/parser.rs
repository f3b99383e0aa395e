//! Log discovery and JSONL streaming
//!
//! Usage logs live under one or more Claude roots:
//!
//! ```text
//! ~/.claude/projects/<project>/<session>.jsonl
//! ~/.claude/vms/<vm>/projects/<project>/<session>.jsonl
//! ```
//!
//! Gemini CLI sessions can be read alongside them. Each one is a whole JSON
//! document whose `messages` array holds the records:
//!
//! ```text
//! ~/.gemini/tmp/<project-hash>/chats/session-<id>.json
//! ```
//!
//! [`FileParser`] finds the roots and files, and streams each record into a
//! [`JsonlProcessor`]. Records are decoded as untyped JSON; interpreting them
//! is the processor's business. Files that cannot be opened and lines that are
//! not JSON are skipped and counted, never fatal.

use crate::config::PathsConfig;
use crate::models::UsageEvent;
use crate::normalizer::{classify, Rejection};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use glob::glob;
use serde_json::Value;
use std::fs::{metadata, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Consumer of decoded JSONL records.
pub trait JsonlProcessor {
    type Output;

    fn process_record(&mut self, record: Value, line_number: usize) -> Result<()>;
    fn finalize(self) -> Result<Self::Output>;
}

/// Counters for one scan over the log tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct ScanStats {
    pub roots: usize,
    pub files_found: usize,
    pub files_scanned: usize,
    pub files_skipped_old: usize,
    pub files_unreadable: usize,
    pub lines_decoded: usize,
    pub lines_undecodable: usize,
}

#[derive(Debug, Clone, Copy)]
enum LogFormat {
    Jsonl,
    GeminiSession,
}

pub struct FileParser {
    claude_home: PathBuf,
    include_vms: bool,
    gemini_home: Option<PathBuf>,
}

impl FileParser {
    pub fn new(claude_home: impl Into<PathBuf>, include_vms: bool) -> Self {
        Self {
            claude_home: claude_home.into(),
            include_vms,
            gemini_home: None,
        }
    }

    /// Also read Gemini CLI sessions below `gemini_home`.
    pub fn with_gemini_home(mut self, gemini_home: impl Into<PathBuf>) -> Self {
        self.gemini_home = Some(gemini_home.into());
        self
    }

    pub fn from_config(paths: &PathsConfig) -> Self {
        let parser = Self::new(&paths.claude_home, paths.include_vms);
        if paths.include_gemini {
            parser.with_gemini_home(&paths.gemini_home)
        } else {
            parser
        }
    }

    pub fn claude_home(&self) -> &Path {
        &self.claude_home
    }

    /// The Gemini `tmp` directory, when Gemini is enabled and it exists.
    pub fn gemini_chat_dir(&self) -> Option<PathBuf> {
        self.gemini_home
            .as_ref()
            .map(|home| home.join("tmp"))
            .filter(|dir| dir.is_dir())
    }

    /// True when at least one Claude root or the Gemini directory exists.
    pub fn has_sources(&self) -> bool {
        self.gemini_chat_dir().is_some() || !self.discover_claude_paths().is_empty()
    }

    /// Roots that have a `projects` directory, main root first.
    pub fn discover_claude_paths(&self) -> Vec<PathBuf> {
        let mut paths = Vec::new();

        if self.claude_home.join("projects").is_dir() {
            paths.push(self.claude_home.clone());
        }

        if self.include_vms {
            let vms_dir = self.claude_home.join("vms");
            if let Ok(entries) = std::fs::read_dir(&vms_dir) {
                let mut vm_paths: Vec<PathBuf> = entries
                    .flatten()
                    .map(|entry| entry.path())
                    .filter(|path| path.join("projects").is_dir())
                    .collect();
                vm_paths.sort();
                paths.extend(vm_paths);
            }
        }

        paths
    }

    /// Every `*.jsonl` below each root's `projects` directory, sorted.
    pub fn find_jsonl_files(&self, claude_paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();

        for claude_path in claude_paths {
            let projects_dir = claude_path.join("projects");
            let base = glob::Pattern::escape(&projects_dir.to_string_lossy());
            let pattern = format!("{}/**/*.jsonl", base);

            let entries =
                glob(&pattern).with_context(|| format!("Invalid glob pattern: {}", pattern))?;
            files.extend(entries.flatten().filter(|path| path.is_file()));
        }

        files.sort();
        files.dedup();
        Ok(files)
    }

    /// Every `chats/session-*.json` below the Gemini `tmp` directory, sorted.
    pub fn find_gemini_sessions(&self) -> Result<Vec<PathBuf>> {
        let Some(chat_dir) = self.gemini_chat_dir() else {
            return Ok(Vec::new());
        };
        let base = glob::Pattern::escape(&chat_dir.to_string_lossy());
        let pattern = format!("{}/**/chats/session-*.json", base);

        let mut files: Vec<PathBuf> = glob(&pattern)
            .with_context(|| format!("Invalid glob pattern: {}", pattern))?
            .flatten()
            .filter(|path| path.is_file())
            .collect();
        files.sort();
        Ok(files)
    }

    /// False when the file was last modified before `since`. Files whose
    /// metadata cannot be read are kept.
    pub fn should_include_file(&self, file_path: &Path, since: Option<&DateTime<Utc>>) -> bool {
        let Some(since) = since else {
            return true;
        };
        match metadata(file_path).and_then(|m| m.modified()) {
            Ok(modified) => DateTime::<Utc>::from(modified) >= *since,
            Err(_) => true,
        }
    }

    /// Stream one file into `processor`, returning (decoded, undecodable) line counts.
    pub fn feed_file<P: JsonlProcessor>(
        &self,
        file_path: &Path,
        processor: &mut P,
    ) -> Result<(usize, usize)> {
        let file = File::open(file_path)
            .with_context(|| format!("Failed to open {}", file_path.display()))?;
        let reader = BufReader::new(file);
        let mut decoded = 0;
        let mut undecodable = 0;

        for (index, line) in reader.split(b'\n').enumerate() {
            let line = line.with_context(|| format!("Failed to read {}", file_path.display()))?;
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            match serde_json::from_slice::<Value>(&line) {
                Ok(record) => {
                    decoded += 1;
                    processor.process_record(record, index + 1)?;
                }
                Err(e) => {
                    undecodable += 1;
                    debug!(file = %file_path.display(), line = index + 1, error = %e, "Skipping undecodable line");
                }
            }
        }

        Ok((decoded, undecodable))
    }

    /// Feed every entry of a Gemini session's `messages` array, returning
    /// (decoded, undecodable) counts like [`Self::feed_file`]. A file that is
    /// not a JSON document is an error; one without messages yields nothing.
    pub fn feed_session_file<P: JsonlProcessor>(
        &self,
        file_path: &Path,
        processor: &mut P,
    ) -> Result<(usize, usize)> {
        let file = File::open(file_path)
            .with_context(|| format!("Failed to open {}", file_path.display()))?;
        let session: Value = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to decode session {}", file_path.display()))?;

        let Some(Value::Array(messages)) = session.get("messages") else {
            debug!(file = %file_path.display(), "Session has no messages");
            return Ok((0, 0));
        };
        for (index, message) in messages.iter().enumerate() {
            processor.process_record(message.clone(), index + 1)?;
        }
        Ok((messages.len(), 0))
    }

    /// Discover, filter and stream every log file into one processor.
    pub fn scan<P: JsonlProcessor>(
        &self,
        since: Option<&DateTime<Utc>>,
        mut processor: P,
    ) -> Result<(P::Output, ScanStats)> {
        let roots = self.discover_claude_paths();
        let files = self.find_jsonl_files(&roots)?;
        let sessions = self.find_gemini_sessions()?;
        let mut stats = ScanStats {
            roots: roots.len() + usize::from(self.gemini_chat_dir().is_some()),
            files_found: files.len() + sessions.len(),
            ..ScanStats::default()
        };

        let logs = files.iter().map(|file| (file, LogFormat::Jsonl));
        let chats = sessions.iter().map(|file| (file, LogFormat::GeminiSession));
        for (file, format) in logs.chain(chats) {
            if !self.should_include_file(file, since) {
                stats.files_skipped_old += 1;
                continue;
            }
            let fed = match format {
                LogFormat::Jsonl => self.feed_file(file, &mut processor),
                LogFormat::GeminiSession => self.feed_session_file(file, &mut processor),
            };
            match fed {
                Ok((decoded, undecodable)) => {
                    stats.files_scanned += 1;
                    stats.lines_decoded += decoded;
                    stats.lines_undecodable += undecodable;
                }
                Err(e) => {
                    stats.files_unreadable += 1;
                    warn!(file = %file.display(), error = %e, "Skipping unreadable log file");
                }
            }
        }

        debug!(?stats, "Scan complete");
        Ok((processor.finalize()?, stats))
    }
}

/// How many records each rejection reason accounted for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct RejectionCounts {
    pub not_an_object: usize,
    pub missing_timestamp: usize,
    pub bad_timestamp: usize,
    pub no_usage: usize,
}

impl RejectionCounts {
    pub fn record(&mut self, rejection: Rejection) {
        match rejection {
            Rejection::NotAnObject => self.not_an_object += 1,
            Rejection::MissingTimestamp => self.missing_timestamp += 1,
            Rejection::BadTimestamp => self.bad_timestamp += 1,
            Rejection::NoUsage => self.no_usage += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.not_an_object + self.missing_timestamp + self.bad_timestamp + self.no_usage
    }
}

#[derive(Debug, Clone, Default)]
pub struct CollectedEvents {
    pub events: Vec<UsageEvent>,
    pub rejected: RejectionCounts,
}

/// Normalizes every record, keeping events and tallying rejections.
#[derive(Debug, Default)]
pub struct EventCollector {
    collected: CollectedEvents,
}

impl EventCollector {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JsonlProcessor for EventCollector {
    type Output = CollectedEvents;

    fn process_record(&mut self, record: Value, _line_number: usize) -> Result<()> {
        match classify(&record) {
            Ok(event) => self.collected.events.push(event),
            Err(rejection) => self.collected.rejected.record(rejection),
        }
        Ok(())
    }

    fn finalize(self) -> Result<Self::Output> {
        Ok(self.collected)
    }
}
