#![allow(dead_code)]

use chrono::{DateTime, Duration, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A throwaway `~/.claude` with helpers for writing session logs.
pub struct ClaudeHome {
    dir: TempDir,
}

impl ClaudeHome {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// A path under the temp dir that does not exist.
    pub fn missing(&self) -> PathBuf {
        self.dir.path().join("absent")
    }

    pub fn write_session(&self, project: &str, session: &str, lines: &[String]) -> PathBuf {
        let dir = self.path().join("projects").join(project);
        write_lines(&dir, session, lines)
    }

    pub fn write_vm_session(&self, vm: &str, project: &str, session: &str, lines: &[String]) -> PathBuf {
        let dir = self.path().join("vms").join(vm).join("projects").join(project);
        write_lines(&dir, session, lines)
    }
}

fn write_lines(dir: &Path, session: &str, lines: &[String]) -> PathBuf {
    fs::create_dir_all(dir).unwrap();
    let path = dir.join(format!("{}.jsonl", session));
    fs::write(&path, lines.join("\n")).unwrap();
    path
}

/// A Gemini CLI session file under `<gemini_home>/tmp/<project>/chats`.
pub fn write_gemini_session(gemini_home: &Path, project: &str, session: &str, messages: &[String]) -> PathBuf {
    let dir = gemini_home.join("tmp").join(project).join("chats");
    fs::create_dir_all(&dir).unwrap();
    let path = dir.join(format!("session-{}.json", session));
    let body = format!(
        r#"{{"sessionId":"{}","projectHash":"{}","messages":[{}]}}"#,
        session,
        project,
        messages.join(",")
    );
    fs::write(&path, body).unwrap();
    path
}

/// A Gemini reply message with its `tokens` block.
pub fn gemini_message(ts: DateTime<Utc>, model: &str, input: u64, output: u64, cached: u64, thoughts: u64) -> String {
    format!(
        r#"{{"id":"{}","type":"gemini","timestamp":"{}","model":"{}","tokens":{{"input":{},"output":{},"cached":{},"thoughts":{},"tool":0,"total":{}}}}}"#,
        ts.timestamp_millis(),
        ts.to_rfc3339(),
        model,
        input,
        output,
        cached,
        thoughts,
        input + output + thoughts
    )
}

pub fn hours_ago(hours: i64) -> DateTime<Utc> {
    Utc::now() - Duration::hours(hours)
}

/// An assistant turn as Claude Code writes it.
pub fn assistant_line(
    ts: DateTime<Utc>,
    model: &str,
    input: u64,
    output: u64,
    cache_creation: u64,
    cache_read: u64,
) -> String {
    format!(
        r#"{{"type":"assistant","timestamp":"{}","message":{{"id":"msg_{}","model":"{}","usage":{{"input_tokens":{},"output_tokens":{},"cache_creation_input_tokens":{},"cache_read_input_tokens":{}}}}}}}"#,
        ts.to_rfc3339(),
        ts.timestamp_millis(),
        model,
        input,
        output,
        cache_creation,
        cache_read
    )
}

pub fn user_line(ts: DateTime<Utc>) -> String {
    format!(
        r#"{{"type":"user","timestamp":"{}","message":{{"role":"user","content":"hello"}}}}"#,
        ts.to_rfc3339()
    )
}
