//! Builtin capabilities: journaling, file access, URL fetching, clock.
//!
//! File-system capabilities resolve relative paths against a base
//! directory supplied at construction, so the agent's files stay inside
//! its data directory unless a caller passes an absolute path.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Days, Local};
use serde_json::{Value, json};
use tokio::io::AsyncWriteExt;

use crate::capability::parser::ArgMap;
use crate::capability::registry::{Capability, CapabilityRegistry};
use crate::error::{AnimaError, Result};

const DEFAULT_READ_LENGTH: usize = 10_000;
const FETCH_TIMEOUT_SECS: u64 = 10;

/// Register the full builtin set against a data directory.
///
/// Journals land under `<data_dir>/journals`; file capabilities treat
/// `data_dir` itself as their working root.
pub fn register_builtins(registry: &CapabilityRegistry, data_dir: &Path) -> Result<()> {
    let journal_dir = data_dir.join("journals");

    registry.register(Arc::new(WriteJournal::new(&journal_dir)));
    registry.register(Arc::new(ReadJournal::new(&journal_dir)));
    registry.register(Arc::new(ReadFile::new(data_dir)));
    registry.register(Arc::new(WriteFile::new(data_dir)));
    registry.register(Arc::new(ListFiles::new(data_dir)));
    registry.register(Arc::new(FetchUrl::new()?));
    registry.register(Arc::new(GetTime));

    Ok(())
}

fn require_str<'a>(args: &'a ArgMap, capability: &str, key: &str) -> Result<&'a str> {
    args.get(key).and_then(|v| v.as_str()).ok_or_else(|| {
        AnimaError::Capability(format!("{capability} requires a string '{key}' parameter"))
    })
}

fn opt_str<'a>(args: &'a ArgMap, key: &str) -> Option<&'a str> {
    args.get(key).and_then(|v| v.as_str())
}

fn opt_usize(args: &ArgMap, key: &str, default: usize) -> usize {
    args.get(key)
        .and_then(|v| v.as_i64())
        .filter(|n| *n >= 0)
        .map(|n| n as usize)
        .unwrap_or(default)
}

fn resolve(base: &Path, raw: &str) -> PathBuf {
    let path = Path::new(raw);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Match a file name against a glob pattern where `*` spans any run of
/// characters. Without a `*` the pattern must match exactly.
fn matches_pattern(name: &str, pattern: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    let segments: Vec<&str> = pattern.split('*').collect();
    if segments.len() == 1 {
        return name == pattern;
    }

    let mut remaining = name;
    let last = segments.len() - 1;
    for (i, segment) in segments.iter().enumerate() {
        if segment.is_empty() {
            continue;
        }
        if i == 0 {
            match remaining.strip_prefix(segment) {
                Some(rest) => remaining = rest,
                None => return false,
            }
        } else if i == last {
            return remaining.ends_with(segment);
        } else {
            match remaining.find(segment) {
                Some(pos) => remaining = &remaining[pos + segment.len()..],
                None => return false,
            }
        }
    }
    true
}

/// Append an entry to today's journal file.
pub struct WriteJournal {
    journal_dir: PathBuf,
}

impl WriteJournal {
    pub fn new(journal_dir: impl Into<PathBuf>) -> Self {
        Self {
            journal_dir: journal_dir.into(),
        }
    }
}

#[async_trait]
impl Capability for WriteJournal {
    fn name(&self) -> &'static str {
        "write_journal"
    }

    fn description(&self) -> &'static str {
        "Write a journal entry to today's journal file"
    }

    fn category(&self) -> &'static str {
        "journal"
    }

    fn parameters(&self) -> Value {
        json!({
            "content": {
                "type": "string",
                "description": "The journal entry content",
                "required": true
            },
            "title": {
                "type": "string",
                "description": "Optional entry title",
                "required": false
            }
        })
    }

    fn returns(&self) -> &'static str {
        "dict with status, file, length, and timestamp"
    }

    async fn invoke(&self, args: &ArgMap) -> Result<Value> {
        let content = require_str(args, self.name(), "content")?;
        let title = opt_str(args, "title");

        tokio::fs::create_dir_all(&self.journal_dir).await?;
        let file_path = self
            .journal_dir
            .join(format!("{}.md", Local::now().format("%Y-%m-%d")));

        let time = Local::now().format("%H:%M:%S").to_string();
        let heading = match title {
            Some(title) => format!("## {title} ({time})"),
            None => format!("## {time}"),
        };
        let entry = format!("\n{heading}\n\n{content}\n\n---\n");

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&file_path)
            .await?;
        file.write_all(entry.as_bytes()).await?;

        Ok(json!({
            "status": "saved",
            "file": file_path.display().to_string(),
            "length": content.split_whitespace().count(),
            "timestamp": time,
        }))
    }
}

/// Read journal entries for a date or a recent span of days.
pub struct ReadJournal {
    journal_dir: PathBuf,
}

impl ReadJournal {
    pub fn new(journal_dir: impl Into<PathBuf>) -> Self {
        Self {
            journal_dir: journal_dir.into(),
        }
    }
}

#[async_trait]
impl Capability for ReadJournal {
    fn name(&self) -> &'static str {
        "read_journal"
    }

    fn description(&self) -> &'static str {
        "Read journal entries for a specific date or the last few days"
    }

    fn category(&self) -> &'static str {
        "journal"
    }

    fn parameters(&self) -> Value {
        json!({
            "date": {
                "type": "string",
                "description": "Date to read (YYYY-MM-DD)",
                "required": false
            },
            "days_back": {
                "type": "integer",
                "description": "How many days back from today to read",
                "default": 1
            }
        })
    }

    fn returns(&self) -> &'static str {
        "dict with entries, dates, and count"
    }

    async fn invoke(&self, args: &ArgMap) -> Result<Value> {
        let mut stems: Vec<String> = Vec::new();
        if let Some(date) = opt_str(args, "date") {
            stems.push(date.to_string());
        } else {
            let days_back = opt_usize(args, "days_back", 1).max(1);
            let today = Local::now().date_naive();
            for i in 0..days_back as u64 {
                if let Some(day) = today.checked_sub_days(Days::new(i)) {
                    stems.push(day.format("%Y-%m-%d").to_string());
                }
            }
        }

        let mut entries = Vec::new();
        let mut dates = Vec::new();
        for stem in stems {
            let path = self.journal_dir.join(format!("{stem}.md"));
            if let Ok(text) = tokio::fs::read_to_string(&path).await {
                entries.push(text);
                dates.push(stem);
            }
        }

        Ok(json!({
            "count": entries.len(),
            "entries": entries,
            "dates": dates,
        }))
    }
}

/// Read a text file, truncated to a character budget.
pub struct ReadFile {
    base_dir: PathBuf,
}

impl ReadFile {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }
}

#[async_trait]
impl Capability for ReadFile {
    fn name(&self) -> &'static str {
        "read_file"
    }

    fn description(&self) -> &'static str {
        "Read the contents of a text file"
    }

    fn category(&self) -> &'static str {
        "files"
    }

    fn parameters(&self) -> Value {
        json!({
            "filepath": {
                "type": "string",
                "description": "Path to the file",
                "required": true
            },
            "max_length": {
                "type": "integer",
                "description": "Maximum characters to return",
                "default": DEFAULT_READ_LENGTH
            }
        })
    }

    fn returns(&self) -> &'static str {
        "dict with content, length, truncated, and file"
    }

    async fn invoke(&self, args: &ArgMap) -> Result<Value> {
        let filepath = require_str(args, self.name(), "filepath")?;
        let max_length = opt_usize(args, "max_length", DEFAULT_READ_LENGTH);
        let path = resolve(&self.base_dir, filepath);

        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|_| AnimaError::Capability(format!("File not found: {filepath}")))?;

        let length = content.chars().count();
        let truncated = length > max_length;
        let content: String = content.chars().take(max_length).collect();

        Ok(json!({
            "content": content,
            "length": length,
            "truncated": truncated,
            "file": path.display().to_string(),
        }))
    }
}

/// Write a text file, creating parent directories as needed.
pub struct WriteFile {
    base_dir: PathBuf,
}

impl WriteFile {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }
}

#[async_trait]
impl Capability for WriteFile {
    fn name(&self) -> &'static str {
        "write_file"
    }

    fn description(&self) -> &'static str {
        "Write content to a text file"
    }

    fn category(&self) -> &'static str {
        "files"
    }

    fn parameters(&self) -> Value {
        json!({
            "filepath": {
                "type": "string",
                "description": "Path to the file",
                "required": true
            },
            "content": {
                "type": "string",
                "description": "Content to write",
                "required": true
            }
        })
    }

    fn returns(&self) -> &'static str {
        "dict with status, bytes, and file"
    }

    async fn invoke(&self, args: &ArgMap) -> Result<Value> {
        let filepath = require_str(args, self.name(), "filepath")?;
        let content = require_str(args, self.name(), "content")?;
        let path = resolve(&self.base_dir, filepath);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, content).await?;

        Ok(json!({
            "status": "written",
            "bytes": content.len(),
            "file": path.display().to_string(),
        }))
    }
}

/// List files in a directory with a simple glob pattern.
pub struct ListFiles {
    base_dir: PathBuf,
}

impl ListFiles {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }
}

#[async_trait]
impl Capability for ListFiles {
    fn name(&self) -> &'static str {
        "list_files"
    }

    fn description(&self) -> &'static str {
        "List files in a directory"
    }

    fn category(&self) -> &'static str {
        "files"
    }

    fn parameters(&self) -> Value {
        json!({
            "directory": {
                "type": "string",
                "description": "Directory to list",
                "required": true
            },
            "pattern": {
                "type": "string",
                "description": "Glob pattern to match file names against",
                "default": "*"
            }
        })
    }

    fn returns(&self) -> &'static str {
        "dict with files, count, and directory"
    }

    async fn invoke(&self, args: &ArgMap) -> Result<Value> {
        let directory = require_str(args, self.name(), "directory")?;
        let pattern = opt_str(args, "pattern").unwrap_or("*").to_string();
        let dir = resolve(&self.base_dir, directory);

        let mut reader = tokio::fs::read_dir(&dir)
            .await
            .map_err(|_| AnimaError::Capability(format!("Directory not found: {directory}")))?;

        let mut files = Vec::new();
        while let Ok(Some(entry)) = reader.next_entry().await {
            let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
            if !is_file {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if matches_pattern(&name, &pattern) {
                files.push(name);
            }
        }
        files.sort();

        Ok(json!({
            "files": files,
            "count": files.len(),
            "directory": dir.display().to_string(),
        }))
    }
}

/// Fetch the body of a URL.
pub struct FetchUrl {
    client: reqwest::Client,
}

impl FetchUrl {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
            .build()
            .map_err(|e| AnimaError::Capability(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Capability for FetchUrl {
    fn name(&self) -> &'static str {
        "fetch_url"
    }

    fn description(&self) -> &'static str {
        "Fetch the text content of a URL"
    }

    fn category(&self) -> &'static str {
        "web"
    }

    fn parameters(&self) -> Value {
        json!({
            "url": {
                "type": "string",
                "description": "URL to fetch",
                "required": true
            },
            "max_length": {
                "type": "integer",
                "description": "Maximum characters to return",
                "default": DEFAULT_READ_LENGTH
            }
        })
    }

    fn returns(&self) -> &'static str {
        "dict with content, status_code, truncated, and url"
    }

    async fn invoke(&self, args: &ArgMap) -> Result<Value> {
        let url = require_str(args, self.name(), "url")?;
        let max_length = opt_usize(args, "max_length", DEFAULT_READ_LENGTH);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AnimaError::Capability(format!("Failed to fetch {url}: {e}")))?;

        let status_code = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| AnimaError::Capability(format!("Failed to read body of {url}: {e}")))?;

        let truncated = body.chars().count() > max_length;
        let content: String = body.chars().take(max_length).collect();

        Ok(json!({
            "content": content,
            "status_code": status_code,
            "truncated": truncated,
            "url": url,
        }))
    }
}

/// Report the current local time.
pub struct GetTime;

#[async_trait]
impl Capability for GetTime {
    fn name(&self) -> &'static str {
        "get_time"
    }

    fn description(&self) -> &'static str {
        "Get the current date and time"
    }

    fn category(&self) -> &'static str {
        "system"
    }

    fn returns(&self) -> &'static str {
        "dict with datetime, date, time, day, and timestamp"
    }

    async fn invoke(&self, _args: &ArgMap) -> Result<Value> {
        let now = Local::now();
        Ok(json!({
            "datetime": now.to_rfc3339(),
            "date": now.format("%Y-%m-%d").to_string(),
            "time": now.format("%H:%M:%S").to_string(),
            "day": now.format("%A").to_string(),
            "timestamp": now.timestamp_millis() as f64 / 1000.0,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::parser::ArgValue;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn str_arg(key: &str, value: &str) -> (String, ArgValue) {
        (key.to_string(), ArgValue::Str(value.to_string()))
    }

    #[tokio::test]
    async fn test_write_journal_appends_entry() {
        let dir = tempfile::tempdir().unwrap();
        let journal = WriteJournal::new(dir.path());

        let args: ArgMap = [
            str_arg("content", "Tried a new recall strategy today."),
            str_arg("title", "Experiments"),
        ]
        .into();

        let result = journal.invoke(&args).await.unwrap();
        assert_eq!(result["status"], "saved");
        assert_eq!(result["length"], 6);

        let file = PathBuf::from(result["file"].as_str().unwrap());
        let text = std::fs::read_to_string(&file).unwrap();
        assert!(text.contains("## Experiments ("));
        assert!(text.contains("Tried a new recall strategy today."));
        assert!(text.contains("---"));
    }

    #[tokio::test]
    async fn test_write_then_read_journal_today() {
        let dir = tempfile::tempdir().unwrap();
        let writer = WriteJournal::new(dir.path());
        let reader = ReadJournal::new(dir.path());

        let args: ArgMap = [str_arg("content", "first entry")].into();
        writer.invoke(&args).await.unwrap();

        let result = reader.invoke(&ArgMap::new()).await.unwrap();
        assert_eq!(result["count"], 1);
        assert!(
            result["entries"][0]
                .as_str()
                .unwrap()
                .contains("first entry")
        );
    }

    #[tokio::test]
    async fn test_read_journal_missing_days_yield_empty() {
        let dir = tempfile::tempdir().unwrap();
        let reader = ReadJournal::new(dir.path());

        let mut args = ArgMap::new();
        args.insert("days_back".to_string(), ArgValue::Int(3));

        let result = reader.invoke(&args).await.unwrap();
        assert_eq!(result["count"], 0);
        assert_eq!(result["entries"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_journal_requires_content() {
        let dir = tempfile::tempdir().unwrap();
        let journal = WriteJournal::new(dir.path());
        let err = journal.invoke(&ArgMap::new()).await.unwrap_err();
        assert!(err.to_string().contains("content"));
    }

    #[tokio::test]
    async fn test_write_read_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let writer = WriteFile::new(dir.path());
        let reader = ReadFile::new(dir.path());

        let args: ArgMap = [
            str_arg("filepath", "notes/plan.txt"),
            str_arg("content", "step one"),
        ]
        .into();
        let written = writer.invoke(&args).await.unwrap();
        assert_eq!(written["status"], "written");
        assert_eq!(written["bytes"], 8);

        let args: ArgMap = [str_arg("filepath", "notes/plan.txt")].into();
        let read = reader.invoke(&args).await.unwrap();
        assert_eq!(read["content"], "step one");
        assert_eq!(read["length"], 8);
        assert_eq!(read["truncated"], false);
    }

    #[tokio::test]
    async fn test_read_file_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let writer = WriteFile::new(dir.path());
        let reader = ReadFile::new(dir.path());

        let args: ArgMap = [str_arg("filepath", "big.txt"), str_arg("content", "abcdef")].into();
        writer.invoke(&args).await.unwrap();

        let mut args = ArgMap::new();
        args.insert("filepath".to_string(), ArgValue::Str("big.txt".to_string()));
        args.insert("max_length".to_string(), ArgValue::Int(4));

        let read = reader.invoke(&args).await.unwrap();
        assert_eq!(read["content"], "abcd");
        assert_eq!(read["length"], 6);
        assert_eq!(read["truncated"], true);
    }

    #[tokio::test]
    async fn test_read_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let reader = ReadFile::new(dir.path());
        let args: ArgMap = [str_arg("filepath", "absent.txt")].into();
        let err = reader.invoke(&args).await.unwrap_err();
        assert!(err.to_string().contains("File not found: absent.txt"));
    }

    #[tokio::test]
    async fn test_list_files_with_pattern() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.md"), "x").unwrap();
        std::fs::write(dir.path().join("b.md"), "x").unwrap();
        std::fs::write(dir.path().join("c.txt"), "x").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        let lister = ListFiles::new(dir.path());
        let mut args = ArgMap::new();
        args.insert("directory".to_string(), ArgValue::Str(".".to_string()));
        args.insert("pattern".to_string(), ArgValue::Str("*.md".to_string()));

        let result = lister.invoke(&args).await.unwrap();
        assert_eq!(result["count"], 2);
        assert_eq!(result["files"], json!(["a.md", "b.md"]));
    }

    #[tokio::test]
    async fn test_list_files_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let lister = ListFiles::new(dir.path());
        let args: ArgMap = [str_arg("directory", "nowhere")].into();
        let err = lister.invoke(&args).await.unwrap_err();
        assert!(err.to_string().contains("Directory not found"));
    }

    #[tokio::test]
    async fn test_fetch_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(ResponseTemplate::new(200).set_body_string("hello world"))
            .mount(&server)
            .await;

        let fetcher = FetchUrl::new().unwrap();
        let args: ArgMap = [str_arg("url", &format!("{}/page", server.uri()))].into();

        let result = fetcher.invoke(&args).await.unwrap();
        assert_eq!(result["content"], "hello world");
        assert_eq!(result["status_code"], 200);
        assert_eq!(result["truncated"], false);
    }

    #[tokio::test]
    async fn test_get_time_shape() {
        let result = GetTime.invoke(&ArgMap::new()).await.unwrap();
        assert!(result["datetime"].is_string());
        assert!(result["date"].is_string());
        assert!(result["time"].is_string());
        assert!(result["day"].is_string());
        assert!(result["timestamp"].is_number());
    }

    #[tokio::test]
    async fn test_register_builtins() {
        let dir = tempfile::tempdir().unwrap();
        let registry = CapabilityRegistry::new();
        register_builtins(&registry, dir.path()).unwrap();
        assert_eq!(registry.len(), 7);

        let manifest = registry.manifest();
        assert!(manifest.contains("## JOURNAL TOOLS"));
        assert!(manifest.contains("## FILES TOOLS"));
        assert!(manifest.contains("## WEB TOOLS"));
        assert!(manifest.contains("## SYSTEM TOOLS"));
    }

    #[test]
    fn test_pattern_matching() {
        assert!(matches_pattern("notes.md", "*"));
        assert!(matches_pattern("notes.md", "*.md"));
        assert!(!matches_pattern("notes.txt", "*.md"));
        assert!(matches_pattern("day-01.md", "day-*.md"));
        assert!(matches_pattern("exact.md", "exact.md"));
        assert!(!matches_pattern("other.md", "exact.md"));
    }
}
