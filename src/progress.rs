//! Progress reporting for normalization, graph building and index builds.
//!
//! Progress is emitted on **stderr** so stdout stays parseable for scripts
//! (the pipeline prints its summary there).

use std::io::Write;

/// Stage of the pipeline a progress event belongs to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Stage {
    /// Raw feed files being filtered into normalized files.
    Normalizing,
    /// Normalized records being turned into graph nodes and edges.
    Building,
    /// Corpus lines being embedded into the vector index.
    Indexing,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Normalizing => "normalizing",
            Stage::Building => "building",
            Stage::Indexing => "indexing",
        }
    }

    fn unit(&self) -> &'static str {
        match self {
            Stage::Normalizing => "files",
            Stage::Building => "documents",
            Stage::Indexing => "lines",
        }
    }
}

/// A single progress event: `n` of `total` units done in `stage`.
#[derive(Clone, Debug, PartialEq)]
pub struct ProgressEvent {
    pub stage: Stage,
    pub n: u64,
    pub total: u64,
}

/// Reports progress. Implementations write to stderr (human or JSON).
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// Human-friendly progress on stderr: "normalizing  3 / 12 files".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: ProgressEvent) {
        let line = format!(
            "{}  {} / {} {}\n",
            event.stage.as_str(),
            format_number(event.n),
            format_number(event.total),
            event.stage.unit()
        );
        let mut err = std::io::stderr().lock();
        let _ = err.write_all(line.as_bytes());
        let _ = err.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: ProgressEvent) {
        let obj = serde_json::json!({
            "event": "progress",
            "stage": event.stage.as_str(),
            "n": event.n,
            "total": event.total,
        });
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut err = std::io::stderr().lock();
            let _ = writeln!(err, "{}", line);
            let _ = err.flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: ProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    /// Parse the `--progress` flag value; `auto` defers to the TTY check.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "auto" => Some(Self::default_for_tty()),
            "human" => Some(ProgressMode::Human),
            "json" => Some(ProgressMode::Json),
            "off" => Some(ProgressMode::Off),
            _ => None,
        }
    }

    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
