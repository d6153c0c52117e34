//! Append-only output capture for background processes.
//!
//! Each process job owns one [`OutputBuffer`]: the runner's reader tasks are
//! the single writer, appending interleaved stdout/stderr lines as they are
//! produced; readers consume through a monotonic cursor so every captured
//! line is delivered at most once. Lines are never truncated retroactively.

use std::sync::Mutex;

use regex::Regex;

/// Line filter applied to consumed output.
///
/// Filtering affects what is *returned*, not what is *consumed*: the cursor
/// always advances past the full scanned span.
#[derive(Clone, Debug)]
pub enum OutputFilter {
    /// Keep lines containing the given substring.
    Substring(String),
    /// Keep lines matching the given regex.
    LinePattern(Regex),
}

impl OutputFilter {
    pub fn substring(needle: impl Into<String>) -> Self {
        OutputFilter::Substring(needle.into())
    }

    pub fn line_pattern(pattern: &str) -> Result<Self, regex::Error> {
        Ok(OutputFilter::LinePattern(Regex::new(pattern)?))
    }

    fn matches(&self, line: &str) -> bool {
        match self {
            OutputFilter::Substring(needle) => line.contains(needle.as_str()),
            OutputFilter::LinePattern(re) => re.is_match(line),
        }
    }
}

struct OutputInner {
    lines: Vec<String>,
    /// Index of the first line not yet delivered by [`OutputBuffer::consume`].
    cursor: usize,
}

/// Append-only line buffer with a single consume cursor.
///
/// Writer side: `append` only. Reader side: `consume` (advances the cursor
/// atomically with the read) and `tail` (non-consuming, for summaries).
pub struct OutputBuffer {
    inner: Mutex<OutputInner>,
}

impl OutputBuffer {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(OutputInner {
                lines: Vec::new(),
                cursor: 0,
            }),
        }
    }

    /// Append one captured line.
    pub fn append(&self, line: String) {
        let mut inner = self.inner.lock().unwrap();
        inner.lines.push(line);
    }

    /// Return all lines past the cursor that pass `filter`, advancing the
    /// cursor past the full scanned span regardless of the filter.
    ///
    /// A second call with no intervening appends returns an empty vec.
    pub fn consume(&self, filter: Option<&OutputFilter>) -> Vec<String> {
        let mut inner = self.inner.lock().unwrap();
        let start = inner.cursor;
        inner.cursor = inner.lines.len();
        inner.lines[start..]
            .iter()
            .filter(|line| filter.is_none_or(|f| f.matches(line)))
            .cloned()
            .collect()
    }

    /// Return the last `n` lines without touching the cursor.
    pub fn tail(&self, n: usize) -> Vec<String> {
        let inner = self.inner.lock().unwrap();
        let start = inner.lines.len().saturating_sub(n);
        inner.lines[start..].to_vec()
    }
}
