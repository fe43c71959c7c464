//! Where demonstrations report their results.

use std::sync::{Arc, Mutex};

use crate::scheduler::lock;

/// A text output surface: a terminal, a log, a page, a test buffer.
pub trait OutputSink: Send + Sync {
    /// Replaces whatever is displayed with `text`.
    fn render(&self, text: &str);

    /// Replaces the output with one line per entry.
    fn render_lines(&self, lines: &[String]) {
        self.render(&lines.join("\n"));
    }

    /// Adds `text` as a new line after the current output.
    fn append(&self, text: &str);
}

/// Keeps the output in memory. Clones share the same buffer.
#[derive(Clone, Debug, Default)]
pub struct MemorySink {
    contents: Arc<Mutex<String>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The current output.
    pub fn contents(&self) -> String {
        lock(&self.contents).clone()
    }
}

impl OutputSink for MemorySink {
    fn render(&self, text: &str) {
        let mut contents = lock(&self.contents);
        contents.clear();
        contents.push_str(text);
    }

    fn append(&self, text: &str) {
        let mut contents = lock(&self.contents);
        if !contents.is_empty() {
            contents.push('\n');
        }
        contents.push_str(text);
    }
}

/// Prints to standard output. A terminal cannot take lines back, so
/// `render` starts a new block instead of replacing the previous one.
#[derive(Clone, Copy, Debug, Default)]
pub struct StdoutSink;

impl OutputSink for StdoutSink {
    fn render(&self, text: &str) {
        println!("{text}");
    }

    fn append(&self, text: &str) {
        println!("{text}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_sink_replaces_and_appends() {
        let sink = MemorySink::new();
        sink.append("first");
        sink.append("second");
        assert_eq!(sink.contents(), "first\nsecond");

        sink.render("");
        sink.append("fresh");
        assert_eq!(
            sink.contents(),
            "fresh",
            "Render should clear earlier output"
        );

        sink.render_lines(&["a".to_string(), "b".to_string()]);
        assert_eq!(sink.contents(), "a\nb");
    }
}
