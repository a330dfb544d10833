//! Tag protocol parser for the interpreter output stream.
//!
//! The remote interpreter multiplexes three control markers into its ordinary
//! textual output, each confined to line boundaries:
//!
//! - `<PARError>` ... `</PARError>` delimit an error report raised by the
//!   script (via the error hook installed at preparation time),
//! - `TaskProgress=<n>` lines carry progress updates from 0 to 100,
//! - `<PAREndOfOutput>` is the end-of-stream sentinel written when the
//!   session's output channel is closed.
//!
//! [`TagFilter`] demultiplexes one line at a time into visible text, progress
//! events, an accumulated error report, and the sentinel. It performs no I/O;
//! the tailer thread owns the single instance used during an evaluation and
//! forwards its outputs.

use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

/// Marker opening an error report in the output stream.
pub const ERROR_TAG_BEGIN: &str = "<PARError>";

/// Marker closing an error report in the output stream.
pub const ERROR_TAG_END: &str = "</PARError>";

/// Keyword prefixing a progress line (`TaskProgress=<n>`).
pub const TASK_PROGRESS_MSG: &str = "TaskProgress";

/// Sentinel line content marking the end of the session's output stream.
pub const OUTPUT_END: &str = "<PAREndOfOutput>";

static PROGRESS_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^TaskProgress\s*=\s*(.*?)\s*$").unwrap());

/// Parse failure inside the tag protocol.
///
/// Malformed control lines are reported rather than silently dropped, so a
/// broken remote hook shows up as a fault instead of lost progress updates.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// A progress line whose payload is not an integer.
    #[error("malformed progress line '{0}'")]
    MalformedProgress(String),
}

/// The demultiplexed form of one output line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilteredLine {
    /// Text to forward to the output sink, if any.
    pub visible: Option<String>,
    /// Progress value carried by the line, if it was a progress line.
    pub progress: Option<u32>,
    /// Whether the line carried the end-of-stream sentinel.
    pub end_of_output: bool,
}

/// Stateful line filter for one evaluation.
///
/// Exactly one instance exists per evaluation. Text between the error tags is
/// routed to an accumulator and suppressed from visible output; crossing the
/// end tag finalizes the accumulated report.
#[derive(Debug, Default)]
pub struct TagFilter {
    inside_error: bool,
    error_lines: Vec<String>,
    last_error: Option<String>,
}

impl TagFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// True while positioned between an error-begin and error-end tag.
    pub fn inside_error(&self) -> bool {
        self.inside_error
    }

    /// The last finalized error report, if an end tag was crossed.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Consume the finalized error report.
    pub fn take_error_report(&mut self) -> Option<String> {
        self.last_error.take()
    }

    /// Demultiplex one line (without its trailing newline).
    ///
    /// A line may carry ordinary text, an error tag, a progress update, or
    /// the end-of-stream sentinel; the sentinel may share a line with
    /// trailing content, in which case the text before it is still filtered.
    pub fn filter_line(&mut self, line: &str) -> Result<FilteredLine, ProtocolError> {
        if let Some(idx) = line.find(OUTPUT_END) {
            let mut filtered = if idx > 0 {
                self.demux(&line[..idx])?
            } else {
                FilteredLine::default()
            };
            filtered.end_of_output = true;
            return Ok(filtered);
        }
        self.demux(line)
    }

    fn demux(&mut self, line: &str) -> Result<FilteredLine, ProtocolError> {
        let mut filtered = FilteredLine::default();

        if let Some(idx) = line.find(ERROR_TAG_BEGIN) {
            // Everything after the tag opens the report. The line itself is
            // suppressed: report text never doubles as normal output.
            let remainder = &line[idx + ERROR_TAG_BEGIN.len()..];
            if !remainder.is_empty() {
                self.error_lines.push(remainder.to_string());
            }
            self.inside_error = true;
        } else if let Some(idx) = line.find(ERROR_TAG_END) {
            let prefix = &line[..idx];
            if !prefix.is_empty() {
                self.error_lines.push(prefix.to_string());
            }
            self.last_error = Some(self.error_lines.join("\n"));
            self.error_lines.clear();
            self.inside_error = false;

            let trailing = &line[idx + ERROR_TAG_END.len()..];
            if !trailing.is_empty() {
                filtered.visible = Some(trailing.to_string());
            }
        } else if line.starts_with(TASK_PROGRESS_MSG) {
            let payload = PROGRESS_LINE
                .captures(line)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str())
                .ok_or_else(|| ProtocolError::MalformedProgress(line.to_string()))?;
            let value: u32 = payload
                .parse()
                .map_err(|_| ProtocolError::MalformedProgress(line.to_string()))?;
            filtered.progress = Some(value);
        } else if self.inside_error {
            self.error_lines.push(line.to_string());
        } else {
            filtered.visible = Some(line.to_string());
        }

        Ok(filtered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter_all(filter: &mut TagFilter, lines: &[&str]) -> Vec<FilteredLine> {
        lines
            .iter()
            .map(|l| filter.filter_line(l).unwrap())
            .collect()
    }

    #[test]
    fn plain_line_passes_through_unchanged() {
        let mut filter = TagFilter::new();
        let filtered = filter.filter_line("loading dataset").unwrap();
        assert_eq!(filtered.visible.as_deref(), Some("loading dataset"));
        assert_eq!(filtered.progress, None);
        assert!(!filtered.end_of_output);
        assert!(!filter.inside_error());
        assert!(filter.last_error().is_none());
    }

    #[test]
    fn empty_line_outside_error_is_visible() {
        let mut filter = TagFilter::new();
        let filtered = filter.filter_line("").unwrap();
        assert_eq!(filtered.visible.as_deref(), Some(""));
    }

    #[test]
    fn error_window_accumulates_and_suppresses_output() {
        let mut filter = TagFilter::new();
        let filtered = filter_all(
            &mut filter,
            &["<PARError>msg1", "msg2", "tail</PARError>"],
        );

        for f in &filtered {
            assert_eq!(f.visible, None, "error lines must not be visible");
        }
        assert_eq!(filter.last_error(), Some("msg1\nmsg2\ntail"));
        assert!(!filter.inside_error());
    }

    #[test]
    fn bare_tags_do_not_accumulate_empty_segments() {
        // The error hook emits the tags on their own lines; the report is
        // exactly the text between them.
        let mut filter = TagFilter::new();
        filter_all(&mut filter, &["<PARError>", "boom", "</PARError>"]);
        assert_eq!(filter.last_error(), Some("boom"));
    }

    #[test]
    fn inside_error_is_true_only_between_tags() {
        let mut filter = TagFilter::new();
        assert!(!filter.inside_error());
        filter.filter_line("<PARError>").unwrap();
        assert!(filter.inside_error());
        filter.filter_line("details").unwrap();
        assert!(filter.inside_error());
        filter.filter_line("</PARError>").unwrap();
        assert!(!filter.inside_error());
    }

    #[test]
    fn text_after_end_tag_is_visible() {
        let mut filter = TagFilter::new();
        filter.filter_line("<PARError>oops").unwrap();
        let filtered = filter.filter_line("</PARError>back to normal").unwrap();
        assert_eq!(filtered.visible.as_deref(), Some("back to normal"));
        assert_eq!(filter.last_error(), Some("oops"));
    }

    #[test]
    fn second_report_replaces_the_first() {
        let mut filter = TagFilter::new();
        filter_all(&mut filter, &["<PARError>first", "</PARError>"]);
        filter_all(&mut filter, &["<PARError>second", "</PARError>"]);
        assert_eq!(filter.last_error(), Some("second"));
    }

    #[test]
    fn progress_line_emits_event_and_no_text() {
        let mut filter = TagFilter::new();
        let filtered = filter.filter_line("TaskProgress=42").unwrap();
        assert_eq!(filtered.progress, Some(42));
        assert_eq!(filtered.visible, None);
    }

    #[test]
    fn progress_line_tolerates_spacing() {
        let mut filter = TagFilter::new();
        let filtered = filter.filter_line("TaskProgress = 7 ").unwrap();
        assert_eq!(filtered.progress, Some(7));
    }

    #[test]
    fn malformed_progress_payload_is_an_error() {
        let mut filter = TagFilter::new();
        let err = filter.filter_line("TaskProgress=fast").unwrap_err();
        assert_eq!(
            err,
            ProtocolError::MalformedProgress("TaskProgress=fast".to_string())
        );
    }

    #[test]
    fn progress_keyword_without_payload_is_an_error() {
        let mut filter = TagFilter::new();
        assert!(filter.filter_line("TaskProgress").is_err());
        assert!(filter.filter_line("TaskProgress=").is_err());
    }

    #[test]
    fn sentinel_terminates_the_stream() {
        let mut filter = TagFilter::new();
        let filtered = filter.filter_line("<PAREndOfOutput>").unwrap();
        assert!(filtered.end_of_output);
        assert_eq!(filtered.visible, None);
    }

    #[test]
    fn sentinel_flushes_preceding_text() {
        let mut filter = TagFilter::new();
        let filtered = filter.filter_line("last words<PAREndOfOutput>").unwrap();
        assert!(filtered.end_of_output);
        assert_eq!(filtered.visible.as_deref(), Some("last words"));
    }

    #[test]
    fn filtering_is_idempotent_across_fresh_states() {
        let lines = [
            "start",
            "TaskProgress=10",
            "<PARError>bad input",
            "at line 3",
            "</PARError>",
            "TaskProgress=100",
            "done<PAREndOfOutput>",
        ];

        let run = |lines: &[&str]| {
            let mut filter = TagFilter::new();
            let outputs: Vec<FilteredLine> = lines
                .iter()
                .map(|l| filter.filter_line(l).unwrap())
                .collect();
            (outputs, filter.take_error_report())
        };

        let (first_out, first_report) = run(&lines);
        let (second_out, second_report) = run(&lines);
        assert_eq!(first_out, second_out);
        assert_eq!(first_report, second_report);
        assert_eq!(first_report.as_deref(), Some("bad input\nat line 3"));
    }

    #[test]
    fn take_error_report_consumes_the_report() {
        let mut filter = TagFilter::new();
        filter_all(&mut filter, &["<PARError>gone", "</PARError>"]);
        assert_eq!(filter.take_error_report().as_deref(), Some("gone"));
        assert!(filter.take_error_report().is_none());
    }
}
