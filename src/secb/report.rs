//! Sanitizer report extraction from raw sandbox logs.
//!
//! Sanitizer output is often cut short by the PoC timeout or a resource
//! limit, so extraction is a chain of strategies ordered from precise to
//! permissive:
//!
//! 1. [`BoundedReport`]: `==PID==ERROR: XSanitizer:` through `==PID==ABORTING`.
//! 2. [`UnterminatedReport`]: start marker through the last stack frame line,
//!    for reports with no closing `ABORTING` line.
//! 3. [`IndicatorWindow`]: a fixed window around the first known indicator.
//!
//! The first strategy that yields a non-empty slice wins.

use std::sync::OnceLock;

use regex::Regex;

/// Start of a sanitizer report, e.g. `==1234==ERROR: AddressSanitizer:`.
pub const REPORT_START_PATTERN: &str = r"==\d+==(?:ERROR|WARNING): (\w+)Sanitizer:";

/// Closing line of a sanitizer report.
pub const REPORT_END_PATTERN: &str = r"==\d+==ABORTING";

/// A symbolized stack frame, e.g. `    #3 0x4f2a1c in main`.
pub const STACK_FRAME_PATTERN: &str = r"\s+#\d+ 0x[0-9a-f]+";

/// Indicators searched by the fallback tier, in priority order.
pub const SANITIZER_INDICATORS: [&str; 11] = [
    "ERROR: AddressSanitizer:",
    "ERROR: MemorySanitizer:",
    "WARNING: MemorySanitizer:",
    "UndefinedBehaviorSanitizer:DEADLYSIGNAL",
    "ERROR: LeakSanitizer:",
    "SUMMARY: UndefinedBehaviorSanitizer: undefined-behavior",
    "AddressSanitizer",
    "LeakSanitizer",
    "UndefinedBehaviorSanitizer",
    "ThreadSanitizer",
    "MemorySanitizer",
];

/// Characters kept on each side of an indicator by the fallback tier.
pub const INDICATOR_WINDOW_CHARS: usize = 1000;

/// One extraction tier.
pub trait ReportStrategy: Send + Sync {
    /// Short name for logging.
    fn name(&self) -> &'static str;

    /// Returns the report slice of `logs`, if this tier recognizes one.
    fn find<'a>(&self, logs: &'a str) -> Option<&'a str>;
}

/// Report delimited by a start marker and an `ABORTING` line.
#[derive(Debug, Clone)]
pub struct BoundedReport {
    start: Regex,
    end: Regex,
}

impl BoundedReport {
    pub fn new(start: Regex, end: Regex) -> Self {
        Self { start, end }
    }
}

impl ReportStrategy for BoundedReport {
    fn name(&self) -> &'static str {
        "bounded"
    }

    fn find<'a>(&self, logs: &'a str) -> Option<&'a str> {
        let start = self.start.find(logs)?.start();
        let end = self.end.find(logs)?.end();
        (end > start).then(|| &logs[start..end])
    }
}

/// Report whose closing line never made it to the logs.
///
/// Only applies when no end marker exists anywhere in the text. The report
/// runs from the start marker to the end of the last stack frame line after
/// it, including that line's newline.
#[derive(Debug, Clone)]
pub struct UnterminatedReport {
    start: Regex,
    end: Regex,
    frame: Regex,
}

impl UnterminatedReport {
    pub fn new(start: Regex, end: Regex, frame: Regex) -> Self {
        Self { start, end, frame }
    }
}

impl ReportStrategy for UnterminatedReport {
    fn name(&self) -> &'static str {
        "unterminated"
    }

    fn find<'a>(&self, logs: &'a str) -> Option<&'a str> {
        if self.end.is_match(logs) {
            return None;
        }
        let start = self.start.find(logs)?.start();
        let tail = &logs[start..];
        let last_frame = self.frame.find_iter(tail).last()?;

        let frame_end = start + last_frame.end();
        let end = match logs[frame_end..].find('\n') {
            Some(offset) => frame_end + offset + 1,
            None => logs.len(),
        };
        Some(&logs[start..end])
    }
}

/// Symmetric window around the first occurrence of the highest-priority
/// indicator present in the logs.
#[derive(Debug, Clone)]
pub struct IndicatorWindow {
    indicators: Vec<&'static str>,
    radius_chars: usize,
}

impl IndicatorWindow {
    pub fn new(indicators: Vec<&'static str>, radius_chars: usize) -> Self {
        Self {
            indicators,
            radius_chars,
        }
    }
}

impl ReportStrategy for IndicatorWindow {
    fn name(&self) -> &'static str {
        "indicator"
    }

    fn find<'a>(&self, logs: &'a str) -> Option<&'a str> {
        let idx = self
            .indicators
            .iter()
            .find_map(|indicator| logs.find(indicator))?;

        let start = if self.radius_chars == 0 {
            idx
        } else {
            logs[..idx]
                .char_indices()
                .rev()
                .nth(self.radius_chars - 1)
                .map(|(i, _)| i)
                .unwrap_or(0)
        };
        let end = logs[idx..]
            .char_indices()
            .nth(self.radius_chars)
            .map(|(i, _)| idx + i)
            .unwrap_or(logs.len());

        Some(&logs[start..end])
    }
}

/// Ordered chain of [`ReportStrategy`] tiers.
pub struct ReportExtractor {
    strategies: Vec<Box<dyn ReportStrategy>>,
}

impl ReportExtractor {
    /// Builds the default three-tier chain.
    pub fn new() -> Self {
        let start = Regex::new(REPORT_START_PATTERN).expect("valid report start pattern");
        let end = Regex::new(REPORT_END_PATTERN).expect("valid report end pattern");
        let frame = Regex::new(STACK_FRAME_PATTERN).expect("valid stack frame pattern");

        Self::with_strategies(vec![
            Box::new(BoundedReport::new(start.clone(), end.clone())),
            Box::new(UnterminatedReport::new(start, end, frame)),
            Box::new(IndicatorWindow::new(
                SANITIZER_INDICATORS.to_vec(),
                INDICATOR_WINDOW_CHARS,
            )),
        ])
    }

    /// Builds an extractor from an explicit strategy list.
    pub fn with_strategies(strategies: Vec<Box<dyn ReportStrategy>>) -> Self {
        Self { strategies }
    }

    /// Runs the strategies in order and returns the first non-empty report.
    pub fn extract<'a>(&self, logs: &'a str) -> Option<&'a str> {
        self.strategies.iter().find_map(|strategy| {
            let report = strategy.find(logs).filter(|r| !r.is_empty())?;
            tracing::trace!(strategy = strategy.name(), len = report.len(), "Sanitizer report found");
            Some(report)
        })
    }
}

impl Default for ReportExtractor {
    fn default() -> Self {
        Self::new()
    }
}

static DEFAULT_EXTRACTOR: OnceLock<ReportExtractor> = OnceLock::new();

/// Extracts a sanitizer report with the default strategy chain.
pub fn extract_sanitizer_report(logs: &str) -> Option<&str> {
    DEFAULT_EXTRACTOR
        .get_or_init(ReportExtractor::new)
        .extract(logs)
}
