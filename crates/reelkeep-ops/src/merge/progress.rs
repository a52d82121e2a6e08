//! Parsing the encoder's `-progress` stream.
//!
//! The encoder writes blocks of `key=value` lines, each block closed by
//! `progress=continue` or, for the last one, `progress=end`. Only the
//! elapsed output time and the end marker matter here; anything that is not
//! a `key=value` line is kept as diagnostic text.

use std::collections::VecDeque;

/// Lines kept for error reports.
pub const DIAGNOSTIC_LINES: usize = 200;

/// Classification of one output line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressLine<'a> {
    /// Elapsed output time in microseconds.
    OutTime(u64),
    /// `progress=end`.
    End,
    /// Some other `key=value` pair.
    Field(&'a str, &'a str),
    /// Free text.
    Diagnostic(&'a str),
}

/// Classify one line.
///
/// `out_time_ms` carries microseconds despite its name, same as
/// `out_time_us`.
pub fn parse_line(line: &str) -> ProgressLine<'_> {
    let line = line.trim();
    let Some((key, value)) = line.split_once('=') else {
        return ProgressLine::Diagnostic(line);
    };
    let (key, value) = (key.trim(), value.trim());
    if key.is_empty() || key.contains(char::is_whitespace) {
        return ProgressLine::Diagnostic(line);
    }

    match key {
        "out_time_ms" | "out_time_us" => match value.parse::<i64>() {
            Ok(us) => ProgressLine::OutTime(us.max(0) as u64),
            Err(_) => ProgressLine::Field(key, value),
        },
        "progress" if value == "end" => ProgressLine::End,
        _ => ProgressLine::Field(key, value),
    }
}

/// Maps elapsed output time to a percentage that never goes backwards and
/// stays below 100 until the job is finished.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    total_secs: f64,
    pct: u8,
}

impl ProgressTracker {
    /// `total_secs` below or equal to zero is treated as one second.
    pub fn new(total_secs: f64) -> Self {
        let total_secs = if total_secs.is_finite() && total_secs > 0.0 {
            total_secs
        } else {
            1.0
        };
        Self { total_secs, pct: 0 }
    }

    pub fn pct(&self) -> u8 {
        self.pct
    }

    /// Feed an elapsed time. Returns the new percentage if it went up.
    pub fn observe(&mut self, out_time_us: u64) -> Option<u8> {
        let elapsed = out_time_us as f64 / 1_000_000.0;
        let pct = (elapsed / self.total_secs * 100.0).clamp(0.0, 99.0) as u8;
        if pct > self.pct {
            self.pct = pct;
            Some(pct)
        } else {
            None
        }
    }
}

/// The newest diagnostic lines of a process.
#[derive(Debug, Clone)]
pub struct DiagnosticTail {
    capacity: usize,
    lines: VecDeque<String>,
}

impl DiagnosticTail {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            lines: VecDeque::new(),
        }
    }

    pub fn push(&mut self, line: &str) {
        let line = line.trim_end();
        if line.is_empty() {
            return;
        }
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line.to_string());
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// All kept lines joined with newlines.
    pub fn render(&self) -> String {
        self.lines.iter().map(String::as_str).collect::<Vec<_>>().join("\n")
    }
}

impl Default for DiagnosticTail {
    fn default() -> Self {
        Self::new(DIAGNOSTIC_LINES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_line() {
        assert_eq!(parse_line("out_time_ms=500000"), ProgressLine::OutTime(500_000));
        assert_eq!(parse_line("out_time_us=42\n"), ProgressLine::OutTime(42));
        assert_eq!(parse_line("out_time_ms=-7"), ProgressLine::OutTime(0));
        assert_eq!(parse_line("progress=end"), ProgressLine::End);
        assert_eq!(parse_line("progress=continue"), ProgressLine::Field("progress", "continue"));
        assert_eq!(parse_line("out_time_ms=N/A"), ProgressLine::Field("out_time_ms", "N/A"));
        assert_eq!(
            parse_line("[concat @ 0x1] Impossible to open 'a b.mp4'"),
            ProgressLine::Diagnostic("[concat @ 0x1] Impossible to open 'a b.mp4'")
        );
        assert_eq!(
            parse_line("Error opening input: x=y"),
            ProgressLine::Diagnostic("Error opening input: x=y")
        );
    }

    #[test]
    fn test_tracker_clamps_and_never_regresses() {
        let mut tracker = ProgressTracker::new(1.0);
        assert_eq!(tracker.observe(500_000), Some(50));
        assert_eq!(tracker.observe(400_000), None);
        assert_eq!(tracker.pct(), 50);
        assert_eq!(tracker.observe(5_000_000), Some(99));
        assert_eq!(tracker.observe(9_000_000), None);
        assert_eq!(tracker.pct(), 99);
    }

    #[test]
    fn test_tracker_zero_total() {
        let mut tracker = ProgressTracker::new(0.0);
        assert_eq!(tracker.observe(250_000), Some(25));
    }

    #[test]
    fn test_tail_is_bounded() {
        let mut tail = DiagnosticTail::new(DIAGNOSTIC_LINES);
        for i in 0..250 {
            tail.push(&format!("line {i}"));
        }
        tail.push("   ");
        assert_eq!(tail.len(), DIAGNOSTIC_LINES);
        let text = tail.render();
        assert!(text.starts_with("line 50\n"));
        assert!(text.ends_with("line 249"));
    }
}
