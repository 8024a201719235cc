use std::fmt;

/// Prefix of the terminal line on success. Management agents parse for it.
pub const SUCCESS_MARKER: &str = "!SUCCESS:";

/// Prefix of the terminal line on failure.
pub const FAILURE_MARKER: &str = "!FAILED:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success(String),
    Failed(String),
}

/// Result of one invocation: informational progress lines followed by exactly
/// one outcome. Rendered to the marker-prefixed text block only at the binary
/// boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    progress: Vec<String>,
    outcome: Outcome,
}

impl Report {
    pub fn failed(detail: impl Into<String>) -> Self {
        Self {
            progress: Vec::new(),
            outcome: Outcome::Failed(detail.into()),
        }
    }

    pub fn progress(&self) -> &[String] {
        &self.progress
    }

    pub fn outcome(&self) -> &Outcome {
        &self.outcome
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Success(_))
    }

    /// The marker-prefixed final line. Line breaks inside the detail are
    /// folded so the marker stays on the last line.
    pub fn terminal_line(&self) -> String {
        match &self.outcome {
            Outcome::Success(detail) => format!("{SUCCESS_MARKER} {}", single_line(detail)),
            Outcome::Failed(detail) => format!("{FAILURE_MARKER} {}", single_line(detail)),
        }
    }

    /// All lines joined with `\n`, terminal line last, no trailing newline.
    pub fn render(&self) -> String {
        let mut lines = self.progress.clone();
        lines.push(self.terminal_line());
        lines.join("\n")
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

fn single_line(detail: &str) -> String {
    detail
        .split(['\r', '\n'])
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Progress lines collected while a run is under way.
#[derive(Debug, Default)]
pub struct Progress {
    lines: Vec<String>,
}

impl Progress {
    pub fn push(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    pub fn finish(self, outcome: Outcome) -> Report {
        Report {
            progress: self.lines,
            outcome,
        }
    }
}
