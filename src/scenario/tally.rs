use tracing::error;
use tracing::info;

use crate::ComparisonResult;
use crate::Result;

/// One labelled pass/fail line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckRecord {
    pub label: String,
    pub passed: bool,
    pub detail: Option<String>,
}

/// Pass/fail counter every scenario step funnels through.
///
/// Each recorded step prints one labelled line; the process exit code is
/// derived from the totals.
#[derive(Debug, Default)]
pub struct Tally {
    records: Vec<CheckRecord>,
    quiet: bool,
}

impl Tally {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tally that records without printing
    pub fn quiet() -> Self {
        Self {
            records: Vec::new(),
            quiet: true,
        }
    }

    pub fn record(
        &mut self,
        label: impl Into<String>,
        passed: bool,
        detail: Option<String>,
    ) {
        let record = CheckRecord {
            label: label.into(),
            passed,
            detail,
        };
        if passed {
            info!("PASS {}", record.label);
        } else {
            error!("FAIL {} {}", record.label, record.detail.as_deref().unwrap_or_default());
        }
        if !self.quiet {
            println!("{}", render(&record));
        }
        self.records.push(record);
    }

    /// Informational line that always passes
    pub fn note(
        &mut self,
        label: impl Into<String>,
    ) {
        self.record(label, true, None);
    }

    /// Record the outcome and carry on either way
    pub fn check<T>(
        &mut self,
        label: impl Into<String>,
        result: Result<T>,
    ) -> Option<T> {
        match result {
            Ok(v) => {
                self.record(label, true, None);
                Some(v)
            }
            Err(e) => {
                self.record(label, false, Some(e.to_string()));
                None
            }
        }
    }

    /// Record the outcome and hand a failure back to the caller, for steps
    /// the rest of the scenario depends on
    pub fn require<T>(
        &mut self,
        label: impl Into<String>,
        result: Result<T>,
    ) -> Result<T> {
        match result {
            Ok(v) => {
                self.record(label, true, None);
                Ok(v)
            }
            Err(e) => {
                self.record(label, false, Some(e.to_string()));
                Err(e)
            }
        }
    }

    /// Record a consistency verdict; `Divergent` counts as a failure
    pub fn verdict(
        &mut self,
        label: impl Into<String>,
        result: Result<ComparisonResult>,
    ) -> bool {
        match result {
            Ok(v) if v.is_consistent() => {
                self.record(label, true, None);
                true
            }
            Ok(v) => {
                self.record(label, false, Some(v.to_string()));
                false
            }
            Err(e) => {
                self.record(label, false, Some(e.to_string()));
                false
            }
        }
    }

    pub fn records(&self) -> &[CheckRecord] {
        &self.records
    }

    pub fn passed(&self) -> usize {
        self.records.iter().filter(|r| r.passed).count()
    }

    pub fn failed(&self) -> usize {
        self.records.len() - self.passed()
    }

    /// Zero iff nothing failed
    pub fn exit_code(&self) -> i32 {
        if self.failed() == 0 {
            0
        } else {
            1
        }
    }

    pub fn summary(&self) -> String {
        format!("{} checks, {} passed, {} failed", self.records.len(), self.passed(), self.failed())
    }
}

fn render(record: &CheckRecord) -> String {
    let mark = if record.passed { "PASS" } else { "FAIL" };
    match &record.detail {
        Some(detail) if !record.passed => format!("{:<64} [ {} ] {}", record.label, mark, detail),
        _ => format!("{:<64} [ {} ]", record.label, mark),
    }
}
