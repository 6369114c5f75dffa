use tracing::{error, info};

use super::DataError;

/// What happened to one item of a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Saved,
    Skipped,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchSummary {
    pub successful: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<String>,
}

impl BatchSummary {
    pub fn total(&self) -> usize {
        self.successful.len() + self.skipped.len() + self.failed.len()
    }

    pub fn merge(&mut self, other: BatchSummary) {
        self.successful.extend(other.successful);
        self.skipped.extend(other.skipped);
        self.failed.extend(other.failed);
    }

    /// Files one request's result under `label`; errors are logged, never propagated
    pub fn record(&mut self, label: String, result: Result<Outcome, DataError>) {
        match result {
            Ok(Outcome::Saved) => self.successful.push(label),
            Ok(Outcome::Skipped) => {
                info!("{label} already exists, skipping");
                self.skipped.push(label);
            }
            Err(e) => {
                error!("Failed to process {label}: {e}");
                self.failed.push(label);
            }
        }
    }

    pub fn report(&self) -> String {
        let rule = "=".repeat(50);
        let mut out = format!(
            "\n{rule}\nDOWNLOAD SUMMARY:\nTotal requests: {}\nSuccessful downloads: {}\nSkipped (already exist): {}\nFailed downloads: {}\n{rule}",
            self.total(),
            self.successful.len(),
            self.skipped.len(),
            self.failed.len(),
        );
        if !self.successful.is_empty() {
            let shown: Vec<&str> = self.successful.iter().take(10).map(String::as_str).collect();
            let more = if self.successful.len() > 10 { "..." } else { "" };
            out.push_str(&format!("\nSuccessful: {shown:?}{more}"));
        }
        if !self.failed.is_empty() {
            out.push_str(&format!("\nFailed: {:?}", self.failed));
        }
        out
    }
}

/// Numbered `[i/total]` progress over a batch of known size
pub struct Progress {
    current: usize,
    total: usize,
}

impl Progress {
    pub fn new(title: &str, total: usize) -> Self {
        info!("=== Starting {title} batch download ({total} requests) ===");
        Self { current: 0, total }
    }

    pub fn step(&mut self, what: &str) {
        self.current += 1;
        info!("[{}/{}] {what}", self.current, self.total);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_sorts_results_into_buckets() {
        let mut summary = BatchSummary::default();
        summary.record("AAPL".into(), Ok(Outcome::Saved));
        summary.record("MSFT".into(), Ok(Outcome::Skipped));
        summary.record("XYZ".into(), Err(DataError::Api("NOT_FOUND".into())));

        assert_eq!(summary.successful, vec!["AAPL"]);
        assert_eq!(summary.skipped, vec!["MSFT"]);
        assert_eq!(summary.failed, vec!["XYZ"]);
        assert_eq!(summary.total(), 3);
    }

    #[test]
    fn report_truncates_long_success_list() {
        let mut summary = BatchSummary::default();
        for i in 0..12 {
            summary.record(format!("T{i}"), Ok(Outcome::Saved));
        }
        summary.record("BAD".into(), Err(DataError::Api("boom".into())));

        let report = summary.report();
        assert!(report.contains("Total requests: 13"));
        assert!(report.contains("Successful downloads: 12"));
        assert!(report.contains("\"T9\"]..."));
        assert!(!report.contains("T10"));
        assert!(report.contains("Failed: [\"BAD\"]"));
    }

    #[test]
    fn merge_concatenates() {
        let mut a = BatchSummary {
            successful: vec!["A".into()],
            ..Default::default()
        };
        let b = BatchSummary {
            failed: vec!["B".into()],
            skipped: vec!["C".into()],
            ..Default::default()
        };
        a.merge(b);
        assert_eq!(a.total(), 3);
        assert_eq!(a.failed, vec!["B"]);
    }
}
