//! Aggregate counters for a decompilation run

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Counters accumulated while decompiling one or more classes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecompileStats {
    pub methods_processed: usize,
    pub methods_succeeded: usize,
    pub methods_failed: usize,
    pub methods_skipped: usize,
    pub instructions_processed: usize,
    pub structures_identified: usize,
    pub expressions_rebuilt: usize,
    pub optimizations_applied: usize,
    /// Wall time of the run, in microseconds
    pub elapsed_micros: u64,
}

impl DecompileStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_elapsed(&mut self, elapsed: Duration) {
        self.elapsed_micros = elapsed.as_micros() as u64;
    }

    pub fn elapsed(&self) -> Duration {
        Duration::from_micros(self.elapsed_micros)
    }

    /// Fold another run's counters into this one
    pub fn merge(&mut self, other: &DecompileStats) {
        self.methods_processed += other.methods_processed;
        self.methods_succeeded += other.methods_succeeded;
        self.methods_failed += other.methods_failed;
        self.methods_skipped += other.methods_skipped;
        self.instructions_processed += other.instructions_processed;
        self.structures_identified += other.structures_identified;
        self.expressions_rebuilt += other.expressions_rebuilt;
        self.optimizations_applied += other.optimizations_applied;
        self.elapsed_micros += other.elapsed_micros;
    }
}

impl fmt::Display for DecompileStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "methods: {} processed, {} succeeded, {} failed, {} skipped",
            self.methods_processed,
            self.methods_succeeded,
            self.methods_failed,
            self.methods_skipped
        )?;
        writeln!(f, "instructions processed: {}", self.instructions_processed)?;
        writeln!(f, "structures identified: {}", self.structures_identified)?;
        writeln!(f, "expressions rebuilt: {}", self.expressions_rebuilt)?;
        writeln!(f, "optimizations applied: {}", self.optimizations_applied)?;
        write!(f, "elapsed: {:.3} ms", self.elapsed_micros as f64 / 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_accumulates() {
        let mut a = DecompileStats {
            methods_processed: 3,
            methods_succeeded: 2,
            methods_failed: 1,
            instructions_processed: 40,
            ..Default::default()
        };
        let b = DecompileStats {
            methods_processed: 1,
            methods_succeeded: 1,
            expressions_rebuilt: 7,
            ..Default::default()
        };
        a.merge(&b);

        assert_eq!(a.methods_processed, 4);
        assert_eq!(a.methods_succeeded, 3);
        assert_eq!(a.methods_failed, 1);
        assert_eq!(a.expressions_rebuilt, 7);
        assert_eq!(a.instructions_processed, 40);
    }

    #[test]
    fn test_display_summary() {
        let stats = DecompileStats {
            methods_processed: 2,
            methods_succeeded: 2,
            ..Default::default()
        };
        let text = stats.to_string();
        assert!(text.contains("2 processed"));
        assert!(text.contains("2 succeeded"));
    }
}
