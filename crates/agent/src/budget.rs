//! Budget and termination guards, evaluated before every iteration.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// The completion predicate fired
    Complete,
    /// Wall-clock time since the run started exceeded the timeout
    TimedOut,
    /// Cumulative token usage reached the budget
    TokenExhausted,
    /// The iteration ceiling was reached
    MaxIterations,
}

impl TerminationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Complete => "complete",
            Self::TimedOut => "timed_out",
            Self::TokenExhausted => "token_exhausted",
            Self::MaxIterations => "max_iterations",
        }
    }
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Run counters the guards look at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BudgetUsage {
    pub complete: bool,
    pub elapsed: Duration,
    pub tokens: u64,
    pub iterations: u32,
}

/// Checks run counters against fixed limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetGuard {
    pub timeout: Duration,
    pub token_limit: u64,
    pub max_iterations: u32,
}

impl Default for BudgetGuard {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            token_limit: 100_000,
            max_iterations: 50,
        }
    }
}

impl BudgetGuard {
    pub fn new(timeout: Duration, token_limit: u64, max_iterations: u32) -> Self {
        Self {
            timeout,
            token_limit,
            max_iterations,
        }
    }

    /// Evaluate the guards in order: completion, timeout, tokens, iterations.
    /// Returns the first one that trips.
    pub fn check(&self, usage: &BudgetUsage) -> Option<TerminationReason> {
        if usage.complete {
            info!(iterations = usage.iterations, "Task marked complete");
            return Some(TerminationReason::Complete);
        }
        if usage.elapsed > self.timeout {
            warn!(
                elapsed_ms = usage.elapsed.as_millis() as u64,
                timeout_ms = self.timeout.as_millis() as u64,
                "Run timed out"
            );
            return Some(TerminationReason::TimedOut);
        }
        if usage.tokens >= self.token_limit {
            warn!(
                tokens = usage.tokens,
                limit = self.token_limit,
                "Token budget exhausted"
            );
            return Some(TerminationReason::TokenExhausted);
        }
        if usage.iterations >= self.max_iterations {
            warn!(
                iterations = usage.iterations,
                "Maximum iterations reached"
            );
            return Some(TerminationReason::MaxIterations);
        }
        None
    }
}
