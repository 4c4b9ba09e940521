//! Run-wide budget accounting
//!
//! One `RunBudget` is shared by every collaborator that spends money
//! or time. It only answers stop/continue at repo and iteration
//! boundaries; nothing is preempted mid-call.

use specforge_bridge::BudgetOracle;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::info;

#[derive(Debug)]
pub struct RunBudget {
    deadline: Option<Instant>,
    max_llm_calls: Option<u64>,
    llm_calls: AtomicU64,
}

impl RunBudget {
    pub fn new(deadline_minutes: Option<u64>, max_llm_calls: Option<u64>) -> Self {
        let budget = Self {
            deadline: deadline_minutes.map(|m| Instant::now() + Duration::from_secs(m * 60)),
            max_llm_calls,
            llm_calls: AtomicU64::new(0),
        };
        if budget.deadline.is_some() || budget.max_llm_calls.is_some() {
            info!(
                deadline_minutes = ?deadline_minutes,
                max_llm_calls = ?max_llm_calls,
                "run budget armed"
            );
        }
        budget
    }

    /// Count one model call. Returns the running total.
    pub fn record_llm_call(&self) -> u64 {
        self.llm_calls.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn llm_calls_used(&self) -> u64 {
        self.llm_calls.load(Ordering::SeqCst)
    }
}

impl BudgetOracle for RunBudget {
    fn should_continue(&self) -> bool {
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return false;
            }
        }
        if let Some(max) = self.max_llm_calls {
            if self.llm_calls_used() >= max {
                return false;
            }
        }
        true
    }
}
