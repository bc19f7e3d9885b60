//! Per-item execution state
//!
//! Each input item owns one `OperationContext` from the moment it enters
//! the engine until its terminal outcome is reported. The context tracks
//! the pending request, the remaining retry budget, and the earliest time
//! the scheduler may attempt it again.

use crate::api::fault::Fault;
use crate::api::operations::Operation;
use crate::api::resilience::RetryConfig;
use std::time::Duration;
use tokio::time::Instant;

/// Caps the doubling so the delay multiply stays in range even for
/// absurd retry budgets.
const MAX_BACKOFF_EXPONENT: u32 = 16;

/// Lifecycle of one submitted operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ContextState {
    /// Eligible for the next batch
    Pending,
    /// Currently part of a submitted batch
    InFlight,
    /// Waiting out its backoff timer
    RetryScheduled,
}

/// Result of applying a fault to a context
pub(crate) enum FaultResult<T> {
    /// A retry was scheduled; the context returns to the working set
    Scheduled {
        context: OperationContext<T>,
        delay: Duration,
    },
    /// Terminal failure
    GivenUp {
        item: T,
        fault: Fault,
        attempts: u32,
        /// True when the fault was retryable but the budget ran out
        exhausted: bool,
    },
}

/// One input item moving through the engine
#[derive(Debug)]
pub(crate) struct OperationContext<T> {
    item: T,
    request: Operation,
    retry_budget: u32,
    initial_backoff: Duration,
    next_eligible: Option<Instant>,
    attempts: u32,
    state: ContextState,
}

impl<T> OperationContext<T> {
    pub(crate) fn new(item: T, request: Operation, retry: &RetryConfig) -> Self {
        Self {
            item,
            request,
            retry_budget: retry.max_retries,
            initial_backoff: retry.initial_backoff,
            next_eligible: None,
            attempts: 0,
            state: ContextState::Pending,
        }
    }

    pub(crate) fn request(&self) -> &Operation {
        &self.request
    }

    pub(crate) fn attempts(&self) -> u32 {
        self.attempts
    }

    pub(crate) fn next_eligible(&self) -> Option<Instant> {
        self.next_eligible
    }

    pub(crate) fn is_due(&self, now: Instant) -> bool {
        self.state == ContextState::RetryScheduled
            && self.next_eligible.is_none_or(|at| at <= now)
    }

    /// Return a due context to `Pending` so the next pass can pick it up.
    pub(crate) fn tick(&mut self, now: Instant) {
        if self.is_due(now) {
            self.state = ContextState::Pending;
        }
    }

    /// Join a batch. Valid only from `Pending`.
    pub(crate) fn mark_in_flight(&mut self) {
        debug_assert_eq!(self.state, ContextState::Pending);
        self.attempts += 1;
        self.state = ContextState::InFlight;
    }

    /// Terminal success. Valid only from `InFlight`; consumes the context.
    pub(crate) fn complete(self) -> T {
        debug_assert_eq!(self.state, ContextState::InFlight);
        self.item
    }

    /// Apply a fault. Valid only from `InFlight`; schedules a retry when the
    /// fault is retryable and budget remains, otherwise gives up.
    pub(crate) fn fault(mut self, fault: Fault, retryable: bool, now: Instant) -> FaultResult<T> {
        debug_assert_eq!(self.state, ContextState::InFlight);

        if retryable && self.retry_budget > 0 {
            let delay = self.backoff_delay();
            self.retry_budget -= 1;
            self.next_eligible = Some(now + delay);
            self.state = ContextState::RetryScheduled;
            FaultResult::Scheduled {
                context: self,
                delay,
            }
        } else {
            FaultResult::GivenUp {
                item: self.item,
                fault,
                attempts: self.attempts,
                exhausted: retryable,
            }
        }
    }

    /// Tear down a context that never reached a terminal outcome
    /// (cancellation, or a fatal fault elsewhere in the run).
    pub(crate) fn into_item(self) -> (T, u32) {
        debug_assert_ne!(self.state, ContextState::InFlight);
        (self.item, self.attempts)
    }

    /// Delay before the next attempt: `initial_backoff * 2^(attempts - 1)`.
    fn backoff_delay(&self) -> Duration {
        let exponent = self.attempts.saturating_sub(1).min(MAX_BACKOFF_EXPONENT);
        self.initial_backoff.saturating_mul(1 << exponent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn retry_config() -> RetryConfig {
        RetryConfig {
            max_retries: 3,
            initial_backoff: Duration::from_millis(100),
        }
    }

    fn context() -> OperationContext<&'static str> {
        OperationContext::new(
            "item",
            Operation::create("contacts", json!({})),
            &retry_config(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_doubles_per_attempt() {
        let mut ctx = context();
        let fault = Fault::new("0x80072322", "throttled");

        let mut delays = Vec::new();
        let mut previous_eligible = None;
        for _ in 0..3 {
            ctx.tick(Instant::now());
            ctx.mark_in_flight();
            match ctx.fault(fault.clone(), true, Instant::now()) {
                FaultResult::Scheduled { context, delay } => {
                    delays.push(delay);
                    assert!(
                        context.next_eligible() > previous_eligible,
                        "next_eligible must increase strictly"
                    );
                    previous_eligible = context.next_eligible();
                    tokio::time::advance(delay).await;
                    ctx = context;
                }
                FaultResult::GivenUp { .. } => panic!("budget should not be exhausted yet"),
            }
        }

        assert_eq!(
            delays,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(400),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_exhaustion_carries_last_fault() {
        let mut ctx = context();

        for attempt in 1..=3 {
            ctx.tick(Instant::now());
            ctx.mark_in_flight();
            let fault = Fault::new("0x80072322", format!("throttled on attempt {attempt}"));
            match ctx.fault(fault, true, Instant::now()) {
                FaultResult::Scheduled { context, delay } => {
                    tokio::time::advance(delay).await;
                    ctx = context;
                }
                FaultResult::GivenUp { .. } => panic!("budget remains after {attempt} attempts"),
            }
        }

        // Fourth attempt: budget is spent, the final fault must surface.
        ctx.tick(Instant::now());
        ctx.mark_in_flight();
        let fault = Fault::new("0x80072322", "throttled on attempt 4");
        match ctx.fault(fault, true, Instant::now()) {
            FaultResult::GivenUp {
                item,
                fault,
                attempts,
                exhausted,
            } => {
                assert_eq!(item, "item");
                assert_eq!(fault.message, "throttled on attempt 4");
                assert_eq!(attempts, 4); // max_retries + 1
                assert!(exhausted);
            }
            FaultResult::Scheduled { .. } => panic!("should be out of budget"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_fault_ignores_budget() {
        let mut ctx = context();
        ctx.mark_in_flight();

        let fault = Fault::new("0x80060891", "attribute does not exist").with_status(400);
        match ctx.fault(fault, false, Instant::now()) {
            FaultResult::GivenUp {
                attempts,
                exhausted,
                ..
            } => {
                assert_eq!(attempts, 1);
                assert!(!exhausted);
            }
            FaultResult::Scheduled { .. } => panic!("non-retryable fault must not retry"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_due_until_timer_elapses() {
        let mut ctx = context();
        ctx.mark_in_flight();

        let FaultResult::Scheduled { mut context, delay } =
            ctx.fault(Fault::transport("reset"), true, Instant::now())
        else {
            panic!("expected a scheduled retry");
        };

        assert!(!context.is_due(Instant::now()));
        context.tick(Instant::now());
        assert_eq!(context.state, ContextState::RetryScheduled);

        tokio::time::advance(delay).await;
        assert!(context.is_due(Instant::now()));
        context.tick(Instant::now());
        assert_eq!(context.state, ContextState::Pending);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_budget_gives_up_on_first_retryable_fault() {
        let retry = RetryConfig {
            max_retries: 0,
            initial_backoff: Duration::from_millis(100),
        };
        let mut ctx =
            OperationContext::new("item", Operation::delete("contacts", "1"), &retry);
        ctx.mark_in_flight();

        match ctx.fault(Fault::transport("reset"), true, Instant::now()) {
            FaultResult::GivenUp { attempts, exhausted, .. } => {
                assert_eq!(attempts, 1);
                assert!(exhausted);
            }
            FaultResult::Scheduled { .. } => panic!("no budget to schedule with"),
        }
    }
}
