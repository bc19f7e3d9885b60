//! Batch/retry scheduler
//!
//! Converts a stream of input items into terminal outcomes while honoring
//! the service's batch size limit, each item's backoff timer, and the
//! concurrency ceiling. A single orchestrator task owns all bookkeeping;
//! batch submission is the only suspension point that touches the network.

use std::collections::VecDeque;
use std::pin::pin;
use std::sync::Arc;

use futures::stream::{FuturesUnordered, Stream};
use futures::{FutureExt, StreamExt};
use log::{debug, info, warn};
use tokio::time::{Instant, sleep_until, timeout};
use tokio_util::sync::CancellationToken;

use super::context::{FaultResult, OperationContext};
use super::reporter::{
    BulkError, BulkSummary, OutcomeReporter, ResponseConverter, WebApiConverter,
};
use crate::api::executor::{Executor, ItemOutcome};
use crate::api::fault::Fault;
use crate::api::operations::Operation;
use crate::api::resilience::{ConcurrencyLimiter, FaultDisposition, FaultPolicy, ResilienceConfig};

/// Executes streams of operations in batches with per-item retry and fault
/// isolation. Every input item yields exactly one terminal report through
/// the [`OutcomeReporter`], even when whole batches fail or the run is
/// cancelled.
pub struct BulkExecutor {
    executor: Arc<dyn Executor>,
    converter: Arc<dyn ResponseConverter>,
    policy: FaultPolicy,
    config: ResilienceConfig,
}

impl BulkExecutor {
    pub fn new(executor: Arc<dyn Executor>, config: ResilienceConfig) -> Self {
        Self {
            executor,
            converter: Arc::new(WebApiConverter),
            policy: FaultPolicy::default(),
            config,
        }
    }

    /// Replace the response conversion used on completed operations.
    pub fn with_converter(mut self, converter: Arc<dyn ResponseConverter>) -> Self {
        self.converter = converter;
        self
    }

    /// Replace the fault classification table.
    pub fn with_policy(mut self, policy: FaultPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Execute a fixed set of items.
    pub async fn run<T, R>(
        &self,
        items: Vec<(T, Operation)>,
        reporter: &mut R,
        cancel: CancellationToken,
    ) -> BulkSummary
    where
        R: OutcomeReporter<T>,
    {
        self.run_stream(futures::stream::iter(items), reporter, cancel)
            .await
    }

    /// Execute a possibly unbounded stream of items. The run terminates once
    /// the stream is exhausted and every accepted item has been reported.
    pub async fn run_stream<T, S, R>(
        &self,
        input: S,
        reporter: &mut R,
        cancel: CancellationToken,
    ) -> BulkSummary
    where
        S: Stream<Item = (T, Operation)>,
        R: OutcomeReporter<T>,
    {
        let max_batch = self.config.batch.max_batch_size.max(1);
        let batch_timeout = self.config.batch.timeout;
        let retry = self.config.retry.clone();
        let limiter = ConcurrencyLimiter::new(self.config.concurrency.max_concurrent_batches);

        let mut input = pin!(input.fuse());
        let mut input_open = true;
        let mut backlog: VecDeque<OperationContext<T>> = VecDeque::new();
        let mut waiting: Vec<OperationContext<T>> = Vec::new();
        let mut in_flight = FuturesUnordered::new();
        let mut summary = BulkSummary::default();
        let mut cancelled = false;
        let mut fatal: Option<Fault> = None;

        loop {
            // Ingest everything the input can hand over without waiting, so
            // batches fill as full as possible before submission.
            while input_open && !cancelled && fatal.is_none() {
                match input.next().now_or_never() {
                    Some(Some((item, request))) => {
                        summary.submitted += 1;
                        backlog.push_back(OperationContext::new(item, request, &retry));
                    }
                    Some(None) => input_open = false,
                    None => break,
                }
            }

            // Return due retries to the backlog behind items already there.
            let now = Instant::now();
            if !waiting.is_empty() {
                let (due, parked): (Vec<_>, Vec<_>) =
                    waiting.drain(..).partition(|context| context.is_due(now));
                for mut context in due {
                    context.tick(now);
                    backlog.push_back(context);
                }
                waiting = parked;
            }

            // Fill the concurrency ceiling with batches of ready contexts,
            // oldest first.
            if !cancelled && fatal.is_none() {
                while !backlog.is_empty() {
                    let Some(permit) = limiter.try_acquire() else {
                        break;
                    };
                    let take = backlog.len().min(max_batch);
                    let mut batch: Vec<OperationContext<T>> = backlog.drain(..take).collect();
                    for context in &mut batch {
                        context.mark_in_flight();
                    }
                    let requests: Vec<Operation> = batch
                        .iter()
                        .map(|context| context.request().clone())
                        .collect();
                    summary.batches += 1;
                    debug!(
                        "submitting batch #{} with {} operation(s)",
                        summary.batches,
                        batch.len()
                    );

                    let executor = Arc::clone(&self.executor);
                    in_flight.push(async move {
                        let _permit = permit;
                        let outcome =
                            match timeout(batch_timeout, executor.execute_batch(&requests)).await {
                                Ok(Ok(outcomes)) => Ok(outcomes),
                                Ok(Err(error)) => Err(Fault::transport(format!("{error:#}"))),
                                Err(_) => Err(Fault::timeout(batch_timeout)),
                            };
                        (batch, outcome)
                    });
                }
            }

            if in_flight.is_empty() {
                if cancelled || fatal.is_some() {
                    break;
                }
                if !input_open && backlog.is_empty() && waiting.is_empty() {
                    break;
                }
            }

            let next_due = waiting
                .iter()
                .filter_map(|context| context.next_eligible())
                .min();
            let wake_at = next_due.unwrap_or_else(Instant::now);

            tokio::select! {
                biased;
                _ = cancel.cancelled(), if !cancelled => {
                    info!(
                        "cancellation requested; draining {} in-flight batch(es)",
                        in_flight.len()
                    );
                    cancelled = true;
                }
                Some((batch, outcome)) = in_flight.next(), if !in_flight.is_empty() => {
                    self.demux(batch, outcome, reporter, &mut waiting, &mut summary, &mut fatal);
                }
                arrived = input.next(), if input_open && !cancelled && fatal.is_none() => {
                    match arrived {
                        Some((item, request)) => {
                            summary.submitted += 1;
                            backlog.push_back(OperationContext::new(item, request, &retry));
                        }
                        None => input_open = false,
                    }
                }
                _ = sleep_until(wake_at), if next_due.is_some() => {}
            }
        }

        // Everything still owned by the engine is terminal now: a fatal
        // fault fails the remainder, cancellation reports it as cancelled.
        for context in backlog.into_iter().chain(waiting) {
            let (item, attempts) = context.into_item();
            match &fatal {
                Some(fault) => {
                    summary.failed += 1;
                    reporter.report_failure(
                        item,
                        BulkError::Fault {
                            fault: fault.clone(),
                            attempts,
                        },
                    );
                }
                None => {
                    summary.cancelled += 1;
                    reporter.report_failure(item, BulkError::Cancelled);
                }
            }
        }

        // Items the input had already yielded but the engine never accepted.
        if cancelled || fatal.is_some() {
            while let Some(Some((item, _request))) = input.next().now_or_never() {
                summary.submitted += 1;
                match &fatal {
                    Some(fault) => {
                        summary.failed += 1;
                        reporter.report_failure(
                            item,
                            BulkError::Fault {
                                fault: fault.clone(),
                                attempts: 0,
                            },
                        );
                    }
                    None => {
                        summary.cancelled += 1;
                        reporter.report_failure(item, BulkError::Cancelled);
                    }
                }
            }
        }

        info!(
            "bulk run finished: {} succeeded, {} failed, {} cancelled ({} batches, {} retries)",
            summary.succeeded, summary.failed, summary.cancelled, summary.batches, summary.retries
        );
        summary
    }

    /// Attribute a completed batch back onto its contexts, position by
    /// position. A batch-level failure is fanned out as an independent
    /// retryable fault per context.
    fn demux<T, R: OutcomeReporter<T>>(
        &self,
        batch: Vec<OperationContext<T>>,
        outcome: Result<Vec<ItemOutcome>, Fault>,
        reporter: &mut R,
        waiting: &mut Vec<OperationContext<T>>,
        summary: &mut BulkSummary,
        fatal: &mut Option<Fault>,
    ) {
        let now = Instant::now();
        match outcome {
            Err(fault) => {
                warn!("batch of {} failed as a whole: {fault}", batch.len());
                for context in batch {
                    self.apply_fault(context, fault.clone(), now, reporter, waiting, summary, fatal);
                }
            }
            Ok(outcomes) if outcomes.len() != batch.len() => {
                // Positional attribution with the wrong count would pin
                // outcomes on the wrong items.
                let fault = Fault::transport(format!(
                    "batch returned {} outcome(s) for {} request(s); refusing positional attribution",
                    outcomes.len(),
                    batch.len()
                ));
                warn!("{}", fault.message);
                for context in batch {
                    self.apply_fault(context, fault.clone(), now, reporter, waiting, summary, fatal);
                }
            }
            Ok(outcomes) => {
                for (context, item_outcome) in batch.into_iter().zip(outcomes) {
                    match item_outcome {
                        Ok(response) => {
                            let result = self.converter.convert(context.request(), response);
                            summary.succeeded += 1;
                            reporter.report_success(context.complete(), result);
                        }
                        Err(fault) => {
                            self.apply_fault(context, fault, now, reporter, waiting, summary, fatal);
                        }
                    }
                }
            }
        }
    }

    fn apply_fault<T, R: OutcomeReporter<T>>(
        &self,
        context: OperationContext<T>,
        fault: Fault,
        now: Instant,
        reporter: &mut R,
        waiting: &mut Vec<OperationContext<T>>,
        summary: &mut BulkSummary,
        fatal: &mut Option<Fault>,
    ) {
        let disposition = self.policy.classify(context.request(), &fault);
        if disposition == FaultDisposition::Fatal && fatal.is_none() {
            warn!("fatal fault, failing remaining work: {fault}");
            *fatal = Some(fault.clone());
        }

        let retryable = disposition == FaultDisposition::Retryable;
        match context.fault(fault, retryable, now) {
            FaultResult::Scheduled { context, delay } => {
                summary.retries += 1;
                debug!(
                    "{} attempt {} failed; retrying in {:?}",
                    context.request().operation_type(),
                    context.attempts(),
                    delay
                );
                waiting.push(context);
            }
            FaultResult::GivenUp {
                item,
                fault,
                attempts,
                exhausted,
            } => {
                summary.failed += 1;
                let error = if exhausted {
                    warn!("operation failed after {attempts} attempt(s); retry budget exhausted: {fault}");
                    BulkError::Exhausted { fault, attempts }
                } else {
                    warn!("operation failed with a non-retryable fault: {fault}");
                    BulkError::Fault { fault, attempts }
                };
                reporter.report_failure(item, error);
            }
        }
    }
}
