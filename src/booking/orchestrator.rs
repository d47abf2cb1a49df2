//! Bounded attempt loop
//!
//! Each attempt takes one endpoint and one fresh session through the appointment phase,
//! judges the assignment the server handed out and either completes the booking or throws
//! the session away and tries again through another endpoint. Step failures only ever cost
//! the current attempt.

use std::future::Future;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use rand::Rng;
use tokio::sync::{broadcast, watch};
use tokio::time::{timeout, Instant};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::context::AttemptContext;
use super::controls::{self, is_payment_url};
use super::driver::{ControlDescriptor, DriverError, ResponseCapture, SessionDriver, SessionHandle};
use super::extract::extract_assignment;
use super::matching::evaluate;
use super::records::{BookingRecord, CandidateSource, SuccessSink};
use crate::config::RunConfig;
use crate::error::{BookerError, Result};
use crate::models::{
    purpose, AttemptEvent, CandidateRecord, EndpointUsage, RunStatistics, RunStatus,
};
use crate::proxy::ProxyPool;

const EVENT_CHANNEL_CAPACITY: usize = 256;
const TRANSITION_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Stage of an attempt, used to label failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    AcquireEndpoint,
    OpenSession,
    Navigate,
    DiscoverFields,
    SubmitAppointment,
    AwaitResponse,
    ExtractAssignment,
    CompleteBooking,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::AcquireEndpoint => "acquire_endpoint",
            Step::OpenSession => "open_session",
            Step::Navigate => "navigate",
            Step::DiscoverFields => "discover_fields",
            Step::SubmitAppointment => "submit_appointment",
            Step::AwaitResponse => "await_response",
            Step::ExtractAssignment => "extract_assignment",
            Step::CompleteBooking => "complete_booking",
        }
    }

    /// Failures at these steps point at the endpoint rather than the page
    fn blames_endpoint(&self) -> bool {
        matches!(
            self,
            Step::OpenSession | Step::Navigate | Step::AwaitResponse
        )
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug)]
enum AttemptOutcome {
    Booked { payment_url: String },
    Mismatch,
    NoEndpoint,
    Failed { step: Step, reason: String },
    BookingFailed { reason: String },
    Cancelled,
}

impl AttemptOutcome {
    fn failed(step: Step, reason: impl Into<String>) -> Self {
        AttemptOutcome::Failed {
            step,
            reason: reason.into(),
        }
    }

    fn endpoint_usage(&self) -> EndpointUsage {
        match self {
            AttemptOutcome::Failed { step, .. } if step.blames_endpoint() => {
                EndpointUsage::SoftFailure
            }
            _ => EndpointUsage::Healthy,
        }
    }
}

/// Result of a wait that is bounded by a timeout and interruptible by `stop()`
enum Guarded<T> {
    Done(T),
    TimedOut,
    Cancelled,
}

impl<T> Guarded<T> {
    /// Value of a finished wait, or the outcome that ends the attempt at `step`
    fn or_abort(self, step: Step, what: &str) -> std::result::Result<T, AttemptOutcome> {
        match self {
            Guarded::Done(value) => Ok(value),
            Guarded::TimedOut => Err(AttemptOutcome::failed(step, format!("{} timed out", what))),
            Guarded::Cancelled => Err(AttemptOutcome::Cancelled),
        }
    }

    /// Value of a finished booking-phase wait
    fn or_booking_failure(self, what: &str) -> std::result::Result<T, String> {
        match self {
            Guarded::Done(value) => Ok(value),
            Guarded::TimedOut => Err(format!("{} timed out", what)),
            Guarded::Cancelled => Err(format!("{} was interrupted", what)),
        }
    }
}

/// Clears the running flag however `start()` exits
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Drives booking attempts until one succeeds or the retry budget runs out
pub struct AttemptOrchestrator {
    config: RunConfig,
    pool: Arc<ProxyPool>,
    driver: Arc<dyn SessionDriver>,
    capture: Arc<dyn ResponseCapture>,
    sink: Arc<dyn SuccessSink>,
    target: RwLock<Option<String>>,
    candidate: RwLock<Option<Arc<CandidateRecord>>>,
    stats: Mutex<RunStatistics>,
    running: AtomicBool,
    current_attempt: AtomicU32,
    cancel_tx: watch::Sender<bool>,
    events: broadcast::Sender<AttemptEvent>,
}

impl AttemptOrchestrator {
    pub fn new(
        config: RunConfig,
        pool: Arc<ProxyPool>,
        driver: Arc<dyn SessionDriver>,
        capture: Arc<dyn ResponseCapture>,
        sink: Arc<dyn SuccessSink>,
    ) -> Self {
        let target = config.target.as_deref().and_then(normalize_target);
        let (cancel_tx, _) = watch::channel(false);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            config,
            pool,
            driver,
            capture,
            sink,
            target: RwLock::new(target),
            candidate: RwLock::new(None),
            stats: Mutex::new(RunStatistics::default()),
            running: AtomicBool::new(false),
            current_attempt: AtomicU32::new(0),
            cancel_tx,
            events,
        }
    }

    /// Set the facility to look for; blank input clears it
    pub fn set_target(&self, target: &str) {
        let target = normalize_target(target);
        match &target {
            Some(t) => info!("Target set: {}", t),
            None => warn!("Target cleared"),
        }
        *self.target.write() = target;
    }

    pub fn target(&self) -> Option<String> {
        self.target.read().clone()
    }

    /// Load the candidate record through `source`
    pub async fn load_candidates(&self, source: &dyn CandidateSource, path: &Path) -> Result<()> {
        let record = source.load(path).await?;
        self.set_candidate(record);
        Ok(())
    }

    /// Load the candidate record from the configured path; false when none is configured
    pub async fn load_configured_candidates(&self, source: &dyn CandidateSource) -> Result<bool> {
        let Some(path) = self.config.candidates_path.as_deref() else {
            debug!("No candidate path configured");
            return Ok(false);
        };
        self.load_candidates(source, path).await?;
        Ok(true)
    }

    pub fn set_candidate(&self, record: CandidateRecord) {
        info!("Candidate loaded: {}", record.summary());
        *self.candidate.write() = Some(Arc::new(record));
    }

    pub fn candidate_summary(&self) -> String {
        match self.candidate.read().as_ref() {
            Some(record) => record.summary(),
            None => "No candidate data loaded".to_string(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AttemptEvent> {
        self.events.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn statistics(&self) -> RunStatistics {
        *self.stats.lock()
    }

    pub fn reset_statistics(&self) {
        *self.stats.lock() = RunStatistics::default();
        info!("Run statistics reset");
    }

    pub fn status(&self) -> RunStatus {
        RunStatus {
            running: self.is_running(),
            current_attempt: self.current_attempt.load(Ordering::SeqCst),
            max_retries: self.config.max_retries,
            target: self.target(),
            candidate_summary: self.candidate_summary(),
            statistics: self.statistics(),
            pool: self.pool.stats(),
        }
    }

    /// Ask a running loop to stop
    ///
    /// The loop notices between steps and during waits; a session that is open gets closed
    /// before `start()` returns.
    pub fn stop(&self) {
        if self.is_running() {
            info!("Stop requested");
        }
        self.cancel_tx.send_replace(true);
    }

    /// Run the attempt loop; true once a booking was completed
    ///
    /// Returns false straight away when no target or candidate is set, or when a run is
    /// already in progress.
    pub async fn start(&self) -> bool {
        let (target, candidate) = match self.run_inputs() {
            Ok(inputs) => inputs,
            Err(e) => {
                error!(class = ?e.class(), "Cannot start: {}", e);
                return false;
            }
        };

        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("Cannot start: a run is already in progress");
            return false;
        }
        let _running = RunningGuard(&self.running);

        self.cancel_tx.send_replace(false);
        let mut cancel = self.cancel_tx.subscribe();
        self.current_attempt.store(0, Ordering::SeqCst);

        let started = Instant::now();
        let success = self
            .run_loop(Uuid::new_v4(), &target, candidate, &mut cancel)
            .await;
        let elapsed = started.elapsed();

        self.stats.lock().total_time += elapsed;
        let attempts = self.current_attempt.load(Ordering::SeqCst);
        self.emit(AttemptEvent::RunFinished { success, attempts });
        info!(
            success = success,
            attempts = attempts,
            "Run finished in {:.1}s",
            elapsed.as_secs_f64()
        );

        success
    }

    fn run_inputs(&self) -> Result<(String, Arc<CandidateRecord>)> {
        let target = self.target().ok_or(BookerError::NotConfigured("target"))?;
        let candidate = self
            .candidate
            .read()
            .clone()
            .ok_or(BookerError::NotConfigured("candidate data"))?;
        Ok((target, candidate))
    }

    #[instrument(name = "run", skip_all, fields(run_id = %run_id, target = %target))]
    async fn run_loop(
        &self,
        run_id: Uuid,
        target: &str,
        candidate: Arc<CandidateRecord>,
        cancel: &mut watch::Receiver<bool>,
    ) -> bool {
        info!(
            "Starting run for {} (max {} attempts)",
            candidate.full_name(),
            self.config.max_retries
        );
        self.emit(AttemptEvent::RunStarted {
            run_id: run_id.to_string(),
            target: target.to_string(),
        });

        self.pool.ensure_minimum().await;

        for attempt in 1..=self.config.max_retries {
            if *cancel.borrow() {
                info!("Run cancelled before attempt {}", attempt);
                return false;
            }

            self.current_attempt.store(attempt, Ordering::SeqCst);
            self.stats.lock().attempts += 1;
            self.emit(AttemptEvent::AttemptStarted {
                attempt,
                max_retries: self.config.max_retries,
            });

            let outcome = self
                .run_attempt(attempt, target, candidate.clone(), cancel)
                .await;

            match outcome {
                AttemptOutcome::Booked { payment_url } => {
                    info!("Booking completed on attempt {}: {}", attempt, payment_url);
                    return true;
                }
                AttemptOutcome::Cancelled => {
                    info!("Run cancelled during attempt {}", attempt);
                    return false;
                }
                AttemptOutcome::NoEndpoint => {
                    let err = BookerError::NoProxiesAvailable;
                    warn!(
                        class = ?err.class(),
                        "{}, backing off {}s",
                        err,
                        self.config.no_proxy_backoff.as_secs()
                    );
                    self.emit(AttemptEvent::AttemptFailed {
                        attempt,
                        step: Step::AcquireEndpoint.to_string(),
                        reason: err.to_string(),
                    });
                    if !pause(cancel, self.config.no_proxy_backoff).await {
                        return false;
                    }
                }
                AttemptOutcome::Mismatch => {
                    let delay = self.mismatch_delay();
                    debug!("Waiting {}ms before the next attempt", delay.as_millis());
                    if !pause(cancel, delay).await {
                        return false;
                    }
                }
                AttemptOutcome::Failed { step, reason } => {
                    warn!("Attempt {} failed at {}: {}", attempt, step, reason);
                    self.emit(AttemptEvent::AttemptFailed {
                        attempt,
                        step: step.to_string(),
                        reason,
                    });
                }
                AttemptOutcome::BookingFailed { reason } => {
                    error!("Booking failed after a match: {}", reason);
                    self.emit(AttemptEvent::AttemptFailed {
                        attempt,
                        step: Step::CompleteBooking.to_string(),
                        reason,
                    });
                    if self.config.abort_on_booking_failure {
                        return false;
                    }
                }
            }
        }

        warn!(
            "Retry budget of {} attempts exhausted without a booking",
            self.config.max_retries
        );
        false
    }

    #[instrument(name = "attempt", skip(self, target, candidate, cancel))]
    async fn run_attempt(
        &self,
        attempt: u32,
        target: &str,
        candidate: Arc<CandidateRecord>,
        cancel: &mut watch::Receiver<bool>,
    ) -> AttemptOutcome {
        let Some(endpoint) = self.pool.acquire().await else {
            return AttemptOutcome::NoEndpoint;
        };
        self.stats.lock().endpoints_consumed += 1;

        let mut ctx = AttemptContext::new(attempt, self.config.max_retries, endpoint, candidate);
        info!("Starting {}", ctx);

        let handle = match timeout(self.config.session_timeout, self.driver.open(&ctx.endpoint)).await
        {
            Ok(Ok(handle)) => handle,
            Ok(Err(DriverError::ProxyUnreachable(reason))) => {
                self.pool.ban(&ctx.endpoint.address);
                return AttemptOutcome::failed(Step::OpenSession, reason);
            }
            Ok(Err(DriverError::Session(reason))) => {
                self.pool
                    .release(&ctx.endpoint.address, EndpointUsage::SoftFailure);
                return AttemptOutcome::failed(Step::OpenSession, reason);
            }
            Err(_) => {
                self.pool
                    .release(&ctx.endpoint.address, EndpointUsage::SoftFailure);
                return AttemptOutcome::failed(Step::OpenSession, "session open timed out");
            }
        };
        ctx.session = Some(handle.clone());

        let outcome = self.drive_session(&mut ctx, &handle, target, cancel).await;

        match timeout(self.config.session_timeout, self.driver.close(&handle)).await {
            Ok(()) => debug!("Closed session {}", handle),
            Err(_) => warn!("Closing session {} timed out", handle),
        }
        self.pool
            .release(&ctx.endpoint.address, outcome.endpoint_usage());

        outcome
    }

    async fn drive_session(
        &self,
        ctx: &mut AttemptContext,
        handle: &SessionHandle,
        target: &str,
        cancel: &mut watch::Receiver<bool>,
    ) -> AttemptOutcome {
        match guarded(
            cancel,
            self.config.page_timeout,
            self.driver.navigate(handle, &self.config.booking_url),
        )
        .await
        {
            Guarded::Done(true) => {}
            Guarded::Done(false) => {
                return AttemptOutcome::failed(Step::Navigate, "booking page did not load")
            }
            Guarded::TimedOut => {
                return AttemptOutcome::failed(Step::Navigate, "booking page load timed out")
            }
            Guarded::Cancelled => return AttemptOutcome::Cancelled,
        }

        let fields = match guarded(
            cancel,
            self.config.page_timeout,
            self.driver.discover_fields(handle),
        )
        .await
        {
            Guarded::Done(fields) => fields,
            Guarded::TimedOut => {
                return AttemptOutcome::failed(Step::DiscoverFields, "field discovery timed out")
            }
            Guarded::Cancelled => return AttemptOutcome::Cancelled,
        };
        if fields.is_empty() {
            return AttemptOutcome::failed(Step::DiscoverFields, "no fillable fields found");
        }
        for name in fields.keys().filter(|name| !purpose::is_known(name)) {
            debug!("Ignoring control with unknown purpose {}", name);
        }
        ctx.fields = fields;

        if *cancel.borrow() {
            return AttemptOutcome::Cancelled;
        }

        let appointment = ctx.appointment.clone();
        let filled = self
            .fill_fields(ctx, handle, appointment.fields(), cancel)
            .await
            .or_abort(Step::SubmitAppointment, "filling the appointment form");
        if let Err(outcome) = filled {
            return outcome;
        }

        match self
            .click_first(handle, controls::STANDARD_VARIANT, cancel)
            .await
            .or_abort(Step::SubmitAppointment, "selecting the appointment type")
        {
            Ok(Some(control)) => debug!("Selected standard appointment via {}", control),
            Ok(None) => {}
            Err(outcome) => return outcome,
        }

        let control = match self
            .click_first(handle, controls::APPOINTMENT_SUBMIT, cancel)
            .await
            .or_abort(Step::SubmitAppointment, "submitting the appointment form")
        {
            Ok(Some(control)) => control,
            Ok(None) => {
                return AttemptOutcome::failed(Step::SubmitAppointment, "no submit control found")
            }
            Err(outcome) => return outcome,
        };
        info!("Submitted appointment form via {}", control);

        let body = match guarded(
            cancel,
            self.config.response_timeout,
            self.capture
                .await_response(handle, self.config.response_timeout),
        )
        .await
        {
            Guarded::Done(Some(body)) => body,
            Guarded::Done(None) | Guarded::TimedOut => {
                return AttemptOutcome::failed(Step::AwaitResponse, "no response captured")
            }
            Guarded::Cancelled => return AttemptOutcome::Cancelled,
        };

        let Some(assigned) = extract_assignment(&body) else {
            return AttemptOutcome::failed(
                Step::ExtractAssignment,
                "response carries no assignment",
            );
        };

        let decision = evaluate(&assigned, target);
        info!(
            assigned = %assigned,
            tier = %decision.tier,
            matched = decision.matched,
            "Assignment observed"
        );
        self.emit(AttemptEvent::AssignmentObserved {
            attempt: ctx.attempt,
            assigned: assigned.clone(),
            tier: decision.tier,
            matched: decision.matched,
        });

        if !decision.matched {
            return AttemptOutcome::Mismatch;
        }

        self.stats.lock().matches_found += 1;
        info!("Match found on {}: {}", ctx, assigned);

        // Not interruptible: the assignment only exists inside this session. Every driver call
        // is still bounded by the page timeout.
        match self.complete_booking(ctx, handle).await {
            Ok(payment_url) => {
                self.emit(AttemptEvent::BookingCompleted {
                    attempt: ctx.attempt,
                    payment_url: payment_url.clone(),
                });
                AttemptOutcome::Booked { payment_url }
            }
            Err(reason) => AttemptOutcome::BookingFailed { reason },
        }
    }

    async fn complete_booking(
        &self,
        ctx: &AttemptContext,
        handle: &SessionHandle,
    ) -> std::result::Result<String, String> {
        // Detached from stop(): the sender is gone, so this never reports a cancel
        let (_, mut uninterruptible) = watch::channel(false);
        let limit = self.config.page_timeout;
        let candidate = ctx.candidate.clone();

        self.fill_fields(ctx, handle, candidate.personal_fields(), &mut uninterruptible)
            .await
            .or_booking_failure("filling personal details")?;

        let mut ticked = 0;
        for control in controls::descriptors(controls::CONSENT) {
            let clicked = guarded(&mut uninterruptible, limit, self.driver.click(handle, &control))
                .await
                .or_booking_failure("ticking consent")?;
            if clicked {
                debug!("Ticked consent control {}", control);
                ticked += 1;
            }
        }
        debug!("Ticked {} consent controls", ticked);

        let before = guarded(&mut uninterruptible, limit, self.driver.current_url(handle))
            .await
            .or_booking_failure("reading the page URL")?;

        let Some(control) = self
            .click_first(handle, controls::FINAL_SUBMIT, &mut uninterruptible)
            .await
            .or_booking_failure("submitting the booking form")?
        else {
            return Err("no final submit control found".to_string());
        };
        info!("Submitted booking form via {}", control);

        let payment_url = self.wait_for_transition(handle, &before).await;
        if payment_url.trim().is_empty() {
            return Err("no page URL after final submit".to_string());
        }

        if is_payment_url(&payment_url) {
            info!("Payment URL captured: {}", payment_url);
        } else {
            warn!("URL does not look like a payment page: {}", payment_url);
        }

        let record = BookingRecord::new(&candidate, payment_url.clone());
        match timeout(limit, self.sink.record_success(&record)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Failed to record booking for {}: {}", payment_url, e),
            Err(_) => error!("Recording booking for {} timed out", payment_url),
        }

        Ok(payment_url)
    }

    /// Fill every pair whose purpose was discovered; individual failures are only logged
    async fn fill_fields(
        &self,
        ctx: &AttemptContext,
        handle: &SessionHandle,
        pairs: Vec<(&'static str, &str)>,
        cancel: &mut watch::Receiver<bool>,
    ) -> Guarded<()> {
        for (purpose, value) in pairs {
            if !ctx.has_field(purpose) {
                debug!("No {} field on this page", purpose);
                continue;
            }
            match guarded(
                cancel,
                self.config.page_timeout,
                self.driver.fill(handle, purpose, value),
            )
            .await
            {
                Guarded::Done(true) => {}
                Guarded::Done(false) => warn!("Failed to fill {} field", purpose),
                Guarded::TimedOut => {
                    warn!("Filling {} field timed out", purpose);
                    return Guarded::TimedOut;
                }
                Guarded::Cancelled => return Guarded::Cancelled,
            }
        }
        Guarded::Done(())
    }

    /// Click the first control of `locators` the driver accepts
    async fn click_first(
        &self,
        handle: &SessionHandle,
        locators: &[&str],
        cancel: &mut watch::Receiver<bool>,
    ) -> Guarded<Option<ControlDescriptor>> {
        for control in controls::descriptors(locators) {
            match guarded(
                cancel,
                self.config.page_timeout,
                self.driver.click(handle, &control),
            )
            .await
            {
                Guarded::Done(true) => return Guarded::Done(Some(control)),
                Guarded::Done(false) => {}
                Guarded::TimedOut => {
                    warn!("Clicking {} timed out", control);
                    return Guarded::TimedOut;
                }
                Guarded::Cancelled => return Guarded::Cancelled,
            }
        }
        Guarded::Done(None)
    }

    /// Poll the page URL until it moves away from `before` or the transition timeout passes
    ///
    /// Each read is bounded by the time left; a read that overruns ends the wait with
    /// `before`.
    async fn wait_for_transition(&self, handle: &SessionHandle, before: &str) -> String {
        let deadline = Instant::now() + self.config.transition_timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let url = match timeout(
                remaining.max(TRANSITION_POLL_INTERVAL),
                self.driver.current_url(handle),
            )
            .await
            {
                Ok(url) => url,
                Err(_) => {
                    warn!("Reading the page URL timed out");
                    return before.to_string();
                }
            };
            let now = Instant::now();
            if url != before || now >= deadline {
                return url;
            }
            tokio::time::sleep(TRANSITION_POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    fn mismatch_delay(&self) -> Duration {
        let min = self.config.mismatch_delay_min.as_millis() as u64;
        let max = self.config.mismatch_delay_max.as_millis() as u64;
        if max <= min {
            return Duration::from_millis(min);
        }
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }

    fn emit(&self, event: AttemptEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

fn normalize_target(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Resolve once the cancel flag is raised
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow_and_update() {
            return;
        }
        if cancel.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Sleep for `duration`; false when cancelled first
async fn pause(cancel: &mut watch::Receiver<bool>, duration: Duration) -> bool {
    if *cancel.borrow() {
        return false;
    }
    tokio::select! {
        _ = tokio::time::sleep(duration) => true,
        _ = cancelled(cancel) => false,
    }
}

async fn guarded<F: Future>(
    cancel: &mut watch::Receiver<bool>,
    limit: Duration,
    fut: F,
) -> Guarded<F::Output> {
    if *cancel.borrow() {
        return Guarded::Cancelled;
    }
    tokio::select! {
        result = timeout(limit, fut) => match result {
            Ok(value) => Guarded::Done(value),
            Err(_) => Guarded::TimedOut,
        },
        _ = cancelled(cancel) => Guarded::Cancelled,
    }
}
