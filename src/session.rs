use chrono::{DateTime, Utc};
use rand::Rng;
use std::time::Duration;
use uuid::Uuid;

use crate::bank::QuestionSource;
use crate::clock::{ClockSignal, SessionClock, TICK};
use crate::error::{PersistenceError, SessionError};
use crate::ledger::AnswerLedger;
use crate::question::Question;
use crate::result::{finalize, CompletionReason, Finalize, ResultId, TestResult};
use crate::scoring::{score_ledger, PerformanceMetrics};
use crate::selector::{draw, FilterKey};
use crate::store::ResultStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum SessionState {
    NotStarted,
    ShowingInstructions,
    InProgress,
    Completed,
}

/// Per-module knobs. One engine serves every module; only these differ.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub question_count: usize,
    pub budget: Duration,
}

impl SessionConfig {
    pub fn new(question_count: usize, budget_secs: u64) -> Self {
        Self {
            question_count,
            budget: Duration::from_secs(budget_secs.max(1)),
        }
    }

    /// Defaults for the built-in modules. Unknown modules get a ten-question,
    /// ten-minute test.
    pub fn preset(module: &str) -> Self {
        match module.to_lowercase().as_str() {
            "grammar" => Self::new(15, 1200),
            "aptitude" => Self::new(20, 1200),
            "subject" => Self::new(10, 300),
            _ => Self::new(10, 600),
        }
    }
}

/// One attempt at a fixed set of questions, from draw to finished result.
#[derive(Debug)]
pub struct TestSession {
    session_id: Uuid,
    config: SessionConfig,
    filter: FilterKey,
    questions: Vec<Question>,
    state: SessionState,
    current: usize,
    ledger: AnswerLedger,
    clock: SessionClock,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    completion_reason: Option<CompletionReason>,
    result: Option<TestResult>,
    saved_id: Option<ResultId>,
}

impl TestSession {
    /// Draw questions for `filter` and set up a session in `NotStarted`.
    pub fn start<S>(source: &S, filter: FilterKey, config: SessionConfig) -> Result<Self, SessionError>
    where
        S: QuestionSource + ?Sized,
    {
        Self::start_with_rng(source, filter, config, &mut rand::thread_rng())
    }

    pub fn start_with_rng<S, R>(
        source: &S,
        filter: FilterKey,
        config: SessionConfig,
        rng: &mut R,
    ) -> Result<Self, SessionError>
    where
        S: QuestionSource + ?Sized,
        R: Rng + ?Sized,
    {
        let questions = draw(source, &filter, config.question_count, rng)?;
        let session = Self::with_questions(questions, filter, config);
        tracing::info!(
            "session {} drew {} questions for {}",
            session.session_id,
            session.questions.len(),
            session.filter
        );
        Ok(session)
    }

    fn with_questions(questions: Vec<Question>, filter: FilterKey, config: SessionConfig) -> Self {
        let n = questions.len();
        Self {
            session_id: Uuid::new_v4(),
            clock: SessionClock::new(config.budget),
            config,
            filter,
            questions,
            state: SessionState::NotStarted,
            current: 0,
            ledger: AnswerLedger::new(n),
            started_at: None,
            completed_at: None,
            completion_reason: None,
            result: None,
            saved_id: None,
        }
    }

    fn require(&self, expected: SessionState, action: &'static str) -> Result<(), SessionError> {
        if self.state == expected {
            Ok(())
        } else {
            tracing::debug!("rejected {action} in state {}", self.state);
            Err(SessionError::InvalidTransition {
                from: self.state,
                action,
            })
        }
    }

    pub fn show_instructions(&mut self) -> Result<(), SessionError> {
        self.require(SessionState::NotStarted, "show instructions")?;
        self.state = SessionState::ShowingInstructions;
        Ok(())
    }

    /// Enter `InProgress` and start the clock.
    pub fn begin(&mut self, now: DateTime<Utc>) -> Result<(), SessionError> {
        self.require(SessionState::ShowingInstructions, "begin")?;
        self.state = SessionState::InProgress;
        self.started_at = Some(now);
        self.clock.start();
        tracing::info!(
            "session {} started with {}s budget",
            self.session_id,
            self.clock.budget().as_secs()
        );
        Ok(())
    }

    pub fn select_answer(&mut self, index: usize, option: usize) -> Result<(), SessionError> {
        self.require(SessionState::InProgress, "select an answer")?;
        self.ledger.select(index, option)
    }

    pub fn clear_answer(&mut self, index: usize) -> Result<(), SessionError> {
        self.require(SessionState::InProgress, "clear an answer")?;
        self.ledger.clear(index)
    }

    /// Show question `index`. Time from now on accrues to it.
    pub fn navigate_to(&mut self, index: usize) -> Result<(), SessionError> {
        self.require(SessionState::InProgress, "navigate")?;
        self.ledger.check_index(index).inspect_err(|e| {
            tracing::debug!("{e}");
        })?;
        self.current = index;
        Ok(())
    }

    pub fn next(&mut self) -> Result<(), SessionError> {
        let target = (self.current + 1).min(self.questions.len().saturating_sub(1));
        self.navigate_to(target)
    }

    pub fn previous(&mut self) -> Result<(), SessionError> {
        self.navigate_to(self.current.saturating_sub(1))
    }

    /// Advance the clock by `delta`. Expiry completes the session.
    ///
    /// Outside `InProgress` this is a no-op returning `Stopped`.
    pub fn advance(&mut self, delta: Duration, now: DateTime<Utc>) -> ClockSignal {
        if self.state != SessionState::InProgress {
            return ClockSignal::Stopped;
        }
        let signal = self.clock.advance(delta, &mut self.ledger, self.current);
        if signal == ClockSignal::Expired {
            self.on_expire(now);
        }
        signal
    }

    pub fn tick(&mut self, now: DateTime<Utc>) -> ClockSignal {
        self.advance(TICK, now)
    }

    fn on_expire(&mut self, now: DateTime<Utc>) {
        tracing::info!("session {} ran out of time", self.session_id);
        self.complete(now, CompletionReason::Expired);
    }

    /// Finish the session at the user's request.
    pub fn submit(&mut self, now: DateTime<Utc>) -> Result<&TestResult, SessionError> {
        self.require(SessionState::InProgress, "submit")?;
        self.complete(now, CompletionReason::Submitted);
        self.result()
    }

    /// Shared by submit and expiry. Stops the clock and freezes the ledger
    /// before the result is built; a second call is ignored.
    fn complete(&mut self, now: DateTime<Utc>, reason: CompletionReason) {
        if self.state != SessionState::InProgress {
            return;
        }
        self.clock.stop();
        self.ledger.freeze();
        self.state = SessionState::Completed;
        self.completed_at = Some(now);
        self.completion_reason = Some(reason);

        let result = finalize(&Finalize {
            module: &self.filter.module,
            topic: self.filter.category.as_deref(),
            questions: &self.questions,
            ledger: &self.ledger,
            clock: &self.clock,
            started_at: self.started_at.unwrap_or(now),
            ended_at: now,
            reason,
        });
        tracing::info!(
            "session {} {}: {}% ({} correct, {} unanswered)",
            self.session_id,
            reason,
            result.score_percent,
            result.performance_metrics.correct_count,
            result.performance_metrics.unanswered_count
        );
        self.result = Some(result);
    }

    /// Metrics over the answers given so far.
    pub fn live_metrics(&self) -> PerformanceMetrics {
        score_ledger(&self.questions, &self.ledger)
    }

    pub fn result(&self) -> Result<&TestResult, SessionError> {
        self.result.as_ref().ok_or(SessionError::NotCompleted)
    }

    /// Hand the finished result to `store`.
    ///
    /// A failed save keeps the result in memory; calling again retries. Once a
    /// save succeeds further calls return the stored id without writing.
    pub fn save_result<S>(&mut self, store: &mut S) -> Result<ResultId, PersistenceError>
    where
        S: ResultStore + ?Sized,
    {
        if let Some(id) = self.saved_id {
            return Ok(id);
        }
        let result = self.result.as_ref().ok_or(PersistenceError::NothingToSave)?;
        match store.save(result) {
            Ok(id) => {
                self.saved_id = Some(id);
                Ok(id)
            }
            Err(e) => {
                tracing::warn!("saving result {} failed: {}", result.result_id, e);
                Err(e)
            }
        }
    }

    pub fn saved_id(&self) -> Option<ResultId> {
        self.saved_id
    }

    pub fn has_unsaved_result(&self) -> bool {
        self.result.is_some() && self.saved_id.is_none()
    }

    /// Draw a fresh question set and return to `NotStarted`.
    ///
    /// On an empty pool the completed session is left as it was.
    pub fn retake<S>(&mut self, source: &S) -> Result<(), SessionError>
    where
        S: QuestionSource + ?Sized,
    {
        self.retake_with_rng(source, &mut rand::thread_rng())
    }

    pub fn retake_with_rng<S, R>(&mut self, source: &S, rng: &mut R) -> Result<(), SessionError>
    where
        S: QuestionSource + ?Sized,
        R: Rng + ?Sized,
    {
        self.require(SessionState::Completed, "retake")?;
        let questions = draw(source, &self.filter, self.config.question_count, rng)?;
        let previous = self.session_id;
        *self = Self::with_questions(questions, self.filter.clone(), self.config.clone());
        tracing::info!("session {} retaken as {}", previous, self.session_id);
        Ok(())
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn filter(&self) -> &FilterKey {
        &self.filter
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current_question(&self) -> &Question {
        &self.questions[self.current]
    }

    pub fn ledger(&self) -> &AnswerLedger {
        &self.ledger
    }

    pub fn time_remaining_secs(&self) -> u64 {
        self.clock.remaining_secs()
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn completion_reason(&self) -> Option<CompletionReason> {
        self.completion_reason
    }
}
