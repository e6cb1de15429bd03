//! Input handling for the terminal runner, kept free of rendering so the
//! whole flow can be driven headless.

use chrono::{DateTime, Utc};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use std::time::Duration;

use crate::bank::QuestionBank;
use crate::clock::ClockSignal;
use crate::session::{SessionState, TestSession};
use crate::store::ResultStore;

/// What the runner should do after an input was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub struct App {
    pub session: TestSession,
    bank: QuestionBank,
    store: Option<Box<dyn ResultStore>>,
    pub save_error: Option<String>,
    /// Whether pressing `w` can fix the last failed save.
    pub save_retryable: bool,
    pub notice: Option<String>,
    pub review_scroll: usize,
}

impl App {
    /// `store` is optional so the quiz still runs when the results database
    /// cannot be opened; results are then kept only on screen.
    pub fn new(mut session: TestSession, bank: QuestionBank, store: Option<Box<dyn ResultStore>>) -> Self {
        if session.state() == SessionState::NotStarted {
            // Fresh sessions always go straight to the instructions screen.
            let _ = session.show_instructions();
        }
        Self {
            session,
            bank,
            store,
            save_error: None,
            save_retryable: false,
            notice: None,
            review_scroll: 0,
        }
    }

    /// Feed elapsed wall time into the session clock.
    pub fn on_elapsed(&mut self, delta: Duration, now: DateTime<Utc>) {
        if self.session.advance(delta, now) == ClockSignal::Expired {
            self.notice = Some("Time is up".to_string());
            self.persist();
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent, now: DateTime<Utc>) -> Flow {
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            return Flow::Quit;
        }

        match self.session.state() {
            SessionState::NotStarted | SessionState::ShowingInstructions => match key.code {
                KeyCode::Enter | KeyCode::Char(' ') => {
                    if let Err(e) = self.session.begin(now) {
                        self.notice = Some(e.to_string());
                    }
                    Flow::Continue
                }
                KeyCode::Esc | KeyCode::Char('q') => Flow::Quit,
                _ => Flow::Continue,
            },
            SessionState::InProgress => self.handle_in_progress(key, now),
            SessionState::Completed => self.handle_completed(key),
        }
    }

    fn handle_in_progress(&mut self, key: KeyEvent, now: DateTime<Utc>) -> Flow {
        let current = self.session.current_index();
        let outcome = match key.code {
            KeyCode::Char(c @ '1'..='4') => self.session.select_answer(current, c as usize - '1' as usize),
            KeyCode::Char(c @ 'a'..='d') => self.session.select_answer(current, c as usize - 'a' as usize),
            KeyCode::Backspace | KeyCode::Char('x') => self.session.clear_answer(current),
            KeyCode::Right | KeyCode::Char('n') | KeyCode::Tab => self.session.next(),
            KeyCode::Left | KeyCode::Char('p') | KeyCode::BackTab => self.session.previous(),
            KeyCode::Home => self.session.navigate_to(0),
            KeyCode::End => self.session.navigate_to(self.session.len().saturating_sub(1)),
            KeyCode::Char('s') => self.session.submit(now).map(|_| ()),
            KeyCode::Esc => return Flow::Quit,
            _ => Ok(()),
        };

        match outcome {
            Ok(()) => self.notice = None,
            Err(e) => self.notice = Some(e.to_string()),
        }
        if self.session.state() == SessionState::Completed {
            self.persist();
        }
        Flow::Continue
    }

    fn handle_completed(&mut self, key: KeyEvent) -> Flow {
        match key.code {
            KeyCode::Up => {
                self.review_scroll = self.review_scroll.saturating_sub(1);
            }
            KeyCode::Down => {
                self.review_scroll = (self.review_scroll + 1).min(self.session.len().saturating_sub(1));
            }
            KeyCode::Char('w') if self.save_retryable => self.persist(),
            KeyCode::Char('r') => {
                match self.session.retake(&self.bank) {
                    Ok(()) => {
                        let _ = self.session.show_instructions();
                        self.review_scroll = 0;
                        self.save_error = None;
                        self.save_retryable = false;
                        self.notice = None;
                    }
                    Err(e) => self.notice = Some(e.to_string()),
                }
            }
            KeyCode::Esc | KeyCode::Char('q') => return Flow::Quit,
            _ => {}
        }
        Flow::Continue
    }

    /// Save the finished result, remembering any failure for a later retry.
    pub fn persist(&mut self) {
        let Some(store) = self.store.as_mut() else {
            return;
        };
        match self.session.save_result(store.as_mut()) {
            Ok(_) => {
                self.save_error = None;
                self.save_retryable = false;
            }
            Err(e) => {
                self.save_retryable = e.is_retryable();
                self.save_error = Some(e.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PersistenceError;
    use crate::result::{ResultId, TestResult};
    use crate::selector::FilterKey;
    use crate::session::SessionConfig;
    use crate::store::SqliteResultStore;
    use std::cell::Cell;
    use std::rc::Rc;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn app_with(store: Option<Box<dyn ResultStore>>, budget: u64) -> App {
        let bank = QuestionBank::builtin();
        let session = TestSession::start(&bank, FilterKey::module("subject"), SessionConfig::new(3, budget)).unwrap();
        App::new(session, bank, store)
    }

    /// Fails the first `failures` saves, then succeeds.
    struct FlakyStore {
        failures: Rc<Cell<usize>>,
        saved: Rc<Cell<usize>>,
    }

    impl ResultStore for FlakyStore {
        fn save(&mut self, result: &TestResult) -> Result<ResultId, PersistenceError> {
            if self.failures.get() > 0 {
                self.failures.set(self.failures.get() - 1);
                return Err(PersistenceError::Unavailable("disk full".into()));
            }
            self.saved.set(self.saved.get() + 1);
            Ok(result.result_id)
        }

        fn load_by_id(&self, id: ResultId) -> Result<TestResult, PersistenceError> {
            Err(PersistenceError::NotFound(id))
        }

        fn recent(&self, _limit: usize) -> Result<Vec<TestResult>, PersistenceError> {
            Ok(vec![])
        }
    }

    #[test]
    fn starts_on_instructions_and_enter_begins() {
        let mut app = app_with(None, 60);
        assert_eq!(app.session.state(), SessionState::ShowingInstructions);
        app.handle_key(key(KeyCode::Enter), Utc::now());
        assert_eq!(app.session.state(), SessionState::InProgress);
    }

    #[test]
    fn keys_select_and_navigate() {
        let mut app = app_with(None, 60);
        app.handle_key(key(KeyCode::Enter), Utc::now());

        app.handle_key(key(KeyCode::Char('2')), Utc::now());
        app.handle_key(key(KeyCode::Right), Utc::now());
        app.handle_key(key(KeyCode::Char('d')), Utc::now());
        app.handle_key(key(KeyCode::Left), Utc::now());

        assert_eq!(app.session.current_index(), 0);
        assert_eq!(app.session.ledger().selections()[..2], [Some(1), Some(3)]);

        app.handle_key(key(KeyCode::Backspace), Utc::now());
        assert_eq!(app.session.ledger().selected(0), None);
    }

    #[test]
    fn submit_saves_to_store() {
        let store = SqliteResultStore::open_in_memory().unwrap();
        let mut app = app_with(Some(Box::new(store)), 60);
        app.handle_key(key(KeyCode::Enter), Utc::now());
        app.handle_key(key(KeyCode::Char('1')), Utc::now());
        app.handle_key(key(KeyCode::Char('s')), Utc::now());

        assert_eq!(app.session.state(), SessionState::Completed);
        assert!(app.session.saved_id().is_some());
        assert!(app.save_error.is_none());
    }

    #[test]
    fn failed_save_can_be_retried() {
        let failures = Rc::new(Cell::new(1));
        let saved = Rc::new(Cell::new(0));
        let store = FlakyStore {
            failures: failures.clone(),
            saved: saved.clone(),
        };
        let mut app = app_with(Some(Box::new(store)), 60);
        app.handle_key(key(KeyCode::Enter), Utc::now());
        app.handle_key(key(KeyCode::Char('s')), Utc::now());

        assert_eq!(app.session.state(), SessionState::Completed);
        assert!(app.save_error.is_some());
        assert!(app.save_retryable);
        assert!(app.session.has_unsaved_result());

        app.handle_key(key(KeyCode::Char('w')), Utc::now());
        assert!(app.save_error.is_none());
        assert_eq!(saved.get(), 1);

        app.handle_key(key(KeyCode::Char('w')), Utc::now());
        assert_eq!(saved.get(), 1);
    }

    /// Always fails with an error that a retry cannot fix.
    struct CorruptStore {
        attempts: Rc<Cell<usize>>,
    }

    impl ResultStore for CorruptStore {
        fn save(&mut self, _result: &TestResult) -> Result<ResultId, PersistenceError> {
            self.attempts.set(self.attempts.get() + 1);
            let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
            Err(PersistenceError::Serialization(err))
        }

        fn load_by_id(&self, id: ResultId) -> Result<TestResult, PersistenceError> {
            Err(PersistenceError::NotFound(id))
        }

        fn recent(&self, _limit: usize) -> Result<Vec<TestResult>, PersistenceError> {
            Ok(vec![])
        }
    }

    #[test]
    fn non_retryable_save_failure_is_not_retried() {
        let attempts = Rc::new(Cell::new(0));
        let store = CorruptStore {
            attempts: attempts.clone(),
        };
        let mut app = app_with(Some(Box::new(store)), 60);
        app.handle_key(key(KeyCode::Enter), Utc::now());
        app.handle_key(key(KeyCode::Char('s')), Utc::now());

        assert!(app.save_error.is_some());
        assert!(!app.save_retryable);
        assert_eq!(attempts.get(), 1);

        app.handle_key(key(KeyCode::Char('w')), Utc::now());
        assert_eq!(attempts.get(), 1);
        assert!(app.session.has_unsaved_result());
    }

    #[test]
    fn expiry_completes_and_saves() {
        let store = SqliteResultStore::open_in_memory().unwrap();
        let mut app = app_with(Some(Box::new(store)), 2);
        app.handle_key(key(KeyCode::Enter), Utc::now());

        app.on_elapsed(Duration::from_millis(1500), Utc::now());
        assert_eq!(app.session.state(), SessionState::InProgress);
        app.on_elapsed(Duration::from_millis(1500), Utc::now());

        assert_eq!(app.session.state(), SessionState::Completed);
        assert!(app.session.saved_id().is_some());
        assert_eq!(app.notice.as_deref(), Some("Time is up"));
    }

    #[test]
    fn retake_returns_to_instructions() {
        let mut app = app_with(None, 60);
        app.handle_key(key(KeyCode::Enter), Utc::now());
        app.handle_key(key(KeyCode::Char('s')), Utc::now());
        app.handle_key(key(KeyCode::Down), Utc::now());
        assert_eq!(app.review_scroll, 1);

        app.handle_key(key(KeyCode::Char('r')), Utc::now());
        assert_eq!(app.session.state(), SessionState::ShowingInstructions);
        assert_eq!(app.review_scroll, 0);
    }

    #[test]
    fn quit_keys() {
        let mut app = app_with(None, 60);
        assert_eq!(app.handle_key(key(KeyCode::Char('q')), Utc::now()), Flow::Quit);
        let ctrl_c = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(app.handle_key(ctrl_c, Utc::now()), Flow::Quit);
    }
}
