use std::time::Duration;

use crate::error::SessionError;
use crate::question::OPTION_COUNT;

/// Per-question answers and elapsed time for one session.
///
/// Both sequences are fixed at the session's question count. Once frozen the
/// ledger silently ignores every mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct AnswerLedger {
    selected: Vec<Option<u8>>,
    elapsed: Vec<Duration>,
    frozen: bool,
}

impl AnswerLedger {
    pub fn new(len: usize) -> Self {
        Self {
            selected: vec![None; len],
            elapsed: vec![Duration::ZERO; len],
            frozen: false,
        }
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn check_index(&self, index: usize) -> Result<(), SessionError> {
        if index < self.len() {
            Ok(())
        } else {
            Err(SessionError::InvalidNavigation {
                index,
                len: self.len(),
            })
        }
    }

    /// Record `option` for `index`, replacing any earlier choice.
    ///
    /// Frozen ledgers are left untouched; the session reports that case as an
    /// invalid transition before reaching here.
    pub fn select(&mut self, index: usize, option: usize) -> Result<(), SessionError> {
        self.check_index(index)?;
        if option >= OPTION_COUNT {
            return Err(SessionError::InvalidOption { option });
        }
        if !self.frozen {
            self.selected[index] = Some(option as u8);
        }
        Ok(())
    }

    pub fn clear(&mut self, index: usize) -> Result<(), SessionError> {
        self.check_index(index)?;
        if !self.frozen {
            self.selected[index] = None;
        }
        Ok(())
    }

    /// Credit `delta` to question `index`. Ignored when frozen or out of range.
    pub fn add_elapsed(&mut self, index: usize, delta: Duration) {
        if self.frozen {
            return;
        }
        if let Some(slot) = self.elapsed.get_mut(index) {
            *slot += delta;
        }
    }

    pub fn selected(&self, index: usize) -> Option<u8> {
        self.selected.get(index).copied().flatten()
    }

    pub fn selections(&self) -> &[Option<u8>] {
        &self.selected
    }

    pub fn elapsed(&self, index: usize) -> Duration {
        self.elapsed.get(index).copied().unwrap_or_default()
    }

    /// Whole seconds spent on each question.
    pub fn elapsed_seconds(&self) -> Vec<u64> {
        self.elapsed.iter().map(Duration::as_secs).collect()
    }

    pub fn answered_count(&self) -> usize {
        self.selected.iter().filter(|s| s.is_some()).count()
    }
}
