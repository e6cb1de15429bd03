use std::time::Duration;

use crate::ledger::AnswerLedger;

/// Length of one logical clock tick.
pub const TICK: Duration = Duration::from_secs(1);

/// What a clock advance produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockSignal {
    /// Time was credited and budget remains.
    Running,
    /// The budget ran out during this advance. Emitted once.
    Expired,
    /// The clock is not running; nothing changed.
    Stopped,
}

/// Global countdown plus per-question elapsed time.
///
/// Both counters move in one call to [`SessionClock::advance`], so a change of
/// the active question between calls never splits an interval.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionClock {
    budget: Duration,
    remaining: Duration,
    running: bool,
    expired: bool,
}

impl SessionClock {
    pub fn new(budget: Duration) -> Self {
        Self {
            budget,
            remaining: budget,
            running: false,
            expired: false,
        }
    }

    pub fn start(&mut self) {
        if !self.expired {
            self.running = true;
        }
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub fn remaining(&self) -> Duration {
        self.remaining
    }

    /// Remaining time rounded up to whole seconds, as a countdown shows it.
    pub fn remaining_secs(&self) -> u64 {
        let secs = self.remaining.as_secs();
        if self.remaining.subsec_nanos() > 0 {
            secs + 1
        } else {
            secs
        }
    }

    pub fn used(&self) -> Duration {
        self.budget.saturating_sub(self.remaining)
    }

    /// Debit `delta` from the budget and credit the same span to `current`.
    ///
    /// Time beyond the remaining budget is dropped. On the advance that
    /// exhausts the budget the clock stops itself and returns `Expired`.
    pub fn advance(&mut self, delta: Duration, ledger: &mut AnswerLedger, current: usize) -> ClockSignal {
        if !self.running {
            return ClockSignal::Stopped;
        }

        let credited = delta.min(self.remaining);
        self.remaining -= credited;
        ledger.add_elapsed(current, credited);

        if self.remaining.is_zero() {
            self.running = false;
            self.expired = true;
            ClockSignal::Expired
        } else {
            ClockSignal::Running
        }
    }

    pub fn tick(&mut self, ledger: &mut AnswerLedger, current: usize) -> ClockSignal {
        self.advance(TICK, ledger, current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_clock_does_not_move() {
        let mut clock = SessionClock::new(Duration::from_secs(10));
        let mut ledger = AnswerLedger::new(1);

        assert_eq!(clock.tick(&mut ledger, 0), ClockSignal::Stopped);
        assert_eq!(clock.remaining_secs(), 10);
        assert_eq!(ledger.elapsed_seconds(), vec![0]);
    }

    #[test]
    fn tick_moves_both_counters() {
        let mut clock = SessionClock::new(Duration::from_secs(10));
        let mut ledger = AnswerLedger::new(2);
        clock.start();

        clock.tick(&mut ledger, 0);
        clock.tick(&mut ledger, 0);
        clock.tick(&mut ledger, 1);

        assert_eq!(clock.remaining_secs(), 7);
        assert_eq!(ledger.elapsed_seconds(), vec![2, 1]);
        assert_eq!(clock.used(), Duration::from_secs(3));
    }

    #[test]
    fn expires_exactly_once() {
        let mut clock = SessionClock::new(Duration::from_secs(2));
        let mut ledger = AnswerLedger::new(1);
        clock.start();

        assert_eq!(clock.tick(&mut ledger, 0), ClockSignal::Running);
        assert_eq!(clock.tick(&mut ledger, 0), ClockSignal::Expired);
        assert_eq!(clock.tick(&mut ledger, 0), ClockSignal::Stopped);

        clock.start();
        assert!(!clock.is_running());
        assert_eq!(ledger.elapsed_seconds(), vec![2]);
    }

    #[test]
    fn overshoot_is_not_credited() {
        let mut clock = SessionClock::new(Duration::from_millis(1500));
        let mut ledger = AnswerLedger::new(1);
        clock.start();

        assert_eq!(
            clock.advance(Duration::from_secs(5), &mut ledger, 0),
            ClockSignal::Expired
        );
        assert_eq!(ledger.elapsed(0), Duration::from_millis(1500));
        assert_eq!(clock.remaining_secs(), 0);
    }

    #[test]
    fn partial_seconds_round_up_for_display() {
        let mut clock = SessionClock::new(Duration::from_secs(5));
        let mut ledger = AnswerLedger::new(1);
        clock.start();
        clock.advance(Duration::from_millis(300), &mut ledger, 0);
        assert_eq!(clock.remaining_secs(), 5);
        assert_eq!(clock.remaining(), Duration::from_millis(4700));
    }
}
