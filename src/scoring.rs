use serde::{Deserialize, Serialize};

use crate::ledger::AnswerLedger;
use crate::question::Question;
use crate::util::{mean, percent_half_up};

/// Minimum score that counts as a pass. Fixed across modules.
pub const PASS_THRESHOLD_PERCENT: u32 = 70;

pub fn is_passing(score_percent: u32) -> bool {
    score_percent >= PASS_THRESHOLD_PERCENT
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetrics {
    pub correct_count: usize,
    pub incorrect_count: usize,
    pub unanswered_count: usize,
    pub score_percent: u32,
    pub average_time_per_question_seconds: f64,
}

impl PerformanceMetrics {
    pub fn total(&self) -> usize {
        self.correct_count + self.incorrect_count + self.unanswered_count
    }

    pub fn passed(&self) -> bool {
        is_passing(self.score_percent)
    }
}

/// Whether each answer matches its question's correct option.
pub fn correctness(questions: &[Question], selections: &[Option<u8>]) -> Vec<bool> {
    questions
        .iter()
        .zip(selections)
        .map(|(q, s)| *s == Some(q.correct_option_index))
        .collect()
}

/// Score a set of answers.
///
/// `selections` and `elapsed_secs` are indexed like `questions`. Pure and
/// deterministic: the same inputs always yield the same metrics.
pub fn score(questions: &[Question], selections: &[Option<u8>], elapsed_secs: &[u64]) -> PerformanceMetrics {
    let n = questions.len();
    let flags = correctness(questions, selections);

    let correct_count = flags.iter().filter(|c| **c).count();
    let unanswered_count = (0..n)
        .filter(|i| selections.get(*i).copied().flatten().is_none())
        .count();
    let incorrect_count = n - correct_count - unanswered_count;

    let times: Vec<f64> = (0..n)
        .map(|i| elapsed_secs.get(i).copied().unwrap_or(0) as f64)
        .collect();

    PerformanceMetrics {
        correct_count,
        incorrect_count,
        unanswered_count,
        score_percent: percent_half_up(correct_count, n),
        average_time_per_question_seconds: mean(&times).unwrap_or(0.0),
    }
}

pub fn score_ledger(questions: &[Question], ledger: &AnswerLedger) -> PerformanceMetrics {
    score(questions, ledger.selections(), &ledger.elapsed_seconds())
}
