use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::clock::SessionClock;
use crate::ledger::AnswerLedger;
use crate::question::Question;
use crate::scoring::{correctness, is_passing, score_ledger, PerformanceMetrics};
use crate::util::percent_half_up;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultId(Uuid);

impl ResultId {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ResultId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ResultId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(ResultId)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CompletionReason {
    Submitted,
    Expired,
}

/// One question as it appeared to the user, with option text resolved at
/// finalize time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewEntry {
    #[serde(default)]
    pub question_id: String,
    pub text: String,
    pub selected_option_text: Option<String>,
    pub correct_option_text: String,
    pub is_correct: bool,
    pub time_spent_seconds: u64,
    pub allocated_time_seconds: u32,
    pub explanation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimingDetails {
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub global_budget_seconds: u64,
    pub time_remaining_seconds: u64,
    pub completion_reason: CompletionReason,
}

/// The finished record of one session. Never modified after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    pub result_id: ResultId,
    pub module_or_subject: String,
    pub topic_ref: Option<String>,
    pub score_percent: u32,
    pub passed: bool,
    pub total_time_minutes: f64,
    pub questions: Vec<ReviewEntry>,
    pub performance_metrics: PerformanceMetrics,
    pub timing_details: TimingDetails,
}

/// Everything needed to materialize a result at the moment of completion.
pub struct Finalize<'a> {
    pub module: &'a str,
    pub topic: Option<&'a str>,
    pub questions: &'a [Question],
    pub ledger: &'a AnswerLedger,
    pub clock: &'a SessionClock,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub reason: CompletionReason,
}

pub fn finalize(input: &Finalize<'_>) -> TestResult {
    let metrics = score_ledger(input.questions, input.ledger);
    let flags = correctness(input.questions, input.ledger.selections());
    let elapsed = input.ledger.elapsed_seconds();

    let questions = input
        .questions
        .iter()
        .enumerate()
        .map(|(i, q)| ReviewEntry {
            question_id: q.id.clone(),
            text: q.text.clone(),
            selected_option_text: input
                .ledger
                .selected(i)
                .and_then(|s| q.option_text(s))
                .map(str::to_string),
            correct_option_text: q.correct_option_text().to_string(),
            is_correct: flags[i],
            time_spent_seconds: elapsed[i],
            allocated_time_seconds: q.allocated_time_seconds,
            explanation: q.explanation.clone(),
        })
        .collect();

    let used_secs = input.clock.used().as_secs_f64();

    TestResult {
        result_id: ResultId::new(),
        module_or_subject: input.module.to_string(),
        topic_ref: input.topic.map(str::to_string),
        score_percent: metrics.score_percent,
        passed: metrics.passed(),
        total_time_minutes: (used_secs / 60.0 * 100.0).round() / 100.0,
        questions,
        performance_metrics: metrics,
        timing_details: TimingDetails {
            started_at: input.started_at,
            ended_at: input.ended_at,
            global_budget_seconds: input.clock.budget().as_secs(),
            time_remaining_seconds: input.clock.remaining_secs(),
            completion_reason: input.reason,
        },
    }
}

/// The score to show for a stored record.
///
/// A stored score of 0 is treated as missing: when the record has question
/// entries the score is recomputed from their `is_correct` flags. The record
/// itself is never changed.
pub fn repair_score_on_read(stored: &TestResult) -> u32 {
    if stored.score_percent != 0 || stored.questions.is_empty() {
        return stored.score_percent;
    }
    let correct = stored.questions.iter().filter(|q| q.is_correct).count();
    let repaired = percent_half_up(correct, stored.questions.len());
    if repaired != 0 {
        tracing::debug!(
            "repaired display score for {} from 0 to {}",
            stored.result_id,
            repaired
        );
    }
    repaired
}

impl TestResult {
    pub fn display_score(&self) -> u32 {
        repair_score_on_read(self)
    }

    pub fn display_passed(&self) -> bool {
        is_passing(self.display_score())
    }

    /// Read a stored record, tolerating legacy shapes.
    ///
    /// Records written by this crate decode directly. Anything else goes
    /// through a lenient mapping: alternate key spellings are accepted,
    /// numbers may be strings, absent numbers become 0 and absent flags
    /// false. Never fails; a non-object yields an empty record under
    /// `fallback_id`.
    pub fn from_stored_json(value: &Value, fallback_id: ResultId) -> TestResult {
        if let Ok(result) = serde_json::from_value::<TestResult>(value.clone()) {
            return result;
        }
        tracing::debug!("decoding {} through the legacy mapping", fallback_id);
        legacy_result(value.as_object(), fallback_id)
    }
}

fn field<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| obj.get(*k).filter(|v| !v.is_null()))
}

fn number(v: Option<&Value>) -> f64 {
    match v {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().trim_end_matches('%').parse().unwrap_or(0.0),
        _ => 0.0,
    }
    .max(0.0)
}

fn text(v: Option<&Value>) -> Option<String> {
    match v? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn flag(v: Option<&Value>) -> bool {
    match v {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => matches!(s.trim().to_lowercase().as_str(), "true" | "yes" | "1"),
        _ => false,
    }
}

fn timestamp(v: Option<&Value>) -> DateTime<Utc> {
    match v {
        Some(Value::String(s)) => DateTime::parse_from_rfc3339(s)
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_default(),
        Some(Value::Number(n)) => n
            .as_i64()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .unwrap_or_default(),
        _ => DateTime::<Utc>::default(),
    }
}

fn legacy_entry(v: &Value) -> ReviewEntry {
    let empty = Map::new();
    let obj = v.as_object().unwrap_or(&empty);
    ReviewEntry {
        question_id: text(field(obj, &["questionId", "question_id", "id"])).unwrap_or_default(),
        text: text(field(obj, &["text", "question", "questionText"])).unwrap_or_default(),
        selected_option_text: text(field(
            obj,
            &["selectedOptionText", "selectedOption", "selectedAnswer", "userAnswer"],
        )),
        correct_option_text: text(field(obj, &["correctOptionText", "correctOption", "correctAnswer"]))
            .unwrap_or_default(),
        is_correct: flag(field(obj, &["isCorrect", "is_correct", "correct"])),
        time_spent_seconds: number(field(obj, &["timeSpentSeconds", "timeSpent", "timeTaken"])) as u64,
        allocated_time_seconds: number(field(obj, &["allocatedTimeSeconds", "allocatedTime", "timeLimit"])) as u32,
        explanation: text(field(obj, &["explanation", "analysis"])),
    }
}

fn legacy_result(obj: Option<&Map<String, Value>>, fallback_id: ResultId) -> TestResult {
    let empty = Map::new();
    let obj = obj.unwrap_or(&empty);

    let questions: Vec<ReviewEntry> = match field(obj, &["questions", "answers", "review"]) {
        Some(Value::Array(items)) => items.iter().map(legacy_entry).collect(),
        _ => Vec::new(),
    };

    let score_percent = number(field(obj, &["scorePercent", "score", "percentage"])).round() as u32;

    let correct = questions.iter().filter(|q| q.is_correct).count();
    let unanswered = questions
        .iter()
        .filter(|q| !q.is_correct && q.selected_option_text.is_none())
        .count();
    let derived_metrics = PerformanceMetrics {
        correct_count: correct,
        incorrect_count: questions.len() - correct - unanswered,
        unanswered_count: unanswered,
        score_percent,
        average_time_per_question_seconds: if questions.is_empty() {
            0.0
        } else {
            questions.iter().map(|q| q.time_spent_seconds as f64).sum::<f64>() / questions.len() as f64
        },
    };
    let performance_metrics = field(obj, &["performanceMetrics", "metrics"])
        .and_then(|m| serde_json::from_value::<PerformanceMetrics>(m.clone()).ok())
        .unwrap_or(derived_metrics);

    let timing = field(obj, &["timingDetails", "timing"])
        .and_then(Value::as_object)
        .unwrap_or(&empty);
    let timing_details = TimingDetails {
        started_at: timestamp(field(timing, &["startedAt", "startTime", "start"])),
        ended_at: timestamp(field(timing, &["endedAt", "endTime", "end"])),
        global_budget_seconds: number(field(timing, &["globalBudgetSeconds", "budget"])) as u64,
        time_remaining_seconds: number(field(timing, &["timeRemainingSeconds", "remaining"])) as u64,
        completion_reason: match text(field(timing, &["completionReason", "reason"])).as_deref() {
            Some("expired") | Some("timeout") => CompletionReason::Expired,
            _ => CompletionReason::Submitted,
        },
    };

    let result_id = text(field(obj, &["resultId", "id", "_id"]))
        .and_then(|s| s.parse().ok())
        .unwrap_or(fallback_id);

    TestResult {
        result_id,
        module_or_subject: text(field(obj, &["moduleOrSubject", "moduleName", "module", "subject", "testType"]))
            .unwrap_or_default(),
        topic_ref: text(field(obj, &["topicRef", "topic", "topicId"])),
        score_percent,
        passed: flag(field(obj, &["passed"])),
        total_time_minutes: number(field(obj, &["totalTimeMinutes", "timeTaken", "totalTime"])),
        questions,
        performance_metrics,
        timing_details,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn entry(is_correct: bool) -> ReviewEntry {
        ReviewEntry {
            question_id: "q".into(),
            text: "t".into(),
            selected_option_text: Some("a".into()),
            correct_option_text: "a".into(),
            is_correct,
            time_spent_seconds: 10,
            allocated_time_seconds: 60,
            explanation: None,
        }
    }

    fn stored(score: u32, correct: usize, total: usize) -> TestResult {
        TestResult {
            result_id: ResultId::new(),
            module_or_subject: "grammar".into(),
            topic_ref: None,
            score_percent: score,
            passed: false,
            total_time_minutes: 1.5,
            questions: (0..total).map(|i| entry(i < correct)).collect(),
            performance_metrics: PerformanceMetrics {
                correct_count: correct,
                incorrect_count: total - correct,
                unanswered_count: 0,
                score_percent: score,
                average_time_per_question_seconds: 10.0,
            },
            timing_details: TimingDetails {
                started_at: DateTime::<Utc>::default(),
                ended_at: DateTime::<Utc>::default(),
                global_budget_seconds: 1200,
                time_remaining_seconds: 0,
                completion_reason: CompletionReason::Submitted,
            },
        }
    }

    fn sample_questions() -> Vec<Question> {
        vec![
            Question {
                id: "q1".into(),
                text: "first".into(),
                options: ["a".into(), "b".into(), "c".into(), "d".into()],
                correct_option_index: 1,
                explanation: Some("because".into()),
                allocated_time_seconds: 30,
                category: None,
                difficulty: None,
                image_ref: None,
            },
            Question {
                id: "q2".into(),
                text: "second".into(),
                options: ["w".into(), "x".into(), "y".into(), "z".into()],
                correct_option_index: 3,
                explanation: None,
                allocated_time_seconds: 30,
                category: None,
                difficulty: None,
                image_ref: None,
            },
        ]
    }

    #[test]
    fn repair_recomputes_zero_score() {
        let record = stored(0, 6, 10);
        assert_eq!(repair_score_on_read(&record), 60);
        assert_eq!(record.score_percent, 0);
        assert_eq!(repair_score_on_read(&record), 60);
    }

    #[test]
    fn repair_keeps_nonzero_score() {
        let record = stored(85, 2, 10);
        assert_eq!(repair_score_on_read(&record), 85);
    }

    #[test]
    fn repair_with_no_questions_keeps_zero() {
        let record = stored(0, 0, 0);
        assert_eq!(repair_score_on_read(&record), 0);
        assert!(!record.display_passed());
    }

    #[test]
    fn finalize_resolves_option_text() {
        let questions = sample_questions();
        let mut ledger = AnswerLedger::new(2);
        ledger.select(0, 1).unwrap();
        ledger.select(1, 0).unwrap();
        let mut clock = SessionClock::new(Duration::from_secs(120));
        clock.start();
        for _ in 0..30 {
            clock.tick(&mut ledger, 0);
        }
        ledger.freeze();

        let now = Utc::now();
        let result = finalize(&Finalize {
            module: "grammar",
            topic: Some("tenses"),
            questions: &questions,
            ledger: &ledger,
            clock: &clock,
            started_at: now,
            ended_at: now,
            reason: CompletionReason::Submitted,
        });

        assert_eq!(result.score_percent, 50);
        assert!(!result.passed);
        assert_eq!(result.total_time_minutes, 0.5);
        assert_eq!(result.questions[0].selected_option_text.as_deref(), Some("b"));
        assert!(result.questions[0].is_correct);
        assert_eq!(result.questions[0].time_spent_seconds, 30);
        assert_eq!(result.questions[1].selected_option_text.as_deref(), Some("w"));
        assert_eq!(result.questions[1].correct_option_text, "z");
        assert_eq!(result.timing_details.time_remaining_seconds, 90);
        assert_eq!(result.topic_ref.as_deref(), Some("tenses"));
    }

    #[test]
    fn stored_json_roundtrips() {
        let record = stored(70, 7, 10);
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(TestResult::from_stored_json(&value, ResultId::new()), record);
    }

    #[test]
    fn legacy_record_with_missing_fields_degrades() {
        let fallback = ResultId::new();
        let legacy = json!({
            "module": "aptitude",
            "score": 0,
            "questions": [
                {"question": "1+1", "userAnswer": "2", "correctAnswer": "2", "isCorrect": true, "timeSpent": "12"},
                {"question": "2+2", "correctAnswer": "4", "isCorrect": false},
                {"question": "3+3", "userAnswer": "7", "correctAnswer": "6"}
            ]
        });

        let record = TestResult::from_stored_json(&legacy, fallback);
        assert_eq!(record.result_id, fallback);
        assert_eq!(record.module_or_subject, "aptitude");
        assert_eq!(record.score_percent, 0);
        assert_eq!(record.display_score(), 33);
        assert_eq!(record.questions[0].time_spent_seconds, 12);
        assert_eq!(record.performance_metrics.correct_count, 1);
        assert_eq!(record.performance_metrics.unanswered_count, 1);
        assert_eq!(record.performance_metrics.incorrect_count, 1);
        assert_eq!(record.timing_details.started_at, DateTime::<Utc>::default());
    }

    #[test]
    fn non_object_record_yields_empty_result() {
        let fallback = ResultId::new();
        let record = TestResult::from_stored_json(&json!("garbage"), fallback);
        assert_eq!(record.result_id, fallback);
        assert_eq!(record.display_score(), 0);
        assert!(record.questions.is_empty());
    }

    #[test]
    fn legacy_percent_string_score() {
        let record = TestResult::from_stored_json(
            &json!({"subject": "science", "percentage": "85%", "passed": "yes"}),
            ResultId::new(),
        );
        assert_eq!(record.display_score(), 85);
        assert!(record.passed);
        assert_eq!(record.module_or_subject, "science");
    }
}
