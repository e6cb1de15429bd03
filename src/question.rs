use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::QuestionFormatError;

/// Every question carries exactly this many choices.
pub const OPTION_COUNT: usize = 4;

/// Fallback per-question allocation when a bank entry does not declare one.
pub const DEFAULT_ALLOCATED_SECS: u32 = 60;

const OPTION_LETTERS: [&str; OPTION_COUNT] = ["A", "B", "C", "D"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "easy" | "beginner" => Some(Difficulty::Easy),
            "medium" | "intermediate" => Some(Difficulty::Medium),
            "hard" | "advanced" => Some(Difficulty::Hard),
            _ => None,
        }
    }
}

/// A multiple-choice question, immutable once drawn into a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: String,
    pub text: String,
    pub options: [String; OPTION_COUNT],
    pub correct_option_index: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    pub allocated_time_seconds: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<Difficulty>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_ref: Option<String>,
}

impl Question {
    /// Empty when the index is out of range.
    pub fn correct_option_text(&self) -> &str {
        self.option_text(self.correct_option_index).unwrap_or_default()
    }

    pub fn has_valid_answer(&self) -> bool {
        (self.correct_option_index as usize) < OPTION_COUNT
    }

    pub fn option_text(&self, index: u8) -> Option<&str> {
        self.options.get(index as usize).map(String::as_str)
    }

    /// Normalize a loosely-shaped bank entry.
    ///
    /// Accepted option layouts: an `options` array, an `options` object keyed
    /// `A`..`D`, or flat `option1`..`option4` fields. The answer may be an
    /// index (`correctOptionIndex`, `correct_option_index`, `correctIndex`), a
    /// letter or the option text (`answer`, `correctAnswer`, `correct`).
    /// `fallback_id` is used when the entry has no `id`.
    pub fn from_json(value: &Value, fallback_id: &str) -> Result<Self, QuestionFormatError> {
        let obj = value.as_object().ok_or(QuestionFormatError::NotAnObject)?;

        let text = first_str(obj, &["text", "question", "questionText", "prompt"])
            .filter(|t| !t.trim().is_empty())
            .ok_or(QuestionFormatError::MissingText)?;

        let options = extract_options(obj)?;
        let correct_option_index = resolve_answer(obj, &options)?;

        let id = match obj.get("id").or_else(|| obj.get("_id")) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => fallback_id.to_string(),
        };

        let allocated_time_seconds = first_u64(obj, &["allocatedTimeSeconds", "allocated_time_seconds", "timeLimit", "time"])
            .map(|t| t.min(u32::MAX as u64) as u32)
            .filter(|t| *t > 0)
            .unwrap_or(DEFAULT_ALLOCATED_SECS);

        Ok(Question {
            id,
            text,
            options,
            correct_option_index,
            explanation: first_str(obj, &["explanation", "analysis"]).filter(|e| !e.is_empty()),
            allocated_time_seconds,
            category: first_str(obj, &["category", "topic"]),
            difficulty: first_str(obj, &["difficulty", "level"]).and_then(|d| Difficulty::parse(&d)),
            image_ref: first_str(obj, &["imageRef", "image_ref", "image"]),
        })
    }
}

fn first_str(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| obj.get(*k).and_then(Value::as_str))
        .map(str::to_string)
}

fn first_u64(obj: &Map<String, Value>, keys: &[&str]) -> Option<u64> {
    keys.iter().find_map(|k| match obj.get(*k)? {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().map(|f| f.max(0.0) as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

fn value_to_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn extract_options(obj: &Map<String, Value>) -> Result<[String; OPTION_COUNT], QuestionFormatError> {
    let collected: Vec<String> = match obj.get("options") {
        Some(Value::Array(items)) => items.iter().filter_map(value_to_text).collect(),
        Some(Value::Object(map)) => OPTION_LETTERS
            .iter()
            .filter_map(|l| {
                map.get(*l)
                    .or_else(|| map.get(&l.to_lowercase()))
                    .and_then(value_to_text)
            })
            .collect(),
        _ => (1..=OPTION_COUNT)
            .filter_map(|i| obj.get(&format!("option{i}")).and_then(value_to_text))
            .collect(),
    };

    let count = collected.len();
    collected
        .try_into()
        .map_err(|_| QuestionFormatError::WrongOptionCount(count))
}

fn resolve_answer(obj: &Map<String, Value>, options: &[String; OPTION_COUNT]) -> Result<u8, QuestionFormatError> {
    for key in ["correctOptionIndex", "correct_option_index", "correctIndex"] {
        if let Some(idx) = obj.get(key).and_then(Value::as_u64) {
            if (idx as usize) < OPTION_COUNT {
                return Ok(idx as u8);
            }
            return Err(QuestionFormatError::UnresolvedAnswer(idx.to_string()));
        }
    }

    let raw = ["answer", "correctAnswer", "correct"]
        .iter()
        .find_map(|k| obj.get(*k).and_then(value_to_text))
        .ok_or_else(|| QuestionFormatError::UnresolvedAnswer(String::new()))?;
    let trimmed = raw.trim();

    // Option text wins over the letter form: "A" may itself be an option.
    if let Some(pos) = options.iter().position(|o| o.trim() == trimmed) {
        return Ok(pos as u8);
    }
    if let Some(pos) = OPTION_LETTERS.iter().position(|l| l.eq_ignore_ascii_case(trimmed)) {
        return Ok(pos as u8);
    }
    if let Some(n) = trimmed.strip_prefix("option").and_then(|n| n.parse::<usize>().ok()) {
        if (1..=OPTION_COUNT).contains(&n) {
            return Ok((n - 1) as u8);
        }
    }
    Err(QuestionFormatError::UnresolvedAnswer(raw))
}
