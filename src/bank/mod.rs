use include_dir::{include_dir, Dir};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::BankError;
use crate::question::Question;

static BANK_DIR: Dir = include_dir!("$CARGO_MANIFEST_DIR/src/bank/data");

/// Supplies the question corpus for a module. May return an empty list.
pub trait QuestionSource {
    fn questions(&self, module: &str) -> Vec<Question>;
}

/// On-disk shape of one module's questions. Entries stay loosely typed until
/// [`Question::from_json`] normalizes them.
#[derive(Deserialize, Debug)]
struct BankFile {
    name: String,
    #[serde(default)]
    questions: Vec<Value>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BankDocument {
    One(BankFile),
    Many(Vec<BankFile>),
}

/// Questions grouped by module name.
#[derive(Debug, Clone, Default)]
pub struct QuestionBank {
    modules: BTreeMap<String, Vec<Question>>,
}

impl QuestionBank {
    /// The banks shipped with the binary.
    pub fn builtin() -> Self {
        let mut bank = QuestionBank::default();
        for file in BANK_DIR.files() {
            let Some(contents) = file.contents_utf8() else {
                tracing::warn!("skipping non-utf8 bank {}", file.path().display());
                continue;
            };
            match serde_json::from_str::<BankDocument>(contents) {
                Ok(doc) => bank.absorb(doc),
                Err(e) => tracing::warn!("skipping {}: {}", file.path().display(), e),
            }
        }
        bank
    }

    /// Load a bank file holding one module object or an array of them.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, BankError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn from_json_str(contents: &str) -> Result<Self, BankError> {
        let doc: BankDocument = serde_json::from_str(contents)?;
        let mut bank = QuestionBank::default();
        bank.absorb(doc);
        Ok(bank)
    }

    /// Questions whose correct index is not one of the four options are dropped.
    pub fn from_questions(module: &str, questions: Vec<Question>) -> Self {
        let name = module.to_lowercase();
        let questions = questions
            .into_iter()
            .filter(|q| {
                let ok = q.has_valid_answer();
                if !ok {
                    tracing::warn!("skipping question {} in {}: answer index {}", q.id, name, q.correct_option_index);
                }
                ok
            })
            .collect();
        let mut modules = BTreeMap::new();
        modules.insert(name, questions);
        Self { modules }
    }

    /// Merge another bank into this one; questions for an existing module are appended.
    pub fn merge(&mut self, other: QuestionBank) {
        for (name, questions) in other.modules {
            self.modules.entry(name).or_default().extend(questions);
        }
    }

    pub fn modules(&self) -> impl Iterator<Item = (&str, usize)> {
        self.modules.iter().map(|(k, v)| (k.as_str(), v.len()))
    }

    fn absorb(&mut self, doc: BankDocument) {
        let files = match doc {
            BankDocument::One(f) => vec![f],
            BankDocument::Many(fs) => fs,
        };
        for file in files {
            let name = file.name.to_lowercase();
            let entry = self.modules.entry(name.clone()).or_default();
            for (i, raw) in file.questions.iter().enumerate() {
                match Question::from_json(raw, &format!("{name}-{}", i + 1)) {
                    Ok(q) => entry.push(q),
                    Err(e) => tracing::warn!("skipping question {} in {}: {}", i + 1, name, e),
                }
            }
        }
    }
}

impl QuestionSource for QuestionBank {
    fn questions(&self, module: &str) -> Vec<Question> {
        self.modules
            .get(&module.to_lowercase())
            .cloned()
            .unwrap_or_default()
    }
}
