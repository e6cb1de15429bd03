use itertools::Itertools;
use rand::seq::SliceRandom;
use rand::Rng;
use std::fmt;

use crate::bank::QuestionSource;
use crate::error::SessionError;
use crate::question::{Difficulty, Question};

/// Which slice of the corpus a session draws from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterKey {
    pub module: String,
    pub category: Option<String>,
    pub difficulty: Option<Difficulty>,
}

impl FilterKey {
    pub fn module(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            category: None,
            difficulty: None,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_difficulty(mut self, difficulty: Difficulty) -> Self {
        self.difficulty = Some(difficulty);
        self
    }

    pub fn matches(&self, question: &Question) -> bool {
        let category_ok = match &self.category {
            Some(want) => question
                .category
                .as_deref()
                .is_some_and(|c| c.eq_ignore_ascii_case(want)),
            None => true,
        };
        let difficulty_ok = match self.difficulty {
            Some(want) => question.difficulty == Some(want),
            None => true,
        };
        category_ok && difficulty_ok
    }
}

impl fmt::Display for FilterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "module={}", self.module)?;
        if let Some(c) = &self.category {
            write!(f, " category={c}")?;
        }
        if let Some(d) = self.difficulty {
            write!(f, " difficulty={d}")?;
        }
        Ok(())
    }
}

/// Draw `min(count, |matching|)` distinct questions in shuffled order.
///
/// Questions sharing an id are collapsed to the first occurrence before the
/// shuffle, so the draw never repeats an identity.
pub fn select_questions<R, F>(
    corpus: Vec<Question>,
    predicate: F,
    count: usize,
    rng: &mut R,
) -> Option<Vec<Question>>
where
    R: Rng + ?Sized,
    F: Fn(&Question) -> bool,
{
    let mut pool: Vec<Question> = corpus
        .into_iter()
        .filter(|q| predicate(q))
        .unique_by(|q| q.id.clone())
        .collect();

    if pool.is_empty() || count == 0 {
        return None;
    }

    pool.shuffle(rng);
    pool.truncate(count);
    Some(pool)
}

/// Fetch the module corpus from `source` and draw a session's questions.
pub fn draw<S, R>(
    source: &S,
    filter: &FilterKey,
    count: usize,
    rng: &mut R,
) -> Result<Vec<Question>, SessionError>
where
    S: QuestionSource + ?Sized,
    R: Rng + ?Sized,
{
    let corpus = source.questions(&filter.module);
    let available = corpus.len();
    select_questions(corpus, |q| filter.matches(q), count, rng).ok_or_else(|| {
        tracing::debug!("empty pool for {filter} (module has {available} questions)");
        SessionError::EmptyPool {
            filter: filter.to_string(),
        }
    })
}
