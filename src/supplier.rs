use log::{info, warn};
use rand::prelude::*;
use std::path::PathBuf;
use tokio::{fs, sync::Mutex};

use crate::error::QuizError;
use crate::models::{Question, QuestionRecord};

/// Returns the first `count` questions of a uniformly shuffled copy of `pool`.
pub fn select_questions<R: Rng + ?Sized>(
    pool: &[Question],
    count: usize,
    rng: &mut R,
) -> Vec<Question> {
    let mut questions = pool.to_vec();
    questions.shuffle(rng);
    questions.truncate(count);
    questions
}

pub fn parse_questions(json: &str) -> Result<Vec<Question>, QuizError> {
    let records: Vec<QuestionRecord> = serde_json::from_str(json)
        .map_err(|err| QuizError::DataUnavailable(format!("malformed question bank: {}", err)))?;

    records.into_iter().map(Question::try_from).collect()
}

/// The question pool, loaded lazily from a JSON file.
///
/// A failed or empty load leaves the cache empty so the next quiz start
/// retries it.
#[derive(Debug)]
pub struct QuestionBank {
    path: Option<PathBuf>,
    pool: Mutex<Vec<Question>>,
}

impl QuestionBank {
    pub fn from_file(path: impl Into<PathBuf>) -> QuestionBank {
        QuestionBank {
            path: Some(path.into()),
            pool: Mutex::new(Vec::new()),
        }
    }

    pub fn from_pool(pool: Vec<Question>) -> QuestionBank {
        QuestionBank {
            path: None,
            pool: Mutex::new(pool),
        }
    }

    pub async fn pool(&self) -> Result<Vec<Question>, QuizError> {
        let mut pool = self.pool.lock().await;
        if !pool.is_empty() {
            return Ok(pool.clone());
        }

        let path = match &self.path {
            None => return Ok(Vec::new()),
            Some(path) => path,
        };

        let json = fs::read_to_string(path).await.map_err(|err| {
            warn!("failed to read question bank {}: {}", path.display(), err);
            QuizError::DataUnavailable(format!("couldn't read {}: {}", path.display(), err))
        })?;

        let questions = parse_questions(&json)?;
        info!(
            "loaded {} questions from {}",
            questions.len(),
            path.display()
        );

        *pool = questions.clone();
        Ok(questions)
    }

    pub async fn select(&self, count: usize) -> Result<Vec<Question>, QuizError> {
        let pool = self.pool().await?;
        let mut rng = thread_rng();
        Ok(select_questions(&pool, count, &mut rng))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use std::collections::BTreeSet;

    fn pool(size: usize) -> Vec<Question> {
        (0..size)
            .map(|i| Question {
                prompt: format!("Question {}", i),
                options: vec!["yes".into(), "no".into()],
                correct_index: i % 2,
                explanation: None,
            })
            .collect()
    }

    #[test]
    fn selects_min_of_count_and_pool() {
        let mut rng = StdRng::seed_from_u64(7);
        let pool = pool(5);

        for count in 0..8 {
            let selected = select_questions(&pool, count, &mut rng);
            assert_eq!(selected.len(), count.min(pool.len()));

            let prompts = selected
                .iter()
                .map(|q| q.prompt.as_str())
                .collect::<BTreeSet<_>>();
            assert_eq!(prompts.len(), selected.len());
            assert!(selected.iter().all(|q| pool.contains(q)));
        }
    }

    #[test]
    fn empty_pool_selects_nothing() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(select_questions(&[], 10, &mut rng).is_empty());
    }

    #[test]
    fn pool_is_not_reordered() {
        let mut rng = StdRng::seed_from_u64(3);
        let pool = pool(20);
        let before = pool.clone();

        let _ = select_questions(&pool, 20, &mut rng);
        assert_eq!(pool, before);
    }

    #[test]
    fn every_question_can_come_first() {
        let mut rng = StdRng::seed_from_u64(11);
        let pool = pool(4);

        let firsts = (0..400)
            .map(|_| select_questions(&pool, 1, &mut rng).remove(0).prompt)
            .collect::<BTreeSet<_>>();
        assert_eq!(firsts.len(), 4);
    }

    #[test]
    fn malformed_bank_is_data_unavailable() {
        assert!(matches!(
            parse_questions("{ not json"),
            Err(QuizError::DataUnavailable(_))
        ));
        assert!(matches!(
            parse_questions(r#"[{"question": "q", "options": ["a", "b"], "answer": 5}]"#),
            Err(QuizError::DataUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn missing_file_is_data_unavailable() {
        let bank = QuestionBank::from_file("/nonexistent/questions.json");
        assert!(matches!(
            bank.pool().await,
            Err(QuizError::DataUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn in_memory_bank_selects_from_pool() {
        let bank = QuestionBank::from_pool(pool(5));
        let selected = bank.select(10).await.unwrap();
        assert_eq!(selected.len(), 5);
    }
}
