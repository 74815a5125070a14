use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

use crate::error::QuizError;

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    #[serde(default = "default_questions")]
    pub questions: PathBuf,

    #[serde(default = "default_question_count")]
    pub question_count: usize,

    #[serde(default = "default_seconds_per_question")]
    pub seconds_per_question: u32,

    #[serde(default = "default_points_per_question")]
    pub points_per_question: u32,

    #[serde(default = "default_tick_millis")]
    pub tick_millis: u64,

    #[serde(default)]
    pub restart: RestartPolicy,

    #[serde(default = "default_scores")]
    pub scores: PathBuf,

    #[serde(default = "default_leaderboard_size")]
    pub leaderboard_size: usize,

    #[serde(default = "default_preferences")]
    pub preferences: PathBuf,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            questions: default_questions(),
            question_count: default_question_count(),
            seconds_per_question: default_seconds_per_question(),
            points_per_question: default_points_per_question(),
            tick_millis: default_tick_millis(),
            restart: RestartPolicy::default(),
            scores: default_scores(),
            leaderboard_size: default_leaderboard_size(),
            preferences: default_preferences(),
        }
    }
}

impl Config {
    /// Points are capped so that a perfect run of `question_count`
    /// questions still fits in a `u32` score.
    pub fn rules(&self) -> Rules {
        let questions = u32::try_from(self.question_count.max(1)).unwrap_or(u32::MAX);
        Rules {
            seconds_per_question: self.seconds_per_question.max(1),
            points_per_question: self.points_per_question.min(u32::MAX / questions),
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_millis.max(1))
    }
}

fn default_questions() -> PathBuf {
    "questions.json".into()
}

fn default_question_count() -> usize {
    10
}

fn default_seconds_per_question() -> u32 {
    15
}

fn default_points_per_question() -> u32 {
    10
}

fn default_tick_millis() -> u64 {
    1000
}

fn default_scores() -> PathBuf {
    "highscores.csv".into()
}

fn default_leaderboard_size() -> usize {
    5
}

fn default_preferences() -> PathBuf {
    "preferences.toml".into()
}

/// What `restart` does with the question set of the session it replaces.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RestartPolicy {
    /// Draw a fresh random subset from the pool.
    Resample,
    /// Play the same questions again, in the same order.
    Replay,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        RestartPolicy::Replay
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rules {
    pub seconds_per_question: u32,
    pub points_per_question: u32,
}

impl Default for Rules {
    fn default() -> Self {
        Rules {
            seconds_per_question: default_seconds_per_question(),
            points_per_question: default_points_per_question(),
        }
    }
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct Question {
    pub prompt: String,
    pub options: Vec<String>,
    pub correct_index: usize,
    pub explanation: Option<String>,
}

/// A question as it appears in the JSON question bank.
#[derive(Clone, Debug, Deserialize)]
pub struct QuestionRecord {
    #[serde(alias = "prompt")]
    pub question: String,
    pub options: Vec<String>,
    #[serde(alias = "correct")]
    pub answer: AnswerKey,
    #[serde(default)]
    pub explanation: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum AnswerKey {
    Index(usize),
    Text(String),
}

impl TryFrom<QuestionRecord> for Question {
    type Error = QuizError;

    fn try_from(record: QuestionRecord) -> Result<Question, QuizError> {
        if record.options.len() < 2 {
            return Err(QuizError::invalid_question(
                &record.question,
                "needs at least two options",
            ));
        }

        let correct_index = match record.answer {
            AnswerKey::Index(index) if index < record.options.len() => index,
            AnswerKey::Index(index) => {
                return Err(QuizError::invalid_question(
                    &record.question,
                    &format!("answer index {} is out of range", index),
                ))
            }
            AnswerKey::Text(text) => record
                .options
                .iter()
                .position(|option| *option == text)
                .ok_or_else(|| {
                    QuizError::invalid_question(
                        &record.question,
                        &format!("answer {:?} is not one of the options", text),
                    )
                })?,
        };

        Ok(Question {
            prompt: record.question,
            options: record.options,
            correct_index,
            explanation: record.explanation,
        })
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
}

impl Default for Theme {
    fn default() -> Self {
        Theme::Light
    }
}

impl Theme {
    pub fn toggled(self) -> Theme {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct Preferences {
    #[serde(default)]
    pub theme: Theme,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct ScoreEntry {
    pub score: u32,
    pub total: u32,
    pub date: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Verdict {
    Excellent,
    GoodEffort,
    KeepPracticing,
}

impl Verdict {
    /// Buckets `score` out of `max_score` at 80% and 50%. A quiz worth no
    /// points is graded on `correct` out of `total` instead.
    pub fn grade(score: u32, max_score: u32, correct: usize, total: usize) -> Verdict {
        if max_score > 0 {
            Verdict::bucket(u64::from(score), u64::from(max_score))
        } else {
            Verdict::bucket(correct as u64, total as u64)
        }
    }

    fn bucket(part: u64, whole: u64) -> Verdict {
        let part = part.saturating_mul(100);

        if whole > 0 && part >= whole.saturating_mul(80) {
            Verdict::Excellent
        } else if whole > 0 && part >= whole.saturating_mul(50) {
            Verdict::GoodEffort
        } else {
            Verdict::KeepPracticing
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            Verdict::Excellent => "Excellent work!",
            Verdict::GoodEffort => "Good effort!",
            Verdict::KeepPracticing => "Keep practicing!",
        }
    }
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResultSummary {
    pub score: u32,
    pub max_score: u32,
    pub correct: usize,
    pub wrong: usize,
    pub verdict: Verdict,
    pub message: &'static str,
}

impl ResultSummary {
    pub fn new(score: u32, correct: usize, total: usize, rules: &Rules) -> ResultSummary {
        let max_score = u32::try_from(total)
            .unwrap_or(u32::MAX)
            .saturating_mul(rules.points_per_question);
        let verdict = Verdict::grade(score, max_score, correct, total);

        ResultSummary {
            score,
            max_score,
            correct,
            wrong: total - correct,
            verdict,
            message: verdict.message(),
        }
    }
}
