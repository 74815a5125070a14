//! The quiz session state machine.
//!
//! A [`QuizSession`] knows nothing about clocks or rendering. The owner feeds
//! it user intents and timer ticks and forwards the [`QuizEvent`]s it returns
//! to whatever draws the quiz. Transitions requested in the wrong state are
//! ignored and return `None`; the only reported failure is starting a quiz
//! without questions.

use serde::Serialize;

use crate::error::QuizError;
use crate::models::{Question, ResultSummary, Rules};

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    Idle,
    InProgress,
    Finished,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum QuizEvent {
    #[serde(rename_all = "camelCase")]
    QuestionRendered {
        generation: u64,
        index: usize,
        total: usize,
        prompt: String,
        options: Vec<String>,
        time_remaining: u32,
        score: u32,
    },
    #[serde(rename_all = "camelCase")]
    AnswerOutcome {
        generation: u64,
        selected: Option<usize>,
        is_correct: bool,
        timed_out: bool,
        correct_index: usize,
        explanation: Option<String>,
        score: u32,
    },
    #[serde(rename_all = "camelCase")]
    TimerTick { generation: u64, time_remaining: u32 },
    QuizFinished(ResultSummary),
}

impl QuizEvent {
    pub fn event_name(&self) -> &'static str {
        match self {
            QuizEvent::QuestionRendered { .. } => "question-rendered",
            QuizEvent::AnswerOutcome { .. } => "answer-outcome",
            QuizEvent::TimerTick { .. } => "timer-tick",
            QuizEvent::QuizFinished(_) => "quiz-finished",
        }
    }
}

/// What a timer tick did to the session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Tick {
    /// The tick belongs to a question that is no longer live; stop ticking.
    Stale,
    Running(QuizEvent),
    /// Time ran out: the last tick and the timeout outcome, in that order.
    Expired { tick: QuizEvent, outcome: QuizEvent },
}

/// Read-only view of a session for the presentation layer.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub phase: Phase,
    pub generation: u64,
    pub index: usize,
    pub total: usize,
    pub score: u32,
    pub locked: bool,
    pub time_remaining: u32,
    pub question: Option<QuestionView>,
    pub summary: Option<ResultSummary>,
}

/// A question as shown to the player: no answer, and no explanation until
/// the question is locked.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QuestionView {
    pub prompt: String,
    pub options: Vec<String>,
    pub correct_index: Option<usize>,
    pub explanation: Option<String>,
}

#[derive(Clone, Debug)]
pub struct QuizSession {
    rules: Rules,
    phase: Phase,
    questions: Vec<Question>,
    current_index: usize,
    score: u32,
    correct_count: usize,
    locked: bool,
    time_remaining: u32,
    generation: u64,
}

impl QuizSession {
    pub fn new(rules: Rules) -> QuizSession {
        QuizSession {
            rules,
            phase: Phase::Idle,
            questions: Vec::new(),
            current_index: 0,
            score: 0,
            correct_count: 0,
            locked: false,
            time_remaining: 0,
            generation: 0,
        }
    }

    pub fn rules(&self) -> &Rules {
        &self.rules
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    pub fn correct_count(&self) -> usize {
        self.correct_count
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn time_remaining(&self) -> u32 {
        self.time_remaining
    }

    /// Token of the currently armed question timer.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// True while a question is on screen and its timer should be running.
    pub fn is_timing(&self) -> bool {
        self.phase == Phase::InProgress && !self.locked
    }

    pub fn current_question(&self) -> Option<&Question> {
        match self.phase {
            Phase::InProgress => self.questions.get(self.current_index),
            _ => None,
        }
    }

    /// Starts a quiz from `Idle` or `Finished`. Does nothing mid-quiz.
    pub fn start(&mut self, questions: Vec<Question>) -> Result<Option<QuizEvent>, QuizError> {
        if questions.is_empty() {
            return Err(QuizError::EmptyQuiz);
        }
        if self.phase == Phase::InProgress {
            return Ok(None);
        }

        self.questions = questions;
        self.current_index = 0;
        self.score = 0;
        self.correct_count = 0;
        self.phase = Phase::InProgress;

        Ok(Some(self.begin_question()))
    }

    /// Abandons whatever is in progress and starts over with `questions`.
    pub fn reset(&mut self, questions: Vec<Question>) -> Result<Option<QuizEvent>, QuizError> {
        if questions.is_empty() {
            return Err(QuizError::EmptyQuiz);
        }

        self.stop_timer();
        self.phase = Phase::Idle;
        self.start(questions)
    }

    pub fn submit_answer(&mut self, selected: usize) -> Option<QuizEvent> {
        if !self.is_timing() {
            return None;
        }
        let question = self.questions.get(self.current_index)?;
        if selected >= question.options.len() {
            return None;
        }

        let is_correct = selected == question.correct_index;
        Some(self.lock_question(Some(selected), is_correct))
    }

    /// Treats the current question as unanswered once its time is used up.
    pub fn timeout(&mut self) -> Option<QuizEvent> {
        if !self.is_timing() || self.time_remaining > 0 {
            return None;
        }

        Some(self.lock_question(None, false))
    }

    pub fn tick(&mut self, generation: u64) -> Tick {
        if generation != self.generation || !self.is_timing() || self.time_remaining == 0 {
            return Tick::Stale;
        }

        self.time_remaining -= 1;
        let tick = QuizEvent::TimerTick {
            generation,
            time_remaining: self.time_remaining,
        };

        if self.time_remaining > 0 {
            return Tick::Running(tick);
        }

        match self.timeout() {
            Some(outcome) => Tick::Expired { tick, outcome },
            None => Tick::Running(tick),
        }
    }

    pub fn advance(&mut self) -> Option<QuizEvent> {
        if self.phase != Phase::InProgress || !self.locked {
            return None;
        }

        if self.current_index + 1 < self.questions.len() {
            self.current_index += 1;
            Some(self.begin_question())
        } else {
            self.current_index = self.questions.len();
            self.phase = Phase::Finished;
            self.stop_timer();
            self.summary().map(QuizEvent::QuizFinished)
        }
    }

    pub fn summary(&self) -> Option<ResultSummary> {
        match self.phase {
            Phase::Finished => Some(ResultSummary::new(
                self.score,
                self.correct_count,
                self.questions.len(),
                &self.rules,
            )),
            _ => None,
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let question = self.current_question().map(|question| QuestionView {
            prompt: question.prompt.clone(),
            options: question.options.clone(),
            correct_index: if self.locked {
                Some(question.correct_index)
            } else {
                None
            },
            explanation: if self.locked {
                question.explanation.clone()
            } else {
                None
            },
        });

        SessionSnapshot {
            phase: self.phase,
            generation: self.generation,
            index: self.current_index,
            total: self.questions.len(),
            score: self.score,
            locked: self.locked,
            time_remaining: self.time_remaining,
            question,
            summary: self.summary(),
        }
    }

    fn begin_question(&mut self) -> QuizEvent {
        self.generation += 1;
        self.locked = false;
        self.time_remaining = self.rules.seconds_per_question;

        let question = &self.questions[self.current_index];
        QuizEvent::QuestionRendered {
            generation: self.generation,
            index: self.current_index,
            total: self.questions.len(),
            prompt: question.prompt.clone(),
            options: question.options.clone(),
            time_remaining: self.time_remaining,
            score: self.score,
        }
    }

    fn lock_question(&mut self, selected: Option<usize>, is_correct: bool) -> QuizEvent {
        self.locked = true;
        if is_correct {
            self.score = self.score.saturating_add(self.rules.points_per_question);
            self.correct_count += 1;
        }

        let question = &self.questions[self.current_index];
        QuizEvent::AnswerOutcome {
            generation: self.generation,
            selected,
            is_correct,
            timed_out: selected.is_none(),
            correct_index: question.correct_index,
            explanation: question.explanation.clone(),
            score: self.score,
        }
    }

    fn stop_timer(&mut self) {
        self.generation += 1;
        self.time_remaining = 0;
    }
}
