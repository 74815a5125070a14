use anyhow::Result;
use chrono::Utc;
use log::{debug, info, warn};
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
    time::{self, Instant},
};

use crate::error::QuizError;
use crate::models::{Config, RestartPolicy, ResultSummary, ScoreEntry, Theme};
use crate::session::{Phase, QuizEvent, QuizSession, SessionSnapshot, Tick};
use crate::storage::{PreferenceStore, ScoreBoard};
use crate::supplier::QuestionBank;

const EVENT_BUFFER: usize = 64;

#[derive(Clone, Debug)]
pub struct QuizSettings {
    pub question_count: usize,
    pub tick_interval: Duration,
    pub restart: RestartPolicy,
}

impl From<&Config> for QuizSettings {
    fn from(config: &Config) -> QuizSettings {
        QuizSettings {
            question_count: config.question_count,
            tick_interval: config.tick_interval(),
            restart: config.restart,
        }
    }
}

/// Owns the one live quiz session.
///
/// Every mutation of the session, whether a user intent or a timer tick,
/// happens while holding `session`, and events are published before the lock
/// is released, so subscribers see them in the order they happened.
#[derive(Clone, Debug)]
pub struct QuizController {
    settings: Arc<QuizSettings>,
    bank: Arc<QuestionBank>,
    session: Arc<Mutex<QuizSession>>,
    ticker: Arc<Mutex<Option<JoinHandle<()>>>>,
    events: broadcast::Sender<QuizEvent>,
    scores: ScoreBoard,
    preferences: PreferenceStore,
}

impl QuizController {
    pub fn new(
        session: QuizSession,
        settings: QuizSettings,
        bank: QuestionBank,
        scores: ScoreBoard,
        preferences: PreferenceStore,
    ) -> QuizController {
        let (events, _receiver) = broadcast::channel(EVENT_BUFFER);

        QuizController {
            settings: Arc::new(settings),
            bank: Arc::new(bank),
            session: Arc::new(Mutex::new(session)),
            ticker: Arc::new(Mutex::new(None)),
            events,
            scores,
            preferences,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QuizEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        self.session.lock().await.snapshot()
    }

    /// Starts a new quiz unless one is already running.
    pub async fn start(&self) -> Result<SessionSnapshot, QuizError> {
        {
            let session = self.session.lock().await;
            if session.phase() == Phase::InProgress {
                debug!("start ignored, quiz already in progress");
                return Ok(session.snapshot());
            }
        }

        let questions = self.bank.select(self.settings.question_count).await?;

        let mut session = self.session.lock().await;
        let event = session.start(questions)?;
        self.after_transition(&session, event).await;
        Ok(session.snapshot())
    }

    /// Abandons the current quiz and starts another, drawing new questions or
    /// replaying the same ones depending on the restart policy.
    pub async fn restart(&self) -> Result<SessionSnapshot, QuizError> {
        let replay = match self.settings.restart {
            RestartPolicy::Replay => self.session.lock().await.questions().to_vec(),
            RestartPolicy::Resample => Vec::new(),
        };

        let questions = if replay.is_empty() {
            self.bank.select(self.settings.question_count).await?
        } else {
            replay
        };

        let mut session = self.session.lock().await;
        let event = session.reset(questions)?;
        info!(
            "restarted quiz with {} questions ({:?})",
            session.questions().len(),
            self.settings.restart
        );
        self.after_transition(&session, event).await;
        Ok(session.snapshot())
    }

    /// Answers the current question. An answer carrying the generation of an
    /// earlier question is ignored.
    pub async fn submit_answer(
        &self,
        selected: usize,
        generation: Option<u64>,
    ) -> (Option<QuizEvent>, SessionSnapshot) {
        let mut session = self.session.lock().await;

        if generation.map_or(false, |generation| generation != session.generation()) {
            debug!("ignoring answer for stale question {:?}", generation);
            return (None, session.snapshot());
        }

        let event = session.submit_answer(selected);
        self.after_transition(&session, event.clone()).await;
        (event, session.snapshot())
    }

    pub async fn advance(&self) -> SessionSnapshot {
        let mut session = self.session.lock().await;
        let event = session.advance();
        self.after_transition(&session, event).await;
        session.snapshot()
    }

    pub async fn high_scores(&self) -> Vec<ScoreEntry> {
        let scores = self.scores.clone();
        tokio::task::spawn_blocking(move || scores.entries())
            .await
            .unwrap_or_default()
    }

    pub async fn clear_high_scores(&self) -> Result<()> {
        let scores = self.scores.clone();
        tokio::task::spawn_blocking(move || scores.clear()).await??;
        info!("cleared high scores");
        Ok(())
    }

    pub async fn theme(&self) -> Theme {
        let preferences = self.preferences.clone();
        tokio::task::spawn_blocking(move || preferences.theme())
            .await
            .unwrap_or_default()
    }

    /// Flips the theme. The new theme is returned even if it couldn't be saved.
    pub async fn toggle_theme(&self) -> Theme {
        let preferences = self.preferences.clone();
        let result = tokio::task::spawn_blocking(move || {
            let mut current = preferences.load();
            current.theme = current.theme.toggled();
            preferences.save(&current).map(|()| current.theme).map_err(|err| (current.theme, err))
        })
        .await;

        match result {
            Ok(Ok(theme)) => theme,
            Ok(Err((theme, err))) => {
                warn!("couldn't save theme preference: {}", err);
                theme
            }
            Err(err) => {
                warn!("theme task failed: {}", err);
                Theme::default()
            }
        }
    }

    /// Publishes `event` and re-arms or cancels the ticker to match the session.
    async fn after_transition(&self, session: &QuizSession, event: Option<QuizEvent>) {
        let event = match event {
            None => return,
            Some(event) => event,
        };

        match &event {
            QuizEvent::QuestionRendered { generation, .. } => {
                self.spawn_ticker(*generation).await;
            }
            QuizEvent::AnswerOutcome { .. } => {
                self.cancel_ticker().await;
            }
            QuizEvent::QuizFinished(summary) => {
                self.cancel_ticker().await;
                self.record_result(summary.clone()).await;
            }
            QuizEvent::TimerTick { .. } => {}
        }

        debug!("event {} at question {}", event.event_name(), session.current_index());
        self.publish(event);
    }

    fn publish(&self, event: QuizEvent) {
        // No subscribers is fine; the snapshot endpoint still has the state.
        let _ = self.events.send(event);
    }

    async fn spawn_ticker(&self, generation: u64) {
        let mut ticker_guard = self.ticker.lock().await;
        if let Some(handle) = ticker_guard.take() {
            handle.abort();
        }

        let session = self.session.clone();
        let events = self.events.clone();
        let tick_interval = self.settings.tick_interval;

        let handle = tokio::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + tick_interval, tick_interval);
            loop {
                interval.tick().await;

                let mut guard = session.lock().await;
                match guard.tick(generation) {
                    Tick::Stale => break,
                    Tick::Running(tick) => {
                        let _ = events.send(tick);
                    }
                    Tick::Expired { tick, outcome } => {
                        info!("question {} timed out", guard.current_index() + 1);
                        let _ = events.send(tick);
                        let _ = events.send(outcome);
                        break;
                    }
                }
            }
        });

        *ticker_guard = Some(handle);
    }

    async fn cancel_ticker(&self) {
        if let Some(handle) = self.ticker.lock().await.take() {
            handle.abort();
        }
    }

    async fn record_result(&self, summary: ResultSummary) {
        info!(
            "quiz finished: {}/{} ({} correct, {} wrong)",
            summary.score, summary.max_score, summary.correct, summary.wrong
        );

        let scores = self.scores.clone();
        let entry = ScoreEntry {
            score: summary.score,
            total: summary.max_score,
            date: Utc::now(),
        };

        match tokio::task::spawn_blocking(move || scores.record(entry)).await {
            Ok(Ok(_entries)) => {}
            Ok(Err(err)) => warn!("couldn't save high score: {}", err),
            Err(err) => warn!("high score task failed: {}", err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Question, Rules};
    use rand::prelude::*;

    fn questions(count: usize) -> Vec<Question> {
        (0..count)
            .map(|i| Question {
                prompt: format!("Question {}", i),
                options: vec!["a".into(), "b".into(), "c".into()],
                correct_index: 0,
                explanation: None,
            })
            .collect()
    }

    fn scratch(name: &str) -> std::path::PathBuf {
        let suffix: u64 = thread_rng().gen();
        std::env::temp_dir().join(format!("timed-quiz-ctl-{:x}-{}", suffix, name))
    }

    fn controller(pool: Vec<Question>, restart: RestartPolicy) -> QuizController {
        let rules = Rules {
            seconds_per_question: 3,
            points_per_question: 10,
        };
        let settings = QuizSettings {
            question_count: 10,
            tick_interval: Duration::from_secs(1),
            restart,
        };

        QuizController::new(
            QuizSession::new(rules),
            settings,
            QuestionBank::from_pool(pool),
            ScoreBoard::new(scratch("scores.csv"), 5),
            PreferenceStore::new(scratch("preferences.toml")),
        )
    }

    #[tokio::test]
    async fn empty_pool_reports_empty_quiz() {
        let controller = controller(Vec::new(), RestartPolicy::Resample);

        assert!(matches!(controller.start().await, Err(QuizError::EmptyQuiz)));
        assert_eq!(controller.snapshot().await.phase, Phase::Idle);
    }

    #[tokio::test]
    async fn uses_whole_pool_when_smaller_than_count() {
        let controller = controller(questions(5), RestartPolicy::Resample);

        let snapshot = controller.start().await.unwrap();
        assert_eq!(snapshot.phase, Phase::InProgress);
        assert_eq!(snapshot.total, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn timer_times_out_unanswered_question() {
        let controller = controller(questions(2), RestartPolicy::Resample);
        let mut events = controller.subscribe();

        controller.start().await.unwrap();
        assert!(matches!(
            events.recv().await.unwrap(),
            QuizEvent::QuestionRendered { .. }
        ));

        for remaining in (0..3).rev() {
            match events.recv().await.unwrap() {
                QuizEvent::TimerTick { time_remaining, .. } => {
                    assert_eq!(time_remaining, remaining)
                }
                other => panic!("unexpected event {:?}", other),
            }
        }

        match events.recv().await.unwrap() {
            QuizEvent::AnswerOutcome { timed_out, .. } => assert!(timed_out),
            other => panic!("unexpected event {:?}", other),
        }

        time::sleep(Duration::from_secs(10)).await;
        assert!(events.try_recv().is_err());

        let snapshot = controller.snapshot().await;
        assert!(snapshot.locked);
        assert_eq!(snapshot.score, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn answer_stops_the_clock() {
        let controller = controller(questions(2), RestartPolicy::Resample);
        let mut events = controller.subscribe();

        let snapshot = controller.start().await.unwrap();
        time::sleep(Duration::from_millis(1500)).await;

        let (outcome, snapshot) = controller.submit_answer(0, Some(snapshot.generation)).await;
        assert!(matches!(
            outcome,
            Some(QuizEvent::AnswerOutcome { is_correct: true, .. })
        ));
        assert_eq!(snapshot.score, 10);
        assert_eq!(snapshot.time_remaining, 2);

        time::sleep(Duration::from_secs(10)).await;
        assert_eq!(controller.snapshot().await.time_remaining, 2);

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event.event_name());
        }
        assert_eq!(seen, vec!["question-rendered", "timer-tick", "answer-outcome"]);
    }

    #[tokio::test]
    async fn stale_answers_are_ignored() {
        let controller = controller(questions(2), RestartPolicy::Resample);

        let first = controller.start().await.unwrap();
        controller.submit_answer(1, Some(first.generation)).await;
        controller.advance().await;

        let (outcome, snapshot) = controller.submit_answer(0, Some(first.generation)).await;
        assert_eq!(outcome, None);
        assert!(!snapshot.locked);
        assert_eq!(snapshot.index, 1);
    }

    #[tokio::test]
    async fn finishing_records_a_high_score() {
        let controller = controller(questions(2), RestartPolicy::Resample);

        controller.start().await.unwrap();
        controller.submit_answer(0, None).await;
        controller.advance().await;
        controller.submit_answer(0, None).await;
        let snapshot = controller.advance().await;

        assert_eq!(snapshot.phase, Phase::Finished);
        assert_eq!(snapshot.summary.unwrap().score, 20);

        let scores = controller.high_scores().await;
        assert_eq!(scores.len(), 1);
        assert_eq!(scores[0].score, 20);
        assert_eq!(scores[0].total, 20);

        controller.clear_high_scores().await.unwrap();
        assert!(controller.high_scores().await.is_empty());
    }

    #[tokio::test]
    async fn replay_restart_keeps_question_order() {
        let controller = controller(questions(6), RestartPolicy::Replay);

        controller.start().await.unwrap();
        let before = controller.session.lock().await.questions().to_vec();

        controller.restart().await.unwrap();
        let after = controller.session.lock().await.questions().to_vec();
        assert_eq!(before, after);
        assert_eq!(controller.snapshot().await.index, 0);
    }

    #[tokio::test]
    async fn resample_restart_draws_from_pool() {
        let pool = questions(6);
        let controller = controller(pool.clone(), RestartPolicy::Resample);

        controller.start().await.unwrap();
        controller.submit_answer(0, None).await;
        let snapshot = controller.restart().await.unwrap();

        assert_eq!(snapshot.score, 0);
        assert!(!snapshot.locked);
        let session = controller.session.lock().await;
        assert!(session.questions().iter().all(|q| pool.contains(q)));
    }

    #[tokio::test]
    async fn theme_toggles_and_persists() {
        let controller = controller(questions(1), RestartPolicy::Resample);

        assert_eq!(controller.theme().await, Theme::Light);
        assert_eq!(controller.toggle_theme().await, Theme::Dark);
        assert_eq!(controller.theme().await, Theme::Dark);
        assert_eq!(controller.toggle_theme().await, Theme::Light);
    }
}
