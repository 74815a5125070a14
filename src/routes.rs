use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use warp::{http::Response, reply, Filter, Rejection, Reply};

use crate::controllers::QuizController;
use crate::filters::{self, with_quiz_controller};
use crate::models::{ScoreEntry, Theme};
use crate::session::{QuizEvent, SessionSnapshot};

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct QuizAnswerRequest {
    pub answer: usize,
    #[serde(default)]
    pub question: Option<u64>,
}

#[derive(Clone, Debug, Serialize)]
pub struct QuizAnswerReply {
    pub accepted: bool,
    pub outcome: Option<QuizEvent>,
    pub state: SessionSnapshot,
}

#[derive(Clone, Debug, Serialize)]
pub struct HighScoresReply {
    pub scores: Vec<ScoreEntry>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ThemeReply {
    pub theme: Theme,
}

/// Every route of the widget, with rejections turned into JSON error replies.
pub fn api(
    quiz_controller: QuizController,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    quiz(quiz_controller.clone())
        .or(preferences(quiz_controller))
        .or(assets())
        .recover(filters::handle_rejection)
}

fn quiz(
    quiz_controller: QuizController,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let get_quiz = warp::path!("quiz")
        .and(warp::get())
        .and(with_quiz_controller(quiz_controller.clone()))
        .and_then(|quiz_controller: QuizController| async move {
            let snapshot = quiz_controller.snapshot().await;
            Ok::<_, Rejection>(reply::json(&snapshot))
        });

    let start_quiz = warp::path!("quiz" / "start")
        .and(warp::post())
        .and(with_quiz_controller(quiz_controller.clone()))
        .and_then(|quiz_controller: QuizController| async move {
            let snapshot = quiz_controller
                .start()
                .await
                .map_err(filters::quiz_error)?;
            Ok::<_, Rejection>(reply::json(&snapshot))
        });

    let restart_quiz = warp::path!("quiz" / "restart")
        .and(warp::post())
        .and(with_quiz_controller(quiz_controller.clone()))
        .and_then(|quiz_controller: QuizController| async move {
            let snapshot = quiz_controller
                .restart()
                .await
                .map_err(filters::quiz_error)?;
            Ok::<_, Rejection>(reply::json(&snapshot))
        });

    let answer_quiz = warp::path!("quiz" / "answer")
        .and(warp::post())
        .and(warp::filters::body::json())
        .and(with_quiz_controller(quiz_controller.clone()))
        .and_then(
            |body: QuizAnswerRequest, quiz_controller: QuizController| async move {
                let (outcome, state) = quiz_controller
                    .submit_answer(body.answer, body.question)
                    .await;

                let reply = QuizAnswerReply {
                    accepted: outcome.is_some(),
                    outcome,
                    state,
                };
                Ok::<_, Rejection>(reply::json(&reply))
            },
        );

    let next_question = warp::path!("quiz" / "next")
        .and(warp::post())
        .and(with_quiz_controller(quiz_controller.clone()))
        .and_then(|quiz_controller: QuizController| async move {
            let snapshot = quiz_controller.advance().await;
            Ok::<_, Rejection>(reply::json(&snapshot))
        });

    let quiz_events = warp::path!("quiz" / "events")
        .and(warp::get())
        .and(with_quiz_controller(quiz_controller))
        .map(|quiz_controller: QuizController| {
            let events = filters::quiz_events(quiz_controller.subscribe());
            warp::sse::reply(warp::sse::keep_alive().stream(events))
        });

    get_quiz
        .or(start_quiz)
        .or(restart_quiz)
        .or(answer_quiz)
        .or(next_question)
        .or(quiz_events)
}

fn preferences(
    quiz_controller: QuizController,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let get_high_scores = warp::path!("highscores")
        .and(warp::get())
        .and(with_quiz_controller(quiz_controller.clone()))
        .and_then(|quiz_controller: QuizController| async move {
            let scores = quiz_controller.high_scores().await;
            Ok::<_, Rejection>(reply::json(&HighScoresReply { scores }))
        });

    let clear_high_scores = warp::path!("highscores")
        .and(warp::delete())
        .and(with_quiz_controller(quiz_controller.clone()))
        .and_then(|quiz_controller: QuizController| async move {
            quiz_controller
                .clear_high_scores()
                .await
                .map_err(filters::storage_error)?;
            Ok::<_, Rejection>(reply::json(&HighScoresReply { scores: Vec::new() }))
        });

    let get_theme = warp::path!("theme")
        .and(warp::get())
        .and(with_quiz_controller(quiz_controller.clone()))
        .and_then(|quiz_controller: QuizController| async move {
            let theme = quiz_controller.theme().await;
            Ok::<_, Rejection>(reply::json(&ThemeReply { theme }))
        });

    let toggle_theme = warp::path!("theme" / "toggle")
        .and(warp::post())
        .and(with_quiz_controller(quiz_controller))
        .and_then(|quiz_controller: QuizController| async move {
            let theme = quiz_controller.toggle_theme().await;
            Ok::<_, Rejection>(reply::json(&ThemeReply { theme }))
        });

    get_high_scores
        .or(clear_high_scores)
        .or(get_theme)
        .or(toggle_theme)
}

fn assets() -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let index = warp::path::end().and(warp::get()).map(|| {
        const INDEX: &str = include_str!("index.html");
        reply::html(INDEX)
    });

    let script = warp::path!("static" / "script.js")
        .and(warp::get())
        .map(|| {
            const SCRIPT: &str = include_str!("script.js");
            Response::builder()
                .header("Content-Type", "application/javascript")
                .body(SCRIPT)
        })
        .with(warp::compression::gzip());

    index.or(script)
}
