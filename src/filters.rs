use futures::{stream, Stream};
use log::warn;
use serde::Serialize;
use std::convert::Infallible;
use tokio::sync::broadcast::{self, error::RecvError};
use warp::{
    http::StatusCode,
    reject::{self, Reject},
    reply::{self, Reply},
    sse, Filter, Rejection,
};

use crate::controllers::QuizController;
use crate::error::QuizError;
use crate::session::QuizEvent;

#[derive(Debug)]
struct QuizRejection(QuizError);

impl Reject for QuizRejection {}

#[derive(Debug)]
struct StorageFailure(String);

impl Reject for StorageFailure {}

#[derive(Clone, Debug, Serialize)]
struct ErrorReply {
    error: ErrorCode,
    message: String,
}

#[derive(Clone, Debug, Serialize)]
enum ErrorCode {
    NotFound,
    BadRequest,
    MethodNotAllowed,
    DataUnavailable,
    EmptyQuiz,
    Internal,
}

pub fn with_quiz_controller(
    quiz_controller: QuizController,
) -> impl Filter<Extract = (QuizController,), Error = Infallible> + Clone {
    warp::any().map(move || quiz_controller.clone())
}

pub fn quiz_error(err: QuizError) -> Rejection {
    reject::custom(QuizRejection(err))
}

pub fn storage_error(err: anyhow::Error) -> Rejection {
    reject::custom(StorageFailure(err.to_string()))
}

/// Engine events as Server-Sent Events, named after the event kind and
/// carrying the JSON-encoded event as data.
pub fn quiz_events(
    receiver: broadcast::Receiver<QuizEvent>,
) -> impl Stream<Item = Result<sse::Event, serde_json::Error>> + Send + 'static {
    stream::unfold(receiver, |mut receiver| async move {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    let sse_event = sse::Event::default()
                        .event(event.event_name())
                        .json_data(&event);
                    return Some((sse_event, receiver));
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("event stream lagged, skipped {} events", skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    })
}

pub async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (status, error, message) = if let Some(QuizRejection(quiz_error)) = err.find::<QuizRejection>() {
        let status = match quiz_error {
            QuizError::DataUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            QuizError::EmptyQuiz => StatusCode::UNPROCESSABLE_ENTITY,
        };
        let error = match quiz_error {
            QuizError::DataUnavailable(_) => ErrorCode::DataUnavailable,
            QuizError::EmptyQuiz => ErrorCode::EmptyQuiz,
        };
        (status, error, quiz_error.to_string())
    } else if err.is_not_found() {
        (StatusCode::NOT_FOUND, ErrorCode::NotFound, "not found".into())
    } else if let Some(body_error) = err.find::<warp::filters::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, ErrorCode::BadRequest, body_error.to_string())
    } else if err.find::<reject::MethodNotAllowed>().is_some() {
        (
            StatusCode::METHOD_NOT_ALLOWED,
            ErrorCode::MethodNotAllowed,
            "method not allowed".into(),
        )
    } else if let Some(StorageFailure(message)) = err.find::<StorageFailure>() {
        warn!("storage failure: {}", message);
        (StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::Internal, message.clone())
    } else {
        warn!("unhandled rejection: {:?}", err);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::Internal,
            "internal error".into(),
        )
    };

    Ok(reply::with_status(
        reply::json(&ErrorReply { error, message }),
        status,
    )
    .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn quiz_errors_map_to_status_codes() {
        let reply = handle_rejection(quiz_error(QuizError::EmptyQuiz))
            .await
            .unwrap()
            .into_response();
        assert_eq!(reply.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let reply = handle_rejection(quiz_error(QuizError::DataUnavailable("gone".into())))
            .await
            .unwrap()
            .into_response();
        assert_eq!(reply.status(), StatusCode::SERVICE_UNAVAILABLE);

        let reply = handle_rejection(reject::not_found())
            .await
            .unwrap()
            .into_response();
        assert_eq!(reply.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn event_stream_ends_when_sender_closes() {
        let (sender, receiver) = broadcast::channel(4);
        sender
            .send(QuizEvent::TimerTick {
                generation: 1,
                time_remaining: 4,
            })
            .unwrap();
        drop(sender);

        let events = quiz_events(receiver).collect::<Vec<_>>().await;
        assert_eq!(events.len(), 1);
        assert!(events[0].is_ok());
    }
}
