use anyhow::Result;
use log::{info, warn};
use std::{env, io::ErrorKind, net::SocketAddr, path::Path};
use tokio::fs;
use warp::Filter;

use timed_quiz::{
    controllers::{QuizController, QuizSettings},
    models::Config,
    routes,
    session::QuizSession,
    storage::{PreferenceStore, ScoreBoard},
    supplier::QuestionBank,
};

async fn load_config(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    match fs::read_to_string(path).await {
        Ok(config) => Ok(toml::de::from_str(&config)?),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            warn!("{} not found, using default settings", path.display());
            Ok(Config::default())
        }
        Err(err) => Err(err.into()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let bind_addr = env::var("BIND").unwrap_or_else(|_err| "127.0.0.1:3030".into());
    let bind_addr: SocketAddr = bind_addr.parse()?;

    let cors_origin =
        env::var("CORS_ORIGIN").unwrap_or_else(|_err| "http://localhost:3030".into());

    let config_path = env::var("QUIZ_CONFIG").unwrap_or_else(|_err| "quiz.toml".into());
    let config = load_config(&config_path).await?;

    let bank = QuestionBank::from_file(&config.questions);
    match bank.pool().await {
        Ok(pool) => info!("question bank ready with {} questions", pool.len()),
        Err(err) => warn!("{}, will retry when a quiz starts", err),
    }

    let quiz_controller = QuizController::new(
        QuizSession::new(config.rules()),
        QuizSettings::from(&config),
        bank,
        ScoreBoard::new(&config.scores, config.leaderboard_size),
        PreferenceStore::new(&config.preferences),
    );

    let cors = warp::cors()
        .allow_origin(cors_origin.as_str())
        .allow_methods(vec!["GET", "POST", "DELETE"])
        .allow_headers(vec!["Content-Type"]);

    let server = routes::api(quiz_controller)
        .with(cors)
        .with(warp::log("timed_quiz::api"));

    info!("serving quiz on http://{}", bind_addr);
    warp::serve(server).run(bind_addr).await;

    Ok(())
}
