//! A timed multiple-choice quiz: question selection, the session state
//! machine, its controller and the warp filters that expose it.

pub mod controllers;
pub mod error;
pub mod filters;
pub mod models;
pub mod routes;
pub mod session;
pub mod storage;
pub mod supplier;
