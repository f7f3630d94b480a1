pub mod auth;
pub mod capture;
pub mod config;
pub mod error;
pub mod model;
pub mod playback;
pub mod query;
pub mod storage;
