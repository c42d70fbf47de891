pub mod app;
pub mod clock;
pub mod config;
pub mod dedup;
pub mod duration;
pub mod ingest;
pub mod models;
pub mod normalize;
pub mod provider;
pub mod storage;
pub mod webhook;
