pub mod advisor;
pub mod calendar;
pub mod db;
pub mod debug_log;
pub mod gemini;
pub mod models;
pub mod service;
pub mod slot;
pub mod store;
