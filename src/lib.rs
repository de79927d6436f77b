pub mod api;
pub mod compose;
pub mod config;
pub mod content;
pub mod humanize;
pub mod observability;
pub mod signing;
pub mod storage;
