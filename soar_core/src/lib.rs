pub mod config;
pub mod downloader;
pub mod geo;
pub mod progress;
pub mod skysight;
pub mod task;
pub mod types;
