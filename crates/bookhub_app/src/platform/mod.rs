//! Headless host: configuration, logging and the task-backed surfaces the
//! coordinator opens sync sessions in.

mod app;
pub mod cli;
mod config;
mod surfaces;

pub use app::run;
