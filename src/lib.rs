pub mod classify;
pub mod commands;
pub mod config;
pub mod error;
pub mod filter;
pub mod git;
pub mod llm;
pub mod logging;
pub mod model;
pub mod pipeline;
pub mod publish;
pub mod render;
pub mod review;

pub use error::{Error, Result};
