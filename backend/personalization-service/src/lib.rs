pub mod backend;
pub mod config;
pub mod error;
pub mod jobs;
pub mod models;
pub mod services;
pub mod session;
pub mod storage;
pub mod utils;

pub use crate::config::Config;
pub use error::{PersonalizationError, Result};
pub use services::{HeuristicScorer, ModelController, RecommendationEngine, ResourceMonitor};
pub use session::PersonalizationSession;
