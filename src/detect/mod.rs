//! Runtime environment detection and driver recommendation.
//!
//! Everything here is pure over an [`crate::env::EnvSource`], so the same inputs always
//! produce the same recommendation.

mod environment;
mod recommend;
mod url;

pub use environment::{RuntimeEnvironment, detect_environment};
pub use recommend::{DriverRecommendation, recommend, recommend_driver};
pub use url::{ConnectionUrlInfo, POOLER_PORT, parse_connection_url};
