//! Rust client for the xAPI resources of a Learning Record Store
//!
//! Covers the two resources a course tracker needs:
//! - **Statements**: `POST {endpoint}statements` (single statement or batch)
//! - **State**: `GET`/`PUT`/`DELETE {endpoint}activities/state`
//!
//! # Example
//!
//! ```rust,no_run
//! use lrs_client::{LrsClient, LrsConfig, StateQuery, Agent};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = LrsClient::new(
//!     LrsConfig::new("https://lrs.example.com/xapi/").with_basic_auth("key", "secret"),
//! )?;
//!
//! let query = StateQuery {
//!     activity_id: "https://example.com/course".into(),
//!     agent: Agent::mbox("mailto:learner@example.com"),
//!     registration: None,
//! };
//!
//! let document = client.get_state(&query, "course").await?;
//! println!("status {}", document.status);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod launch;
pub mod types;

// Re-export main types
pub use client::{is_cross_origin, LrsClient};
pub use error::{LrsError, Result};
pub use launch::LaunchParams;
pub use types::*;
