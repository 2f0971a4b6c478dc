//! LRS transport abstraction.
//!
//! The tracker talks to the LRS only through the [`Transport`] trait:
//! - HTTP transport backed by `lrs-client`
//! - Recording mock transport for testing

pub mod http;
pub mod mock;
pub mod traits;

pub use http::HttpTransport;
pub use mock::{Delivery, MockTransport, TransportCall};
pub use traits::{LaunchData, Transport};
