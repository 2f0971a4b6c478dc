//! Domain events and their translation into statements

pub mod bus;
pub mod translator;
pub mod types;

pub use bus::{EventBus, EventHandler, HandlerId};
pub use translator::EventTranslator;
pub use types::*;
