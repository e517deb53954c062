//! Request extractors shared by every handler.

pub mod context;
pub mod lenient;
pub mod payload;

pub use context::{RequestContext, DEFAULT_USER, USER_HEADER};
pub use payload::Payload;
