//! Safe SQL builder: identifiers are validated field names, values are parameters.

mod builder;
pub mod params;
pub use builder::*;
pub use params::*;
