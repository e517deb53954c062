pub mod doctypes;
pub mod settings;

pub use doctypes::*;
pub use settings::*;
