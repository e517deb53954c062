//! Handler-side services: pagination, lifecycle gates, totals, document mapping, input checks.

pub mod lifecycle;
pub mod mapper;
pub mod pagination;
pub mod totals;
mod validation;

pub use pagination::{eq_filters, fetch_page, ListSpec, Page, PageRequest};
pub use totals::apply_totals;
pub use validation::{field_map, required, table, RequestValidator};
