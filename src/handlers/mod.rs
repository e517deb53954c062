//! HTTP handlers, one module per RPC namespace.

pub mod dashboard;
pub mod delivery_note;
pub mod events;
pub mod item;
pub mod lead;
pub mod lead_source;
pub mod masters;
pub mod opportunity;
pub mod quotation;
pub mod sales_invoice;
pub mod sales_order;
pub mod selling;
pub mod users;
