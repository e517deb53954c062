mod common;
mod crm;

pub use common::common_routes;
pub use crm::crm_routes;
