#[allow(clippy::module_inception)]
mod models;
mod queries;

pub use models::*;
pub use queries::{q, schema};
