//! Data models

mod entry;
mod query;
mod request;
mod stats;

pub use entry::*;
pub use query::*;
pub use request::*;
pub use stats::*;
