//! Data models shared across the query pipeline.

mod mode;
mod query;
mod turn;

pub use mode::Mode;
pub use query::QueryResult;
pub use turn::{Role, Turn};
