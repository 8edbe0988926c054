pub mod response;
pub mod target;

pub use response::{ConnectionFailure, WhoisResponse};
pub use target::QueryTarget;
