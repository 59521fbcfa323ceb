pub mod errors;
pub mod http;
pub mod logger;

pub use errors::*;
pub use http::*;
