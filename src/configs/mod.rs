pub mod base;
pub mod downloads;
pub mod server;
pub mod sources;

pub use base::*;
pub use downloads::*;
pub use server::*;
pub use sources::*;
