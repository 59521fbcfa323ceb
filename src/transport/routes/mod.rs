pub mod channels;
pub mod downloads;
