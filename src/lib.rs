pub mod api;
pub mod common;
pub mod configs;
pub mod download;
pub mod server;
pub mod sources;
pub mod storage;
pub mod transport;
