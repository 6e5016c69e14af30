pub mod client;
pub mod error;
pub mod extract;
pub mod file;
pub mod transport;
