pub mod connection;
pub mod error;
pub mod notify;
pub mod registry;
pub mod session;
