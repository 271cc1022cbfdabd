pub mod classify;
pub mod link;
pub mod listener;
pub mod server;
pub mod upstream;
pub mod v6;
