pub mod chat;
pub mod config;
pub mod context;
pub mod data;
pub mod dispatch;
pub mod error;
pub mod response;
pub mod server;
pub mod speech;
pub mod tools;
