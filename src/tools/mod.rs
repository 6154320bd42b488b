pub mod chat;
pub mod data;
