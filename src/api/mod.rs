pub mod chat;
pub mod knowledge;
