pub mod chat;
pub mod chunk;
pub mod history;
pub mod init;
