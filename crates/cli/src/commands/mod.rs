pub mod chat;
pub mod context;
pub mod memory;
pub mod personas;
