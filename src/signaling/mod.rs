pub mod chat;
pub mod lifecycle;
pub mod queue;
