pub mod action;
pub mod pong;
pub mod log;
