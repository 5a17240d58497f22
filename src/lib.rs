pub mod config;
pub mod engine;
pub mod session;
pub mod uci;
