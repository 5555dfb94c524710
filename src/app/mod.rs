pub mod config;
pub mod menu;
pub mod net;
pub mod session;
pub mod text;
pub mod touch;
pub mod types;
