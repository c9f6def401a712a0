pub mod dial;
pub mod export;
pub mod handler;
pub mod otlp;
pub mod server;
pub mod sink;
