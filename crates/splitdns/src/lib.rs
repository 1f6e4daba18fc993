pub mod admin;
pub mod app;
pub mod cache;
pub mod cli;
pub mod config;
pub mod forwarder;
pub mod logging;
pub mod pool;
pub mod rules;
pub mod server;

pub use app::App;
pub use cli::Args;
pub use config::Config;
pub use logging::setup_logging;
