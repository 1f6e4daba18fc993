use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

#[derive(Parser)]
#[command(version, name = "splitdns")]
pub struct Args {
    #[arg(short, long, value_name = "PATH", default_value = "splitdns.toml")]
    pub config: PathBuf,
    /// Overrides `server.listen` from the config file
    #[arg(short, long, value_name = "ADDR")]
    pub listen: Option<SocketAddr>,
}
