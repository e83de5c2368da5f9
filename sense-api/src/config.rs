use clap::Parser;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Command line and environment configuration of `sense-api`
#[derive(Parser, Debug, Clone)]
#[command(name = "sense-api")]
#[command(about = "SENSE management API (HTTP)")]
#[command(version)]
pub struct ApiArgs {
    #[arg(long, env = "API_HOST", default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub host: IpAddr,

    #[arg(long, env = "API_PORT", default_value_t = 8000)]
    pub port: u16,

    /// SQLite database shared with the device gateway
    #[arg(long, env = "DATABASE_URL", default_value = "./dev.db")]
    pub database_url: String,

    #[arg(long, env = "NATS_URL", default_value = "nats://localhost:4222")]
    pub nats_url: String,
}

impl ApiArgs {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}
