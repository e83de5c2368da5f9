use clap::Parser;
use std::net::{IpAddr, Ipv6Addr, SocketAddr};

/// IANA assigned CoAP port
pub const DEFAULT_COAP_PORT: u16 = 5683;

/// Command line and environment configuration of `sense-coap`
#[derive(Parser, Debug, Clone)]
#[command(name = "sense-coap")]
#[command(about = "SENSE device gateway (CoAP over UDP)")]
#[command(version)]
pub struct GatewayArgs {
    /// Address to bind the CoAP socket to
    #[arg(long, env = "COAP_IP", default_value_t = IpAddr::V6(Ipv6Addr::UNSPECIFIED))]
    pub ip: IpAddr,

    #[arg(long, env = "COAP_PORT", default_value_t = DEFAULT_COAP_PORT)]
    pub port: u16,

    /// SQLite database shared with the management API
    #[arg(long, env = "DATABASE_URL", default_value = "./dev.db")]
    pub database_url: String,

    #[arg(long, env = "NATS_URL", default_value = "nats://localhost:4222")]
    pub nats_url: String,
}

impl GatewayArgs {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }
}
