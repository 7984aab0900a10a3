use clap::Parser;
use std::net::{Ipv4Addr, SocketAddr};

pub const LOG4RS_CONFIG_FILE_PATH: &str = "log4rs.yaml";

#[derive(Parser, Debug)]
#[clap(about = "Asynchronous SOCKS5 proxy server", version)]
pub struct MorayConfig {
    /// TCP port to listen on
    #[clap(default_value_t = 1080, value_parser = clap::value_parser!(u16).range(1024..=49151))]
    port: u16,
}

impl MorayConfig {
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Proxy listens on all IPv4 interfaces.
    pub fn bind_address(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_port_when_omitted() {
        let config = MorayConfig::try_parse_from(["moray"]).unwrap();
        assert_eq!(1080, config.port());
        assert_eq!("0.0.0.0:1080".parse::<SocketAddr>().unwrap(), config.bind_address());
    }

    #[test]
    fn port_outside_allowed_range_is_rejected() {
        assert!(MorayConfig::try_parse_from(["moray", "80"]).is_err());
        assert!(MorayConfig::try_parse_from(["moray", "65535"]).is_err());
        assert!(MorayConfig::try_parse_from(["moray", "1024"]).is_ok());
        assert!(MorayConfig::try_parse_from(["moray", "49151"]).is_ok());
    }
}
