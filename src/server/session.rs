use super::auth::MorayAuthenticator;
use crate::{
    common::{
        error::{unsupported, MorayError, Unsupported},
        logging::{log_tunnel_closed, log_tunnel_closed_with_error, log_tunnel_created},
    },
    io::{tunnel::MorayTunnel, MorayStream},
    proto::socks5::{
        request::{HandshakeRequest, RelayRequest},
        response::{HandshakeResponse, RelayResponse},
        Address, Command,
    },
    resolver::DnsResolver,
};
use anyhow::{Error, Result};
use human_bytes::human_bytes;
use log::{debug, error, info};
use std::net::{SocketAddr, SocketAddrV4};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};

/// One accepted client connection, driven through the three SOCKS5 phases
/// in order: negotiation, request accept, data transfer. Phases are never
/// revisited; any error ends the session and both sockets close on drop.
pub struct Session<S>
where
    S: AsyncReadExt + AsyncWriteExt + Unpin,
{
    stream: MorayStream<S>,
    peer_addr: SocketAddr,
    server_addr: SocketAddr,
    resolver: DnsResolver,
    authenticator: MorayAuthenticator,
}

impl<S> Session<S>
where
    S: AsyncReadExt + AsyncWriteExt + Unpin,
{
    pub fn new(stream: MorayStream<S>, peer_addr: SocketAddr, server_addr: SocketAddr, resolver: DnsResolver) -> Session<S> {
        Session {
            stream,
            peer_addr,
            server_addr,
            resolver,
            authenticator: MorayAuthenticator::new(),
        }
    }

    pub async fn handle(&mut self) -> Result<()> {
        self.process_negotiation().await?;
        self.process_request_accept().await
    }

    /// Negotiation phase: agree on an authentication method or reply
    /// NO_ACCEPTABLE_METHODS and tear the session down.
    async fn process_negotiation(&mut self) -> Result<()> {
        let request = self.stream.read_request::<HandshakeRequest>().await?;

        let mut response_builder = HandshakeResponse::builder();
        match self.authenticator.select_auth_method(request.auth_methods()) {
            Some(method) => {
                info!("Selected authentication method {:?} for {}", method, self.peer_addr);
                response_builder.with_auth_method(method);
                self.stream.write_response(response_builder.build()).await
            }
            None => {
                info!("No acceptable authentication methods identified for {}", self.peer_addr);
                response_builder.with_no_acceptable_method();
                self.stream.write_response(response_builder.build()).await?;
                Err(MorayError::NoAcceptableAuthMethod.into())
            }
        }
    }

    /// Request-accept phase: take the relay request, handle CONNECT and
    /// respond negatively to everything that cannot be served. Decode
    /// failures get the negative reply too, a request with an unknown
    /// address type must not close the session silently.
    async fn process_request_accept(&mut self) -> Result<()> {
        let result = match self.stream.read_request::<RelayRequest>().await {
            Ok(request) => match request.command() {
                Command::Connect => self.handle_connect(request.target_addr()).await,
                cmd => unsupported!(Unsupported::Socks5Command(cmd)),
            },
            Err(err) => Err(err),
        };

        if let Err(err) = result {
            self.respond_with_error(err).await?;
        }

        Ok(())
    }

    async fn handle_connect(&mut self, target_addr: &Address) -> Result<()> {
        info!("Handling SOCKS5 CONNECT from {} to {}", self.peer_addr, target_addr);

        let resolved = self.resolve_target(target_addr).await?;

        debug!("Establishing TCP connection with the target {} ... ", resolved);
        let mut target_stream = TcpStream::connect(resolved)
            .await
            .map_err(|_| MorayError::TargetConnectFailed(resolved))?;
        debug!("TCP connection has been established with the target {}", resolved);

        let response = RelayResponse::builder()
            .with_success()
            .with_bound_address(self.server_addr)
            .build();
        self.stream.write_response(response).await?;

        // Data-transfer phase, runs until either side closes or errors.
        let (peer, proxy) = (self.peer_addr, self.server_addr);
        let mut tunnel = MorayTunnel::new(&mut *self.stream, &mut target_stream);

        log_tunnel_created!(peer, proxy, target_addr);

        match tunnel.run().await {
            Ok((l2r, r2l)) => {
                log_tunnel_closed!(peer, proxy, target_addr, l2r, r2l);
            }
            Err(err) => {
                log_tunnel_closed_with_error!(peer, proxy, target_addr, err);
            }
        }

        Ok(())
    }

    /// Turns the requested address into a concrete IPv4 socket address.
    /// Domain names go through the resolver and take the first IPv4 answer.
    async fn resolve_target(&self, target_addr: &Address) -> Result<SocketAddr> {
        match target_addr {
            Address::SocketAddress(addr @ SocketAddr::V4(_)) => Ok(*addr),
            Address::SocketAddress(SocketAddr::V6(_)) => unsupported!(Unsupported::IPv6Address),
            Address::DomainName(name, port) => {
                debug!("Resolving target domain name {} ... ", name);
                let records = self.resolver.resolve(name).await?;
                let ipv4 = records
                    .first()
                    .ok_or_else(|| MorayError::UnresolvedDomainName(name.clone()))?;
                debug!("Resolved target domain name {} to {}", name, ipv4);

                Ok(SocketAddr::V4(SocketAddrV4::new(*ipv4, *port)))
            }
        }
    }

    async fn respond_with_error(&mut self, err: Error) -> Result<()> {
        let error_string = err.to_string();
        let response = RelayResponse::builder()
            .with_err(err)
            .with_bound_address(self.server_addr)
            .build();

        debug!("Error: '{}'. Response: '{:?}' to {}", error_string, response, self.peer_addr);
        self.stream.write_response(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::socks5::consts::{address, auth, command, reply, SOCKS5_VERSION};
    use tokio_test::io::Mock;

    async fn test_session(mock: Mock) -> Session<Mock> {
        // Upstream is never contacted by these tests.
        let resolver = DnsResolver::spawn("127.0.0.1:9".parse().unwrap()).await.unwrap();
        Session::new(
            MorayStream::new(mock),
            "127.0.0.1:8080".parse().unwrap(),
            "127.0.0.1:666".parse().unwrap(),
            resolver,
        )
    }

    #[tokio::test]
    async fn negotiation_selects_no_authentication() {
        let mock = tokio_test::io::Builder::new()
            .read(&[SOCKS5_VERSION, 2, auth::SOCKS5_AUTH_METHOD_GSSAPI, auth::SOCKS5_AUTH_METHOD_NONE])
            .write(&[SOCKS5_VERSION, auth::SOCKS5_AUTH_METHOD_NONE])
            .build();

        test_session(mock).await.process_negotiation().await.unwrap();
    }

    #[tokio::test]
    async fn negotiation_ignores_unknown_method_bytes() {
        // Offer carries "no authentication" next to an unserved IANA method,
        // the handshake must succeed on the known one.
        let mock = tokio_test::io::Builder::new()
            .read(&[SOCKS5_VERSION, 2, auth::SOCKS5_AUTH_METHOD_NONE, 0x03])
            .write(&[SOCKS5_VERSION, auth::SOCKS5_AUTH_METHOD_NONE])
            .build();

        test_session(mock).await.process_negotiation().await.unwrap();
    }

    #[tokio::test]
    async fn negotiation_without_common_method_is_rejected() {
        let mock = tokio_test::io::Builder::new()
            .read(&[SOCKS5_VERSION, 1, auth::SOCKS5_AUTH_METHOD_GSSAPI])
            .write(&[SOCKS5_VERSION, auth::SOCKS5_AUTH_METHOD_NOT_ACCEPTABLE])
            .build();

        let err = test_session(mock).await.process_negotiation().await.unwrap_err();
        assert_eq!(
            MorayError::NoAcceptableAuthMethod,
            err.downcast::<MorayError>().unwrap()
        );
    }

    #[tokio::test]
    async fn bind_command_gets_command_not_supported_reply() {
        let mock = tokio_test::io::Builder::new()
            .read(&[
                SOCKS5_VERSION,
                command::SOCKS5_CMD_BIND,
                0x00,
                address::SOCKS5_ADDR_TYPE_IPV4,
                127, 0, 0, 1, 0, 80,
            ])
            .write(&[
                SOCKS5_VERSION,
                reply::SOCKS5_REPLY_COMMAND_NOT_SUPPORTED,
                0x00,
                address::SOCKS5_ADDR_TYPE_IPV4,
                127, 0, 0, 1, 0x02, 0x9A,
            ])
            .build();

        test_session(mock).await.process_request_accept().await.unwrap();
    }

    #[tokio::test]
    async fn unknown_address_type_gets_address_type_not_supported_reply() {
        // 0x02 is not a defined ATYP value. The request does not decode,
        // yet the client still gets the negative reply before the close.
        let mock = tokio_test::io::Builder::new()
            .read(&[SOCKS5_VERSION, command::SOCKS5_CMD_CONNECT, 0x00, 0x02])
            .write(&[
                SOCKS5_VERSION,
                reply::SOCKS5_REPLY_ADDRESS_TYPE_NOT_SUPPORTED,
                0x00,
                address::SOCKS5_ADDR_TYPE_IPV4,
                127, 0, 0, 1, 0x02, 0x9A,
            ])
            .build();

        test_session(mock).await.process_request_accept().await.unwrap();
    }

    #[tokio::test]
    async fn ipv6_target_gets_address_type_not_supported_reply() {
        let mut request = vec![
            SOCKS5_VERSION,
            command::SOCKS5_CMD_CONNECT,
            0x00,
            address::SOCKS5_ADDR_TYPE_IPV6,
        ];
        request.extend_from_slice(&[0u8; 16]);
        request.extend_from_slice(&[0x01, 0xBB]); // port 443

        let mock = tokio_test::io::Builder::new()
            .read(&request)
            .write(&[
                SOCKS5_VERSION,
                reply::SOCKS5_REPLY_ADDRESS_TYPE_NOT_SUPPORTED,
                0x00,
                address::SOCKS5_ADDR_TYPE_IPV4,
                127, 0, 0, 1, 0x02, 0x9A,
            ])
            .build();

        test_session(mock).await.process_request_accept().await.unwrap();
    }

    #[tokio::test]
    async fn connect_to_dead_target_gets_connection_refused_reply() {
        // Loopback port 1 is expected to have no listener.
        let mock = tokio_test::io::Builder::new()
            .read(&[
                SOCKS5_VERSION,
                command::SOCKS5_CMD_CONNECT,
                0x00,
                address::SOCKS5_ADDR_TYPE_IPV4,
                127, 0, 0, 1, 0x00, 0x01,
            ])
            .write(&[
                SOCKS5_VERSION,
                reply::SOCKS5_REPLY_CONNECTION_REFUSED,
                0x00,
                address::SOCKS5_ADDR_TYPE_IPV4,
                127, 0, 0, 1, 0x02, 0x9A,
            ])
            .build();

        test_session(mock).await.process_request_accept().await.unwrap();
    }
}
