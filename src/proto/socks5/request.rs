use super::{consts, Address, AuthMethod, Command};
use crate::{
    common::error::InvalidValue,
    io::{Request, Response},
};
use anyhow::{ensure, Result};
use bytes::{BufMut, BytesMut};
use std::collections::HashSet;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

// The client connects to the server, and sends a
// version identifier/method selection message:
// +----+----------+----------+
// |VER | NMETHODS | METHODS  |
// +----+----------+----------+
// | 1  |    1     | 1 to 255 |
// +----+----------+----------+

#[derive(Debug)]
pub struct HandshakeRequest {
    auth_methods: HashSet<AuthMethod>,
}

impl HandshakeRequest {
    pub fn auth_methods(&self) -> &HashSet<AuthMethod> {
        &self.auth_methods
    }
}

impl Request for HandshakeRequest {
    async fn read_from<T: AsyncReadExt + Unpin>(stream: &mut T) -> Result<Self>
    where
        Self: std::marker::Sized,
    {
        let mut header: [u8; 2] = [0, 0];
        stream.read_exact(&mut header).await?;

        let (version, nmethods) = (header[0], header[1]);

        // Bail out if version is not supported.
        ensure!(version == consts::SOCKS5_VERSION, InvalidValue::ProtocolVersion(version));

        // Parse requested auth methods. Bytes this server does not know are
        // simply never selected, so they drop out of the set here; the
        // negotiation outcome depends only on the methods it can serve.
        let auth_methods = match nmethods {
            0 => HashSet::new(),
            n => {
                let mut methods = vec![0; n.into()];
                stream.read_exact(&mut methods).await?;

                methods.iter().filter_map(|&m| AuthMethod::try_from(m).ok()).collect()
            }
        };

        Ok(HandshakeRequest { auth_methods })
    }
}

// The SOCKS request information is sent by the client as
// soon as it has established a connection to the SOCKS
// server, and completed the authentication negotiations.
// +----+-----+-------+------+----------+----------+
// |VER | CMD |  RSV  | ATYP | DST.ADDR | DST.PORT |
// +----+-----+-------+------+----------+----------+
// | 1  |  1  | X'00' |  1   | Variable |    2     |
// +----+-----+-------+------+----------+----------+

#[derive(Debug, PartialEq)]
pub struct RelayRequest {
    command: Command,
    target_addr: Address,
}

impl RelayRequest {
    pub fn new(command: Command, target_addr: Address) -> RelayRequest {
        RelayRequest { command, target_addr }
    }

    pub fn command(&self) -> Command {
        self.command
    }

    pub fn target_addr(&self) -> &Address {
        &self.target_addr
    }
}

impl Request for RelayRequest {
    async fn read_from<T: AsyncReadExt + Unpin>(stream: &mut T) -> Result<RelayRequest> {
        let mut buff: [u8; 3] = [0, 0, 0];
        stream.read_exact(&mut buff).await?;

        let (version, cmd, reserved) = (buff[0], buff[1], buff[2]);

        ensure!(version == consts::SOCKS5_VERSION, InvalidValue::ProtocolVersion(version));
        ensure!(reserved == 0x00, InvalidValue::ReservedValue(reserved));

        let command = Command::try_from(cmd)?;
        let target_addr = Address::read_from(stream).await?;

        Ok(RelayRequest { command, target_addr })
    }
}

impl Response for RelayRequest {
    async fn write_to<T: AsyncWriteExt + Unpin>(&self, stream: &mut T) -> Result<()> {
        let mut bytes = BytesMut::new();
        bytes.put_slice(&[consts::SOCKS5_VERSION, self.command.as_u8(), 0x00]);
        self.target_addr.write_to(&mut bytes)?;
        stream.write_all(&bytes).await?;
        Ok(())
    }
}
