use anyhow::{bail, Result};
use log::{debug, error};
use tokio::io::{copy_bidirectional, AsyncRead, AsyncWrite};

/// Bidirectional relay between the client stream and the target stream.
///
/// Each direction alternates a bounded read with a complete write, so a slow
/// receiver naturally defers further reads from its counterpart. Runs until
/// either side closes or errors.
pub struct MorayTunnel<'a, X, Y>
where
    X: AsyncRead + AsyncWrite + Unpin,
    Y: AsyncRead + AsyncWrite + Unpin,
{
    l2r: &'a mut X,
    r2l: &'a mut Y,
}

impl<'a, X, Y> MorayTunnel<'a, X, Y>
where
    X: AsyncRead + AsyncWrite + Unpin,
    Y: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(l2r: &'a mut X, r2l: &'a mut Y) -> MorayTunnel<'a, X, Y> {
        MorayTunnel { l2r, r2l }
    }

    pub async fn run(&mut self) -> Result<(u64, u64)> {
        match copy_bidirectional(self.l2r, self.r2l).await {
            Ok((l2r, r2l)) => {
                debug!("Tunnel closed, L2R {} bytes, R2L {} bytes transmitted", l2r, r2l);
                Ok((l2r, r2l))
            }
            Err(err) => {
                error!("Tunnel closed with error: {}", err);
                bail!(err)
            }
        }
    }
}
