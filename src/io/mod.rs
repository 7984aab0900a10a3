use anyhow::Result;
use log::trace;
use std::{
    fmt::Debug,
    ops::{Deref, DerefMut},
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

pub mod tunnel;

/// Fixed-size protocol message that can be reassembled from a stream.
///
/// `read_from` pulls exactly as many bytes as the message layout requires,
/// however the transport fragments them, and resolves once with either the
/// decoded message or an error.
pub trait Request {
    async fn read_from<T: AsyncReadExt + Unpin>(stream: &mut T) -> Result<Self>
    where
        Self: std::marker::Sized;
}

/// Protocol message that serializes itself fully onto a stream.
pub trait Response {
    async fn write_to<T: AsyncWriteExt + Unpin>(&self, stream: &mut T) -> Result<()>;
}

pub struct MorayStream<S>
where
    S: AsyncReadExt + AsyncWriteExt + Unpin,
{
    stream: S,
}

impl<S> MorayStream<S>
where
    S: AsyncReadExt + AsyncWriteExt + Unpin,
{
    pub fn new(stream: S) -> MorayStream<S> {
        MorayStream { stream }
    }

    pub async fn read_request<R>(&mut self) -> Result<R>
    where
        R: Request + Debug,
    {
        let request = R::read_from(&mut self.stream).await?;
        trace!("Read {:?}", request);

        Ok(request)
    }

    pub async fn write_response<R>(&mut self, response: R) -> Result<()>
    where
        R: Response + Debug,
    {
        response.write_to(&mut self.stream).await?;
        trace!("Write {:?}", response);

        Ok(())
    }
}

impl<S> Deref for MorayStream<S>
where
    S: AsyncReadExt + AsyncWriteExt + Unpin,
{
    type Target = S;
    fn deref(&self) -> &Self::Target {
        &self.stream
    }
}

impl<S> DerefMut for MorayStream<S>
where
    S: AsyncReadExt + AsyncWriteExt + Unpin,
{
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.stream
    }
}
