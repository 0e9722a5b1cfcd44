use std::future::Future;
use std::time::Duration;
use bytes::{Buf, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tokio::time;
use tracing::debug;
use crate::encoder::Encoder;
use crate::error::Error;
use crate::resp::{self, Type};

/// A framed RESP connection. Every network round trip is bounded by
/// `timeout`.
#[derive(Debug)]
pub struct Connection {
    stream: BufWriter<TcpStream>,
    buffer: BytesMut,
    timeout: Duration,
}

impl Connection {
    /// Create a new `Connection` instance.
    pub fn new(stream: TcpStream, timeout: Duration) -> Connection {
        Connection {
            stream: BufWriter::new(stream),
            buffer: BytesMut::with_capacity(4 * 1024),
            timeout,
        }
    }

    pub async fn connect(addr: &str, connect_timeout: Duration, timeout: Duration) -> crate::Result<Connection> {
        let stream = match time::timeout(connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(Error::Connection(format!("{}: {}", addr, e))),
            Err(_) => return Err(Error::Timeout(connect_timeout)),
        };
        stream.set_nodelay(true)?;
        debug!(%addr, "connected");
        Ok(Connection::new(stream, timeout))
    }

    /// Send a command and wait for its reply. Error replies become
    /// `Error::Server`.
    pub async fn request(&mut self, frame: &Type) -> crate::Result<Type> {
        self.write_frame(frame).await?;
        match self.read_frame().await? {
            Some(Type::SimpleError(msg)) => Err(Error::Server(msg)),
            Some(reply) => Ok(reply),
            None => Err(Error::Connection("connection closed by peer".into())),
        }
    }

    pub async fn write_frame(&mut self, frame: &Type) -> crate::Result<()> {
        let data = Encoder::encode(frame);
        let stream = &mut self.stream;
        bounded(self.timeout, async move {
            stream.write_all(&data).await?;
            stream.flush().await
        })
        .await
    }

    pub async fn read_frame(&mut self) -> crate::Result<Option<Type>> {
        loop {
            if let Some(frame) = self.parse_frame()? {
                return Ok(Some(frame));
            }
            let n = bounded(self.timeout, self.stream.read_buf(&mut self.buffer)).await?;
            if 0 == n {
                if self.buffer.is_empty() {
                    return Ok(None);
                } else {
                    return Err(Error::Connection("connection reset by peer".into()));
                }
            }
        }
    }

    fn parse_frame(&mut self) -> crate::Result<Option<Type>> {
        match resp::decode(&self.buffer)? {
            Some((frame, len)) => {
                self.buffer.advance(len);
                Ok(Some(frame))
            }
            None => Ok(None),
        }
    }
}

async fn bounded<T, F>(limit: Duration, fut: F) -> crate::Result<T>
where
    F: Future<Output = std::io::Result<T>>,
{
    match time::timeout(limit, fut).await {
        Ok(Ok(v)) => Ok(v),
        Ok(Err(e)) => Err(Error::Connection(e.to_string())),
        Err(_) => Err(Error::Timeout(limit)),
    }
}
