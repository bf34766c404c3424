use crate::prelude::{Message, BUF_SIZE};
use crate::Handler;
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// DNS-over-TCP listener: each connection is framed with a 2-byte
/// big-endian length prefix per RFC 1035 §4.2.2, one query per prefix.
pub struct TcpServer<H> {
    address: SocketAddr,
    handler: std::sync::Arc<H>,
}

impl<H: Handler + Send + Sync + 'static> TcpServer<H> {
    pub fn new(address: SocketAddr, handler: H) -> Self {
        Self {
            address,
            handler: std::sync::Arc::new(handler),
        }
    }

    pub async fn run(&self) -> std::io::Result<()> {
        let listener = TcpListener::bind(self.address).await?;
        loop {
            let (stream, peer) = listener.accept().await?;
            let handler = self.handler.clone();
            tokio::spawn(async move {
                if let Err(error) = serve_connection(stream, peer, handler).await {
                    tracing::debug!("tcp connection from {peer:?} closed: {error}");
                }
            });
        }
    }
}

async fn serve_connection<H: Handler>(
    mut stream: TcpStream,
    peer: SocketAddr,
    handler: std::sync::Arc<H>,
) -> std::io::Result<()> {
    loop {
        let mut len_buf = [0u8; 2];
        if stream.read_exact(&mut len_buf).await.is_err() {
            return Ok(());
        }
        let len = u16::from_be_bytes(len_buf) as usize;
        if len == 0 || len > BUF_SIZE {
            return Ok(());
        }

        let mut buffer = [0u8; BUF_SIZE];
        stream.read_exact(&mut buffer[0..len]).await?;

        let request = Message {
            address: peer,
            buffer,
            size: len,
        };
        let response = handler.handle(request).await;

        stream
            .write_all(&(response.size as u16).to_be_bytes())
            .await?;
        stream.write_all(&response.buffer[0..response.size]).await?;
    }
}
