use std::net::SocketAddr;

/// Wire-size datagram buffer, matching `redoubt-proto`'s packet buffer
/// so a single `Message` fits anything a UDP or TCP listener hands it.
pub const BUF_SIZE: usize = 4096;

pub struct Message {
    pub address: SocketAddr,
    pub buffer: [u8; BUF_SIZE],
    pub size: usize,
}

impl Message {
    pub fn empty(address: SocketAddr) -> Self {
        Self {
            address,
            buffer: [0u8; BUF_SIZE],
            size: 0,
        }
    }
}
