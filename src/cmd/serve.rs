use crate::dns::chain::{Chain, Handler as DnsHandler};
use crate::dns::context::{Context, Proto};
use crate::dns::writer::{BaseWriter, ResponseWriter};
use clap::Args;
use redoubt_proto::buffer::BytePacketBuffer;
use redoubt_proto::packet::header::ResponseCode;
use redoubt_proto::packet::DnsPacket;
use redoubt_transport::prelude::Message;
use redoubt_transport::{tcp::TcpServer, UdpServer};
use std::net::SocketAddr;
use std::sync::Arc;

/// Adapts the handler chain to `redoubt_transport::Handler`: parses the
/// wire buffer, drives one request through a fresh `Chain`, and
/// serializes whatever the chain wrote back out. Shared by the UDP and
/// TCP listeners -- transport framing is the only thing that differs
/// between them.
struct ChainHandler {
    handlers: Arc<[Box<dyn DnsHandler>]>,
    proto: Proto,
}

impl ChainHandler {
    fn new(handlers: Arc<[Box<dyn DnsHandler>]>, proto: Proto) -> Self {
        Self { handlers, proto }
    }

    fn servfail(request: Option<&DnsPacket>, id: u16) -> DnsPacket {
        match request {
            Some(request) => {
                let mut reply = DnsPacket::response_from(request);
                reply.header.response_code = ResponseCode::ServerFailure;
                reply
            }
            None => {
                let mut reply = DnsPacket::new(redoubt_proto::packet::header::Header::response(id));
                reply.header.response_code = ResponseCode::FormatError;
                reply
            }
        }
    }
}

#[async_trait::async_trait]
impl redoubt_transport::Handler for ChainHandler {
    async fn handle(&self, message: Message) -> Message {
        let address = message.address;
        let buffer = BytePacketBuffer::new(message.buffer);
        let parsed = DnsPacket::try_from(buffer);
        let mut request = match parsed {
            Ok(request) => request,
            Err(error) => {
                tracing::debug!("dropping malformed query from {address:?}: {error:?}");
                let reply = Self::servfail(None, 0);
                return encode(address, &reply);
            }
        };

        let mut ctx = Context::new(address, self.proto);
        let mut writer = BaseWriter::new(address.ip(), self.proto, false);
        let mut chain = Chain::new(self.handlers.clone());
        chain.next(&mut ctx, &mut request, &mut writer).await;

        let reply = match writer.msg() {
            Some(msg) => msg.clone(),
            None => Self::servfail(Some(&request), request.header.id),
        };

        encode(address, &reply)
    }
}

fn encode(address: SocketAddr, reply: &DnsPacket) -> Message {
    match reply.create_buffer() {
        Ok(buffer) => {
            let size = buffer.pos();
            Message {
                address,
                buffer: buffer.buf,
                size,
            }
        }
        Err(error) => {
            tracing::error!("unable to encode reply to {address:?}: {error:?}");
            Message::empty(address)
        }
    }
}

/// Starts the resolver: binds the UDP and (if configured) TCP listeners
/// and runs them side by side until the process is asked to stop.
#[derive(Args, Debug)]
pub struct Command;

impl Command {
    pub async fn run(&self, config: crate::config::Config) {
        tracing::info!("preparing redoubt");

        let database = config
            .database
            .build()
            .await
            .expect("unable to connect to database");
        crate::service::database::migrate(&database)
            .await
            .expect("unable to migrate the database");

        let blocklist: Arc<dyn crate::dns::blocklist_service::BlocklistService> =
            Arc::new(config.blocklist.build(database));
        if let Err(error) = blocklist.import().await {
            tracing::warn!("initial blocklist import failed: {error:?}");
        }

        let cache: Arc<dyn crate::dns::cache::CacheService> = Arc::new(config.cache.build());
        let manager = Arc::new(config.resolver.build());
        let zones = config.hosts.build_zones();

        let hosts = Arc::new(if config.hosts.hostsfile.is_empty() {
            crate::dns::hosts::HostsFile::preloaded(crate::dns::hosts::HostsMap::default())
        } else {
            crate::dns::hosts::HostsFile::new(std::path::PathBuf::from(&config.hosts.hostsfile))
        });
        {
            let hosts = hosts.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(std::time::Duration::from_secs(5));
                loop {
                    ticker.tick().await;
                    hosts.refresh_if_stale().await;
                }
            });
        }

        let bindtls_empty = config.dns.bindtls.is_empty();
        let address = config.dns.address();
        let reload_handle = blocklist.clone();

        let services = crate::dns::Services {
            blocklist,
            cache,
            manager,
            hosts,
            zones,
            cookie_secret: config.ratelimit.secret(),
            access_cidrs: config.accesslist.cidrs,
            rate_per_minute: config.ratelimit.clientratelimit,
            reflex: config.reflex.finish(),
            chaos: config.chaos.finish(),
            dnstap_socket: config.logging.dnstap_socket(),
            accesslog_enabled: config.logging.accesslog_enabled(),
            dnstap_identity: config.logging.dnstapidentity,
            dnstap_version: config.logging.dnstapversion,
        };
        let handlers = crate::dns::build_registry(services).build();

        let udp = UdpServer::new(address, ChainHandler::new(handlers.clone(), Proto::Udp));
        let udp_task = tokio::spawn(async move {
            if let Err(error) = udp.run().await {
                tracing::error!("udp listener stopped: {error}");
            }
        });

        let tcp_task = if bindtls_empty {
            let tcp = TcpServer::new(address, ChainHandler::new(handlers.clone(), Proto::Tcp));
            Some(tokio::spawn(async move {
                if let Err(error) = tcp.run().await {
                    tracing::error!("tcp listener stopped: {error}");
                }
            }))
        } else {
            None
        };

        tracing::info!("redoubt listening on {address}");

        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("unable to install SIGTERM handler");
        let mut sigusr1 = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::user_defined1())
            .expect("unable to install SIGUSR1 handler");

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("received interrupt, shutting down");
                    break;
                }
                _ = sigterm.recv() => {
                    tracing::info!("received SIGTERM, shutting down");
                    break;
                }
                _ = sigusr1.recv() => {
                    tracing::info!("received SIGUSR1, reloading blocklists");
                    match reload_handle.import().await {
                        Ok((inserted, deleted)) => tracing::info!(
                            "blocklist reload inserted {inserted} domains, deleted {deleted}"
                        ),
                        Err(error) => tracing::error!("blocklist reload failed: {error:?}"),
                    }
                }
            }
        }

        udp_task.abort();
        if let Some(tcp_task) = tcp_task {
            tcp_task.abort();
        }
    }
}
