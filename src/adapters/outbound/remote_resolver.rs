//! Remote DNS Resolver
//!
//! Queries an explicit DNS server with the raw wire protocol over UDP,
//! retrying over TCP when the UDP reply is truncated.

use crate::adapters::outbound::address_families::merge_families;
use crate::domain::errors::ResolveError;
use crate::domain::ports::Resolver;
use crate::domain::value_objects::{punycode, DnsStatus};
use crate::infrastructure::BatchContext;
use async_trait::async_trait;
use hickory_proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::{Name, RData, RecordType};
use hickory_proto::serialize::binary::{BinDecodable, BinEncodable};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};

const PROVIDER: &str = "remote";

/// Largest UDP payload we accept (EDNS-sized buffer).
const UDP_BUFFER: usize = 4096;

/// Resolver talking to one DNS server directly.
pub struct RemoteResolver {
    server: SocketAddr,
    timeout: Duration,
}

impl RemoteResolver {
    pub fn new(server: SocketAddr, timeout: Duration) -> Self {
        Self { server, timeout }
    }

    fn build_query(name: &str, record_type: RecordType) -> Result<(u16, Vec<u8>), ResolveError> {
        let ascii = punycode(name)?;
        let fqdn = Name::from_ascii(format!("{}.", ascii.trim_end_matches('.'))).map_err(|e| {
            ResolveError::Punycode {
                name: name.to_string(),
                message: e.to_string(),
            }
        })?;

        let id: u16 = rand::random();
        let mut message = Message::new();
        message
            .set_id(id)
            .set_message_type(MessageType::Query)
            .set_op_code(OpCode::Query)
            .set_recursion_desired(true);
        message.add_query(Query::query(fqdn, record_type));

        let bytes = message.to_bytes().map_err(decode_error)?;
        Ok((id, bytes))
    }

    /// Send one query and return the matching, successful response.
    async fn exchange(
        &self,
        ctx: &BatchContext,
        name: &str,
        record_type: RecordType,
    ) -> Result<Message, ResolveError> {
        let (id, query) = Self::build_query(name, record_type)?;

        tracing::debug!("{}: query {} {} via {}", PROVIDER, name, record_type, self.server);

        let mut response = self.with_deadline(ctx, self.exchange_udp(id, &query)).await?;

        if response.truncated() {
            tracing::debug!("{}: truncated reply for {}, retrying over TCP", PROVIDER, name);
            response = self.with_deadline(ctx, self.exchange_tcp(id, &query)).await?;
        }

        let rcode = response.response_code();
        if rcode != ResponseCode::NoError {
            return Err(ResolveError::Upstream {
                provider: PROVIDER,
                status: DnsStatus(u16::from(rcode)),
            });
        }

        Ok(response)
    }

    async fn with_deadline<F>(&self, ctx: &BatchContext, fut: F) -> Result<Message, ResolveError>
    where
        F: std::future::Future<Output = Result<Message, ResolveError>>,
    {
        match ctx.run(tokio::time::timeout(self.timeout, fut)).await {
            None => Err(ResolveError::Cancelled),
            Some(Err(_)) => Err(ResolveError::transport(
                PROVIDER,
                format!("no reply from {} within {:?}", self.server, self.timeout),
            )),
            Some(Ok(result)) => result,
        }
    }

    async fn exchange_udp(&self, id: u16, query: &[u8]) -> Result<Message, ResolveError> {
        let bind_addr = if self.server.is_ipv4() {
            "0.0.0.0:0"
        } else {
            "[::]:0"
        };
        let socket = UdpSocket::bind(bind_addr).await.map_err(transport_error)?;
        socket.connect(self.server).await.map_err(transport_error)?;
        socket.send(query).await.map_err(transport_error)?;

        let mut buf = vec![0u8; UDP_BUFFER];
        loop {
            let len = socket.recv(&mut buf).await.map_err(transport_error)?;
            match Message::from_bytes(&buf[..len]) {
                Ok(reply) if reply.id() == id => return Ok(reply),
                Ok(reply) => {
                    tracing::debug!("{}: ignoring reply with id {} (want {})", PROVIDER, reply.id(), id);
                }
                Err(e) => {
                    tracing::debug!("{}: ignoring malformed reply: {}", PROVIDER, e);
                }
            }
        }
    }

    async fn exchange_tcp(&self, id: u16, query: &[u8]) -> Result<Message, ResolveError> {
        let len = u16::try_from(query.len())
            .map_err(|_| ResolveError::transport(PROVIDER, "query too large for TCP framing"))?;

        let mut stream = TcpStream::connect(self.server).await.map_err(transport_error)?;
        let mut framed = Vec::with_capacity(query.len() + 2);
        framed.extend_from_slice(&len.to_be_bytes());
        framed.extend_from_slice(query);
        stream.write_all(&framed).await.map_err(transport_error)?;

        let reply_len = stream.read_u16().await.map_err(transport_error)? as usize;
        let mut buf = vec![0u8; reply_len];
        stream.read_exact(&mut buf).await.map_err(transport_error)?;

        let reply = Message::from_bytes(&buf).map_err(decode_error)?;
        if reply.id() != id {
            return Err(ResolveError::Decode {
                provider: PROVIDER,
                message: format!("TCP reply id {} does not match query id {}", reply.id(), id),
            });
        }
        Ok(reply)
    }

    async fn query_addresses(
        &self,
        ctx: &BatchContext,
        name: &str,
        record_type: RecordType,
    ) -> Result<Vec<IpAddr>, ResolveError> {
        let response = self.exchange(ctx, name, record_type).await?;
        Ok(response
            .answers()
            .iter()
            .filter_map(|record| match record.data() {
                Some(RData::A(a)) => Some(IpAddr::V4(a.0)),
                Some(RData::AAAA(aaaa)) => Some(IpAddr::V6(aaaa.0)),
                _ => None,
            })
            .collect())
    }
}

fn transport_error(e: std::io::Error) -> ResolveError {
    ResolveError::transport(PROVIDER, e)
}

fn decode_error(e: hickory_proto::error::ProtoError) -> ResolveError {
    ResolveError::Decode {
        provider: PROVIDER,
        message: e.to_string(),
    }
}

#[async_trait]
impl Resolver for RemoteResolver {
    fn provider(&self) -> &'static str {
        PROVIDER
    }

    async fn resolve_ip(&self, ctx: &BatchContext, name: &str) -> Result<Vec<IpAddr>, ResolveError> {
        let (v4, v6) = tokio::join!(
            self.query_addresses(ctx, name, RecordType::A),
            self.query_addresses(ctx, name, RecordType::AAAA),
        );
        merge_families(name, v4, v6)
    }

    async fn resolve_ns(&self, ctx: &BatchContext, name: &str) -> Result<Vec<String>, ResolveError> {
        let response = self.exchange(ctx, name, RecordType::NS).await?;
        Ok(response
            .answers()
            .iter()
            .filter_map(|record| match record.data() {
                Some(RData::NS(ns)) => Some(ns.0.to_ascii()),
                _ => None,
            })
            .collect())
    }
}
