use crate::config::UpstreamConfig;
use radkit_proto::{auth, Attribute, Code, Dictionary, Packet, PacketError};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, trace};

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Packet error: {0}")]
    Packet(#[from] PacketError),
    #[error("invalid upstream address: {0}")]
    InvalidAddress(String),
    #[error("client has no upstream servers")]
    NoUpstreams,
    #[error("retry must be positive")]
    ZeroRetry,
    #[error("delay must be positive")]
    ZeroDelay,
    #[error("request rejected")]
    Rejected(Packet),
    #[error("no acceptable response after {attempts} attempts")]
    Timeout { attempts: u32 },
}

/// An upstream server plus its identifier counter. Identifiers start at a
/// random byte and increment mod 256 per allocated request.
#[derive(Debug)]
struct Upstream {
    address: IpAddr,
    auth_port: u16,
    acct_port: u16,
    secret: Vec<u8>,
    next_identifier: u8,
}

impl Upstream {
    fn from_config(config: &UpstreamConfig) -> Result<Upstream, ClientError> {
        let address = config
            .address
            .parse()
            .map_err(|_| ClientError::InvalidAddress(config.address.clone()))?;
        Ok(Upstream {
            address,
            auth_port: config.auth_port,
            acct_port: config.acct_port,
            secret: config.secret.as_bytes().to_vec(),
            next_identifier: rand::random(),
        })
    }

    fn allocate_identifier(&mut self) -> u8 {
        let identifier = self.next_identifier;
        self.next_identifier = self.next_identifier.wrapping_add(1);
        identifier
    }

    fn port_for(&self, code: Code) -> u16 {
        match code {
            Code::AccountingRequest => self.acct_port,
            _ => self.auth_port,
        }
    }
}

/// Request state cached per upstream across attempts, so every retransmit
/// to the same server carries the same identifier and authenticator.
struct PendingRequest {
    identifier: u8,
    authenticator: [u8; 16],
    wire: Vec<u8>,
}

/// RADIUS client with retries and strict round-robin server selection.
///
/// Each `send` opens an ephemeral UDP socket scoped to that call; the
/// socket closes on success, rejection, and timeout alike.
pub struct Client {
    dictionary: Arc<Dictionary>,
    upstreams: Vec<Upstream>,
    retry: u32,
    delay: Duration,
}

impl Client {
    pub fn new(
        dictionary: Arc<Dictionary>,
        upstreams: &[UpstreamConfig],
        retry: u32,
        delay: Duration,
    ) -> Result<Client, ClientError> {
        if upstreams.is_empty() {
            return Err(ClientError::NoUpstreams);
        }
        if retry == 0 {
            return Err(ClientError::ZeroRetry);
        }
        if delay.is_zero() {
            return Err(ClientError::ZeroDelay);
        }
        Ok(Client {
            dictionary,
            upstreams: upstreams
                .iter()
                .map(Upstream::from_config)
                .collect::<Result<_, _>>()?,
            retry,
            delay,
        })
    }

    /// Send a request and wait for an acceptable response.
    ///
    /// Up to `retry × servers` datagrams go out, one per attempt, rotating
    /// through the servers. Datagrams from the wrong source, unparseable
    /// replies, identifier mismatches, and bad response authenticators are
    /// ignored; the wait simply continues until the attempt's delay window
    /// closes. Access-Reject resolves the call with
    /// [`ClientError::Rejected`] carrying the response packet.
    pub async fn send(
        &mut self,
        code: Code,
        attributes: Vec<Attribute>,
    ) -> Result<Packet, ClientError> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        let server_count = self.upstreams.len();
        let attempts = self.retry * server_count as u32;
        let mut pending: Vec<Option<PendingRequest>> =
            (0..server_count).map(|_| None).collect();
        let mut buf = vec![0u8; Packet::MAX_SIZE];

        for attempt in 0..attempts {
            let index = attempt as usize % server_count;

            if pending[index].is_none() {
                let identifier = self.upstreams[index].allocate_identifier();
                let mut packet = Packet::new(code, identifier);
                for attribute in attributes.iter().cloned() {
                    packet.add(attribute)?;
                }
                let wire = packet.encode(&self.upstreams[index].secret, false)?;
                pending[index] = Some(PendingRequest {
                    identifier,
                    authenticator: *packet.authenticator(),
                    wire,
                });
            }

            let upstream = &self.upstreams[index];
            let request = pending[index].as_ref().unwrap();
            let target = SocketAddr::new(upstream.address, upstream.port_for(code));

            debug!(
                server = %target,
                identifier = request.identifier,
                attempt,
                "sending {code}"
            );
            socket.send_to(&request.wire, target).await?;

            let deadline = Instant::now() + self.delay;
            loop {
                let (len, from) = match timeout_at(deadline, socket.recv_from(&mut buf)).await {
                    Err(_) => break, // window closed, next attempt
                    Ok(received) => received?,
                };
                if from != target {
                    trace!(%from, "ignoring datagram from unexpected source");
                    continue;
                }
                let datagram = &buf[..len];

                let reply = match Packet::decode(&self.dictionary, datagram, &upstream.secret) {
                    Ok(reply) => reply,
                    Err(e) => {
                        debug!(%from, error = %e, "ignoring unparseable reply");
                        continue;
                    }
                };
                if reply.identifier() != request.identifier {
                    trace!(
                        expected = request.identifier,
                        got = reply.identifier(),
                        "ignoring reply with stale identifier"
                    );
                    continue;
                }
                if !auth::verify_response(datagram, &request.authenticator, &upstream.secret) {
                    debug!(%from, "ignoring reply with bad response authenticator");
                    continue;
                }

                match (code, reply.code()) {
                    (Code::AccessRequest, Code::AccessAccept) => return Ok(reply),
                    (Code::AccessRequest, Code::AccessReject) => {
                        return Err(ClientError::Rejected(reply))
                    }
                    (Code::AccountingRequest, Code::AccountingResponse) => return Ok(reply),
                    (_, other) => {
                        trace!(code = %other, "ignoring reply with unexpected code");
                    }
                }
            }
        }

        Err(ClientError::Timeout { attempts })
    }
}
