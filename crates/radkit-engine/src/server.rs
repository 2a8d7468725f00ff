use crate::config::ClientRegistry;
use async_trait::async_trait;
use radkit_proto::dictionary::AttributeDef;
use radkit_proto::{standard, Code, Dictionary, DictionaryError, Packet, PacketError};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use thiserror::Error;
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Packet error: {0}")]
    Packet(#[from] PacketError),
    #[error("Dictionary error: {0}")]
    Dictionary(#[from] DictionaryError),
}

/// Which port a datagram arrived on. Drives default-response selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketRole {
    Auth,
    Acct,
}

/// What a handler wants done with the transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Pass the response to the next handler in the chain.
    Continue,
    /// Stop the chain and send the response as it stands.
    Done,
}

pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// A hook in the server's dispatch chain.
///
/// Handlers run in registration order and may mutate the response (change
/// its code, append attributes). Returning [`Outcome::Done`]
/// short-circuits the chain. Returning an error aborts the transaction:
/// no response is sent and the client eventually times out, since RADIUS
/// has no error-response primitive.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle_auth(&self, _req: &Packet, _res: &mut Packet) -> Result<Outcome, HandlerError> {
        Ok(Outcome::Continue)
    }

    async fn handle_acct(&self, _req: &Packet, _res: &mut Packet) -> Result<Outcome, HandlerError> {
        Ok(Outcome::Continue)
    }
}

/// Username/password map implementing PAP authentication.
///
/// Flips the default Access-Reject to Access-Accept when the request's
/// decrypted User-Password matches; otherwise leaves the response alone
/// for the rest of the chain.
pub struct PapHandler {
    users: std::collections::HashMap<String, String>,
    user_name: Arc<AttributeDef>,
    user_password: Arc<AttributeDef>,
}

impl PapHandler {
    pub fn new(dict: &Dictionary) -> Result<PapHandler, DictionaryError> {
        Ok(PapHandler {
            users: std::collections::HashMap::new(),
            user_name: dict.attribute(standard::USER_NAME)?,
            user_password: dict.attribute(standard::USER_PASSWORD)?,
        })
    }

    pub fn add_user(&mut self, username: impl Into<String>, password: impl Into<String>) {
        self.users.insert(username.into(), password.into());
    }
}

#[async_trait]
impl Handler for PapHandler {
    async fn handle_auth(&self, req: &Packet, res: &mut Packet) -> Result<Outcome, HandlerError> {
        let username = match req.get(&self.user_name).and_then(|a| a.value().as_text()) {
            Some(name) => name,
            None => return Ok(Outcome::Continue),
        };
        let password = match req.get(&self.user_password).and_then(|a| a.value().as_text()) {
            Some(password) => password,
            None => return Ok(Outcome::Continue),
        };

        if self.users.get(username).is_some_and(|p| p == password) {
            info!(username, "authentication successful");
            res.set_code(Code::AccessAccept)?;
            return Ok(Outcome::Done);
        }

        warn!(username, "authentication failed");
        Ok(Outcome::Continue)
    }
}

/// Server configuration: bind points, shared dictionary, client registry,
/// and the ordered handler chain.
pub struct ServerConfig {
    pub bind_address: IpAddr,
    pub auth_port: u16,
    pub acct_port: u16,
    pub dictionary: Arc<Dictionary>,
    pub clients: ClientRegistry,
    pub handlers: Vec<Arc<dyn Handler>>,
}

struct Shared {
    dictionary: Arc<Dictionary>,
    clients: ClientRegistry,
    handlers: Vec<Arc<dyn Handler>>,
    proxy_state: Arc<AttributeDef>,
}

/// The RADIUS server: one UDP socket per role, one spawned task per
/// datagram. Shared state is immutable after startup, so tasks only hold
/// `Arc`s.
pub struct Server {
    shared: Arc<Shared>,
    auth_socket: Arc<UdpSocket>,
    acct_socket: Arc<UdpSocket>,
}

impl Server {
    pub async fn new(config: ServerConfig) -> Result<Server, ServerError> {
        let auth_socket =
            UdpSocket::bind(SocketAddr::new(config.bind_address, config.auth_port)).await?;
        let acct_socket =
            UdpSocket::bind(SocketAddr::new(config.bind_address, config.acct_port)).await?;
        info!(
            auth = %auth_socket.local_addr()?,
            acct = %acct_socket.local_addr()?,
            "RADIUS server listening"
        );

        if config.clients.is_empty() {
            warn!("no clients configured; all requests will be dropped");
        }

        let proxy_state = config.dictionary.attribute(standard::PROXY_STATE)?;
        Ok(Server {
            shared: Arc::new(Shared {
                dictionary: config.dictionary,
                clients: config.clients,
                handlers: config.handlers,
                proxy_state,
            }),
            auth_socket: Arc::new(auth_socket),
            acct_socket: Arc::new(acct_socket),
        })
    }

    /// Local address of the authentication socket. Useful for tests that
    /// bind port 0.
    pub fn auth_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.auth_socket.local_addr()?)
    }

    /// Local address of the accounting socket.
    pub fn acct_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.acct_socket.local_addr()?)
    }

    /// Run both receive loops until one fails.
    pub async fn run(&self) -> Result<(), ServerError> {
        tokio::try_join!(
            Self::serve(self.shared.clone(), self.auth_socket.clone(), SocketRole::Auth),
            Self::serve(self.shared.clone(), self.acct_socket.clone(), SocketRole::Acct),
        )?;
        Ok(())
    }

    async fn serve(
        shared: Arc<Shared>,
        socket: Arc<UdpSocket>,
        role: SocketRole,
    ) -> Result<(), ServerError> {
        let mut buf = vec![0u8; Packet::MAX_SIZE];
        loop {
            let (len, addr) = socket.recv_from(&mut buf).await?;
            let data = buf[..len].to_vec();

            let shared = Arc::clone(&shared);
            let socket = Arc::clone(&socket);
            tokio::spawn(async move {
                Self::handle_datagram(shared, socket, role, data, addr).await;
            });
        }
    }

    async fn handle_datagram(
        shared: Arc<Shared>,
        socket: Arc<UdpSocket>,
        role: SocketRole,
        data: Vec<u8>,
        addr: SocketAddr,
    ) {
        let secret = match shared.clients.secret_for(addr.ip()) {
            Some(secret) => secret,
            None => {
                warn!(client_ip = %addr.ip(), "dropping request from unknown client");
                return;
            }
        };

        // malformed datagrams are dropped without any reply
        let request = match Packet::decode(&shared.dictionary, &data, secret) {
            Ok(packet) => packet,
            Err(e) => {
                debug!(client_ip = %addr.ip(), error = %e, "dropping malformed packet");
                return;
            }
        };

        let response_code = match default_response_code(role, request.code()) {
            Some(code) => code,
            None => {
                warn!(
                    role = ?role,
                    code = %request.code(),
                    client_ip = %addr.ip(),
                    "unsupported packet code for this socket"
                );
                return;
            }
        };

        debug!(
            code = %request.code(),
            client_addr = %addr,
            request_id = request.identifier(),
            "received RADIUS packet"
        );

        let mut response = request.reply(response_code);

        // RFC 2865 §2: echo Proxy-State attributes back in order
        for attr in request.get_all(&shared.proxy_state) {
            if response.add(attr.clone()).is_err() {
                return;
            }
        }

        // Status-Server is answered directly; everything else runs the
        // handler chain
        if request.code() != Code::StatusServer {
            for handler in &shared.handlers {
                let step = match role {
                    SocketRole::Auth => handler.handle_auth(&request, &mut response).await,
                    SocketRole::Acct => handler.handle_acct(&request, &mut response).await,
                };
                match step {
                    Ok(Outcome::Continue) => {}
                    Ok(Outcome::Done) => break,
                    Err(e) => {
                        warn!(
                            client_ip = %addr.ip(),
                            request_id = request.identifier(),
                            error = %e,
                            "handler failed; dropping transaction"
                        );
                        return;
                    }
                }
            }
        }

        let wire = match response.encode(secret, true) {
            Ok(wire) => wire,
            Err(e) => {
                warn!(error = %e, "failed to encode response");
                return;
            }
        };

        if let Err(e) = socket.send_to(&wire, addr).await {
            warn!(client_addr = %addr, error = %e, "failed to send response");
            return;
        }

        debug!(
            code = %response.code(),
            client_addr = %addr,
            request_id = response.identifier(),
            "sent RADIUS response"
        );
    }
}

/// RFC-mandated default responses per socket role.
fn default_response_code(role: SocketRole, request: Code) -> Option<Code> {
    match (role, request) {
        (SocketRole::Auth, Code::AccessRequest) => Some(Code::AccessReject),
        (SocketRole::Auth, Code::StatusServer) => Some(Code::AccessAccept),
        (SocketRole::Acct, Code::AccountingRequest) => Some(Code::AccountingResponse),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_response_codes() {
        assert_eq!(
            default_response_code(SocketRole::Auth, Code::AccessRequest),
            Some(Code::AccessReject)
        );
        assert_eq!(
            default_response_code(SocketRole::Auth, Code::StatusServer),
            Some(Code::AccessAccept)
        );
        assert_eq!(
            default_response_code(SocketRole::Acct, Code::AccountingRequest),
            Some(Code::AccountingResponse)
        );
        // accounting requests on the auth socket (and vice versa) are dropped
        assert_eq!(
            default_response_code(SocketRole::Auth, Code::AccountingRequest),
            None
        );
        assert_eq!(
            default_response_code(SocketRole::Acct, Code::AccessRequest),
            None
        );
        assert_eq!(
            default_response_code(SocketRole::Acct, Code::StatusServer),
            None
        );
    }

    #[tokio::test]
    async fn test_pap_handler_accepts_known_user() {
        use radkit_proto::{Attribute, Value};

        let dict = Dictionary::standard();
        let mut handler = PapHandler::new(&dict).unwrap();
        handler.add_user("alice", "secret1");

        // decode a real request so the password attribute goes through the
        // encrypt/decrypt path
        let mut request = Packet::new(Code::AccessRequest, 1);
        request
            .add(Attribute::by_name(&dict, "User-Name", Value::text("alice").unwrap()).unwrap())
            .unwrap();
        request
            .add(
                Attribute::by_name(&dict, "User-Password", Value::text("secret1").unwrap())
                    .unwrap(),
            )
            .unwrap();
        let wire = request.encode(b"s3cr3t", false).unwrap();
        let request = Packet::decode(&dict, &wire, b"s3cr3t").unwrap();

        let mut response = request.reply(Code::AccessReject);
        let outcome = handler.handle_auth(&request, &mut response).await.unwrap();
        assert_eq!(outcome, Outcome::Done);
        assert_eq!(response.code(), Code::AccessAccept);
    }

    #[tokio::test]
    async fn test_pap_handler_leaves_reject_for_bad_password() {
        use radkit_proto::{Attribute, Value};

        let dict = Dictionary::standard();
        let mut handler = PapHandler::new(&dict).unwrap();
        handler.add_user("alice", "secret1");

        let mut request = Packet::new(Code::AccessRequest, 1);
        request
            .add(Attribute::by_name(&dict, "User-Name", Value::text("alice").unwrap()).unwrap())
            .unwrap();
        request
            .add(
                Attribute::by_name(&dict, "User-Password", Value::text("wrong").unwrap()).unwrap(),
            )
            .unwrap();
        let wire = request.encode(b"s3cr3t", false).unwrap();
        let request = Packet::decode(&dict, &wire, b"s3cr3t").unwrap();

        let mut response = request.reply(Code::AccessReject);
        let outcome = handler.handle_auth(&request, &mut response).await.unwrap();
        assert_eq!(outcome, Outcome::Continue);
        assert_eq!(response.code(), Code::AccessReject);
    }
}
