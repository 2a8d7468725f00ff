//! End-to-end tests for the radkit engine: server dispatch over real UDP
//! sockets, default-response synthesis, Proxy-State echoing, and the
//! client retry/round-robin loop.

use async_trait::async_trait;
use radkit_engine::{
    Client, ClientError, ClientRegistry, Handler, HandlerError, Outcome, PapHandler, Server,
    ServerConfig, UpstreamConfig,
};
use radkit_proto::{auth, Attribute, Code, Dictionary, Packet, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tokio::time::timeout;

const SECRET: &[u8] = b"testing123";

async fn spawn_server(handlers: Vec<Arc<dyn Handler>>) -> (SocketAddr, SocketAddr) {
    let dictionary = Arc::new(Dictionary::standard());
    let mut clients = ClientRegistry::default();
    clients.insert("127.0.0.1/32".parse().unwrap(), SECRET);

    let server = Server::new(ServerConfig {
        bind_address: "127.0.0.1".parse().unwrap(),
        auth_port: 0,
        acct_port: 0,
        dictionary,
        clients,
        handlers,
    })
    .await
    .expect("failed to bind server");

    let auth_addr = server.auth_addr().unwrap();
    let acct_addr = server.acct_addr().unwrap();
    tokio::spawn(async move {
        server.run().await.expect("server failed");
    });
    (auth_addr, acct_addr)
}

fn pap_handler(dict: &Dictionary, username: &str, password: &str) -> Arc<dyn Handler> {
    let mut handler = PapHandler::new(dict).unwrap();
    handler.add_user(username, password);
    Arc::new(handler)
}

/// Send a pre-built packet from a throwaway socket and wait briefly for a
/// reply datagram.
async fn send_raw(packet: &Packet, server: SocketAddr) -> Option<Vec<u8>> {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let wire = packet.encode(SECRET, false).unwrap();
    socket.send_to(&wire, server).await.unwrap();

    let mut buf = [0u8; 4096];
    match timeout(Duration::from_secs(2), socket.recv_from(&mut buf)).await {
        Ok(Ok((len, _))) => Some(buf[..len].to_vec()),
        _ => None,
    }
}

fn upstream_for(addr: SocketAddr) -> UpstreamConfig {
    UpstreamConfig {
        address: addr.ip().to_string(),
        auth_port: addr.port(),
        acct_port: addr.port(),
        secret: String::from_utf8(SECRET.to_vec()).unwrap(),
    }
}

#[tokio::test]
async fn test_default_reject_echoes_proxy_state() {
    let (auth_addr, _) = spawn_server(vec![]).await;
    let dict = Dictionary::standard();

    let mut request = Packet::new(Code::AccessRequest, 17);
    request
        .add(Attribute::by_name(&dict, "User-Name", Value::text("nobody").unwrap()).unwrap())
        .unwrap();
    request
        .add(Attribute::by_name(&dict, "Proxy-State", Value::octets(&b"test"[..]).unwrap()).unwrap())
        .unwrap();

    let raw = send_raw(&request, auth_addr).await.expect("no response");
    assert!(auth::verify_response(&raw, request.authenticator(), SECRET));

    let response = Packet::decode(&dict, &raw, SECRET).unwrap();
    assert_eq!(response.code(), Code::AccessReject);
    assert_eq!(response.identifier(), 17);

    let proxy_state = dict.attribute_by_name("Proxy-State").unwrap();
    let echoed: Vec<&[u8]> = response
        .get_all(&proxy_state)
        .map(|a| a.value().as_octets().unwrap())
        .collect();
    assert_eq!(echoed, [&b"test"[..]]);
    assert_eq!(response.attributes().len(), 1);
}

#[tokio::test]
async fn test_status_server_answered_without_handlers() {
    struct FailingHandler;

    #[async_trait]
    impl Handler for FailingHandler {
        async fn handle_auth(
            &self,
            _req: &Packet,
            _res: &mut Packet,
        ) -> Result<Outcome, HandlerError> {
            Err("backend unavailable".into())
        }
    }

    // the failing handler must never run: Status-Server bypasses the chain
    let (auth_addr, _) = spawn_server(vec![Arc::new(FailingHandler)]).await;
    let dict = Dictionary::standard();

    let request = Packet::new(Code::StatusServer, 3);
    let raw = send_raw(&request, auth_addr).await.expect("no response");
    let response = Packet::decode(&dict, &raw, SECRET).unwrap();
    assert_eq!(response.code(), Code::AccessAccept);
    assert_eq!(response.identifier(), 3);
}

#[tokio::test]
async fn test_handler_error_drops_response() {
    struct FailingHandler;

    #[async_trait]
    impl Handler for FailingHandler {
        async fn handle_auth(
            &self,
            _req: &Packet,
            _res: &mut Packet,
        ) -> Result<Outcome, HandlerError> {
            Err("backend unavailable".into())
        }
    }

    let (auth_addr, _) = spawn_server(vec![Arc::new(FailingHandler)]).await;
    let dict = Dictionary::standard();

    let mut request = Packet::new(Code::AccessRequest, 9);
    request
        .add(Attribute::by_name(&dict, "User-Name", Value::text("alice").unwrap()).unwrap())
        .unwrap();

    assert!(send_raw(&request, auth_addr).await.is_none());
}

#[tokio::test]
async fn test_unknown_client_is_dropped() {
    // registry only knows 192.0.2.0/24; loopback traffic must be ignored
    let dictionary = Arc::new(Dictionary::standard());
    let mut clients = ClientRegistry::default();
    clients.insert("192.0.2.0/24".parse().unwrap(), SECRET);

    let server = Server::new(ServerConfig {
        bind_address: "127.0.0.1".parse().unwrap(),
        auth_port: 0,
        acct_port: 0,
        dictionary,
        clients,
        handlers: vec![],
    })
    .await
    .unwrap();
    let auth_addr = server.auth_addr().unwrap();
    tokio::spawn(async move {
        server.run().await.unwrap();
    });

    let request = Packet::new(Code::AccessRequest, 1);
    assert!(send_raw(&request, auth_addr).await.is_none());
}

#[tokio::test]
async fn test_wrong_role_socket_drops_request() {
    let (_, acct_addr) = spawn_server(vec![]).await;

    // an Access-Request on the accounting socket has no default response
    let request = Packet::new(Code::AccessRequest, 5);
    assert!(send_raw(&request, acct_addr).await.is_none());
}

#[tokio::test]
async fn test_handler_chain_short_circuit_and_order() {
    struct AcceptAll;

    #[async_trait]
    impl Handler for AcceptAll {
        async fn handle_auth(
            &self,
            _req: &Packet,
            res: &mut Packet,
        ) -> Result<Outcome, HandlerError> {
            res.set_code(Code::AccessAccept)?;
            Ok(Outcome::Done)
        }
    }

    struct TagHandler;

    #[async_trait]
    impl Handler for TagHandler {
        async fn handle_auth(
            &self,
            _req: &Packet,
            res: &mut Packet,
        ) -> Result<Outcome, HandlerError> {
            let dict = Dictionary::standard();
            res.add(Attribute::by_name(&dict, "Reply-Message", Value::text("tagged")?)?)?;
            Ok(Outcome::Continue)
        }
    }

    let dict = Dictionary::standard();
    let reply_message = dict.attribute_by_name("Reply-Message").unwrap();
    let mut request = Packet::new(Code::AccessRequest, 2);
    request
        .add(Attribute::by_name(&dict, "User-Name", Value::text("bob").unwrap()).unwrap())
        .unwrap();

    // Done short-circuits: the tagger never runs
    let (auth_addr, _) = spawn_server(vec![Arc::new(AcceptAll), Arc::new(TagHandler)]).await;
    let raw = send_raw(&request, auth_addr).await.expect("no response");
    let response = Packet::decode(&dict, &raw, SECRET).unwrap();
    assert_eq!(response.code(), Code::AccessAccept);
    assert!(!response.has(&reply_message));

    // registration order: the tagger runs first, then the accepter
    let (auth_addr, _) = spawn_server(vec![Arc::new(TagHandler), Arc::new(AcceptAll)]).await;
    let raw = send_raw(&request, auth_addr).await.expect("no response");
    let response = Packet::decode(&dict, &raw, SECRET).unwrap();
    assert_eq!(response.code(), Code::AccessAccept);
    assert!(response.has(&reply_message));
}

#[tokio::test]
async fn test_client_pap_accept() {
    let dict = Arc::new(Dictionary::standard());
    let (auth_addr, _) = spawn_server(vec![pap_handler(&dict, "alice", "wonderland")]).await;

    let mut client = Client::new(
        dict.clone(),
        &[upstream_for(auth_addr)],
        3,
        Duration::from_secs(1),
    )
    .unwrap();

    let attributes = vec![
        Attribute::by_name(&dict, "User-Name", Value::text("alice").unwrap()).unwrap(),
        Attribute::by_name(&dict, "User-Password", Value::text("wonderland").unwrap()).unwrap(),
    ];
    let response = client
        .send(Code::AccessRequest, attributes)
        .await
        .expect("request should resolve");
    assert_eq!(response.code(), Code::AccessAccept);
}

#[tokio::test]
async fn test_client_pap_reject_carries_response() {
    let dict = Arc::new(Dictionary::standard());
    let (auth_addr, _) = spawn_server(vec![pap_handler(&dict, "alice", "wonderland")]).await;

    let mut client = Client::new(
        dict.clone(),
        &[upstream_for(auth_addr)],
        3,
        Duration::from_secs(1),
    )
    .unwrap();

    let attributes = vec![
        Attribute::by_name(&dict, "User-Name", Value::text("alice").unwrap()).unwrap(),
        Attribute::by_name(&dict, "User-Password", Value::text("looking-glass").unwrap()).unwrap(),
    ];
    match client.send(Code::AccessRequest, attributes).await {
        Err(ClientError::Rejected(response)) => {
            assert_eq!(response.code(), Code::AccessReject);
        }
        other => panic!("expected rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn test_client_accounting_round_trip() {
    let dict = Arc::new(Dictionary::standard());
    let (_, acct_addr) = spawn_server(vec![]).await;

    let mut client = Client::new(
        dict.clone(),
        &[upstream_for(acct_addr)],
        3,
        Duration::from_secs(1),
    )
    .unwrap();

    let attributes = vec![
        Attribute::by_name(&dict, "User-Name", Value::text("alice").unwrap()).unwrap(),
        Attribute::by_name(&dict, "Acct-Status-Type", Value::Integer(1)).unwrap(),
        Attribute::by_name(&dict, "Acct-Session-Id", Value::text("sess-1").unwrap()).unwrap(),
    ];
    let response = client
        .send(Code::AccountingRequest, attributes)
        .await
        .expect("accounting request should resolve");
    assert_eq!(response.code(), Code::AccountingResponse);
}

#[tokio::test]
async fn test_client_round_robin_and_stable_identifiers() {
    // two black-hole servers record what they receive; the client must
    // rotate between them and reuse each server's identifier on retry
    async fn black_hole() -> (SocketAddr, Arc<Mutex<Vec<u8>>>) {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        tokio::spawn(async move {
            let mut buf = [0u8; 4096];
            loop {
                let (len, _) = socket.recv_from(&mut buf).await.unwrap();
                if len >= 2 {
                    log.lock().await.push(buf[1]);
                }
            }
        });
        (addr, seen)
    }

    let dict = Arc::new(Dictionary::standard());
    let (addr_a, seen_a) = black_hole().await;
    let (addr_b, seen_b) = black_hole().await;

    let mut client = Client::new(
        dict.clone(),
        &[upstream_for(addr_a), upstream_for(addr_b)],
        2,
        Duration::from_millis(50),
    )
    .unwrap();

    let attributes =
        vec![Attribute::by_name(&dict, "User-Name", Value::text("alice").unwrap()).unwrap()];
    match client.send(Code::AccessRequest, attributes).await {
        Err(ClientError::Timeout { attempts }) => assert_eq!(attempts, 4),
        other => panic!("expected timeout, got {other:?}"),
    }

    // retry=2 with 2 servers: each server saw exactly 2 datagrams, and
    // both carried that server's identifier
    tokio::time::sleep(Duration::from_millis(50)).await;
    for seen in [seen_a, seen_b] {
        let identifiers = seen.lock().await.clone();
        assert_eq!(identifiers.len(), 2);
        assert_eq!(identifiers[0], identifiers[1]);
    }
}

#[tokio::test]
async fn test_client_ignores_bad_authenticator_and_identifier() {
    // a hostile responder echoes a well-formed Access-Accept with a wrong
    // response authenticator, then one with a wrong identifier
    async fn bogus_responder(tweak_identifier: bool) -> SocketAddr {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        tokio::spawn(async move {
            let mut buf = [0u8; 4096];
            loop {
                let (len, from) = socket.recv_from(&mut buf).await.unwrap();
                if len < 20 {
                    continue;
                }
                let identifier = if tweak_identifier {
                    buf[1].wrapping_add(1)
                } else {
                    buf[1]
                };
                // 20-byte Access-Accept with a garbage authenticator
                let mut reply = vec![2u8, identifier, 0, 20];
                reply.extend_from_slice(&[0xAAu8; 16]);
                socket.send_to(&reply, from).await.unwrap();
            }
        });
        addr
    }

    let dict = Arc::new(Dictionary::standard());
    for tweak_identifier in [false, true] {
        let addr = bogus_responder(tweak_identifier).await;
        let mut client = Client::new(
            dict.clone(),
            &[upstream_for(addr)],
            1,
            Duration::from_millis(100),
        )
        .unwrap();

        let attributes =
            vec![Attribute::by_name(&dict, "User-Name", Value::text("alice").unwrap()).unwrap()];
        assert!(matches!(
            client.send(Code::AccessRequest, attributes).await,
            Err(ClientError::Timeout { .. })
        ));
    }
}
