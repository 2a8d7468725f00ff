//! Minimal PAP client: send an Access-Request and print the verdict.
//!
//! Usage: pap_client <username> <password> <secret> [server_ip]

use radkit_engine::{Client, ClientError, UpstreamConfig};
use radkit_proto::{Attribute, Code, Dictionary, Value};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 4 {
        eprintln!("Usage: {} <username> <password> <secret> [server_ip]", args[0]);
        eprintln!("Example: {} admin admin123 testing123 127.0.0.1", args[0]);
        std::process::exit(1);
    }

    let username = &args[1];
    let password = &args[2];
    let secret = &args[3];
    let server = args.get(4).map(String::as_str).unwrap_or("127.0.0.1");

    let dictionary = Arc::new(Dictionary::standard());
    let mut client = Client::new(
        dictionary.clone(),
        &[UpstreamConfig {
            address: server.to_string(),
            auth_port: 1812,
            acct_port: 1813,
            secret: secret.clone(),
        }],
        3,
        Duration::from_secs(2),
    )?;

    let attributes = vec![
        Attribute::by_name(&dictionary, "User-Name", Value::text(username.clone())?)?,
        Attribute::by_name(&dictionary, "User-Password", Value::text(password.clone())?)?,
        Attribute::by_name(&dictionary, "NAS-IP-Address", Value::ipv4("127.0.0.1")?)?,
    ];

    println!("sending Access-Request for {username} to {server}:1812");
    match client.send(Code::AccessRequest, attributes).await {
        Ok(response) => {
            println!("{}: authentication successful", response.code());
            for attribute in response.attributes() {
                println!("  {attribute}");
            }
        }
        Err(ClientError::Rejected(response)) => {
            println!("{}: authentication failed", response.code());
            for attribute in response.attributes() {
                println!("  {attribute}");
            }
        }
        Err(e) => {
            eprintln!("request failed: {e}");
            std::process::exit(1);
        }
    }

    Ok(())
}
