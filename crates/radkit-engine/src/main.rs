use clap::Parser;
use radkit_engine::{ClientRegistry, Config, PapHandler, Server, ServerConfig};
use radkit_proto::Dictionary;
use std::process;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// radkit - RFC 2865/2866 RADIUS server
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "radkit")]
struct Cli {
    /// Path to configuration file
    #[arg(value_name = "CONFIG", default_value = "config.json")]
    config_path: String,

    /// Validate configuration and exit (doesn't start server)
    #[arg(short, long)]
    validate: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match Config::from_file(&cli.config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing_subscriber::registry()
                .with(EnvFilter::new("info"))
                .with(tracing_subscriber::fmt::layer())
                .init();

            if cli.validate {
                eprintln!("configuration validation failed: {e}");
                process::exit(1);
            }

            warn!("could not load config file from: {}", cli.config_path);
            info!("creating example configuration at: {}", cli.config_path);

            if let Err(e) = Config::example().to_file(&cli.config_path) {
                error!("error creating example config: {e}");
                process::exit(1);
            }

            info!("please edit {} and restart the server", cli.config_path);
            process::exit(0);
        }
    };

    if cli.validate {
        println!("configuration validated successfully");
        println!();
        println!("  listen:  {}", config.listen_address);
        println!("  auth:    {}", config.auth_port);
        println!("  acct:    {}", config.acct_port);
        println!("  clients: {}", config.clients.len());
        println!("  users:   {}", config.users.len());
        if config.clients.is_empty() {
            println!();
            println!("WARNING: no clients configured; all requests will be dropped");
        }
        process::exit(0);
    }

    let log_level = config.log_level.as_deref().unwrap_or("info");
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("radkit v{}", env!("CARGO_PKG_VERSION"));
    info!("loaded configuration from: {}", cli.config_path);

    let dictionary = Arc::new(Dictionary::standard());
    if let Some(ref path) = config.dictionary_path {
        if let Err(e) = dictionary.load(path) {
            error!("failed to load dictionary {path}: {e}");
            process::exit(1);
        }
        info!("loaded extra dictionary: {path}");
    }

    let mut handler = match PapHandler::new(&dictionary) {
        Ok(handler) => handler,
        Err(e) => {
            error!("dictionary is missing core attributes: {e}");
            process::exit(1);
        }
    };
    for user in &config.users {
        handler.add_user(&user.username, &user.password);
        info!("added user: {}", user.username);
    }

    let clients = match ClientRegistry::from_entries(&config.clients) {
        Ok(clients) => clients,
        Err(e) => {
            error!("invalid client configuration: {e}");
            process::exit(1);
        }
    };

    let bind_address = match config.listen_ip() {
        Ok(address) => address,
        Err(e) => {
            error!("{e}");
            process::exit(1);
        }
    };

    let server = match Server::new(ServerConfig {
        bind_address,
        auth_port: config.auth_port,
        acct_port: config.acct_port,
        dictionary,
        clients,
        handlers: vec![Arc::new(handler)],
    })
    .await
    {
        Ok(server) => server,
        Err(e) => {
            error!("failed to create server: {e}");
            process::exit(1);
        }
    };

    info!("server started; press Ctrl+C to stop");
    if let Err(e) = server.run().await {
        error!("server error: {e}");
        process::exit(1);
    }
}
