use std::path::PathBuf;
use std::sync::{Arc, Weak};
use std::time::Duration;

use clap::Parser;
use dotenv::dotenv;
use streamlink::{
    codec_factory, setup_local_tracing, setup_tracing, AppResult, ClientConfig, Endpoint,
    MagicCodec, ServerConfig, TcpClient, TcpServer, TransportConfig,
};
use tokio::runtime;
use tracing::{info, warn};

#[derive(Parser)]
#[command(version)]
pub struct CommandLine {
    /// path to config file
    #[arg(short, long)]
    pub conf: Option<String>,
    #[command(subcommand)]
    pub command: Command,
    /// log level (v: info, vv: debug, vvv: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Parser)]
pub enum Command {
    /// run a framed echo server
    Server,
    /// connect to a server and send a message periodically
    Client {
        #[arg(short, long, default_value = "ping")]
        message: String,
        #[arg(short, long, default_value_t = 1000)]
        interval_ms: u64,
    },
    PrintConfig,
}

fn main() -> AppResult<()> {
    dotenv().ok();

    let commandline: CommandLine = CommandLine::parse();
    if std::env::var_os("RUST_LOG").is_none() {
        let level = match commandline.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        std::env::set_var("RUST_LOG", level);
    }

    let config_path = commandline
        .conf
        .as_ref()
        .map_or_else(|| PathBuf::from("./conf.toml"), PathBuf::from);
    let config = if config_path.exists() {
        TransportConfig::set_up_config(&config_path)?
    } else {
        TransportConfig::default()
    };

    if let Command::PrintConfig = commandline.command {
        println!("{:#?}", config);
        return Ok(());
    }

    let _guard = if config.log.dir.is_empty() {
        setup_local_tracing()?;
        None
    } else {
        Some(setup_tracing(&config.log.dir))
    };
    // drives ctrl-c and the client's send timer; endpoints run their own threads
    let rt = runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()?;

    match commandline.command {
        Command::Server => run_server(&rt, config.server),
        Command::Client {
            message,
            interval_ms,
        } => run_client(&rt, config.client, message, interval_ms),
        Command::PrintConfig => Ok(()),
    }
}

fn log_events<E: Endpoint>(endpoint: &E, name: &'static str) {
    endpoint.set_codec_factory(codec_factory(MagicCodec::new));
    endpoint.on_connect(move |conn_id| info!("{}: connection {} up", name, conn_id));
    endpoint.on_disconnect(move |conn_id, code, message| {
        info!("{}: connection {} down ({}): {}", name, conn_id, code, message)
    });
    endpoint.on_error(move |conn_id, code, message| {
        warn!("{}: connection {} error ({}): {}", name, conn_id, code, message)
    });
}

fn run_server(rt: &runtime::Runtime, config: ServerConfig) -> AppResult<()> {
    let server = Arc::new(TcpServer::new(config));
    log_events(server.as_ref(), "server");

    let echo: Weak<TcpServer> = Arc::downgrade(&server);
    server.on_message(move |conn_id, payload| {
        if let Some(server) = echo.upgrade() {
            server.send(conn_id, MagicCodec::frame(&payload));
        }
    });
    server.start()?;
    if let Some(addr) = server.local_addr() {
        println!("echo server listening on {}", addr);
    }

    rt.block_on(tokio::signal::ctrl_c())?;
    server.stop();
    Ok(())
}

fn run_client(
    rt: &runtime::Runtime,
    config: ClientConfig,
    message: String,
    interval_ms: u64,
) -> AppResult<()> {
    let client = Arc::new(TcpClient::new(config));
    log_events(client.as_ref(), "client");
    client.on_message(|payload| {
        println!("received: {}", String::from_utf8_lossy(&payload));
    });
    client.start()?;

    let sender = client.clone();
    let frame = MagicCodec::frame(message.as_bytes());
    rt.block_on(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms.max(1)));
        loop {
            tokio::select! {
                result = tokio::signal::ctrl_c() => return result,
                _ = ticker.tick() => sender.send(frame.clone()),
            }
        }
    })?;
    client.stop();
    Ok(())
}
