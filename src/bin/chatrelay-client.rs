//! Interactive terminal client: prints every server line, sends every stdin line.
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use futures::SinkExt;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tokio_stream::StreamExt;
use tokio_util::codec::{FramedRead, FramedWrite};

use chatrelay::config::ClientConfig;
use chatrelay::relay::codec::LineCodec;

#[derive(Parser, Debug)]
#[command(author, version, about = "Terminal client for the chat relay", long_about = None)]
struct Args {
    /// Client configuration file (host, port, username)
    #[arg(short, long, env = "CHATRELAY_CLIENT_CONFIG")]
    config: Option<PathBuf>,

    /// Server host (overrides the config file)
    #[arg(long)]
    host: Option<String>,

    /// Server port (overrides the config file)
    #[arg(short, long)]
    port: Option<u16>,

    /// Display name to register with (blank lets the server choose)
    #[arg(short, long)]
    name: Option<String>,
}

impl Args {
    fn resolve(self) -> Result<ClientConfig> {
        let mut config = match &self.config {
            Some(path) => ClientConfig::load(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => ClientConfig {
                host: "127.0.0.1".into(),
                port: self.port.context("no --port given and no config file")?,
                username: String::new(),
            },
        };
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(name) = self.name {
            config.username = name;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Args::parse().resolve()?;
    let stream = TcpStream::connect(config.server_addr())
        .await
        .with_context(|| format!("could not connect to {}", config.server_addr()))?;
    let (read_half, write_half) = stream.into_split();
    let mut incoming = FramedRead::new(read_half, LineCodec);
    let mut outgoing = FramedWrite::new(write_half, LineCodec);

    println!("Connected to the server as {}", config.username);
    outgoing.send(config.username.as_str()).await?;

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            frame = incoming.next() => match frame {
                Some(Ok(line)) => println!("{line}"),
                Some(Err(e)) => {
                    tracing::warn!("read error: {e}");
                    eprintln!("Connection to server lost.");
                    break;
                }
                None => {
                    eprintln!("Connection to server lost.");
                    break;
                }
            },

            input = stdin.next_line() => match input? {
                Some(line) if line.eq_ignore_ascii_case("exit") => {
                    outgoing.send(line.as_str()).await?;
                    println!("Disconnecting...");
                    break;
                }
                Some(line) => outgoing.send(line.as_str()).await?,
                // stdin closed: leave the same way `exit` does.
                None => {
                    outgoing.send("exit").await?;
                    break;
                }
            },
        }
    }

    println!("Connection closed.");
    Ok(())
}
