use std::net::{AddrParseError, IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

use clap::Parser;

#[derive(Parser, Debug)]
pub struct Args {
    /// Whether qboard's clients connect to it over https.
    /// If so, the qid session cookie is sent as a secure cookie.
    #[arg(short, long)]
    secure: bool,

    /// The address qboard should listen on. By default
    /// qboard will listen just on the IPv4 loopback.
    #[arg(short, long)]
    address: Option<String>,

    /// The port qboard listens on.
    #[arg(short, long, default_value_t = 80)]
    port: u16,

    /// Where the sqlite database lives.
    #[arg(short, long, default_value = ".")]
    data_dir: PathBuf,

    /// The redis instance holding sessions.
    #[cfg(feature = "session-redis")]
    #[arg(short, long, default_value = "redis://127.0.0.1/")]
    redis_url: String,
}

impl Args {
    pub fn addr(&self) -> Result<SocketAddr, AddrParseError> {
        self.address
            .as_deref()
            .unwrap_or("127.0.0.1")
            .parse()
            .map(|addr: IpAddr| (addr, self.port).into())
    }

    pub fn secure(&self) -> bool {
        self.secure
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    #[cfg(feature = "session-redis")]
    pub fn redis_url(&self) -> &str {
        &self.redis_url
    }
}
