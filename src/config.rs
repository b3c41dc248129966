//! Server configuration: command-line flags, each with an environment fallback.
//! CLI arguments override the environment, which overrides the built-in defaults.

use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use crate::atom::Person;
use crate::catalog::FilterPolicy;

#[derive(Debug, Clone, Parser)]
#[command(name = "opdsdir", version, about = "Serve a directory of ebooks as an OPDS catalog")]
pub struct ServerConfig {
    /// Address to listen on
    #[arg(long, env = "OPDSDIR_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "OPDSDIR_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Directory with books; nothing outside it is ever served
    #[arg(long, env = "OPDSDIR_DIR", default_value = "./books")]
    pub dir: PathBuf,

    /// Feed author name
    #[arg(long, env = "OPDSDIR_AUTHOR")]
    pub author: Option<String>,

    /// Feed author email
    #[arg(long, env = "OPDSDIR_AUTHOR_EMAIL")]
    pub email: Option<String>,

    /// Feed author URI
    #[arg(long, env = "OPDSDIR_AUTHOR_URI")]
    pub uri: Option<String>,

    /// Hide files and folders whose name starts with a dot
    #[arg(long, env = "OPDSDIR_HIDE_DOT_FILES")]
    pub hide_dot_files: bool,

    /// Hide Calibre sidecar files (metadata.opf, cover.jpg, metadata.db, ...)
    #[arg(long = "calibre", env = "OPDSDIR_HIDE_CALIBRE_FILES")]
    pub hide_calibre_files: bool,

    /// Tell clients not to cache feeds
    #[arg(long, env = "OPDSDIR_NO_CACHE")]
    pub no_cache: bool,

    /// Debug logging (RUST_LOG still wins when set)
    #[arg(long, env = "OPDSDIR_DEBUG")]
    pub debug: bool,
}

impl ServerConfig {
    /// Resolve `host:port`; host names are looked up, first address wins.
    pub fn listen_addr(&self) -> anyhow::Result<SocketAddr> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))?
            .next()
            .with_context(|| format!("{} resolved to no addresses", self.host))
    }

    pub fn filter_policy(&self) -> FilterPolicy {
        FilterPolicy { hide_dot_files: self.hide_dot_files, hide_calibre_files: self.hide_calibre_files }
    }

    /// Author identity for feeds; only present when a name is configured.
    pub fn author(&self) -> Option<Person> {
        let name = self.author.as_deref().map(str::trim).filter(|n| !n.is_empty())?;
        Some(Person { name: name.to_string(), email: self.email.clone(), uri: self.uri.clone() })
    }

    /// Default tracing filter directive when RUST_LOG is unset.
    pub fn log_directive(&self) -> &'static str {
        if self.debug { "debug" } else { "info" }
    }
}
