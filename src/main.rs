//! # RedUnix HTTP Server - Entry Point
//! src/main.rs
//!
//! Uso: `server <port> [document_root]`

use anyhow::Context;
use redunix_httpd::config::Config;
use redunix_httpd::logging;
use redunix_httpd::server::Reactor;

fn main() {
    let config = Config::new();
    logging::init(config.log_level);

    if let Err(e) = run(&config) {
        tracing::error!("fatal: {:#}", e);
        std::process::exit(1);
    }
}

fn run(config: &Config) -> anyhow::Result<()> {
    config
        .validate()
        .map_err(anyhow::Error::msg)
        .context("invalid configuration")?;

    tracing::info!(
        pid = std::process::id(),
        workers = config.workers,
        queue_capacity = config.queue_capacity,
        request_timeout_secs = config.request_timeout_secs,
        "starting RedUnix server"
    );

    let mut reactor = Reactor::bind(config)?;
    tracing::info!(addr = %reactor.local_addr()?, "listening");

    // std ya ignora SIGPIPE: un cliente que cierra a mitad de respuesta
    // produce EPIPE en el write
    reactor.run()
}
