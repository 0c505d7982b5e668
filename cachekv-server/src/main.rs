//! Binary entry point: load settings, wire up `SIGINT`/`SIGTERM`, run.
//!
//! Grounded on the original's `main.cpp` (`signal(SIGINT/SIGTERM, ...)`
//! dispatching to `cacheServer.Stop()`). No teacher Rust file in this repo
//! ships an equivalent binary; `ctrlc` is pulled in for the same reason
//! `other_examples/manifests/1000xsh-axdp/Cargo.toml` reaches for it —
//! nothing in the workspace's own dependency stack wires up signal
//! handling, and hand-rolling a `libc::signal` call would reintroduce the
//! unsafety this crate elsewhere avoids.

use std::sync::atomic::Ordering;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use cachekv_server::{Server, ServerSettings};

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let settings = ServerSettings::from_env()?;
    let server = Server::new(settings);
    let running = server.running_handle();

    ctrlc::set_handler(move || {
        tracing::info!("shutdown signal received");
        running.store(false, Ordering::SeqCst);
    })?;

    server.run()
}
