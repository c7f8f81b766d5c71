//! Ctrl-C and SIGTERM delivered as an async channel.

use anyhow::{Context, Result};
use async_channel::Receiver;
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use std::thread;
use tracing::debug;

/// Forward SIGINT and SIGTERM to a channel, one message per signal
pub fn install() -> Result<Receiver<i32>> {
    let mut signals = Signals::new([SIGINT, SIGTERM]).context("Failed to register signal handler")?;
    let (tx, rx) = async_channel::unbounded();

    thread::spawn(move || {
        for sig in signals.forever() {
            debug!("Received signal {}", sig);
            if tx.send_blocking(sig).is_err() {
                break;
            }
        }
    });
    Ok(rx)
}
