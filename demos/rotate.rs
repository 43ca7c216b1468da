//! Example demonstrating preemptive certificate rotation.
//!
//! This example shows how to:
//! - Watch a certificate directory with a short polling interval
//! - Run a long-lived consumer per certificate
//! - Watch the consumer get preempted on each renewal
//!
//! Run with: cargo run --example rotate
//!
//! The example plays the ACME client itself, writing a fresh self-signed
//! certificate into a temporary directory every few seconds.

use hotswap_tls::prelude::*;
use hotswap_tls::sources::{CERT_FILE, KEY_FILE};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

fn renew(dir: &Path) -> std::io::Result<()> {
    let rcgen::CertifiedKey { cert, key_pair } =
        rcgen::generate_simple_self_signed(vec!["localhost".to_string()])
            .map_err(std::io::Error::other)?;
    std::fs::write(dir.join(CERT_FILE), cert.pem())?;
    std::fs::write(dir.join(KEY_FILE), key_pair.serialize_pem())?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    println!("=== Certificate Rotation Example ===\n");

    let dir = tempfile::tempdir()?;
    renew(dir.path())?;
    println!("Wrote initial certificate to {}", dir.path().display());

    let shutdown = CancellationToken::new();
    let watcher = CertWatcher::builder()
        .with_dir(dir.path())
        .with_interval(Duration::from_millis(500))
        .with_shutdown(shutdown.clone())
        .build()?;

    let invocations = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&invocations);
    let serving = tokio::spawn(watcher.run(move |token: CancellationToken, cert: LoadedCertificate| {
        let generation = counter.fetch_add(1, Ordering::SeqCst) + 1;
        async move {
            let config = match cert.server_config() {
                Ok(config) => config,
                Err(e) => return Err(ConsumerError::failed(e)),
            };
            println!(
                "  [{}] serving with {} certificate(s), ALPN {:?}",
                generation,
                cert.cert_chain().len(),
                config.alpn_protocols
            );

            token.cancelled().await;
            println!("  [{}] preempted, releasing listener", generation);
            Err::<(), _>(ConsumerError::Cancelled)
        }
    }));

    for round in 1..=3 {
        // Modification times have one-second granularity on some filesystems.
        tokio::time::sleep(Duration::from_millis(1500)).await;
        println!("\nRenewal #{}", round);
        renew(dir.path())?;
    }

    tokio::time::sleep(Duration::from_secs(1)).await;
    println!("\nShutting down");
    shutdown.cancel();

    match serving.await {
        Ok(Err(e)) if e.is_shutdown() => {}
        Ok(outcome) => outcome?,
        Err(e) => return Err(CertError::TaskFailed(e)),
    }

    println!(
        "\nStarted {} invocations, never more than one at a time",
        invocations.load(Ordering::SeqCst)
    );
    println!("\n=== Example Complete ===");
    Ok(())
}
