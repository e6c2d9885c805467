//! Synthetic hit traffic against in-process backends.
//!
//! Each worker task plays an independent request handler: it posts hits
//! through the ingress with no coordination beyond the shared cache.

use crate::auth::HitTokenIssuer;
use crate::config::Config;
use crate::error::MostReadResult;
use crate::ingress::HitRequest;
use crate::types::{IngressOutcome, ItemId};
use crate::MostRead;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone)]
pub struct SimulationOptions {
    pub hits: u64,
    pub items: u64,
    pub workers: usize,
}

impl Default for SimulationOptions {
    fn default() -> Self {
        Self {
            hits: 1_000,
            items: 20,
            workers: 8,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimulationReport {
    pub sent: u64,
    pub recorded: u64,
    pub flushes: u64,
    pub persisted: u64,
    pub pending: u64,
    pub listing: String,
}

/// Popular items get most of the traffic: squaring a uniform sample skews
/// it toward item 1.
fn pick_item(items: u64) -> ItemId {
    let r: f64 = rand::random();
    ((r * r) * items as f64) as u64 % items.max(1) + 1
}

pub async fn simulate(config: &Config, opts: &SimulationOptions) -> MostReadResult<SimulationReport> {
    let (app, store) = MostRead::in_memory(config)?;
    for id in 1..=opts.items {
        store.register_item(id, format!("Item {id}"), format!("/items/{id}"));
    }

    let nonce = match config.auth.secret.as_deref() {
        Some(secret) => HitTokenIssuer::new(secret.as_bytes(), config.auth.nonce_lifetime_secs)?.issue(),
        None => String::from("open"),
    };

    let workers = opts.workers.max(1) as u64;
    let recorded = Arc::new(AtomicU64::new(0));
    let flushes = Arc::new(AtomicU64::new(0));
    let mut handles = Vec::with_capacity(workers as usize);

    for worker in 0..workers {
        let share = opts.hits / workers + u64::from(worker < opts.hits % workers);
        let ingress = Arc::clone(&app.ingress);
        let nonce = nonce.clone();
        let items = opts.items;
        let recorded = Arc::clone(&recorded);
        let flushes = Arc::clone(&flushes);

        handles.push(tokio::spawn(async move {
            for _ in 0..share {
                let request = HitRequest::new(pick_item(items), nonce.as_str());
                if let IngressOutcome::Recorded(outcome) = ingress.handle(request).await {
                    if outcome.is_recorded() {
                        recorded.fetch_add(1, Ordering::Relaxed);
                    }
                    if outcome.flush().is_some_and(|f| f.is_persisted()) {
                        flushes.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
        }));
    }
    for result in futures::future::join_all(handles).await {
        if let Err(e) = result {
            tracing::error!(error = %e, "Simulation worker failed");
        }
    }

    let pending = app
        .counter
        .pending_batch()
        .await?
        .map(|batch| batch.total())
        .unwrap_or(0);
    let report = SimulationReport {
        sent: opts.hits,
        recorded: recorded.load(Ordering::Relaxed),
        flushes: flushes.load(Ordering::Relaxed),
        persisted: store.total_hits(),
        pending,
        listing: app.listing.get_rendering().await,
    };

    info!(
        operation = "simulate",
        sent = report.sent,
        recorded = report.recorded,
        flushes = report.flushes,
        persisted = report.persisted,
        pending = report.pending,
        elapsed_ms = app.metrics.elapsed().as_millis() as u64,
        "Simulation finished"
    );
    app.metrics.log_full_summary();
    Ok(report)
}
