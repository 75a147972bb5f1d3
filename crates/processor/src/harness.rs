//! Bus consumer harness: poll, dispatch, commit. Offsets commit after the
//! dispatch returns, success or handled failure; the bus contract is
//! at-least-once with best-effort side effects, so failures are never
//! poison pills.

use crate::router::{DispatchOutcome, EventRouter};
use anyhow::Result;
use marathon_bus::BusConsumer;
use marathon_types::CalculationOutcome;
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

pub struct ConsumerHarness<B: BusConsumer> {
    bus: B,
    router: Arc<EventRouter>,
    shutdown: watch::Receiver<bool>,
}

impl<B: BusConsumer> ConsumerHarness<B> {
    pub fn new(bus: B, router: Arc<EventRouter>, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            bus,
            router,
            shutdown,
        }
    }

    /// Run until the shutdown signal flips. In-flight dispatches complete;
    /// polled-but-undispatched records are left uncommitted for redelivery.
    pub async fn run(mut self) -> Result<()> {
        info!("Consumer harness started");

        loop {
            if *self.shutdown.borrow() {
                break;
            }

            let records = tokio::select! {
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        break;
                    }
                    continue;
                }
                polled = self.bus.poll() => match polled {
                    Ok(records) => records,
                    Err(err) => {
                        warn!("Bus poll failed, retrying: {:#}", err);
                        tokio::time::sleep(Duration::from_secs(1)).await;
                        continue;
                    }
                },
            };

            for record in records {
                if *self.shutdown.borrow() {
                    break;
                }

                match self.router.dispatch(&record).await {
                    Ok(DispatchOutcome::Calculated(CalculationOutcome::Success)) => {
                        counter!("marathon_rounds_rated").increment(1);
                    }
                    Ok(DispatchOutcome::Ignored) => {
                        counter!("marathon_messages_dropped").increment(1);
                    }
                    Ok(outcome) => {
                        debug!("Dispatch settled: {:?}", outcome);
                    }
                    Err(err) => {
                        // Logged, and the offset still commits: replaying a
                        // transient failure later is covered by idempotence.
                        error!(
                            "Dispatch failed for offset {} on topic {}: {:#}",
                            record.offset, record.topic, err
                        );
                    }
                }
                counter!("marathon_messages_consumed").increment(1);

                if let Err(err) = self.bus.commit(&record).await {
                    warn!(
                        "Offset commit failed for {} on topic {}: {:#}",
                        record.offset, record.topic, err
                    );
                }
            }
        }

        info!("Consumer harness stopped");
        Ok(())
    }
}
