//! Missing-animal alert fan-out.
//!
//! Sends the alert to every known user with bounded concurrency and a
//! per-recipient timeout, so one unreachable recipient neither aborts nor
//! stalls the rest. Failures are collected into an aggregate report and
//! never propagate: by the time the broadcast runs, the registry mutation
//! that triggered it has already committed. No automatic retries.

use std::sync::Arc;
use std::time::Duration;

use herd_shared::model::{AnimalId, AnimalRecord, UserId};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::BroadcastConfig;
use crate::telegram::Gateway;

/// One recipient the alert could not be delivered to.
#[derive(Debug)]
pub struct DeliveryFailure {
    pub user: UserId,
    pub reason: String,
}

/// Aggregate outcome of one alert fan-out.
#[derive(Debug)]
pub struct BroadcastReport {
    pub alert_id: Uuid,
    pub delivered: usize,
    pub failed: Vec<DeliveryFailure>,
}

pub struct Broadcaster<G> {
    gateway: Arc<G>,
    max_in_flight: usize,
    delivery_timeout: Duration,
}

impl<G: Gateway + 'static> Broadcaster<G> {
    pub fn new(gateway: Arc<G>, config: &BroadcastConfig) -> Self {
        Self {
            gateway,
            max_in_flight: config.max_in_flight.max(1),
            delivery_timeout: Duration::from_secs(config.delivery_timeout_secs),
        }
    }

    /// Fan the alert out to every recipient, the reporter included.
    pub async fn broadcast(
        &self,
        animal_id: &AnimalId,
        animal: &AnimalRecord,
        reporter_name: &str,
        recipients: Vec<UserId>,
    ) -> BroadcastReport {
        let alert_id = Uuid::new_v4();
        let caption = Arc::new(format!(
            "🚨 MISSING ANIMAL ALERT 🚨\nName: {}\nOwner: {}\nPlease contact the owner if found.",
            animal.name, reporter_name
        ));
        info!(
            "Broadcasting alert {} for animal {} to {} users",
            alert_id,
            animal_id,
            recipients.len()
        );

        let semaphore = Arc::new(Semaphore::new(self.max_in_flight));
        let mut deliveries: JoinSet<Result<(), DeliveryFailure>> = JoinSet::new();
        for user in recipients {
            let gateway = Arc::clone(&self.gateway);
            let caption = Arc::clone(&caption);
            let photo = animal.photo.clone();
            let semaphore = Arc::clone(&semaphore);
            let per_delivery = self.delivery_timeout;
            deliveries.spawn(async move {
                // Closed only when the semaphore is dropped, which it never
                // is while deliveries are still running.
                let Ok(_permit) = semaphore.acquire().await else {
                    return Err(DeliveryFailure {
                        user,
                        reason: "delivery pool shut down".to_string(),
                    });
                };
                match timeout(per_delivery, gateway.send_photo(&user, &photo, &caption, &[])).await
                {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => Err(DeliveryFailure {
                        user,
                        reason: e.to_string(),
                    }),
                    Err(_) => Err(DeliveryFailure {
                        user,
                        reason: "delivery timed out".to_string(),
                    }),
                }
            });
        }

        let mut report = BroadcastReport {
            alert_id,
            delivered: 0,
            failed: Vec::new(),
        };
        while let Some(joined) = deliveries.join_next().await {
            match joined {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(failure)) => {
                    warn!(
                        "Alert {}: delivery to {} failed: {}",
                        alert_id, failure.user, failure.reason
                    );
                    report.failed.push(failure);
                }
                Err(e) => warn!("Alert {}: delivery task panicked: {}", alert_id, e),
            }
        }
        info!(
            "Alert {} complete: {} delivered, {} failed",
            alert_id,
            report.delivered,
            report.failed.len()
        );
        report
    }
}
