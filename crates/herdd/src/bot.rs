//! Bot run loop: long-polls the transport and demultiplexes updates to one
//! worker task per user.
//!
//! Events from distinct users are handled concurrently; events from the same
//! user flow through that user's channel and are processed strictly in
//! arrival order, because conversation transitions are order-sensitive.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use herd_shared::event::Event;
use herd_shared::model::UserId;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::dispatch::Dispatcher;
use crate::session::SessionTable;
use crate::telegram::TelegramGateway;
use crate::vision::Vision;

const POLL_RETRY_DELAY: Duration = Duration::from_secs(2);

pub async fn run<V: Vision + 'static>(
    gateway: Arc<TelegramGateway>,
    dispatcher: Arc<Dispatcher<TelegramGateway, V>>,
    sessions: SessionTable,
    sweep_interval: Duration,
) -> Result<()> {
    // Periodic sweep that evicts conversations idle past their TTL.
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(sweep_interval);
        loop {
            tick.tick().await;
            let evicted = sessions.evict_idle().await;
            if evicted > 0 {
                info!("Evicted {} idle sessions", evicted);
            }
        }
    });

    let mut workers: HashMap<UserId, mpsc::UnboundedSender<Event>> = HashMap::new();
    let mut offset: i64 = 0;
    info!("Polling for updates");
    loop {
        let updates = match gateway.poll_updates(offset).await {
            Ok(updates) => updates,
            Err(e) => {
                warn!("Update poll failed: {}", e);
                tokio::time::sleep(POLL_RETRY_DELAY).await;
                continue;
            }
        };
        for update in updates {
            offset = offset.max(update.update_id + 1);
            let Some(event) = update.event else { continue };
            let user = event.sender().id.clone();
            let sender = workers
                .entry(user.clone())
                .or_insert_with(|| spawn_worker(user.clone(), Arc::clone(&dispatcher)));
            if sender.send(event).is_err() {
                // Worker died; drop the stale handle and let the next event
                // from this user start a fresh one.
                warn!("Worker for user {} is gone; dropping event", user);
                workers.remove(&user);
            }
        }
    }
}

fn spawn_worker<V: Vision + 'static>(
    user: UserId,
    dispatcher: Arc<Dispatcher<TelegramGateway, V>>,
) -> mpsc::UnboundedSender<Event> {
    let (sender, mut receiver) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Some(event) = receiver.recv().await {
            dispatcher.handle(event).await;
        }
        debug!("Worker for user {} exited", user);
    });
    sender
}
