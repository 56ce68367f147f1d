//! The resolver's consume loop and commit discipline.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use trinetra_core::config::constants::{eventlog, framebus};
use trinetra_core::config::ResolverSettings;
use trinetra_core::error::EventLogError;
use trinetra_core::traits::{EventLog, LogRecord, SimilaritySearch};
use trinetra_core::types::{DetectionEvent, TravelTimeMatrix};

use crate::resolve::{IdentityResolver, ResolverConfig};

/// How many records between consumer-lag checks.
const LAG_CHECK_EVERY: u64 = 100;

/// Records fetched per consume pass.
const CONSUME_MAX: usize = 20;

/// One resolver process member of the detections consumer group.
pub struct ResolverService {
    log: Arc<dyn EventLog>,
    resolver: IdentityResolver,
    settings: ResolverSettings,
    pub healthy: Arc<AtomicBool>,
    /// A search outage is in progress: offsets are withheld and recovery
    /// triggers a rewind to the committed position.
    outage_active: bool,
    uncommitted_during_outage: u64,
    records_seen: u64,
}

impl ResolverService {
    pub fn new(
        log: Arc<dyn EventLog>,
        gallery: Arc<dyn SimilaritySearch>,
        travel: TravelTimeMatrix,
        settings: ResolverSettings,
    ) -> Self {
        let config = ResolverConfig {
            cosine_threshold: settings.cosine_threshold,
            history_threshold: settings.history_threshold,
            window_s: settings.temporal_gate_window_s,
        };
        Self {
            log,
            resolver: IdentityResolver::new(gallery, travel, config),
            settings,
            healthy: Arc::new(AtomicBool::new(false)),
            outage_active: false,
            uncommitted_during_outage: 0,
            records_seen: 0,
        }
    }

    pub fn resolver(&self) -> &IdentityResolver {
        &self.resolver
    }

    /// Run until the stop flag rises.
    ///
    /// Returns an error only when the event log stays unreachable past the
    /// publish retry budget; continuing would silently lose identity
    /// events, so the process exits and the supervisor restarts it.
    pub async fn run(&mut self, stop: Arc<AtomicBool>) -> Result<(), EventLogError> {
        info!(group = %self.settings.consumer_group, "resolver consuming detections");
        while !stop.load(Ordering::Relaxed) {
            self.poll_once().await?;
        }
        info!("resolver stopped");
        Ok(())
    }

    /// One consume pass. Public for tests and for external supervisors.
    pub async fn poll_once(&mut self) -> Result<(), EventLogError> {
        let topics = [eventlog::TOPIC_DETECTIONS.to_string()];
        let records = match self
            .log
            .consume(
                &self.settings.consumer_group,
                &topics,
                CONSUME_MAX,
                Duration::from_millis(framebus::CONSUME_BLOCK_MS),
            )
            .await
        {
            Ok(records) => records,
            Err(e) => {
                // Transient backbone dropout: back off and retry. Only a
                // publish-retry exhaustion is fatal.
                warn!(error = %e, "detections consume failed");
                tokio::time::sleep(Duration::from_millis(framebus::CONSUME_BLOCK_MS)).await;
                return Ok(());
            }
        };

        for record in records {
            self.process_record(record).await?;
        }
        Ok(())
    }

    async fn process_record(&mut self, record: LogRecord) -> Result<(), EventLogError> {
        self.records_seen += 1;
        if self.records_seen % LAG_CHECK_EVERY == 0 {
            self.check_lag().await;
        }

        let event: DetectionEvent = match serde_json::from_slice(&record.payload) {
            Ok(event) => event,
            Err(e) => {
                // Malformed input: skip it, advance, count it. Replaying a
                // parse failure forever helps nobody.
                warn!(
                    topic = %record.topic,
                    partition = record.partition,
                    offset = record.offset,
                    error = %e,
                    "skipping malformed detection event"
                );
                self.resolver.metrics.deserialization_errors.inc();
                self.commit(&record).await?;
                return Ok(());
            }
        };

        let outcome = self.resolver.resolve_event(&event).await;
        let mut saw_unavailable = false;

        for resolution in &outcome.resolutions {
            if resolution.search_unavailable {
                saw_unavailable = true;
            }
            let payload = serde_json::to_vec(&resolution.identity)
                .map_err(|e| EventLogError::Serialization(e.to_string()))?;
            self.publish_or_die(
                eventlog::TOPIC_IDENTITIES,
                &resolution.identity.customer_id,
                payload,
            )
            .await?;
            self.healthy.store(true, Ordering::Relaxed);

            for alert in &resolution.alerts {
                self.publish_alert(alert).await?;
            }
        }
        for alert in &outcome.sweep_alerts {
            self.publish_alert(alert).await?;
        }

        if saw_unavailable {
            // Manual commit discipline: the UNKNOWN events went out, but
            // the offset stays put so these detections replay once the
            // backend is back.
            if !self.outage_active {
                warn!("similarity backend outage began; withholding offset commits");
            }
            self.outage_active = true;
            self.uncommitted_during_outage += 1;

            let cap = self.settings.max_uncommitted_events;
            if cap > 0 && self.uncommitted_during_outage >= cap {
                warn!(cap, "uncommitted cap reached; committing to bound lag");
                self.commit(&record).await?;
                self.uncommitted_during_outage = 0;
            }
        } else if self.outage_active {
            // Backend recovered: rewind to the committed position so the
            // whole outage window (including this record) re-resolves.
            info!("similarity backend recovered; replaying uncommitted detections");
            self.outage_active = false;
            self.uncommitted_during_outage = 0;
            let topics = [eventlog::TOPIC_DETECTIONS.to_string()];
            self.log
                .seek_to_committed(&self.settings.consumer_group, &topics)
                .await?;
        } else {
            self.commit(&record).await?;
        }
        Ok(())
    }

    async fn commit(&self, record: &LogRecord) -> Result<(), EventLogError> {
        self.log
            .commit(
                &self.settings.consumer_group,
                &record.topic,
                record.partition,
                record.offset,
            )
            .await
    }

    /// Publish with bounded backoff. Exhausting retries is fatal by
    /// policy: the offset was not committed, so the restarted process
    /// resumes exactly here.
    async fn publish_or_die(
        &self,
        topic: &str,
        key: &str,
        payload: Vec<u8>,
    ) -> Result<(), EventLogError> {
        let mut delay = Duration::from_millis(eventlog::PUBLISH_BACKOFF_MS);
        let mut last_error = None;
        for attempt in 1..=eventlog::PUBLISH_RETRIES {
            match self.log.publish(topic, key, payload.clone()).await {
                Ok(_) => return Ok(()),
                Err(e) => {
                    warn!(topic, attempt, error = %e, "identity publish failed");
                    last_error = Some(e);
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
            }
        }
        error!(topic, "publish retries exhausted; exiting for supervised restart");
        Err(last_error.unwrap_or_else(|| EventLogError::Storage("publish failed".into())))
    }

    async fn publish_alert(
        &self,
        alert: &trinetra_core::types::AlertEvent,
    ) -> Result<(), EventLogError> {
        let payload = serde_json::to_vec(alert)
            .map_err(|e| EventLogError::Serialization(e.to_string()))?;
        self.publish_or_die(eventlog::TOPIC_ALERTS, alert.kind.as_str(), payload)
            .await
    }

    async fn check_lag(&self) {
        match self
            .log
            .lag(&self.settings.consumer_group, eventlog::TOPIC_DETECTIONS)
            .await
        {
            Ok(lag) => {
                self.resolver.metrics.consumer_lag.set(lag as f64);
                if lag > self.settings.lag_alert_threshold {
                    error!(lag, threshold = self.settings.lag_alert_threshold,
                        "detections consumer lag above threshold");
                }
            }
            Err(e) => warn!(error = %e, "lag check failed"),
        }
    }
}

#[cfg(test)]
mod tests;
