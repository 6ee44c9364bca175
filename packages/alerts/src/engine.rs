//! The escalation state machine.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use crime_pulse_alerts_models::{AlertEvent, AlertSource, AlertStatus, Recipient, Role, dedup_key};
use crime_pulse_storage::{AlertStore, ContactDirectory};
use futures::future::join_all;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::notify::Notifier;
use crate::{Candidate, EscalationConfig, EscalationError};

/// Outcome of escalating one candidate.
#[derive(Debug, Clone, PartialEq)]
pub enum EscalationOutcome {
    /// Score below the lowest severity threshold; no audit row.
    Suppressed,
    /// An alert with the same dedup key was sent within the cooldown
    /// window. A `cooldown_skipped` audit row was appended.
    CooledDown,
    /// An alert was dispatched and audited.
    Escalated(AlertEvent),
}

/// Turns scored candidates into delivered, audited alerts.
pub struct EscalationEngine {
    alert_store: Arc<dyn AlertStore>,
    contacts: Arc<dyn ContactDirectory>,
    notifier: Arc<dyn Notifier>,
    config: EscalationConfig,
    /// Per-dedup-key locks so concurrent escalations of the same zone
    /// can't both pass the cooldown check.
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl EscalationEngine {
    /// Creates an engine over the given audit store, directory, and
    /// notification gateway.
    #[must_use]
    pub fn new(
        alert_store: Arc<dyn AlertStore>,
        contacts: Arc<dyn ContactDirectory>,
        notifier: Arc<dyn Notifier>,
        config: EscalationConfig,
    ) -> Self {
        Self {
            alert_store,
            contacts,
            notifier,
            config,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Escalates one candidate.
    ///
    /// The cooldown check and the audit append run under a per-dedup-key
    /// critical section. Delivery failures never surface as errors; they
    /// only affect the audit row's status.
    ///
    /// # Errors
    ///
    /// Returns [`EscalationError::Storage`] when the audit store fails.
    pub async fn escalate(
        &self,
        candidate: &Candidate,
        now: DateTime<Utc>,
    ) -> Result<EscalationOutcome, EscalationError> {
        let Some(severity) = self.config.thresholds.classify(candidate.score) else {
            log::debug!(
                "Suppressed {} candidate for {} (score {:.1})",
                candidate.source,
                candidate.zone,
                candidate.score,
            );
            return Ok(EscalationOutcome::Suppressed);
        };

        let key = dedup_key(&candidate.zone, candidate.source);
        let lock = self.lock_for(&key).await;
        let _guard = lock.lock().await;

        let window = Duration::minutes(self.config.cooldown_minutes);
        if self.alert_store.sent_within(&key, window, now).await? {
            log::info!("Cooldown active for {key}; skipping escalation");
            self.alert_store
                .append(AlertEvent {
                    id: Uuid::new_v4(),
                    source: candidate.source,
                    severity,
                    zone: candidate.zone.clone(),
                    dedup_key: key,
                    message: candidate.message.clone(),
                    recipients: Vec::new(),
                    sent_at: now,
                    status: AlertStatus::CooldownSkipped,
                })
                .await?;
            return Ok(EscalationOutcome::CooledDown);
        }

        let recipients = self.resolve_recipients(candidate.source).await?;
        if recipients.is_empty() {
            log::warn!("No recipients resolved for {key}; alert will be marked failed");
        }

        let delivered = self.deliver(&recipients, &candidate.message).await;
        let status = if delivered > 0 {
            AlertStatus::Sent
        } else {
            AlertStatus::Failed
        };
        log::info!(
            "Escalated {severity} alert for {} ({delivered}/{} recipients reached)",
            candidate.zone,
            recipients.len(),
        );

        let event = AlertEvent {
            id: Uuid::new_v4(),
            source: candidate.source,
            severity,
            zone: candidate.zone.clone(),
            dedup_key: key,
            message: candidate.message.clone(),
            recipients: recipients.iter().map(|r| r.id.clone()).collect(),
            sent_at: now,
            status,
        };
        self.alert_store.append(event.clone()).await?;

        Ok(EscalationOutcome::Escalated(event))
    }

    /// Resolves who receives an alert from this source.
    ///
    /// Pattern alerts go to superadmins only. Everything else goes to the
    /// configured static recipients plus directory contacts holding one
    /// of the configured alert roles, deduplicated by recipient id.
    async fn resolve_recipients(
        &self,
        source: AlertSource,
    ) -> Result<Vec<Recipient>, EscalationError> {
        let roles: &[Role] = if source == AlertSource::Pattern {
            &[Role::Superadmin]
        } else {
            &self.config.alert_roles
        };

        let mut recipients: Vec<Recipient> = if source == AlertSource::Pattern {
            Vec::new()
        } else {
            self.config.static_recipients.clone()
        };
        for contact in self.contacts.active_with_roles(roles).await? {
            if !recipients.iter().any(|r| r.id == contact.id) {
                recipients.push(contact.into());
            }
        }

        Ok(recipients)
    }

    /// Fans the message out to every recipient/channel pair and returns
    /// how many recipients were reached on at least one channel.
    ///
    /// Each send runs behind its own timeout so one stalled gateway can't
    /// hold up the rest of the dispatch.
    async fn deliver(&self, recipients: &[Recipient], message: &str) -> usize {
        let timeout = std::time::Duration::from_secs(self.config.send_timeout_secs);

        let per_recipient = recipients.iter().map(|recipient| async move {
            let mut reached = false;
            for channel in &self.config.channels {
                let Some(address) = recipient.addresses.get(channel) else {
                    continue;
                };
                match tokio::time::timeout(
                    timeout,
                    self.notifier.send(*channel, address, message),
                )
                .await
                {
                    Ok(Ok(())) => reached = true,
                    Ok(Err(e)) => {
                        log::warn!("Send to {} over {channel} failed: {e}", recipient.id);
                    }
                    Err(_) => {
                        log::warn!(
                            "Send to {} over {channel} timed out after {timeout:?}",
                            recipient.id,
                        );
                    }
                }
            }
            reached
        });

        join_all(per_recipient)
            .await
            .into_iter()
            .filter(|reached| *reached)
            .count()
    }

    async fn lock_for(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use crime_pulse_alerts_models::{Channel, ContactRecord, Severity};
    use crime_pulse_storage::MemoryStorage;

    use super::*;
    use crate::notify::NotifyError;
    use async_trait::async_trait;

    /// Records every send; fails sends on the configured channels.
    struct RecordingNotifier {
        sent: Mutex<Vec<(Channel, String)>>,
        fail_channels: Vec<Channel>,
    }

    impl RecordingNotifier {
        fn new() -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                fail_channels: Vec::new(),
            }
        }

        fn failing_on(channels: Vec<Channel>) -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                fail_channels: channels,
            }
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(
            &self,
            channel: Channel,
            address: &str,
            _message: &str,
        ) -> Result<(), NotifyError> {
            if self.fail_channels.contains(&channel) {
                return Err(NotifyError {
                    message: format!("{channel} gateway down"),
                });
            }
            self.sent.lock().await.push((channel, address.to_string()));
            Ok(())
        }
    }

    fn contact(id: &str, role: Role) -> ContactRecord {
        let mut addresses = BTreeMap::new();
        addresses.insert(Channel::Sms, format!("+965-{id}"));
        addresses.insert(Channel::Email, format!("{id}@example.test"));
        ContactRecord {
            id: id.to_string(),
            role,
            active: true,
            addresses,
        }
    }

    fn candidate(zone: &str, score: f64) -> Candidate {
        Candidate {
            source: AlertSource::Hotspot,
            zone: zone.to_string(),
            score,
            message: format!("Hotspot detected in {zone}"),
        }
    }

    async fn engine_with(
        notifier: Arc<dyn Notifier>,
        contacts: Vec<ContactRecord>,
        config: EscalationConfig,
    ) -> (EscalationEngine, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        storage.seed_contacts(contacts).await;
        let engine = EscalationEngine::new(storage.clone(), storage.clone(), notifier, config);
        (engine, storage)
    }

    #[tokio::test]
    async fn low_scores_are_suppressed_without_audit() {
        let notifier = Arc::new(RecordingNotifier::new());
        let (engine, storage) = engine_with(
            notifier.clone(),
            vec![contact("a1", Role::Analyst)],
            EscalationConfig::default(),
        )
        .await;

        let outcome = engine.escalate(&candidate("D01", 5.0), Utc::now()).await.unwrap();

        assert_eq!(outcome, EscalationOutcome::Suppressed);
        assert!(storage.events().await.unwrap().is_empty());
        assert!(notifier.sent.lock().await.is_empty());
    }

    #[tokio::test]
    async fn escalation_delivers_and_appends_one_event() {
        let notifier = Arc::new(RecordingNotifier::new());
        let (engine, storage) = engine_with(
            notifier.clone(),
            vec![contact("a1", Role::Analyst), contact("s1", Role::Superadmin)],
            EscalationConfig::default(),
        )
        .await;

        let outcome = engine.escalate(&candidate("D01", 45.0), Utc::now()).await.unwrap();

        let EscalationOutcome::Escalated(event) = outcome else {
            panic!("expected escalation, got {outcome:?}");
        };
        assert_eq!(event.severity, Severity::High);
        assert_eq!(event.status, AlertStatus::Sent);
        assert_eq!(event.recipients.len(), 2);
        assert_eq!(event.dedup_key, "D01:hotspot");

        let events = storage.events().await.unwrap();
        assert_eq!(events.len(), 1);

        // Both contacts carry sms and email addresses.
        assert_eq!(notifier.sent.lock().await.len(), 4);
    }

    #[tokio::test]
    async fn cooldown_yields_one_sent_event_per_window() {
        let notifier = Arc::new(RecordingNotifier::new());
        let (engine, storage) = engine_with(
            notifier,
            vec![contact("a1", Role::Analyst)],
            EscalationConfig::default(),
        )
        .await;
        let t0 = Utc::now();

        let first = engine.escalate(&candidate("D01", 45.0), t0).await.unwrap();
        let second = engine
            .escalate(&candidate("D01", 50.0), t0 + Duration::minutes(5))
            .await
            .unwrap();
        let third = engine
            .escalate(&candidate("D01", 50.0), t0 + Duration::minutes(40))
            .await
            .unwrap();

        assert!(matches!(first, EscalationOutcome::Escalated(_)));
        assert_eq!(second, EscalationOutcome::CooledDown);
        assert!(matches!(third, EscalationOutcome::Escalated(_)));

        let events = storage.events().await.unwrap();
        assert_eq!(events.len(), 3);
        let sent = events
            .iter()
            .filter(|e| e.status == AlertStatus::Sent)
            .count();
        let skipped = events
            .iter()
            .filter(|e| e.status == AlertStatus::CooldownSkipped)
            .count();
        assert_eq!(sent, 2);
        assert_eq!(skipped, 1);
    }

    #[tokio::test]
    async fn sources_cool_down_independently() {
        let notifier = Arc::new(RecordingNotifier::new());
        let (engine, storage) = engine_with(
            notifier,
            vec![contact("a1", Role::Analyst)],
            EscalationConfig::default(),
        )
        .await;
        let now = Utc::now();

        engine.escalate(&candidate("D01", 45.0), now).await.unwrap();
        let forecast = Candidate {
            source: AlertSource::Forecast,
            ..candidate("D01", 45.0)
        };
        let outcome = engine.escalate(&forecast, now).await.unwrap();

        assert!(matches!(outcome, EscalationOutcome::Escalated(_)));
        let sent = storage
            .events()
            .await
            .unwrap()
            .iter()
            .filter(|e| e.status == AlertStatus::Sent)
            .count();
        assert_eq!(sent, 2);
    }

    #[tokio::test]
    async fn partial_channel_failure_still_sends() {
        let notifier = Arc::new(RecordingNotifier::failing_on(vec![Channel::Sms]));
        let (engine, _storage) = engine_with(
            notifier.clone(),
            vec![contact("a1", Role::Analyst)],
            EscalationConfig::default(),
        )
        .await;

        let outcome = engine.escalate(&candidate("D01", 45.0), Utc::now()).await.unwrap();

        let EscalationOutcome::Escalated(event) = outcome else {
            panic!("expected escalation, got {outcome:?}");
        };
        assert_eq!(event.status, AlertStatus::Sent);
        // Only the email send landed.
        let sent = notifier.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, Channel::Email);
    }

    #[tokio::test]
    async fn total_failure_is_audited_but_does_not_start_cooldown() {
        let notifier = Arc::new(RecordingNotifier::failing_on(vec![
            Channel::Whatsapp,
            Channel::Sms,
            Channel::Email,
        ]));
        let (engine, storage) = engine_with(
            notifier,
            vec![contact("a1", Role::Analyst)],
            EscalationConfig::default(),
        )
        .await;
        let now = Utc::now();

        let first = engine.escalate(&candidate("D01", 45.0), now).await.unwrap();
        let EscalationOutcome::Escalated(event) = first else {
            panic!("expected escalation, got {first:?}");
        };
        assert_eq!(event.status, AlertStatus::Failed);

        // Failed dispatch doesn't block the retry a minute later.
        let retry = engine
            .escalate(&candidate("D01", 45.0), now + Duration::minutes(1))
            .await
            .unwrap();
        assert!(matches!(retry, EscalationOutcome::Escalated(_)));

        assert_eq!(storage.events().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn pattern_alerts_reach_superadmins_only() {
        let notifier = Arc::new(RecordingNotifier::new());
        let mut config = EscalationConfig::default();
        config.static_recipients = vec![Recipient {
            id: "static-1".to_string(),
            addresses: BTreeMap::from([(Channel::Email, "ops@example.test".to_string())]),
        }];
        let (engine, _storage) = engine_with(
            notifier,
            vec![contact("a1", Role::Analyst), contact("s1", Role::Superadmin)],
            config,
        )
        .await;

        let pattern = Candidate {
            source: AlertSource::Pattern,
            zone: "D01".to_string(),
            score: 45.0,
            message: "Pattern alert".to_string(),
        };
        let outcome = engine.escalate(&pattern, Utc::now()).await.unwrap();

        let EscalationOutcome::Escalated(event) = outcome else {
            panic!("expected escalation, got {outcome:?}");
        };
        assert_eq!(event.recipients, vec!["s1".to_string()]);
    }
}
