//! Orchestrates the source adapters for one artist and merges their facts.

use log::{debug, info, warn};
use tokio::sync::broadcast;

use super::merge;
use crate::cancellation::CancelToken;
use crate::config::ResolutionConfig;
use crate::error::SourceError;
use crate::model::{ArtistQuery, CanonicalRecord, ResolutionStatus, SourceFact, SourceId};
use crate::protocol::{Message, ResolutionMessage, ResolutionPhase, SourceOutcome};
use crate::sources::{SourceAdapter, SourceRegistry};

/// Result of querying one adapter during a resolution.
enum Queried {
    Facts(Vec<SourceFact>),
    /// Credentials were rejected after the adapter's single refresh.
    AuthFailed,
}

/// Stateless per resolution; safe to share between batch workers.
pub struct ResolutionEngine {
    registry: SourceRegistry,
    settings: ResolutionConfig,
    bus_sender: Option<broadcast::Sender<Message>>,
}

impl ResolutionEngine {
    pub fn new(registry: SourceRegistry, settings: ResolutionConfig) -> Self {
        Self {
            registry,
            settings,
            bus_sender: None,
        }
    }

    pub fn with_bus(mut self, bus_sender: broadcast::Sender<Message>) -> Self {
        self.bus_sender = Some(bus_sender);
        self
    }

    /// Resolves one artist. Never fails: missing data shows up as unknown fields.
    pub fn resolve(&self, query: ArtistQuery) -> CanonicalRecord {
        let artist = query.name.clone();
        self.resolve_cancellable(&query, &CancelToken::new())
            .unwrap_or_else(|| CanonicalRecord::unresolved(artist, Vec::new()))
    }

    /// Like [`resolve`](Self::resolve), returning `None` once `cancel` fires.
    pub fn resolve_cancellable(&self, query: &ArtistQuery, cancel: &CancelToken) -> Option<CanonicalRecord> {
        let record = self.run(query, cancel);
        if record.is_none() {
            info!("Resolution: '{}' cancelled", query.name);
            self.publish(ResolutionMessage::Cancelled {
                artist: query.name.clone(),
            });
        }
        record
    }

    fn run(&self, query: &ArtistQuery, cancel: &CancelToken) -> Option<CanonicalRecord> {
        self.phase(&query.name, ResolutionPhase::Pending);
        let mut facts: Vec<SourceFact> = Vec::new();

        if let Some(adapter) = &self.registry.catalog {
            match self.query_source(adapter.as_ref(), query, cancel)? {
                Queried::Facts(found) => facts.extend(found),
                Queried::AuthFailed => {
                    warn!(
                        "Resolution: catalog credentials rejected, '{}' left unresolved",
                        query.name
                    );
                    let record = CanonicalRecord::unresolved(query.name.clone(), facts);
                    self.finish(&record);
                    return Some(record);
                }
            }
        }

        if let Some(adapter) = &self.registry.structured {
            facts.extend(self.query_facts(adapter.as_ref(), query, cancel)?);
        }

        if let Some(adapter) = &self.registry.summary {
            if self.has_long_biography(&facts) {
                self.skip(adapter.as_ref(), query);
            } else {
                facts.extend(self.query_facts(adapter.as_ref(), query, cancel)?);
            }
        }

        if let Some(adapter) = &self.registry.linked_data {
            facts.extend(self.query_facts(adapter.as_ref(), query, cancel)?);
        }

        if let Some(adapter) = &self.registry.fallback_narrative {
            if merge::best_biography_chars(&facts) > 0 {
                self.skip(adapter.as_ref(), query);
            } else {
                facts.extend(self.query_facts(adapter.as_ref(), query, cancel)?);
            }
        }

        self.phase(&query.name, ResolutionPhase::Merging);
        if let Some(adapter) = &self.registry.research {
            self.phase(&query.name, ResolutionPhase::AiSupplement);
            facts.extend(self.query_facts(adapter.as_ref(), query, cancel)?);
        }
        if cancel.is_cancelled() {
            return None;
        }

        let fields = merge::merge_facts(&facts);
        let relationships = merge::relationship_block(&facts);
        let mut record = CanonicalRecord::new(
            query.name.clone(),
            ResolutionStatus::Resolved,
            fields,
            facts,
        );
        record.relationships = relationships;
        self.finish(&record);
        Some(record)
    }

    fn has_long_biography(&self, facts: &[SourceFact]) -> bool {
        merge::best_biography_chars(facts) >= self.settings.min_biography_chars
    }

    /// Runs one adapter; `None` means the resolution was cancelled.
    fn query_source(
        &self,
        adapter: &dyn SourceAdapter,
        query: &ArtistQuery,
        cancel: &CancelToken,
    ) -> Option<Queried> {
        if cancel.is_cancelled() {
            return None;
        }
        let source = adapter.source_id();
        self.phase(&query.name, ResolutionPhase::Querying(source));

        let (queried, outcome) = match adapter.fetch(query, cancel) {
            Ok(found) => {
                debug!("Resolution: {} returned {} facts for '{}'", source, found.len(), query.name);
                let outcome = SourceOutcome::Facts(found.len());
                (Queried::Facts(found), outcome)
            }
            Err(SourceError::Cancelled) => return None,
            Err(SourceError::NotFound) => {
                debug!("Resolution: {} has no entry for '{}'", source, query.name);
                (Queried::Facts(Vec::new()), SourceOutcome::NotFound)
            }
            Err(error) => {
                warn!("Resolution: {} failed for '{}': {}", source, query.name, error);
                let outcome = SourceOutcome::Failed {
                    kind: error.kind_label(),
                    message: error.to_string(),
                };
                match error {
                    SourceError::Auth(_) if source == SourceId::Spotify => {
                        (Queried::AuthFailed, outcome)
                    }
                    _ => (Queried::Facts(Vec::new()), outcome),
                }
            }
        };
        self.publish(ResolutionMessage::SourceFinished {
            artist: query.name.clone(),
            source,
            outcome,
        });
        Some(queried)
    }

    fn query_facts(
        &self,
        adapter: &dyn SourceAdapter,
        query: &ArtistQuery,
        cancel: &CancelToken,
    ) -> Option<Vec<SourceFact>> {
        match self.query_source(adapter, query, cancel)? {
            Queried::Facts(found) => Some(found),
            Queried::AuthFailed => Some(Vec::new()),
        }
    }

    fn skip(&self, adapter: &dyn SourceAdapter, query: &ArtistQuery) {
        debug!(
            "Resolution: skipping {} for '{}', biography already covered",
            adapter.source_id(),
            query.name
        );
        self.publish(ResolutionMessage::SourceFinished {
            artist: query.name.clone(),
            source: adapter.source_id(),
            outcome: SourceOutcome::Skipped,
        });
    }

    fn phase(&self, artist: &str, phase: ResolutionPhase) {
        self.publish(ResolutionMessage::PhaseChanged {
            artist: artist.to_string(),
            phase,
        });
    }

    fn finish(&self, record: &CanonicalRecord) {
        info!(
            "Resolution: '{}' {:?} with {} known and {} unknown fields",
            record.artist,
            record.status,
            record.fields.len(),
            record.unknown_fields.len()
        );
        self.phase(&record.artist, ResolutionPhase::Done);
        self.publish(ResolutionMessage::Finished {
            artist: record.artist.clone(),
            status: record.status,
            known_fields: record.fields.len(),
            unknown_fields: record.unknown_fields.len(),
        });
    }

    fn publish(&self, message: ResolutionMessage) {
        if let Some(bus_sender) = &self.bus_sender {
            // No subscribers is fine.
            let _ = bus_sender.send(Message::Resolution(message));
        }
    }
}
