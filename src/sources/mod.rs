//! Source adapters: one per upstream, all behind [`SourceAdapter`].

pub mod ai_research;
pub mod matching;
pub mod musicbrainz;
pub mod spotify;
pub mod wikidata;
pub mod wikipedia;
pub mod wikipedia_structured;
pub mod wikipedia_summary;

use std::sync::Arc;

use log::info;

use crate::cancellation::CancelToken;
use crate::config::{CredentialsConfig, ResolutionConfig};
use crate::error::SourceError;
use crate::http_client::RateLimitedClient;
use crate::model::{ArtistQuery, SourceFact, SourceId};

use self::ai_research::AiResearchAdapter;
use self::musicbrainz::MusicBrainzAdapter;
use self::spotify::SpotifyAdapter;
use self::wikidata::{LabelLookup, NoLabelLookup, WikidataAdapter, WikidataLabelLookup};
use self::wikipedia::WikipediaPageDirectory;
use self::wikipedia_structured::WikipediaStructuredAdapter;
use self::wikipedia_summary::WikipediaSummaryAdapter;

/// Uniform "fetch artist facts" contract.
///
/// `Err(SourceError::NotFound)` is a normal outcome. Implementations must
/// check `cancel` at every suspension point; the shared client already does.
pub trait SourceAdapter: Send + Sync {
    fn source_id(&self) -> SourceId;
    fn fetch(&self, query: &ArtistQuery, cancel: &CancelToken) -> Result<Vec<SourceFact>, SourceError>;
}

/// The adapters available to the engine, by role. Absent roles are skipped.
#[derive(Clone, Default)]
pub struct SourceRegistry {
    pub catalog: Option<Arc<dyn SourceAdapter>>,
    pub structured: Option<Arc<dyn SourceAdapter>>,
    pub summary: Option<Arc<dyn SourceAdapter>>,
    pub linked_data: Option<Arc<dyn SourceAdapter>>,
    pub fallback_narrative: Option<Arc<dyn SourceAdapter>>,
    pub research: Option<Arc<dyn SourceAdapter>>,
}

impl SourceRegistry {
    /// Builds every adapter the credentials allow, all sharing one client.
    pub fn from_config(
        client: Arc<RateLimitedClient>,
        resolution: &ResolutionConfig,
        credentials: &CredentialsConfig,
    ) -> Self {
        let directory = Arc::new(WikipediaPageDirectory::new(client.clone()));
        let labels: Arc<dyn LabelLookup> = if resolution.resolve_wikidata_labels {
            Arc::new(WikidataLabelLookup::new(client.clone()))
        } else {
            Arc::new(NoLabelLookup)
        };

        let catalog = if credentials.spotify_client_id.trim().is_empty()
            || credentials.spotify_client_secret.trim().is_empty()
        {
            info!("Sources: Spotify credentials missing, catalog fields will stay unknown");
            None
        } else {
            Some(Arc::new(SpotifyAdapter::new(
                client.clone(),
                credentials.spotify_client_id.trim().to_string(),
                credentials.spotify_client_secret.trim().to_string(),
            )) as Arc<dyn SourceAdapter>)
        };

        let research = if !resolution.ai_research_enabled {
            None
        } else if credentials.perplexity_api_key.trim().is_empty() {
            info!("Sources: AI research enabled but no Perplexity key configured");
            None
        } else {
            Some(Arc::new(AiResearchAdapter::new(
                client.clone(),
                credentials.perplexity_api_key.trim().to_string(),
                credentials.perplexity_model.clone(),
            )) as Arc<dyn SourceAdapter>)
        };

        Self {
            catalog,
            structured: Some(Arc::new(WikipediaStructuredAdapter::new(
                client.clone(),
                directory.clone(),
            ))),
            summary: Some(Arc::new(WikipediaSummaryAdapter::new(
                client.clone(),
                directory.clone(),
            ))),
            linked_data: Some(Arc::new(WikidataAdapter::new(
                client.clone(),
                directory,
                labels,
            ))),
            fallback_narrative: Some(Arc::new(MusicBrainzAdapter::new(client))),
            research,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::SourceRegistry;
    use crate::config::{CredentialsConfig, NetworkConfig, ResolutionConfig};
    use crate::http_client::testing::FakeTransport;
    use crate::http_client::RateLimitedClient;
    use crate::model::SourceId;

    fn client() -> Arc<RateLimitedClient> {
        Arc::new(RateLimitedClient::new(
            Arc::new(FakeTransport::new()),
            &NetworkConfig::default(),
        ))
    }

    #[test]
    fn test_registry_without_credentials_has_no_catalog_or_research() {
        let resolution = ResolutionConfig {
            ai_research_enabled: true,
            ..ResolutionConfig::default()
        };
        let registry =
            SourceRegistry::from_config(client(), &resolution, &CredentialsConfig::default());
        assert!(registry.catalog.is_none());
        assert!(registry.research.is_none());
        assert_eq!(
            registry.structured.map(|adapter| adapter.source_id()),
            Some(SourceId::WikipediaStructured)
        );
        assert_eq!(
            registry.fallback_narrative.map(|adapter| adapter.source_id()),
            Some(SourceId::MusicBrainz)
        );
    }

    #[test]
    fn test_registry_with_credentials_builds_catalog_and_research() {
        let credentials = CredentialsConfig {
            spotify_client_id: "id".to_string(),
            spotify_client_secret: "secret".to_string(),
            perplexity_api_key: "key".to_string(),
            perplexity_model: "sonar-pro".to_string(),
        };
        let disabled = SourceRegistry::from_config(client(), &ResolutionConfig::default(), &credentials);
        assert!(disabled.catalog.is_some());
        assert!(disabled.research.is_none());

        let enabled = SourceRegistry::from_config(
            client(),
            &ResolutionConfig {
                ai_research_enabled: true,
                ..ResolutionConfig::default()
            },
            &credentials,
        );
        assert_eq!(
            enabled.research.map(|adapter| adapter.source_id()),
            Some(SourceId::AiResearch)
        );
    }
}
