use std::sync::Arc;

use tracing::info;

use crate::api::{CatalogClient, CatalogSource};
use crate::config::AppConfig;
use crate::feed::HomeFeed;
use crate::fingerprint::{FilterPreferences, Identity};
use crate::search::SearchAggregator;

/// Both browsing surfaces wired to one catalog source and one set of
/// preferences
pub struct App {
    pub config: AppConfig,
    pub home: HomeFeed,
    pub search: SearchAggregator,
}

impl App {
    pub fn new(config: AppConfig, source: Arc<dyn CatalogSource>) -> App {
        let identity = config.identity();
        let preferences = config.preferences();

        let home = HomeFeed::new(
            source.clone(),
            config.feed_options(),
            identity,
            preferences.clone(),
        );
        let search = SearchAggregator::new(
            source,
            config.search_options(),
            preferences.catalog_filters(),
        );

        App {
            config,
            home,
            search,
        }
    }

    /// Build against the HTTP catalog named in `config`
    pub fn from_config(config: AppConfig) -> Result<App, anyhow::Error> {
        if config.base_url.trim().is_empty() {
            anyhow::bail!("no catalog base_url configured");
        }
        let client = CatalogClient::new(
            config.base_url.clone(),
            config.api_key.clone(),
            config.request_timeout(),
        );
        Ok(App::new(config, Arc::new(client)))
    }

    /// Sign in or out. Both surfaces start over; the home cache is only
    /// dropped if the fingerprint actually moved.
    pub fn set_identity(&mut self, identity: Identity) -> bool {
        self.config.identity = match &identity {
            Identity::Guest => None,
            Identity::User(id) => Some(id.clone()),
        };
        let changed = self.home.set_identity(identity);
        self.search.reset();
        info!(changed, "identity updated");
        changed
    }

    pub fn set_preferences(&mut self, preferences: FilterPreferences) -> bool {
        self.config.set_preferences(&preferences);
        self.search.set_filters(preferences.catalog_filters());
        let changed = self.home.set_preferences(preferences);
        info!(changed, "preferences updated");
        changed
    }
}
