//! MongoDB client settings derived from the environment and [`StoreSettings`].

use mongodb::options::ClientOptions;

use super::{
    connection::RetryPolicy,
    error::{MongoDaoError, MongoResult},
};
use crate::config::StoreSettings;

const APP_NAME: &str = "matchday-back";

/// Everything needed to open, and later reopen, the event store connection.
#[derive(Debug, Clone)]
pub struct MongoConfig {
    options: ClientOptions,
    database_name: String,
    retry: RetryPolicy,
}

impl MongoConfig {
    /// Parse `uri` and apply `settings` where the URI leaves a value unset.
    ///
    /// `database` overrides [`StoreSettings::database`].
    pub async fn from_uri(
        uri: &str,
        database: Option<&str>,
        settings: &StoreSettings,
    ) -> MongoResult<Self> {
        let mut options =
            ClientOptions::parse(uri)
                .await
                .map_err(|source| MongoDaoError::InvalidUri {
                    uri: uri.to_owned(),
                    source,
                })?;
        if options.app_name.is_none() {
            options.app_name = Some(APP_NAME.to_owned());
        }
        if options.max_pool_size.is_none() {
            options.max_pool_size = Some(settings.max_pool_size);
        }
        if options.server_selection_timeout.is_none() {
            options.server_selection_timeout = Some(settings.operation_timeout);
        }
        if options.connect_timeout.is_none() {
            options.connect_timeout = Some(settings.operation_timeout);
        }

        let database_name = database
            .filter(|name| !name.is_empty())
            .unwrap_or(&settings.database)
            .to_owned();

        Ok(Self {
            options,
            database_name,
            retry: RetryPolicy::new(settings.connect_attempts),
        })
    }

    /// Read `MONGO_URI` (required) and `MONGO_DB` (optional).
    pub async fn from_env(settings: &StoreSettings) -> MongoResult<Self> {
        let uri = std::env::var("MONGO_URI")
            .map_err(|_| MongoDaoError::MissingEnvVar { var: "MONGO_URI" })?;
        let database = std::env::var("MONGO_DB").ok();
        Self::from_uri(&uri, database.as_deref(), settings).await
    }

    /// Database holding the events and users collections.
    pub fn database_name(&self) -> &str {
        &self.database_name
    }

    pub(super) fn client_options(&self) -> &ClientOptions {
        &self.options
    }

    pub(super) fn retry(&self) -> RetryPolicy {
        self.retry
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::AppConfig;

    fn settings() -> StoreSettings {
        StoreSettings {
            max_pool_size: 4,
            connect_attempts: 3,
            operation_timeout: Duration::from_secs(2),
            ..AppConfig::default().store().clone()
        }
    }

    #[tokio::test]
    async fn settings_fill_what_the_uri_leaves_open() {
        let config = MongoConfig::from_uri("mongodb://localhost:27017", None, &settings())
            .await
            .unwrap();

        let options = config.client_options();
        assert_eq!(options.app_name.as_deref(), Some(APP_NAME));
        assert_eq!(options.max_pool_size, Some(4));
        assert_eq!(options.server_selection_timeout, Some(Duration::from_secs(2)));
        assert_eq!(options.connect_timeout, Some(Duration::from_secs(2)));
        assert_eq!(config.database_name(), "matchday");
        assert_eq!(config.retry().attempts(), 3);
    }

    #[tokio::test]
    async fn uri_parameters_and_database_override_win() {
        let config = MongoConfig::from_uri(
            "mongodb://localhost:27017/?maxPoolSize=9&appName=ops",
            Some("league"),
            &settings(),
        )
        .await
        .unwrap();

        let options = config.client_options();
        assert_eq!(options.max_pool_size, Some(9));
        assert_eq!(options.app_name.as_deref(), Some("ops"));
        assert_eq!(config.database_name(), "league");
    }

    #[tokio::test]
    async fn malformed_uri_is_reported_with_the_uri() {
        let err = MongoConfig::from_uri("postgres://nope", None, &settings())
            .await
            .unwrap_err();
        assert!(matches!(err, MongoDaoError::InvalidUri { uri, .. } if uri == "postgres://nope"));
    }
}
