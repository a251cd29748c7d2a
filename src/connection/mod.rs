//! Connection management for the document store
//!
//! Resolves the connection string, connects with the configured timeout,
//! verifies that the requested database and container exist, and works out
//! the container's partition key before a transfer starts.

use std::sync::Arc;
use std::time::Duration;

use bson::{Document as BsonDocument, doc};
use mongodb::options::ClientOptions;
use mongodb::{Client, Database};
use tracing::{debug, info};

use crate::error::{ConnectionError, Result};
use crate::store::{DocumentContainer, MongoContainer};
use crate::utils::validate;

/// Connection string of the local emulator's MongoDB endpoint.
pub const EMULATOR_CONNECTION_STRING: &str = "mongodb://localhost:C2y6yDjf5%2FR%2Bob0N8A7Cgv30VRDJIWEHLM%2B4QDU5DE2nQ9nDuVTqobD4b8mGGyPMbIZnqyMsEcaGQy67XIw%2FJw%3D%3D@localhost:10255/admin?ssl=true&tlsAllowInvalidCertificates=true";

const APP_NAME: &str = "cosmos-shuttle";

/// Expand the `emulator` alias; any other value is returned as given.
pub fn resolve_uri(value: &str) -> String {
    if value.trim().eq_ignore_ascii_case("emulator") {
        EMULATOR_CONNECTION_STRING.to_string()
    } else {
        value.trim().to_string()
    }
}

/// Turn a partition key path (`/region`) into a top-level field name.
///
/// Returns `None` for an empty path.
pub fn partition_key_field(path: &str) -> Option<String> {
    let field = path.trim().trim_start_matches('/');
    (!field.is_empty()).then(|| field.to_string())
}

/// Extract the partition key field from a `GetCollection` response.
fn shard_key_from_metadata(metadata: &BsonDocument) -> Option<String> {
    metadata
        .get_document("shardKeyDefinition")
        .ok()
        .and_then(|definition| definition.keys().next().cloned())
        .and_then(|key| partition_key_field(&key))
}

/// An opened container and the partition key its writes are scoped by.
#[derive(Clone)]
pub struct ContainerConnection {
    pub database: String,
    pub name: String,
    pub container: Arc<dyn DocumentContainer>,
    pub partition_key: Option<String>,
}

/// Connection manager for one run.
pub struct ConnectionManager {
    /// Resolved connection string
    uri: String,
    /// Connect and server selection timeout
    timeout: Duration,
    /// Driver client, once connected
    client: Option<Client>,
}

impl ConnectionManager {
    /// Create a new connection manager
    ///
    /// # Arguments
    /// * `uri` - Connection string or `emulator`
    /// * `timeout` - Connect and server selection timeout, at least one second
    pub fn new(uri: &str, timeout: Duration) -> Self {
        Self {
            uri: resolve_uri(uri),
            timeout: timeout.max(Duration::from_secs(1)),
            client: None,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Connect and ping the server.
    pub async fn connect(&mut self) -> Result<()> {
        if !validate::is_valid_connection_uri(&self.uri) {
            return Err(ConnectionError::InvalidUri(
                "expected a mongodb:// or mongodb+srv:// connection string".to_string(),
            )
            .into());
        }

        let mut options = ClientOptions::parse(&self.uri)
            .await
            .map_err(|e| ConnectionError::InvalidUri(e.to_string()))?;
        options.app_name = Some(APP_NAME.to_string());
        options.connect_timeout = Some(self.timeout);
        options.server_selection_timeout = Some(self.timeout);

        let client = Client::with_options(options)
            .map_err(|e| ConnectionError::ConnectionFailed(e.to_string()))?;

        debug!("Pinging server (timeout {:?})", self.timeout);
        client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| ConnectionError::ConnectionFailed(e.to_string()))?;

        info!("Connected to document store");
        self.client = Some(client);
        Ok(())
    }

    /// Get the driver client
    pub fn client(&self) -> Result<&Client> {
        self.client
            .as_ref()
            .ok_or_else(|| ConnectionError::ConnectionFailed("not connected".to_string()).into())
    }

    /// Open a container after checking that it and its database exist.
    ///
    /// # Arguments
    /// * `database` - Database name
    /// * `container` - Container name
    /// * `partition_key` - Explicit partition key path; discovered from the
    ///   store when `None`
    pub async fn open_container(
        &self,
        database: &str,
        container: &str,
        partition_key: Option<&str>,
    ) -> Result<ContainerConnection> {
        let client = self.client()?;

        let databases = client
            .list_database_names()
            .await
            .map_err(|e| ConnectionError::ConnectionFailed(e.to_string()))?;
        if !databases.iter().any(|name| name == database) {
            return Err(ConnectionError::DatabaseNotFound(database.to_string()).into());
        }

        let db = client.database(database);
        let containers = db
            .list_collection_names()
            .await
            .map_err(|e| ConnectionError::ConnectionFailed(e.to_string()))?;
        if !containers.iter().any(|name| name == container) {
            return Err(ConnectionError::ContainerNotFound(container.to_string()).into());
        }

        let partition_key = match partition_key {
            Some(path) => partition_key_field(path),
            None => Self::discover_partition_key(&db, container).await,
        };
        match &partition_key {
            Some(key) => info!("Container {}/{} is partitioned by '{}'", database, container, key),
            None => info!("Container {}/{} is not partitioned", database, container),
        }

        let collection = db.collection::<BsonDocument>(container);
        Ok(ContainerConnection {
            database: database.to_string(),
            name: container.to_string(),
            container: Arc::new(MongoContainer::new(collection, partition_key.clone())),
            partition_key,
        })
    }

    /// Ask the store for the container's partition key definition.
    ///
    /// Servers without the extension command report no partition key.
    async fn discover_partition_key(db: &Database, container: &str) -> Option<String> {
        let command = doc! { "customAction": "GetCollection", "collection": container };
        match db.run_command(command).await {
            Ok(metadata) => shard_key_from_metadata(&metadata),
            Err(e) => {
                debug!("Partition key metadata unavailable for {}: {}", container, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emulator_alias() {
        assert_eq!(resolve_uri("emulator"), EMULATOR_CONNECTION_STRING);
        assert_eq!(resolve_uri(" EMULATOR "), EMULATOR_CONNECTION_STRING);
        assert_eq!(resolve_uri("mongodb://host:1"), "mongodb://host:1");
    }

    #[test]
    fn test_partition_key_field() {
        assert_eq!(partition_key_field("/region").as_deref(), Some("region"));
        assert_eq!(partition_key_field("region").as_deref(), Some("region"));
        assert_eq!(partition_key_field("/"), None);
        assert_eq!(partition_key_field(""), None);
    }

    #[test]
    fn test_shard_key_from_metadata() {
        let metadata = doc! {
            "collectionName": "orders",
            "shardKeyDefinition": { "customerId": "hashed" },
        };
        assert_eq!(shard_key_from_metadata(&metadata).as_deref(), Some("customerId"));
        assert_eq!(shard_key_from_metadata(&doc! { "collectionName": "orders" }), None);
    }

    #[test]
    fn test_timeout_from_config() {
        let mut config = crate::config::Config::default();
        config.connection.timeout = 30;
        let manager = ConnectionManager::new("emulator", config.request_timeout());
        assert_eq!(manager.timeout(), Duration::from_secs(30));

        let manager = ConnectionManager::new("emulator", Duration::ZERO);
        assert_eq!(manager.timeout(), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_rejects_non_mongodb_uri() {
        let mut manager = ConnectionManager::new(
            "AccountEndpoint=https://acct.documents.azure.com:443/;AccountKey=abc;",
            Duration::from_secs(120),
        );
        let err = manager.connect().await.unwrap_err();
        assert!(matches!(
            err,
            crate::error::ShuttleError::Connection(ConnectionError::InvalidUri(_))
        ));
        assert!(manager.client().is_err());
    }
}
