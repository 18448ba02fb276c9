use std::path::PathBuf;
use std::sync::Arc;

use dax_config::{ConfigComposer, ConfigSource, ResolvedConfig};
use dax_dict::{DictKey, DictRegistry, PersistedRecord, SqliteDict};
use dax_store::{
    run_in_transaction, BackendContext, BackendRegistry, DatasetUri, DatastoreComponent,
    ObjectClient, StorageBackend, DATASTORE_COMPONENT,
};
use dax_types::{Dataset, DatasetRef, Parameters};

use crate::component::{RegistryComponent, REGISTRY_COMPONENT};
use crate::error::SdkResult;

/// Construction options beyond the configuration itself.
#[derive(Debug, Default)]
pub struct RepositoryOptions {
    /// Backend implementations available to `datastore.cls`. Defaults to
    /// the built-in set.
    pub backends: Option<BackendRegistry>,
    /// Client for `objectstore` datastores.
    pub object_client: Option<Arc<dyn ObjectClient>>,
    /// Default-file search paths; `None` reads `DAX_CONFIG_PATHS`.
    pub search_paths: Option<Vec<PathBuf>>,
}

/// A data repository: one datastore plus a relational store for persisted
/// dictionaries, brought up from configuration.
pub struct Repository {
    config: ResolvedConfig,
    dicts: DictRegistry,
    datastore: Box<dyn StorageBackend>,
}

impl Repository {
    /// Open a repository with the built-in backends.
    pub fn open(source: impl Into<ConfigSource>) -> SdkResult<Self> {
        Self::open_with(source, RepositoryOptions::default())
    }

    /// Compose the `datastore` and `registry` configuration, open the
    /// relational store and build the datastore.
    pub fn open_with(source: impl Into<ConfigSource>, options: RepositoryOptions) -> SdkResult<Self> {
        let backends = options.backends.unwrap_or_default();
        let mut composer = ConfigComposer::new(vec![
            Box::new(DatastoreComponent::new(backends.clone())),
            Box::new(RegistryComponent),
        ]);
        if let Some(paths) = options.search_paths {
            composer = composer.with_search_paths(paths);
        }
        let config = composer.compose(source.into())?;

        let db = config
            .get_str(&format!("{REGISTRY_COMPONENT}.db"))
            .unwrap_or(":memory:");
        let dicts = DictRegistry::open(db)?;

        let datastore_config = config.get_tree(DATASTORE_COMPONENT)?.unwrap_or_default();
        let context = BackendContext {
            dict_registry: Some(dicts.clone()),
            object_client: options.object_client,
        };
        let datastore = backends.build(&datastore_config, &context)?;
        tracing::info!(
            datastore = datastore.name(),
            registry = dicts.location(),
            "opened repository"
        );

        Ok(Self {
            config,
            dicts,
            datastore,
        })
    }

    /// The resolved configuration the repository was built from.
    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    pub fn datastore(&self) -> &dyn StorageBackend {
        self.datastore.as_ref()
    }

    pub fn dict_registry(&self) -> &DictRegistry {
        &self.dicts
    }

    // ---- Dataset operations ----

    pub fn put(&self, value: &Dataset, dataset: &DatasetRef) -> SdkResult<()> {
        Ok(self.datastore.put(value, dataset)?)
    }

    pub fn get(&self, dataset: &DatasetRef, parameters: Option<&Parameters>) -> SdkResult<Dataset> {
        Ok(self.datastore.get(dataset, parameters)?)
    }

    pub fn exists(&self, dataset: &DatasetRef) -> SdkResult<bool> {
        Ok(self.datastore.exists(dataset)?)
    }

    pub fn uri(&self, dataset: &DatasetRef, predict: bool) -> SdkResult<DatasetUri> {
        Ok(self.datastore.uri(dataset, predict)?)
    }

    pub fn remove(&self, dataset: &DatasetRef) -> SdkResult<()> {
        Ok(self.datastore.remove(dataset)?)
    }

    /// Copy one dataset from another repository's datastore into this one.
    pub fn transfer_from(&self, source: &Repository, dataset: &DatasetRef) -> SdkResult<()> {
        Ok(self
            .datastore
            .transfer_from(source.datastore.as_ref(), dataset)?)
    }

    /// Run `f` so that its datastore writes are undone if it fails.
    ///
    /// Dictionary writes are not part of the transaction.
    pub fn transaction<T, F>(&self, f: F) -> SdkResult<T>
    where
        F: FnOnce(&Self) -> SdkResult<T>,
    {
        run_in_transaction(self.datastore.as_ref(), |_| f(self))
    }

    // ---- Persisted dictionaries ----

    /// A dictionary over `table` in the repository's relational store,
    /// created if absent.
    pub fn dict<K: DictKey, V: PersistedRecord>(
        &self,
        table: &str,
        key: &str,
    ) -> SdkResult<SqliteDict<K, V>> {
        Ok(self.dicts.make_dict::<K, V>(table, key)?)
    }
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("datastore", &self.datastore.name())
            .field("registry", &self.dicts.location())
            .finish()
    }
}
