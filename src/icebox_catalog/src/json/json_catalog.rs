use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use icebox::catalog::{Catalog, PropertyUpdateSummary, TableCreateOptions};
use icebox::error::{Error, Result};
use icebox::metadata::{
    apply_updates, metadata_file_path, new_table_metadata, parse_metadata_version,
    push_metadata_log, TableRequirement, TableUpdate,
};
use icebox::spec::{PartitionSpec, Schema, SortOrder, TableMetadata};
use icebox::storage::FileIO;
use icebox::{CancelToken, NamespaceIdent, Table, TableIdent};

use crate::validate::{validate_namespace, validate_table_ident};

const NAMESPACE_EXISTS_KEY: &str = "exists";
const NAMESPACE_EXISTS_VALUE: &str = "true";

/// On-disk shape of the JSON registry: namespaces with their property maps,
/// and per-namespace table records carrying the metadata pointers.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct Registry {
    namespaces: BTreeMap<String, HashMap<String, String>>,
    tables: BTreeMap<String, BTreeMap<String, TableRecord>>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct TableRecord {
    metadata_location: Option<String>,
    previous_metadata_location: Option<String>,
}

/// Catalog store persisted as one JSON registry file. Every mutation loads
/// the registry, applies the change, and writes the whole document back
/// atomically; a mutex serializes in-process operations so the write-back is
/// the linearization point.
pub struct JsonCatalog {
    name: String,
    uri: String,
    warehouse: String,
    file_io: FileIO,
    lock: Mutex<()>,
}

impl JsonCatalog {
    pub async fn new(
        name: impl Into<String>,
        uri: impl Into<String>,
        warehouse: impl Into<String>,
        file_io: FileIO,
    ) -> Result<Self> {
        let catalog = Self {
            name: name.into(),
            uri: uri.into(),
            warehouse: warehouse.into().trim_end_matches('/').to_string(),
            file_io,
            lock: Mutex::new(()),
        };
        // materialize an empty registry so later loads never miss
        if !catalog.file_io.exists(&catalog.uri).await? {
            catalog.persist(&Registry::default()).await?;
        }
        Ok(catalog)
    }

    pub fn warehouse(&self) -> &str {
        &self.warehouse
    }

    async fn load_registry(&self) -> Result<Registry> {
        match self.file_io.read(&self.uri).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                Error::corrupted_metadata(format!("catalog registry does not parse: {e}"))
            }),
            Err(Error::NotFound(_)) => Ok(Registry::default()),
            Err(e) => Err(e),
        }
    }

    async fn persist(&self, registry: &Registry) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(registry)?;
        self.file_io.write(&self.uri, bytes).await
    }

    fn default_table_location(&self, identifier: &TableIdent) -> String {
        format!(
            "{}/{}/{}",
            self.warehouse,
            identifier.namespace().join("/"),
            identifier.name()
        )
    }

    fn table_record<'a>(
        registry: &'a Registry,
        identifier: &TableIdent,
    ) -> Option<&'a TableRecord> {
        registry
            .tables
            .get(&identifier.namespace().encode())
            .and_then(|tables| tables.get(identifier.name()))
    }

    async fn read_metadata(&self, location: &str) -> Result<TableMetadata> {
        let bytes = self.file_io.read(location).await?;
        TableMetadata::parse(&bytes)
    }
}

#[async_trait]
impl Catalog for JsonCatalog {
    fn name(&self) -> &str {
        &self.name
    }

    fn file_io(&self) -> &FileIO {
        &self.file_io
    }

    async fn create_namespace(
        &self,
        namespace: &NamespaceIdent,
        properties: HashMap<String, String>,
        cancel: &CancelToken,
    ) -> Result<()> {
        validate_namespace(namespace)?;
        cancel.check("create_namespace")?;
        let _guard = self.lock.lock().await;
        let mut registry = self.load_registry().await?;
        let encoded = namespace.encode();
        if registry.namespaces.contains_key(&encoded) {
            return Err(Error::namespace_already_exists(namespace));
        }
        let mut stored = properties;
        stored.insert(NAMESPACE_EXISTS_KEY.to_string(), NAMESPACE_EXISTS_VALUE.to_string());
        registry.namespaces.insert(encoded, stored);
        self.persist(&registry).await?;
        debug!(namespace = %namespace, "created namespace");
        Ok(())
    }

    async fn drop_namespace(&self, namespace: &NamespaceIdent, cancel: &CancelToken) -> Result<()> {
        validate_namespace(namespace)?;
        cancel.check("drop_namespace")?;
        let _guard = self.lock.lock().await;
        let mut registry = self.load_registry().await?;
        let encoded = namespace.encode();
        if !registry.namespaces.contains_key(&encoded) {
            return Err(Error::no_such_namespace(namespace));
        }
        let descendant_prefix = format!("{encoded}.");
        let occupied = registry.tables.iter().any(|(ns, tables)| {
            (ns == &encoded || ns.starts_with(&descendant_prefix)) && !tables.is_empty()
        });
        if occupied {
            return Err(Error::namespace_not_empty(namespace));
        }
        registry.namespaces.remove(&encoded);
        registry.tables.remove(&encoded);
        self.persist(&registry).await?;
        debug!(namespace = %namespace, "dropped namespace");
        Ok(())
    }

    async fn namespace_exists(
        &self,
        namespace: &NamespaceIdent,
        cancel: &CancelToken,
    ) -> Result<bool> {
        validate_namespace(namespace)?;
        cancel.check("namespace_exists")?;
        let registry = self.load_registry().await?;
        Ok(registry.namespaces.contains_key(&namespace.encode()))
    }

    async fn load_namespace_properties(
        &self,
        namespace: &NamespaceIdent,
        cancel: &CancelToken,
    ) -> Result<HashMap<String, String>> {
        validate_namespace(namespace)?;
        cancel.check("load_namespace_properties")?;
        let registry = self.load_registry().await?;
        registry
            .namespaces
            .get(&namespace.encode())
            .cloned()
            .ok_or_else(|| Error::no_such_namespace(namespace))
    }

    async fn update_namespace_properties(
        &self,
        namespace: &NamespaceIdent,
        removals: Vec<String>,
        updates: HashMap<String, String>,
        cancel: &CancelToken,
    ) -> Result<PropertyUpdateSummary> {
        validate_namespace(namespace)?;
        cancel.check("update_namespace_properties")?;
        let _guard = self.lock.lock().await;
        let mut registry = self.load_registry().await?;
        let properties = registry
            .namespaces
            .get_mut(&namespace.encode())
            .ok_or_else(|| Error::no_such_namespace(namespace))?;

        let mut summary = PropertyUpdateSummary::default();
        for key in &removals {
            if key == NAMESPACE_EXISTS_KEY {
                summary.missing.push(key.clone());
                continue;
            }
            if properties.remove(key).is_some() {
                summary.removed.push(key.clone());
            } else {
                summary.missing.push(key.clone());
            }
        }
        for (key, value) in &updates {
            properties.insert(key.clone(), value.clone());
            summary.updated.push(key.clone());
        }
        self.persist(&registry).await?;

        summary.removed.sort();
        summary.updated.sort();
        summary.missing.sort();
        Ok(summary)
    }

    async fn list_namespaces(
        &self,
        parent: Option<&NamespaceIdent>,
        cancel: &CancelToken,
    ) -> Result<Vec<NamespaceIdent>> {
        cancel.check("list_namespaces")?;
        let registry = self.load_registry().await?;
        if let Some(parent) = parent {
            validate_namespace(parent)?;
            if !registry.namespaces.contains_key(&parent.encode()) {
                return Err(Error::no_such_namespace(parent));
            }
        }
        let mut namespaces = Vec::new();
        for encoded in registry.namespaces.keys() {
            let namespace = NamespaceIdent::parse(encoded)?;
            match parent {
                Some(parent) => {
                    if namespace.is_descendant_of(parent) {
                        namespaces.push(namespace);
                    }
                }
                None => namespaces.push(namespace),
            }
        }
        Ok(namespaces)
    }

    async fn create_table(
        &self,
        identifier: &TableIdent,
        schema: Schema,
        options: TableCreateOptions,
        cancel: &CancelToken,
    ) -> Result<Table> {
        validate_table_ident(identifier)?;
        cancel.check("create_table")?;
        let _guard = self.lock.lock().await;
        let mut registry = self.load_registry().await?;
        let namespace = identifier.namespace().encode();
        if !registry.namespaces.contains_key(&namespace) {
            return Err(Error::no_such_namespace(identifier.namespace()));
        }
        if Self::table_record(&registry, identifier).is_some() {
            return Err(Error::table_already_exists(identifier));
        }

        let location = options
            .location
            .unwrap_or_else(|| self.default_table_location(identifier));
        let metadata = new_table_metadata(
            schema,
            PartitionSpec::unpartitioned(),
            SortOrder::unsorted(),
            location.clone(),
            options.properties,
        );
        let metadata_location = metadata_file_path(&location, 1);
        self.file_io
            .write(&metadata_location, metadata.serialize()?)
            .await?;

        registry.tables.entry(namespace).or_default().insert(
            identifier.name().to_string(),
            TableRecord {
                metadata_location: Some(metadata_location.clone()),
                previous_metadata_location: None,
            },
        );
        self.persist(&registry).await?;
        debug!(table = %identifier, location = %location, "created table");

        Ok(Table::new(
            identifier.clone(),
            metadata,
            metadata_location,
            self.file_io.clone(),
            self.name.clone(),
        ))
    }

    async fn load_table(&self, identifier: &TableIdent, cancel: &CancelToken) -> Result<Table> {
        validate_table_ident(identifier)?;
        cancel.check("load_table")?;
        let registry = self.load_registry().await?;
        let metadata_location = Self::table_record(&registry, identifier)
            .and_then(|record| record.metadata_location.clone())
            .ok_or_else(|| Error::no_such_table(identifier))?;
        let metadata = self.read_metadata(&metadata_location).await?;
        Ok(Table::new(
            identifier.clone(),
            metadata,
            metadata_location,
            self.file_io.clone(),
            self.name.clone(),
        ))
    }

    async fn commit_table(
        &self,
        table: &Table,
        requirements: Vec<TableRequirement>,
        updates: Vec<TableUpdate>,
        cancel: &CancelToken,
    ) -> Result<(TableMetadata, String)> {
        let identifier = table.identifier();
        validate_table_ident(identifier)?;
        cancel.check("commit_table")?;
        let _guard = self.lock.lock().await;
        let mut registry = self.load_registry().await?;
        let current_location = Self::table_record(&registry, identifier)
            .and_then(|record| record.metadata_location.clone())
            .ok_or_else(|| Error::no_such_table(identifier))?;

        let current = self.read_metadata(&current_location).await?;
        for requirement in &requirements {
            if let Err(reason) = requirement.check(&current) {
                debug!(table = %identifier, reason = %reason, "commit requirement violated");
                return Err(Error::conflicting_commit(identifier));
            }
        }

        let mut next = apply_updates(&current, &updates)?;
        push_metadata_log(&mut next, &current_location);
        let next_version = parse_metadata_version(&current_location)? + 1;
        let next_location = metadata_file_path(&next.location, next_version);

        // metadata file first; the registry write-back is the pointer flip
        self.file_io.write(&next_location, next.serialize()?).await?;

        cancel.check("commit_table")?;
        let record = registry
            .tables
            .get_mut(&identifier.namespace().encode())
            .and_then(|tables| tables.get_mut(identifier.name()))
            .ok_or_else(|| Error::no_such_table(identifier))?;
        if record.metadata_location.as_deref() != Some(current_location.as_str()) {
            // someone replaced the pointer while the file was being written
            return Err(Error::conflicting_commit(identifier));
        }
        record.previous_metadata_location = Some(current_location);
        record.metadata_location = Some(next_location.clone());
        self.persist(&registry).await?;
        debug!(table = %identifier, location = %next_location, "committed table metadata");
        Ok((next, next_location))
    }

    async fn drop_table(&self, identifier: &TableIdent, cancel: &CancelToken) -> Result<()> {
        validate_table_ident(identifier)?;
        cancel.check("drop_table")?;
        let _guard = self.lock.lock().await;
        let mut registry = self.load_registry().await?;
        let namespace = identifier.namespace().encode();
        let removed = registry
            .tables
            .get_mut(&namespace)
            .and_then(|tables| tables.remove(identifier.name()));
        if removed.is_none() {
            return Err(Error::no_such_table(identifier));
        }
        self.persist(&registry).await?;
        // data and metadata files stay on storage for recovery
        debug!(table = %identifier, "dropped table record");
        Ok(())
    }

    async fn rename_table(
        &self,
        from: &TableIdent,
        to: &TableIdent,
        cancel: &CancelToken,
    ) -> Result<()> {
        validate_table_ident(from)?;
        validate_table_ident(to)?;
        cancel.check("rename_table")?;
        let _guard = self.lock.lock().await;
        let mut registry = self.load_registry().await?;
        if Self::table_record(&registry, from).is_none() {
            return Err(Error::no_such_table(from));
        }
        if !registry.namespaces.contains_key(&to.namespace().encode()) {
            return Err(Error::no_such_namespace(to.namespace()));
        }
        if Self::table_record(&registry, to).is_some() {
            return Err(Error::table_already_exists(to));
        }
        let record = registry
            .tables
            .get_mut(&from.namespace().encode())
            .and_then(|tables| tables.remove(from.name()))
            .expect("presence checked above");
        registry
            .tables
            .entry(to.namespace().encode())
            .or_default()
            .insert(to.name().to_string(), record);
        self.persist(&registry).await?;
        debug!(from = %from, to = %to, "renamed table");
        Ok(())
    }

    async fn list_tables(
        &self,
        namespace: &NamespaceIdent,
        cancel: &CancelToken,
    ) -> Result<Vec<TableIdent>> {
        validate_namespace(namespace)?;
        cancel.check("list_tables")?;
        let registry = self.load_registry().await?;
        if !registry.namespaces.contains_key(&namespace.encode()) {
            return Err(Error::no_such_namespace(namespace));
        }
        registry
            .tables
            .get(&namespace.encode())
            .map(|tables| {
                tables
                    .keys()
                    .map(|name| TableIdent::new(namespace.clone(), name.clone()))
                    .collect()
            })
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn table_exists(&self, identifier: &TableIdent, cancel: &CancelToken) -> Result<bool> {
        validate_table_ident(identifier)?;
        cancel.check("table_exists")?;
        let registry = self.load_registry().await?;
        Ok(Self::table_record(&registry, identifier).is_some())
    }
}
