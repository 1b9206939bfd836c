//! The driver facade.
//!
//! A [`Driver`] is one process's view of a store. Per-kind models are built
//! lazily the first time a kind is used; building one creates the kind's
//! tables under the named lock `schema/<prefix>` and indexes the columns the
//! kind's usage counts rank highest.
//!
//! Several drivers may share one store. A kind dropped by a peer is noticed
//! when its tables turn out to be missing: the model is rebuilt and the
//! operation runs once more.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use slotdb_codec::{Map, Value};
use slotdb_storage::{Column, EntityRecord, KindTables, Query, StorageError, Store};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::attribute::{AttributeIndex, AttributeRegistry};
use crate::cache::KeyedLocks;
use crate::collection::{Collection, ListCondition, Meta, Page};
use crate::config::Config;
use crate::entity::{Entity, EntityId, EntityTable};
use crate::error::{CoreError, CoreResult};
use crate::events::CacheEvent;
use crate::filter::Translator;
use crate::lock::LockManager;
use crate::resource::{ResourceName, ResourceRegistry};
use crate::retry::with_retry;
use crate::usage::{UsageCounts, UsageKind, UsageTracker};

/// Everything the driver keeps for one kind.
#[derive(Debug)]
struct KindModel {
    attributes: AttributeRegistry,
    entities: EntityTable,
}

impl KindModel {
    /// The attribute map, reloaded when `records` use columns it lacks.
    async fn index_for<'a>(
        &self,
        records: impl IntoIterator<Item = &'a EntityRecord>,
    ) -> CoreResult<Arc<AttributeIndex>> {
        let index = self.attributes.all().await?;
        let covered = records.into_iter().all(|record| {
            (0..)
                .zip(&record.slots)
                .all(|(col, slot)| slot.is_none() || index.name_of(col).is_some())
        });
        if covered {
            return Ok(index);
        }
        debug!("reloading attributes of {}", self.entities.kind());
        self.attributes.reset();
        self.attributes.all().await
    }
}

/// Entry point for reading and writing entities.
#[derive(Debug)]
pub struct Driver {
    store: Arc<dyn Store>,
    config: Config,
    resources: Arc<ResourceRegistry>,
    locks: Arc<LockManager>,
    usage: Arc<UsageTracker>,
    models: Mutex<HashMap<String, Arc<KindModel>>>,
    creating: KeyedLocks<String>,
    updates: KeyedLocks<(String, String)>,
    events: broadcast::Sender<CacheEvent>,
    flusher: Mutex<Option<JoinHandle<()>>>,
}

impl Driver {
    /// Opens a driver over `store`, creating the shared tables if needed
    /// and starting the background usage flush.
    ///
    /// # Errors
    ///
    /// Returns an error if the shared tables cannot be created.
    pub async fn open(store: Arc<dyn Store>, config: Config) -> CoreResult<Self> {
        with_retry(&config.retry, || store.ensure_base_schema()).await?;

        let resources = Arc::new(ResourceRegistry::new(
            Arc::clone(&store),
            config.retry.clone(),
            config.resource_cache_capacity,
            config.resource_cache_ttl,
        ));
        let locks = Arc::new(LockManager::new(
            Arc::clone(&store),
            config.lock,
            config.retry.clone(),
        ));
        let usage = Arc::new(UsageTracker::new(
            Arc::clone(&store),
            Arc::clone(&resources),
            config.retry.clone(),
        ));
        let flusher = config
            .usage_flush_interval
            .map(|period| usage.spawn_flusher(period));
        let (events, _) = broadcast::channel(config.event_capacity.max(1));

        info!("driver opened");
        Ok(Self {
            store,
            config,
            resources,
            locks,
            usage,
            models: Mutex::new(HashMap::new()),
            creating: KeyedLocks::new(),
            updates: KeyedLocks::new(),
            events,
            flusher: Mutex::new(flusher),
        })
    }

    /// The configuration the driver was opened with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The store the driver works on.
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    fn cached_model(&self, kind: &str) -> Option<Arc<KindModel>> {
        self.models.lock().get(kind).map(Arc::clone)
    }

    async fn model(&self, kind: &str) -> CoreResult<Arc<KindModel>> {
        if let Some(model) = self.cached_model(kind) {
            return Ok(model);
        }
        let key = kind.to_string();
        let _creating = self.creating.lock(&key).await;
        if let Some(model) = self.cached_model(kind) {
            return Ok(model);
        }

        self.resources.of_name(kind).await?;
        let tables = KindTables::new(kind, self.config.column_count);
        let model = Arc::new(KindModel {
            attributes: AttributeRegistry::new(
                kind,
                tables.clone(),
                Arc::clone(&self.store),
                self.config.retry.clone(),
                Arc::clone(&self.locks),
                self.config.attribute_cache_ttl,
            ),
            entities: EntityTable::new(
                kind,
                tables.clone(),
                Arc::clone(&self.store),
                self.config.retry.clone(),
                self.config.value_base_length,
                self.config.entity_cache_capacity,
                self.config.entity_cache_ttl,
            ),
        });

        let lock_name = format!("schema/{}", tables.prefix());
        self.locks
            .lock_while(&lock_name, || async {
                with_retry(&self.config.retry, || self.store.ensure_kind_schema(&tables)).await?;
                let index = model.attributes.all().await?;
                let top = self
                    .usage
                    .top_columns(kind, self.config.index_top_k)
                    .await
                    .unwrap_or_else(|e| {
                        warn!("no usage counts for {}: {}", kind, e);
                        Vec::new()
                    });
                let mut columns: Vec<Column> = top
                    .iter()
                    .filter_map(|name| index.col_of(name))
                    .map(Column::Slot)
                    .collect();
                columns.push(Column::UpdatedAt);
                with_retry(&self.config.retry, || {
                    self.store.ensure_indexes(&tables, &columns)
                })
                .await
            })
            .await?;

        debug!("built model of {} on {}", kind, tables.prefix());
        self.models.lock().insert(key, Arc::clone(&model));
        Ok(model)
    }

    fn evict(&self, kind: &str) {
        self.models.lock().remove(kind);
        self.resources.clear_cache_for_name(kind);
    }

    /// Runs `op` on the model of `kind`, rebuilding the model once if its
    /// tables are gone.
    async fn run<T, F, Fut>(&self, kind: &str, op: F) -> CoreResult<T>
    where
        F: Fn(Arc<KindModel>) -> Fut,
        Fut: Future<Output = CoreResult<T>>,
    {
        let model = self.model(kind).await?;
        match op(model).await {
            Err(CoreError::Storage(StorageError::MissingTable(table))) => {
                debug!("{} is gone, rebuilding the model of {}", table, kind);
                self.evict(kind);
                let model = self.model(kind).await?;
                op(model).await
            }
            other => other,
        }
    }

    fn publish(&self, event: CacheEvent) {
        // an error only means nobody is subscribed
        let _ = self.events.send(event);
    }

    /// The entity `id` of `kind`, if it exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn one(&self, kind: &str, id: &str) -> CoreResult<Option<Entity>> {
        self.run(kind, move |model| async move {
            let Some(row) = model.entities.for_one(id).await? else {
                return Ok(None);
            };
            let index = model.index_for([&row.record]).await?;
            Ok(Some(model.entities.project(&row, &index)))
        })
        .await
    }

    /// A page of the entities of `kind` matching `condition`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArgument`] for an empty page, or an
    /// error if an operand cannot be serialized or the store fails.
    pub async fn list(&self, kind: &str, condition: &ListCondition) -> CoreResult<Collection> {
        let page = condition
            .page
            .unwrap_or(Page::new(1, self.config.default_page_size));
        let (offset, limit) = page.window()?;

        self.run(kind, move |model| async move {
            let policy = self.config.unknown_fields;
            let base_length = self.config.value_base_length;
            let index = model.attributes.all().await?;
            let translated =
                Translator::new(&index, policy, base_length).parse_filter(&condition.filter)?;
            let (index, translated) = if translated.unknown_names.is_empty() {
                (index, translated)
            } else {
                // the names may have been assigned since the snapshot
                model.attributes.reset();
                let index = model.attributes.all().await?;
                let translated =
                    Translator::new(&index, policy, base_length).parse_filter(&condition.filter)?;
                (index, translated)
            };
            let sort = Translator::new(&index, policy, base_length).parse_sort(&condition.sort);

            self.usage
                .push(kind, UsageKind::WhereCols, translated.where_cols);
            self.usage.push(kind, UsageKind::OrderCols, sort.order_cols);
            self.usage
                .push(kind, UsageKind::Filter, translated.filter_names);

            let query = Query {
                predicate: translated.predicate,
                sort: sort.keys,
                limit: Some(limit),
                offset,
            };
            let (rows, total) = model.entities.for_list(&query).await?;
            let index = model.index_for(rows.iter().map(|row| &row.record)).await?;
            let entities: Vec<Entity> = rows
                .iter()
                .map(|row| model.entities.project(row, &index))
                .collect();
            Ok(Collection {
                meta: Meta {
                    offset,
                    limit,
                    total,
                    length: entities.len() as u64,
                },
                entities,
            })
        })
        .await
    }

    /// Creates an entity of `kind`. Its id is `attributes["id"]` when
    /// given, otherwise a new one.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArgument`] if `attributes` is not a map,
    /// [`CoreError::EntityExists`] if the id is taken, or a column
    /// assignment or store error.
    pub async fn create(&self, kind: &str, attributes: &Value) -> CoreResult<Entity> {
        let values = as_map(attributes)?;
        let id = values
            .get("id")
            .and_then(EntityId::from_value)
            .unwrap_or_default();
        let cid = id.as_str();

        let entity = self
            .run(kind, move |model| async move {
                let cols = model.attributes.cols_for(values).await?;
                let staged = model.entities.values_with_cols(&cols)?;
                model.entities.create(cid, staged).await?;
                Self::reread(&model, cid).await
            })
            .await?;
        self.publish(CacheEvent::invalidate(kind, cid));
        Ok(entity)
    }

    /// Writes `attributes` into the entity `id` of `kind`. Attributes not
    /// named are kept; nested values replace what was stored under the
    /// same top-level name.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArgument`] if `attributes` is not a map,
    /// [`CoreError::EntityNotFound`] if the entity does not exist, or a
    /// column assignment or store error.
    pub async fn update(&self, kind: &str, id: &str, attributes: &Value) -> CoreResult<Entity> {
        let values = as_map(attributes)?;
        let _serial = if self.config.serialize_updates {
            Some(self.updates.lock(&(kind.to_string(), id.to_string())).await)
        } else {
            None
        };

        let entity = self
            .run(kind, move |model| async move {
                model.entities.invalidate(id);
                let Some(row) = model.entities.for_one(id).await? else {
                    return Err(CoreError::entity_not_found(kind, id));
                };
                let cols = model.attributes.cols_for(values).await?;
                let index = model.index_for([&row.record]).await?;
                let mut staged = model.entities.values_with_cols(&cols)?;
                staged.merge(EntityTable::stale_writes(&row, &cols, &index));
                model.entities.update(&row, staged).await?;
                Self::reread(&model, id).await
            })
            .await?;
        self.publish(CacheEvent::invalidate(kind, id));
        Ok(entity)
    }

    async fn reread(model: &KindModel, cid: &str) -> CoreResult<Entity> {
        let Some(row) = model.entities.for_one(cid).await? else {
            return Err(CoreError::entity_not_found(model.entities.kind(), cid));
        };
        let index = model.index_for([&row.record]).await?;
        Ok(model.entities.project(&row, &index))
    }

    /// Deletes the entity `id` of `kind`. Returns the number of entities
    /// removed, 0 or 1.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn destroy(&self, kind: &str, id: &str) -> CoreResult<u64> {
        let removed = self
            .run(kind, move |model| async move { model.entities.destroy(id).await })
            .await?;
        if removed > 0 {
            self.publish(CacheEvent::invalidate(kind, id));
        }
        Ok(removed)
    }

    /// Deletes `kind` entirely: rows, overflow records, attribute map,
    /// usage counts and the resource itself. Unknown kinds are left alone.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails or the schema lock cannot be
    /// taken.
    pub async fn drop(&self, kind: &str) -> CoreResult<()> {
        self.resources.clear_cache_for_name(kind);
        let Some(resource) = self.resources.find(kind).await? else {
            debug!("drop of unknown kind {}", kind);
            return Ok(());
        };
        let tables = KindTables::new(kind, self.config.column_count);
        let lock_name = format!("schema/{}", tables.prefix());

        let ids = self
            .locks
            .lock_while(&lock_name, || async {
                let everything = Query::default();
                let selected = with_retry(&self.config.retry, || {
                    self.store.select_entities(&tables, &everything)
                })
                .await;
                let ids: Vec<String> = match selected {
                    Ok(records) => records.into_iter().map(|r| r.cid).collect(),
                    Err(CoreError::Storage(StorageError::MissingTable(_))) => Vec::new(),
                    Err(e) => return Err(e),
                };
                with_retry(&self.config.retry, || self.store.drop_kind_schema(&tables)).await?;
                self.usage.clear(&resource).await?;
                self.resources.delete(&resource).await?;
                Ok(ids)
            })
            .await?;

        if let Some(model) = self.cached_model(kind) {
            model.entities.invalidate_all();
            model.attributes.reset();
        }
        self.evict(kind);
        info!("dropped {} ({} entities)", kind, ids.len());
        self.publish(CacheEvent::invalidate_bulk(kind, ids));
        Ok(())
    }

    /// Every stored kind, split into name and domain.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn resources(&self) -> CoreResult<Vec<ResourceName>> {
        Ok(self
            .resources
            .all()
            .await?
            .iter()
            .map(|record| ResourceName::parse(&record.name))
            .collect())
    }

    /// Receives the invalidation events of this driver's mutations.
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    /// Applies an invalidation event from a peer.
    pub fn handle_event(&self, event: &CacheEvent) {
        let Some(model) = self.cached_model(event.resource()) else {
            return;
        };
        for id in event.ids() {
            model.entities.invalidate(id);
        }
        debug!("invalidated {} entities of {}", event.ids().len(), event.resource());
    }

    /// Usage counts of `kind`, including pushes not yet flushed.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn usage(&self, kind: &str) -> CoreResult<UsageCounts> {
        self.usage.flush().await;
        self.usage.counts_of(kind).await
    }

    /// Releases every named lock of the store. Returns the number released.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn unlock_all(&self) -> CoreResult<u64> {
        self.locks.unlock_all().await
    }

    /// Flushes usage counts, stops the background flush and closes the
    /// store.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be closed.
    pub async fn close(&self) -> CoreResult<()> {
        self.usage.flush().await;
        if let Some(flusher) = self.flusher.lock().take() {
            flusher.abort();
        }
        self.models.lock().clear();
        self.store.close().await?;
        info!("driver closed");
        Ok(())
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        if let Some(flusher) = self.flusher.get_mut().take() {
            flusher.abort();
        }
    }
}

fn as_map(attributes: &Value) -> CoreResult<&Map> {
    attributes.as_map().ok_or_else(|| {
        CoreError::invalid_argument(format!(
            "attributes must be a map, got {}",
            attributes.type_name()
        ))
    })
}
