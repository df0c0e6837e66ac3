use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::io::{ensure_parent_dir, load_or_default, write_json_file};
use super::Table;

#[derive(Clone, Debug)]
pub struct TableConfig {
    pub working_dir: PathBuf,
    pub namespace: String,
}

/// A JSON-file-backed table of rows keyed by id. Rows live in memory behind
/// an `RwLock`; mutations flip a dirty flag and `sync_if_dirty` flushes the
/// whole table atomically. One stage's writes are flushed together at the
/// stage boundary, so the on-disk state reflects the furthest committed
/// stage.
pub struct JsonTable<T> {
    namespace: String,
    file_path: PathBuf,
    rows: Arc<RwLock<HashMap<Uuid, T>>>,
    dirty: AtomicBool,
}

impl<T> JsonTable<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync,
{
    pub fn new(config: TableConfig) -> Self {
        let TableConfig {
            working_dir,
            namespace,
        } = config;
        let file_path = working_dir.join(format!("table_{namespace}.json"));

        Self {
            namespace,
            file_path,
            rows: Arc::new(RwLock::new(HashMap::new())),
            dirty: AtomicBool::new(false),
        }
    }

    pub async fn load(&self) -> Result<()> {
        ensure_parent_dir(&self.file_path).await?;
        let rows: HashMap<Uuid, T> = load_or_default(&self.file_path).await?;
        *self.rows.write().await = rows;
        self.dirty.store(false, Ordering::SeqCst);
        Ok(())
    }

    pub async fn insert(&self, id: Uuid, row: T) {
        self.rows.write().await.insert(id, row);
        self.dirty.store(true, Ordering::SeqCst);
    }

    pub async fn get(&self, id: Uuid) -> Option<T> {
        self.rows.read().await.get(&id).cloned()
    }

    /// Mutate one row under the write lock. The closure sees the live row
    /// and its return value is handed back, which lets callers do
    /// check-and-set transitions race-free.
    pub async fn update<R>(&self, id: Uuid, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let mut guard = self.rows.write().await;
        let result = guard.get_mut(&id).map(f);
        if result.is_some() {
            self.dirty.store(true, Ordering::SeqCst);
        }
        result
    }

    pub async fn delete(&self, ids: &[Uuid]) {
        if ids.is_empty() {
            return;
        }
        let mut guard = self.rows.write().await;
        let mut removed_any = false;
        for id in ids {
            if guard.remove(id).is_some() {
                removed_any = true;
            }
        }
        if removed_any {
            self.dirty.store(true, Ordering::SeqCst);
        }
    }

    /// Remove every row matching the predicate, returning the removed rows.
    pub async fn delete_where(&self, pred: impl Fn(&Uuid, &T) -> bool) -> Vec<(Uuid, T)> {
        let mut guard = self.rows.write().await;
        let ids: Vec<Uuid> = guard
            .iter()
            .filter(|(id, row)| pred(id, row))
            .map(|(id, _)| *id)
            .collect();

        let mut removed = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(row) = guard.remove(&id) {
                removed.push((id, row));
            }
        }
        if !removed.is_empty() {
            self.dirty.store(true, Ordering::SeqCst);
        }
        removed
    }

    /// Apply a mutation to every row; rows for which the closure returns
    /// true count as changed.
    pub async fn update_where(&self, mut f: impl FnMut(&Uuid, &mut T) -> bool) -> usize {
        let mut guard = self.rows.write().await;
        let mut changed = 0;
        for (id, row) in guard.iter_mut() {
            if f(id, row) {
                changed += 1;
            }
        }
        if changed > 0 {
            self.dirty.store(true, Ordering::SeqCst);
        }
        changed
    }

    pub async fn all(&self) -> Vec<T> {
        self.rows.read().await.values().cloned().collect()
    }

    pub async fn filter(&self, pred: impl Fn(&T) -> bool) -> Vec<T> {
        self.rows
            .read()
            .await
            .values()
            .filter(|row| pred(row))
            .cloned()
            .collect()
    }

    pub async fn find(&self, pred: impl Fn(&T) -> bool) -> Option<T> {
        self.rows.read().await.values().find(|row| pred(row)).cloned()
    }

    pub async fn count(&self, pred: impl Fn(&T) -> bool) -> usize {
        self.rows.read().await.values().filter(|row| pred(row)).count()
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }
}

#[async_trait]
impl<T> Table for JsonTable<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync,
{
    async fn initialize(&self) -> Result<()> {
        self.load().await
    }

    async fn finalize(&self) -> Result<()> {
        self.sync_if_dirty().await
    }

    async fn sync_if_dirty(&self) -> Result<()> {
        if !self.dirty.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        let snapshot = {
            let guard = self.rows.read().await;
            guard.clone()
        };

        write_json_file(&self.file_path, &snapshot)
            .await
            .with_context(|| format!("failed to write table {}", self.namespace))?;
        Ok(())
    }
}
