use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

pub mod blob;
pub mod io;
pub mod table;
pub mod tables;

pub use blob::{BlobStore, FsBlobStore};
pub use table::{JsonTable, TableConfig};
pub use tables::Tables;

/// Common lifecycle of every persisted table.
#[async_trait]
pub trait Table: Send + Sync {
    async fn initialize(&self) -> Result<()>;
    async fn finalize(&self) -> Result<()>;
    async fn sync_if_dirty(&self) -> Result<()>;
}

/// Sequentially initializes registered tables to keep startup deterministic.
pub struct StorageManager {
    tables: Vec<Arc<dyn Table>>,
}

impl StorageManager {
    pub fn new() -> Self {
        Self { tables: Vec::new() }
    }

    pub fn register<T>(&mut self, table: Arc<T>)
    where
        T: Table + 'static,
    {
        self.tables.push(table);
    }

    pub async fn initialize_all(&self) -> Result<()> {
        for table in &self.tables {
            table.initialize().await?;
        }
        Ok(())
    }

    pub async fn finalize_all(&self) -> Result<()> {
        for table in &self.tables {
            table.finalize().await?;
        }
        Ok(())
    }
}

impl Default for StorageManager {
    fn default() -> Self {
        Self::new()
    }
}
