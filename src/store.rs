use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::SiftError;
use crate::types::Item;

/// Durable item storage, injected by the surrounding system.
///
/// `load` returns the items it can find; a missing id is not an error
/// (the processor accounts for it), but a backend failure is and aborts
/// the current run.
#[async_trait]
pub trait ItemStore: Send + Sync {
    async fn load(&self, ids: &[String]) -> Result<Vec<Item>, SiftError>;
    async fn save(&self, item: &Item) -> Result<(), SiftError>;
}

/// In-memory `ItemStore` for embedding and tests.
#[derive(Default)]
pub struct MemoryItemStore {
    items: Mutex<HashMap<String, Item>>,
}

impl MemoryItemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, item: Item) {
        let mut items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        items.insert(item.id.clone(), item);
    }

    pub fn get(&self, id: &str) -> Option<Item> {
        let items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        items.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        let items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ItemStore for MemoryItemStore {
    async fn load(&self, ids: &[String]) -> Result<Vec<Item>, SiftError> {
        let items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        Ok(ids.iter().filter_map(|id| items.get(id).cloned()).collect())
    }

    async fn save(&self, item: &Item) -> Result<(), SiftError> {
        let mut items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        items.insert(item.id.clone(), item.clone());
        Ok(())
    }
}
