// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Per-client descriptor cache.
//!
//! Table and field descriptors are fetched on demand; with caching
//! enabled they are held per table name for a bounded TTL. Every DDL
//! write invalidates the touched table, and close drops the whole map;
//! nothing survives the client.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::model::Field;

/// Resolved metadata for one table.
#[derive(Debug, Clone)]
pub struct TableDescriptor {
    pub table_id: String,
    pub fields: Vec<Field>,
}

impl TableDescriptor {
    /// Find a field descriptor by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.field_name == name)
    }

    /// The primary field, when the table reports one.
    #[must_use]
    pub fn primary_field(&self) -> Option<&Field> {
        self.fields.iter().find(|f| f.is_primary)
    }
}

#[derive(Debug)]
struct CachedEntry {
    descriptor: Arc<TableDescriptor>,
    fetched_at: Instant,
}

/// TTL cache keyed by table name.
#[derive(Debug)]
pub struct DescriptorCache {
    enabled: bool,
    ttl: Duration,
    entries: DashMap<String, CachedEntry>,
}

impl DescriptorCache {
    #[must_use]
    pub fn new(enabled: bool, ttl: Duration) -> Self {
        Self {
            enabled,
            ttl,
            entries: DashMap::new(),
        }
    }

    /// A live entry for the table, if one exists.
    #[must_use]
    pub fn get(&self, table_name: &str) -> Option<Arc<TableDescriptor>> {
        if !self.enabled {
            return None;
        }
        let entry = self.entries.get(table_name)?;
        if entry.fetched_at.elapsed() > self.ttl {
            drop(entry);
            self.entries.remove(table_name);
            return None;
        }
        Some(entry.descriptor.clone())
    }

    /// Store a freshly fetched descriptor.
    pub fn put(&self, table_name: &str, descriptor: Arc<TableDescriptor>) {
        if !self.enabled {
            return;
        }
        self.entries.insert(
            table_name.to_string(),
            CachedEntry {
                descriptor,
                fetched_at: Instant::now(),
            },
        );
    }

    /// Drop one table's entry (DDL writes call this).
    pub fn invalidate(&self, table_name: &str) {
        self.entries.remove(table_name);
    }

    /// Drop everything (close calls this).
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Number of live entries. Stats use.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
