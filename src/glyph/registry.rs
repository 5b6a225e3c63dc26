//! Bitmap sources for characters the font cannot draw.
//!
//! * [`GlyphRegistry`] — glyphs learned through recovery, persisted in the
//!   durable store so they survive across batches and processes.
//! * [`StaticGlyphTable`] — a read-only table shipped with the host.
//!
//! Both map a codepoint key (`0x1F980`) to base64-encoded PNG data.

use super::codepoint_key;
use crate::error::StoreError;
use crate::store::{get_json, put_json, DurableStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

/// Store key of the persisted registry.
pub const REGISTRY_KEY: &str = "glyphs/registry.json";

/// One learned glyph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlyphRegistryEntry {
    /// `0x<UPPERCASE HEX>`.
    pub codepoint: String,
    /// Base64-encoded PNG.
    pub bitmap_data: String,
    pub timestamp: DateTime<Utc>,
}

/// Learned glyphs keyed by codepoint; a later write for the same codepoint
/// replaces the earlier one.
#[derive(Debug, Clone, Default)]
pub struct GlyphRegistry {
    entries: BTreeMap<String, GlyphRegistryEntry>,
}

impl GlyphRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the registry from `store`; an absent key yields an empty registry.
    pub async fn load(store: &dyn DurableStore) -> Result<Self, StoreError> {
        let entries: Vec<GlyphRegistryEntry> =
            get_json(store, REGISTRY_KEY).await?.unwrap_or_default();
        let mut registry = Self::new();
        for entry in entries {
            registry.upsert(entry);
        }
        debug!(entries = registry.len(), "glyph registry loaded");
        Ok(registry)
    }

    /// Persist the whole registry.
    pub async fn save(&self, store: &dyn DurableStore) -> Result<(), StoreError> {
        let entries: Vec<&GlyphRegistryEntry> = self.entries.values().collect();
        put_json(store, REGISTRY_KEY, &entries).await
    }

    pub fn get(&self, ch: char) -> Option<&GlyphRegistryEntry> {
        self.entries.get(&codepoint_key(ch))
    }

    pub fn get_key(&self, key: &str) -> Option<&GlyphRegistryEntry> {
        self.entries.get(key)
    }

    /// Record a bitmap for `ch`, stamped now.
    pub fn insert(&mut self, ch: char, bitmap_data: String) {
        self.upsert(GlyphRegistryEntry {
            codepoint: codepoint_key(ch),
            bitmap_data,
            timestamp: Utc::now(),
        });
    }

    /// Insert unless an entry for the same codepoint is newer.
    pub fn upsert(&mut self, entry: GlyphRegistryEntry) {
        match self.entries.get(&entry.codepoint) {
            Some(existing) if existing.timestamp > entry.timestamp => {}
            _ => {
                self.entries.insert(entry.codepoint.clone(), entry);
            }
        }
    }

    pub fn remove(&mut self, ch: char) -> Option<GlyphRegistryEntry> {
        let removed = self.entries.remove(&codepoint_key(ch));
        if removed.is_some() {
            info!(codepoint = %codepoint_key(ch), "glyph removed from registry");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &GlyphRegistryEntry> {
        self.entries.values()
    }
}

/// Pre-shipped bitmaps, consulted after the learned registry.
#[derive(Debug, Clone, Default)]
pub struct StaticGlyphTable {
    bitmaps: HashMap<String, String>,
}

impl StaticGlyphTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON object of `{"0x2603": "<base64 png>", ...}`.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        Ok(Self {
            bitmaps: serde_json::from_str(json)?,
        })
    }

    pub fn insert(&mut self, ch: char, bitmap_data: impl Into<String>) {
        self.bitmaps.insert(codepoint_key(ch), bitmap_data.into());
    }

    pub fn get(&self, ch: char) -> Option<&str> {
        self.bitmaps.get(&codepoint_key(ch)).map(String::as_str)
    }

    pub fn get_key(&self, key: &str) -> Option<&str> {
        self.bitmaps.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.bitmaps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bitmaps.is_empty()
    }
}
