// SPDX-FileCopyrightText: 2026 Netpulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory [`LeaseStore`] implementation.
//!
//! Keys live in a `DashMap` with lazy TTL expiry: an expired entry is
//! treated as absent by every read path and physically removed the next
//! time it is touched. Pub/sub channels are tokio broadcast senders
//! created on first subscribe.
//!
//! Single-key atomicity comes from the DashMap entry API, which holds the
//! shard lock across the read-check-write of `set_if_absent`.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::broadcast;

use netpulse_core::{LeaseStore, NetpulseError};

/// Broadcast buffer per channel; slow subscribers lag, publishers never block.
const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn new(value: &str, ttl: Duration) -> Self {
        Self {
            value: value.to_string(),
            expires_at: Instant::now() + ttl,
        }
    }

    fn expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Process-local lease store backed by DashMaps.
#[derive(Debug, Default)]
pub struct MemoryLeaseStore {
    entries: DashMap<String, Entry>,
    channels: DashMap<String, broadcast::Sender<String>>,
}

impl MemoryLeaseStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (unexpired) keys. Test/diagnostic helper.
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| !e.expired()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl LeaseStore for MemoryLeaseStore {
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, NetpulseError> {
        match self.entries.entry(key.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(mut occupied) => {
                if occupied.get().expired() {
                    occupied.insert(Entry::new(value, ttl));
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(Entry::new(value, ttl));
                Ok(true)
            }
        }
    }

    async fn get(&self, key: &str) -> Result<Option<String>, NetpulseError> {
        if let Some(entry) = self.entries.get(key) {
            if !entry.expired() {
                return Ok(Some(entry.value.clone()));
            }
        }
        // Drop the read guard before removing the expired entry.
        self.entries.remove_if(key, |_, entry| entry.expired());
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), NetpulseError> {
        self.entries.insert(key.to_string(), Entry::new(value, ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), NetpulseError> {
        self.entries.remove(key);
        Ok(())
    }

    async fn publish(&self, channel: &str, message: &str) -> Result<(), NetpulseError> {
        if let Some(sender) = self.channels.get(channel) {
            // A send error only means no subscriber is currently listening.
            let _ = sender.send(message.to_string());
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        channel: &str,
    ) -> Result<broadcast::Receiver<String>, NetpulseError> {
        let sender = self
            .channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        Ok(sender.subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_and_get_round_trips() {
        let store = MemoryLeaseStore::new();
        store
            .set("k1", "v1", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(store.get("k1").await.unwrap().as_deref(), Some("v1"));
    }

    #[tokio::test]
    async fn get_absent_key_returns_none() {
        let store = MemoryLeaseStore::new();
        assert!(store.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_entry_reads_as_absent() {
        let store = MemoryLeaseStore::new();
        store
            .set("short", "v", Duration::from_millis(20))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(store.get("short").await.unwrap().is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn set_if_absent_refuses_live_key() {
        let store = MemoryLeaseStore::new();
        assert!(store
            .set_if_absent("k", "first", Duration::from_secs(60))
            .await
            .unwrap());
        assert!(!store
            .set_if_absent("k", "second", Duration::from_secs(60))
            .await
            .unwrap());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn set_if_absent_replaces_expired_key() {
        let store = MemoryLeaseStore::new();
        store
            .set("k", "old", Duration::from_millis(10))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(store
            .set_if_absent("k", "new", Duration::from_secs(60))
            .await
            .unwrap());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn delete_removes_key() {
        let store = MemoryLeaseStore::new();
        store.set("k", "v", Duration::from_secs(60)).await.unwrap();
        store.delete("k").await.unwrap();
        assert!(store.get("k").await.unwrap().is_none());
        // Deleting an absent key is fine.
        store.delete("k").await.unwrap();
    }

    #[tokio::test]
    async fn publish_reaches_subscribers() {
        let store = MemoryLeaseStore::new();
        let mut rx = store.subscribe("customer:acme").await.unwrap();
        store
            .publish("customer:acme", r#"{"type":"device_status"}"#)
            .await
            .unwrap();
        assert_eq!(rx.recv().await.unwrap(), r#"{"type":"device_status"}"#);
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_ok() {
        let store = MemoryLeaseStore::new();
        store.publish("customer:nobody", "msg").await.unwrap();
    }

    #[tokio::test]
    async fn channels_are_isolated() {
        let store = MemoryLeaseStore::new();
        let mut acme = store.subscribe("customer:acme").await.unwrap();
        let mut globex = store.subscribe("customer:globex").await.unwrap();

        store.publish("customer:acme", "for-acme").await.unwrap();

        assert_eq!(acme.recv().await.unwrap(), "for-acme");
        assert!(matches!(
            globex.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }
}
