//! Knowledge base cache
//!
//! Evaluations take an `Arc` to the current build and keep it for the whole
//! batch. A rebuild installs a new `Arc` in place of the old one, so an
//! in-flight evaluation finishes against the build it started with. Builds
//! for one key are serialized; readers never wait on a build.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error};

use core_kernel::{RuleSetId, TenantId};
use domain_rules::Rule;

use crate::compiler::{fingerprint, KnowledgeBase};
use crate::error::CompileError;

/// What a cached build covers: a tenant's full effective set or one rule set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub tenant_id: TenantId,
    pub rule_set: Option<RuleSetId>,
}

impl CacheKey {
    pub fn tenant(tenant_id: TenantId) -> Self {
        Self {
            tenant_id,
            rule_set: None,
        }
    }

    pub fn rule_set(tenant_id: TenantId, rule_set: RuleSetId) -> Self {
        Self {
            tenant_id,
            rule_set: Some(rule_set),
        }
    }
}

#[derive(Debug, Default)]
pub struct KnowledgeBaseCache {
    entries: RwLock<HashMap<CacheKey, Arc<KnowledgeBase>>>,
    build_locks: Mutex<HashMap<CacheKey, Arc<Mutex<()>>>>,
    builds: AtomicU64,
}

impl KnowledgeBaseCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached build for `key` if it was built from `rules`,
    /// otherwise builds and installs a new one.
    ///
    /// A failed build leaves the previous entry in place and returns the
    /// error; the caller never receives a partial knowledge base.
    pub async fn get_or_build(
        &self,
        key: CacheKey,
        rules: &[Rule],
    ) -> Result<Arc<KnowledgeBase>, CompileError> {
        let wanted = fingerprint(rules);
        if let Some(kb) = self.lookup(&key, &wanted).await {
            return Ok(kb);
        }

        let lock = self.build_lock(key).await;
        let _guard = lock.lock().await;

        // another task may have finished the same build while we waited
        if let Some(kb) = self.lookup(&key, &wanted).await {
            return Ok(kb);
        }

        let kb = match KnowledgeBase::build(key.tenant_id, rules) {
            Ok(kb) => Arc::new(kb),
            Err(err) => {
                error!(tenant_id = %key.tenant_id, error = %err, "Knowledge base build failed");
                return Err(err);
            }
        };
        self.builds.fetch_add(1, Ordering::Relaxed);
        debug!(
            tenant_id = %key.tenant_id,
            build_version = kb.build_version(),
            rules = kb.len(),
            "Installed knowledge base"
        );

        self.entries.write().await.insert(key, Arc::clone(&kb));
        Ok(kb)
    }

    /// The build currently installed for `key`, if any
    pub async fn current(&self, key: &CacheKey) -> Option<Arc<KnowledgeBase>> {
        self.entries.read().await.get(key).cloned()
    }

    /// Drops every build for a tenant; returns how many were removed
    pub async fn invalidate(&self, tenant_id: TenantId) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, _| key.tenant_id != tenant_id);
        let removed = before - entries.len();
        drop(entries);

        self.build_locks
            .lock()
            .await
            .retain(|key, lock| key.tenant_id != tenant_id || Arc::strong_count(lock) > 1);
        debug!(tenant_id = %tenant_id, removed, "Invalidated knowledge bases");
        removed
    }

    pub async fn invalidate_all(&self) {
        self.entries.write().await.clear();
        // keep locks an in-flight build still holds
        self.build_locks
            .lock()
            .await
            .retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    /// Number of builds performed since the cache was created
    pub fn build_count(&self) -> u64 {
        self.builds.load(Ordering::Relaxed)
    }

    async fn lookup(&self, key: &CacheKey, build_version: &str) -> Option<Arc<KnowledgeBase>> {
        self.entries
            .read()
            .await
            .get(key)
            .filter(|kb| kb.build_version() == build_version)
            .cloned()
    }

    async fn build_lock(&self, key: CacheKey) -> Arc<Mutex<()>> {
        let mut locks = self.build_locks.lock().await;
        Arc::clone(locks.entry(key).or_default())
    }
}
