//! # Engine
//!
//! [`Engine`] is the thin façade applications open against: it owns the
//! shared [`Store`] handle and [`GaugedConfig`], performs the one-time schema
//! check at startup, and hands out [`Writer`]/[`Context`] instances that all
//! share the same store and config.
//!
//! ## Schema bootstrap
//!
//! A fresh store has no `current_version` metadata row. [`Engine::sync`]
//! creates the schema (idempotent — safe to call against an already
//! bootstrapped store) and writes the well-known metadata keys:
//! `current_version`, `initial_version`, `block_size`, `resolution`,
//! `created_at`. [`Engine::open`] then requires that row to exist —
//! a store nobody has ever synced fails fast with [`EngineError::SchemaMissing`]
//! rather than quietly operating against an uninitialized schema.
//!
//! ## Version and grid mismatches
//!
//! If the store's `current_version` doesn't match [`CURRENT_VERSION`],
//! `open` fails with [`EngineError::VersionMismatch`] — the on-disk format is
//! assumed to change across versions, so silently proceeding would risk
//! misreading existing blocks. `block_size`/`resolution` drift is treated as
//! a softer problem: the time grid recorded at sync time no longer matches
//! this build's configuration, which would corrupt every `(block, slot)`
//! decomposition, but an operator may be migrating deliberately, so it's
//! logged rather than fatal.
use std::sync::Arc;

use thiserror::Error;

use crate::config::GaugedConfig;
use crate::context::{Context, QueryParams};
use crate::error::{GaugedError, Result};
use crate::store::Store;
use crate::time::now_millis;
use crate::writer::Writer;

/// Current on-disk schema version this build writes and expects.
pub const CURRENT_VERSION: &str = "1";

const KEY_CURRENT_VERSION: &str = "current_version";
const KEY_INITIAL_VERSION: &str = "initial_version";
const KEY_BLOCK_SIZE: &str = "block_size";
const KEY_RESOLUTION: &str = "resolution";
const KEY_CREATED_AT: &str = "created_at";

/// Errors specific to engine bootstrap, layered for callers that want to
/// distinguish "never synced" from "synced under a different version" from
/// a generic store failure without matching on [`GaugedError`] directly.
#[derive(Debug, Error)]
pub enum EngineError {
    /// No `current_version` metadata row; `Engine::sync` was never run.
    #[error("schema not found, call Engine::sync() first")]
    SchemaMissing,

    /// The store was synced under a different schema version.
    #[error("schema version mismatch: store has {found:?}, engine expects {expected:?}")]
    VersionMismatch { found: String, expected: String },

    /// A failure surfaced by the underlying store or config validation.
    #[error(transparent)]
    Gauged(#[from] GaugedError),
}

/// Application-facing entry point: one `Engine` per `Store`, shared by every
/// `Writer`/`Context` it creates.
pub struct Engine {
    store: Arc<dyn Store>,
    config: GaugedConfig,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine").field("config", &self.config).finish()
    }
}

impl Engine {
    /// Opens an engine against an already-synced store, checking the schema
    /// version and warning on time-grid drift.
    pub fn open(store: Arc<dyn Store>, config: GaugedConfig) -> std::result::Result<Self, EngineError> {
        config.validate()?;
        let engine = Self { store, config };
        engine.check_schema()?;
        Ok(engine)
    }

    fn check_schema(&self) -> std::result::Result<(), EngineError> {
        let found = self
            .store
            .get_metadata(KEY_CURRENT_VERSION)?
            .ok_or(EngineError::SchemaMissing)?;
        if found != CURRENT_VERSION {
            return Err(EngineError::VersionMismatch {
                found,
                expected: CURRENT_VERSION.to_string(),
            });
        }

        if let Some(stored) = self.store.get_metadata(KEY_BLOCK_SIZE)? {
            if stored.parse::<u64>().ok() != Some(self.config.block_size) {
                tracing::warn!(
                    stored,
                    configured = self.config.block_size,
                    "block_size does not match the value recorded at sync time"
                );
            }
        }
        if let Some(stored) = self.store.get_metadata(KEY_RESOLUTION)? {
            if stored.parse::<u64>().ok() != Some(self.config.resolution) {
                tracing::warn!(
                    stored,
                    configured = self.config.resolution,
                    "resolution does not match the value recorded at sync time"
                );
            }
        }
        Ok(())
    }

    /// One-time schema bootstrap. Idempotent: calling this against an
    /// already-synced store leaves its `current_version`/`initial_version`/
    /// `created_at` rows untouched.
    pub fn sync(store: &Arc<dyn Store>, config: &GaugedConfig) -> Result<()> {
        store.create_schema()?;
        if store.get_metadata(KEY_CURRENT_VERSION)?.is_none() {
            store.set_metadata(
                &[
                    (KEY_CURRENT_VERSION.to_string(), CURRENT_VERSION.to_string()),
                    (KEY_INITIAL_VERSION.to_string(), CURRENT_VERSION.to_string()),
                    (KEY_BLOCK_SIZE.to_string(), config.block_size.to_string()),
                    (KEY_RESOLUTION.to_string(), config.resolution.to_string()),
                    (KEY_CREATED_AT.to_string(), now_millis().to_string()),
                ],
                false,
            )?;
        }
        Ok(())
    }

    /// Rewrites `current_version`, e.g. after an out-of-band migration of
    /// existing blocks to a new wire format.
    pub fn migrate(&self, version: impl Into<String>) -> Result<()> {
        self.store
            .set_metadata(&[(KEY_CURRENT_VERSION.to_string(), version.into())], true)
    }

    /// Builds a [`Writer`] sharing this engine's store and config.
    pub fn writer(&self) -> Result<Writer> {
        Writer::new(self.store.clone(), self.config.clone())
    }

    /// Builds a [`Context`] sharing this engine's store and config.
    pub fn context(&self, params: QueryParams) -> Result<Context> {
        Context::new(self.store.clone(), self.config.clone(), params)
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn config(&self) -> &GaugedConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn config() -> GaugedConfig {
        GaugedConfig {
            block_size: crate::time::Time::HOUR,
            resolution: crate::time::Time::SECOND,
            ..GaugedConfig::default()
        }
    }

    #[test]
    fn open_fails_before_sync() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::default());
        let err = Engine::open(store, config()).unwrap_err();
        assert!(matches!(err, EngineError::SchemaMissing));
    }

    #[test]
    fn sync_then_open_succeeds() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::default());
        Engine::sync(&store, &config()).unwrap();
        Engine::open(store, config()).unwrap();
    }

    #[test]
    fn sync_is_idempotent() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::default());
        Engine::sync(&store, &config()).unwrap();
        let created_at_first = store.get_metadata("created_at").unwrap();
        Engine::sync(&store, &config()).unwrap();
        let created_at_second = store.get_metadata("created_at").unwrap();
        assert_eq!(created_at_first, created_at_second);
    }

    #[test]
    fn open_rejects_version_mismatch() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::default());
        Engine::sync(&store, &config()).unwrap();
        store
            .set_metadata(&[("current_version".to_string(), "99".to_string())], true)
            .unwrap();
        let err = Engine::open(store, config()).unwrap_err();
        assert!(matches!(err, EngineError::VersionMismatch { .. }));
    }

    #[test]
    fn migrate_rewrites_current_version() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::default());
        Engine::sync(&store, &config()).unwrap();
        let engine = Engine::open(store.clone(), config()).unwrap();
        engine.migrate("2").unwrap();
        assert_eq!(
            store.get_metadata("current_version").unwrap(),
            Some("2".to_string())
        );
    }

    #[test]
    fn open_warns_but_succeeds_on_grid_drift() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::default());
        Engine::sync(&store, &config()).unwrap();
        let drifted = GaugedConfig {
            resolution: crate::time::Time::MINUTE,
            ..config()
        };
        Engine::open(store, drifted).unwrap();
    }

    #[test]
    fn writer_and_context_share_the_synced_store() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::default());
        Engine::sync(&store, &config()).unwrap();
        let engine = Engine::open(store, config()).unwrap();

        let mut writer = engine.writer().unwrap();
        writer
            .add(
                crate::measurement::Measurements::single("cpu", 42.0),
                Some(0),
                None,
            )
            .unwrap();
        writer.release().unwrap();

        let ctx = engine
            .context(QueryParams {
                key: b"cpu".to_vec(),
                start: Some(0),
                end: Some(0),
                ..QueryParams::default()
            })
            .unwrap();
        assert_eq!(ctx.namespaces().unwrap(), vec![0]);
    }
}
