//! Shared command context: store, engine components, audit trail.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::warn;

use gridcal_core::{
    AuditEntry, AvailabilityFinder, BatchDispatcher, ConflictResolver, RateLimiter,
    RecurrenceEngine, SheetReconciler, SharedStore, Store, Surface, shared,
};
use gridcal_provider_sheets::SheetsSurface;

use crate::config::{self, Config};

pub struct App {
    pub config: Config,
    pub store: SharedStore,
    pub engine: RecurrenceEngine,
    pub conflicts: ConflictResolver,
    pub availability: AvailabilityFinder,
    pub actor: String,
}

impl App {
    pub fn open() -> Result<Self> {
        let config = config::load()?;
        let db_path = config::database_path(&config)?;
        let store = shared(
            Store::open(&db_path)
                .with_context(|| format!("Failed to open database {}", db_path.display()))?,
        );

        Ok(App {
            engine: RecurrenceEngine::new(store.clone()),
            conflicts: ConflictResolver::new(store.clone()),
            availability: AvailabilityFinder::new(store.clone()),
            actor: std::env::var("USER").unwrap_or_else(|_| "local".to_string()),
            store,
            config,
        })
    }

    /// Build the reconciler stack, or fail when no surface is
    /// configured. One rate limiter instance gates everything.
    pub fn reconciler(&self) -> Result<SheetReconciler> {
        let sheets = self.config.sheets.clone().context(
            "No [sheets] section in the config.\n\
             Add spreadsheet_id, archive_spreadsheet_id and access_token to use the grid",
        )?;
        let surface: Arc<dyn Surface> = Arc::new(SheetsSurface::new(sheets)?);
        let limiter = Arc::new(RateLimiter::new(self.config.quota_per_minute));
        let dispatcher = Arc::new(BatchDispatcher::new(surface.clone(), limiter.clone()));
        Ok(
            SheetReconciler::new(self.store.clone(), surface, dispatcher, limiter)
                .with_template_page(&self.config.template_page),
        )
    }

    pub fn surface_configured(&self) -> bool {
        self.config.sheets.is_some()
    }

    /// Record an audit entry; failures are logged, never fatal.
    pub fn audit(&self, module: &str, action: &str, description: &str) {
        let entry = AuditEntry::new(module, action, description, &self.actor);
        let store = self.store.lock().expect("store lock poisoned");
        if let Err(e) = store.record_audit(&entry) {
            warn!(error = %e, "audit record failed");
        }
    }
}
