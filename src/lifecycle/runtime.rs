use super::config::RuntimeConfig;
use crate::actor::ActorManager;
use crate::error::Result;
use crate::model::loader::load_behaviors_from_dir;
use crate::provider::{BehaviorStore, InMemoryBehaviorStore, ThingStore};
use crate::resource::{Registry, RegistryAction};
use crate::syscall::{SyncReport, System};
use std::sync::Arc;
use tracing::{debug, error, info};

/// The orchestrator that wires the actor core, the registry and the syscall layer.
///
/// `Runtime` is responsible for:
/// - **Actor materialization**: one actor per behavior from the behavior store
/// - **Resource sync**: every thing and every actor registered as a resource
/// - **Heartbeat**: started at the configured interval
/// - **Teardown**: stopping every actor and reporting all failures together
///
/// # Example
///
/// ```ignore
/// let runtime = Runtime::start(config, behaviors, things).await?;
///
/// let ctx = runtime.system.create_context("alice", "s1", Params::new());
/// let rd = runtime.system.open("/things/machine/p1", OpenMode::INVOKE, &ctx)?;
/// let result = runtime.system.invoke(rd, "purify_air", params).await?;
///
/// runtime.shutdown().await?;
/// ```
pub struct Runtime {
    /// Entry point for callers.
    pub system: Arc<System>,
    pub manager: Arc<ActorManager>,
    pub registry: Arc<Registry>,
    config: RuntimeConfig,
    sync: SyncReport,
}

impl Runtime {
    /// Builds and starts every component.
    ///
    /// Individual behaviors or resources that fail to load are logged and
    /// skipped; a failing store aborts startup.
    pub async fn start(
        config: RuntimeConfig,
        behaviors: Arc<dyn BehaviorStore>,
        things: Arc<dyn ThingStore>,
    ) -> Result<Self> {
        info!("Starting runtime...");

        // =====================================================================
        // 1. Actors, one per behavior
        // =====================================================================

        let manager = Arc::new(
            ActorManager::new(config.actor.to_actor_options()).with_store(behaviors.clone()),
        );
        let created = manager.register_behaviors(behaviors.as_ref()).await?;

        // =====================================================================
        // 2. Registry and syscall layer
        // =====================================================================

        let registry = Arc::new(Registry::new());
        registry.watch(|event| match event.action {
            RegistryAction::Register => {
                debug!(path = %event.resource.path(), "Resource registered")
            }
            RegistryAction::Unregister => {
                debug!(path = %event.resource.path(), "Resource unregistered")
            }
        });

        let system = Arc::new(
            System::new(registry.clone(), manager.clone())
                .with_things(things)
                .with_options(config.syscall.to_system_options()),
        );
        let sync = system.sync_resources().await?;

        // =====================================================================
        // 3. Heartbeat
        // =====================================================================

        manager.start_heartbeat(config.actor.heartbeat_interval())?;

        info!(
            actors = created,
            resources = registry.count(),
            "Runtime started"
        );
        Ok(Self {
            system,
            manager,
            registry,
            config,
            sync,
        })
    }

    /// Reads behaviors from `config.behaviors_dir`, or returns an empty store if unset.
    pub fn load_behaviors(config: &RuntimeConfig) -> Result<InMemoryBehaviorStore> {
        let behaviors = match &config.behaviors_dir {
            Some(dir) => load_behaviors_from_dir(dir)?,
            None => Vec::new(),
        };
        Ok(InMemoryBehaviorStore::new(behaviors))
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Outcome of the resource sync performed at startup.
    pub fn sync_report(&self) -> SyncReport {
        self.sync
    }

    /// Stops the heartbeat and every actor. Every actor is attempted even if
    /// some fail; the failures come back together.
    pub async fn shutdown(self) -> Result<()> {
        info!("Shutting down runtime...");
        let open = self.system.handle_count();
        if open > 0 {
            debug!(open, "Descriptors still open at shutdown");
        }

        match self.manager.shutdown().await {
            Ok(()) => {
                info!("Runtime shutdown complete.");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Runtime shutdown incomplete");
                Err(e)
            }
        }
    }
}
