use std::sync::{Arc, OnceLock};

use anyhow::anyhow;

use crate::{
    coordinator::Coordinator, prelude::*, service::LocationService, settings::LocatorSettings,
};

/// The process-wide coordinator type, backed by any platform
pub type SharedCoordinator = Arc<Coordinator<Arc<dyn LocationService>>>;

static SHARED: OnceLock<SharedCoordinator> = OnceLock::new();

/// Create the process-wide coordinator. Can only be done once per process.
pub fn install_shared(
    service: Arc<dyn LocationService>,
    settings: LocatorSettings,
) -> Result<SharedCoordinator> {
    let coordinator = Arc::new(Coordinator::new(service, settings));
    SHARED
        .set(coordinator.clone())
        .map_err(|_| anyhow!("A shared coordinator has already been installed"))?;
    Ok(coordinator)
}

/// Get the process-wide coordinator, if one was installed with [install_shared]
pub fn shared() -> Option<SharedCoordinator> {
    SHARED.get().cloned()
}
