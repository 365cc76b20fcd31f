mod coordinator;
mod error;
mod location;
mod service;
mod settings;
mod shared;
#[cfg(test)]
mod tests;

pub use coordinator::Coordinator;
pub use error::{LocationError, LocationResult};
pub use location::{Coordinate, Fix, LocationComponent, UtcDT, format_coordinate};
pub use service::{FixSink, LocationService};
pub use settings::LocatorSettings;
pub use shared::{SharedCoordinator, install_shared, shared};

pub mod prelude {
    use anyhow::Error as AnyhowError;
    use std::result::Result as StdResult;
    pub type Result<T = (), E = AnyhowError> = StdResult<T, E>;
    pub use anyhow::Context;
}
