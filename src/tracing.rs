//! Provide tracing, tailored to this program.
//!
//! The binary should call [`init`] once at startup to install a subscriber.
//! Library code uses `crate::tracing::prelude::*` for convenient access to
//! the `trace!()` through `error!()` macros.

use tracing_subscriber::{
    filter::{EnvFilter, LevelFilter},
    prelude::*,
};

pub mod prelude {
    #[allow(unused_imports)]
    pub use tracing::{debug, error, info, trace, warn};
}

/// Install a stdout subscriber.
///
/// Filters according to `RUST_LOG`, overriding the default level to INFO.
pub fn init() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .with_env_var("RUST_LOG")
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}
