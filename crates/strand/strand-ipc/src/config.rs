//! Backend selection, read from the environment exactly once.
//!
//! Construction-time configuration for the facade. The environment is only
//! consulted in [`BackendConfig::from_env`]; everything downstream receives
//! the resolved values explicitly.

use std::env;

/// Resolved backend configuration.
///
/// * `ZMQ=1` selects the network backend instead of shared memory.
/// * `OPENPILOT_PREFIX` namespaces segment and event-state files.
/// * `CEREAL_FAKE=1` enables the fake gate on subscribers.
/// * `CEREAL_FAKE_PREFIX` namespaces event-state files independently.
#[derive(Debug, Clone, Default)]
pub struct BackendConfig {
    pub use_network: bool,
    pub use_fake: bool,
    pub prefix: Option<String>,
    pub fake_prefix: Option<String>,
}

impl BackendConfig {
    /// Read the backend environment variables once.
    pub fn from_env() -> Self {
        let prefix = non_empty(env::var("OPENPILOT_PREFIX").ok());
        let use_network = env::var_os("ZMQ").is_some();
        if use_network && prefix.is_some() {
            tracing::warn!("OPENPILOT_PREFIX is not supported by the network backend");
        }

        Self {
            use_network,
            use_fake: env::var_os("CEREAL_FAKE").is_some(),
            prefix,
            fake_prefix: non_empty(env::var("CEREAL_FAKE_PREFIX").ok()),
        }
    }

    /// Plain shared-memory configuration, ignoring the environment.
    pub fn shared_memory() -> Self {
        Self::default()
    }
}

/// Turn fake mode on or off for processes spawned after this call. Test
/// harness helper; runtime configuration goes through [`BackendConfig`].
pub fn toggle_fake_events(enabled: bool) {
    if enabled {
        env::set_var("CEREAL_FAKE", "1");
    } else {
        env::remove_var("CEREAL_FAKE");
    }
}

/// Set or clear the fake event-state namespace for spawned processes.
pub fn set_fake_prefix(prefix: Option<&str>) {
    match prefix {
        Some(p) if !p.is_empty() => env::set_var("CEREAL_FAKE_PREFIX", p),
        _ => env::remove_var("CEREAL_FAKE_PREFIX"),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}
