use serde::Deserialize;
use std::path::Path;
use std::time::{Duration, Instant};
use strand_ipc::{BackendConfig, Publisher};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Deserialize, Debug)]
struct PulseConfig {
    #[serde(default = "defaults::channel")]
    channel: String,
    #[serde(default = "defaults::segment_size")]
    segment_size: u32,
    #[serde(default = "defaults::rate_hz")]
    rate_hz: u32,
    #[serde(default = "defaults::payload_bytes")]
    payload_bytes: usize,
}

#[derive(Debug, thiserror::Error)]
enum ConfigError {
    #[error("failed to read '{path}'")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config")]
    Parse(#[from] toml::de::Error),
}

mod defaults {
    pub fn channel() -> String {
        "pulse".into()
    }

    pub fn segment_size() -> u32 {
        1 << 20
    }

    pub fn rate_hz() -> u32 {
        100
    }

    pub fn payload_bytes() -> usize {
        64
    }
}

impl PulseConfig {
    fn load(path: impl AsRef<Path> + ToString) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        Ok(toml::from_str(&raw)?)
    }

    fn defaults() -> Self {
        toml::from_str("").expect("defaults always deserialize")
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("INFO")),
        )
        .init();

    let cfg = match std::env::args().nth(1) {
        Some(path) => PulseConfig::load(path)?,
        None => PulseConfig::defaults(),
    };

    let backend = BackendConfig::from_env();
    let mut publisher =
        Publisher::with_segment_size(&backend, &cfg.channel, cfg.segment_size)?;

    info!(
        "PULSE: publishing {payload}B payloads to {channel} at {rate} Hz",
        payload = cfg.payload_bytes,
        channel = cfg.channel,
        rate = cfg.rate_hz,
    );

    let period = Duration::from_secs(1) / cfg.rate_hz.max(1);
    let mut payload = vec![0u8; cfg.payload_bytes.max(8)];
    let mut seq: u64 = 0;
    let mut window_start = Instant::now();
    let mut window_count: u64 = 0;

    loop {
        payload[..8].copy_from_slice(&seq.to_le_bytes());
        publisher.send(&payload)?;
        seq += 1;
        window_count += 1;

        if window_start.elapsed() >= Duration::from_secs(5) {
            info!(
                "sent {seq} total ({:.0} msg/s), {readers} readers, caught_up={caught_up}",
                window_count as f64 / window_start.elapsed().as_secs_f64(),
                readers = publisher.num_readers(),
                caught_up = publisher.all_readers_updated(),
            );
            window_start = Instant::now();
            window_count = 0;
        }

        std::thread::sleep(period);
    }
}
