use serde::Deserialize;
use std::path::Path;
use std::time::{Duration, Instant};
use strand_ipc::{BackendConfig, Subscriber};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Deserialize, Debug)]
struct GaugeConfig {
    #[serde(default = "defaults::channel")]
    channel: String,
    #[serde(default = "defaults::segment_size")]
    segment_size: u32,
    #[serde(default)]
    conflate: bool,
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
}

impl GaugeConfig {
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
        Some(path) => GaugeConfig::load(path)?,
        None => GaugeConfig::defaults(),
    };

    let backend = BackendConfig::from_env();
    let mut subscriber = Subscriber::with_segment_size(
        &backend,
        &cfg.channel,
        cfg.segment_size,
        cfg.conflate,
    )?;

    info!(
        "GAUGE: listening on {channel} (conflate={conflate})",
        channel = cfg.channel,
        conflate = cfg.conflate,
    );

    let mut received: u64 = 0;
    let mut last_seq: Option<u64> = None;
    let mut gaps: u64 = 0;
    let mut window_start = Instant::now();
    let mut window_count: u64 = 0;

    loop {
        if let Some(msg) = subscriber.recv()? {
            received += 1;
            window_count += 1;

            if msg.len() >= 8 {
                let seq = u64::from_le_bytes(msg.data()[..8].try_into().unwrap());
                if let Some(prev) = last_seq {
                    if seq != prev + 1 {
                        gaps += 1;
                    }
                }
                last_seq = Some(seq);
            }
        }

        if window_start.elapsed() >= Duration::from_secs(5) {
            let overruns = subscriber.overruns();
            info!(
                "received {received} total ({:.0} msg/s), last seq {last_seq:?}",
                window_count as f64 / window_start.elapsed().as_secs_f64(),
            );
            if overruns > 0 || gaps > 0 {
                warn!("lossy stream: {overruns} overruns, {gaps} sequence gaps");
            }
            window_start = Instant::now();
            window_count = 0;
        }
    }
}
