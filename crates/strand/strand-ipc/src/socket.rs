//! Publisher, subscriber and poller handles over the shared-memory
//! transport.
//!
//! Backend selection happens once at construction from a [`BackendConfig`]:
//! plain shared memory, or shared memory behind the fake gate. The network
//! backend is an external collaborator; requesting it here is an argument
//! error.

use crate::config::BackendConfig;
use crate::error::{IpcError, Result};
use crate::gate::FakeGate;
use std::time::{Duration, Instant};
use strand_ring::{Channel, Message, ReadyProbe, DEFAULT_SEGMENT_SIZE, DEFAULT_TIMEOUT_MS};

/// Maximum number of subscribers one poller may watch.
pub const MAX_POLLERS: usize = 128;

/// Sleep slice between readiness sweeps in live polling.
const POLL_INTERVAL: Duration = Duration::from_micros(200);

fn check_endpoint(config: &BackendConfig, endpoint: &str) -> Result<()> {
    if endpoint.is_empty() {
        return Err(IpcError::InvalidArgument(
            "endpoint must not be empty".into(),
        ));
    }
    if config.use_network {
        return Err(IpcError::InvalidArgument(
            "network backend is not provided by the shared-memory facade".into(),
        ));
    }
    Ok(())
}

/// Writing side of one channel.
pub struct Publisher {
    channel: Channel,
}

impl Publisher {
    /// Create and connect a publisher on `endpoint` with the default
    /// segment size.
    pub fn create(config: &BackendConfig, endpoint: &str) -> Result<Self> {
        Self::with_segment_size(config, endpoint, DEFAULT_SEGMENT_SIZE)
    }

    pub fn with_segment_size(
        config: &BackendConfig,
        endpoint: &str,
        segment_size: u32,
    ) -> Result<Self> {
        check_endpoint(config, endpoint)?;
        let mut channel = Channel::open(endpoint, segment_size, config.prefix.as_deref())?;
        channel.init_publisher()?;
        Ok(Self { channel })
    }

    pub fn send(&mut self, payload: &[u8]) -> Result<()> {
        Ok(self.channel.send(payload)?)
    }

    pub fn send_message(&mut self, message: &Message) -> Result<()> {
        Ok(self.channel.send(message.data())?)
    }

    pub fn all_readers_updated(&self) -> bool {
        self.channel.all_readers_updated()
    }

    pub fn num_readers(&self) -> usize {
        self.channel.num_readers()
    }

    pub fn name(&self) -> &str {
        self.channel.name()
    }
}

/// Reading side of one channel, optionally behind the fake gate.
pub struct Subscriber {
    channel: Channel,
    gate: Option<FakeGate>,
    timeout_ms: i64,
}

impl Subscriber {
    /// Create and connect a subscriber on `endpoint`. With fake mode
    /// enabled in `config`, the subscriber attaches to the driver's event
    /// pair and every receive rendezvouses with it.
    pub fn create(config: &BackendConfig, endpoint: &str, conflate: bool) -> Result<Self> {
        Self::with_segment_size(config, endpoint, DEFAULT_SEGMENT_SIZE, conflate)
    }

    pub fn with_segment_size(
        config: &BackendConfig,
        endpoint: &str,
        segment_size: u32,
        conflate: bool,
    ) -> Result<Self> {
        check_endpoint(config, endpoint)?;
        let mut channel = Channel::open(endpoint, segment_size, config.prefix.as_deref())?;
        channel.init_subscriber(conflate)?;

        let gate = if config.use_fake {
            Some(FakeGate::attach(
                config.prefix.as_deref(),
                config.fake_prefix.as_deref(),
                endpoint,
            )?)
        } else {
            None
        };

        Ok(Self {
            channel,
            gate,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        })
    }

    /// Sticky receive timeout in milliseconds; negative waits forever.
    pub fn set_timeout(&mut self, timeout_ms: i64) {
        self.timeout_ms = timeout_ms;
    }

    /// Receive the next message, honoring the configured timeout. An
    /// elapsed timeout is `Ok(None)`, never an error.
    pub fn recv(&mut self) -> Result<Option<Message>> {
        self.recv_timeout(self.timeout_ms)
    }

    pub fn recv_timeout(&mut self, timeout_ms: i64) -> Result<Option<Message>> {
        if let Some(gate) = &self.gate {
            gate.before_recv()?;
        }
        Ok(self.channel.recv(timeout_ms)?)
    }

    pub fn msg_ready(&self) -> bool {
        self.channel.msg_ready()
    }

    pub fn overruns(&self) -> u64 {
        self.channel.overruns()
    }

    pub fn name(&self) -> &str {
        self.channel.name()
    }

    pub(crate) fn probe(&self) -> Result<ReadyProbe> {
        Ok(self.channel.probe()?)
    }
}

/// Readiness multiplexer over registered subscribers.
///
/// `poll` returns indices in registration order. In fake mode the full
/// registered set is reported ready immediately: the driver decides the
/// schedule, not data arrival. In live mode readiness is swept periodically;
/// spurious readiness is possible and a subsequent `recv` simply returns
/// `None`.
pub struct Poller {
    probes: Vec<ReadyProbe>,
    fake: bool,
}

impl Poller {
    pub fn new(config: &BackendConfig) -> Self {
        Self {
            probes: Vec::new(),
            fake: config.use_fake,
        }
    }

    /// Build a poller with `subscribers` already registered.
    pub fn with_subscribers(config: &BackendConfig, subscribers: &[&Subscriber]) -> Result<Self> {
        let mut poller = Self::new(config);
        for subscriber in subscribers {
            poller.register(subscriber)?;
        }
        Ok(poller)
    }

    pub fn register(&mut self, subscriber: &Subscriber) -> Result<()> {
        if self.probes.len() >= MAX_POLLERS {
            return Err(IpcError::InvalidArgument(format!(
                "cannot watch more than {MAX_POLLERS} subscribers"
            )));
        }
        self.probes.push(subscriber.probe()?);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.probes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probes.is_empty()
    }

    /// Wait up to `timeout_ms` for at least one registered subscriber to
    /// have a message. Negative waits forever.
    pub fn poll(&self, timeout_ms: i64) -> Result<Vec<usize>> {
        if self.fake {
            return Ok((0..self.probes.len()).collect());
        }
        if self.probes.is_empty() {
            return Ok(Vec::new());
        }

        let deadline = if timeout_ms >= 0 {
            Some(Instant::now() + Duration::from_millis(timeout_ms as u64))
        } else {
            None
        };

        loop {
            let ready: Vec<usize> = self
                .probes
                .iter()
                .enumerate()
                .filter(|(_, probe)| probe.msg_ready())
                .map(|(i, _)| i)
                .collect();
            if !ready.is_empty() {
                return Ok(ready);
            }

            match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(IpcError::Timeout);
                    }
                    std::thread::sleep(POLL_INTERVAL.min(deadline - now));
                }
                None => std::thread::sleep(POLL_INTERVAL),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique_endpoint(label: &str) -> String {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        format!("strand_ipc_{label}_{}_{n}", std::process::id())
    }

    fn cleanup(endpoint: &str) {
        let _ = Channel::unlink(endpoint, None);
    }

    #[test]
    fn publish_subscribe_through_facade() {
        let endpoint = unique_endpoint("pubsub");
        let config = BackendConfig::shared_memory();

        let mut publisher =
            Publisher::with_segment_size(&config, &endpoint, 4096).unwrap();
        let mut subscriber =
            Subscriber::with_segment_size(&config, &endpoint, 4096, false).unwrap();
        subscriber.set_timeout(0);

        publisher.send(b"hello").unwrap();
        let msg = subscriber.recv().unwrap().expect("message available");
        assert_eq!(msg.data(), b"hello");
        assert!(publisher.all_readers_updated());
        assert_eq!(publisher.num_readers(), 1);

        cleanup(&endpoint);
    }

    #[test]
    fn send_message_variant_round_trips() {
        let endpoint = unique_endpoint("sendmsg");
        let config = BackendConfig::shared_memory();

        let mut publisher =
            Publisher::with_segment_size(&config, &endpoint, 4096).unwrap();
        let mut subscriber =
            Subscriber::with_segment_size(&config, &endpoint, 4096, false).unwrap();

        publisher
            .send_message(&Message::from(b"wrapped".to_vec()))
            .unwrap();
        assert_eq!(
            subscriber.recv_timeout(0).unwrap().unwrap().data(),
            b"wrapped"
        );

        cleanup(&endpoint);
    }

    #[test]
    fn empty_endpoint_is_rejected() {
        let config = BackendConfig::shared_memory();
        assert!(matches!(
            Publisher::create(&config, ""),
            Err(IpcError::InvalidArgument(_))
        ));
        assert!(matches!(
            Subscriber::create(&config, "", false),
            Err(IpcError::InvalidArgument(_))
        ));
    }

    #[test]
    fn network_backend_is_not_constructible_here() {
        let config = BackendConfig {
            use_network: true,
            ..BackendConfig::default()
        };
        assert!(matches!(
            Publisher::create(&config, "x"),
            Err(IpcError::InvalidArgument(_))
        ));
    }

    #[test]
    fn poller_reports_only_ready_subscribers() {
        let endpoint_a = unique_endpoint("poll_a");
        let endpoint_b = unique_endpoint("poll_b");
        let config = BackendConfig::shared_memory();

        let mut pub_a = Publisher::with_segment_size(&config, &endpoint_a, 4096).unwrap();
        let _pub_b = Publisher::with_segment_size(&config, &endpoint_b, 4096).unwrap();
        let sub_a = Subscriber::with_segment_size(&config, &endpoint_a, 4096, false).unwrap();
        let sub_b = Subscriber::with_segment_size(&config, &endpoint_b, 4096, false).unwrap();

        let poller = Poller::with_subscribers(&config, &[&sub_a, &sub_b]).unwrap();

        pub_a.send(b"tick").unwrap();
        assert_eq!(poller.poll(1000).unwrap(), vec![0]);

        cleanup(&endpoint_a);
        cleanup(&endpoint_b);
    }

    #[test]
    fn poller_times_out_when_nothing_is_ready() {
        let endpoint = unique_endpoint("poll_idle");
        let config = BackendConfig::shared_memory();

        let _publisher = Publisher::with_segment_size(&config, &endpoint, 4096).unwrap();
        let subscriber =
            Subscriber::with_segment_size(&config, &endpoint, 4096, false).unwrap();
        let poller = Poller::with_subscribers(&config, &[&subscriber]).unwrap();

        assert!(matches!(poller.poll(20), Err(IpcError::Timeout)));

        cleanup(&endpoint);
    }

    #[test]
    fn fake_poller_returns_full_registered_set() {
        let endpoint = unique_endpoint("poll_fake");
        let config = BackendConfig::shared_memory();

        let _publisher = Publisher::with_segment_size(&config, &endpoint, 4096).unwrap();
        let subscriber =
            Subscriber::with_segment_size(&config, &endpoint, 4096, false).unwrap();

        let fake_config = BackendConfig {
            use_fake: true,
            ..BackendConfig::default()
        };
        let mut poller = Poller::new(&fake_config);
        poller.register(&subscriber).unwrap();

        // No message was published; the fake poller reports readiness
        // regardless.
        assert_eq!(poller.poll(0).unwrap(), vec![0]);

        cleanup(&endpoint);
    }
}
