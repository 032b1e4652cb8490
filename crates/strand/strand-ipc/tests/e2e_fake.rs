//! Two-process test of the fake gate rendezvous.
//!
//! The orchestrator plays the driver: it creates the event pair, spawns a
//! subscriber child (which inherits the eventfds), and releases exactly one
//! receive after publishing a message. The child must observe the payload
//! and must not return from `recv` before the driver lets it.

use std::env;
use std::io::Write;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use strand_events::EventHandle;
use strand_ipc::{BackendConfig, Publisher, Subscriber};
use strand_ring::Channel;

macro_rules! log {
    ($($arg:tt)*) => {{
        let _ = writeln!(std::io::stderr(), $($arg)*);
        let _ = std::io::stderr().flush();
    }};
}

const ENV_ROLE: &str = "STRAND_FAKE_ROLE";
const ENV_CHANNEL: &str = "STRAND_FAKE_CHANNEL";

const ROLE_SUBSCRIBER: &str = "subscriber";

const SEGMENT_SIZE: u32 = 4096;

/// How long the driver stalls between observing `recv_called` and releasing
/// the subscriber. The child asserts its `recv` took at least most of this,
/// proving the gate actually blocked it.
const DRIVER_STALL: Duration = Duration::from_millis(300);

fn run_subscriber(channel: &str) {
    // CEREAL_FAKE and CEREAL_FAKE_PREFIX come from the orchestrator.
    let config = BackendConfig::from_env();
    assert!(config.use_fake, "subscriber expected fake mode");

    let mut subscriber = Subscriber::with_segment_size(&config, channel, SEGMENT_SIZE, false)
        .expect("subscriber: connect");
    subscriber.set_timeout(5000);
    log!("[SUB] connected, entering gated recv");

    let start = Instant::now();
    let msg = subscriber
        .recv()
        .expect("subscriber: recv")
        .expect("subscriber: no payload");
    let elapsed = start.elapsed();

    assert_eq!(msg.data(), b"ping");
    assert!(
        elapsed >= DRIVER_STALL - Duration::from_millis(50),
        "recv returned after {elapsed:?}, before the driver released the gate"
    );
    log!("[SUB] got payload after {elapsed:?}");
}

#[test]
fn e2e_fake_gate_rendezvous() {
    let channel = match env::var(ENV_ROLE) {
        Ok(role) => {
            let channel = env::var(ENV_CHANNEL).expect("role process without channel");
            match role.as_str() {
                ROLE_SUBSCRIBER => run_subscriber(&channel),
                other => panic!("unknown role: {other}"),
            }
            return;
        }
        Err(_) => format!("strand_fake_{}", std::process::id()),
    };
    let identifier = format!("drv_{}", std::process::id());

    log!("");
    log!("[DRIVER] fake gate rendezvous over {channel}");

    let config = BackendConfig::shared_memory();
    let mut publisher = Publisher::with_segment_size(&config, &channel, SEGMENT_SIZE)
        .expect("driver: publisher");

    // The event pair must exist before the child is spawned: the child
    // inherits the eventfd descriptors across exec.
    let events =
        EventHandle::new(None, Some(&identifier), &channel).expect("driver: event pair");
    events.set_enabled(true);

    let exe = env::current_exe().expect("failed to get current executable path");
    let mut child = Command::new(exe)
        .arg("--exact")
        .arg("e2e_fake_gate_rendezvous")
        .env(ENV_ROLE, ROLE_SUBSCRIBER)
        .env(ENV_CHANNEL, &channel)
        .env("CEREAL_FAKE", "1")
        .env("CEREAL_FAKE_PREFIX", &identifier)
        .stderr(Stdio::inherit())
        .spawn()
        .expect("failed to spawn subscriber");

    // Driver side of the rendezvous: wait for the subscriber to enter recv,
    // stall to prove the gate holds it, publish, release.
    events
        .recv_called()
        .unwrap()
        .wait(10)
        .expect("driver: recv_called.wait");
    log!("[DRIVER] subscriber is parked in recv");

    std::thread::sleep(DRIVER_STALL);
    publisher.send(b"ping").expect("driver: send");
    events.recv_ready().unwrap().set().expect("driver: release");
    log!("[DRIVER] released one recv");

    let status = child.wait().expect("failed to wait for subscriber");
    drop(events);
    let _ = Channel::unlink(&channel, None);

    assert!(status.success(), "subscriber failed: {status}");
    log!("[DRIVER] rendezvous test passed");
}
