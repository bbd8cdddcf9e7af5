//! Listener behaviour over a real loopback socket

use std::net::UdpSocket;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use joyvox::config::TelemetryConfig;
use joyvox::listener::{ListenerHandle, TelemetryListener};
use joyvox::state::{InputBus, SharedBus};
use joyvox::telemetry::{InputSnapshot, TelemetryFrame};
use tokio_util::sync::CancellationToken;

fn loopback_config() -> TelemetryConfig {
    TelemetryConfig {
        bind_address: "127.0.0.1".into(),
        port: 0,
        recv_timeout_ms: 50,
        ..TelemetryConfig::default()
    }
}

fn spawn(bus: &SharedBus) -> ListenerHandle {
    TelemetryListener::spawn(&loopback_config(), bus.clone(), CancellationToken::new()).unwrap()
}

/// Poll until `check` holds or two seconds pass
fn wait_for(mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    false
}

#[test]
fn test_datagram_updates_bus() {
    let bus = InputBus::new(Duration::from_secs(3));
    let handle = spawn(&bus);

    let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
    let frame = TelemetryFrame {
        vrx: 4095,
        vry: 2048,
        button: true,
        ..TelemetryFrame::default()
    };
    sender
        .send_to(frame.encode().as_bytes(), handle.local_addr())
        .unwrap();

    assert!(wait_for(|| bus.snapshot().button));
    let s = bus.snapshot();
    assert!(s.axis_x > 0.99);
    assert_eq!(s.axis_y, 0.0);
    assert!(!bus.is_armed(Instant::now()));

    handle.shutdown();
}

#[test]
fn test_voice_flag_arms_window() {
    let bus = InputBus::new(Duration::from_secs(3));
    let handle = spawn(&bus);

    let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
    sender
        .send_to(b"VRX=2048 VRY=2048 BTN=Solto ZOOM=Inativo comandoVoz=Ativo", handle.local_addr())
        .unwrap();

    assert!(wait_for(|| bus.is_armed(Instant::now())));
    handle.shutdown();
}

#[test]
fn test_bad_datagram_keeps_previous_snapshot() {
    let bus = InputBus::new(Duration::from_secs(3));
    let handle = spawn(&bus);
    let sender = UdpSocket::bind("127.0.0.1:0").unwrap();

    sender.send_to(b"ZOOM=Ativo", handle.local_addr()).unwrap();
    assert!(wait_for(|| bus.snapshot().zoom));

    sender
        .send_to(b"VRX=oops ZOOM=Inativo", handle.local_addr())
        .unwrap();
    assert!(wait_for(|| handle.counters().rejected.load(Ordering::Relaxed) == 1));
    assert_eq!(
        bus.snapshot(),
        InputSnapshot {
            zoom: true,
            ..InputSnapshot::default()
        }
    );

    handle.shutdown();
}

#[test]
fn test_voice_flag_arms_even_when_axis_is_garbled() {
    let bus = InputBus::new(Duration::from_secs(3));
    let handle = spawn(&bus);
    let sender = UdpSocket::bind("127.0.0.1:0").unwrap();

    sender
        .send_to(b"VRX=12a VRY=2048 comandoVoz=Ativo", handle.local_addr())
        .unwrap();

    assert!(wait_for(|| bus.is_armed(Instant::now())));
    assert_eq!(handle.counters().rejected.load(Ordering::Relaxed), 1);
    assert_eq!(bus.snapshot(), InputSnapshot::default());

    handle.shutdown();
}

#[test]
fn test_cancellation_stops_thread_promptly() {
    let bus = InputBus::new(Duration::from_secs(3));
    let token = CancellationToken::new();
    let handle = TelemetryListener::spawn(&loopback_config(), bus, token.child_token()).unwrap();

    let start = Instant::now();
    token.cancel();
    handle.shutdown();
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[test]
fn test_port_conflict_is_reported() {
    let taken = UdpSocket::bind("127.0.0.1:0").unwrap();
    let config = TelemetryConfig {
        port: taken.local_addr().unwrap().port(),
        ..loopback_config()
    };
    let bus = InputBus::new(Duration::from_secs(3));
    let result = TelemetryListener::spawn(&config, bus, CancellationToken::new());
    assert!(result.is_err());
}
