//! End-to-end tests over real loopback sockets.

use aquaguard_sim::config::ServerConfig;
use aquaguard_sim::streaming::{
    ConnectionStatus, ReconnectingReceiver, TelemetryReceiver, TelemetryServer,
};
use aquaguard_sim::{Command, ControlSurface, Error, SensorSchema, StateStore};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

const READ_TIMEOUT: Option<Duration> = Some(Duration::from_secs(5));

fn config(bind_address: &str, accept_timeout_ms: u64, send_interval_ms: u64) -> ServerConfig {
    ServerConfig {
        bind_address: bind_address.to_string(),
        accept_timeout_ms,
        send_interval_ms,
    }
}

fn fast_server(schema: SensorSchema) -> (Arc<StateStore>, TelemetryServer) {
    let state = Arc::new(StateStore::new(schema));
    let server = TelemetryServer::new(config("127.0.0.1:0", 200, 20), Arc::clone(&state));
    (state, server)
}

/// Port that was free a moment ago
fn free_port_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

#[test]
fn test_setters_reach_connected_client() {
    let (_, server) = fast_server(SensorSchema::Flow);
    server.start().unwrap();
    let mut client = TelemetryReceiver::connect(server.local_addr().unwrap(), READ_TIMEOUT).unwrap();

    server.apply(Command::SetFlow(5.0)).unwrap();
    server.apply(Command::SetHumidity(55.2)).unwrap();
    server.apply(Command::SetLeak(true)).unwrap();

    let mut matched = None;
    for _ in 0..20 {
        let reading = client.next_reading().unwrap().unwrap();
        if reading.leak {
            matched = Some(reading);
            break;
        }
    }

    let reading = matched.expect("no record reflected the setter calls");
    assert_eq!(reading.flow_lpm, 5.0);
    assert_eq!(reading.humidity_pct, 55.2);
    assert!(reading.leak);
    assert!(reading.flowing);
    assert!(!reading.high_flow);

    server.stop();
}

#[test]
fn test_records_are_single_json_lines() {
    let (_, server) = fast_server(SensorSchema::Flow);
    server.start().unwrap();
    let mut client = TelemetryReceiver::connect(server.local_addr().unwrap(), READ_TIMEOUT).unwrap();

    for _ in 0..3 {
        let line = client.next_line().unwrap().unwrap();
        assert!(line.ends_with('\n'));
        let value: serde_json::Value = serde_json::from_str(line.trim_end()).unwrap();
        let obj = value.as_object().unwrap();
        assert_eq!(obj.len(), 5);
        for key in ["flow_lpm", "humidity_pct", "flowing", "leak", "high_flow"] {
            assert!(obj.contains_key(key), "missing {}", key);
        }
    }

    server.stop();
}

#[test]
fn test_environment_schema_stream() {
    let (state, server) = fast_server(SensorSchema::Environment);
    state.set_temperature(55.0).unwrap();
    state.set_flow(0.05);
    server.start().unwrap();

    let mut client = TelemetryReceiver::connect(server.local_addr().unwrap(), READ_TIMEOUT).unwrap();
    let reading = client.next_reading().unwrap().unwrap();

    assert_eq!(reading.temperature_c, Some(55.0));
    assert_eq!(reading.pressure_kpa, Some(101.3));
    assert!(!reading.flowing);
    assert!(reading.alerts.contains(aquaguard_sim::AlertFlags::HIGH_TEMP));
    assert!(reading.alerts.contains(aquaguard_sim::AlertFlags::LOW_FLOW));

    server.stop();
}

#[test]
fn test_stop_without_client() {
    let (_, server) = fast_server(SensorSchema::Flow);
    server.start().unwrap();
    assert!(server.is_running());

    let started = Instant::now();
    server.stop();

    assert!(!server.is_running());
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[test]
fn test_bounded_stop_with_connected_client() {
    // Reference timings: 1s accept wait, 0.5s cadence
    let state = Arc::new(StateStore::new(SensorSchema::Flow));
    let server = TelemetryServer::new(config("127.0.0.1:0", 1000, 500), state);
    server.start().unwrap();

    // Client that never reads
    let _client = TcpStream::connect(server.local_addr().unwrap()).unwrap();
    let deadline = Instant::now() + Duration::from_secs(3);
    while !server.has_client() {
        assert!(Instant::now() < deadline, "client never registered");
        thread::sleep(Duration::from_millis(10));
    }

    let started = Instant::now();
    server.stop();

    assert!(started.elapsed() <= Duration::from_millis(1500));
    assert!(!server.has_client());
}

#[test]
fn test_bounded_stop_with_write_blocked_on_full_buffers() {
    // Zero interval floods a client that never reads until write_all blocks
    let state = Arc::new(StateStore::new(SensorSchema::Flow));
    let server = TelemetryServer::new(config("127.0.0.1:0", 1000, 0), state);
    server.start().unwrap();

    let _client = TcpStream::connect(server.local_addr().unwrap()).unwrap();
    let deadline = Instant::now() + Duration::from_secs(3);
    while !server.has_client() {
        assert!(Instant::now() < deadline, "client never registered");
        thread::sleep(Duration::from_millis(10));
    }
    thread::sleep(Duration::from_millis(1500));

    let started = Instant::now();
    server.stop();

    assert!(started.elapsed() <= Duration::from_millis(1500));
    assert!(!server.has_client());
    assert!(!server.is_running());
}

#[test]
fn test_reconnecting_receiver_follows_server_restart() {
    let addr = free_port_addr();
    let state = Arc::new(StateStore::new(SensorSchema::Flow));
    let server = TelemetryServer::new(config(&addr.to_string(), 200, 20), Arc::clone(&state));
    server.start().unwrap();

    let running = Arc::new(AtomicBool::new(true));
    let mut receiver =
        ReconnectingReceiver::new(addr, Some(Duration::from_millis(500)), Arc::clone(&running));
    let first = receiver.next_reading().unwrap();
    assert_eq!(first.status, ConnectionStatus::Connected);

    server.stop();
    state.set_flow(7.0);
    server.start().unwrap();

    let deadline = Instant::now() + Duration::from_secs(10);
    let resumed = loop {
        let reading = receiver.next_reading().unwrap();
        if reading.flow_lpm == 7.0 {
            break reading;
        }
        assert!(Instant::now() < deadline, "receiver never resumed");
    };

    assert_eq!(resumed.status, ConnectionStatus::Connected);
    assert!(receiver.connections() >= 2);
    assert!(resumed.sequence > first.sequence);

    running.store(false, Ordering::Release);
    server.stop();
}

#[test]
fn test_stop_disconnects_client() {
    let (_, server) = fast_server(SensorSchema::Flow);
    server.start().unwrap();
    let mut client = TelemetryReceiver::connect(server.local_addr().unwrap(), READ_TIMEOUT).unwrap();
    client.next_reading().unwrap().unwrap();

    server.stop();

    // Remaining buffered records may still arrive, then EOF or reset
    let mut closed = false;
    for _ in 0..100 {
        match client.next_reading() {
            Ok(Some(_)) => continue,
            Ok(None) | Err(Error::Io(_)) => {
                closed = true;
                break;
            }
            Err(e) => panic!("unexpected error: {}", e),
        }
    }
    assert!(closed);
}

#[test]
fn test_start_is_idempotent() {
    let (_, server) = fast_server(SensorSchema::Flow);
    server.start().unwrap();
    let first = server.local_addr().unwrap();

    server.start().unwrap();
    assert_eq!(server.local_addr().unwrap(), first);

    // The one listener still holds the port
    let rival = TelemetryServer::new(
        config(&first.to_string(), 200, 20),
        Arc::new(StateStore::new(SensorSchema::Flow)),
    );
    assert!(matches!(rival.start(), Err(Error::Bind { .. })));

    let mut client = TelemetryReceiver::connect(first, READ_TIMEOUT).unwrap();
    assert!(client.next_reading().unwrap().is_some());

    server.stop();
}

#[test]
fn test_rebind_after_stop() {
    let addr = free_port_addr();
    let state = Arc::new(StateStore::new(SensorSchema::Flow));
    let server = TelemetryServer::new(config(&addr.to_string(), 200, 20), Arc::clone(&state));

    server.start().unwrap();
    let mut client = TelemetryReceiver::connect(addr, READ_TIMEOUT).unwrap();
    client.next_reading().unwrap().unwrap();
    server.stop();

    server.start().unwrap();
    assert_eq!(server.local_addr().unwrap(), addr);
    let mut client = TelemetryReceiver::connect(addr, READ_TIMEOUT).unwrap();
    assert!(client.next_reading().unwrap().is_some());
    server.stop();

    // A fresh server instance can take the address as well
    let other = TelemetryServer::new(config(&addr.to_string(), 200, 20), state);
    other.start().unwrap();
    other.stop();
}

#[test]
fn test_session_survives_client_disconnect() {
    let (_, server) = fast_server(SensorSchema::Flow);
    server.start().unwrap();
    let addr = server.local_addr().unwrap();

    let mut client_a = TelemetryReceiver::connect(addr, READ_TIMEOUT).unwrap();
    client_a.next_reading().unwrap().unwrap();
    client_a.next_reading().unwrap().unwrap();
    client_a.close();

    let mut client_b = TelemetryReceiver::connect(addr, READ_TIMEOUT).unwrap();
    for _ in 0..3 {
        assert!(client_b.next_reading().unwrap().is_some());
    }
    assert!(server.is_running());

    server.stop();
}

#[test]
fn test_clients_are_served_one_at_a_time() {
    let (_, server) = fast_server(SensorSchema::Flow);
    server.start().unwrap();
    let addr = server.local_addr().unwrap();

    let mut client_a = TelemetryReceiver::connect(addr, READ_TIMEOUT).unwrap();
    client_a.next_reading().unwrap().unwrap();

    // Queued in the backlog, but no records until A goes away
    let mut client_b = TelemetryReceiver::connect(addr, Some(Duration::from_millis(200))).unwrap();
    match client_b.next_reading() {
        Err(Error::Io(e)) => assert!(matches!(
            e.kind(),
            std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
        )),
        other => panic!("second client was served concurrently: {:?}", other),
    }

    client_a.close();

    // Once A's session ends, B is accepted from the backlog
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        match client_b.next_reading() {
            Ok(Some(_)) => break,
            Err(Error::Io(_)) if Instant::now() < deadline => continue,
            other => panic!("second client never served: {:?}", other),
        }
    }

    server.stop();
}

#[test]
fn test_send_cadence() {
    let interval = Duration::from_millis(50);
    let state = Arc::new(StateStore::new(SensorSchema::Flow));
    let server = TelemetryServer::new(config("127.0.0.1:0", 200, 50), state);
    server.start().unwrap();

    let mut client = TelemetryReceiver::connect(server.local_addr().unwrap(), READ_TIMEOUT).unwrap();
    client.next_reading().unwrap().unwrap();

    let mut last = Instant::now();
    let mut gaps = Vec::new();
    for _ in 0..10 {
        client.next_reading().unwrap().unwrap();
        let now = Instant::now();
        gaps.push(now - last);
        last = now;
    }

    // Measured at the client, so one late delivery shortens the next gap.
    // The strict per-record bound is checked on the writer side in session.rs.
    let tolerance = Duration::from_millis(5);
    let on_cadence = gaps.iter().filter(|g| **g + tolerance >= interval).count();
    assert!(on_cadence >= 9, "gaps shorter than interval: {:?}", gaps);

    // Arrival jitter cannot compress the whole run
    let total: Duration = gaps.iter().sum();
    assert!(total + tolerance >= interval * 10, "run too short: {:?}", total);

    server.stop();
}

#[test]
fn test_control_surface_as_trait_object() {
    let (_, server) = fast_server(SensorSchema::Environment);
    let surface: &dyn ControlSurface = &server;

    surface.apply(Command::Start).unwrap();
    surface.apply(Command::SetPressure(125.0)).unwrap();
    assert!(matches!(
        surface.apply(Command::SetHighFlow(true)),
        Err(Error::NotSupported(_))
    ));

    let mut client = TelemetryReceiver::connect(server.local_addr().unwrap(), READ_TIMEOUT).unwrap();
    let reading = client.next_reading().unwrap().unwrap();
    assert_eq!(reading.pressure_kpa, Some(125.0));

    surface.apply(Command::Stop).unwrap();
    assert!(!surface.is_running());
}
