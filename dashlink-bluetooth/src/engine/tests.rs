use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::*;
use crate::bus::{
    Capability, DeviceProperties, MethodCall, PlayerProperties, PropertyChange, TrackFields,
};
use crate::mock::{BusCall, MockBus};
use crate::model::{ConnectedDevice, TrackMetadata};
use crate::projection::is_consistent;

const ADAPTER: &str = "/org/bluez/hci0";

fn player(status: &str, title: &str) -> PlayerProperties {
    PlayerProperties {
        status: Some(status.to_string()),
        track: TrackFields {
            title: Some(title.to_string()),
            artist: Some("Artist".to_string()),
            album: None,
        },
    }
}

fn connected_change(path: &str, connected: bool) -> BusSignal {
    BusSignal::PropertiesChanged {
        path: path.to_string(),
        change: PropertyChange::Device(DeviceProperties {
            connected: Some(connected),
            ..Default::default()
        }),
    }
}

fn player_changed(path: &str) -> BusSignal {
    BusSignal::PropertiesChanged {
        path: path.to_string(),
        change: PropertyChange::MediaPlayer,
    }
}

// With a paused clock this returns once the engine has drained its queues.
async fn settle() {
    time::sleep(Duration::from_millis(10)).await;
}

fn start(bus: &MockBus) -> (EngineHandle, JoinHandle<Result<(), EngineError>>) {
    Engine::spawn(bus.clone(), EngineConfig::default())
}

#[tokio::test(start_paused = true)]
async fn bootstrap_seeds_connected_device_and_player() {
    let bus = MockBus::new()
        .with_adapter(ADAPTER)
        .with_device("/d1", "X", true, true)
        .with_player("/d1/player", player("playing", "Track A"));

    let (handle, _task) = start(&bus);
    settle().await;

    assert_eq!(
        handle.connected_device().await,
        ConnectedDevice {
            name: "X".to_string(),
            path: Some("/d1".to_string()),
        }
    );
    assert_eq!(handle.status().await, Status::Playback("playing".to_string()));
    assert!(handle.discovered_devices().await["/d1"].connected);
    assert_eq!(
        handle.metadata().await,
        Some(TrackMetadata {
            title: "Track A".to_string(),
            artist: "Artist".to_string(),
            album: "Unknown Album".to_string(),
        })
    );
}

#[tokio::test(start_paused = true)]
async fn bootstrap_without_connected_device_is_ready() {
    let bus = MockBus::new()
        .with_adapter(ADAPTER)
        .with_device("/d1", "Speaker", true, false);

    let (handle, _task) = start(&bus);
    settle().await;

    assert_eq!(handle.status().await, Status::Ready);
    assert!(handle.connected_device().await.is_none());
    let adapter = handle.adapter().await.unwrap();
    assert!(adapter.powered && adapter.discoverable);
}

#[tokio::test(start_paused = true)]
async fn bootstrap_configures_adapter_then_subscribes_before_seeding() {
    let bus = MockBus::new().with_adapter(ADAPTER);
    let (_handle, _task) = start(&bus);
    settle().await;

    let calls = bus.calls();
    assert_eq!(
        &calls[..6],
        &[
            BusCall::ManagedObjects,
            BusCall::SetAdapter(ADAPTER.to_string(), AdapterSetting::Powered(true)),
            BusCall::SetAdapter(ADAPTER.to_string(), AdapterSetting::Discoverable(true)),
            BusCall::SetAdapter(ADAPTER.to_string(), AdapterSetting::DiscoverableTimeout(0)),
            BusCall::Subscribe,
            BusCall::ManagedObjects,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn missing_adapter_halts_engine() {
    let bus = MockBus::new().with_device("/d1", "Phone", true, false);
    let (handle, task) = start(&bus);

    let result = task.await.unwrap();
    assert!(matches!(result, Err(EngineError::NoAdapterFound)));
    assert_eq!(handle.status().await, Status::NoAdapter);
    assert!(handle.discovered_devices().await.is_empty());
    assert!(matches!(handle.toggle_discovery(), Err(EngineError::Stopped)));
}

#[tokio::test(start_paused = true)]
async fn subscription_failure_is_fatal() {
    let bus = MockBus::new().with_adapter(ADAPTER);
    bus.fail_subscribe();
    let (handle, task) = start(&bus);

    assert!(task.await.unwrap().is_err());
    assert_eq!(handle.status().await, Status::Failed);
    assert!(handle.last_error().await.is_some());
}

#[tokio::test(start_paused = true)]
async fn adapter_configuration_failure_is_not_fatal() {
    let bus = MockBus::new().with_adapter(ADAPTER);
    bus.fail_settings();
    let (handle, _task) = start(&bus);
    settle().await;

    assert_eq!(handle.status().await, Status::Ready);
    assert!(!handle.adapter().await.unwrap().powered);
    assert!(bus.calls().contains(&BusCall::Subscribe));
}

#[tokio::test(start_paused = true)]
async fn toggle_discovery_starts_then_stops() {
    let bus = MockBus::new().with_adapter(ADAPTER);
    let (handle, _task) = start(&bus);
    settle().await;

    handle.toggle_discovery().unwrap();
    settle().await;
    assert!(handle.is_scanning().await);

    handle.toggle_discovery().unwrap();
    settle().await;
    assert!(!handle.is_scanning().await);

    assert_eq!(
        bus.method_calls(),
        vec![
            (ADAPTER.to_string(), MethodCall::StartDiscovery),
            (ADAPTER.to_string(), MethodCall::StopDiscovery),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn failed_start_discovery_leaves_flag_clear() {
    let bus = MockBus::new().with_adapter(ADAPTER);
    bus.fail(MethodCall::StartDiscovery);
    let (handle, _task) = start(&bus);
    settle().await;

    handle.toggle_discovery().unwrap();
    settle().await;

    assert!(!handle.is_scanning().await);
    let error = handle.last_error().await.unwrap();
    assert!(error.starts_with("Discovery toggle error"), "{error}");
}

#[tokio::test(start_paused = true)]
async fn failed_stop_discovery_still_clears_flag() {
    let bus = MockBus::new().with_adapter(ADAPTER);
    bus.fail(MethodCall::StopDiscovery);
    let (handle, _task) = start(&bus);
    settle().await;

    handle.toggle_discovery().unwrap();
    settle().await;
    handle.toggle_discovery().unwrap();
    settle().await;

    assert!(!handle.is_scanning().await);
    assert!(handle.last_error().await.is_some());
}

#[tokio::test(start_paused = true)]
async fn pair_and_connect_skips_pair_for_paired_device() {
    let bus = MockBus::new()
        .with_adapter(ADAPTER)
        .with_device("/d1", "Phone", true, false);
    let (handle, _task) = start(&bus);
    settle().await;

    handle.pair_and_connect("/d1").unwrap();
    settle().await;

    assert_eq!(bus.method_calls(), vec![("/d1".to_string(), MethodCall::Connect)]);
    assert!(bus.calls().contains(&BusCall::DevicePaired("/d1".to_string())));
}

#[tokio::test(start_paused = true)]
async fn pair_and_connect_waits_for_pairing_to_settle() {
    let bus = MockBus::new()
        .with_adapter(ADAPTER)
        .with_device("/d1", "Phone", false, false);
    let (handle, _task) = start(&bus);
    settle().await;

    handle.pair_and_connect("/d1").unwrap();
    time::sleep(Duration::from_secs(1)).await;
    assert_eq!(bus.method_calls(), vec![("/d1".to_string(), MethodCall::Pair)]);

    time::sleep(Duration::from_secs(2)).await;
    assert_eq!(
        bus.method_calls(),
        vec![
            ("/d1".to_string(), MethodCall::Pair),
            ("/d1".to_string(), MethodCall::Connect),
        ]
    );
    // The connection itself is reported by BlueZ, not by the command.
    assert_eq!(handle.status().await, Status::Ready);
}

#[tokio::test(start_paused = true)]
async fn failed_pair_aborts_without_connect() {
    let bus = MockBus::new()
        .with_adapter(ADAPTER)
        .with_device("/d1", "Phone", false, false);
    bus.fail(MethodCall::Pair);
    let (handle, _task) = start(&bus);
    settle().await;

    handle.pair_and_connect("/d1").unwrap();
    time::sleep(Duration::from_secs(5)).await;

    assert_eq!(bus.method_calls(), vec![("/d1".to_string(), MethodCall::Pair)]);
    let error = handle.last_error().await.unwrap();
    assert!(error.starts_with("Failed to pair/connect"), "{error}");
    assert_eq!(handle.status().await, Status::Ready);
}

#[tokio::test(start_paused = true)]
async fn failed_disconnect_is_recorded() {
    let bus = MockBus::new()
        .with_adapter(ADAPTER)
        .with_device("/d1", "Phone", true, true);
    bus.fail(MethodCall::Disconnect);
    let (handle, _task) = start(&bus);
    settle().await;

    handle.disconnect("/d1").unwrap();
    settle().await;

    assert!(handle.last_error().await.unwrap().starts_with("Failed to disconnect"));
    assert_eq!(handle.connected_device().await.path.as_deref(), Some("/d1"));
}

#[tokio::test(start_paused = true)]
async fn perform_maps_actions_to_commands() {
    let bus = MockBus::new()
        .with_adapter(ADAPTER)
        .with_device("/d1", "Phone", true, true)
        .with_device("/d2", "Watch", true, false);
    let (handle, _task) = start(&bus);
    settle().await;

    let devices = handle.discovered_devices().await;
    handle.perform("/d1", devices["/d1"].action()).unwrap();
    handle.perform("/d2", devices["/d2"].action()).unwrap();
    settle().await;

    assert_eq!(
        bus.method_calls(),
        vec![
            ("/d1".to_string(), MethodCall::Disconnect),
            ("/d2".to_string(), MethodCall::Connect),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn connect_signal_points_at_device() {
    let bus = MockBus::new()
        .with_adapter(ADAPTER)
        .with_device("/d2", "Car Kit", true, false);
    let (handle, _task) = start(&bus);
    settle().await;

    assert!(bus.emit(connected_change("/d2", true)));
    settle().await;

    let snapshot = handle.snapshot().await;
    assert_eq!(snapshot.connected_device.name, "Car Kit");
    assert_eq!(snapshot.status, Status::Connected);
    assert!(is_consistent(&snapshot));
}

#[tokio::test(start_paused = true)]
async fn interfaces_added_with_device_and_player_runs_both_branches() {
    let bus = MockBus::new().with_adapter(ADAPTER);
    let (handle, _task) = start(&bus);
    settle().await;

    bus.add_player("/d3", player("paused", "Song"));
    bus.emit(BusSignal::InterfacesAdded {
        path: "/d3".to_string(),
        capabilities: vec![
            Capability::Device(DeviceProperties {
                name: None,
                paired: Some(true),
                connected: None,
            }),
            Capability::MediaPlayer,
        ],
    });
    settle().await;

    let snapshot = handle.snapshot().await;
    assert_eq!(snapshot.devices["/d3"].name, "Unknown Device");
    assert!(snapshot.devices["/d3"].paired);
    assert_eq!(snapshot.media_player.as_deref(), Some("/d3"));
    assert_eq!(snapshot.status, Status::Playback("paused".to_string()));
}

#[tokio::test(start_paused = true)]
async fn disconnect_of_connected_device_drops_media() {
    let bus = MockBus::new()
        .with_adapter(ADAPTER)
        .with_device("/d1", "Phone", true, true)
        .with_player("/d1/player0", player("playing", "Song"));
    let (handle, _task) = start(&bus);
    settle().await;
    assert!(handle.metadata().await.is_some());

    bus.remove_player("/d1/player0");
    bus.emit(connected_change("/d1", false));
    settle().await;

    let snapshot = handle.snapshot().await;
    assert!(snapshot.connected_device.is_none());
    assert_eq!(snapshot.metadata, None);
    assert_eq!(snapshot.media_player, None);
    assert_eq!(snapshot.status, Status::Ready);
    assert!(!snapshot.devices["/d1"].connected);
}

#[tokio::test(start_paused = true)]
async fn disconnect_of_other_device_keeps_media() {
    let bus = MockBus::new()
        .with_adapter(ADAPTER)
        .with_device("/d1", "Phone", true, true)
        .with_device("/d2", "Watch", true, true)
        .with_player("/d1/player0", player("playing", "Song"));
    let (handle, _task) = start(&bus);
    settle().await;
    let before = handle.snapshot().await;
    let other = match before.connected_device.path.as_deref() {
        Some("/d1") => "/d2",
        _ => "/d1",
    };

    bus.emit(connected_change(other, false));
    settle().await;

    let after = handle.snapshot().await;
    assert_eq!(after.connected_device, before.connected_device);
    assert_eq!(after.metadata, before.metadata);
    assert_eq!(after.media_player, before.media_player);
}

#[tokio::test(start_paused = true)]
async fn player_change_refetches_and_failure_unbinds() {
    let bus = MockBus::new()
        .with_adapter(ADAPTER)
        .with_device("/d1", "Phone", true, true)
        .with_player("/d1/player0", player("playing", "One"));
    let (handle, _task) = start(&bus);
    settle().await;

    bus.add_player("/d1/player0", player("paused", "Two"));
    bus.emit(player_changed("/d1/player0"));
    settle().await;
    assert_eq!(handle.status().await, Status::Playback("paused".to_string()));
    assert_eq!(handle.metadata().await.unwrap().title, "Two");

    bus.remove_player("/d1/player0");
    bus.emit(player_changed("/d1/player0"));
    settle().await;

    let snapshot = handle.snapshot().await;
    assert_eq!(snapshot.status, Status::NoMediaInfo);
    assert_eq!(snapshot.media_player, None);
    assert!(snapshot.last_error.is_some());
    assert_eq!(snapshot.metadata.unwrap().title, "Two");
}

#[tokio::test(start_paused = true)]
async fn unanswering_player_without_device_keeps_ready() {
    let bus = MockBus::new().with_adapter(ADAPTER);
    bus.add_object("/d1/player0", vec![Capability::MediaPlayer]);
    let (handle, _task) = start(&bus);
    settle().await;
    time::sleep(Duration::from_millis(4100)).await;

    let snapshot = handle.snapshot().await;
    assert_eq!(snapshot.status, Status::Ready);
    assert!(snapshot.connected_device.is_none());
    assert_eq!(snapshot.media_player, None);
    assert!(snapshot.last_error.is_some());
}

#[tokio::test(start_paused = true)]
async fn poll_attaches_player_missed_by_signals() {
    let bus = MockBus::new()
        .with_adapter(ADAPTER)
        .with_device("/d1", "Phone", true, true);
    let (handle, _task) = start(&bus);
    settle().await;
    assert_eq!(handle.snapshot().await.media_player, None);

    bus.add_player("/d1/player0", player("playing", "Late"));
    time::sleep(Duration::from_millis(2100)).await;

    let snapshot = handle.snapshot().await;
    assert_eq!(snapshot.media_player.as_deref(), Some("/d1/player0"));
    assert_eq!(snapshot.metadata.unwrap().title, "Late");
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_loop_and_closes_bus() {
    let bus = MockBus::new().with_adapter(ADAPTER);
    let (handle, task) = start(&bus);
    settle().await;

    handle.shutdown();
    assert!(task.await.unwrap().is_ok());
    handle.stopped().await;

    assert_eq!(bus.calls().last(), Some(&BusCall::Close));
    assert!(!bus.emit(connected_change("/d1", true)));
    assert!(matches!(handle.disconnect("/d1"), Err(EngineError::Stopped)));
}

#[tokio::test]
async fn toggle_without_adapter_records_error() {
    let bus = MockBus::new();
    let (mut engine, handle) = Engine::new(bus.clone(), EngineConfig::default());

    engine.dispatch(Command::ToggleDiscovery).await;

    assert!(bus.method_calls().is_empty());
    assert!(!handle.is_scanning().await);
    assert_eq!(
        handle.last_error().await.as_deref(),
        Some("Discovery toggle error: no Bluetooth adapter")
    );
}

#[tokio::test]
async fn full_queue_rejects_without_blocking() {
    let config = EngineConfig {
        command_queue: 1,
        ..EngineConfig::default()
    };
    let (_engine, handle) = Engine::new(MockBus::new(), config);

    handle.toggle_discovery().unwrap();
    assert!(matches!(handle.toggle_discovery(), Err(EngineError::QueueFull)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn readers_never_see_torn_snapshots() {
    let bus = MockBus::new()
        .with_adapter(ADAPTER)
        .with_device("/d1", "One", true, false)
        .with_device("/d2", "Two", true, false)
        .with_device("/d3", "Three", true, false);
    let (handle, _task) = start(&bus);
    while handle.status().await == Status::Initializing {
        tokio::task::yield_now().await;
    }

    let done = Arc::new(AtomicBool::new(false));
    let mut readers = Vec::new();
    for _ in 0..3 {
        let handle = handle.clone();
        let done = done.clone();
        readers.push(tokio::spawn(async move {
            let mut checked = 0u32;
            while !done.load(Ordering::Relaxed) {
                let snapshot = handle.snapshot().await;
                assert!(is_consistent(&snapshot), "torn snapshot: {snapshot:?}");
                if snapshot.connected_device.is_none() && snapshot.media_player.is_none() {
                    assert_eq!(snapshot.metadata, None, "{snapshot:?}");
                }
                checked += 1;
                tokio::task::yield_now().await;
            }
            checked
        }));
    }

    let thread_handle = handle.clone();
    let thread_done = done.clone();
    let blocking_reader = std::thread::spawn(move || {
        while !thread_done.load(Ordering::Relaxed) {
            let snapshot = thread_handle.blocking_snapshot();
            assert!(is_consistent(&snapshot), "torn snapshot: {snapshot:?}");
        }
    });

    let paths = ["/d1", "/d2", "/d3"];
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..500 {
        let path = paths[rng.random_range(0..paths.len())];
        let signal = match rng.random_range(0..4) {
            0 => {
                bus.add_player(&format!("{path}/player0"), player("playing", path));
                BusSignal::InterfacesAdded {
                    path: format!("{path}/player0"),
                    capabilities: vec![Capability::MediaPlayer],
                }
            }
            1 => player_changed(&format!("{path}/player0")),
            _ => connected_change(path, rng.random_bool(0.5)),
        };
        bus.emit(signal);
        if rng.random_bool(0.1) {
            tokio::task::yield_now().await;
        }
    }

    tokio::time::sleep(Duration::from_millis(200)).await;
    done.store(true, Ordering::Relaxed);
    for reader in readers {
        assert!(reader.await.unwrap() > 0);
    }
    blocking_reader.join().unwrap();
    assert!(is_consistent(&handle.snapshot().await));
}
