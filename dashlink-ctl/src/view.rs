/*!
 * Text Rendering
 * Turns engine snapshots into the lines dashctl prints
 */

use dashlink_bluetooth::{DeviceInfo, Snapshot, StatusTone, TrackMetadata};

fn tone_marker(tone: StatusTone) -> &'static str {
    match tone {
        StatusTone::Error => "[!]",
        StatusTone::Active => "[*]",
        StatusTone::Idle => "[-]",
    }
}

pub fn status_line(snapshot: &Snapshot) -> String {
    let mut line = format!(
        "{} {} | {}",
        tone_marker(snapshot.status.tone()),
        snapshot.status,
        snapshot.connected_device.name
    );
    if snapshot.scanning {
        line.push_str(" | scanning");
    }
    line
}

pub fn track_line(metadata: Option<&TrackMetadata>) -> String {
    match metadata {
        Some(track) if track.has_track() => {
            format!("{} - {} ({})", track.title, track.artist, track.album)
        }
        _ => "Nothing playing".to_string(),
    }
}

pub fn device_line(path: &str, device: &DeviceInfo) -> String {
    let state = if device.connected {
        "connected"
    } else if device.paired {
        "paired"
    } else {
        "new"
    };
    format!(
        "{:<24} {:<10} {:<10} {}",
        device.name,
        state,
        device.action().to_string(),
        path
    )
}

pub fn render(snapshot: &Snapshot) -> Vec<String> {
    let mut lines = vec![
        status_line(snapshot),
        track_line(snapshot.metadata.as_ref()),
    ];
    if let Some(err) = &snapshot.last_error {
        lines.push(format!("Last error: {}", err));
    }
    lines
}
