use std::{rc::Rc, time::Duration};

use futures::StreamExt as _;
use media_state::{
    proto::{DetectorEvent, MediaKind},
    sys::memory::{
        MemoryDetector, MemoryGain, MemoryStream, MemorySurfaces, MemoryTrack,
    },
    Collaborators, FieldName, StreamConfig, StreamState,
};
use tokio::{task, task::spawn_local, time::sleep};
use tracing::info;
use tracing_subscriber::EnvFilter;

const CONFIG: &str = r#"{
    "origin": "local",
    "audio_monitoring": {
        "detect_speaking": true,
        "adjust_mic": true
    }
}"#;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = StreamConfig::from_json(CONFIG)?;

    task::LocalSet::new()
        .run_until(async move {
            let mic = MemoryTrack::new("mic", MediaKind::Audio, "Built-in Mic");
            let layers = [("q", 320, 180), ("h", 640, 360), ("f", 1280, 720)];
            let videos: Vec<_> = layers
                .iter()
                .map(|(rid, ..)| {
                    let label = "FaceTime HD Camera";
                    MemoryTrack::new(*rid, MediaKind::Video, label)
                })
                .collect();
            let mut tracks = vec![mic];
            tracks.extend(videos.iter().cloned());
            let media = MemoryStream::new("demo", tracks);

            let detector = MemoryDetector::new();
            let surfaces = MemorySurfaces::new();
            let state = StreamState::new(
                media.clone(),
                config,
                Collaborators {
                    detector: Some(detector.clone()),
                    gain: Some(MemoryGain::new()),
                    surfaces: Some(surfaces.clone()),
                },
            );

            for field in [
                FieldName::AudioMuted,
                FieldName::VideoMuted,
                FieldName::Speaking,
                FieldName::ActiveAlternate,
                FieldName::HasVideo,
                FieldName::Ended,
            ] {
                let mut changes = state.snapshot().on_change(field);
                spawn_local(async move {
                    while let Some(value) = changes.next().await {
                        info!("{:?} -> {:?}", field, value);
                    }
                });
            }

            // surfaces report their dimensions in no particular order
            for (rid, width, height) in layers.iter().rev() {
                if let Some(surface) = surfaces.surface(rid) {
                    surface.load(*width, *height);
                }
                sleep(Duration::from_millis(10)).await;
            }
            state.fit(700);
            state.fit(1260);

            detector.emit(DetectorEvent::Speaking);
            detector.emit(DetectorEvent::VolumeChange(-32.0));
            sleep(Duration::from_millis(200)).await;
            detector.emit(DetectorEvent::StoppedSpeaking);
            sleep(Duration::from_millis(1500)).await;

            state.toggle_audio();
            state.mute_video(false);
            state.toggle_audio();
            sleep(Duration::from_millis(10)).await;

            videos[2].end();
            sleep(Duration::from_millis(10)).await;

            spawn_local({
                let media = Rc::clone(&media);
                async move {
                    sleep(Duration::from_millis(500)).await;
                    media.end();
                }
            });
            state.snapshot().when_ended().await;
            // let the change listeners catch up
            sleep(Duration::from_millis(10)).await;
            info!(
                volume = state.snapshot().volume.get(),
                camera = %state.snapshot().camera_name.get(),
                "demo finished",
            );
        })
        .await;

    Ok(())
}
