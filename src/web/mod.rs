//! Read-only HTTP view of a running simulation. The simulation runs on a
//! blocking task; year frames and victim events fan out through a broadcast
//! channel to SSE subscribers.

use std::{
    convert::Infallible,
    net::SocketAddr,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use anyhow::{Context, Result};
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tokio::{net::TcpListener, sync::broadcast};
use tokio_stream::{wrappers::BroadcastStream, Stream, StreamExt};
use tracing::{error, info, warn};

use crate::{
    engine::{EngineBuilder, EngineSettings},
    events::{Observer, SimEvent},
    scenario::Scenario,
    world::WorldSnapshot,
};

#[derive(Clone, Serialize)]
pub struct UiFrame {
    pub snapshot: WorldSnapshot,
    pub completed: bool,
}

#[derive(Clone, Serialize)]
pub struct StateEnvelope {
    pub scenario: String,
    pub total_years: u32,
    pub frame: Option<UiFrame>,
    pub completed: bool,
}

/// One SSE payload.
#[derive(Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum StreamMessage<'a> {
    Frame(&'a UiFrame),
    Event(&'a SimEvent),
}

impl StreamMessage<'_> {
    fn publish(&self, tx: &broadcast::Sender<String>) {
        if let Ok(payload) = serde_json::to_string(self) {
            // No subscribers is not an error.
            let _ = tx.send(payload);
        }
    }
}

/// Forwards every victim event to the broadcast channel.
pub struct BroadcastObserver {
    tx: broadcast::Sender<String>,
}

impl BroadcastObserver {
    pub fn new(tx: broadcast::Sender<String>) -> Self {
        Self { tx }
    }
}

impl Observer for BroadcastObserver {
    fn on_event(&mut self, event: &SimEvent) {
        StreamMessage::Event(event).publish(&self.tx);
    }
}

#[derive(Clone)]
struct AppState {
    broadcaster: broadcast::Sender<String>,
    latest_frame: Arc<Mutex<Option<UiFrame>>>,
    frames: Arc<Mutex<Vec<UiFrame>>>,
    total_years: u32,
    scenario_name: String,
    simulation_done: Arc<AtomicBool>,
}

pub struct WebServerConfig {
    pub scenario: Scenario,
    pub years: u32,
    pub snapshot_interval: u32,
    pub snapshot_dir: PathBuf,
    pub age_dump_dir: Option<PathBuf>,
    pub host: String,
    pub port: u16,
}

pub async fn run(config: WebServerConfig) -> Result<()> {
    let WebServerConfig {
        scenario,
        years,
        snapshot_interval,
        snapshot_dir,
        age_dump_dir,
        host,
        port,
    } = config;

    let scenario_name = scenario.name.clone();
    let mut world = scenario.build_world()?;

    let (tx, _) = broadcast::channel::<String>(1024);
    let settings = EngineSettings {
        scenario_name: scenario_name.clone(),
        snapshot_interval_years: snapshot_interval,
        snapshot_dir,
        age_dump_dir,
    };
    let mut engine = EngineBuilder::new(settings)
        .with_observer(BroadcastObserver::new(tx.clone()))
        .build();

    let latest_frame: Arc<Mutex<Option<UiFrame>>> = Arc::new(Mutex::new(None));
    let frames: Arc<Mutex<Vec<UiFrame>>> = Arc::new(Mutex::new(Vec::new()));
    let simulation_done = Arc::new(AtomicBool::new(false));

    let latest_for_sim = latest_frame.clone();
    let frames_for_sim = frames.clone();
    let done_for_sim = simulation_done.clone();
    let tx_for_sim = tx.clone();

    let sim_handle = tokio::task::spawn_blocking(move || -> Result<()> {
        engine.run_with_hook(&mut world, years, |snapshot| {
            let frame = UiFrame {
                snapshot,
                completed: false,
            };
            record_frame(&latest_for_sim, &frames_for_sim, &frame, false);
            StreamMessage::Frame(&frame).publish(&tx_for_sim);
        })?;

        done_for_sim.store(true, Ordering::SeqCst);

        let final_frame = latest_for_sim
            .lock()
            .expect("latest frame lock poisoned")
            .clone();
        if let Some(mut frame) = final_frame {
            frame.completed = true;
            record_frame(&latest_for_sim, &frames_for_sim, &frame, true);
            StreamMessage::Frame(&frame).publish(&tx_for_sim);
        }
        Ok(())
    });

    let state = Arc::new(AppState {
        broadcaster: tx.clone(),
        latest_frame,
        frames,
        total_years: years,
        scenario_name: scenario_name.clone(),
        simulation_done,
    });

    let label = scenario_name.clone();
    tokio::spawn(async move {
        match sim_handle.await {
            Ok(Ok(())) => info!(scenario = %label, "simulation completed"),
            Ok(Err(err)) => error!(scenario = %label, "simulation error: {err:#}"),
            Err(err) => error!(scenario = %label, "simulation task failed: {err}"),
        }
    });

    let router = router(state);
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .with_context(|| format!("invalid listen address {host}:{port}"))?;

    info!(%addr, scenario = %scenario_name, "observer api listening (Ctrl+C to stop)");
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/state", get(latest_state))
        .route("/api/frames", get(all_frames))
        .route("/api/events", get(stream_events))
        .with_state(state)
}

/// Store `frame` as the latest one. A final frame replaces the last stored
/// frame instead of adding a new year.
fn record_frame(
    latest: &Mutex<Option<UiFrame>>,
    frames: &Mutex<Vec<UiFrame>>,
    frame: &UiFrame,
    replace_last: bool,
) {
    *latest.lock().expect("latest frame lock poisoned") = Some(frame.clone());
    let mut guard = frames.lock().expect("frames lock poisoned");
    match guard.last_mut() {
        Some(last) if replace_last => *last = frame.clone(),
        _ => guard.push(frame.clone()),
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for ctrl-c: {err}");
    }
    info!("shutting down observer api");
}

async fn latest_state(State(state): State<Arc<AppState>>) -> Json<StateEnvelope> {
    let frame = state
        .latest_frame
        .lock()
        .expect("latest frame lock poisoned")
        .clone();
    Json(StateEnvelope {
        scenario: state.scenario_name.clone(),
        total_years: state.total_years,
        frame,
        completed: state.simulation_done.load(Ordering::SeqCst),
    })
}

#[derive(Serialize)]
struct FramesResponse {
    scenario: String,
    total_years: u32,
    completed: bool,
    frames: Vec<UiFrame>,
}

async fn all_frames(State(state): State<Arc<AppState>>) -> Json<FramesResponse> {
    let frames = state.frames.lock().expect("frames lock poisoned").clone();
    Json(FramesResponse {
        scenario: state.scenario_name.clone(),
        total_years: state.total_years,
        completed: state.simulation_done.load(Ordering::SeqCst),
        frames,
    })
}

async fn stream_events(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.broadcaster.subscribe();
    // Lagging subscribers skip what they missed.
    let stream = BroadcastStream::new(rx).filter_map(|msg| match msg {
        Ok(payload) => Some(Ok(Event::default().data(payload))),
        Err(_) => None,
    });
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(2))
            .text("keep-alive"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::{LocationId, VictimId};

    #[test]
    fn observer_publishes_tagged_events() {
        let (tx, mut rx) = broadcast::channel(8);
        let mut observer = BroadcastObserver::new(tx);
        observer.on_event(&SimEvent::Created {
            victim: VictimId::new(7),
            location: LocationId::new(1),
        });

        let message = rx.try_recv().unwrap();
        let payload: serde_json::Value = serde_json::from_str(&message).unwrap();
        assert_eq!(payload["type"], "event");
        assert_eq!(payload["data"]["kind"], "created");
        assert_eq!(payload["data"]["victim"], 7);
        assert_eq!(payload["data"]["location"], 1);
    }

    #[test]
    fn final_frame_replaces_the_last_year() {
        let latest = Mutex::new(None);
        let frames = Mutex::new(Vec::new());
        let world = crate::world::World::new(2013, 1, Default::default());
        let mut frame = UiFrame {
            snapshot: world.snapshot("web", 0.5),
            completed: false,
        };
        record_frame(&latest, &frames, &frame, false);
        frame.completed = true;
        record_frame(&latest, &frames, &frame, true);

        let frames = frames.into_inner().unwrap();
        assert_eq!(frames.len(), 1);
        assert!(frames[0].completed);
        assert!(latest.into_inner().unwrap().unwrap().completed);
    }
}
