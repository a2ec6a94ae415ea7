pub mod engine;
pub mod error;
pub mod events;
pub mod location;
pub mod network;
pub mod params;
pub mod rng;
pub mod route;
pub mod scenario;
pub mod scheduler;
pub mod snapshot;
pub mod victim;
pub mod web;
pub mod world;

pub use engine::{Engine, EngineBuilder, EngineSettings, RunSummary};
pub use error::{NetworkError, SimError, SnapshotError};
pub use events::{EventRecorder, Observer, SimEvent};
pub use scenario::{Scenario, ScenarioLoader};
pub use world::{LocationId, RouteId, VictimId, World, WorldSnapshot};
