use tempfile::tempdir;
use trafficking_sim::{
    engine::{EngineBuilder, EngineSettings},
    scenario::ScenarioLoader,
};

#[test]
fn engine_runs_hook_each_year() {
    let loader = ScenarioLoader::new(env!("CARGO_MANIFEST_DIR"));
    let scenario = loader
        .load("scenarios/south_asia.yaml")
        .expect("scenario should load");
    let mut world = scenario.build_world().expect("world should build");
    let temp = tempdir().expect("tempdir");
    let settings = EngineSettings {
        scenario_name: scenario.name.clone(),
        snapshot_interval_years: 0,
        snapshot_dir: temp.path().to_path_buf(),
        age_dump_dir: None,
    };
    let mut engine = EngineBuilder::new(settings).build();

    let mut years = Vec::new();
    let mut times = Vec::new();
    engine
        .run_with_hook(&mut world, 6, |snapshot| {
            years.push(snapshot.year);
            times.push(snapshot.sim_time);
        })
        .expect("run succeeds");

    assert_eq!(years.len(), 6);
    assert_eq!(years.first().copied(), Some(2013));
    assert_eq!(years.last().copied(), Some(2018));
    assert_eq!(world.year(), 2019);
    for (k, time) in times.iter().enumerate() {
        let expected = k as f64 + 364.0 / 365.0;
        let drift = (time - expected).abs();
        assert!(drift < 1e-9, "year end {k} fired at {time}");
    }
}
