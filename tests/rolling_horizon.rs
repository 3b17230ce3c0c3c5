//! End-to-end rolling-horizon runs against the microlp backend.
//!
//! The full 24-hour demo community is slow in debug builds and is ignored by default:
//! ```bash
//! cargo test --release --test rolling_horizon -- --ignored
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use microgrid_dispatch::controller::{CoordinatorSettings, ReschedulingCoordinator, RollingResult};
use microgrid_dispatch::domain::TimeHorizon;
use microgrid_dispatch::optimizer::{LocalSettings, MicroLpSolver};
use microgrid_dispatch::scenario::{CommunitySnapshot, FeedError, ProfileFeed, Scenario};
use microgrid_dispatch::{RunStatus, ScheduleError, Stage};
use tokio_util::sync::CancellationToken;

const TOL: f64 = 1e-5;

const COMMUNITY: &str = r#"
    [dso.generator]
    marginal_cost = [152.0, 152.0, 152.0, 152.0]
    min_output_kw = 0.0
    max_output_kw = 200.0

    [dso.tariff]
    buy_price = [155.0, 155.0, 155.0, 155.0]
    sell_price = [152.5, 152.5, 152.5, 152.5]

    [dso.battery]
    capacity_kwh = 500.0
    charge_loss = 0.03
    discharge_loss = 0.03
    converter_limit_kw = 100.0
    efficiency = 0.98
    self_discharge = 0.03
    initial_soc = 0.3

    [[microgrids]]
    id = "mg1"
    pv_forecast_kw = [0.0, 40.0, 80.0, 20.0]
    wind_forecast_kw = [5.0, 5.0, 0.0, 0.0]
    fixed_load_kw = [120.0, 160.0, 180.0, 140.0]

    [[microgrids.generators]]
    marginal_cost = [140.0, 150.0, 160.0, 145.0]
    startup_cost = 20.0
    min_output_kw = 10.0
    max_output_kw = 150.0

    [microgrids.battery]
    capacity_kwh = 100.0
    charge_loss = 0.03
    discharge_loss = 0.03
    converter_limit_kw = 40.0
    efficiency = 0.98
    self_discharge = 0.03
    initial_soc = 0.5

    [microgrids.tariff]
    buy_price = [155.0, 155.0, 155.0, 155.0]
    sell_price = [152.5, 152.5, 152.5, 152.5]

    [microgrids.load_shift]
    inflow_cap_kw = [20.0, 20.0, 0.0, 20.0]
    outflow_cap_kw = [0.0, 20.0, 20.0, 0.0]

    [[microgrids]]
    id = "mg2"
    pv_forecast_kw = [0.0, 60.0, 90.0, 10.0]
    wind_forecast_kw = [0.0, 0.0, 0.0, 0.0]
    fixed_load_kw = [90.0, 100.0, 110.0, 95.0]

    [[microgrids.generators]]
    marginal_cost = [150.0, 154.0, 158.0, 151.0]
    startup_cost = 20.0
    min_output_kw = 0.0
    max_output_kw = 60.0

    [[microgrids.generators]]
    marginal_cost = [165.0, 165.0, 165.0, 165.0]
    startup_cost = 50.0
    min_output_kw = 0.0
    max_output_kw = 40.0

    [microgrids.tariff]
    buy_price = [155.0, 155.0, 155.0, 155.0]
    sell_price = [152.5, 152.5, 152.5, 152.5]
    import_limit_kw = 500.0

    [microgrids.load_shift]
    inflow_cap_kw = [0.0, 0.0, 0.0, 0.0]
    outflow_cap_kw = [0.0, 0.0, 0.0, 0.0]
"#;

/// One microgrid whose full battery is far cheaper than its own generator.
const BATTERY_BACKED: &str = r#"
    [dso.generator]
    marginal_cost = [152.0, 152.0]
    min_output_kw = 0.0
    max_output_kw = 0.0

    [dso.tariff]
    buy_price = [155.0, 155.0]
    sell_price = [152.5, 152.5]

    [[microgrids]]
    id = "mg-stored"
    pv_forecast_kw = [0.0, 0.0]
    wind_forecast_kw = [0.0, 0.0]
    fixed_load_kw = [50.0, 50.0]

    [[microgrids.generators]]
    marginal_cost = [500.0, 500.0]
    startup_cost = 0.0
    min_output_kw = 0.0
    max_output_kw = 100.0

    [microgrids.battery]
    capacity_kwh = 200.0
    charge_loss = 0.0
    discharge_loss = 0.0
    converter_limit_kw = 40.0
    efficiency = 1.0
    self_discharge = 0.0
    initial_soc = 1.0

    [microgrids.tariff]
    buy_price = [155.0, 155.0]
    sell_price = [152.5, 152.5]

    [microgrids.load_shift]
    inflow_cap_kw = [0.0, 0.0]
    outflow_cap_kw = [0.0, 0.0]
"#;

fn coordinator() -> ReschedulingCoordinator {
    ReschedulingCoordinator::new(
        Arc::new(MicroLpSolver),
        LocalSettings::default(),
        CoordinatorSettings::default(),
    )
}

fn assert_balanced(scenario: &Scenario, result: &RollingResult) {
    for profile in scenario.microgrids() {
        let series = result.series(&profile.id).expect("series per microgrid");
        assert_eq!(series.load_kw.len(), result.completed_hours());
        for hour in 0..result.completed_hours() {
            let supplied = series.generation_kw[hour]
                + profile.renewable_kw(hour)
                + series.battery_kw[hour]
                + series.utility_kw[hour]
                + series.community_kw[hour];
            assert!(
                (supplied - series.load_kw[hour]).abs() < TOL,
                "{} unbalanced at hour {hour}: {supplied} vs {}",
                profile.id,
                series.load_kw[hour]
            );
        }
    }
}

/// What the microgrids exchange with the community must equal what the DSO
/// generator and the shared battery put on the community bus.
fn assert_community_balanced(result: &RollingResult) {
    assert_eq!(result.community_battery_kw.len(), result.completed_hours());
    for hour in 0..result.completed_hours() {
        let drawn: f64 = result
            .microgrids
            .iter()
            .map(|series| series.community_kw[hour])
            .sum();
        let supplied = result.community_output_kw[hour] + result.community_battery_kw[hour];
        assert!(
            (drawn - supplied).abs() < TOL,
            "community unbalanced at hour {hour}: microgrids draw {drawn}, DSO supplies {supplied}"
        );
    }
}

#[tokio::test]
async fn test_community_run_keeps_every_hour_balanced() {
    let scenario = Scenario::from_toml_str(COMMUNITY).unwrap();

    let result = coordinator()
        .run(&scenario, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(result.completed_hours(), 4);
    assert_eq!(result.horizon, 4);
    assert!(result.finished_at.is_some());
    assert_balanced(&scenario, &result);
    assert_community_balanced(&result);
    for output in &result.community_output_kw {
        assert!((-TOL..=200.0 + TOL).contains(output));
    }
}

#[tokio::test]
async fn test_local_battery_discharge_is_not_bought_twice() {
    let scenario = Scenario::from_toml_str(BATTERY_BACKED).unwrap();

    let result = coordinator()
        .run(&scenario, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.status, RunStatus::Completed);
    assert_balanced(&scenario, &result);
    assert_community_balanced(&result);
    let series = result.series("mg-stored").unwrap();
    for hour in 0..2 {
        assert!((series.battery_kw[hour] - 40.0).abs() < TOL);
        assert!((series.utility_kw[hour] - 10.0).abs() < TOL);
        assert!(series.community_kw[hour].abs() < TOL);
        assert!(result.community_battery_kw[hour].abs() < TOL);
    }
}

#[tokio::test]
async fn test_result_round_trips_through_json_file() {
    let scenario = Scenario::from_toml_str(COMMUNITY).unwrap();
    let result = coordinator()
        .run(&scenario, CancellationToken::new())
        .await
        .unwrap();

    let path = std::env::temp_dir().join(format!("rolling-{}.json", result.run_id));
    result.write_json(&path).unwrap();
    let raw = std::fs::read_to_string(&path).unwrap();
    std::fs::remove_file(&path).ok();

    let parsed: RollingResult = serde_json::from_str(&raw).unwrap();
    assert_eq!(parsed.run_id, result.run_id);
    assert_eq!(parsed.status, RunStatus::Completed);
    assert_eq!(parsed.microgrids.len(), 2);
}

/// Wraps a scenario and cancels the run once a given hour is requested.
struct CancellingFeed {
    inner: Scenario,
    cancel_at: usize,
    token: CancellationToken,
}

#[async_trait]
impl ProfileFeed for CancellingFeed {
    fn horizon(&self) -> TimeHorizon {
        self.inner.horizon()
    }

    async fn snapshot(&self, hour: usize) -> Result<CommunitySnapshot, FeedError> {
        if hour == self.cancel_at {
            self.token.cancel();
        }
        self.inner.snapshot(hour).await
    }
}

#[tokio::test]
async fn test_cancellation_discards_hour_in_flight() {
    let token = CancellationToken::new();
    let feed = CancellingFeed {
        inner: Scenario::from_toml_str(COMMUNITY).unwrap(),
        cancel_at: 2,
        token: token.clone(),
    };

    let result = coordinator().run(&feed, token).await.unwrap();

    assert_eq!(result.status, RunStatus::Cancelled { at_hour: 2 });
    assert_eq!(result.completed_hours(), 2);
    assert_balanced(&feed.inner, &result);
    assert_community_balanced(&result);
}

/// Feed whose forecasts go missing after the first hour.
struct FlakyFeed {
    inner: Scenario,
}

#[async_trait]
impl ProfileFeed for FlakyFeed {
    fn horizon(&self) -> TimeHorizon {
        self.inner.horizon()
    }

    async fn snapshot(&self, hour: usize) -> Result<CommunitySnapshot, FeedError> {
        if hour > 0 {
            return Err(FeedError::HourOutOfRange { hour, slots: 1 });
        }
        self.inner.snapshot(hour).await
    }
}

#[tokio::test]
async fn test_feed_failure_stops_the_run() {
    let feed = FlakyFeed {
        inner: Scenario::from_toml_str(COMMUNITY).unwrap(),
    };

    let err = coordinator()
        .run(&feed, CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ScheduleError::Feed { .. }));
    assert_eq!(err.context().stage, Stage::Feed);
    assert_eq!(err.context().hour, 1);
}

#[tokio::test]
#[ignore = "24-hour, three-microgrid community; run with --release"]
async fn test_demo_community_day() {
    let scenario = Scenario::load("demos/community.toml").unwrap();
    assert_eq!(scenario.horizon(), TimeHorizon::day_ahead());

    let result = coordinator()
        .run(&scenario, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(result.microgrids.len(), 3);
    assert_balanced(&scenario, &result);
    assert_community_balanced(&result);
}
