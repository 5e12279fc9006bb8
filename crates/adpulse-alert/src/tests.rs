use crate::catalog::{default_monitors, FormulaMetric};
use crate::engine::MonitorEngine;
use crate::error::EvaluationError;
use crate::evaluator::{MonitorEvaluator, Transition};
use crate::impact::estimate_impact;
use crate::lifecycle::{alarm_summary, AlarmLifecycle};
use crate::threshold::{anomaly_score, deviation, is_breaching, severity_for};
use crate::window::SampleWindow;
use crate::{DimensionObservation, MetricSnapshot, MetricSource};
use adpulse_ai::{HeuristicInsightGenerator, InsightGenerator, InsightRequest};
use adpulse_common::types::{
    Alarm, AlarmState, Campaign, ImpactRule, Insights, MetricCategory, MetricRef, Monitor,
    MonitorKind, MonitorState, MonitorStatus, ResolutionMethod, Sensitivity, Severity,
};
use adpulse_storage::memory::MemoryRecordStore;
use adpulse_storage::{AlarmFilter, RecordStore};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};

#[derive(Default)]
struct FakeSource {
    values: Mutex<HashMap<String, (f64, f64)>>,
    history: Mutex<HashMap<String, Vec<f64>>>,
    dimensions: Mutex<HashMap<(String, String), Vec<DimensionObservation>>>,
    failing: Mutex<HashSet<String>>,
}

impl FakeSource {
    fn set(&self, metric: &str, current: f64, expected: f64) {
        self.values
            .lock()
            .unwrap()
            .insert(metric.to_string(), (current, expected));
    }

    fn set_history(&self, metric: &str, history: Vec<f64>) {
        self.history
            .lock()
            .unwrap()
            .insert(metric.to_string(), history);
    }

    fn set_dimension(&self, metric: &str, dimension: &str, obs: Vec<(&str, f64, f64)>) {
        let obs = obs
            .into_iter()
            .map(|(label, current, expected)| DimensionObservation {
                value_label: label.to_string(),
                current,
                expected,
            })
            .collect();
        self.dimensions
            .lock()
            .unwrap()
            .insert((metric.to_string(), dimension.to_string()), obs);
    }

    fn fail(&self, metric: &str) {
        self.failing.lock().unwrap().insert(metric.to_string());
    }

    fn lookup(&self, metric: &str) -> Result<(f64, f64)> {
        if self.failing.lock().unwrap().contains(metric) {
            anyhow::bail!("metric feed for {metric} is offline");
        }
        self.values
            .lock()
            .unwrap()
            .get(metric)
            .copied()
            .ok_or_else(|| anyhow::anyhow!("no data for {metric}"))
    }
}

impl MetricSource for FakeSource {
    fn current_value(&self, _campaign: &Campaign, metric_id: &str) -> Result<f64> {
        Ok(self.lookup(metric_id)?.0)
    }

    fn expected_value(&self, _campaign: &Campaign, metric_id: &str) -> Result<f64> {
        Ok(self.lookup(metric_id)?.1)
    }

    fn historical_samples(
        &self,
        _campaign: &Campaign,
        metric_id: &str,
        count: usize,
    ) -> Result<Vec<f64>> {
        let history = self
            .history
            .lock()
            .unwrap()
            .get(metric_id)
            .cloned()
            .unwrap_or_default();
        let skip = history.len().saturating_sub(count);
        Ok(history[skip..].to_vec())
    }

    fn dimension_breakdown(
        &self,
        _campaign: &Campaign,
        metric_id: &str,
        dimension: &str,
    ) -> Result<Vec<DimensionObservation>> {
        self.dimensions
            .lock()
            .unwrap()
            .get(&(metric_id.to_string(), dimension.to_string()))
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no breakdown by {dimension}"))
    }
}

fn campaign() -> Campaign {
    Campaign {
        id: "c-1".into(),
        name: "Summer Sale".into(),
        daily_budget: 1000.0,
        sensitivity: Sensitivity::Balanced,
    }
}

fn monitor(id: &str, metric_id: &str, kind: MonitorKind) -> Monitor {
    let now = Utc::now();
    Monitor {
        id: id.to_string(),
        campaign_id: "c-1".to_string(),
        metric: MetricRef {
            id: metric_id.to_string(),
            name: metric_id.to_uppercase(),
            category: MetricCategory::Cost,
        },
        kind,
        sensitivity: Sensitivity::Balanced,
        enabled: true,
        impact_rule: ImpactRule::for_metric(metric_id),
        created_at: now,
        updated_at: now,
    }
}

fn at(secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap() + Duration::seconds(secs)
}

fn setup() -> (Arc<MemoryRecordStore>, Arc<FakeSource>, MonitorEngine) {
    let store = Arc::new(MemoryRecordStore::new());
    let source = Arc::new(FakeSource::default());
    let engine = MonitorEngine::new(store.clone(), source.clone());
    (store, source, engine)
}

fn active_alarms(store: &MemoryRecordStore, monitor_id: &str) -> Vec<Alarm> {
    store
        .list_alarms(&AlarmFilter::active_for_monitor(monitor_id))
        .unwrap()
}

// ---- threshold & severity ----

#[test]
fn breach_requires_deviation_strictly_above_tolerance() {
    assert!(is_breaching(126.0, 100.0, Sensitivity::Balanced));
    assert!(!is_breaching(124.0, 100.0, Sensitivity::Balanced));
    assert!(is_breaching(74.0, 100.0, Sensitivity::Balanced));

    assert!(is_breaching(116.0, 100.0, Sensitivity::Strict));
    assert!(!is_breaching(114.0, 100.0, Sensitivity::Strict));
    assert!(!is_breaching(139.0, 100.0, Sensitivity::Loose));
    assert!(is_breaching(141.0, 100.0, Sensitivity::Loose));
}

#[test]
fn zero_baseline_never_breaches() {
    assert_eq!(deviation(50.0, 0.0), 0.0);
    assert!(!is_breaching(50.0, 0.0, Sensitivity::Strict));
}

#[test]
fn severity_lower_bounds_are_inclusive() {
    assert_eq!(severity_for(59.9), Severity::High);
    assert_eq!(severity_for(60.0), Severity::Critical);
    assert_eq!(severity_for(39.9), Severity::Medium);
    assert_eq!(severity_for(40.0), Severity::High);
    assert_eq!(severity_for(25.0), Severity::Medium);
    assert_eq!(severity_for(24.9), Severity::Low);
    assert_eq!(severity_for(-75.0), Severity::Critical);
}

#[test]
fn anomaly_score_is_relative_to_tolerance() {
    assert_eq!(anomaly_score(40.0, Sensitivity::Loose), 1.0);
    assert!(anomaly_score(-50.0, Sensitivity::Balanced) > 1.0);
    assert!(anomaly_score(10.0, Sensitivity::Balanced) < 1.0);
}

#[test]
fn impact_is_never_negative() {
    let rules = [
        ImpactRule::CostRising,
        ImpactRule::EfficiencyFalling,
        ImpactRule::VolumeFalling,
        ImpactRule::Spend,
        ImpactRule::InvalidTrafficRising,
        ImpactRule::Unclassified,
    ];
    for rule in rules {
        for dev in [-95.0, -40.0, -0.5, 0.0, 0.5, 40.0, 250.0] {
            let impact = estimate_impact(rule, 1000.0, dev).unwrap();
            assert!(impact >= 0.0, "{rule:?} at {dev}% gave {impact}");
        }
    }
    assert_eq!(estimate_impact(ImpactRule::Spend, -10.0, 40.0), None);
    assert_eq!(estimate_impact(ImpactRule::Spend, 1000.0, f64::NAN), None);
}

#[test]
fn impact_follows_metric_economics() {
    assert_eq!(estimate_impact(ImpactRule::CostRising, 1000.0, -40.0), Some(0.0));
    assert_eq!(estimate_impact(ImpactRule::VolumeFalling, 1000.0, -50.0), Some(150.0));
    assert_eq!(estimate_impact(ImpactRule::VolumeFalling, 1000.0, 50.0), Some(0.0));
    assert_eq!(estimate_impact(ImpactRule::Spend, 1000.0, -30.0), Some(300.0));
    assert_eq!(estimate_impact(ImpactRule::Unclassified, 1000.0, 50.0), Some(100.0));
    assert_eq!(estimate_impact(ImpactRule::CostRising, 0.0, 40.0), Some(0.0));
}

// ---- evaluator ----

#[test]
fn composite_fires_on_two_of_three_breaches() {
    let source = FakeSource::default();
    let m = monitor(
        "m-cpa",
        "cpa",
        MonitorKind::Composite {
            required_breaches: 2,
            window: 3,
        },
    );

    // [breach, ok, breach]
    source.set_history("cpa", vec![130.0, 100.0]);
    source.set("cpa", 130.0, 100.0);
    let eval = MonitorEvaluator::new(&source)
        .evaluate(&m, &campaign(), None, at(0))
        .unwrap();
    assert_eq!(eval.state.status, MonitorStatus::InAlarm);
    assert_eq!(eval.state.breach_count, Some(2));
    assert_eq!(eval.transition, Transition::Triggered);

    // [breach, ok, ok]
    source.set("cpa", 100.0, 100.0);
    let eval = MonitorEvaluator::new(&source)
        .evaluate(&m, &campaign(), None, at(0))
        .unwrap();
    assert_eq!(eval.state.status, MonitorStatus::Ok);
    assert_eq!(eval.state.breach_count, Some(1));
    assert_eq!(eval.transition, Transition::Steady);
}

#[test]
fn sample_window_keeps_only_the_latest_samples() {
    let window = SampleWindow::from_history(&[130.0, 130.0, 130.0, 100.0], 100.0, 3);
    assert_eq!(window.len(), 3);
    assert_eq!(
        window.breach_pattern(100.0, Sensitivity::Balanced),
        vec![true, false, false]
    );
    assert_eq!(window.breach_count(100.0, Sensitivity::Balanced), 1);
}

#[test]
fn granular_attaches_dimension_results_without_driving_status() {
    let source = FakeSource::default();
    let m = monitor(
        "m-ctr",
        "ctr",
        MonitorKind::Granular {
            dimensions: vec!["device".into(), "geography".into()],
        },
    );
    source.set("ctr", 2.4, 2.5);
    source.set_dimension(
        "ctr",
        "device",
        vec![("desktop", 2.6, 2.5), ("mobile", 1.0, 2.5)],
    );

    let eval = MonitorEvaluator::new(&source)
        .evaluate(&m, &campaign(), None, at(0))
        .unwrap();
    assert_eq!(eval.state.status, MonitorStatus::Ok);
    // geography breakdown is unavailable and skipped
    assert_eq!(eval.state.dimensions.len(), 2);
    let mobile = &eval.state.dimensions[1];
    assert_eq!(mobile.dimension, "device");
    assert_eq!(mobile.value_label, "mobile");
    assert!(mobile.breached);
    assert!(!eval.state.dimensions[0].breached);
}

#[test]
fn invalid_composite_config_is_rejected() {
    let source = FakeSource::default();
    source.set("cpa", 130.0, 100.0);
    for (required, window) in [(2, 0), (0, 3), (4, 3)] {
        let m = monitor(
            "m-bad",
            "cpa",
            MonitorKind::Composite {
                required_breaches: required,
                window,
            },
        );
        let err = MonitorEvaluator::new(&source)
            .evaluate(&m, &campaign(), None, at(0))
            .unwrap_err();
        assert!(matches!(err, EvaluationError::InvalidConfig { .. }));
    }
}

// ---- engine & lifecycle ----

#[test]
fn cpa_scenario_opens_high_alarm_worth_400() {
    let (store, source, engine) = setup();
    let m = monitor("m-cpa", "cpa", MonitorKind::Simple);
    source.set("cpa", 42.0, 30.0);

    let outcome = engine.evaluate_monitor_at(&m, &campaign(), at(0)).unwrap();
    let alarm = outcome.alarm.unwrap();
    assert_eq!(alarm.deviation_percent, 40.0);
    assert_eq!(alarm.severity, Severity::High);
    assert_eq!(alarm.estimated_impact_usd, Some(400.0));
    assert_eq!(alarm.state, AlarmState::Active);
    assert_eq!(alarm.triggered_at, outcome.state.entered_state_at);
    assert_eq!(alarm.campaign_name, "Summer Sale");
    assert!(alarm.insights.is_none());
    assert_eq!(store.get_alarm(&alarm.id).unwrap(), Some(alarm));
}

#[test]
fn ctr_scenario_opens_high_alarm_worth_250() {
    let (_store, source, engine) = setup();
    let m = monitor("m-ctr", "ctr", MonitorKind::Simple);
    source.set("ctr", 1.25, 2.5);

    let alarm = engine
        .evaluate_monitor_at(&m, &campaign(), at(0))
        .unwrap()
        .alarm
        .unwrap();
    assert_eq!(alarm.deviation_percent, -50.0);
    assert_eq!(alarm.severity, Severity::High);
    assert_eq!(alarm.estimated_impact_usd, Some(250.0));
}

#[test]
fn zero_budget_campaign_alarm_reports_zero_impact() {
    let (_store, source, engine) = setup();
    let m = monitor("m-cpa", "cpa", MonitorKind::Simple);
    source.set("cpa", 42.0, 30.0);
    let paused = Campaign {
        daily_budget: 0.0,
        ..campaign()
    };

    let alarm = engine
        .evaluate_monitor_at(&m, &paused, at(0))
        .unwrap()
        .alarm
        .unwrap();
    assert_eq!(alarm.estimated_impact_usd, Some(0.0));
}

/// Answers only whole snapshots; the individual reads always fail.
struct SnapshotSource {
    snapshot: MetricSnapshot,
}

impl MetricSource for SnapshotSource {
    fn current_value(&self, _campaign: &Campaign, _metric_id: &str) -> Result<f64> {
        anyhow::bail!("individual reads are not consistent")
    }

    fn expected_value(&self, _campaign: &Campaign, _metric_id: &str) -> Result<f64> {
        anyhow::bail!("individual reads are not consistent")
    }

    fn historical_samples(
        &self,
        _campaign: &Campaign,
        _metric_id: &str,
        _count: usize,
    ) -> Result<Vec<f64>> {
        anyhow::bail!("individual reads are not consistent")
    }

    fn snapshot(
        &self,
        _campaign: &Campaign,
        _metric_id: &str,
        history_len: usize,
    ) -> Result<MetricSnapshot> {
        assert_eq!(history_len, 2);
        Ok(self.snapshot.clone())
    }
}

#[test]
fn evaluation_reads_one_snapshot_per_monitor() {
    let source = SnapshotSource {
        snapshot: MetricSnapshot {
            current: 42.0,
            expected: 30.0,
            history: vec![40.0, 31.0],
        },
    };
    let m = monitor(
        "m-cpa",
        "cpa",
        MonitorKind::Composite {
            required_breaches: 2,
            window: 3,
        },
    );

    let eval = MonitorEvaluator::new(&source)
        .evaluate(&m, &campaign(), None, at(0))
        .unwrap();
    assert_eq!(eval.state.current_value, 42.0);
    assert_eq!(eval.state.expected_value, 30.0);
    assert_eq!(eval.state.breach_count, Some(2));
    assert_eq!(eval.state.status, MonitorStatus::InAlarm);
}

#[test]
fn concurrent_evaluations_never_open_two_active_alarms() {
    let (store, source, engine) = setup();
    let m = monitor("m-cpa", "cpa", MonitorKind::Simple);
    source.set("cpa", 42.0, 30.0);
    let done = AtomicBool::new(false);
    let max_active = AtomicUsize::new(0);

    std::thread::scope(|scope| {
        scope.spawn(|| {
            while !done.load(Ordering::Acquire) {
                let active = active_alarms(&store, "m-cpa").len();
                max_active.fetch_max(active, Ordering::AcqRel);
            }
        });

        let workers: Vec<_> = (0..8usize)
            .map(|t| {
                let (engine, source, m) = (&engine, &source, &m);
                scope.spawn(move || {
                    for i in 0..200usize {
                        // flap between breaching and healthy
                        if (i + t) % 2 == 0 {
                            source.set("cpa", 42.0, 30.0);
                        } else {
                            source.set("cpa", 30.0, 30.0);
                        }
                        engine.evaluate_monitor(m, &campaign()).unwrap();
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }
        done.store(true, Ordering::Release);
    });

    assert!(max_active.load(Ordering::Acquire) <= 1);
    assert!(active_alarms(&store, "m-cpa").len() <= 1);
    let all = store.list_alarms(&AlarmFilter::default()).unwrap();
    assert!(!all.is_empty());
    assert!(all
        .iter()
        .filter(|a| a.state != AlarmState::Active)
        .all(|a| a.resolution_method == Some(ResolutionMethod::AutoResolved)));
}

#[test]
fn user_resolve_racing_evaluations_keeps_one_alarm() {
    let (store, source, engine) = setup();
    let m = monitor("m-cpa", "cpa", MonitorKind::Simple);
    source.set("cpa", 42.0, 30.0);
    let start = Barrier::new(6);

    std::thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                start.wait();
                for _ in 0..100 {
                    engine.evaluate_monitor(&m, &campaign()).unwrap();
                }
            });
        }
        for _ in 0..2 {
            scope.spawn(|| {
                start.wait();
                for _ in 0..200 {
                    for alarm in active_alarms(&store, "m-cpa") {
                        engine
                            .resolve_alarm(&alarm.id, ResolutionMethod::UserAction)
                            .unwrap();
                    }
                }
            });
        }
    });

    // the metric never recovers, so only the first evaluation triggers
    let all = store.list_alarms(&AlarmFilter::default()).unwrap();
    assert_eq!(all.len(), 1);
    let alarm = &all[0];
    assert!(
        alarm.state == AlarmState::Active
            || alarm.resolution_method == Some(ResolutionMethod::UserAction)
    );
}

#[test]
fn repeated_breaches_keep_a_single_active_alarm() {
    let (store, source, engine) = setup();
    let m = monitor("m-cpa", "cpa", MonitorKind::Simple);
    source.set("cpa", 42.0, 30.0);

    let first = engine.evaluate_monitor_at(&m, &campaign(), at(0)).unwrap();
    assert!(first.alarm.is_some());

    // deeper anomaly, still InAlarm: no second alarm
    source.set("cpa", 60.0, 30.0);
    for i in 1..4 {
        let outcome = engine.evaluate_monitor_at(&m, &campaign(), at(i * 60)).unwrap();
        assert_eq!(outcome.transition, Transition::Steady);
        assert!(outcome.alarm.is_none());
    }
    assert_eq!(active_alarms(&store, "m-cpa").len(), 1);
}

#[test]
fn open_skips_monitor_with_existing_active_alarm() {
    let (store, source, engine) = setup();
    let m = monitor("m-cpa", "cpa", MonitorKind::Simple);
    source.set("cpa", 42.0, 30.0);
    let outcome = engine.evaluate_monitor_at(&m, &campaign(), at(0)).unwrap();

    let lifecycle = AlarmLifecycle::new(store.clone());
    let again = lifecycle
        .open(&m, &campaign(), &outcome.state, at(30))
        .unwrap();
    assert!(again.is_none());
    assert_eq!(active_alarms(&store, "m-cpa").len(), 1);
}

#[test]
fn recovery_auto_resolves_every_active_alarm() {
    let (store, source, engine) = setup();
    let m = monitor("m-cpa", "cpa", MonitorKind::Simple);
    source.set("cpa", 42.0, 30.0);
    let opened = engine
        .evaluate_monitor_at(&m, &campaign(), at(0))
        .unwrap()
        .alarm
        .unwrap();

    // a stray Active alarm left behind by an older writer
    let mut stray = opened.clone();
    stray.id = "stray".into();
    store.put_alarm(&stray).unwrap();

    source.set("cpa", 31.0, 30.0);
    let outcome = engine.evaluate_monitor_at(&m, &campaign(), at(300)).unwrap();
    assert_eq!(outcome.transition, Transition::Recovered);
    assert_eq!(outcome.resolved.len(), 2);

    assert!(active_alarms(&store, "m-cpa").is_empty());
    for id in [opened.id.as_str(), "stray"] {
        let alarm = store.get_alarm(id).unwrap().unwrap();
        assert_eq!(alarm.state, AlarmState::Resolved);
        assert_eq!(alarm.resolution_method, Some(ResolutionMethod::AutoResolved));
        assert_eq!(alarm.resolved_at, Some(at(300)));
    }
}

#[test]
fn entered_state_at_changes_only_on_transition() {
    let (store, source, engine) = setup();
    let m = monitor("m-cpa", "cpa", MonitorKind::Simple);
    source.set("cpa", 42.0, 30.0);

    engine.evaluate_monitor_at(&m, &campaign(), at(0)).unwrap();
    source.set("cpa", 45.0, 30.0);
    let stable = engine.evaluate_monitor_at(&m, &campaign(), at(60)).unwrap();
    assert_eq!(stable.state.entered_state_at, at(0));
    assert_eq!(stable.state.evaluated_at, at(60));

    source.set("cpa", 30.0, 30.0);
    let recovered = engine.evaluate_monitor_at(&m, &campaign(), at(120)).unwrap();
    assert_eq!(recovered.state.entered_state_at, at(120));

    let stored = store.get_monitor_state("m-cpa").unwrap().unwrap();
    assert_eq!(stored.status, MonitorStatus::Ok);
    assert_eq!(stored.entered_state_at, at(120));
}

#[test]
fn first_evaluation_into_ok_does_not_trigger() {
    let (store, source, engine) = setup();
    let m = monitor("m-cpa", "cpa", MonitorKind::Simple);
    source.set("cpa", 30.0, 30.0);

    let outcome = engine.evaluate_monitor_at(&m, &campaign(), at(0)).unwrap();
    assert_eq!(outcome.transition, Transition::Steady);
    assert_eq!(outcome.state.entered_state_at, at(0));
    assert!(store.list_alarms(&AlarmFilter::default()).unwrap().is_empty());
}

#[test]
fn dismiss_twice_keeps_original_resolved_at() {
    let (store, source, engine) = setup();
    let m = monitor("m-cpa", "cpa", MonitorKind::Simple);
    source.set("cpa", 42.0, 30.0);
    let alarm = engine
        .evaluate_monitor_at(&m, &campaign(), at(0))
        .unwrap()
        .alarm
        .unwrap();

    let lifecycle = AlarmLifecycle::new(store.clone());
    let first = lifecycle.dismiss(&alarm.id, at(60)).unwrap();
    assert!(first.changed());
    assert_eq!(first.alarm().state, AlarmState::Dismissed);
    assert_eq!(first.alarm().resolution_method, Some(ResolutionMethod::Dismissed));

    let second = lifecycle.dismiss(&alarm.id, at(120)).unwrap();
    assert!(!second.changed());

    let resolve = engine
        .resolve_alarm(&alarm.id, ResolutionMethod::UserAction)
        .unwrap();
    assert!(!resolve.changed());

    let stored = store.get_alarm(&alarm.id).unwrap().unwrap();
    assert_eq!(stored.state, AlarmState::Dismissed);
    assert_eq!(stored.resolved_at, Some(at(60)));
}

#[test]
fn user_resolve_closes_active_alarm() {
    let (store, source, engine) = setup();
    let m = monitor("m-cpa", "cpa", MonitorKind::Simple);
    source.set("cpa", 42.0, 30.0);
    let alarm = engine
        .evaluate_monitor_at(&m, &campaign(), at(0))
        .unwrap()
        .alarm
        .unwrap();

    let update = engine
        .resolve_alarm(&alarm.id, ResolutionMethod::UserAction)
        .unwrap();
    assert!(update.changed());
    let resolved = update.into_alarm();
    assert_eq!(resolved.state, AlarmState::Resolved);
    assert_eq!(resolved.resolution_method, Some(ResolutionMethod::UserAction));
    assert!(resolved.resolved_at.is_some());
    assert!(active_alarms(&store, "m-cpa").is_empty());

    // still breaching: InAlarm -> InAlarm does not reopen
    let outcome = engine.evaluate_monitor_at(&m, &campaign(), at(60)).unwrap();
    assert!(outcome.alarm.is_none());
}

#[test]
fn unknown_alarm_is_not_found() {
    let (_store, _source, engine) = setup();
    let err = engine.dismiss_alarm("nope").unwrap_err();
    assert!(matches!(err, EvaluationError::AlarmNotFound(id) if id == "nope"));
}

#[test]
fn source_failure_is_isolated_and_keeps_prior_state() {
    let (store, source, engine) = setup();
    let cpa = monitor("m-cpa", "cpa", MonitorKind::Simple);
    let cpc = monitor("m-cpc", "cpc", MonitorKind::Simple);
    source.set("cpa", 42.0, 30.0);
    source.set("cpc", 1.0, 1.0);

    let first = engine.evaluate_all_at(&campaign(), &[cpa.clone(), cpc.clone()], at(0));
    assert_eq!(first.evaluated, 2);
    assert_eq!(first.new_alarms.len(), 1);

    source.fail("cpa");
    source.set("cpc", 2.0, 1.0);
    let second = engine.evaluate_all_at(&campaign(), &[cpa, cpc], at(60));
    assert!(second.is_partial());
    assert_eq!(second.evaluated, 1);
    assert_eq!(second.failures.len(), 1);
    assert_eq!(second.failures[0].monitor_id, "m-cpa");
    assert_eq!(second.failures[0].kind, "metric_source_unavailable");
    assert_eq!(second.new_alarms.len(), 1);
    assert_eq!(second.new_alarms[0].monitor_id, "m-cpc");

    let kept = store.get_monitor_state("m-cpa").unwrap().unwrap();
    assert_eq!(kept.status, MonitorStatus::InAlarm);
    assert_eq!(kept.evaluated_at, at(0));
    assert_eq!(active_alarms(&store, "m-cpa").len(), 1);
}

#[test]
fn evaluate_all_skips_disabled_and_misconfigured_monitors() {
    let (store, source, engine) = setup();
    source.set("cpa", 42.0, 30.0);
    source.set("cpc", 1.0, 1.0);

    let mut disabled = monitor("m-off", "cpa", MonitorKind::Simple);
    disabled.enabled = false;
    let broken = monitor(
        "m-bad",
        "cpa",
        MonitorKind::Composite {
            required_breaches: 1,
            window: 0,
        },
    );
    let fine = monitor("m-cpc", "cpc", MonitorKind::Simple);

    let result = engine.evaluate_all_at(&campaign(), &[disabled, broken, fine], at(0));
    assert_eq!(result.skipped_disabled, 1);
    assert_eq!(result.evaluated, 1);
    assert_eq!(result.failures[0].kind, "invalid_config");
    assert!(store.get_monitor_state("m-off").unwrap().is_none());
    assert!(store.get_monitor_state("m-bad").unwrap().is_none());
}

#[test]
fn summary_counts_active_alarms_and_healthy_monitors() {
    let (store, source, engine) = setup();
    source.set("cpa", 42.0, 30.0);
    source.set("ctr", 0.5, 2.5);
    source.set("cpc", 1.3, 1.0);
    let monitors = vec![
        monitor("m-cpa", "cpa", MonitorKind::Simple),
        monitor("m-ctr", "ctr", MonitorKind::Simple),
        monitor("m-cpc", "cpc", MonitorKind::Simple),
    ];
    let result = engine.evaluate_all_at(&campaign(), &monitors, at(0));
    assert_eq!(result.new_alarms.len(), 3);

    let cpc_alarm = result
        .new_alarms
        .iter()
        .find(|a| a.monitor_id == "m-cpc")
        .unwrap();
    engine.dismiss_alarm(&cpc_alarm.id).unwrap();

    let summary = engine.campaign_summary("c-1", 8).unwrap();
    assert_eq!(summary.critical, 1);
    assert_eq!(summary.high, 1);
    assert_eq!(summary.medium, 0);
    assert_eq!(summary.total_active, 2);
    assert_eq!(summary.healthy, 6);

    let all = store.list_alarms(&AlarmFilter::default()).unwrap();
    assert_eq!(alarm_summary(&all, 1).healthy, 0);
}

#[test]
fn default_catalog_covers_core_metrics_and_formulas() {
    let mut c = campaign();
    c.sensitivity = Sensitivity::Strict;
    let formulas = vec![FormulaMetric {
        id: "blended_roas".into(),
        name: "Blended ROAS".into(),
        formula: "revenue / spend".into(),
    }];

    let monitors = default_monitors(&c, &formulas, at(0));
    assert_eq!(monitors.len(), 9);
    assert!(monitors.iter().all(|m| m.enabled && m.sensitivity == Sensitivity::Strict));

    let ids: HashSet<&str> = monitors.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids.len(), 9);

    let cpa = monitors.iter().find(|m| m.metric.id == "cpa").unwrap();
    assert_eq!(
        cpa.kind,
        MonitorKind::Composite {
            required_breaches: 2,
            window: 3
        }
    );
    assert_eq!(cpa.impact_rule, ImpactRule::CostRising);

    let ctr = monitors.iter().find(|m| m.metric.id == "ctr").unwrap();
    assert_eq!(ctr.impact_rule, ImpactRule::EfficiencyFalling);
    assert!(matches!(&ctr.kind, MonitorKind::Granular { dimensions } if dimensions.len() == 2));

    let custom = monitors.last().unwrap();
    assert_eq!(custom.metric.category, MetricCategory::Custom);
    assert_eq!(custom.kind, MonitorKind::Simple);
    assert_eq!(custom.impact_rule, ImpactRule::Unclassified);
}

// ---- enrichment ----

struct FailingGenerator;

#[async_trait]
impl InsightGenerator for FailingGenerator {
    fn provider(&self) -> &str {
        "failing"
    }

    fn model_name(&self) -> &str {
        "none"
    }

    async fn generate(&self, _request: &InsightRequest) -> Result<Insights> {
        anyhow::bail!("upstream returned 503")
    }
}

struct SlowGenerator;

#[async_trait]
impl InsightGenerator for SlowGenerator {
    fn provider(&self) -> &str {
        "slow"
    }

    fn model_name(&self) -> &str {
        "none"
    }

    async fn generate(&self, request: &InsightRequest) -> Result<Insights> {
        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
        HeuristicInsightGenerator::new().generate(request).await
    }
}

async fn wait_for_insights(store: &MemoryRecordStore, alarm_id: &str) -> Option<Insights> {
    for _ in 0..100 {
        let alarm = store.get_alarm(alarm_id).unwrap().unwrap();
        if alarm.insights.is_some() {
            return alarm.insights;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    None
}

#[tokio::test]
async fn insights_are_attached_after_alarm_is_stored() {
    let store = Arc::new(MemoryRecordStore::new());
    let source = Arc::new(FakeSource::default());
    let engine = MonitorEngine::new(store.clone(), source.clone()).with_insights(
        Arc::new(HeuristicInsightGenerator::new()),
        std::time::Duration::from_secs(5),
        "en",
    );
    let m = monitor("m-ctr", "ctr", MonitorKind::Simple);
    source.set("ctr", 1.25, 2.5);

    let alarm = engine
        .evaluate_monitor(&m, &campaign())
        .unwrap()
        .alarm
        .unwrap();
    assert!(alarm.insights.is_none());

    let insights = wait_for_insights(&store, &alarm.id).await.unwrap();
    assert!(insights.summary.contains("fell 50.0%"));
    assert!(!insights.root_causes.is_empty());
    assert_eq!(
        store.get_alarm(&alarm.id).unwrap().unwrap().state,
        AlarmState::Active
    );
}

#[tokio::test]
async fn failed_or_slow_enrichment_leaves_alarm_without_insights() {
    let generators: Vec<Arc<dyn InsightGenerator>> =
        vec![Arc::new(FailingGenerator), Arc::new(SlowGenerator)];

    for generator in generators {
        let store = Arc::new(MemoryRecordStore::new());
        let source = Arc::new(FakeSource::default());
        let engine = MonitorEngine::new(store.clone(), source.clone()).with_insights(
            generator,
            std::time::Duration::from_millis(50),
            "en",
        );
        let m = monitor("m-cpa", "cpa", MonitorKind::Simple);
        source.set("cpa", 42.0, 30.0);

        let alarm = engine
            .evaluate_monitor(&m, &campaign())
            .unwrap()
            .alarm
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;

        let stored = store.get_alarm(&alarm.id).unwrap().unwrap();
        assert!(stored.insights.is_none());
        assert_eq!(stored.state, AlarmState::Active);
    }
}

/// Memory store whose monitor-state writes fail while `fail_states` is set.
#[derive(Default)]
struct FlakyStateStore {
    inner: MemoryRecordStore,
    fail_states: AtomicBool,
}

impl RecordStore for FlakyStateStore {
    fn get_monitor_state(&self, monitor_id: &str) -> Result<Option<MonitorState>> {
        self.inner.get_monitor_state(monitor_id)
    }

    fn put_monitor_state(&self, state: &MonitorState) -> Result<()> {
        if self.fail_states.load(Ordering::Acquire) {
            anyhow::bail!("disk full");
        }
        self.inner.put_monitor_state(state)
    }

    fn list_monitor_states(&self, campaign_id: &str) -> Result<Vec<MonitorState>> {
        self.inner.list_monitor_states(campaign_id)
    }

    fn list_alarms(&self, filter: &AlarmFilter) -> Result<Vec<Alarm>> {
        self.inner.list_alarms(filter)
    }

    fn get_alarm(&self, alarm_id: &str) -> Result<Option<Alarm>> {
        self.inner.get_alarm(alarm_id)
    }

    fn put_alarm(&self, alarm: &Alarm) -> Result<()> {
        self.inner.put_alarm(alarm)
    }
}

#[tokio::test]
async fn alarm_is_enriched_when_state_write_fails() {
    let store = Arc::new(FlakyStateStore::default());
    let source = Arc::new(FakeSource::default());
    let engine = MonitorEngine::new(store.clone(), source.clone()).with_insights(
        Arc::new(HeuristicInsightGenerator::new()),
        std::time::Duration::from_secs(5),
        "en",
    );
    let m = monitor("m-cpa", "cpa", MonitorKind::Simple);
    source.set("cpa", 42.0, 30.0);

    store.fail_states.store(true, Ordering::Release);
    let err = engine.evaluate_monitor(&m, &campaign()).unwrap_err();
    assert!(matches!(err, EvaluationError::Storage(_)));

    let alarm = active_alarms(&store.inner, "m-cpa").pop().unwrap();
    assert!(wait_for_insights(&store.inner, &alarm.id).await.is_some());

    // the replayed transition finds the stored alarm instead of opening one
    store.fail_states.store(false, Ordering::Release);
    let outcome = engine.evaluate_monitor(&m, &campaign()).unwrap();
    assert_eq!(outcome.transition, Transition::Triggered);
    assert!(outcome.alarm.is_none());
    assert_eq!(active_alarms(&store.inner, "m-cpa").len(), 1);
}

#[test]
fn enrichment_without_runtime_is_skipped() {
    let store = Arc::new(MemoryRecordStore::new());
    let source = Arc::new(FakeSource::default());
    let engine = MonitorEngine::new(store.clone(), source.clone()).with_insights(
        Arc::new(HeuristicInsightGenerator::new()),
        std::time::Duration::from_secs(1),
        "en",
    );
    let m = monitor("m-cpa", "cpa", MonitorKind::Simple);
    source.set("cpa", 42.0, 30.0);

    let alarm = engine
        .evaluate_monitor(&m, &campaign())
        .unwrap()
        .alarm
        .unwrap();
    assert!(store.get_alarm(&alarm.id).unwrap().unwrap().insights.is_none());
}
