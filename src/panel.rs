// Lifecycle controller: one instance per rendered panel.
// Owns the region set, metric store, timers and the bound scene. Every handler runs to
// completion, so an ingestion always fully replaces the store before the next tick reads it.

use log::{debug, info};

use crate::animator::{ConvergenceAnimator, TickOutcome};
use crate::color::{ColorResolver, ColorScheme, Legend, ThemePalette};
use crate::discovery::{discover_regions_with_prefix, reconcile_regions};
use crate::mapping::SensorMapping;
use crate::scene::Scene;
use crate::store::{IngestReport, MetricStore};
use crate::synth::{ColorPolicy, Synthesizer};
use crate::telemetry::TelemetryStrategy;
use crate::timer::{IngestionGate, OwnedTimer, TimerHost, TimerKind};
use crate::types::*;

pub struct FloorPlanPanel<S: Scene, H: TimerHost> {
    settings: EngineSettings,
    host: H,
    scene: Option<S>,

    markup: String,
    regions: Vec<Region>,
    store: MetricStore,
    rows: Vec<Series>,
    mapping: SensorMapping,
    strategy: TelemetryStrategy,

    scheme: ColorScheme,
    /// Set once the host supplies a scheme; option thresholds no longer override it.
    scheme_from_host: bool,
    resolver: Box<dyn ColorResolver>,
    synth: Synthesizer,
    legend: Option<Legend>,

    animator: ConvergenceAnimator,
    ingestion_timer: OwnedTimer,
    convergence_timer: OwnedTimer,
    gate: IngestionGate,
    last_report: IngestReport,
}

impl<S: Scene, H: TimerHost> FloorPlanPanel<S, H> {
    pub fn new(settings: EngineSettings, host: H, instance_id: u64) -> Self {
        let mode = TelemetryMode::default();
        let scheme = ColorScheme::default();
        let resolver: Box<dyn ColorResolver> = Box::new(ThemePalette::default());
        let stops = scheme.stops();
        let synth = Synthesizer::new(
            ColorPolicy::for_mode(mode, &stops, resolver.as_ref(), &settings.fallback_color),
            mode,
            instance_id,
            settings.label_line_height_em,
        );
        let legend = Legend::from_stops(&stops, resolver.as_ref(), &settings.fallback_color);

        FloorPlanPanel {
            strategy: TelemetryStrategy::for_mode(mode, &settings),
            animator: ConvergenceAnimator::new(settings.max_step),
            ingestion_timer: OwnedTimer::new(TimerKind::Ingestion, settings.ingestion_interval_ms),
            convergence_timer: OwnedTimer::new(TimerKind::Convergence, settings.tick_interval_ms),
            gate: IngestionGate::new(settings.ingestion_interval_ms),
            host,
            scene: None,
            markup: String::new(),
            regions: Vec::new(),
            store: MetricStore::new(),
            rows: Vec::new(),
            mapping: SensorMapping::default(),
            scheme,
            scheme_from_host: false,
            resolver,
            synth,
            legend,
            last_report: IngestReport::default(),
            settings,
        }
    }

    /// Apply the persisted panel options in one go.
    /// Option thresholds only color the plan while the host has not set a scheme.
    pub fn apply_options(&mut self, options: &PanelOptions, now_ms: f64) {
        let thresholds = options
            .thresholds
            .as_ref()
            .filter(|t| !t.steps.is_empty() && !self.scheme_from_host);
        if let Some(thresholds) = thresholds {
            self.scheme = ColorScheme::Thresholds(thresholds.clone());
            self.rebuild_synth();
        }
        self.mapping = SensorMapping::from_json_lenient(&options.sensor_mappings);
        let mode = TelemetryMode::from_gradient_flag(options.gradient_mode);
        if mode != self.strategy.mode() {
            self.strategy = TelemetryStrategy::for_mode(mode, &self.settings);
            self.rebuild_synth();
        }
        self.set_markup(&options.svg, now_ms);
    }

    /// Re-run region discovery. Regions still present keep their animated state.
    pub fn set_markup(&mut self, markup: &str, now_ms: f64) {
        if markup != self.markup {
            self.markup = markup.to_string();
            let discovered = discover_regions_with_prefix(markup, &self.settings.region_prefix);
            reconcile_regions(&mut self.regions, &discovered, self.settings.default_quality);
            self.animator.invalidate();
            debug!("markup changed: {} region(s) discovered", discovered.len());
        }
        self.ingest_now(now_ms);
    }

    /// Bind a scene (replacing any previous one) and start both timers.
    pub fn attach_scene(&mut self, mut scene: S) {
        scene.prepare_root();
        self.scene = Some(scene);
        self.animator.invalidate();
        self.ingestion_timer.arm(&mut self.host);
        self.convergence_timer.arm(&mut self.host);
        info!("scene attached, {} region(s)", self.regions.len());
    }

    /// Unbind the scene and stop all timers.
    pub fn detach_scene(&mut self) -> Option<S> {
        self.cancel_timers();
        self.scene.take()
    }

    pub fn set_rows(&mut self, rows: Vec<Series>, now_ms: f64) {
        self.rows = rows;
        self.ingest_now(now_ms);
    }

    pub fn set_mapping(&mut self, mapping: SensorMapping, now_ms: f64) {
        self.mapping = mapping;
        self.ingest_now(now_ms);
    }

    /// Parse the mapping JSON; invalid JSON counts as an empty mapping.
    pub fn set_mapping_json(&mut self, json: &str, now_ms: f64) {
        self.set_mapping(SensorMapping::from_json_lenient(json), now_ms);
    }

    pub fn set_mode(&mut self, mode: TelemetryMode, now_ms: f64) {
        if mode != self.strategy.mode() {
            self.strategy = TelemetryStrategy::for_mode(mode, &self.settings);
            self.rebuild_synth();
        }
        self.ingest_now(now_ms);
    }

    /// Replace the color scheme and the resolver for its color names.
    pub fn set_color_scheme<R: ColorResolver + 'static>(&mut self, scheme: ColorScheme, resolver: R) {
        self.scheme = scheme;
        self.scheme_from_host = true;
        self.resolver = Box::new(resolver);
        self.rebuild_synth();
        self.schedule_convergence();
    }

    /// Host render notification: ingest if the gate allows it.
    pub fn on_render(&mut self, now_ms: f64) -> Option<IngestReport> {
        if !self.gate.try_enter(now_ms) {
            return None;
        }
        Some(self.run_ingestion())
    }

    /// Dispatch a fired host timer.
    pub fn on_timer(&mut self, kind: TimerKind, now_ms: f64) -> Option<TickOutcome> {
        match kind {
            TimerKind::Ingestion => {
                self.on_render(now_ms);
                None
            }
            TimerKind::Convergence => self.tick(),
        }
    }

    /// Run one convergence tick. Cancels the tick timer once every region has settled.
    pub fn tick(&mut self) -> Option<TickOutcome> {
        let Some(scene) = self.scene.as_mut() else {
            self.convergence_timer.cancel(&mut self.host);
            return None;
        };
        let outcome = self.animator.tick(
            &mut self.regions,
            &self.store,
            &self.synth,
            &self.settings.disconnected,
            scene,
        );
        if outcome.is_settled() {
            self.convergence_timer.cancel(&mut self.host);
        }
        Some(outcome)
    }

    /// Cancel every timer and drop the scene. The panel stays usable if re-attached.
    pub fn teardown(&mut self) {
        self.cancel_timers();
        self.scene = None;
        info!("panel torn down");
    }

    fn cancel_timers(&mut self) {
        self.convergence_timer.cancel(&mut self.host);
        self.ingestion_timer.cancel(&mut self.host);
    }

    fn ingest_now(&mut self, now_ms: f64) -> IngestReport {
        self.gate.mark(now_ms);
        self.run_ingestion()
    }

    fn run_ingestion(&mut self) -> IngestReport {
        let records = self.strategy.adapt(&self.rows);
        self.last_report = self.store.ingest(
            &records,
            &self.mapping,
            self.strategy.mode(),
            &self.regions,
            &self.settings.normalized_fallback,
        );
        self.schedule_convergence();
        self.last_report
    }

    /// Arm (or re-arm) the convergence tick. Without a scene there is nothing to animate.
    fn schedule_convergence(&mut self) {
        if self.scene.is_some() {
            self.convergence_timer.arm(&mut self.host);
        }
    }

    fn rebuild_synth(&mut self) {
        let stops = self.scheme.stops();
        let mode = self.strategy.mode();
        let policy = ColorPolicy::for_mode(
            mode,
            &stops,
            self.resolver.as_ref(),
            &self.settings.fallback_color,
        );
        self.synth = Synthesizer::new(
            policy,
            mode,
            self.synth.instance_id,
            self.settings.label_line_height_em,
        );
        self.legend = Legend::from_stops(&stops, self.resolver.as_ref(), &self.settings.fallback_color);
        self.animator.invalidate();
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    pub fn region(&self, name: &str) -> Option<&Region> {
        self.regions.iter().find(|r| r.name == name)
    }

    pub fn store(&self) -> &MetricStore {
        &self.store
    }

    pub fn legend(&self) -> Option<&Legend> {
        self.legend.as_ref()
    }

    pub fn mode(&self) -> TelemetryMode {
        self.strategy.mode()
    }

    pub fn last_report(&self) -> IngestReport {
        self.last_report
    }

    pub fn scene(&self) -> Option<&S> {
        self.scene.as_ref()
    }

    pub fn scene_mut(&mut self) -> Option<&mut S> {
        self.scene.as_mut()
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn is_attached(&self) -> bool {
        self.scene.is_some()
    }

    pub fn is_ticking(&self) -> bool {
        self.convergence_timer.is_armed()
    }

    pub fn is_ingesting(&self) -> bool {
        self.ingestion_timer.is_armed()
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::{SvgIndex, NAME_PREFIX, REGION_PREFIX};
    use crate::scene::{RecordingScene, SceneBinder, SceneOp};
    use crate::timer::ManualTimerHost;
    use serde_json::json;
    use std::collections::HashMap;

    const PLAN: &str = r#"<svg xmlns="http://www.w3.org/2000/svg">
        <rect id="room:101"/>
        <text id="name:101"><tspan>Lab</tspan></text>
        <text id="101" x="4"><tspan>--</tspan></text>
    </svg>"#;

    type TestPanel = FloorPlanPanel<RecordingScene, ManualTimerHost>;

    fn sensor_rows(sensor: &str, normalized: f64) -> Vec<Series> {
        let mut labels = HashMap::new();
        labels.insert("sensor_id".to_string(), sensor.to_string());
        vec![Series {
            name: None,
            fields: vec![
                Field {
                    name: "_time".to_string(),
                    labels: HashMap::new(),
                    values: vec![json!(1)],
                },
                Field {
                    name: "_field".to_string(),
                    labels,
                    values: vec![json!("normalized"), json!("temperature"), json!("humidity")],
                },
                Field {
                    name: "_value".to_string(),
                    labels: HashMap::new(),
                    values: vec![json!(normalized), json!(22.5), json!(45.1)],
                },
            ],
        }]
    }

    fn panel() -> TestPanel {
        let mut panel = TestPanel::new(EngineSettings::default(), ManualTimerHost::new(), 1);
        panel.set_color_scheme(
            ColorScheme::Continuous {
                colors: vec!["green".to_string(), "red".to_string()],
            },
            ThemePalette::new([("green", "#00ff00"), ("red", "#ff0000")]),
        );
        panel.set_markup(PLAN, 0.0);
        panel
    }

    fn run_until_settled(panel: &mut TestPanel) -> usize {
        let mut ticks = 0;
        while panel.is_ticking() {
            panel.on_timer(TimerKind::Convergence, 0.0);
            ticks += 1;
            assert!(ticks < 1_000, "never settled");
        }
        ticks
    }

    #[test]
    fn end_to_end_converges_and_labels() {
        let mut panel = panel();
        panel.attach_scene(RecordingScene::new(SvgIndex::parse(PLAN)));
        panel.set_mapping_json(r#"[["sensor-9","101"]]"#, 0.0);
        panel.set_rows(sensor_rows("sensor-9", 60.0), 0.0);

        let ticks = run_until_settled(&mut panel);
        assert_eq!(ticks, 20);
        assert_eq!(panel.region("101").unwrap().quality, 60.0);

        let ops = panel.scene_mut().unwrap().drain();
        let last_labels = ops
            .iter()
            .rev()
            .find_map(|op| match op {
                SceneOp::SetLabelLines { lines, .. } => Some(lines.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(last_labels[0].text, "22.50°C");
        assert_eq!(last_labels[1].text, "45.10%");
    }

    #[test]
    fn at_most_one_timer_per_kind() {
        let mut panel = panel();
        panel.attach_scene(RecordingScene::new(SvgIndex::parse(PLAN)));
        for i in 0..5 {
            panel.set_rows(sensor_rows("sensor-9", 10.0 * i as f64), i as f64);
            panel.set_mapping_json(r#"[["sensor-9","101"]]"#, i as f64);
        }
        assert_eq!(panel.host().active(TimerKind::Convergence), 1);
        assert_eq!(panel.host().active(TimerKind::Ingestion), 1);

        panel.attach_scene(RecordingScene::new(SvgIndex::parse(PLAN)));
        assert_eq!(panel.host().active(TimerKind::Convergence), 1);
        assert_eq!(panel.host().active(TimerKind::Ingestion), 1);
    }

    #[test]
    fn teardown_cancels_everything() {
        let mut panel = panel();
        panel.attach_scene(RecordingScene::new(SvgIndex::parse(PLAN)));
        panel.teardown();
        assert_eq!(panel.host().total_active(), 0);
        assert!(!panel.is_attached());
        assert_eq!(panel.tick(), None);
    }

    #[test]
    fn nothing_armed_without_scene() {
        let mut panel = panel();
        panel.set_mapping_json(r#"[["sensor-9","101"]]"#, 0.0);
        panel.set_rows(sensor_rows("sensor-9", 60.0), 0.0);
        assert_eq!(panel.host().total_active(), 0);
        assert_eq!(panel.store().len(), 1);
    }

    #[test]
    fn settled_tick_stops_and_ingestion_rearms() {
        let mut panel = panel();
        panel.attach_scene(RecordingScene::new(SvgIndex::parse(PLAN)));
        panel.set_mapping_json(r#"[["sensor-9","101"]]"#, 0.0);
        panel.set_rows(sensor_rows("sensor-9", 78.0), 0.0);
        run_until_settled(&mut panel);
        assert!(!panel.is_ticking());
        assert!(panel.is_ingesting());

        // Too soon: gated.
        panel.on_timer(TimerKind::Ingestion, 1_000.0);
        assert!(!panel.is_ticking());

        panel.on_timer(TimerKind::Ingestion, 3_000.0);
        assert!(panel.is_ticking());
    }

    #[test]
    fn render_gate_limits_ingestion() {
        let mut panel = panel();
        panel.set_rows(Vec::new(), 10_000.0);
        assert!(panel.on_render(11_000.0).is_none());
        assert!(panel.on_render(13_000.0).is_some());
    }

    #[test]
    fn stale_snapshot_disconnects_region() {
        let mut panel = panel();
        panel.attach_scene(RecordingScene::new(SvgIndex::parse(PLAN)));
        panel.set_mapping_json(r#"[["sensor-9","101"]]"#, 0.0);
        panel.set_rows(sensor_rows("sensor-9", 80.0), 0.0);
        run_until_settled(&mut panel);
        panel.scene_mut().unwrap().drain();

        panel.set_rows(sensor_rows("sensor-1", 80.0), 10.0);
        assert!(!panel.store().contains("101"));
        let outcome = panel.tick().unwrap();
        assert_eq!(outcome.disconnected, 1);
        assert_eq!(panel.region("101").unwrap().quality, 80.0);
        let ops = panel.scene_mut().unwrap().drain();
        assert!(matches!(&ops[0], SceneOp::SetDisconnected { region, .. } if region == "101"));
    }

    #[test]
    fn markup_edit_keeps_animated_state() {
        let mut panel = panel();
        panel.attach_scene(RecordingScene::new(SvgIndex::parse(PLAN)));
        panel.set_mapping_json(r#"[["sensor-9","101"]]"#, 0.0);
        panel.set_rows(sensor_rows("sensor-9", 60.0), 0.0);
        for _ in 0..5 {
            panel.tick();
        }
        assert_eq!(panel.region("101").unwrap().quality, 75.0);

        let edited = PLAN.replace("</svg>", r#"<rect id="room:102"/></svg>"#);
        panel.set_markup(&edited, 1.0);
        assert_eq!(panel.regions().len(), 2);
        assert_eq!(panel.region("101").unwrap().quality, 75.0);
        assert_eq!(panel.region("102").unwrap().quality, 80.0);
    }

    #[test]
    fn mode_switch_uses_categorical_rows() {
        let mut panel = panel();
        panel.set_mode(TelemetryMode::Categorical, 0.0);
        panel.set_mapping_json(r#"[["L1","101"]]"#, 0.0);
        panel.set_rows(
            vec![Series {
                name: None,
                fields: vec![
                    Field {
                        name: "timestamp".to_string(),
                        labels: HashMap::new(),
                        values: vec![json!(1)],
                    },
                    Field {
                        name: "line".to_string(),
                        labels: HashMap::new(),
                        values: vec![json!("L1")],
                    },
                    Field {
                        name: "number".to_string(),
                        labels: HashMap::new(),
                        values: vec![json!(30)],
                    },
                ],
            }],
            0.0,
        );
        assert_eq!(panel.mode(), TelemetryMode::Categorical);
        assert_eq!(panel.store().get("101").unwrap().normalized, 30.0);
    }

    #[test]
    fn apply_options_sets_everything() {
        let mut panel = TestPanel::new(EngineSettings::default(), ManualTimerHost::new(), 3);
        let options: PanelOptions = serde_json::from_value(json!({
            "svg": PLAN,
            "sensorMappings": "[[\"sensor-9\",\"101\"]]",
            "gradientMode": false,
            "thresholds": {"steps": [{"color": "#00ff00", "value": null}, {"color": "#ff0000", "value": 50}]}
        }))
        .unwrap();
        panel.apply_options(&options, 0.0);

        assert_eq!(panel.mode(), TelemetryMode::Categorical);
        assert_eq!(panel.regions().len(), 1);
        assert_eq!(panel.legend().unwrap().swatches[0].color, "#00ff00");
    }

    #[test]
    fn host_scheme_survives_option_thresholds() {
        let mut panel = panel();
        let before = panel.legend().cloned();
        let options = PanelOptions {
            svg: PLAN.to_string(),
            thresholds: Some(ThresholdsConfig {
                steps: vec![
                    ThresholdStep {
                        color: "#0000ff".to_string(),
                        value: None,
                    },
                    ThresholdStep {
                        color: "#ffffff".to_string(),
                        value: Some(80.0),
                    },
                ],
            }),
            ..PanelOptions::default()
        };
        panel.apply_options(&options, 0.0);

        assert!(before.is_some());
        assert_eq!(panel.legend().cloned(), before);
    }

    #[test]
    fn attach_prepares_root_first() {
        let mut panel = panel();
        panel.attach_scene(RecordingScene::new(SvgIndex::parse(PLAN)));
        let ops = panel.scene_mut().unwrap().drain();
        assert!(matches!(
            &ops[0],
            SceneOp::PrepareRoot { remove_attributes } if remove_attributes == &["width", "height"]
        ));
    }

    fn gradient_creations(ops: &[SceneOp]) -> usize {
        ops.iter()
            .filter(|op| matches!(op, SceneOp::EnsureRadialGradient { create: true, .. }))
            .count()
    }

    #[test]
    fn reattach_same_markup_reuses_gradients() {
        let mut panel = panel();
        let mut binder = SceneBinder::new(REGION_PREFIX, NAME_PREFIX);
        binder.set_markup(PLAN);
        panel.set_mapping_json(r#"[["sensor-9","101"]]"#, 0.0);
        panel.set_rows(sensor_rows("sensor-9", 80.0), 0.0);

        panel.attach_scene(binder.bind());
        panel.tick();
        let first = gradient_creations(&panel.scene_mut().unwrap().drain());

        binder.absorb(panel.scene().unwrap());
        panel.attach_scene(binder.bind());
        panel.tick();
        let second = gradient_creations(&panel.scene_mut().unwrap().drain());

        assert_eq!(first, 1);
        assert_eq!(second, 0);
    }

    #[test]
    fn float_line_ids_resolve_against_float_mapping_keys() {
        let mut panel = panel();
        panel.set_mode(TelemetryMode::Categorical, 0.0);
        panel.set_mapping_json("[[7.0, \"101\"]]", 0.0);
        panel.set_rows(
            vec![Series {
                name: None,
                fields: vec![
                    Field {
                        name: "timestamp".to_string(),
                        labels: HashMap::new(),
                        values: vec![json!(1)],
                    },
                    Field {
                        name: "line".to_string(),
                        labels: HashMap::new(),
                        values: vec![json!(7.0)],
                    },
                    Field {
                        name: "number".to_string(),
                        labels: HashMap::new(),
                        values: vec![json!(55)],
                    },
                ],
            }],
            0.0,
        );
        assert_eq!(panel.store().get("101").unwrap().normalized, 55.0);
    }

    #[test]
    fn invalid_mapping_degrades_to_empty() {
        let mut panel = panel();
        panel.set_rows(sensor_rows("sensor-9", 60.0), 0.0);
        panel.set_mapping_json("{ not json", 0.0);
        assert!(panel.store().is_empty());
        assert_eq!(panel.last_report().unresolved, 1);
    }
}
