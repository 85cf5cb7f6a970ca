// floorplan_engine: Rust/WASM engine for live SVG floor-plan panels.
// Telemetry rows go in, batched scene ops come out. JS owns the DOM and the clock;
// all mapping, color and animation logic lives here.

mod animator;
mod color;
mod console;
mod derive;
mod discovery;
mod error;
mod mapping;
mod panel;
mod scene;
mod store;
mod synth;
mod telemetry;
mod timer;
mod types;

use wasm_bindgen::prelude::*;

pub use animator::{step_toward, ConvergenceAnimator, TickOutcome};
pub use color::{
    resolve_or, resolve_rgb, ColorResolver, ColorScheme, ColorStop, Legend, Rgb, Spectrum, Swatch,
    ThemePalette,
};
pub use console::{enable_logging, level_filter};
pub use derive::{air_quality_index, comfort_index};
pub use discovery::{
    discover_regions, discover_regions_with_prefix, reconcile_regions, try_discover_regions,
    SvgIndex, NAME_PREFIX, REGION_PREFIX,
};
pub use error::EngineError;
pub use mapping::SensorMapping;
pub use panel::FloorPlanPanel;
pub use scene::{RecordingScene, Scene, SceneBinder, SceneOp, FIXED_SIZE_ATTRIBUTES};
pub use store::{IngestReport, MetricStore};
pub use synth::{palette_bucket, ColorPolicy, Fill, LabelLine, Synthesizer, VisualState};
pub use telemetry::{parse_permissive, TelemetryStrategy};
pub use timer::{
    IngestionGate, JsTimerHost, ManualTimerHost, OwnedTimer, TimerHandle, TimerHost, TimerKind,
};
pub use types::*;

/// Initialize panic hook for better error messages in browser console.
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();
}

fn js_error(context: &str, err: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&format!("{}: {}", context, err))
}

fn now_ms() -> f64 {
    js_sys::Date::now()
}

/// One panel instance exposed to JavaScript.
/// Mutations are recorded and handed back as a JSON op batch to minimize JS↔WASM crossings.
#[wasm_bindgen]
pub struct FloorPlanEngine {
    panel: FloorPlanPanel<RecordingScene, JsTimerHost>,
    binder: SceneBinder,
}

#[wasm_bindgen]
impl FloorPlanEngine {
    /// Create an engine for one panel.
    ///
    /// `arm_fn(kind, periodMs)` must start a repeating timer and return its id;
    /// when it fires, JS calls [`FloorPlanEngine::on_timer`] with the same kind.
    #[wasm_bindgen(constructor)]
    pub fn new(
        options_json: &str,
        settings_json: &str,
        instance_id: u32,
        arm_fn: js_sys::Function,
        cancel_fn: js_sys::Function,
    ) -> Result<FloorPlanEngine, JsValue> {
        let settings = EngineSettings::from_json(settings_json)
            .map_err(|e| js_error("Invalid settings", e))?;
        let options: PanelOptions =
            serde_json::from_str(options_json).map_err(|e| js_error("Invalid options", e))?;

        let mut binder = SceneBinder::new(&settings.region_prefix, &settings.name_prefix);
        binder.set_markup(&options.svg);
        let mut panel = FloorPlanPanel::new(
            settings,
            JsTimerHost::new(arm_fn, cancel_fn),
            u64::from(instance_id),
        );
        panel.apply_options(&options, now_ms());

        Ok(FloorPlanEngine { panel, binder })
    }

    /// Re-apply the persisted panel options (markup, mapping, mode, thresholds).
    pub fn set_options(&mut self, options_json: &str) -> Result<(), JsValue> {
        let options: PanelOptions =
            serde_json::from_str(options_json).map_err(|e| js_error("Invalid options", e))?;
        self.panel.apply_options(&options, now_ms());
        self.rebind_if_changed(&options.svg);
        Ok(())
    }

    /// Replace the floor-plan markup. An attached scene is re-bound to the new markup.
    pub fn set_markup(&mut self, markup: &str) {
        self.panel.set_markup(markup, now_ms());
        self.rebind_if_changed(markup);
    }

    /// Replace the current data batch (array of frames) and re-ingest.
    /// Unparseable input is treated as an empty batch.
    pub fn set_rows_json(&mut self, rows_json: &str) {
        let rows: Vec<Series> = match serde_json::from_str(rows_json) {
            Ok(rows) => rows,
            Err(e) => {
                log::warn!("ignoring unparseable data batch: {}", e);
                Vec::new()
            }
        };
        self.panel.set_rows(rows, now_ms());
    }

    pub fn set_mapping_json(&mut self, mapping_json: &str) {
        self.panel.set_mapping_json(mapping_json, now_ms());
    }

    pub fn set_gradient_mode(&mut self, gradient_mode: bool) {
        self.panel
            .set_mode(TelemetryMode::from_gradient_flag(gradient_mode), now_ms());
    }

    /// Set the color scheme and the theme palette used to resolve its color names.
    pub fn set_color_scheme_json(&mut self, scheme_json: &str, palette_json: &str) -> Result<(), JsValue> {
        let scheme: ColorScheme =
            serde_json::from_str(scheme_json).map_err(|e| js_error("Invalid color scheme", e))?;
        let palette: ThemePalette =
            serde_json::from_str(palette_json).map_err(|e| js_error("Invalid palette", e))?;
        self.panel.set_color_scheme(scheme, palette);
        Ok(())
    }

    /// Bind to the rendered markup and start the timers.
    /// Re-attaching to the same markup keeps the gradient definitions already created.
    pub fn attach(&mut self) {
        if let Some(scene) = self.panel.scene() {
            self.binder.absorb(scene);
        }
        self.panel.attach_scene(self.binder.bind());
    }

    /// Stop the timers and return the ops recorded but not yet taken.
    pub fn detach(&mut self) -> Result<String, JsValue> {
        let ops = match self.panel.detach_scene() {
            Some(mut scene) => {
                self.binder.absorb(&scene);
                scene.drain()
            }
            None => Vec::new(),
        };
        serialize_ops(&ops)
    }

    /// Host render notification. Runs a gated ingestion.
    pub fn on_render(&mut self) {
        self.panel.on_render(now_ms());
    }

    /// A host timer fired. Returns the scene ops to apply, as JSON.
    pub fn on_timer(&mut self, kind: &str) -> Result<String, JsValue> {
        let kind = TimerKind::parse(kind)
            .ok_or_else(|| JsValue::from_str(&format!("Unknown timer kind: {}", kind)))?;
        self.panel.on_timer(kind, now_ms());
        self.take_ops()
    }

    /// Take all scene ops recorded since the last call, as JSON.
    pub fn take_ops(&mut self) -> Result<String, JsValue> {
        let ops = self
            .panel
            .scene_mut()
            .map(|scene| scene.drain())
            .unwrap_or_default();
        serialize_ops(&ops)
    }

    /// Legend swatches for the current scheme, or `null` when there are fewer than two stops.
    pub fn legend_json(&self) -> Result<String, JsValue> {
        serde_json::to_string(&self.panel.legend()).map_err(|e| js_error("Serialization error", e))
    }

    /// Regions with their displayed quality and readings.
    pub fn regions_json(&self) -> Result<String, JsValue> {
        serde_json::to_string(self.panel.regions()).map_err(|e| js_error("Serialization error", e))
    }

    /// Counts from the most recent ingestion.
    pub fn last_report_json(&self) -> Result<String, JsValue> {
        serde_json::to_string(&self.panel.last_report())
            .map_err(|e| js_error("Serialization error", e))
    }

    /// Cancel every timer. Call when the panel is removed.
    pub fn teardown(&mut self) {
        self.panel.teardown();
    }
}

impl FloorPlanEngine {
    /// New markup gets a fresh scene; the old scene's gradients belonged to the old document.
    fn rebind_if_changed(&mut self, markup: &str) {
        if self.binder.set_markup(markup) && self.panel.is_attached() {
            self.panel.attach_scene(self.binder.bind());
        }
    }
}

fn serialize_ops(ops: &[SceneOp]) -> Result<String, JsValue> {
    serde_json::to_string(ops).map_err(|e| js_error("Serialization error", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_panel_runs_without_js() {
        let markup = r#"<svg><rect id="room:101"/><text id="101"><tspan/></text></svg>"#;
        let mut panel: FloorPlanPanel<RecordingScene, ManualTimerHost> =
            FloorPlanPanel::new(EngineSettings::default(), ManualTimerHost::new(), 1);
        panel.set_markup(markup, 0.0);
        panel.attach_scene(RecordingScene::new(SvgIndex::parse(markup)));

        let outcome = panel.on_timer(TimerKind::Convergence, 0.0);
        assert_eq!(outcome.map(|o| o.disconnected), Some(1));
        assert!(!panel.scene_mut().unwrap().drain().is_empty());
    }

    #[test]
    fn settings_parse_for_engine() {
        let settings = EngineSettings::from_json(r#"{"tick_interval_ms": 40}"#);
        assert!(settings.is_ok());
    }
}
