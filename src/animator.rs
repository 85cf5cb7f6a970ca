// Convergence animator: nudges each region's displayed quality toward its target.
// Rule: a bounded step per tick keeps large jumps from flickering; settled regions stay untouched.

use std::collections::HashMap;

use log::trace;
use serde::Serialize;

use crate::scene::Scene;
use crate::store::MetricStore;
use crate::synth::{Fill, LabelLine, Synthesizer, VisualState};
use crate::types::*;

/// What one tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TickOutcome {
    /// Regions still away from their target after this tick's step.
    pub converging: usize,
    /// Regions whose scene representation was mutated.
    pub repainted: usize,
    /// Regions without a snapshot.
    pub disconnected: usize,
}

impl TickOutcome {
    /// No region needs further movement; the repeating tick can stop.
    pub fn is_settled(&self) -> bool {
        self.converging == 0
    }
}

/// Move `current` toward `target` by at most `max_step`.
pub fn step_toward(current: f64, target: f64, max_step: f64) -> f64 {
    let difference = target - current;
    if difference.abs() <= max_step {
        target
    } else {
        current + max_step.copysign(difference)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Painted {
    Connected { fill: Fill, lines: Vec<LabelLine> },
    Disconnected,
}

/// Per-panel animation state: the last visual painted for each region.
#[derive(Debug, Clone)]
pub struct ConvergenceAnimator {
    max_step: f64,
    painted: HashMap<String, Painted>,
}

impl ConvergenceAnimator {
    pub fn new(max_step: f64) -> Self {
        ConvergenceAnimator {
            max_step: if max_step > 0.0 { max_step } else { 1.0 },
            painted: HashMap::new(),
        }
    }

    /// Forget what was painted, e.g. after the scene was re-bound or the markup changed.
    pub fn invalidate(&mut self) {
        self.painted.clear();
    }

    /// Advance every region by one step and repaint the ones whose visual changed.
    pub fn tick<S: Scene>(
        &mut self,
        regions: &mut [Region],
        store: &MetricStore,
        synth: &Synthesizer,
        disconnected_style: &DisconnectedStyle,
        scene: &mut S,
    ) -> TickOutcome {
        let mut outcome = TickOutcome::default();

        for region in regions.iter_mut() {
            let Some(snapshot) = store.get(&region.name) else {
                outcome.disconnected += 1;
                if self.painted.get(&region.name) != Some(&Painted::Disconnected) {
                    scene.set_disconnected_state(&region.name, disconnected_style);
                    self.painted.insert(region.name.clone(), Painted::Disconnected);
                    outcome.repainted += 1;
                }
                continue;
            };

            if region.quality != snapshot.normalized {
                region.quality = step_toward(region.quality, snapshot.normalized, self.max_step);
            }
            if region.quality != snapshot.normalized {
                outcome.converging += 1;
            }
            region.temperature = snapshot.temperature;
            region.humidity = snapshot.humidity;

            let VisualState::Connected { fill, lines } = synth.visual(region, Some(snapshot)) else {
                continue;
            };
            let painted = Painted::Connected { fill, lines };
            if self.painted.get(&region.name) == Some(&painted) {
                continue;
            }
            paint(scene, &region.name, &painted);
            self.painted.insert(region.name.clone(), painted);
            outcome.repainted += 1;
        }

        trace!(
            "tick: {} converging, {} repainted, {} disconnected",
            outcome.converging,
            outcome.repainted,
            outcome.disconnected
        );
        outcome
    }
}

fn paint<S: Scene>(scene: &mut S, region: &str, painted: &Painted) {
    let Painted::Connected { fill, lines } = painted else {
        return;
    };
    if let Some(shape) = scene.find_region_shape(region) {
        if let Fill::RadialGradient { id, color } = fill {
            scene.ensure_radial_gradient(id, region, color);
        }
        scene.set_fill(&shape, fill);
    }
    if let Some(label) = scene.find_region_label(region) {
        scene.set_label_lines(&label, lines);
    }
}
