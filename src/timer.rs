// Timer ownership for the panel: one handle per kind, always cancelled before re-arming.
// The host owns the actual clock and calls back into the panel when a timer fires.

use std::fmt;

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use wasm_bindgen::JsValue;

/// The two periodic triggers of a panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerKind {
    /// Slow, gated ingestion cycle.
    Ingestion,
    /// Fast convergence tick.
    Convergence,
}

impl TimerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimerKind::Ingestion => "ingestion",
            TimerKind::Convergence => "convergence",
        }
    }

    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "ingestion" => Some(TimerKind::Ingestion),
            "convergence" => Some(TimerKind::Convergence),
            _ => None,
        }
    }
}

impl fmt::Display for TimerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Host-issued timer id. Newtype for type safety.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimerHandle(u32);

impl TimerHandle {
    pub fn new(id: u32) -> Self {
        TimerHandle(id)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

/// Repeating timers provided by the host.
pub trait TimerHost {
    /// Start a repeating timer that fires `kind` every `period_ms`.
    fn arm(&mut self, kind: TimerKind, period_ms: f64) -> TimerHandle;
    /// Stop a timer. Unknown or already-cancelled handles are ignored.
    fn cancel(&mut self, handle: TimerHandle);
}

/// At most one live timer of one kind.
#[derive(Debug, Clone)]
pub struct OwnedTimer {
    kind: TimerKind,
    period_ms: f64,
    handle: Option<TimerHandle>,
}

impl OwnedTimer {
    pub fn new(kind: TimerKind, period_ms: f64) -> Self {
        OwnedTimer {
            kind,
            period_ms,
            handle: None,
        }
    }

    /// Arm the timer, cancelling any previously armed handle first.
    pub fn arm<H: TimerHost + ?Sized>(&mut self, host: &mut H) -> TimerHandle {
        self.cancel(host);
        let handle = host.arm(self.kind, self.period_ms);
        debug!("armed {} timer {:?} every {}ms", self.kind, handle, self.period_ms);
        self.handle = Some(handle);
        handle
    }

    /// Cancel the armed handle, if any. Safe to call repeatedly.
    pub fn cancel<H: TimerHost + ?Sized>(&mut self, host: &mut H) {
        if let Some(handle) = self.handle.take() {
            host.cancel(handle);
            debug!("cancelled {} timer {:?}", self.kind, handle);
        }
    }

    pub fn is_armed(&self) -> bool {
        self.handle.is_some()
    }

    pub fn handle(&self) -> Option<TimerHandle> {
        self.handle
    }

    pub fn kind(&self) -> TimerKind {
        self.kind
    }
}

/// Lets an ingestion run only when `interval_ms` has passed since the previous one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IngestionGate {
    interval_ms: f64,
    last_run_ms: Option<f64>,
}

impl IngestionGate {
    pub fn new(interval_ms: f64) -> Self {
        IngestionGate {
            interval_ms,
            last_run_ms: None,
        }
    }

    /// True (and records `now_ms`) when enough time has elapsed. The first call always enters.
    pub fn try_enter(&mut self, now_ms: f64) -> bool {
        let open = match self.last_run_ms {
            None => true,
            Some(last) => now_ms - last >= self.interval_ms,
        };
        if open {
            self.last_run_ms = Some(now_ms);
        }
        open
    }

    /// Record an ungated run at `now_ms`.
    pub fn mark(&mut self, now_ms: f64) {
        self.last_run_ms = Some(now_ms);
    }

    pub fn last_run_ms(&self) -> Option<f64> {
        self.last_run_ms
    }
}

/// In-memory host for tests and native embedding: tracks which handles are live.
#[derive(Debug, Clone, Default)]
pub struct ManualTimerHost {
    next_id: u32,
    active: Vec<(TimerHandle, TimerKind, f64)>,
    pub armed_total: usize,
    pub cancelled_total: usize,
}

impl ManualTimerHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live timers of `kind`.
    pub fn active(&self, kind: TimerKind) -> usize {
        self.active.iter().filter(|(_, k, _)| *k == kind).count()
    }

    pub fn total_active(&self) -> usize {
        self.active.len()
    }

    pub fn period(&self, kind: TimerKind) -> Option<f64> {
        self.active
            .iter()
            .find(|(_, k, _)| *k == kind)
            .map(|(_, _, p)| *p)
    }
}

impl TimerHost for ManualTimerHost {
    fn arm(&mut self, kind: TimerKind, period_ms: f64) -> TimerHandle {
        self.next_id += 1;
        let handle = TimerHandle::new(self.next_id);
        self.active.push((handle, kind, period_ms));
        self.armed_total += 1;
        handle
    }

    fn cancel(&mut self, handle: TimerHandle) {
        let before = self.active.len();
        self.active.retain(|(h, _, _)| *h != handle);
        if self.active.len() < before {
            self.cancelled_total += 1;
        }
    }
}

/// Host backed by two JS callbacks: `arm(kind, periodMs) -> id` and `cancel(id)`.
/// The JS side wraps `setInterval` and calls back into the engine with the kind name.
pub struct JsTimerHost {
    arm_fn: js_sys::Function,
    cancel_fn: js_sys::Function,
}

impl JsTimerHost {
    pub fn new(arm_fn: js_sys::Function, cancel_fn: js_sys::Function) -> Self {
        JsTimerHost { arm_fn, cancel_fn }
    }
}

impl TimerHost for JsTimerHost {
    fn arm(&mut self, kind: TimerKind, period_ms: f64) -> TimerHandle {
        let result = self.arm_fn.call2(
            &JsValue::NULL,
            &JsValue::from_str(kind.as_str()),
            &JsValue::from_f64(period_ms),
        );
        match result.map(|id| id.as_f64()) {
            Ok(Some(id)) if id >= 0.0 => TimerHandle::new(id as u32),
            _ => {
                warn!("host did not return a timer id for {}", kind);
                TimerHandle::new(0)
            }
        }
    }

    fn cancel(&mut self, handle: TimerHandle) {
        let id = JsValue::from_f64(f64::from(handle.as_u32()));
        if self.cancel_fn.call1(&JsValue::NULL, &id).is_err() {
            warn!("host failed to cancel timer {}", handle.as_u32());
        }
    }
}
