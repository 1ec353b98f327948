use crate::ipc::Surface;
use crate::notify::Notifier;
use crate::Database;
use std::sync::atomic::AtomicUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
mod core;
mod db;

pub use self::core::{format_elapsed, plan_start, reconcile};
pub use self::db::{parse_anchor, ANCHOR_KEY};

/// Wall clock in Unix milliseconds. Injected so tests can pin "now".
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

pub fn system_clock() -> Clock {
    Arc::new(|| chrono::Utc::now().timestamp_millis())
}

/// Timer Engine: владеет состоянием таймера, задачей отображения и хранилищем якоря.
/// Решения принимает чистая `reconcile`, engine только исполняет эффекты.
pub struct TimerEngine {
    /// Единственный источник истины для running / anchor / golden_prev
    pub(crate) state: Arc<Mutex<TimerState>>,
    /// Repeating display-update task; at most one ever exists
    pub(crate) display_task: Arc<Mutex<Option<JoinHandle<()>>>>,
    /// База данных для персистентности якоря
    pub(crate) db: Option<Arc<Database>>,
    pub(crate) surface: Arc<dyn Surface>,
    pub(crate) notifier: Arc<dyn Notifier>,
    pub(crate) clock: Clock,
    pub(crate) tick_interval: Duration,
    pub(crate) polls_in_flight: Arc<AtomicUsize>,
}

/// Состояние таймера на время жизни процесса
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimerState {
    /// true iff a display-update task is active
    pub running: bool,
    /// Unix ms treated as elapsed zero; set once per run
    pub anchor_ms: Option<i64>,
    /// Last observed golden flag, for false→true edge detection
    pub golden_prev: bool,
}

/// One-shot notification arming, derived from `golden_prev`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GoldenPhase {
    Armed,
    Fired,
}

impl TimerState {
    pub fn golden_phase(&self) -> GoldenPhase {
        if self.golden_prev {
            GoldenPhase::Fired
        } else {
            GoldenPhase::Armed
        }
    }
}

/// Why a run is being started; only resume skips the anchor write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartReason {
    /// Explicit start action by the user
    Explicit,
    /// Anchor read back from storage after a restart
    Resume,
    /// Server reported a run the client did not know about
    Server,
}

/// Side effects produced by reconciliation, executed by `TimerEngine`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    PersistAnchor(i64),
    StartDisplayTask { anchor_ms: i64 },
    ApplyGoldenUi { active: bool },
    FireNotification,
}

impl TimerEngine {
    pub fn new(
        db: Option<Arc<Database>>,
        surface: Arc<dyn Surface>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(TimerState::default())),
            display_task: Arc::new(Mutex::new(None)),
            db,
            surface,
            notifier,
            clock: system_clock(),
            tick_interval: Duration::from_secs(1),
            polls_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_tick_interval(mut self, tick_interval: Duration) -> Self {
        self.tick_interval = tick_interval;
        self
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> Result<TimerState, String> {
        self.state
            .lock()
            .map(|s| *s)
            .map_err(|e| format!("Mutex poisoned: {}", e))
    }

    pub fn has_display_task(&self) -> bool {
        self.display_task
            .lock()
            .map(|t| t.as_ref().map_or(false, |h| !h.is_finished()))
            .unwrap_or(false)
    }
}
