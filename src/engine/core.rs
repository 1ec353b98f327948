use crate::engine::{Effect, StartReason, TimerEngine, TimerState};
use crate::ipc::GOLDEN_TEXT;
use crate::models::ServerStatus;
use crate::network::{StatusClient, StatusError};
use crate::notify::{deliver, golden_hour_notification};
use scopeguard::guard;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// `HH:MM:SS`, hours unbounded. Negative durations (clock skew, now < anchor) clamp to zero.
pub fn format_elapsed(ms: i64) -> String {
    let total_seconds = ms.max(0) / 1000;
    let hrs = total_seconds / 3600;
    let mins = (total_seconds % 3600) / 60;
    let secs = total_seconds % 60;
    format!("{:02}:{:02}:{:02}", hrs, mins, secs)
}

/// Переход: not running → running. No-op if a display task is already active.
pub fn plan_start(state: &TimerState, anchor_ms: i64, reason: StartReason) -> (TimerState, Vec<Effect>) {
    if state.running {
        return (*state, Vec::new());
    }

    let next = TimerState {
        running: true,
        anchor_ms: Some(anchor_ms),
        ..*state
    };
    // Display task first: the anchor is only written once the run actually ticks
    let mut effects = Vec::with_capacity(2);
    effects.push(Effect::StartDisplayTask { anchor_ms });
    if reason != StartReason::Resume {
        effects.push(Effect::PersistAnchor(anchor_ms));
    }
    (next, effects)
}

/// Merge one server status into local state.
///
/// The server can only start a run the client does not have; it never moves an existing
/// anchor and never stops a run. Golden hour notifies on the false→true edge only.
pub fn reconcile(state: &TimerState, status: &ServerStatus, now_ms: i64) -> (TimerState, Vec<Effect>) {
    let mut next = *state;
    let mut effects = Vec::new();

    if status.started && !state.running {
        let anchor_from_server = now_ms.saturating_sub(status.elapsed_ms());
        let (started, start_effects) = plan_start(&next, anchor_from_server, StartReason::Server);
        next = started;
        effects.extend(start_effects);
    }

    effects.push(Effect::ApplyGoldenUi {
        active: status.golden,
    });
    if status.golden {
        if !state.golden_prev {
            effects.push(Effect::FireNotification);
        }
        next.golden_prev = true;
    } else {
        next.golden_prev = false;
    }

    (next, effects)
}

impl TimerEngine {
    /// Start the local timer at `anchor_ms` (now if absent) and persist the anchor.
    /// Returns Ok(false) when a run is already active.
    pub fn start_local_timer(&self, anchor_ms: Option<i64>) -> Result<bool, String> {
        let anchor_ms = anchor_ms.unwrap_or_else(|| (self.clock)());
        self.start_with_reason(anchor_ms, StartReason::Explicit)
    }

    /// Explicit start action (the start button): local run plus a best-effort `POST /start`.
    pub fn start_run(&self, client: Option<&StatusClient>) -> Result<bool, String> {
        let started = self.start_local_timer(None)?;
        if started {
            if let Some(client) = client {
                client.notify_start_detached();
            }
        } else {
            debug!("[TIMER] Start ignored, timer already running");
        }
        Ok(started)
    }

    pub(crate) fn start_with_reason(&self, anchor_ms: i64, reason: StartReason) -> Result<bool, String> {
        // Решение и обновление состояния под одним lock
        let effects = {
            let mut state = self
                .state
                .lock()
                .map_err(|e| format!("Mutex poisoned: {}", e))?;
            let (next, effects) = plan_start(&state, anchor_ms, reason);
            *state = next;
            effects
        };

        if effects.is_empty() {
            return Ok(false);
        }
        for effect in &effects {
            if let Err(e) = self.execute_local(effect) {
                error!("[TIMER] Failed to start run ({:?}): {}", reason, e);
                self.rollback_start(anchor_ms);
                return Err(e);
            }
        }
        info!("[TIMER] Run started ({:?}), anchor={}", reason, anchor_ms);
        Ok(true)
    }

    /// Apply a fetched status: reconcile, then execute the resulting effects.
    pub async fn apply_status(&self, status: &ServerStatus) -> Result<Vec<Effect>, String> {
        let now_ms = (self.clock)();
        let effects = {
            let mut state = self
                .state
                .lock()
                .map_err(|e| format!("Mutex poisoned: {}", e))?;
            let (next, effects) = reconcile(&state, status, now_ms);
            *state = next;
            effects
        };

        // Golden effects still apply when the server-initiated start fails
        let mut applied = Vec::with_capacity(effects.len());
        let mut start_failed = false;
        for effect in effects {
            match effect {
                Effect::FireNotification => {
                    info!("[TIMER] Golden hour started");
                    deliver(self.notifier.as_ref(), &golden_hour_notification()).await;
                }
                Effect::StartDisplayTask { anchor_ms } => {
                    info!(
                        "[SYNC] Server reports a run ({}ms elapsed), starting local timer at {}",
                        status.elapsed_ms(),
                        anchor_ms
                    );
                    if let Err(e) = self.execute_local(&effect) {
                        error!("[SYNC] Failed to start run from server status: {}", e);
                        self.rollback_start(anchor_ms);
                        start_failed = true;
                        continue;
                    }
                }
                Effect::PersistAnchor(_) if start_failed => continue,
                _ => self.execute_local(&effect)?,
            }
            applied.push(effect);
        }
        Ok(applied)
    }

    /// One poll: fetch `/status` and apply it. Failures skip the poll without touching state.
    pub async fn poll_once(&self, client: &StatusClient) -> Option<Vec<Effect>> {
        let in_flight = self.polls_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let counter = self.polls_in_flight.clone();
        let _in_flight_guard = guard((), move |_| {
            counter.fetch_sub(1, Ordering::SeqCst);
        });
        if in_flight > 1 {
            debug!("[SYNC] {} polls in flight", in_flight);
        }

        let status = match client.fetch_status().await {
            Ok(status) => status,
            Err(StatusError::Network(e)) => {
                debug!("[SYNC] Poll skipped, server unreachable: {}", e);
                return None;
            }
            Err(e) => {
                warn!("[SYNC] Poll skipped: {}", e);
                return None;
            }
        };

        match self.apply_status(&status).await {
            Ok(effects) => Some(effects),
            Err(e) => {
                error!("[SYNC] Failed to apply status: {}", e);
                None
            }
        }
    }

    /// Poll immediately, then every `period`, forever. Each tick gets its own task so a hung
    /// request never blocks later polls.
    pub async fn run_poll_loop(self: Arc<Self>, client: StatusClient, period: std::time::Duration) {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            let engine = self.clone();
            let client = client.clone();
            tokio::spawn(async move {
                engine.poll_once(&client).await;
            });
        }
    }

    /// Only a failed display task start is an error; a failed anchor write is logged and the
    /// run keeps going.
    fn execute_local(&self, effect: &Effect) -> Result<(), String> {
        match effect {
            Effect::PersistAnchor(anchor_ms) => {
                if let Err(e) = self.persist_anchor(*anchor_ms) {
                    error!("[TIMER] Failed to persist anchor: {}", e);
                }
            }
            Effect::StartDisplayTask { anchor_ms } => self.spawn_display_task(*anchor_ms)?,
            Effect::ApplyGoldenUi { active } => {
                let text = if *active { GOLDEN_TEXT } else { "" };
                self.surface.set_golden(*active, text);
            }
            Effect::FireNotification => {
                warn!("[TIMER] Notification effect outside of status reconciliation ignored");
            }
        }
        Ok(())
    }

    /// Undo a committed Stopped → Running transition whose display task never started,
    /// so `running` stays true only while a task ticks.
    fn rollback_start(&self, anchor_ms: i64) {
        match self.state.lock() {
            Ok(mut state) => {
                if state.anchor_ms == Some(anchor_ms) {
                    state.running = false;
                    state.anchor_ms = None;
                }
            }
            Err(e) => error!("[TIMER] Mutex poisoned during rollback: {}", e),
        }
    }

    fn spawn_display_task(&self, anchor_ms: i64) -> Result<(), String> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| format!("No async runtime, display task not started: {}", e))?;
        let mut slot = self
            .display_task
            .lock()
            .map_err(|e| format!("Mutex poisoned: {}", e))?;
        // GUARD: never a second display task
        if slot.as_ref().map_or(false, |h| !h.is_finished()) {
            warn!("[TIMER] Display task already active, not spawning another");
            return Ok(());
        }

        let now_ms = (self.clock)();
        if now_ms < anchor_ms {
            warn!(
                "[TIMER] Anchor {} is ahead of wall clock {} (clock skew), showing 00:00:00",
                anchor_ms, now_ms
            );
        }
        // Первый кадр сразу, не дожидаясь тика
        self.surface.set_timer_text(&format_elapsed(now_ms.saturating_sub(anchor_ms)));
        self.surface.set_running(true);

        let surface = self.surface.clone();
        let clock = self.clock.clone();
        let period = self.tick_interval;
        *slot = Some(handle.spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                surface.set_timer_text(&format_elapsed(clock().saturating_sub(anchor_ms)));
            }
        }));
        Ok(())
    }
}
