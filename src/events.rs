//! # Events — Structured Event Bus for Job Activity
//!
//! A bounded, thread-safe event log that collects structured events from the
//! job engine's pipeline stages and forwards them as WebSocket notifications
//! to a single job's stream.
//!
//! ## Event Types
//!
//! | Variant | Emitted When |
//! |---------|-------------|
//! | `LogEntry` | A pipeline stage logs a message (mirrors the persisted `LogEntry` row) |
//! | `ProgressTick` | Progress percent or current candidate advances |
//! | `Complete` | The job's run ends, successfully or not |
//!
//! ## Delivery
//!
//! Events are stored in a `VecDeque` (bounded to prevent unbounded growth)
//! and re-emitted verbatim over a `tokio::sync::broadcast` channel as
//! `{"type": "log" | "progress" | "complete", ...}` JSON, per the streaming
//! endpoint's contract. Each log entry also goes through `tracing` — the
//! engine emits both a `tracing` event and an in-memory/persisted record,
//! the same dual path the original dashboard event bus used.

use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

/// Severity of a `LogEntry` event, matching the persisted row's `level` column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    Debug,
    Info,
    Warning,
    Error,
}

/// Events emitted by the job engine's pipeline stages.
#[derive(Clone, Debug)]
pub enum Event {
    LogEntry {
        level: Level,
        stage: String,
        message: String,
        payload: Option<serde_json::Value>,
    },
    ProgressTick {
        percent: f64,
        current_candidate: String,
    },
    Complete {
        status: String,
        message: Option<String>,
    },
}

/// A squashed notification ready for delivery to the frontend.
#[derive(Clone, Debug, Serialize)]
pub struct Notification {
    pub id: u64,
    #[serde(rename = "type")]
    pub kind: String,
    pub level: Option<&'static str>,
    pub stage: Option<String>,
    pub message: Option<String>,
    pub percent: Option<f64>,
    pub current_candidate: Option<String>,
    pub status: Option<String>,
    pub timestamp_ms: u64,
}

/// Central event bus: the job engine emits events, the bus handles logging,
/// buffering, and broadcasting notifications via WebSocket.
pub struct EventBus {
    recent: Mutex<VecDeque<EventRecord>>,
    notifications: Mutex<VecDeque<Notification>>,
    latest_progress: Mutex<f64>,
    next_id: AtomicU64,
    next_sequence: AtomicU64,
    ws_sender: Mutex<Option<tokio::sync::broadcast::Sender<String>>>,
    start: Instant,
}

#[derive(Clone, Debug, Serialize)]
pub struct EventRecord {
    pub sequence: u64,
    pub kind: String,
    pub message: String,
    pub elapsed_secs: f64,
}

fn elapsed_tag(start: Instant) -> String {
    let secs = start.elapsed().as_secs();
    let h = secs / 3600;
    let m = (secs % 3600) / 60;
    let s = secs % 60;
    format!("{:02}:{:02}:{:02}", h, m, s)
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

const RECENT_EVENTS_CAP: usize = 200;
const NOTIFICATIONS_CAP: usize = 50;

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        EventBus {
            recent: Mutex::new(VecDeque::with_capacity(RECENT_EVENTS_CAP)),
            notifications: Mutex::new(VecDeque::with_capacity(NOTIFICATIONS_CAP)),
            latest_progress: Mutex::new(0.0),
            next_id: AtomicU64::new(1),
            next_sequence: AtomicU64::new(1),
            ws_sender: Mutex::new(None),
            start: Instant::now(),
        }
    }

    /// Set the broadcast sender for WebSocket delivery.
    pub fn set_ws_sender(&self, sender: tokio::sync::broadcast::Sender<String>) {
        *self.ws_sender.lock().unwrap() = Some(sender);
    }

    /// Subscribe to notification broadcasts (one receiver per WS client).
    pub fn subscribe_ws(&self) -> tokio::sync::broadcast::Receiver<String> {
        self.ws_sender
            .lock()
            .unwrap()
            .as_ref()
            .expect("ws_sender not set")
            .subscribe()
    }

    /// Subscribe, lazily initializing the broadcast channel on first use.
    /// Job-scoped buses (one per [`crate::engine::Engine::submit`] call) have
    /// no single startup point to call `set_ws_sender` from, unlike the old
    /// process-global bus.
    pub fn subscribe_ws_or_init(&self) -> tokio::sync::broadcast::Receiver<String> {
        let mut sender = self.ws_sender.lock().unwrap();
        if sender.is_none() {
            let (tx, _) = tokio::sync::broadcast::channel(256);
            *sender = Some(tx);
        }
        sender.as_ref().unwrap().subscribe()
    }

    /// Emit an event. Safe to call from rayon threads (no async).
    pub fn emit(&self, event: Event) {
        let elapsed = self.start.elapsed().as_secs_f64();
        let tag = elapsed_tag(self.start);

        match &event {
            Event::LogEntry { level, stage, message, .. } => {
                let level_str = match level {
                    Level::Debug => "debug",
                    Level::Info => "info",
                    Level::Warning => "warning",
                    Level::Error => "error",
                };
                match level {
                    Level::Debug => tracing::debug!(stage = %stage, "{}", message),
                    Level::Info => tracing::info!(stage = %stage, "{}", message),
                    Level::Warning => tracing::warn!(stage = %stage, "{}", message),
                    Level::Error => tracing::error!(stage = %stage, "{}", message),
                }
                eprintln!("[{}] {} [{}] {}", tag, level_str.to_uppercase(), stage, message);
                self.push_record("log", &format!("[{}] {}", stage, message), elapsed);
                self.broadcast_notification(Notification {
                    id: self.next_id.fetch_add(1, Ordering::Relaxed),
                    kind: "log".into(),
                    level: Some(level_str),
                    stage: Some(stage.clone()),
                    message: Some(message.clone()),
                    percent: None,
                    current_candidate: None,
                    status: None,
                    timestamp_ms: now_ms(),
                });
            }
            Event::ProgressTick { percent, current_candidate } => {
                // Progress is monotone non-decreasing; coalesce regressions.
                let mut latest = self.latest_progress.lock().unwrap();
                let clamped = percent.max(*latest);
                *latest = clamped;
                self.push_record(
                    "progress",
                    &format!("{:.1}% @ {}", clamped, current_candidate),
                    elapsed,
                );
                self.broadcast_notification(Notification {
                    id: self.next_id.fetch_add(1, Ordering::Relaxed),
                    kind: "progress".into(),
                    level: None,
                    stage: None,
                    message: None,
                    percent: Some(clamped),
                    current_candidate: Some(current_candidate.clone()),
                    status: None,
                    timestamp_ms: now_ms(),
                });
            }
            Event::Complete { status, message } => {
                eprintln!("[{}] COMPLETE {} {:?}", tag, status, message);
                self.push_record("complete", status, elapsed);
                self.broadcast_notification(Notification {
                    id: self.next_id.fetch_add(1, Ordering::Relaxed),
                    kind: "complete".into(),
                    level: None,
                    stage: None,
                    message: message.clone(),
                    percent: None,
                    current_candidate: None,
                    status: Some(status.clone()),
                    timestamp_ms: now_ms(),
                });
            }
        }
    }

    /// Get recent notifications for new WS connections.
    pub fn recent_notifications(&self, limit: usize) -> Vec<Notification> {
        let notifs = self.notifications.lock().unwrap();
        notifs.iter().rev().take(limit).cloned().collect()
    }

    /// Get recent events for the API.
    pub fn recent_events(&self, limit: usize) -> Vec<EventRecord> {
        let events = self.recent.lock().unwrap();
        events.iter().rev().take(limit).cloned().collect()
    }

    fn push_record(&self, kind: &str, message: &str, elapsed: f64) {
        let mut recent = self.recent.lock().unwrap();
        if recent.len() >= RECENT_EVENTS_CAP {
            recent.pop_front();
        }
        recent.push_back(EventRecord {
            sequence: self.next_sequence.fetch_add(1, Ordering::Relaxed),
            kind: kind.into(),
            message: message.into(),
            elapsed_secs: elapsed,
        });
    }

    fn broadcast_notification(&self, notification: Notification) {
        {
            let mut notifs = self.notifications.lock().unwrap();
            if notifs.len() >= NOTIFICATIONS_CAP {
                notifs.pop_front();
            }
            notifs.push_back(notification.clone());
        }
        if let Some(sender) = self.ws_sender.lock().unwrap().as_ref() {
            let json = serde_json::to_string(&notification).unwrap_or_default();
            let _ = sender.send(json);
        }
    }
}
