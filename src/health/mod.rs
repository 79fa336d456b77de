//! Process-wide component health, fed by the channel supervisors and the
//! bot lifecycle, summarized in the log at shutdown.

use std::collections::BTreeMap;
use std::sync::OnceLock;
use std::time::Instant;

use chrono::Utc;
use parking_lot::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComponentStatus {
    Starting,
    Ok,
    Error,
}

impl ComponentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentStatus::Starting => "starting",
            ComponentStatus::Ok => "ok",
            ComponentStatus::Error => "error",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    pub updated_at: String,
    pub last_error: Option<String>,
    pub restart_count: u64,
}

#[derive(Debug, Clone)]
pub struct HealthSnapshot {
    pub uptime_seconds: u64,
    pub components: BTreeMap<String, ComponentHealth>,
}

struct HealthRegistry {
    started_at: Instant,
    components: Mutex<BTreeMap<String, ComponentHealth>>,
}

static REGISTRY: OnceLock<HealthRegistry> = OnceLock::new();

fn registry() -> &'static HealthRegistry {
    REGISTRY.get_or_init(|| HealthRegistry {
        started_at: Instant::now(),
        components: Mutex::new(BTreeMap::new()),
    })
}

fn upsert<F>(component: &str, update: F)
where
    F: FnOnce(&mut ComponentHealth),
{
    let mut map = registry().components.lock();
    let entry = map
        .entry(component.to_string())
        .or_insert_with(|| ComponentHealth {
            status: ComponentStatus::Starting,
            updated_at: String::new(),
            last_error: None,
            restart_count: 0,
        });
    update(entry);
    entry.updated_at = Utc::now().to_rfc3339();
}

pub fn mark_ok(component: &str) {
    upsert(component, |entry| {
        entry.status = ComponentStatus::Ok;
        entry.last_error = None;
    });
}

#[allow(clippy::needless_pass_by_value)]
pub fn mark_error(component: &str, error: impl ToString) {
    let error = error.to_string();
    upsert(component, move |entry| {
        entry.status = ComponentStatus::Error;
        entry.last_error = Some(error);
    });
}

pub fn bump_restart(component: &str) {
    upsert(component, |entry| {
        entry.restart_count = entry.restart_count.saturating_add(1);
    });
}

pub fn snapshot() -> HealthSnapshot {
    HealthSnapshot {
        uptime_seconds: registry().started_at.elapsed().as_secs(),
        components: registry().components.lock().clone(),
    }
}
