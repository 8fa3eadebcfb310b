use crate::error::RegisterEngineError;
use crate::models::{AuditEvent, AuditEventStatus};
use crate::paths::RegisterPaths;
use serde::{Deserialize, Serialize};

pub const DEFAULT_AUDIT_LOG_LIMIT: usize = 1000;

/// Append-only record of mutating runs, ring-limited. Dry runs are never
/// recorded.
#[derive(Debug, Clone)]
pub struct RegisterAuditStore {
    paths: RegisterPaths,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AuditLogPayload {
    version: u32,
    #[serde(default)]
    events: Vec<AuditEvent>,
}

impl Default for RegisterAuditStore {
    fn default() -> Self {
        Self {
            paths: RegisterPaths::detect(),
        }
    }
}

impl RegisterAuditStore {
    pub fn new(paths: RegisterPaths) -> Self {
        Self { paths }
    }

    pub fn load_events(&self) -> Vec<AuditEvent> {
        let Ok(data) = std::fs::read(&self.paths.audit_log_path) else {
            return Vec::new();
        };

        serde_json::from_slice::<AuditLogPayload>(&data)
            .map(|payload| payload.events)
            .unwrap_or_default()
    }

    pub fn append_event(
        &self,
        event: AuditEvent,
        max_events: usize,
    ) -> Result<(), RegisterEngineError> {
        let mut events = self.load_events();
        events.push(event);

        if max_events > 0 && events.len() > max_events {
            let drop_count = events.len() - max_events;
            events.drain(0..drop_count);
        }

        self.save_events(&events)
    }

    pub fn list_events(
        &self,
        limit: Option<usize>,
        status_filter: Option<AuditEventStatus>,
    ) -> Vec<AuditEvent> {
        let max = limit.unwrap_or(50).max(1);
        self.load_events()
            .into_iter()
            .rev()
            .filter(|event| {
                status_filter
                    .map(|status| event.status == status)
                    .unwrap_or(true)
            })
            .take(max)
            .collect()
    }

    fn save_events(&self, events: &[AuditEvent]) -> Result<(), RegisterEngineError> {
        self.paths
            .ensure_runtime_dir()
            .map_err(|error| RegisterEngineError::io(&self.paths.runtime_directory, error))?;
        let payload = AuditLogPayload {
            version: 1,
            events: events.to_vec(),
        };
        let mut data = serde_json::to_vec_pretty(&payload)?;
        data.push(b'\n');
        std::fs::write(&self.paths.audit_log_path, data)
            .map_err(|error| RegisterEngineError::io(&self.paths.audit_log_path, error))
    }
}

#[cfg(test)]
mod tests {
    use super::RegisterAuditStore;
    use crate::models::{AuditEvent, AuditEventStatus};
    use crate::paths::RegisterPaths;
    use tempfile::tempdir;

    fn event(id: usize, status: AuditEventStatus) -> AuditEvent {
        AuditEvent {
            id: format!("event-{id}"),
            occurred_at: String::from("2026-08-01T09:00:00Z"),
            action: String::from("apply"),
            status,
            summary: format!("summary-{id}"),
            paths: vec![format!("/tmp/config-{id}.json")],
        }
    }

    #[test]
    fn append_event_keeps_ring_limit() {
        let dir = tempdir().expect("tempdir");
        let store = RegisterAuditStore::new(RegisterPaths::from_runtime(dir.path().to_path_buf()));
        let limit = 5usize;

        for id in 0..(limit + 3) {
            store
                .append_event(event(id, AuditEventStatus::Success), limit)
                .expect("append");
        }

        let events = store.load_events();
        assert_eq!(events.len(), limit);
        assert_eq!(events.first().map(|item| item.id.as_str()), Some("event-3"));
    }

    #[test]
    fn list_events_filters_by_status() {
        let dir = tempdir().expect("tempdir");
        let store = RegisterAuditStore::new(RegisterPaths::from_runtime(dir.path().to_path_buf()));

        store
            .append_event(event(1, AuditEventStatus::Success), 100)
            .expect("append");
        store
            .append_event(event(2, AuditEventStatus::Failed), 100)
            .expect("append");

        let failed = store.list_events(Some(10), Some(AuditEventStatus::Failed));
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].id, "event-2");
    }
}
