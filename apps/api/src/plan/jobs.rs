//! Job records and the store that holds them.
//!
//! One record per [`JobKey`]. Lifecycle: `claim` writes `running`, then the
//! claiming worker calls `finish` exactly once with `ready` or `error`. The
//! conditional primitives make "only one worker generates per key" a real
//! invariant rather than a read-then-write race.

use std::collections::HashMap;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Script};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;
use uuid::Uuid;

use crate::errors::StoreError;
use crate::plan::canonical::JobKey;
use crate::plan::document::PlanDocument;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Ready,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<PlanDocument>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
    pub created_at: DateTime<Utc>,
    pub request_id: Uuid,
}

impl JobRecord {
    pub fn running(request_id: Uuid) -> Self {
        Self {
            status: JobStatus::Running,
            data: None,
            error: None,
            preview: None,
            created_at: Utc::now(),
            request_id,
        }
    }

    pub fn into_ready(self, data: PlanDocument) -> Self {
        Self {
            status: JobStatus::Ready,
            data: Some(data),
            error: None,
            preview: None,
            ..self
        }
    }

    pub fn into_failed(self, error: String, preview: Option<String>) -> Self {
        Self {
            status: JobStatus::Error,
            data: None,
            error: Some(error),
            preview,
            ..self
        }
    }

    /// Whether this record blocks a new claim on its key. A ready record
    /// without a document is treated like a failed one.
    pub fn is_live(&self) -> bool {
        match self.status {
            JobStatus::Running => true,
            JobStatus::Ready => self.data.is_some(),
            JobStatus::Error => false,
        }
    }
}

/// Status of a key as seen by callers, including "nothing stored".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    Absent,
    Running,
    Ready,
    Error,
}

/// Body of the status endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatusView {
    pub status: StatusKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<PlanDocument>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl From<Option<JobRecord>> for JobStatusView {
    fn from(record: Option<JobRecord>) -> Self {
        let Some(record) = record else {
            return JobStatusView {
                status: StatusKind::Absent,
                data: None,
                error: None,
                preview: None,
                request_id: None,
                created_at: None,
            };
        };
        JobStatusView {
            status: match record.status {
                JobStatus::Running => StatusKind::Running,
                JobStatus::Ready => StatusKind::Ready,
                JobStatus::Error => StatusKind::Error,
            },
            data: record.data,
            error: record.error,
            preview: record.preview,
            request_id: Some(record.request_id),
            created_at: Some(record.created_at),
        }
    }
}

/// Key-value store of job records.
///
/// Carried in `AppState` as `Arc<dyn JobStore>`.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn get(&self, key: &JobKey) -> Result<Option<JobRecord>, StoreError>;

    /// Unconditional write.
    async fn set(&self, key: &JobKey, record: &JobRecord) -> Result<(), StoreError>;

    /// Writes `record` only if the key is absent or holds an `error` record.
    /// Returns `false` when a `running` or `ready` record already owns the key.
    async fn claim(&self, key: &JobKey, record: &JobRecord) -> Result<bool, StoreError>;

    /// Writes the terminal `record` only while the key still holds the
    /// `running` record with the same `request_id`, or nothing at all (the
    /// running record expired). Returns `false` when ownership was lost.
    async fn finish(&self, key: &JobKey, record: &JobRecord) -> Result<bool, StoreError>;
}

// ────────────────────────────────────────────────────────────────────────────
// Redis backend
// ────────────────────────────────────────────────────────────────────────────

/// KEYS[1] = record key, ARGV[1] = record json, ARGV[2] = running ttl (ms).
const CLAIM_LUA: &str = r#"
local current = redis.call('GET', KEYS[1])
if current then
  local ok, rec = pcall(cjson.decode, current)
  if ok and type(rec) == 'table' then
    local has_data = rec.data ~= nil and rec.data ~= cjson.null
    if rec.status == 'running' or (rec.status == 'ready' and has_data) then
      return 0
    end
  end
end
redis.call('SET', KEYS[1], ARGV[1], 'PX', ARGV[2])
return 1
"#;

/// KEYS[1] = record key, ARGV[1] = record json, ARGV[2] = owning request id.
const FINISH_LUA: &str = r#"
local current = redis.call('GET', KEYS[1])
if current then
  local ok, rec = pcall(cjson.decode, current)
  if not ok or rec.status ~= 'running' or rec.request_id ~= ARGV[2] then
    return 0
  end
end
redis.call('SET', KEYS[1], ARGV[1])
return 1
"#;

static CLAIM_SCRIPT: LazyLock<Script> = LazyLock::new(|| Script::new(CLAIM_LUA));
static FINISH_SCRIPT: LazyLock<Script> = LazyLock::new(|| Script::new(FINISH_LUA));

/// Redis-backed store. Claim and finish run as Lua scripts so each
/// check-and-write is atomic on the server.
#[derive(Clone)]
pub struct RedisJobStore {
    conn: MultiplexedConnection,
    running_ttl: Duration,
}

impl RedisJobStore {
    pub async fn connect(
        client: &redis::Client,
        running_ttl: Duration,
    ) -> Result<Self, StoreError> {
        let conn = client.get_multiplexed_async_connection().await?;
        Ok(Self { conn, running_ttl })
    }

    fn ttl_ms(&self) -> u64 {
        self.running_ttl.as_millis().max(1) as u64
    }
}

#[async_trait]
impl JobStore for RedisJobStore {
    async fn get(&self, key: &JobKey) -> Result<Option<JobRecord>, StoreError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(key.storage_key()).await?;
        Ok(raw.map(|raw| serde_json::from_str(&raw)).transpose()?)
    }

    async fn set(&self, key: &JobKey, record: &JobRecord) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let payload = serde_json::to_string(record)?;
        let mut cmd = redis::cmd("SET");
        cmd.arg(key.storage_key()).arg(payload);
        if record.status == JobStatus::Running {
            cmd.arg("PX").arg(self.ttl_ms());
        }
        cmd.query_async::<_, ()>(&mut conn).await?;
        Ok(())
    }

    async fn claim(&self, key: &JobKey, record: &JobRecord) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let claimed: i64 = CLAIM_SCRIPT
            .key(key.storage_key())
            .arg(serde_json::to_string(record)?)
            .arg(self.ttl_ms())
            .invoke_async(&mut conn)
            .await?;
        Ok(claimed == 1)
    }

    async fn finish(&self, key: &JobKey, record: &JobRecord) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let written: i64 = FINISH_SCRIPT
            .key(key.storage_key())
            .arg(serde_json::to_string(record)?)
            .arg(record.request_id.to_string())
            .invoke_async(&mut conn)
            .await?;
        Ok(written == 1)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// In-process backend
// ────────────────────────────────────────────────────────────────────────────

struct Slot {
    record: JobRecord,
    expires_at: Option<Instant>,
}

impl Slot {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

/// Single-process store. Same claim/finish semantics as the Redis backend,
/// including expiry of `running` records.
pub struct MemoryJobStore {
    slots: Mutex<HashMap<JobKey, Slot>>,
    running_ttl: Duration,
}

impl MemoryJobStore {
    pub fn new(running_ttl: Duration) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            running_ttl,
        }
    }

    fn slot(&self, record: &JobRecord) -> Slot {
        Slot {
            record: record.clone(),
            expires_at: (record.status == JobStatus::Running)
                .then(|| Instant::now() + self.running_ttl),
        }
    }
}

fn live_record<'a>(slots: &'a mut HashMap<JobKey, Slot>, key: &JobKey) -> Option<&'a JobRecord> {
    if slots.get(key).is_some_and(Slot::is_expired) {
        slots.remove(key);
    }
    slots.get(key).map(|slot| &slot.record)
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn get(&self, key: &JobKey) -> Result<Option<JobRecord>, StoreError> {
        let mut slots = self.slots.lock().await;
        Ok(live_record(&mut slots, key).cloned())
    }

    async fn set(&self, key: &JobKey, record: &JobRecord) -> Result<(), StoreError> {
        let slot = self.slot(record);
        self.slots.lock().await.insert(key.clone(), slot);
        Ok(())
    }

    async fn claim(&self, key: &JobKey, record: &JobRecord) -> Result<bool, StoreError> {
        let mut slots = self.slots.lock().await;
        if live_record(&mut slots, key).is_some_and(JobRecord::is_live) {
            return Ok(false);
        }
        let slot = self.slot(record);
        slots.insert(key.clone(), slot);
        Ok(true)
    }

    async fn finish(&self, key: &JobKey, record: &JobRecord) -> Result<bool, StoreError> {
        let mut slots = self.slots.lock().await;
        let owned = match live_record(&mut slots, key) {
            None => true,
            Some(current) => {
                current.status == JobStatus::Running && current.request_id == record.request_id
            }
        };
        if owned {
            let slot = self.slot(record);
            slots.insert(key.clone(), slot);
        }
        Ok(owned)
    }
}
