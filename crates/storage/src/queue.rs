//! Task queues carrying typed [`TaskEnvelope`] messages between services.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use redis::{aio::MultiplexedConnection, streams::*, AsyncCommands, Client};
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use storm_common::{StormError, StormResult, TaskEnvelope, TaskMessage};

const STREAM_KEY: &str = "storm:tasks";
const CONSUMER_GROUP: &str = "acquisition-workers";

/// A task handed to one consumer; acknowledge it once handled.
#[derive(Debug, Clone)]
pub struct ClaimedTask {
    pub entry_id: String,
    pub envelope: TaskEnvelope,
}

/// Delivery channel for stage tasks.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Enqueue a message, returning the queue entry id.
    async fn enqueue(&self, message: TaskMessage) -> StormResult<String>;

    /// Claim the next available task for `consumer`, if any.
    async fn claim_next(&self, consumer: &str) -> StormResult<Option<ClaimedTask>>;

    /// Acknowledge a claimed task so it is not redelivered.
    async fn ack(&self, entry_id: &str) -> StormResult<()>;
}

/// Redis Streams task queue with a single consumer group.
pub struct RedisTaskQueue {
    conn: MultiplexedConnection,
    block_ms: usize,
}

fn queue_err(context: &str, e: redis::RedisError) -> StormError {
    StormError::Queue(format!("{}: {}", context, e))
}

impl RedisTaskQueue {
    /// Connect to Redis and initialize the stream.
    pub async fn connect(redis_url: &str) -> StormResult<Self> {
        let client =
            Client::open(redis_url).map_err(|e| queue_err("Redis connection failed", e))?;

        let mut conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| queue_err("Redis connection failed", e))?;

        // Create consumer group if it doesn't exist
        let _: Result<(), _> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(STREAM_KEY)
            .arg(CONSUMER_GROUP)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        Ok(Self {
            conn,
            block_ms: 5000,
        })
    }
}

#[async_trait]
impl TaskQueue for RedisTaskQueue {
    #[instrument(skip(self, message), fields(task = message.kind()))]
    async fn enqueue(&self, message: TaskMessage) -> StormResult<String> {
        let envelope = TaskEnvelope::new(message);
        let task_json = serde_json::to_string(&envelope)?;

        let mut conn = self.conn.clone();
        let entry_id: String = redis::cmd("XADD")
            .arg(STREAM_KEY)
            .arg("*")
            .arg("task_id")
            .arg(envelope.id.to_string())
            .arg("data")
            .arg(&task_json)
            .query_async(&mut conn)
            .await
            .map_err(|e| queue_err("Enqueue failed", e))?;

        debug!(entry_id = %entry_id, task_id = %envelope.id, "Task enqueued");
        Ok(entry_id)
    }

    async fn claim_next(&self, consumer: &str) -> StormResult<Option<ClaimedTask>> {
        let opts = StreamReadOptions::default()
            .group(CONSUMER_GROUP, consumer)
            .count(1)
            .block(self.block_ms);

        let mut conn = self.conn.clone();
        let result: StreamReadReply = conn
            .xread_options(&[STREAM_KEY], &[">"], &opts)
            .await
            .map_err(|e| queue_err("Read failed", e))?;

        for stream_key in result.keys {
            for entry in stream_key.ids {
                if let Some(data) = entry.map.get("data") {
                    let bytes: Vec<u8> = redis::from_redis_value(data)
                        .map_err(|e| StormError::Queue(format!("Parse failed: {}", e)))?;
                    let envelope: TaskEnvelope = serde_json::from_slice(&bytes)?;
                    return Ok(Some(ClaimedTask {
                        entry_id: entry.id,
                        envelope,
                    }));
                }
            }
        }

        Ok(None)
    }

    async fn ack(&self, entry_id: &str) -> StormResult<()> {
        let mut conn = self.conn.clone();
        let _: i64 = conn
            .xack(STREAM_KEY, CONSUMER_GROUP, &[entry_id])
            .await
            .map_err(|e| queue_err("Ack failed", e))?;
        Ok(())
    }
}

#[derive(Default)]
struct MemoryQueueState {
    next_id: u64,
    ready: VecDeque<ClaimedTask>,
    pending: HashMap<String, ClaimedTask>,
}

/// In-process queue with the same claim/ack contract as the Redis queue.
#[derive(Default)]
pub struct MemoryTaskQueue {
    state: Mutex<MemoryQueueState>,
}

impl MemoryTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages not yet claimed, oldest first.
    pub async fn queued(&self) -> Vec<TaskMessage> {
        let state = self.state.lock().await;
        state.ready.iter().map(|t| t.envelope.message.clone()).collect()
    }

    /// Number of claimed but unacknowledged tasks.
    pub async fn pending_count(&self) -> usize {
        self.state.lock().await.pending.len()
    }
}

#[async_trait]
impl TaskQueue for MemoryTaskQueue {
    async fn enqueue(&self, message: TaskMessage) -> StormResult<String> {
        let mut state = self.state.lock().await;
        state.next_id += 1;
        let entry_id = format!("{}-0", state.next_id);
        state.ready.push_back(ClaimedTask {
            entry_id: entry_id.clone(),
            envelope: TaskEnvelope::new(message),
        });
        Ok(entry_id)
    }

    async fn claim_next(&self, _consumer: &str) -> StormResult<Option<ClaimedTask>> {
        let mut state = self.state.lock().await;
        let Some(task) = state.ready.pop_front() else {
            return Ok(None);
        };
        state.pending.insert(task.entry_id.clone(), task.clone());
        Ok(Some(task))
    }

    async fn ack(&self, entry_id: &str) -> StormResult<()> {
        self.state.lock().await.pending.remove(entry_id);
        Ok(())
    }
}
