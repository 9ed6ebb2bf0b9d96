use crate::execution::order_sequencer::BracketRecord;
use crate::Result;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tokio::time::{timeout, Duration};

#[cfg(test)]
use std::collections::HashMap;
#[cfg(test)]
use std::sync::Mutex;

/// Durable record of bracket progress
///
/// One record per symbol, overwritten as the sequence advances. After a crash
/// the records left in a degraded state tell the operator which entries may be
/// sitting without protection.
#[async_trait]
pub trait BracketJournal: Send + Sync {
    async fn record(&self, record: &BracketRecord) -> Result<()>;
    async fn remove(&self, symbol: &str) -> Result<()>;
    async fn load_all(&self) -> Result<Vec<BracketRecord>>;
}

/// Log every journaled bracket that never reached full protection
pub async fn report_unfinished(journal: &dyn BracketJournal) -> Result<Vec<BracketRecord>> {
    let unfinished: Vec<BracketRecord> = journal
        .load_all()
        .await?
        .into_iter()
        .filter(|r| r.state.is_degraded())
        .collect();

    for record in &unfinished {
        tracing::warn!(
            "⚠️  Unfinished bracket from previous run: {} {} in state {} (entry {})",
            record.symbol,
            record.side,
            record.state,
            record.entry_order_id.as_deref().unwrap_or("-")
        );
    }

    Ok(unfinished)
}

/// Redis-backed bracket journal
///
/// Stores each record as JSON under `bracket:{symbol}`
pub struct RedisBracketJournal {
    conn: ConnectionManager,
}

const KEY_PREFIX: &str = "bracket:";

fn key(symbol: &str) -> String {
    format!("{}{}", KEY_PREFIX, symbol)
}

impl RedisBracketJournal {
    /// Connect to Redis
    ///
    /// # Arguments
    /// * `redis_url` - Redis connection URL (e.g., "redis://127.0.0.1:6379")
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)?;

        let conn = timeout(Duration::from_secs(5), ConnectionManager::new(client))
            .await
            .map_err(|_| "Redis connection timeout after 5 seconds")??;

        tracing::info!("Connected to Redis at {}", redis_url);

        Ok(Self { conn })
    }
}

#[async_trait]
impl BracketJournal for RedisBracketJournal {
    async fn record(&self, record: &BracketRecord) -> Result<()> {
        let value = serde_json::to_string(record)?;
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(key(&record.symbol), value).await?;

        tracing::debug!("Journaled {} bracket state {}", record.symbol, record.state);

        Ok(())
    }

    async fn remove(&self, symbol: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key(symbol)).await?;
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<BracketRecord>> {
        let mut conn = self.conn.clone();
        let keys: Vec<String> = conn.keys(format!("{}*", KEY_PREFIX)).await?;

        let mut records = Vec::with_capacity(keys.len());
        for k in keys {
            let value: Option<String> = conn.get(&k).await?;
            if let Some(json) = value {
                match serde_json::from_str::<BracketRecord>(&json) {
                    Ok(record) => records.push(record),
                    Err(e) => tracing::warn!("Skipping unreadable journal entry {}: {}", k, e),
                }
            }
        }

        tracing::info!("Loaded {} bracket records from Redis", records.len());

        Ok(records)
    }
}

/// In-memory journal for tests
#[cfg(test)]
#[derive(Default)]
pub struct MemoryJournal {
    records: Mutex<HashMap<String, BracketRecord>>,
}

#[cfg(test)]
impl MemoryJournal {
    pub fn get(&self, symbol: &str) -> Option<BracketRecord> {
        self.records.lock().unwrap().get(symbol).cloned()
    }
}

#[cfg(test)]
#[async_trait]
impl BracketJournal for MemoryJournal {
    async fn record(&self, record: &BracketRecord) -> Result<()> {
        self.records
            .lock()
            .unwrap()
            .insert(record.symbol.clone(), record.clone());
        Ok(())
    }

    async fn remove(&self, symbol: &str) -> Result<()> {
        self.records.lock().unwrap().remove(symbol);
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<BracketRecord>> {
        Ok(self.records.lock().unwrap().values().cloned().collect())
    }
}
