use std::sync::Mutex;

use async_trait::async_trait;

use crate::domain::model::ResultRow;
use crate::domain::repository::ResultStore;
use crate::error::{RelayError, RelayResult};

#[derive(Default)]
struct MemoryState {
    schema: bool,
    closed: bool,
    next_id: i64,
    rows: Vec<ResultRow>,
    failing_inserts: usize,
}

/// 内存结果存储
///
/// 与 PostgreSQL 实现遵循相同约定：未建表时插入失败，`close` 之后任何操作失败，
/// id 单调递增且删表后不回退。用于测试和不连接数据库的演练。
#[derive(Default)]
pub struct InMemoryResultStore {
    state: Mutex<MemoryState>,
}

impl InMemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 让接下来的 `count` 次插入失败
    pub fn fail_next_inserts(&self, count: usize) {
        self.lock().failing_inserts = count;
    }

    pub fn len(&self) -> usize {
        self.lock().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        // 锁内没有会 panic 的操作，中毒时直接沿用内部状态
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn open_state(&self) -> RelayResult<std::sync::MutexGuard<'_, MemoryState>> {
        let state = self.lock();
        if state.closed {
            return Err(RelayError::store_closed());
        }
        Ok(state)
    }
}

#[async_trait]
impl ResultStore for InMemoryResultStore {
    async fn ensure_schema(&self) -> RelayResult<()> {
        self.open_state()?.schema = true;
        Ok(())
    }

    async fn insert(
        &self,
        round: &str,
        air_date_group: &str,
        question: &str,
        value: i32,
    ) -> RelayResult<i64> {
        let mut state = self.open_state()?;
        if !state.schema {
            return Err(RelayError::persistence("relation \"results\" does not exist"));
        }
        if state.failing_inserts > 0 {
            state.failing_inserts -= 1;
            return Err(RelayError::persistence("injected insert failure"));
        }

        state.next_id += 1;
        let id = state.next_id;
        state.rows.push(ResultRow {
            id,
            round: round.to_string(),
            air_date_group: air_date_group.to_string(),
            question: question.to_string(),
            value,
        });
        Ok(id)
    }

    async fn drop_schema(&self) -> RelayResult<()> {
        let mut state = self.open_state()?;
        state.schema = false;
        state.rows.clear();
        Ok(())
    }

    async fn fetch_all(&self) -> RelayResult<Vec<ResultRow>> {
        let state = self.open_state()?;
        if !state.schema {
            return Err(RelayError::persistence("relation \"results\" does not exist"));
        }
        Ok(state.rows.clone())
    }

    async fn close(&self) -> RelayResult<()> {
        let mut state = self.lock();
        if state.closed {
            return Err(RelayError::persistence("result store already closed"));
        }
        state.closed = true;
        Ok(())
    }
}
