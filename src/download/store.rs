use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::download::errors::TaskError;
use crate::download::task::{DownloadTask, TaskStatus};

pub type Result<T> = std::result::Result<T, TaskError>;

/// Shared in-memory task table. All account scoping happens here: a lookup
/// with a non-matching accountHash behaves exactly like a missing id, so
/// callers cannot distinguish "not yours" from "does not exist".
///
/// Every method takes the write or read lock for a map operation only and
/// releases it before returning. Transfer jobs never hold the lock across IO.
#[derive(Clone, Default)]
pub struct TaskStore {
    inner: Arc<RwLock<HashMap<String, DownloadTask>>>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, task: DownloadTask) {
        self.inner.write().await.insert(task.id.clone(), task);
    }

    /// Tasks for one account, or every task when no filter is given, newest
    /// first.
    pub async fn list(&self, account_hash: Option<&str>) -> Vec<DownloadTask> {
        let map = self.inner.read().await;
        let mut tasks: Vec<DownloadTask> = map
            .values()
            .filter(|t| account_hash.is_none_or(|h| t.account_hash == h))
            .cloned()
            .collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        tasks
    }

    pub async fn get(&self, id: &str, account_hash: &str) -> Result<DownloadTask> {
        let map = self.inner.read().await;
        map.get(id)
            .filter(|t| t.account_hash == account_hash)
            .cloned()
            .ok_or(TaskError::NotFound)
    }

    /// Unscoped lookup for the delivery routes, which authenticate by task id
    /// alone (the id is the capability).
    pub async fn get_any(&self, id: &str) -> Result<DownloadTask> {
        let map = self.inner.read().await;
        map.get(id).cloned().ok_or(TaskError::NotFound)
    }

    pub async fn remove(&self, id: &str, account_hash: &str) -> Result<DownloadTask> {
        let mut map = self.inner.write().await;
        match map.get(id) {
            Some(t) if t.account_hash == account_hash => {}
            _ => return Err(TaskError::NotFound),
        }
        map.remove(id).ok_or(TaskError::NotFound)
    }

    /// Applies an in-place mutation. Internal only; status changes must go
    /// through [`transition`](Self::transition).
    pub async fn update<F>(&self, id: &str, f: F) -> Result<DownloadTask>
    where
        F: FnOnce(&mut DownloadTask),
    {
        let mut map = self.inner.write().await;
        let task = map.get_mut(id).ok_or(TaskError::NotFound)?;
        f(task);
        Ok(task.clone())
    }

    /// Moves a task to `next`, enforcing the lifecycle table. The check and
    /// the write happen under one lock acquisition so concurrent operations
    /// cannot race a task into an illegal state.
    pub async fn transition(
        &self,
        id: &str,
        next: TaskStatus,
        action: &'static str,
    ) -> Result<DownloadTask> {
        let mut map = self.inner.write().await;
        let task = map.get_mut(id).ok_or(TaskError::NotFound)?;
        if !task.status.can_transition(next) {
            return Err(TaskError::InvalidState {
                status: task.status,
                action,
            });
        }
        task.status = next;
        if next != TaskStatus::Downloading {
            task.speed = String::new();
        }
        Ok(task.clone())
    }
}
