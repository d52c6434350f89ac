//! The task store contract and an in-process implementation.
//!
//! Every operation is scoped to the verified [`Identity`]; a task owned by
//! someone else is indistinguishable from a task that does not exist.

use crate::error::{Error, Result};
use crate::models::{Identity, NewTask, Task, TaskPatch};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

#[async_trait]
pub trait TaskStore: Send + Sync {
    /// All of the owner's tasks, newest first.
    async fn list_tasks(&self, owner: &Identity) -> Result<Vec<Task>>;

    /// Inserts a task; id and timestamps are assigned by the store.
    async fn create_task(&self, draft: &NewTask, owner: &Identity) -> Result<Task>;

    async fn update_task(&self, owner: &Identity, id: Uuid, patch: &TaskPatch) -> Result<Task>;

    async fn delete_task(&self, owner: &Identity, id: Uuid) -> Result<()>;
}

/// Keeps rows in memory in insertion order.
#[derive(Debug, Default)]
pub struct MemoryTaskStore {
    tasks: RwLock<Vec<Task>>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tasks(tasks: Vec<Task>) -> Self {
        MemoryTaskStore {
            tasks: RwLock::new(tasks),
        }
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub async fn len(&self) -> usize {
        self.tasks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tasks.read().await.is_empty()
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn list_tasks(&self, owner: &Identity) -> Result<Vec<Task>> {
        let tasks = self.tasks.read().await;
        let mut owned: Vec<Task> = tasks
            .iter()
            .filter(|task| task.owner_id == owner.user_id)
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(owned)
    }

    async fn create_task(&self, draft: &NewTask, owner: &Identity) -> Result<Task> {
        draft.validate()?;
        let now = Utc::now();
        let task = Task {
            id: Uuid::new_v4(),
            title: draft.title.clone(),
            description: draft.description.clone(),
            status: draft.status,
            extras: draft.extras.clone(),
            owner_id: owner.user_id.clone(),
            created_at: now,
            updated_at: now,
        };
        debug!(task_id = %task.id, owner = %owner.user_id, "Creating task in memory");
        self.tasks.write().await.push(task.clone());
        Ok(task)
    }

    async fn update_task(&self, owner: &Identity, id: Uuid, patch: &TaskPatch) -> Result<Task> {
        patch.validate()?;
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .iter_mut()
            .find(|task| task.id == id && task.owner_id == owner.user_id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        patch.apply_to(task);
        task.updated_at = Utc::now().max(task.created_at);
        debug!(task_id = %id, "Updated task in memory");
        Ok(task.clone())
    }

    async fn delete_task(&self, owner: &Identity, id: Uuid) -> Result<()> {
        let mut tasks = self.tasks.write().await;
        let position = tasks
            .iter()
            .position(|task| task.id == id && task.owner_id == owner.user_id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        tasks.remove(position);
        debug!(task_id = %id, "Deleted task from memory");
        Ok(())
    }
}
