use std::fmt::Debug;
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;
use tracing::{debug, info};
use uuid::Uuid;

use crate::account::User;
use crate::filter::category_eq;
use crate::task::{Task, TaskList};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("list name already exists: {0}")]
    DuplicateListName(String),

    #[error("email already registered: {0}")]
    DuplicateEmail(String),

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

pub type TaskPredicate<'a> = &'a dyn Fn(&Task) -> bool;

/// Owner-scoped document store. Every call touches only documents whose
/// `owner` matches; writes are atomic per document.
pub trait Store: Debug + Send + Sync {
    fn find_tasks(&self, owner: &str) -> StoreResult<Vec<Task>>;

    fn get_task(&self, owner: &str, id: Uuid) -> StoreResult<Option<Task>>;

    fn insert_task(&self, task: Task) -> StoreResult<()>;

    /// Replaces the stored task with the same `(owner, id)`. Returns `false`
    /// when there is none.
    fn replace_task(&self, task: &Task) -> StoreResult<bool>;

    fn delete_task(&self, owner: &str, id: Uuid) -> StoreResult<bool>;

    fn delete_tasks_where(&self, owner: &str, pred: TaskPredicate<'_>) -> StoreResult<usize>;

    fn update_tasks_where(
        &self,
        owner: &str,
        pred: TaskPredicate<'_>,
        patch: &dyn Fn(&mut Task),
    ) -> StoreResult<usize>;

    /// Writes `order` for each listed id owned by `owner`; other ids are
    /// skipped. Returns the number of tasks written.
    fn set_task_orders(&self, owner: &str, orders: &[(Uuid, f64)]) -> StoreResult<usize>;

    fn find_lists(&self, owner: &str) -> StoreResult<Vec<TaskList>>;

    fn get_list(&self, owner: &str, id: Uuid) -> StoreResult<Option<TaskList>>;

    /// Fails with `DuplicateListName` when `(owner, name)` is taken, names
    /// compared trimmed and case-insensitively.
    fn insert_list(&self, list: TaskList) -> StoreResult<()>;

    fn replace_list(&self, list: &TaskList) -> StoreResult<bool>;

    fn delete_list(&self, owner: &str, id: Uuid) -> StoreResult<bool>;

    /// `email` is matched as stored; callers normalise it first.
    fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    /// Fails with `DuplicateEmail` when the email is registered.
    fn insert_user(&self, user: User) -> StoreResult<()>;
}

#[derive(Debug, Default, Clone)]
struct Collections {
    tasks: Vec<Task>,
    lists: Vec<TaskList>,
    users: Vec<User>,
}

impl Collections {
    fn find_tasks(&self, owner: &str) -> Vec<Task> {
        self.tasks
            .iter()
            .filter(|t| t.owner == owner)
            .cloned()
            .collect()
    }

    fn get_task(&self, owner: &str, id: Uuid) -> Option<Task> {
        self.tasks
            .iter()
            .find(|t| t.id == id && t.owner == owner)
            .cloned()
    }

    fn replace_task(&mut self, task: &Task) -> bool {
        match self
            .tasks
            .iter_mut()
            .find(|t| t.id == task.id && t.owner == task.owner)
        {
            Some(slot) => {
                *slot = task.clone();
                true
            }
            None => false,
        }
    }

    fn delete_tasks_where(&mut self, owner: &str, pred: TaskPredicate<'_>) -> usize {
        let before = self.tasks.len();
        self.tasks.retain(|t| !(t.owner == owner && pred(t)));
        before - self.tasks.len()
    }

    fn update_tasks_where(
        &mut self,
        owner: &str,
        pred: TaskPredicate<'_>,
        patch: &dyn Fn(&mut Task),
    ) -> usize {
        let mut touched = 0;
        for task in self.tasks.iter_mut().filter(|t| t.owner == owner) {
            if pred(task) {
                patch(task);
                touched += 1;
            }
        }
        touched
    }

    fn set_task_orders(&mut self, owner: &str, orders: &[(Uuid, f64)]) -> usize {
        let mut touched = 0;
        for (id, order) in orders {
            if let Some(task) = self
                .tasks
                .iter_mut()
                .find(|t| t.id == *id && t.owner == owner)
            {
                task.order = *order;
                touched += 1;
            }
        }
        touched
    }

    fn find_lists(&self, owner: &str) -> Vec<TaskList> {
        self.lists
            .iter()
            .filter(|l| l.owner == owner)
            .cloned()
            .collect()
    }

    fn get_list(&self, owner: &str, id: Uuid) -> Option<TaskList> {
        self.lists
            .iter()
            .find(|l| l.id == id && l.owner == owner)
            .cloned()
    }

    /// Names compare the way categories do, so no two lists of one owner
    /// claim the same tasks.
    fn name_taken(&self, list: &TaskList) -> bool {
        self.lists
            .iter()
            .any(|l| {
                l.owner == list.owner && l.id != list.id && category_eq(&l.name, &list.name)
            })
    }

    fn insert_list(&mut self, list: TaskList) -> StoreResult<()> {
        if self.name_taken(&list) {
            return Err(StoreError::DuplicateListName(list.name));
        }
        self.lists.push(list);
        Ok(())
    }

    fn replace_list(&mut self, list: &TaskList) -> StoreResult<bool> {
        if self.name_taken(list) {
            return Err(StoreError::DuplicateListName(list.name.clone()));
        }
        match self
            .lists
            .iter_mut()
            .find(|l| l.id == list.id && l.owner == list.owner)
        {
            Some(slot) => {
                *slot = list.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn delete_list(&mut self, owner: &str, id: Uuid) -> bool {
        let before = self.lists.len();
        self.lists.retain(|l| !(l.id == id && l.owner == owner));
        before != self.lists.len()
    }

    fn find_user_by_email(&self, email: &str) -> Option<User> {
        self.users.iter().find(|u| u.email == email).cloned()
    }

    fn insert_user(&mut self, user: User) -> StoreResult<()> {
        if self.users.iter().any(|u| u.email == user.email) {
            return Err(StoreError::DuplicateEmail(user.email));
        }
        self.users.push(user);
        Ok(())
    }
}

/// Process-local store, used for tests and `store = memory`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Collections>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn find_tasks(&self, owner: &str) -> StoreResult<Vec<Task>> {
        Ok(self.inner.read().find_tasks(owner))
    }

    fn get_task(&self, owner: &str, id: Uuid) -> StoreResult<Option<Task>> {
        Ok(self.inner.read().get_task(owner, id))
    }

    fn insert_task(&self, task: Task) -> StoreResult<()> {
        self.inner.write().tasks.push(task);
        Ok(())
    }

    fn replace_task(&self, task: &Task) -> StoreResult<bool> {
        Ok(self.inner.write().replace_task(task))
    }

    fn delete_task(&self, owner: &str, id: Uuid) -> StoreResult<bool> {
        Ok(self.inner.write().delete_tasks_where(owner, &|t| t.id == id) > 0)
    }

    fn delete_tasks_where(&self, owner: &str, pred: TaskPredicate<'_>) -> StoreResult<usize> {
        Ok(self.inner.write().delete_tasks_where(owner, pred))
    }

    fn update_tasks_where(
        &self,
        owner: &str,
        pred: TaskPredicate<'_>,
        patch: &dyn Fn(&mut Task),
    ) -> StoreResult<usize> {
        Ok(self.inner.write().update_tasks_where(owner, pred, patch))
    }

    fn set_task_orders(&self, owner: &str, orders: &[(Uuid, f64)]) -> StoreResult<usize> {
        Ok(self.inner.write().set_task_orders(owner, orders))
    }

    fn find_lists(&self, owner: &str) -> StoreResult<Vec<TaskList>> {
        Ok(self.inner.read().find_lists(owner))
    }

    fn get_list(&self, owner: &str, id: Uuid) -> StoreResult<Option<TaskList>> {
        Ok(self.inner.read().get_list(owner, id))
    }

    fn insert_list(&self, list: TaskList) -> StoreResult<()> {
        self.inner.write().insert_list(list)
    }

    fn replace_list(&self, list: &TaskList) -> StoreResult<bool> {
        self.inner.write().replace_list(list)
    }

    fn delete_list(&self, owner: &str, id: Uuid) -> StoreResult<bool> {
        Ok(self.inner.write().delete_list(owner, id))
    }

    fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(self.inner.read().find_user_by_email(email))
    }

    fn insert_user(&self, user: User) -> StoreResult<()> {
        self.inner.write().insert_user(user)
    }
}

/// JSON-lines files under a data directory: `tasks.data`, `lists.data` and
/// `users.data`, one document per line, rewritten atomically on every change.
#[derive(Debug)]
pub struct JsonlStore {
    pub data_dir: PathBuf,
    pub tasks_path: PathBuf,
    pub lists_path: PathBuf,
    pub users_path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let tasks_path = data_dir.join("tasks.data");
        let lists_path = data_dir.join("lists.data");
        let users_path = data_dir.join("users.data");

        for path in [&tasks_path, &lists_path, &users_path] {
            if !path.exists() {
                fs::write(path, "")?;
            }
        }

        info!(
            data_dir = %data_dir.display(),
            tasks = %tasks_path.display(),
            lists = %lists_path.display(),
            users = %users_path.display(),
            "opened datastore"
        );

        Ok(Self {
            data_dir,
            tasks_path,
            lists_path,
            users_path,
            write_lock: Mutex::new(()),
        })
    }

    fn load(&self) -> anyhow::Result<Collections> {
        Ok(Collections {
            tasks: load_jsonl(&self.tasks_path).context("failed to load tasks.data")?,
            lists: load_jsonl(&self.lists_path).context("failed to load lists.data")?,
            users: load_jsonl(&self.users_path).context("failed to load users.data")?,
        })
    }

    fn save_tasks(&self, tasks: &[Task]) -> anyhow::Result<()> {
        save_jsonl_atomic(&self.tasks_path, tasks).context("failed to save tasks.data")
    }

    fn save_lists(&self, lists: &[TaskList]) -> anyhow::Result<()> {
        save_jsonl_atomic(&self.lists_path, lists).context("failed to save lists.data")
    }

    fn save_users(&self, users: &[User]) -> anyhow::Result<()> {
        save_jsonl_atomic(&self.users_path, users).context("failed to save users.data")
    }

    /// Load-modify-save of the task file under the write lock. Saves only
    /// when `apply` reports a change.
    fn modify_tasks<T>(
        &self,
        apply: impl FnOnce(&mut Collections) -> (T, bool),
    ) -> StoreResult<T> {
        let _guard = self.write_lock.lock();
        let mut data = self.load()?;
        let (out, changed) = apply(&mut data);
        if changed {
            self.save_tasks(&data.tasks)?;
        }
        Ok(out)
    }

    fn modify_lists<T>(
        &self,
        apply: impl FnOnce(&mut Collections) -> StoreResult<(T, bool)>,
    ) -> StoreResult<T> {
        let _guard = self.write_lock.lock();
        let mut data = self.load()?;
        let (out, changed) = apply(&mut data)?;
        if changed {
            self.save_lists(&data.lists)?;
        }
        Ok(out)
    }

    fn modify_users(
        &self,
        apply: impl FnOnce(&mut Collections) -> StoreResult<()>,
    ) -> StoreResult<()> {
        let _guard = self.write_lock.lock();
        let mut data = self.load()?;
        apply(&mut data)?;
        self.save_users(&data.users)?;
        Ok(())
    }
}

impl Store for JsonlStore {
    #[tracing::instrument(skip(self))]
    fn find_tasks(&self, owner: &str) -> StoreResult<Vec<Task>> {
        Ok(self.load()?.find_tasks(owner))
    }

    #[tracing::instrument(skip(self))]
    fn get_task(&self, owner: &str, id: Uuid) -> StoreResult<Option<Task>> {
        Ok(self.load()?.get_task(owner, id))
    }

    #[tracing::instrument(skip(self, task), fields(id = %task.id))]
    fn insert_task(&self, task: Task) -> StoreResult<()> {
        self.modify_tasks(|data| {
            data.tasks.push(task);
            ((), true)
        })
    }

    #[tracing::instrument(skip(self, task), fields(id = %task.id))]
    fn replace_task(&self, task: &Task) -> StoreResult<bool> {
        self.modify_tasks(|data| {
            let found = data.replace_task(task);
            (found, found)
        })
    }

    #[tracing::instrument(skip(self))]
    fn delete_task(&self, owner: &str, id: Uuid) -> StoreResult<bool> {
        self.modify_tasks(|data| {
            let removed = data.delete_tasks_where(owner, &|t| t.id == id) > 0;
            (removed, removed)
        })
    }

    #[tracing::instrument(skip(self, pred))]
    fn delete_tasks_where(&self, owner: &str, pred: TaskPredicate<'_>) -> StoreResult<usize> {
        self.modify_tasks(|data| {
            let removed = data.delete_tasks_where(owner, pred);
            (removed, removed > 0)
        })
    }

    #[tracing::instrument(skip(self, pred, patch))]
    fn update_tasks_where(
        &self,
        owner: &str,
        pred: TaskPredicate<'_>,
        patch: &dyn Fn(&mut Task),
    ) -> StoreResult<usize> {
        self.modify_tasks(|data| {
            let touched = data.update_tasks_where(owner, pred, patch);
            (touched, touched > 0)
        })
    }

    #[tracing::instrument(skip(self, orders), fields(count = orders.len()))]
    fn set_task_orders(&self, owner: &str, orders: &[(Uuid, f64)]) -> StoreResult<usize> {
        self.modify_tasks(|data| {
            let touched = data.set_task_orders(owner, orders);
            (touched, touched > 0)
        })
    }

    #[tracing::instrument(skip(self))]
    fn find_lists(&self, owner: &str) -> StoreResult<Vec<TaskList>> {
        Ok(self.load()?.find_lists(owner))
    }

    #[tracing::instrument(skip(self))]
    fn get_list(&self, owner: &str, id: Uuid) -> StoreResult<Option<TaskList>> {
        Ok(self.load()?.get_list(owner, id))
    }

    #[tracing::instrument(skip(self, list), fields(id = %list.id, name = %list.name))]
    fn insert_list(&self, list: TaskList) -> StoreResult<()> {
        self.modify_lists(|data| {
            data.insert_list(list)?;
            Ok(((), true))
        })
    }

    #[tracing::instrument(skip(self, list), fields(id = %list.id))]
    fn replace_list(&self, list: &TaskList) -> StoreResult<bool> {
        self.modify_lists(|data| {
            let found = data.replace_list(list)?;
            Ok((found, found))
        })
    }

    #[tracing::instrument(skip(self))]
    fn delete_list(&self, owner: &str, id: Uuid) -> StoreResult<bool> {
        self.modify_lists(|data| {
            let removed = data.delete_list(owner, id);
            Ok((removed, removed))
        })
    }

    #[tracing::instrument(skip(self))]
    fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(self.load()?.find_user_by_email(email))
    }

    #[tracing::instrument(skip(self, user), fields(id = %user.id))]
    fn insert_user(&self, user: User) -> StoreResult<()> {
        self.modify_users(|data| data.insert_user(user))
    }
}

#[tracing::instrument(skip(path))]
fn load_jsonl<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Vec<T>> {
    debug!(file = %path.display(), "loading jsonl");
    let file = fs::File::open(path)?;
    let reader = BufReader::new(file);

    let mut out = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let doc: T = serde_json::from_str(trimmed)
            .with_context(|| format!("failed parsing {} line {}", path.display(), idx + 1))?;
        out.push(doc);
    }

    debug!(count = out.len(), "loaded documents from jsonl");
    Ok(out)
}

#[tracing::instrument(skip(path, docs))]
fn save_jsonl_atomic<T: Serialize>(path: &Path, docs: &[T]) -> anyhow::Result<()> {
    debug!(file = %path.display(), count = docs.len(), "saving jsonl atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    for doc in docs {
        let serialized = serde_json::to_string(doc)?;
        writeln!(temp, "{serialized}")?;
    }
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(())
}
