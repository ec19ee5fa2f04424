use std::sync::Arc;

use chrono_tz::Tz;
use tracing::{debug, info};
use uuid::Uuid;

use crate::datastore::Store;
use crate::datetime::{Clock, DayFrame};
use crate::error::{EntityKind, Error, Result};
use crate::events::{ChangeBus, ChangeKind};
use crate::filter::{Criteria, Scope, category_eq, filter};
use crate::reconcile::{ListDeletionPlan, plan_list_deletion};
use crate::task::{
    DEFAULT_CATEGORY, ListPatch, NewList, NewTask, Task, TaskList, TaskPatch, required_list_name,
};
use crate::view::{ListView, Summary, ViewOptions, ViewRequest, project, sort_default, summarize};

/// Owner-scoped task and list operations over a [`Store`].
///
/// Every mutation publishes a [`crate::events::ChangeEvent`] once it has
/// been written.
#[derive(Debug, Clone)]
pub struct TaskService {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    tz: Tz,
    options: ViewOptions,
    bus: ChangeBus,
}

impl TaskService {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, tz: Tz) -> Self {
        Self {
            store,
            clock,
            tz,
            options: ViewOptions::default(),
            bus: ChangeBus::new(),
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: ViewOptions) -> Self {
        self.options = options;
        self
    }

    pub fn bus(&self) -> &ChangeBus {
        &self.bus
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    pub fn day_frame(&self) -> DayFrame {
        DayFrame::new(self.clock.now(), self.tz)
    }

    #[tracing::instrument(skip(self, request))]
    pub fn list_view(&self, owner: &str, request: &ViewRequest) -> Result<ListView> {
        let tasks = self.store.find_tasks(owner)?;
        Ok(project(tasks, request, &self.day_frame(), self.options))
    }

    /// Plain listing: criteria filter plus the default sort.
    #[tracing::instrument(skip(self, criteria))]
    pub fn list_tasks(&self, owner: &str, criteria: &Criteria) -> Result<Vec<Task>> {
        let tasks = self.store.find_tasks(owner)?;
        let mut tasks = filter(tasks, criteria, &self.day_frame());
        sort_default(&mut tasks);
        debug!(count = tasks.len(), "listed tasks");
        Ok(tasks)
    }

    #[tracing::instrument(skip(self))]
    pub fn get_task(&self, owner: &str, id: Uuid) -> Result<Task> {
        self.store
            .get_task(owner, id)?
            .ok_or_else(|| Error::not_found(EntityKind::Task, id))
    }

    #[tracing::instrument(skip(self))]
    pub fn summary(&self, owner: &str) -> Result<Summary> {
        let tasks = self.store.find_tasks(owner)?;
        let lists = self.store.find_lists(owner)?;
        Ok(summarize(&tasks, &lists, &self.day_frame()))
    }

    /// Creates a task. `context` is the view the task was created from: its
    /// category fills a missing category and `scope = today` fills a
    /// missing due date with the start of today.
    #[tracing::instrument(skip(self, input, context), fields(title = %input.title))]
    pub fn create_task(&self, owner: &str, mut input: NewTask, context: &Criteria) -> Result<Task> {
        let frame = self.day_frame();

        if input.category.as_deref().is_none_or(|c| c.trim().is_empty())
            && let Some(category) = context.category.as_deref()
        {
            input.category = Some(category.to_string());
        }

        let mut task = input.into_task(owner, self.clock.now(), self.tz)?;
        if task.due_date.is_none() && context.scope == Some(Scope::Today) {
            task.due_date = Some(frame.start_of_today);
        }

        self.store.insert_task(task.clone())?;
        info!(id = %task.id, "created task");
        self.bus.publish(owner, ChangeKind::TasksChanged);
        Ok(task)
    }

    #[tracing::instrument(skip(self, patch))]
    pub fn update_task(&self, owner: &str, id: Uuid, patch: TaskPatch) -> Result<Task> {
        let mut task = self.get_task(owner, id)?;
        patch.apply(&mut task, self.clock.now(), self.tz)?;
        self.write_task(owner, &task)?;
        info!(%id, "updated task");
        Ok(task)
    }

    #[tracing::instrument(skip(self))]
    pub fn toggle_task(&self, owner: &str, id: Uuid) -> Result<Task> {
        let mut task = self.get_task(owner, id)?;
        task.toggle(self.clock.now());
        self.write_task(owner, &task)?;
        info!(%id, completed = task.completed, status = task.status.as_str(), "toggled task");
        Ok(task)
    }

    #[tracing::instrument(skip(self))]
    pub fn toggle_subtask(&self, owner: &str, id: Uuid, subtask_id: Uuid) -> Result<Task> {
        let mut task = self.get_task(owner, id)?;
        if !task.toggle_subtask(subtask_id, self.clock.now()) {
            return Err(Error::not_found(EntityKind::Subtask, subtask_id));
        }
        self.write_task(owner, &task)?;
        info!(%id, %subtask_id, "toggled subtask");
        Ok(task)
    }

    #[tracing::instrument(skip(self))]
    pub fn delete_task(&self, owner: &str, id: Uuid) -> Result<()> {
        if !self.store.delete_task(owner, id)? {
            return Err(Error::not_found(EntityKind::Task, id));
        }
        info!(%id, "deleted task");
        self.bus.publish(owner, ChangeKind::TasksChanged);
        Ok(())
    }

    /// Deletes every task in `category` (case-insensitive) and returns the
    /// count.
    #[tracing::instrument(skip(self))]
    pub fn delete_tasks_by_category(&self, owner: &str, category: &str) -> Result<usize> {
        if category.trim().is_empty() {
            return Err(Error::validation("category is required"));
        }
        let deleted = self
            .store
            .delete_tasks_where(owner, &|task| category_eq(&task.category, category))?;
        info!(deleted, "deleted tasks by category");
        if deleted > 0 {
            self.bus.publish(owner, ChangeKind::TasksChanged);
        }
        Ok(deleted)
    }

    /// Sets each listed task's `order` to its position in `ids`. Ids the
    /// owner does not have are skipped; unlisted tasks keep their order.
    #[tracing::instrument(skip(self, ids), fields(count = ids.len()))]
    pub fn reorder_tasks(&self, owner: &str, ids: &[Uuid]) -> Result<usize> {
        if ids.is_empty() {
            return Err(Error::validation("orderedIds is required"));
        }
        let orders: Vec<(Uuid, f64)> = ids
            .iter()
            .enumerate()
            .map(|(index, id)| (*id, index as f64))
            .collect();
        let written = self.store.set_task_orders(owner, &orders)?;
        info!(requested = ids.len(), written, "reordered tasks");
        self.bus.publish(owner, ChangeKind::TasksChanged);
        Ok(written)
    }

    #[tracing::instrument(skip(self))]
    pub fn list_lists(&self, owner: &str) -> Result<Vec<TaskList>> {
        let mut lists = self.store.find_lists(owner)?;
        lists.sort_by(|a, b| {
            a.order
                .total_cmp(&b.order)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        Ok(lists)
    }

    #[tracing::instrument(skip(self, input), fields(name = %input.name))]
    pub fn create_list(&self, owner: &str, input: NewList) -> Result<TaskList> {
        let name = required_list_name(&input.name)?;
        let list = TaskList::new(
            owner,
            name,
            input.color.unwrap_or_default(),
            self.clock.now(),
        );
        self.store.insert_list(list.clone())?;
        info!(id = %list.id, "created list");
        self.bus.publish(owner, ChangeKind::ListsChanged);
        Ok(list)
    }

    #[tracing::instrument(skip(self, patch))]
    pub fn update_list(&self, owner: &str, id: Uuid, patch: ListPatch) -> Result<TaskList> {
        let mut list = self
            .store
            .get_list(owner, id)?
            .ok_or_else(|| Error::not_found(EntityKind::List, id))?;
        patch.apply(&mut list, self.clock.now())?;
        if !self.store.replace_list(&list)? {
            return Err(Error::not_found(EntityKind::List, id));
        }
        info!(%id, "updated list");
        self.bus.publish(owner, ChangeKind::ListsChanged);
        Ok(list)
    }

    /// Removes the list record, then reassigns its tasks to the default
    /// category or, with `cascade`, deletes them.
    #[tracing::instrument(skip(self))]
    pub fn delete_list(&self, owner: &str, id: Uuid, cascade: bool) -> Result<ListDeletionPlan> {
        let list = self
            .store
            .get_list(owner, id)?
            .ok_or_else(|| Error::not_found(EntityKind::List, id))?;
        if !self.store.delete_list(owner, id)? {
            return Err(Error::not_found(EntityKind::List, id));
        }
        self.bus.publish(owner, ChangeKind::ListsChanged);

        let tasks = self.store.find_tasks(owner)?;
        let plan = plan_list_deletion(&list.name, &tasks, cascade);
        let ids = plan.task_ids();
        let in_plan = |task: &Task| ids.contains(&task.id);

        let touched = match &plan {
            ListDeletionPlan::Delete(_) => self.store.delete_tasks_where(owner, &in_plan)?,
            ListDeletionPlan::Reassign(_) => {
                let now = self.clock.now();
                self.store.update_tasks_where(owner, &in_plan, &|task| {
                    task.category = DEFAULT_CATEGORY.to_string();
                    task.updated_at = now;
                })?
            }
        };
        info!(%id, name = %list.name, cascade, touched, "deleted list");
        if touched > 0 {
            self.bus.publish(owner, ChangeKind::TasksChanged);
        }
        Ok(plan)
    }

    fn write_task(&self, owner: &str, task: &Task) -> Result<()> {
        if !self.store.replace_task(task)? {
            return Err(Error::not_found(EntityKind::Task, task.id));
        }
        self.bus.publish(owner, ChangeKind::TasksChanged);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, TimeZone, Utc};

    use super::*;
    use crate::datastore::MemoryStore;
    use crate::datetime::FixedClock;
    use crate::task::TaskStatus;
    use crate::view::{Grouping, ViewKind};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 10, 15, 30, 0).unwrap()
    }

    fn service() -> TaskService {
        TaskService::new(
            Arc::new(MemoryStore::new()),
            Arc::new(FixedClock(now())),
            chrono_tz::UTC,
        )
    }

    fn create(svc: &TaskService, owner: &str, title: &str) -> Task {
        svc.create_task(owner, NewTask::titled(title), &Criteria::default())
            .unwrap()
    }

    #[test]
    fn other_owners_see_not_found() {
        let svc = service();
        let task = create(&svc, "alice", "private");

        assert!(matches!(
            svc.get_task("bob", task.id),
            Err(Error::NotFound { .. })
        ));
        assert!(matches!(
            svc.toggle_task("bob", task.id),
            Err(Error::NotFound { .. })
        ));
        assert!(svc.list_tasks("bob", &Criteria::default()).unwrap().is_empty());
    }

    #[test]
    fn create_inherits_view_context() {
        let svc = service();
        let context = Criteria {
            category: Some("Work".to_string()),
            scope: Some(Scope::Today),
            ..Criteria::default()
        };
        let task = svc
            .create_task("alice", NewTask::titled("standup"), &context)
            .unwrap();

        assert_eq!(task.category, "Work");
        assert_eq!(task.due_date, Some(svc.day_frame().start_of_today));
    }

    #[test]
    fn toggle_round_trip_through_store() {
        let svc = service();
        let task = create(&svc, "alice", "report");

        let done = svc.toggle_task("alice", task.id).unwrap();
        assert!(done.completed);
        assert_eq!(done.status, TaskStatus::Done);

        let reopened = svc.toggle_task("alice", task.id).unwrap();
        assert!(!reopened.completed);
        assert_eq!(reopened.status, TaskStatus::Todo);
        assert_eq!(svc.get_task("alice", task.id).unwrap(), reopened);
    }

    #[test]
    fn missing_subtask_is_not_found() {
        let svc = service();
        let task = create(&svc, "alice", "slides");
        assert!(matches!(
            svc.toggle_subtask("alice", task.id, Uuid::new_v4()),
            Err(Error::NotFound {
                kind: EntityKind::Subtask,
                ..
            })
        ));
    }

    #[test]
    fn reorder_rejects_empty_and_skips_foreign_ids() {
        let svc = service();
        let mine = create(&svc, "alice", "mine");
        let theirs = create(&svc, "bob", "theirs");

        assert!(matches!(
            svc.reorder_tasks("alice", &[]),
            Err(Error::Validation(_))
        ));

        let written = svc.reorder_tasks("alice", &[theirs.id, mine.id]).unwrap();
        assert_eq!(written, 1);
        assert_eq!(svc.get_task("alice", mine.id).unwrap().order, 1.0);
        assert_eq!(svc.get_task("bob", theirs.id).unwrap().order, theirs.order);
    }

    #[test]
    fn delete_by_category_requires_category() {
        let svc = service();
        assert!(matches!(
            svc.delete_tasks_by_category("alice", "  "),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn duplicate_list_name_conflicts() {
        let svc = service();
        svc.create_list("alice", NewList {
            name: "Work".to_string(),
            color: None,
        })
        .unwrap();

        let err = svc
            .create_list("alice", NewList {
                name: "Work".to_string(),
                color: None,
            })
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));

        assert!(matches!(
            svc.create_list("alice", NewList::default()),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn lists_sort_by_order_then_creation() {
        let svc = service();
        let a = svc
            .create_list("alice", NewList {
                name: "A".to_string(),
                color: None,
            })
            .unwrap();
        let b = svc
            .create_list("alice", NewList {
                name: "B".to_string(),
                color: None,
            })
            .unwrap();
        svc.update_list("alice", b.id, ListPatch {
            order: Some(0.0),
            ..ListPatch::default()
        })
        .unwrap();

        let names: Vec<_> = svc
            .list_lists("alice")
            .unwrap()
            .into_iter()
            .map(|l| l.name)
            .collect();
        assert_eq!(names, vec!["B".to_string(), a.name]);
    }

    #[test]
    fn board_view_through_service() {
        let svc = service();
        let mut overdue = NewTask::titled("overdue");
        overdue.due_date = Some((now() - Duration::days(3)).to_rfc3339());
        let overdue = svc
            .create_task("alice", overdue, &Criteria::default())
            .unwrap();
        let fresh = create(&svc, "alice", "fresh");

        let view = svc
            .list_view("alice", &ViewRequest {
                view: ViewKind::Board,
                ..ViewRequest::default()
            })
            .unwrap();
        let Grouping::Board(columns) = view.grouping else {
            panic!("expected board grouping");
        };
        assert_eq!(columns.expired, vec![overdue.id]);
        assert_eq!(columns.todo, vec![fresh.id]);
    }

    #[tokio::test]
    async fn mutations_publish_changes() {
        let svc = service();
        let mut rx = svc.bus().subscribe();

        create(&svc, "alice", "ping");
        let event = rx.recv().await.unwrap();
        assert_eq!(event.owner, "alice");
        assert_eq!(event.kind, ChangeKind::TasksChanged);
    }
}
