use std::sync::Arc;

use chrono::{TimeZone, Utc};
use docket_core::{Error, TaskService};
use docket_core::datastore::{JsonlStore, Store};
use docket_core::datetime::FixedClock;
use docket_core::filter::{Criteria, Scope};
use docket_core::reconcile::ListDeletionPlan;
use docket_core::task::{DEFAULT_CATEGORY, ListPatch, NewList, NewTask, SubtaskInput, TaskStatus};
use docket_core::view::{Grouping, ViewKind, ViewRequest};
use tempfile::tempdir;
use uuid::Uuid;

fn open(dir: &std::path::Path) -> (TaskService, Arc<JsonlStore>) {
    let store = Arc::new(JsonlStore::open(dir).expect("open datastore"));
    let clock = FixedClock(Utc.with_ymd_and_hms(2026, 4, 15, 9, 0, 0).unwrap());
    let svc = TaskService::new(store.clone(), Arc::new(clock), chrono_tz::UTC);
    (svc, store)
}

fn titled(svc: &TaskService, title: &str, category: &str) -> Uuid {
    let mut input = NewTask::titled(title);
    input.category = Some(category.to_string());
    svc.create_task("u1", input, &Criteria::default())
        .expect("create task")
        .id
}

#[test]
fn reorder_rewrites_only_listed_positions() {
    let temp = tempdir().expect("tempdir");
    let (svc, store) = open(temp.path());

    let a = titled(&svc, "a", "general");
    let b = titled(&svc, "b", "general");
    let c = titled(&svc, "c", "general");
    let untouched = titled(&svc, "d", "general");
    store
        .set_task_orders("u1", &[(a, 5.0), (b, 1.0), (c, 9.0), (untouched, 4.0)])
        .expect("seed orders");

    svc.reorder_tasks("u1", &[b, a, c]).expect("reorder");

    let order_of = |id| svc.get_task("u1", id).expect("get").order;
    assert_eq!(order_of(b), 0.0);
    assert_eq!(order_of(a), 1.0);
    assert_eq!(order_of(c), 2.0);
    assert_eq!(order_of(untouched), 4.0);

    let listed: Vec<Uuid> = svc
        .list_tasks("u1", &Criteria::default())
        .expect("list")
        .into_iter()
        .map(|t| t.id)
        .collect();
    assert_eq!(listed, vec![b, a, c, untouched]);
}

#[test]
fn deleting_list_reassigns_or_cascades() {
    let temp = tempdir().expect("tempdir");
    let (svc, store) = open(temp.path());

    let work = svc
        .create_list("u1", NewList {
            name: "Work".to_string(),
            color: Some("#f80".to_string()),
        })
        .expect("create list");
    let mut input = NewTask::titled("t1");
    input.category = Some("Work".to_string());
    input.description = Some("quarterly numbers".to_string());
    input.notes = Some("ask finance".to_string());
    input.status = Some(TaskStatus::Doing);
    input.tags = vec!["q2".to_string()];
    input.subtasks = vec![SubtaskInput {
        title: "collect".to_string(),
        ..SubtaskInput::default()
    }];
    input.due_date = Some("2026-04-20".to_string());
    let t1 = svc
        .create_task("u1", input, &Criteria::default())
        .expect("create t1");
    let t2 = titled(&svc, "t2", "work");
    let home = titled(&svc, "t3", "Home");

    let plan = svc.delete_list("u1", work.id, false).expect("delete list");
    assert_eq!(plan, ListDeletionPlan::Reassign(vec![t1.id, t2]));
    assert!(store.find_lists("u1").expect("lists").is_empty());
    assert_eq!(svc.get_task("u1", t2).expect("t2").category, DEFAULT_CATEGORY);
    assert_eq!(svc.get_task("u1", home).expect("t3").category, "Home");

    let mut reassigned = svc.get_task("u1", t1.id).expect("t1");
    assert_eq!(reassigned.category, DEFAULT_CATEGORY);
    reassigned.category = t1.category.clone();
    reassigned.updated_at = t1.updated_at;
    assert_eq!(reassigned, t1);

    let work = svc
        .create_list("u1", NewList {
            name: "Work".to_string(),
            color: None,
        })
        .expect("recreate list");
    let t4 = titled(&svc, "t4", "Work");
    let plan = svc.delete_list("u1", work.id, true).expect("cascade delete");
    assert_eq!(plan, ListDeletionPlan::Delete(vec![t4]));
    assert!(svc.get_task("u1", t4).is_err());
    assert_eq!(
        svc.list_tasks("u1", &Criteria::default()).expect("list").len(),
        3
    );
}

#[test]
fn cascade_cannot_reach_tasks_of_another_list() {
    let temp = tempdir().expect("tempdir");
    let (svc, store) = open(temp.path());

    let work = svc
        .create_list("u1", NewList {
            name: "Work".to_string(),
            color: None,
        })
        .expect("create list");
    let clash = svc.create_list("u1", NewList {
        name: "work".to_string(),
        color: None,
    });
    assert!(matches!(clash, Err(Error::Conflict(_))));

    let errands = svc
        .create_list("u1", NewList {
            name: "Errands".to_string(),
            color: None,
        })
        .expect("create list");
    let renamed = svc.update_list("u1", errands.id, ListPatch {
        name: Some(" WORK ".to_string()),
        ..ListPatch::default()
    });
    assert!(matches!(renamed, Err(Error::Conflict(_))));

    let memo = titled(&svc, "memo", "Work");
    let stamps = titled(&svc, "stamps", "Errands");
    svc.delete_list("u1", work.id, true).expect("cascade delete");

    let names: Vec<String> = store
        .find_lists("u1")
        .expect("lists")
        .into_iter()
        .map(|l| l.name)
        .collect();
    assert_eq!(names, vec!["Errands".to_string()]);
    assert!(svc.get_task("u1", memo).is_err());
    assert_eq!(svc.get_task("u1", stamps).expect("stamps").category, "Errands");
}

#[test]
fn state_survives_reopen() {
    let temp = tempdir().expect("tempdir");
    let id = {
        let (svc, _) = open(temp.path());
        let mut input = NewTask::titled("dentist");
        input.due_date = Some("2026-04-15".to_string());
        svc.create_task("u1", input, &Criteria::default())
            .expect("create")
            .id
    };

    let (svc, _) = open(temp.path());
    let view = svc
        .list_view("u1", &ViewRequest {
            criteria: Criteria {
                scope: Some(Scope::Today),
                ..Criteria::default()
            },
            view: ViewKind::Calendar,
            calendar_selected_date: None,
        })
        .expect("view");
    assert_eq!(view.items.len(), 1);
    assert_eq!(view.items[0].id, id);
    let Grouping::Calendar(month) = view.grouping else {
        panic!("expected calendar grouping");
    };
    assert_eq!((month.year, month.month), (2026, 4));
    assert!(month.cells.iter().any(|cell| cell.task_ids == vec![id]));
}
