/// Integration tests for the task board flows

mod common;

use common::{Harness, STAFF_INBOX};
use taxdesk_shared::models::activity::ActivityScope;
use taxdesk_shared::models::client::ClientRole;
use taxdesk_shared::models::task::TaskStatus;
use taxdesk_shared::notify::NotificationEvent;
use taxdesk_shared::services::{
    BoardError, EditComment, EditTask, NewClient, NewComment, NewTask, RenameTaskList,
};
use taxdesk_shared::store::Fault;
use uuid::Uuid;

#[tokio::test]
async fn test_register_client_rejects_duplicate_email() {
    let h = Harness::new();
    let client = h.register("max@example.com", ClientRole::Client).await;

    let err = h
        .board
        .register_client(
            NewClient {
                email: "max@example.com".to_string(),
                password_hash: "other".to_string(),
                first_name: String::new(),
                last_name: String::new(),
                business_name: String::new(),
                role: ClientRole::Client,
            },
            "Anna",
        )
        .await
        .unwrap_err();

    assert!(matches!(err, BoardError::Conflict(ref m) if m == "This email is already registered"));
    assert_eq!(h.store.snapshot().await.clients.len(), 1);

    let sent = h.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].recipients, vec![client.email]);
    assert!(matches!(sent[0].event, NotificationEvent::AccountCreated { .. }));
}

#[tokio::test]
async fn test_register_client_validates_email() {
    let h = Harness::new();

    let err = h
        .board
        .register_client(
            NewClient {
                email: "not-an-email".to_string(),
                password_hash: "hash".to_string(),
                first_name: String::new(),
                last_name: String::new(),
                business_name: String::new(),
                role: ClientRole::Client,
            },
            "Anna",
        )
        .await
        .unwrap_err();

    assert!(matches!(err, BoardError::Validation(_)));
    assert!(h.notifier.sent().is_empty());
}

#[tokio::test]
async fn test_create_task_find_or_create() {
    let h = Harness::new();
    let client = h.register("max@example.com", ClientRole::Client).await;

    let first = h
        .create_task(client.id, "Taxes 2024", "W2 Form", vec![h.upload("w2.pdf")])
        .await;
    assert_eq!(first.message, "Task list and task has been successfully created");

    let second = h
        .create_task(client.id, "Taxes 2024", "1099 Form", vec![])
        .await;
    assert_eq!(second.message, "Task created and added into task list");
    assert_eq!(second.task_list_id, first.task_list_id);

    let third = h
        .create_task(client.id, "Taxes 2024", "W2 Form", vec![h.upload("w2-page2.pdf")])
        .await;
    assert_eq!(third.message, "Task updated");
    assert_eq!(third.task_id, first.task_id);

    let snapshot = h.store.snapshot().await;
    assert_eq!(snapshot.clients[&client.id].task_list_ids, vec![first.task_list_id]);
    assert_eq!(
        snapshot.task_lists[&first.task_list_id].task_ids,
        vec![first.task_id, second.task_id]
    );
    let task = &snapshot.tasks[&first.task_id];
    assert_eq!(task.file_ids.len(), 2);
    assert_eq!(task.status, TaskStatus::WaitingForClient);
    assert_eq!(snapshot.files.len(), 2);
}

#[tokio::test]
async fn test_create_task_for_missing_client_discards_uploads() {
    let h = Harness::new();
    let upload = h.upload("w2.pdf");
    let path = upload.path.clone();

    let err = h
        .board
        .create_task(
            NewTask {
                client_id: Uuid::new_v4(),
                task_list_name: "Taxes 2024".to_string(),
                title: "W2 Form".to_string(),
                description: String::new(),
            },
            vec![upload],
            "Anna",
        )
        .await
        .unwrap_err();

    assert!(matches!(err, BoardError::NotFound(ref m) if m == "Client not found"));
    assert!(!path.exists());
    assert!(h.store.snapshot().await.files.is_empty());
}

#[tokio::test]
async fn test_create_task_store_failure_rolls_back() {
    let h = Harness::new();
    let client = h.register("max@example.com", ClientRole::Client).await;
    let upload = h.upload("w2.pdf");
    let path = upload.path.clone();

    h.store.inject_fault(Fault::OnCommit).await;
    let err = h
        .board
        .create_task(
            NewTask {
                client_id: client.id,
                task_list_name: "Taxes 2024".to_string(),
                title: "W2 Form".to_string(),
                description: String::new(),
            },
            vec![upload],
            "Anna",
        )
        .await
        .unwrap_err();

    assert!(matches!(err, BoardError::Conflict(ref m) if m == "Error when creating new task"));
    assert!(!path.exists());
    let snapshot = h.store.snapshot().await;
    assert!(snapshot.task_lists.is_empty());
    assert!(snapshot.clients[&client.id].task_list_ids.is_empty());
}

#[tokio::test]
async fn test_client_comment_records_activity_and_needs_review() {
    let h = Harness::new();
    let client = h.register("max@example.com", ClientRole::Client).await;
    let created = h.create_task(client.id, "Taxes 2024", "W2 Form", vec![]).await;

    let comment_id = h
        .comment(client.id, created.task_id, "Uploaded", vec![h.upload("w2.pdf")])
        .await;

    let snapshot = h.store.snapshot().await;
    let task = &snapshot.tasks[&created.task_id];
    assert_eq!(task.status, TaskStatus::NeedsReview);
    assert_eq!(task.comments.len(), 1);

    let activities = snapshot.activities_in(ActivityScope::Comment(comment_id));
    assert_eq!(activities.len(), 1);
    assert_eq!(activities[0].client_id, client.id);
    assert_eq!(activities[0].task_list_id, created.task_list_id);
    assert_eq!(activities[0].file_ids, task.comments[0].file_ids);

    let last = h.notifier.sent().pop().unwrap();
    assert_eq!(last.recipients, vec![STAFF_INBOX.to_string()]);
    assert!(matches!(last.event, NotificationEvent::ClientComment { .. }));
}

#[tokio::test]
async fn test_admin_comment_notifies_client_without_activity() {
    let h = Harness::new();
    let admin = h.register("anna@taxdesk.test", ClientRole::Admin).await;
    let client = h.register("max@example.com", ClientRole::Client).await;
    let created = h.create_task(client.id, "Taxes 2024", "W2 Form", vec![]).await;

    h.comment(admin.id, created.task_id, "Please upload page 2", vec![])
        .await;

    let snapshot = h.store.snapshot().await;
    assert_eq!(snapshot.tasks[&created.task_id].status, TaskStatus::WaitingForClient);
    assert!(snapshot.activities.is_empty());

    let last = h.notifier.sent().pop().unwrap();
    assert_eq!(last.recipients, vec![client.email]);
    assert!(matches!(last.event, NotificationEvent::AdminComment { .. }));
}

#[tokio::test]
async fn test_comment_on_missing_task_discards_uploads() {
    let h = Harness::new();
    let client = h.register("max@example.com", ClientRole::Client).await;
    let upload = h.upload("w2.pdf");
    let path = upload.path.clone();

    let err = h
        .board
        .leave_comment(
            client.id,
            NewComment {
                task_id: Uuid::new_v4(),
                body: "Uploaded".to_string(),
            },
            vec![upload],
        )
        .await
        .unwrap_err();

    assert!(matches!(err, BoardError::NotFound(ref m) if m == "Task not found"));
    assert!(!path.exists());
}

#[tokio::test]
async fn test_change_status_adds_system_comment() {
    let h = Harness::new();
    let client = h.register("max@example.com", ClientRole::Client).await;
    let created = h.create_task(client.id, "Taxes 2024", "W2 Form", vec![]).await;

    let task = h
        .board
        .change_task_status(created.task_id, TaskStatus::Completed, "Anna")
        .await
        .unwrap();

    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.comments.len(), 1);
    assert!(task.comments[0].is_system);
    assert_eq!(task.comments[0].body, "Anna changed the task status: completed");

    let last = h.notifier.sent().pop().unwrap();
    assert!(matches!(
        last.event,
        NotificationEvent::StatusChanged {
            status: TaskStatus::Completed,
            ..
        }
    ));
}

#[tokio::test]
async fn test_notification_failure_does_not_fail_request() {
    let h = Harness::new();
    h.notifier.break_delivery();

    let client = h.register("max@example.com", ClientRole::Client).await;
    let created = h.create_task(client.id, "Taxes 2024", "W2 Form", vec![]).await;

    assert!(h.store.snapshot().await.tasks.contains_key(&created.task_id));
    assert!(h.notifier.sent().is_empty());
}

#[tokio::test]
async fn test_change_client_role() {
    let h = Harness::new();
    let client = h.register("max@example.com", ClientRole::Client).await;

    let promoted = h
        .board
        .change_client_role(client.id, ClientRole::Admin)
        .await
        .unwrap();
    assert_eq!(promoted.role, ClientRole::Admin);
    assert_eq!(h.store.snapshot().await.clients[&client.id].role, ClientRole::Admin);

    let err = h
        .board
        .change_client_role(Uuid::new_v4(), ClientRole::Admin)
        .await
        .unwrap_err();
    assert!(matches!(err, BoardError::NotFound(ref m) if m == "Client not found"));
}

#[tokio::test]
async fn test_rename_task_list_keeps_names_unique() {
    let h = Harness::new();
    let client = h.register("max@example.com", ClientRole::Client).await;
    h.create_task(client.id, "Taxes 2024", "W2 Form", vec![]).await;
    let rental = h.create_task(client.id, "Rental", "Lease", vec![]).await;

    let err = h
        .board
        .rename_task_list(
            rental.task_list_id,
            RenameTaskList {
                name: "Taxes 2024".to_string(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, BoardError::Conflict(ref m) if m == "Error when edit task list name"));
    assert_eq!(h.store.snapshot().await.task_lists[&rental.task_list_id].name, "Rental");

    let renamed = h
        .board
        .rename_task_list(
            rental.task_list_id,
            RenameTaskList {
                name: "Rental 2024".to_string(),
            },
        )
        .await
        .unwrap();
    assert_eq!(renamed.name, "Rental 2024");
    assert_eq!(renamed.task_ids, vec![rental.task_id]);

    let err = h
        .board
        .rename_task_list(
            Uuid::new_v4(),
            RenameTaskList {
                name: "Other".to_string(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, BoardError::NotFound(ref m) if m == "Task list not found"));
}

#[tokio::test]
async fn test_edit_task_replaces_title_and_description() {
    let h = Harness::new();
    let client = h.register("max@example.com", ClientRole::Client).await;
    let created = h
        .create_task(client.id, "Taxes 2024", "W2 Form", vec![h.upload("w2.pdf")])
        .await;

    let task = h
        .board
        .edit_task(
            created.task_id,
            EditTask {
                title: "W2 Forms".to_string(),
                description: "Both employers".to_string(),
            },
        )
        .await
        .unwrap();

    assert_eq!(task.title, "W2 Forms");
    assert_eq!(task.description, "Both employers");
    assert_eq!(task.file_ids, created.file_ids);

    let err = h
        .board
        .edit_task(
            created.task_id,
            EditTask {
                title: String::new(),
                description: String::new(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, BoardError::Validation(_)));
}

#[tokio::test]
async fn test_edit_comment_keeps_attachments() {
    let h = Harness::new();
    let client = h.register("max@example.com", ClientRole::Client).await;
    let created = h.create_task(client.id, "Taxes 2024", "W2 Form", vec![]).await;
    let comment_id = h
        .comment(client.id, created.task_id, "Attached", vec![h.upload("w2.pdf")])
        .await;

    let comment = h
        .board
        .edit_comment(
            created.task_id,
            comment_id,
            EditComment {
                body: "Attached, see page 2".to_string(),
            },
        )
        .await
        .unwrap();

    assert_eq!(comment.id, comment_id);
    assert_eq!(comment.body, "Attached, see page 2");
    assert_eq!(comment.file_ids.len(), 1);

    let err = h
        .board
        .edit_comment(
            created.task_id,
            Uuid::new_v4(),
            EditComment {
                body: "Lost".to_string(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, BoardError::NotFound(ref m) if m == "Comment not found"));
}
