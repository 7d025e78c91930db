/// Integration tests for the client reminder job

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use taxdesk_shared::files::{DiskRemover, PostCommitCleanup};
use taxdesk_shared::models::client::ClientRole;
use taxdesk_shared::notify::{Notification, NotificationEvent, Notifier, NotifyError};
use taxdesk_shared::services::{ClientReminder, NewClient, NewTask, TaskBoard};
use taxdesk_shared::store::{DocumentStore, MemoryStore};
use taxdesk_worker::reminder::{ReminderConfig, ReminderJob};

#[derive(Default)]
struct Outbox {
    sent: Mutex<Vec<Notification>>,
}

impl Outbox {
    fn reminders(&self) -> usize {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|n| matches!(n.event, NotificationEvent::Reminder { .. }))
            .count()
    }
}

#[async_trait]
impl Notifier for Outbox {
    async fn send(&self, notification: Notification) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(notification);
        Ok(())
    }
}

/// Store holding one client with one waiting task
async fn seeded(outbox: Arc<Outbox>) -> Arc<dyn DocumentStore> {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let board = TaskBoard::new(
        store.clone(),
        PostCommitCleanup::new(store.clone(), Arc::new(DiskRemover)),
        outbox,
        "staff@taxdesk.test",
    );

    let client = board
        .register_client(
            NewClient {
                email: "max@example.com".to_string(),
                password_hash: "hash".to_string(),
                first_name: "Max".to_string(),
                last_name: String::new(),
                business_name: String::new(),
                role: ClientRole::Client,
            },
            "Anna",
        )
        .await
        .unwrap();
    board
        .create_task(
            NewTask {
                client_id: client.id,
                task_list_name: "Taxes 2024".to_string(),
                title: "W2 Form".to_string(),
                description: String::new(),
            },
            Vec::new(),
            "Anna",
        )
        .await
        .unwrap();

    store
}

#[tokio::test]
async fn test_run_once_reminds_waiting_clients() {
    let outbox = Arc::new(Outbox::default());
    let store = seeded(outbox.clone()).await;
    let job = ReminderJob::new(
        ClientReminder::new(store, outbox.clone()),
        &ReminderConfig::default(),
    );

    let report = job.run_once().await.unwrap();

    assert_eq!(report.reminded, 1);
    assert_eq!(report.tasks, 1);
    assert_eq!(outbox.reminders(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_run_waits_one_interval_before_first_reminder() {
    let outbox = Arc::new(Outbox::default());
    let store = seeded(outbox.clone()).await;
    let job = ReminderJob::with_interval(
        ClientReminder::new(store, outbox.clone()),
        Duration::from_secs(60),
    );
    let token = job.shutdown_token();
    let handle = tokio::spawn(async move { job.run().await });

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(outbox.reminders(), 0);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(outbox.reminders(), 1);

    token.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_run_stops_on_shutdown() {
    let outbox = Arc::new(Outbox::default());
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let job = ReminderJob::new(
        ClientReminder::new(store, outbox.clone()),
        &ReminderConfig::default(),
    );

    let token = job.shutdown_token();
    let handle = tokio::spawn(async move { job.run().await });

    token.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("reminder job did not stop")
        .unwrap();
    assert_eq!(outbox.reminders(), 0);
}
