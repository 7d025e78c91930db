//! Shared fixtures for the in-memory integration tests
//!
//! Files are real: uploads are written under a per-test directory in the
//! system temp dir so disk cleanup can be checked with `Path::exists`.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use taxdesk_shared::cascade::CascadeManager;
use taxdesk_shared::files::{DiskRemover, FileRemover, PostCommitCleanup};
use taxdesk_shared::models::client::{Client, ClientRole};
use taxdesk_shared::notify::{Notification, Notifier, NotifyError};
use taxdesk_shared::services::{
    ClientReminder, NewClient, NewComment, NewTask, TaskBoard, TaskCreated, Upload,
};
use taxdesk_shared::store::{DocumentStore, MemoryStore};
use uuid::Uuid;

pub const STAFF_INBOX: &str = "staff@taxdesk.test";

/// Disk remover that counts calls and can be told to fail
#[derive(Default)]
pub struct CountingRemover {
    calls: Mutex<Vec<PathBuf>>,
    failing: Mutex<HashSet<PathBuf>>,
}

impl CountingRemover {
    pub fn calls(&self) -> Vec<PathBuf> {
        self.calls.lock().unwrap().clone()
    }

    pub fn fail_on(&self, path: &Path) {
        self.failing.lock().unwrap().insert(path.to_path_buf());
    }

    pub fn heal(&self) {
        self.failing.lock().unwrap().clear();
    }
}

#[async_trait]
impl FileRemover for CountingRemover {
    async fn remove(&self, path: &Path) -> io::Result<()> {
        self.calls.lock().unwrap().push(path.to_path_buf());
        if self.failing.lock().unwrap().contains(path) {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "file is locked"));
        }
        DiskRemover.remove(path).await
    }
}

/// Notifier that keeps every notification in memory
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
    broken: Mutex<bool>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }

    pub fn break_delivery(&self) {
        *self.broken.lock().unwrap() = true;
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, notification: Notification) -> Result<(), NotifyError> {
        if *self.broken.lock().unwrap() {
            return Err(NotifyError::Delivery("mail server unreachable".to_string()));
        }
        self.sent.lock().unwrap().push(notification);
        Ok(())
    }
}

pub struct Harness {
    pub store: MemoryStore,
    pub remover: Arc<CountingRemover>,
    pub notifier: Arc<RecordingNotifier>,
    pub cascade: CascadeManager,
    pub board: TaskBoard,
    pub reminder: ClientReminder,
    pub dir: PathBuf,
}

impl Harness {
    pub fn new() -> Self {
        let store = MemoryStore::new();
        let remover = Arc::new(CountingRemover::default());
        let notifier = Arc::new(RecordingNotifier::default());

        let shared: Arc<dyn DocumentStore> = Arc::new(store.clone());
        let cleanup = PostCommitCleanup::new(shared.clone(), remover.clone());
        let cascade = CascadeManager::new(shared.clone(), cleanup.clone());
        let board = TaskBoard::new(shared.clone(), cleanup, notifier.clone(), STAFF_INBOX);
        let reminder = ClientReminder::new(shared, notifier.clone());

        let dir = std::env::temp_dir().join(format!("taxdesk-test-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();

        Self {
            store,
            remover,
            notifier,
            cascade,
            board,
            reminder,
            dir,
        }
    }

    /// Writes a file the way the upload layer would
    pub fn upload(&self, name: &str) -> Upload {
        let path = self.dir.join(format!("{}-{}", Uuid::new_v4(), name));
        std::fs::write(&path, name.as_bytes()).unwrap();
        Upload::new(name, path, name.len() as i64, "application/pdf")
    }

    pub async fn register(&self, email: &str, role: ClientRole) -> Client {
        self.board
            .register_client(
                NewClient {
                    email: email.to_string(),
                    password_hash: "hash".to_string(),
                    first_name: String::new(),
                    last_name: String::new(),
                    business_name: String::new(),
                    role,
                },
                "Anna",
            )
            .await
            .unwrap()
    }

    pub async fn create_task(
        &self,
        client_id: Uuid,
        list: &str,
        title: &str,
        uploads: Vec<Upload>,
    ) -> TaskCreated {
        self.board
            .create_task(
                NewTask {
                    client_id,
                    task_list_name: list.to_string(),
                    title: title.to_string(),
                    description: String::new(),
                },
                uploads,
                "Anna",
            )
            .await
            .unwrap()
    }

    pub async fn comment(&self, author_id: Uuid, task_id: Uuid, body: &str, uploads: Vec<Upload>) -> Uuid {
        self.board
            .leave_comment(
                author_id,
                NewComment {
                    task_id,
                    body: body.to_string(),
                },
                uploads,
            )
            .await
            .unwrap()
            .id
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}
