//! Mock repositories and publishers for testing

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use trellis_db::{DbError, DbResult, SubscriptionRepository, SubscriptionRow, UserRepository, UserRow};
use trellis_lifecycle::{EventPublisher, MessagingError, NotifyError, WelcomeNotifier};
use trellis_types::{Subscription, SubscriptionCreated, UserId};
use uuid::Uuid;

/// In-memory subscription repository with version checks and failure injection
#[derive(Default, Clone)]
pub struct MockSubscriptionRepository {
    rows: Arc<DashMap<Uuid, SubscriptionRow>>,
    fail_saves: Arc<AtomicBool>,
    fail_finds: Arc<AtomicBool>,
    /// Number of upcoming saves that report a version conflict
    conflicts_to_inject: Arc<AtomicUsize>,
    saves: Arc<AtomicUsize>,
}

#[allow(dead_code)]
impl MockSubscriptionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a subscription directly, as version 1
    pub fn insert(&self, sub: &Subscription) -> Subscription {
        let mut row = SubscriptionRow::from(sub);
        row.version = 1;
        self.rows.insert(row.id, row.clone());
        Subscription::try_from(row).unwrap()
    }

    /// Current stored state
    pub fn get(&self, id: Uuid) -> Option<Subscription> {
        self.rows
            .get(&id)
            .map(|r| Subscription::try_from(r.value().clone()).unwrap())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn fail_finds(&self, fail: bool) {
        self.fail_finds.store(fail, Ordering::SeqCst);
    }

    pub fn inject_conflicts(&self, count: usize) {
        self.conflicts_to_inject.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl SubscriptionRepository for MockSubscriptionRepository {
    async fn find_by_id(&self, id: Uuid) -> DbResult<SubscriptionRow> {
        if self.fail_finds.load(Ordering::SeqCst) {
            return Err(DbError::Sqlx(sqlx::Error::PoolTimedOut));
        }
        self.rows
            .get(&id)
            .map(|r| r.value().clone())
            .ok_or(DbError::NotFound)
    }

    async fn save(&self, row: &SubscriptionRow) -> DbResult<SubscriptionRow> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(DbError::Sqlx(sqlx::Error::PoolTimedOut));
        }

        let injected = self
            .conflicts_to_inject
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(DbError::Conflict {
                expected: row.version,
            });
        }

        let mut stored = row.clone();
        match self.rows.entry(row.id) {
            dashmap::mapref::entry::Entry::Occupied(mut existing) => {
                if row.version == 0 || existing.get().version != row.version {
                    return Err(DbError::Conflict {
                        expected: row.version,
                    });
                }
                stored.created_at = existing.get().created_at;
                stored.version = row.version + 1;
                existing.insert(stored.clone());
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                if row.version != 0 {
                    return Err(DbError::Conflict {
                        expected: row.version,
                    });
                }
                stored.version = 1;
                slot.insert(stored.clone());
            }
        }

        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(stored)
    }
}

/// In-memory user repository for testing
#[derive(Default, Clone)]
pub struct MockUserRepository {
    users: Arc<DashMap<Uuid, UserRow>>,
}

#[allow(dead_code)]
impl MockUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and insert a test user
    pub fn create_test_user(&self, email: &str) -> UserId {
        let row = UserRow {
            id: Uuid::new_v4(),
            name: "Test User".to_string(),
            email: email.to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let id = row.user_id();
        self.users.insert(row.id, row);
        id
    }
}

#[async_trait]
impl UserRepository for MockUserRepository {
    async fn find_by_id(&self, id: Uuid) -> DbResult<Option<UserRow>> {
        Ok(self.users.get(&id).map(|r| r.value().clone()))
    }
}

/// Publisher that records every payload
#[derive(Default, Clone)]
pub struct RecordingPublisher {
    published: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
    fail: Arc<AtomicBool>,
}

#[allow(dead_code)]
impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_publishes(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn published(&self) -> Vec<(String, Vec<u8>)> {
        self.published.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.published.lock().unwrap().len()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, channel: &str, payload: Vec<u8>) -> Result<(), MessagingError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(MessagingError::Closed);
        }
        self.published
            .lock()
            .unwrap()
            .push((channel.to_string(), payload));
        Ok(())
    }
}

/// Notifier that records every welcome it was asked to send
#[derive(Default, Clone)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<SubscriptionCreated>>>,
    fail: Arc<AtomicBool>,
}

#[allow(dead_code)]
impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_sends(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<SubscriptionCreated> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl WelcomeNotifier for RecordingNotifier {
    async fn send_welcome(&self, event: &SubscriptionCreated) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(event.clone());
        if self.fail.load(Ordering::SeqCst) {
            return Err(NotifyError("mail relay unavailable".to_string()));
        }
        Ok(())
    }
}
