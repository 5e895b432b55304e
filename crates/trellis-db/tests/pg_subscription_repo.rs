//! PostgreSQL subscription repository tests
//!
//! These need a disposable database:
//! `DATABASE_URL=postgres://... cargo test -p trellis-db -- --ignored`

use chrono::{Duration, Utc};
use trellis_db::pg::PgSubscriptionRepository;
use trellis_db::{
    create_pool, run_migrations, DbError, DbPool, SubscriptionRepository, SubscriptionRow,
};
use trellis_types::{Subscription, UserId};
use uuid::Uuid;

async fn setup() -> (DbPool, PgSubscriptionRepository) {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = create_pool(&url).await.expect("connect");
    run_migrations(&pool).await.expect("migrate");
    let repo = PgSubscriptionRepository::new(pool.clone());
    (pool, repo)
}

async fn insert_user(pool: &DbPool) -> UserId {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO users (id, name, email, password_hash) VALUES ($1, 'Test', $2, 'x')",
    )
    .bind(id)
    .bind(format!("{id}@example.com"))
    .execute(pool)
    .await
    .expect("insert user");
    UserId(id)
}

async fn pending_row(pool: &DbPool) -> SubscriptionRow {
    let user_id = insert_user(pool).await;
    SubscriptionRow::from(&Subscription::new_pending(user_id, "pro", Utc::now()))
}

#[tokio::test]
#[ignore]
async fn test_save_checks_version() {
    let (pool, repo) = setup().await;
    let row = pending_row(&pool).await;

    let stored = repo.save(&row).await.unwrap();
    assert_eq!(stored.version, 1);

    let mut trial = stored.clone();
    trial.status = "TRIAL".to_string();
    trial.trial_ends_at = Some(stored.updated_at + Duration::days(14));
    let updated = repo.save(&trial).await.unwrap();
    assert_eq!(updated.version, 2);

    // Written against version 1 after the row moved to 2
    let mut stale = stored.clone();
    stale.plan_id = "basic".to_string();
    let err = repo.save(&stale).await.unwrap_err();
    assert!(matches!(err, DbError::Conflict { expected: 1 }));

    let current = repo.find_by_id(row.id).await.unwrap();
    assert_eq!(current.status, "TRIAL");
    assert_eq!(current.plan_id, "pro");
    assert_eq!(current.version, 2);
}

#[tokio::test]
#[ignore]
async fn test_insert_of_existing_id_conflicts() {
    let (pool, repo) = setup().await;
    let row = pending_row(&pool).await;

    repo.save(&row).await.unwrap();
    let err = repo.save(&row).await.unwrap_err();

    assert!(matches!(err, DbError::Conflict { expected: 0 }));
}

#[tokio::test]
#[ignore]
async fn test_missing_row_is_not_found() {
    let (_pool, repo) = setup().await;

    assert!(matches!(
        repo.find_by_id(Uuid::new_v4()).await,
        Err(DbError::NotFound)
    ));
}
