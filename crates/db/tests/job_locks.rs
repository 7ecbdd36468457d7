//! Integration tests for processing leases.

use sqlx::PgPool;
use twingraph_core::job_lock::JobLockInfo;
use twingraph_db::repositories::JobLockRepo;

#[sqlx::test(migrations = "./migrations")]
async fn second_acquire_fails_while_lease_is_live(pool: PgPool) {
    let first = JobLockRepo::try_acquire(&pool, "job-1", "instance-a", 60)
        .await
        .unwrap();
    assert!(first.is_some());

    let second = JobLockRepo::try_acquire(&pool, "job-1", "instance-b", 60)
        .await
        .unwrap();
    assert!(second.is_none());

    let lock: JobLockInfo = JobLockRepo::find(&pool, "job-1").await.unwrap().unwrap().into();
    assert!(lock.is_held_by("instance-a"));
    assert!(!lock.is_expired());
}

#[sqlx::test(migrations = "./migrations")]
async fn expired_lease_can_be_taken_over(pool: PgPool) {
    JobLockRepo::try_acquire(&pool, "job-1", "instance-a", 60)
        .await
        .unwrap()
        .unwrap();
    sqlx::query("UPDATE import_job_locks SET expires_at = NOW() - INTERVAL '1 second'")
        .execute(&pool)
        .await
        .unwrap();

    let taken = JobLockRepo::try_acquire(&pool, "job-1", "instance-b", 60)
        .await
        .unwrap();
    assert_eq!(taken.map(|l| l.acquired_by), Some("instance-b".to_string()));

    // The previous holder can no longer renew.
    assert!(!JobLockRepo::renew(&pool, "job-1", "instance-a").await.unwrap());
    assert!(JobLockRepo::renew(&pool, "job-1", "instance-b").await.unwrap());
}

#[sqlx::test(migrations = "./migrations")]
async fn concurrent_acquires_have_one_winner(pool: PgPool) {
    let mut handles = Vec::new();
    for i in 0..8 {
        let pool = pool.clone();
        handles.push(tokio::spawn(async move {
            JobLockRepo::try_acquire(&pool, "job-1", &format!("instance-{i}"), 60)
                .await
                .unwrap()
                .is_some()
        }));
    }

    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
}

#[sqlx::test(migrations = "./migrations")]
async fn release_is_unconditional(pool: PgPool) {
    JobLockRepo::try_acquire(&pool, "job-1", "instance-a", 60)
        .await
        .unwrap();
    assert!(JobLockRepo::release(&pool, "job-1").await.unwrap());
    assert!(JobLockRepo::find(&pool, "job-1").await.unwrap().is_none());
    assert!(JobLockRepo::try_acquire(&pool, "job-1", "instance-b", 60)
        .await
        .unwrap()
        .is_some());
}
