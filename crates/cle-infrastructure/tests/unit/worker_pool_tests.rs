//! Worker pool tests

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use cle_domain::error::Error;
use cle_infrastructure::events::{EnqueueError, WorkerPool};
use crossbeam_channel::{bounded, unbounded};

const WAIT: Duration = Duration::from_secs(5);

#[test]
fn test_rejects_empty_pool() {
    assert!(matches!(
        WorkerPool::new("empty", 0, 4),
        Err(Error::Configuration { .. })
    ));
    assert!(matches!(
        WorkerPool::new("empty", 1, 0),
        Err(Error::Configuration { .. })
    ));
}

#[test]
fn test_jobs_run_on_named_threads() {
    let pool = WorkerPool::new("named", 2, 8).unwrap();
    let (tx, rx) = unbounded();
    for _ in 0..4 {
        let tx = tx.clone();
        pool.try_enqueue(move || {
            let name = thread::current().name().map(str::to_string);
            tx.send(name).unwrap();
        })
        .unwrap();
    }
    for _ in 0..4 {
        let name = rx.recv_timeout(WAIT).unwrap().unwrap();
        assert!(name.starts_with("named-"), "unexpected thread {name}");
    }
}

#[test]
fn test_full_queue_is_a_capacity_error() {
    let pool = WorkerPool::new("tight", 1, 1).unwrap();
    let (started_tx, started) = bounded(1);
    let (release, released) = bounded::<()>(1);

    pool.try_enqueue(move || {
        started_tx.send(()).unwrap();
        let _ = released.recv();
    })
    .unwrap();
    started.recv_timeout(WAIT).unwrap();

    // the worker is busy: one job fits in the queue, the next does not
    pool.try_enqueue(|| {}).unwrap();
    assert_eq!(pool.queued(), 1);
    let refused = pool.try_enqueue(|| {}).unwrap_err();
    assert!(matches!(refused, EnqueueError::Full { capacity: 1, .. }));
    assert!(matches!(Error::from(refused), Error::Capacity { .. }));

    release.send(()).unwrap();
    assert!(pool.wait_idle(WAIT));
    assert_eq!(pool.queued(), 0);
}

#[test]
fn test_shutdown_drains_queued_jobs() {
    let pool = WorkerPool::new("drain", 1, 32).unwrap();
    let done = Arc::new(AtomicUsize::new(0));
    for _ in 0..20 {
        let done = Arc::clone(&done);
        pool.try_enqueue(move || {
            thread::sleep(Duration::from_millis(1));
            done.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    }

    pool.shutdown(WAIT);
    assert_eq!(done.load(Ordering::SeqCst), 20);
    assert!(!pool.is_accepting());
    assert!(matches!(
        pool.try_enqueue(|| {}),
        Err(EnqueueError::Stopped { .. })
    ));
    // second call is a no-op
    pool.shutdown(WAIT);
}

#[test]
fn test_shutdown_wait_is_bounded() {
    let pool = WorkerPool::new("stuck", 1, 4).unwrap();
    let (started_tx, started) = bounded(1);
    let (release, released) = bounded::<()>(1);
    pool.try_enqueue(move || {
        started_tx.send(()).unwrap();
        let _ = released.recv_timeout(Duration::from_secs(30));
    })
    .unwrap();
    started.recv_timeout(WAIT).unwrap();

    let begin = Instant::now();
    pool.shutdown(Duration::from_millis(50));
    assert!(begin.elapsed() < Duration::from_secs(5));

    release.send(()).unwrap();
}

#[test]
fn test_shutdown_with_full_queue_is_bounded() {
    let pool = WorkerPool::new("clogged", 1, 1).unwrap();
    let (started_tx, started) = bounded(1);
    let (release, released) = bounded::<()>(1);
    pool.try_enqueue(move || {
        started_tx.send(()).unwrap();
        let _ = released.recv_timeout(Duration::from_secs(30));
    })
    .unwrap();
    started.recv_timeout(WAIT).unwrap();
    pool.try_enqueue(|| {}).unwrap();
    assert_eq!(pool.queued(), 1);

    // no room for a stop message while the only worker is busy
    let begin = Instant::now();
    pool.shutdown(Duration::from_millis(100));
    assert!(begin.elapsed() < Duration::from_secs(5));
    assert!(!pool.is_accepting());

    release.send(()).unwrap();
}

#[test]
fn test_panicking_job_keeps_worker_alive() {
    let pool = WorkerPool::new("panicky", 1, 4).unwrap();
    pool.try_enqueue(|| panic!("job failure")).unwrap();

    let (tx, rx) = bounded(1);
    pool.try_enqueue(move || tx.send(42).unwrap()).unwrap();
    assert_eq!(rx.recv_timeout(WAIT).unwrap(), 42);
    assert!(pool.wait_idle(WAIT));
}
