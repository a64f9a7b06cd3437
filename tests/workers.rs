use std::thread;
use std::time::{Duration, Instant};

use klangnetz::config::WorkerSettings;
use klangnetz::workers::{Exchange, Priority, WorkPerformer, WorkPool};
use klangnetz::WorkerError;

#[test]
fn jobs_run_on_named_pool_threads() {
    let performer = WorkPerformer::new(&WorkerSettings::default()).unwrap();

    let high = performer
        .submit(Priority::High, || thread::current().name().map(str::to_owned))
        .unwrap();
    let low = performer
        .submit(Priority::Low, || thread::current().name().map(str::to_owned))
        .unwrap();

    // Idle low threads may pick up high-priority work; never the reverse.
    assert!(high.wait().unwrap().unwrap().starts_with("klangnetz-"));
    assert!(low.wait().unwrap().unwrap().starts_with("klangnetz-lo-"));
    assert_eq!(performer.pool(Priority::High).num_threads(), 2);
    assert_eq!(performer.pool(Priority::Low).num_threads(), 1);
}

#[test]
fn high_priority_work_is_not_stuck_behind_a_busy_high_pool() {
    let settings = WorkerSettings {
        high_priority: 1,
        low_priority: 1,
    };
    let performer = WorkPerformer::new(&settings).unwrap();
    let (release, held) = crossbeam_channel::bounded::<()>(0);

    // Occupies one of the two threads until released.
    let blocker = performer
        .submit(Priority::High, move || held.recv().is_ok())
        .unwrap();
    let urgent = performer
        .submit(Priority::High, || thread::current().name().map(str::to_owned))
        .unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    let name = loop {
        if let Some(name) = urgent.try_get() {
            break name;
        }
        assert!(Instant::now() < deadline, "high priority job never ran");
        thread::sleep(Duration::from_millis(1));
    };
    assert!(name.is_some());

    release.send(()).unwrap();
    assert!(blocker.wait().unwrap());
}

#[test]
fn worker_results_reach_the_realtime_side() {
    let performer = WorkPerformer::new(&WorkerSettings::default()).unwrap();
    let (mut publisher, mut table) = Exchange::new(vec![0.0f32; 4], 4);

    let ticket = performer
        .submit(Priority::High, || {
            (0..1024)
                .map(|i| (i as f32 / 1024.0 * core::f32::consts::TAU).sin())
                .collect::<Vec<f32>>()
        })
        .unwrap();
    publisher.publish(ticket.wait().unwrap()).unwrap();

    // What the audio thread would do at the top of a round.
    assert!(table.update());
    assert_eq!(table.get().len(), 1024);
    assert_eq!(publisher.reclaim(), 1);
}

#[test]
fn closed_pool_refuses_work() {
    let mut pool = WorkPool::new("closing", 1).unwrap();
    let done = pool.submit(|| 1 + 1).unwrap();
    pool.shutdown();

    assert_eq!(done.wait().unwrap(), 2);
    assert!(matches!(pool.submit(|| ()), Err(WorkerError::PoolClosed(name)) if name == "closing"));
}
