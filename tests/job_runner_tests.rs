mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cafe::jobs::{JobRun, JobRunner};
use cafe::status::{TaskResult, TaskState};
use common::wait_for_finish;
use tokio_util::sync::CancellationToken;

fn start_runner() -> (Arc<JobRunner>, CancellationToken) {
  let runner = Arc::new(JobRunner::new(100));
  let shutdown = CancellationToken::new();
  runner.start(shutdown.clone());
  (runner, shutdown)
}

#[tokio::test(start_paused = true)]
async fn test_runs_never_overlap() {
  let (runner, _shutdown) = start_runner();
  let log = Arc::new(Mutex::new(Vec::new()));

  let slow_log = log.clone();
  let slow = JobRun::new("slow", move |_| async move {
    slow_log.lock().unwrap().push("slow started");
    tokio::time::sleep(Duration::from_secs(2)).await;
    slow_log.lock().unwrap().push("slow finished");
    anyhow::Ok(())
  });
  let fast_log = log.clone();
  let fast = JobRun::new("fast", move |_| async move {
    fast_log.lock().unwrap().push("fast started");
    anyhow::Ok(())
  });
  let (slow_id, fast_id) = (slow.id(), fast.id());

  runner.enqueue(slow);
  runner.enqueue(fast);

  let fast_status = wait_for_finish(&runner, fast_id).await;
  let slow_status = runner.find_status_by_id(slow_id).unwrap();

  assert_eq!(*log.lock().unwrap(), vec!["slow started", "slow finished", "fast started"]);
  assert!(fast_status.start_time.unwrap() >= slow_status.complete_time.unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_at_most_one_run_at_a_time() {
  let (runner, _shutdown) = start_runner();
  let active = Arc::new(AtomicUsize::new(0));
  let max_active = Arc::new(AtomicUsize::new(0));

  let mut ids = Vec::new();
  for i in 0..5 {
    let active = active.clone();
    let max_active = max_active.clone();
    let run = JobRun::new(format!("run {}", i), move |_| async move {
      let now = active.fetch_add(1, Ordering::SeqCst) + 1;
      max_active.fetch_max(now, Ordering::SeqCst);
      tokio::time::sleep(Duration::from_millis(50)).await;
      active.fetch_sub(1, Ordering::SeqCst);
      anyhow::Ok(())
    });
    ids.push(run.id());
    runner.enqueue(run);
  }

  for id in &ids {
    wait_for_finish(&runner, *id).await;
  }
  assert_eq!(max_active.load(Ordering::SeqCst), 1);

  let order: Vec<_> = runner.to_status().jobs.iter().map(|job| job.id).collect();
  assert_eq!(order, ids);
}

#[tokio::test]
async fn test_failure_is_recorded_and_queue_keeps_going() {
  let (runner, _shutdown) = start_runner();
  let failing = JobRun::new("failing", |_| async { anyhow::bail!("agent exited with code 3") });
  let next = JobRun::new("next", |_| async { anyhow::Ok(()) });
  let (failing_id, next_id) = (failing.id(), next.id());

  runner.enqueue(failing);
  runner.enqueue(next);

  let failed = wait_for_finish(&runner, failing_id).await;
  assert_eq!(failed.result, Some(TaskResult::failure("agent exited with code 3")));

  let succeeded = wait_for_finish(&runner, next_id).await;
  assert_eq!(succeeded.result, Some(TaskResult::Success));
}

#[tokio::test]
async fn test_panicking_work_still_finishes() {
  let (runner, _shutdown) = start_runner();
  let panicking = JobRun::new("panicking", |_| async {
    if true {
      panic!("boom");
    }
    anyhow::Ok(())
  });
  let id = panicking.id();
  runner.enqueue(panicking);

  let status = wait_for_finish(&runner, id).await;
  assert_eq!(status.state, TaskState::Finished);
  match status.result {
    Some(TaskResult::Failure(message)) => assert!(message.contains("panicked")),
    other => panic!("expected a failure, got {:?}", other),
  }

  let after = JobRun::new("after", |_| async { anyhow::Ok(()) });
  let after_id = after.id();
  runner.enqueue(after);
  assert_eq!(wait_for_finish(&runner, after_id).await.result, Some(TaskResult::Success));
}

#[tokio::test]
async fn test_progress_is_visible_while_running() {
  let (runner, _shutdown) = start_runner();
  let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
  let run = JobRun::new("reporting", move |progress| async move {
    progress.report("halfway there");
    let _ = release_rx.await;
    anyhow::Ok(())
  });
  let id = run.id();
  runner.enqueue(run);

  let mut seen = None;
  for _ in 0..500 {
    if let Some(status) = runner.find_status_by_id(id) {
      if status.current_message.is_some() {
        seen = Some(status);
        break;
      }
    }
    tokio::time::sleep(Duration::from_millis(5)).await;
  }
  let running = seen.expect("progress message was never published");
  assert_eq!(running.state, TaskState::Running);
  assert_eq!(running.current_message.as_deref(), Some("halfway there"));

  release_tx.send(()).unwrap();
  let finished = wait_for_finish(&runner, id).await;
  assert_eq!(finished.current_message.as_deref(), Some("halfway there"));
  assert!(finished.start_time.unwrap() <= finished.complete_time.unwrap());
}

#[tokio::test]
async fn test_history_is_bounded() {
  let runner = Arc::new(JobRunner::new(2));
  let shutdown = CancellationToken::new();
  runner.start(shutdown.clone());

  let mut ids = Vec::new();
  for i in 0..4 {
    let run = JobRun::new(format!("run {}", i), |_| async { anyhow::Ok(()) });
    ids.push(run.id());
    runner.enqueue(run);
  }
  wait_for_finish(&runner, ids[3]).await;

  assert!(runner.find_status_by_id(ids[0]).is_none());
  assert!(runner.find_status_by_id(ids[1]).is_none());
  assert_eq!(runner.to_status().jobs.len(), 2);
}

#[tokio::test]
async fn test_worker_stops_on_shutdown() {
  let runner = Arc::new(JobRunner::new(10));
  let shutdown = CancellationToken::new();
  let worker = runner.start(shutdown.clone());

  shutdown.cancel();
  tokio::time::timeout(Duration::from_secs(5), worker).await.unwrap().unwrap();

  let run = JobRun::new("never runs", |_| async { anyhow::Ok(()) });
  let id = run.id();
  runner.enqueue(run);
  assert_eq!(runner.find_status_by_id(id).unwrap().state, TaskState::NotStarted);
  assert_eq!(runner.queue_length(), 1);
}

#[tokio::test]
async fn test_zero_history_limit_keeps_the_latest_finished_run() {
  let runner = Arc::new(JobRunner::new(0));
  let shutdown = CancellationToken::new();
  runner.start(shutdown.clone());

  let first = JobRun::new("first", |_| async { anyhow::Ok(()) });
  let second = JobRun::new("second", |_| async { anyhow::Ok(()) });
  let (first_id, second_id) = (first.id(), second.id());
  runner.enqueue(first);
  runner.enqueue(second);

  assert_eq!(wait_for_finish(&runner, second_id).await.result, Some(TaskResult::Success));
  assert!(runner.find_status_by_id(first_id).is_none());
  assert_eq!(runner.find_status_by_id(second_id).map(|s| s.state), Some(TaskState::Finished));
}
