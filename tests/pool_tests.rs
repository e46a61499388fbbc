use futures_throttle::{task_fn, PoolConfig, PoolError, TaskPool, DEFAULT_WORKER_LIMIT};

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::time::sleep;

// Helper to initialize tracing for tests (Once ensures it runs once per binary).
fn setup_tracing_for_test() {
  use std::sync::Once;
  use tracing_subscriber::{fmt, EnvFilter};
  static TRACING_INIT: Once = Once::new();

  TRACING_INIT.call_once(|| {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,futures_throttle=trace"));

    fmt::Subscriber::builder()
      .with_env_filter(filter)
      .with_test_writer()
      .try_init()
      .ok();
  });
}

/// Tracks how many task bodies are running at once and the high-water mark.
#[derive(Default)]
struct ConcurrencyProbe {
  current: AtomicUsize,
  max: AtomicUsize,
}

impl ConcurrencyProbe {
  fn enter(&self) {
    let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
    self.max.fetch_max(now, Ordering::SeqCst);
  }

  fn exit(&self) {
    self.current.fetch_sub(1, Ordering::SeqCst);
  }

  fn high_water(&self) -> usize {
    self.max.load(Ordering::SeqCst)
  }
}

#[tokio::test]
async fn test_submit_and_await_basic_task() {
  setup_tracing_for_test();
  let pool = TaskPool::new(
    task_fn(|n: u32| async move { n * 2 }),
    PoolConfig::new().worker_limit(2).queue_limit(5).named("basic_submit"),
    tokio::runtime::Handle::current(),
  );

  let handle = pool.submit(21).await.unwrap();
  assert_eq!(handle.await_result().await, Ok(42));

  pool.shutdown().await;
}

#[tokio::test]
async fn test_in_flight_never_exceeds_worker_limit() {
  setup_tracing_for_test();
  let worker_limit = 3;
  let probe = Arc::new(ConcurrencyProbe::default());

  let task_probe = probe.clone();
  let pool = TaskPool::new(
    task_fn(move |_: usize| {
      let probe = task_probe.clone();
      async move {
        probe.enter();
        sleep(Duration::from_millis(80)).await;
        probe.exit();
      }
    }),
    PoolConfig::new().worker_limit(worker_limit).named("bound_invariant"),
    tokio::runtime::Handle::current(),
  );

  // Sample the observable count while the run is in progress.
  let done = Arc::new(AtomicBool::new(false));
  let sampler = {
    let pool = pool.clone();
    let done = done.clone();
    tokio::spawn(async move {
      let mut max_seen = 0usize;
      while !done.load(Ordering::SeqCst) {
        max_seen = max_seen.max(pool.working_count());
        sleep(Duration::from_millis(5)).await;
      }
      max_seen
    })
  };

  let mut handles = Vec::new();
  for i in 0..20 {
    handles.push(pool.submit(i).await.unwrap());
  }
  for handle in handles {
    handle.await_result().await.unwrap();
  }
  done.store(true, Ordering::SeqCst);

  let max_sampled = sampler.await.unwrap();
  assert!(
    probe.high_water() <= worker_limit,
    "task-side high water {} exceeded worker limit {}",
    probe.high_water(),
    worker_limit
  );
  assert!(
    max_sampled <= worker_limit,
    "sampled working_count {} exceeded worker limit {}",
    max_sampled,
    worker_limit
  );

  pool.shutdown().await;
}

#[tokio::test]
async fn test_throughput_24_tasks_limit_6() {
  setup_tracing_for_test();
  let probe = Arc::new(ConcurrencyProbe::default());

  let task_probe = probe.clone();
  let pool = TaskPool::new(
    task_fn(move |i: usize| {
      let probe = task_probe.clone();
      async move {
        probe.enter();
        sleep(Duration::from_millis(150)).await;
        probe.exit();
        i
      }
    }),
    PoolConfig::new().worker_limit(6).queue_limit(100).named("throughput"),
    tokio::runtime::Handle::current(),
  );

  let mut handles = Vec::new();
  for i in 0..24 {
    handles.push(pool.submit(i).await.unwrap());
  }

  let results = join_all(handles.into_iter().map(|h| h.await_result())).await;
  let mut resolved: Vec<usize> = results.into_iter().map(|r| r.unwrap()).collect();
  resolved.sort_unstable();
  assert_eq!(resolved, (0..24).collect::<Vec<_>>());
  assert!(
    probe.high_water() <= 6,
    "observed {} concurrent executions with worker limit 6",
    probe.high_water()
  );

  pool.shutdown().await;
}

#[tokio::test]
async fn test_capacity_rejection_beyond_workers_plus_queue() {
  setup_tracing_for_test();
  let worker_limit = 2;
  let queue_limit = 3;
  let pool = TaskPool::new(
    task_fn(|i: usize| async move {
      sleep(Duration::from_millis(400)).await;
      i
    }),
    PoolConfig::new()
      .worker_limit(worker_limit)
      .queue_limit(queue_limit)
      .named("capacity_rejection"),
    tokio::runtime::Handle::current(),
  );

  // None of the tasks complete within the submission burst, so exactly
  // worker_limit + queue_limit submissions are admitted.
  let mut admitted = Vec::new();
  let mut rejected = 0usize;
  for i in 0..10 {
    match pool.submit(i).await {
      Ok(handle) => admitted.push(handle),
      Err(error) => {
        assert_eq!(error, PoolError::QueueFull);
        rejected += 1;
      }
    }
  }

  assert_eq!(admitted.len(), worker_limit + queue_limit);
  assert_eq!(rejected, 10 - (worker_limit + queue_limit));

  // Every admitted submission eventually resolves.
  for (expected, handle) in admitted.into_iter().enumerate() {
    assert_eq!(handle.await_result().await, Ok(expected));
  }

  pool.shutdown().await;
}

#[tokio::test]
async fn test_dispatch_order_is_fifo() {
  setup_tracing_for_test();
  let dispatch_order = Arc::new(parking_lot::Mutex::new(Vec::new()));

  let task_order = dispatch_order.clone();
  let pool = TaskPool::new(
    task_fn(move |i: u32| {
      let order = task_order.clone();
      async move {
        order.lock().push(i);
        sleep(Duration::from_millis(20)).await;
        i
      }
    }),
    PoolConfig::new().worker_limit(1).named("fifo_order"),
    tokio::runtime::Handle::current(),
  );

  let mut handles = Vec::new();
  for i in 0..5 {
    handles.push(pool.submit(i).await.unwrap());
  }
  for handle in handles {
    handle.await_result().await.unwrap();
  }

  assert_eq!(
    *dispatch_order.lock(),
    vec![0, 1, 2, 3, 4],
    "dispatch order must equal submission order"
  );

  pool.shutdown().await;
}

#[tokio::test]
async fn test_task_failures_do_not_disturb_siblings() {
  setup_tracing_for_test();
  // The task itself is fallible: its output is a Result the pool passes
  // through untouched.
  let pool = TaskPool::new(
    task_fn(|n: u32| async move {
      sleep(Duration::from_millis(10)).await;
      if n % 2 == 0 {
        Ok(n)
      } else {
        Err(format!("task {} failed", n))
      }
    }),
    PoolConfig::new().worker_limit(2).named("alternating_failures"),
    tokio::runtime::Handle::current(),
  );

  let mut handles = Vec::new();
  for n in 0..6 {
    handles.push(pool.submit(n).await.unwrap());
  }

  let mut successes = 0;
  let mut failures = 0;
  for (n, handle) in handles.into_iter().enumerate() {
    match handle.await_result().await.unwrap() {
      Ok(value) => {
        assert_eq!(value as usize, n);
        successes += 1;
      }
      Err(message) => {
        assert_eq!(message, format!("task {} failed", n));
        failures += 1;
      }
    }
  }
  assert_eq!(successes, 3);
  assert_eq!(failures, 3);

  // Failures left the pool fully operational.
  let handle = pool.submit(8).await.unwrap();
  assert_eq!(handle.await_result().await.unwrap(), Ok(8));

  pool.shutdown().await;
}

#[tokio::test]
async fn test_zero_queue_limit_rejects_at_capacity() {
  setup_tracing_for_test();
  // Queue limit zero is a real configuration: no waiting room beyond
  // in-flight capacity.
  let pool = TaskPool::new(
    task_fn(|i: usize| async move {
      sleep(Duration::from_millis(300)).await;
      i
    }),
    PoolConfig::new().worker_limit(1).queue_limit(0).named("zero_queue"),
    tokio::runtime::Handle::current(),
  );
  assert_eq!(pool.queue_limit(), Some(0));

  let first = pool.submit(1).await.expect("capacity free, must admit");

  let second = pool.submit(2).await;
  let error = second.expect_err("already at capacity, must reject");
  assert_eq!(error, PoolError::QueueFull);
  assert_eq!(error.to_string(), "exceeding queue capacity");

  assert_eq!(first.await_result().await, Ok(1));

  pool.shutdown().await;
}

#[tokio::test]
async fn test_no_spurious_or_duplicate_invocations() {
  setup_tracing_for_test();
  let invocations = Arc::new(AtomicUsize::new(0));

  let task_invocations = invocations.clone();
  let pool = TaskPool::new(
    task_fn(move |i: usize| {
      let invocations = task_invocations.clone();
      async move {
        invocations.fetch_add(1, Ordering::SeqCst);
        i
      }
    }),
    PoolConfig::new().worker_limit(4).queue_limit(16).named("no_spurious"),
    tokio::runtime::Handle::current(),
  );

  let mut handles = Vec::new();
  for i in 0..8 {
    handles.push(pool.submit(i).await.unwrap());
  }
  for handle in handles {
    handle.await_result().await.unwrap();
  }

  assert_eq!(invocations.load(Ordering::SeqCst), 8);

  // An idle pool with spare capacity must not invoke anything on its own.
  sleep(Duration::from_millis(100)).await;
  assert_eq!(invocations.load(Ordering::SeqCst), 8);
  assert_eq!(pool.working_count(), 0);
  assert_eq!(pool.queued_count(), 0);

  pool.shutdown().await;
}

#[tokio::test]
async fn test_task_panics_are_contained() {
  setup_tracing_for_test();
  let pool = TaskPool::new(
    task_fn(|n: u32| async move {
      if n == 1 {
        panic!("task {} intentionally panicked", n);
      }
      sleep(Duration::from_millis(10)).await;
      format!("done {}", n)
    }),
    PoolConfig::new().worker_limit(1).queue_limit(5).named("panic_handling"),
    tokio::runtime::Handle::current(),
  );

  let handle_panic = pool.submit(1).await.unwrap();
  match handle_panic.await_result().await {
    Err(PoolError::TaskPanicked) => {}
    other => panic!("Expected TaskPanicked error, got {:?}", other),
  }

  // The pool keeps dispatching after a panic.
  let handle_normal = pool.submit(2).await.unwrap();
  assert_eq!(handle_normal.await_result().await, Ok("done 2".to_string()));

  pool.shutdown().await;
}

#[tokio::test]
async fn test_working_and_queued_counts_are_observable() {
  setup_tracing_for_test();
  let pool = TaskPool::new(
    task_fn(|i: usize| async move {
      sleep(Duration::from_millis(300)).await;
      i
    }),
    PoolConfig::new().worker_limit(2).queue_limit(10).named("observability"),
    tokio::runtime::Handle::current(),
  );

  let mut handles = Vec::new();
  for i in 0..4 {
    handles.push(pool.submit(i).await.unwrap());
  }

  sleep(Duration::from_millis(50)).await;
  assert_eq!(pool.working_count(), 2);
  assert_eq!(pool.queued_count(), 2);

  for handle in handles {
    handle.await_result().await.unwrap();
  }
  assert_eq!(pool.working_count(), 0);
  assert_eq!(pool.queued_count(), 0);

  pool.shutdown().await;
}

#[tokio::test]
async fn test_unset_limits_apply_defaults() {
  setup_tracing_for_test();
  let pool = TaskPool::new(
    task_fn(|_: ()| async {}),
    PoolConfig::new().named("defaults"),
    tokio::runtime::Handle::current(),
  );
  assert_eq!(pool.worker_limit(), DEFAULT_WORKER_LIMIT);
  assert_eq!(pool.queue_limit(), None);
  pool.shutdown().await;

  // Worker limit zero would make the pool inert and is clamped, unlike
  // queue limit zero which is honored as configured.
  let clamped = TaskPool::new(
    task_fn(|_: ()| async {}),
    PoolConfig::new().worker_limit(0).named("clamped"),
    tokio::runtime::Handle::current(),
  );
  assert_eq!(clamped.worker_limit(), 1);
  clamped.shutdown().await;
}

#[tokio::test]
async fn test_submit_to_shutting_down_pool_fails() {
  setup_tracing_for_test();
  let pool = TaskPool::new(
    task_fn(|i: usize| async move { i }),
    PoolConfig::new().worker_limit(1).queue_limit(1).named("submit_after_shutdown"),
    tokio::runtime::Handle::current(),
  );

  let handle = pool.submit(5).await.unwrap();
  assert_eq!(handle.await_result().await, Ok(5));

  pool.clone().shutdown().await;

  let result = pool.submit(6).await;
  match result {
    Err(PoolError::PoolShuttingDown) => {}
    other => panic!("Expected PoolShuttingDown error, got {:?}", other),
  }
}

#[tokio::test]
async fn test_dispatched_work_survives_pool_drop() {
  setup_tracing_for_test();

  let handle = {
    let pool = TaskPool::new(
      task_fn(|i: usize| async move {
        sleep(Duration::from_millis(100)).await;
        i * 10
      }),
      PoolConfig::new().worker_limit(1).named("drop_cleanup"),
      tokio::runtime::Handle::current(),
    );
    let handle = pool.submit(7).await.unwrap();
    // Give the dispatch loop a moment to pick the request up before the
    // last pool reference drops.
    sleep(Duration::from_millis(20)).await;
    handle
  };

  // The pool is gone, but the dispatched execution settles normally.
  assert_eq!(handle.await_result().await, Ok(70));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stress_with_jittered_latencies() {
  setup_tracing_for_test();
  use rand::Rng;

  let probe = Arc::new(ConcurrencyProbe::default());
  let task_probe = probe.clone();
  let pool = TaskPool::new(
    task_fn(move |(i, delay_ms): (usize, u64)| {
      let probe = task_probe.clone();
      async move {
        probe.enter();
        sleep(Duration::from_millis(delay_ms)).await;
        probe.exit();
        i
      }
    }),
    PoolConfig::new().worker_limit(6).queue_limit(100).named("stress_jitter"),
    tokio::runtime::Handle::current(),
  );

  let delays: Vec<u64> = {
    let mut rng = rand::rng();
    (0..24).map(|_| rng.random_range(20..80)).collect()
  };

  let mut handles = Vec::new();
  for (i, delay_ms) in delays.into_iter().enumerate() {
    handles.push(pool.submit((i, delay_ms)).await.unwrap());
  }

  let results = join_all(handles.into_iter().map(|h| h.await_result())).await;
  assert!(results.iter().all(|r| r.is_ok()));
  assert!(
    probe.high_water() <= 6,
    "observed {} concurrent executions with worker limit 6",
    probe.high_water()
  );

  pool.shutdown().await;
}
