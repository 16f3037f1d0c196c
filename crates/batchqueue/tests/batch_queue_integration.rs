//! End-to-end tests for batch queues
//!
//! Real scheduler threads, real producers. Every test owns its manager, so
//! queue and pool names never collide across tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::{Duration, Instant};

use batchqueue::{
    BatchQueue, BatchQueueConfig, BatchQueueConfigBuilder, BatchQueueManager, BufferStrategy,
    HandlerConsumer, HandlerError, PartitionPolicy, QueueMetricsProvider, QueueState,
    ThreadPolicy, TypeKey, TypeKeyed,
};
use batchqueue_metrics::UsageReporter;
use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Metric {
    kind: usize,
    seq: u64,
}

impl Metric {
    fn new(kind: usize, seq: u64) -> Self {
        Self { kind, seq }
    }
}

/// Distinct keys for `kind` values, leaked once per test binary
fn key(kind: usize) -> TypeKey {
    static KEYS: OnceLock<Vec<TypeKey>> = OnceLock::new();
    KEYS.get_or_init(|| {
        (0..1_000)
            .map(|i| TypeKey::new(Box::leak(format!("metric-{i}").into_boxed_str())))
            .collect()
    })[kind]
}

impl TypeKeyed for Metric {
    fn type_key(&self) -> TypeKey {
        key(self.kind)
    }
}

/// Consumer that keeps every item it sees
#[derive(Default)]
struct Recorder {
    items: Mutex<Vec<Metric>>,
    batches: AtomicUsize,
    idles: AtomicUsize,
}

impl Recorder {
    fn count(&self) -> usize {
        self.items.lock().len()
    }

    fn items(&self) -> Vec<Metric> {
        self.items.lock().clone()
    }
}

impl HandlerConsumer<Metric> for Recorder {
    fn consume(&self, batch: &[Metric]) -> Result<(), HandlerError> {
        self.batches.fetch_add(1, Ordering::SeqCst);
        self.items.lock().extend_from_slice(batch);
        Ok(())
    }

    fn on_idle(&self) {
        self.idles.fetch_add(1, Ordering::SeqCst);
    }
}

/// Consumer that blocks inside `consume` until opened
#[derive(Default)]
struct Gate {
    entered: AtomicBool,
    open: AtomicBool,
    consumed: AtomicUsize,
}

impl Gate {
    fn open(&self) {
        self.open.store(true, Ordering::SeqCst);
    }
}

impl HandlerConsumer<Metric> for Gate {
    fn consume(&self, batch: &[Metric]) -> Result<(), HandlerError> {
        self.entered.store(true, Ordering::SeqCst);
        while !self.open.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(1));
        }
        self.consumed.fetch_add(batch.len(), Ordering::SeqCst);
        Ok(())
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn fixed(n: usize) -> ThreadPolicy {
    ThreadPolicy::fixed(n).unwrap()
}

fn builder(threads: usize) -> BatchQueueConfigBuilder<Metric> {
    BatchQueueConfig::builder().threads(fixed(threads))
}

fn consumer<C: HandlerConsumer<Metric> + 'static>(c: &Arc<C>) -> Arc<dyn HandlerConsumer<Metric>> {
    Arc::clone(c) as Arc<dyn HandlerConsumer<Metric>>
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

const WAIT: Duration = Duration::from_secs(5);

// ============================================================================
// Delivery
// ============================================================================

#[test]
fn test_single_consumer_one_thread() {
    init_tracing();
    let manager = BatchQueueManager::new();
    let recorder = Arc::new(Recorder::default());
    let queue = manager
        .create("SINGLE", builder(1).consumer(consumer(&recorder)).build().unwrap())
        .unwrap();

    for seq in 0..1_000 {
        assert!(queue.produce(Metric::new(0, seq)));
    }
    assert!(wait_until(WAIT, || recorder.count() == 1_000));

    // One partition, one drainer: strict FIFO
    let seqs: Vec<u64> = recorder.items().iter().map(|m| m.seq).collect();
    assert_eq!(seqs, (0..1_000).collect::<Vec<_>>());
    assert_eq!(queue.metrics().produced, 1_000);
    // Counters are recorded after the consumer returns
    assert!(wait_until(WAIT, || queue.metrics().consumed == 1_000));
    assert_eq!(
        queue.metrics().batches,
        recorder.batches.load(Ordering::SeqCst) as u64
    );
}

#[test]
fn test_single_consumer_many_producers() {
    init_tracing();
    let manager = BatchQueueManager::new();
    let recorder = Arc::new(Recorder::default());
    let config = builder(4)
        .partitions(PartitionPolicy::thread_multiply(2).unwrap())
        .consumer(consumer(&recorder))
        .build()
        .unwrap();
    let queue = manager.create("MANY_PRODUCERS", config).unwrap();
    assert_eq!(queue.partition_count(), 8);
    assert_eq!(queue.task_count(), 4);

    let producers: Vec<_> = (0..4u64)
        .map(|p| {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                for i in 0..2_500u64 {
                    let seq = p * 2_500 + i;
                    assert!(queue.produce(Metric::new((seq % 8) as usize, seq)));
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }

    assert!(wait_until(WAIT, || recorder.count() == 10_000));
    let mut seqs: Vec<u64> = recorder.items().iter().map(|m| m.seq).collect();
    seqs.sort_unstable();
    assert_eq!(seqs, (0..10_000).collect::<Vec<_>>());
}

#[test]
fn test_per_key_order_preserved() {
    let manager = BatchQueueManager::new();
    let recorder = Arc::new(Recorder::default());
    let config = builder(2)
        .partitions(PartitionPolicy::fixed(4).unwrap())
        .consumer(consumer(&recorder))
        .build()
        .unwrap();
    let queue = manager.create("ORDERED", config).unwrap();

    for seq in 0..4_000u64 {
        queue.produce(Metric::new((seq % 5) as usize, seq));
    }
    assert!(wait_until(WAIT, || recorder.count() == 4_000));

    let mut last: HashMap<usize, u64> = HashMap::new();
    for item in recorder.items() {
        if let Some(&previous) = last.get(&item.kind) {
            assert!(item.seq > previous, "kind {} out of order", item.kind);
        }
        last.insert(item.kind, item.seq);
    }
}

#[test]
fn test_handler_map_routes_by_key() {
    let manager = BatchQueueManager::new();
    let cpu = Arc::new(Recorder::default());
    let mem = Arc::new(Recorder::default());
    let fallback = Arc::new(Recorder::default());
    let config = builder(2)
        .partitions(PartitionPolicy::fixed(4).unwrap())
        .handler(key(0), consumer(&cpu))
        .consumer(consumer(&fallback))
        .build()
        .unwrap();
    let queue = manager.create("ROUTED", config).unwrap();
    queue.add_handler(key(1), consumer(&mem));
    assert_eq!(queue.handler_count(), 2);

    for seq in 0..300u64 {
        queue.produce(Metric::new((seq % 3) as usize, seq));
    }
    assert!(wait_until(WAIT, || {
        cpu.count() + mem.count() + fallback.count() == 300
    }));

    assert!(cpu.items().iter().all(|m| m.kind == 0));
    assert!(mem.items().iter().all(|m| m.kind == 1));
    assert!(fallback.items().iter().all(|m| m.kind == 2));
    assert_eq!(cpu.count(), 100);
    assert_eq!(mem.count(), 100);
    assert_eq!(fallback.count(), 100);
}

#[test]
fn test_add_handler_replaces_previous() {
    let manager = BatchQueueManager::new();
    let first = Arc::new(Recorder::default());
    let second = Arc::new(Recorder::default());
    let queue = manager
        .create("REPLACED", builder(1).handler(key(0), consumer(&first)).build().unwrap())
        .unwrap();

    queue.add_handler(key(0), consumer(&second));
    assert_eq!(queue.handler_count(), 1);

    queue.produce(Metric::new(0, 1));
    assert!(wait_until(WAIT, || second.count() == 1));
    assert_eq!(first.count(), 0);
}

#[test]
fn test_unhandled_items_counted() {
    let manager = BatchQueueManager::new();
    let cpu = Arc::new(Recorder::default());
    let queue = manager
        .create("UNHANDLED", builder(1).handler(key(0), consumer(&cpu)).build().unwrap())
        .unwrap();

    queue.produce(Metric::new(0, 1));
    queue.produce(Metric::new(7, 2));
    queue.produce(Metric::new(7, 3));

    assert!(wait_until(WAIT, || queue.metrics().unhandled == 2));
    assert_eq!(cpu.count(), 1);
}

// ============================================================================
// Sizing
// ============================================================================

#[test]
fn test_fixed_partitions_round_robin() {
    let manager = BatchQueueManager::new();
    let config = builder(2)
        .partitions(PartitionPolicy::fixed(8).unwrap())
        .build()
        .unwrap();
    let queue = manager.create("FIXED_8", config).unwrap();

    assert_eq!(queue.partition_count(), 8);
    assert_eq!(queue.task_count(), 2);
    assert_eq!(
        queue.assigned_partitions(),
        vec![vec![0, 2, 4, 6], vec![1, 3, 5, 7]]
    );
}

#[test]
fn test_thread_multiply_partitions() {
    let manager = BatchQueueManager::new();
    let config = builder(3)
        .partitions(PartitionPolicy::thread_multiply(2).unwrap())
        .build()
        .unwrap();
    let queue = manager.create("MULTIPLY", config).unwrap();
    assert_eq!(queue.partition_count(), 6);
    assert_eq!(queue.task_count(), 3);
}

#[test]
fn test_default_partitions_match_threads() {
    let manager = BatchQueueManager::new();
    let queue = manager.create("DEFAULT", builder(2).build().unwrap()).unwrap();
    assert_eq!(queue.partition_count(), 2);
    assert_eq!(queue.assigned_partitions(), vec![vec![0], vec![1]]);
}

#[test]
fn test_fewer_partitions_than_threads() {
    let manager = BatchQueueManager::new();
    let config = builder(4)
        .partitions(PartitionPolicy::fixed(2).unwrap())
        .build()
        .unwrap();
    let queue = manager.create("REDUCED", config).unwrap();

    assert_eq!(queue.partition_count(), 2);
    assert_eq!(queue.task_count(), 2);
    assert!(queue.assigned_partitions().iter().all(|owned| owned.len() == 1));
}

#[test]
fn test_adaptive_growth_above_threshold() {
    let manager = BatchQueueManager::new();
    let config = builder(8)
        .partitions(PartitionPolicy::adaptive())
        .build()
        .unwrap();
    let queue = manager.create("ADAPTIVE_500", config).unwrap();
    assert_eq!(queue.partition_count(), 8);

    let sink = Arc::new(Recorder::default());
    for kind in 0..500 {
        queue.add_handler(key(kind), consumer(&sink));
    }
    assert_eq!(queue.handler_count(), 500);
    assert_eq!(queue.partition_count(), 350);

    // Every partition still has exactly one owner
    let mut owned: Vec<usize> = queue.assigned_partitions().into_iter().flatten().collect();
    owned.sort_unstable();
    assert_eq!(owned, (0..350).collect::<Vec<_>>());
}

#[test]
fn test_adaptive_growth_below_threshold() {
    let manager = BatchQueueManager::new();
    let config = builder(8)
        .partitions(PartitionPolicy::adaptive())
        .build()
        .unwrap();
    let queue = manager.create("ADAPTIVE_100", config).unwrap();

    let sink = Arc::new(Recorder::default());
    for kind in 0..100 {
        queue.add_handler(key(kind), consumer(&sink));
    }
    assert_eq!(queue.partition_count(), 100);
}

#[test]
fn test_adaptive_growth_keeps_buffered_items() {
    let manager = BatchQueueManager::new();
    let sink = Arc::new(Recorder::default());
    let config = builder(2)
        .partitions(PartitionPolicy::adaptive())
        .consumer(consumer(&sink))
        .build()
        .unwrap();
    let queue = manager.create("ADAPTIVE_LIVE", config).unwrap();

    for seq in 0..500u64 {
        queue.produce(Metric::new((seq % 20) as usize, seq));
    }
    for kind in 0..20 {
        queue.add_handler(key(kind), consumer(&sink));
    }
    assert_eq!(queue.partition_count(), 20);
    for seq in 500..1_000u64 {
        queue.produce(Metric::new((seq % 20) as usize, seq));
    }

    assert!(wait_until(WAIT, || sink.count() == 1_000));
}

#[test]
fn test_shared_pool_is_not_dedicated() {
    let manager = BatchQueueManager::new();
    let config = BatchQueueConfig::<Metric>::builder()
        .shared_scheduler("TEST_POOL", fixed(2))
        .build()
        .unwrap();
    let queue = manager.create("SHARED", config).unwrap();
    assert!(!queue.is_dedicated_scheduler());
    assert_eq!(manager.shared_pool_count(), 1);

    let dedicated = manager.create("DEDICATED", builder(1).build().unwrap()).unwrap();
    assert!(dedicated.is_dedicated_scheduler());
}

// ============================================================================
// Buffer strategies
// ============================================================================

#[test]
fn test_if_possible_drops_when_full() {
    let manager = BatchQueueManager::new();
    let gate = Arc::new(Gate::default());
    let config = builder(1)
        .buffer_size(10)
        .strategy(BufferStrategy::IfPossible)
        .consumer(consumer(&gate))
        .build()
        .unwrap();
    let queue = manager.create("DROPPING", config).unwrap();

    // The drain thread takes the first item and parks in the consumer
    assert!(queue.produce(Metric::new(0, 0)));
    assert!(wait_until(WAIT, || gate.entered.load(Ordering::SeqCst)));

    for seq in 1..=10 {
        assert!(queue.produce(Metric::new(0, seq)));
    }
    assert!(!queue.produce(Metric::new(0, 11)));

    let stats = queue.stats();
    assert_eq!(stats.total_used(), 10);
    assert!((stats.total_used_percentage() - 100.0).abs() < 1e-9);
    assert_eq!(queue.metrics().dropped, 1);

    gate.open();
    assert!(wait_until(WAIT, || gate.consumed.load(Ordering::SeqCst) == 11));
}

#[test]
fn test_blocking_waits_then_proceeds() {
    let manager = BatchQueueManager::new();
    let gate = Arc::new(Gate::default());
    let config = builder(1)
        .buffer_size(2)
        .strategy(BufferStrategy::Blocking)
        .consumer(consumer(&gate))
        .build()
        .unwrap();
    let queue = manager.create("BLOCKING", config).unwrap();

    assert!(queue.produce(Metric::new(0, 0)));
    assert!(wait_until(WAIT, || gate.entered.load(Ordering::SeqCst)));
    assert!(queue.produce(Metric::new(0, 1)));
    assert!(queue.produce(Metric::new(0, 2)));

    let blocked = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || queue.produce(Metric::new(0, 3)))
    };
    thread::sleep(Duration::from_millis(50));
    assert!(!blocked.is_finished());

    gate.open();
    assert!(blocked.join().unwrap());
    assert!(wait_until(WAIT, || gate.consumed.load(Ordering::SeqCst) == 4));
}

#[test]
fn test_blocked_producer_released_by_shutdown() {
    let manager = BatchQueueManager::new();
    let gate = Arc::new(Gate::default());
    let config = builder(1)
        .buffer_size(1)
        .consumer(consumer(&gate))
        .build()
        .unwrap();
    let queue = manager.create("BLOCKED_SHUTDOWN", config).unwrap();

    assert!(queue.produce(Metric::new(0, 0)));
    assert!(wait_until(WAIT, || gate.entered.load(Ordering::SeqCst)));
    assert!(queue.produce(Metric::new(0, 1)));

    let blocked = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || queue.produce(Metric::new(0, 2)))
    };
    thread::sleep(Duration::from_millis(30));

    let stopper = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || queue.shutdown())
    };
    // Rejected, not enqueued
    assert!(!blocked.join().unwrap());

    gate.open();
    stopper.join().unwrap();
    assert_eq!(queue.state(), QueueState::Stopped);
    assert_eq!(gate.consumed.load(Ordering::SeqCst), 2);
    assert_eq!(queue.metrics().rejected, 1);
}

// ============================================================================
// Lifecycle
// ============================================================================

#[test]
fn test_produce_after_shutdown_rejected() {
    let manager = BatchQueueManager::new();
    let queue = manager.create("STOPPED", builder(1).build().unwrap()).unwrap();

    queue.shutdown();
    assert_eq!(queue.state(), QueueState::Stopped);
    assert!(!queue.is_running());
    assert!(!queue.produce(Metric::new(0, 1)));
    assert_eq!(queue.metrics().rejected, 1);

    // Idempotent
    queue.shutdown();
    assert_eq!(queue.state(), QueueState::Stopped);
}

#[test]
fn test_shutdown_drains_everything() {
    let manager = BatchQueueManager::new();
    let recorder = Arc::new(Recorder::default());
    let config = builder(2)
        .partitions(PartitionPolicy::fixed(4).unwrap())
        .min_idle(Duration::from_millis(200))
        .max_idle(Duration::from_millis(200))
        .consumer(consumer(&recorder))
        .build()
        .unwrap();
    let queue = manager.create("FINAL_DRAIN", config).unwrap();

    for seq in 0..5_000u64 {
        assert!(queue.produce(Metric::new((seq % 4) as usize, seq)));
    }
    manager.shutdown("FINAL_DRAIN");

    assert_eq!(recorder.count(), 5_000);
    assert_eq!(queue.stats().total_used(), 0);
}

#[test]
fn test_consumer_may_shut_down_its_own_queue() {
    let manager = BatchQueueManager::new();
    let own: Arc<OnceLock<Arc<BatchQueue<Metric>>>> = Arc::new(OnceLock::new());
    let seen = Arc::new(AtomicUsize::new(0));

    let handler = {
        let own = Arc::clone(&own);
        let seen = Arc::clone(&seen);
        move |batch: &[Metric]| -> Result<(), HandlerError> {
            seen.fetch_add(batch.len(), Ordering::SeqCst);
            if let Some(queue) = own.get() {
                queue.shutdown();
            }
            Ok(())
        }
    };
    let config = builder(1).consumer(Arc::new(handler)).build().unwrap();
    let queue = manager.create("SELF_STOP", config).unwrap();
    let _ = own.set(Arc::clone(&queue));

    queue.produce(Metric::new(0, 1));
    assert!(wait_until(WAIT, || !manager.contains("SELF_STOP")));
    assert_eq!(queue.state(), QueueState::Stopped);
    assert_eq!(seen.load(Ordering::SeqCst), 1);
}

#[test]
fn test_consumer_shutdown_during_external_shutdown() {
    let manager = Arc::new(BatchQueueManager::new());
    let own: Arc<OnceLock<Arc<BatchQueue<Metric>>>> = Arc::new(OnceLock::new());
    let entered = Arc::new(AtomicBool::new(false));

    let handler = {
        let own = Arc::clone(&own);
        let entered = Arc::clone(&entered);
        move |_: &[Metric]| -> Result<(), HandlerError> {
            entered.store(true, Ordering::SeqCst);
            if let Some(queue) = own.get() {
                // Let the external caller win the stop first
                wait_until(WAIT, || queue.state() != QueueState::Running);
                queue.shutdown();
            }
            Ok(())
        }
    };
    let config = builder(1).consumer(Arc::new(handler)).build().unwrap();
    let queue = manager.create("RACE", config).unwrap();
    let _ = own.set(Arc::clone(&queue));

    queue.produce(Metric::new(0, 1));
    assert!(wait_until(WAIT, || entered.load(Ordering::SeqCst)));

    let returned = Arc::new(AtomicBool::new(false));
    {
        let manager = Arc::clone(&manager);
        let returned = Arc::clone(&returned);
        thread::spawn(move || {
            manager.shutdown("RACE");
            returned.store(true, Ordering::SeqCst);
        });
    }

    assert!(
        wait_until(WAIT, || returned.load(Ordering::SeqCst)),
        "external shutdown never returned, state={}",
        queue.state()
    );
    assert_eq!(queue.state(), QueueState::Stopped);
    assert!(!manager.contains("RACE"));
}

#[test]
fn test_concurrent_shutdown_callers_wait_for_final_drain() {
    let manager = BatchQueueManager::new();
    let gate = Arc::new(Gate::default());
    let queue = manager
        .create("TWO_STOPPERS", builder(1).consumer(consumer(&gate)).build().unwrap())
        .unwrap();

    queue.produce(Metric::new(0, 1));
    assert!(wait_until(WAIT, || gate.entered.load(Ordering::SeqCst)));
    queue.produce(Metric::new(0, 2));

    let stoppers: Vec<_> = (0..2)
        .map(|_| {
            let queue = Arc::clone(&queue);
            let gate = Arc::clone(&gate);
            thread::spawn(move || {
                queue.shutdown();
                (queue.state(), gate.consumed.load(Ordering::SeqCst))
            })
        })
        .collect();

    assert!(wait_until(WAIT, || queue.state() == QueueState::Stopping));
    gate.open();

    for stopper in stoppers {
        // Both callers return only after the buffered item was delivered
        assert_eq!(stopper.join().unwrap(), (QueueState::Stopped, 2));
    }
}

#[test]
fn test_on_idle_called() {
    let manager = BatchQueueManager::new();
    let recorder = Arc::new(Recorder::default());
    manager
        .create("IDLE", builder(1).consumer(consumer(&recorder)).build().unwrap())
        .unwrap();

    assert!(wait_until(WAIT, || recorder.idles.load(Ordering::SeqCst) >= 3));
}

#[test]
fn test_idle_backoff_is_bounded() {
    let manager = BatchQueueManager::new();
    let recorder = Arc::new(Recorder::default());
    let config = builder(1)
        .min_idle(Duration::from_millis(1))
        .max_idle(Duration::from_millis(50))
        .consumer(consumer(&recorder))
        .build()
        .unwrap();
    let queue = manager.create("BACKOFF", config).unwrap();

    // Doubling to the 50ms cap: roughly 1+2+4+8+16+32 then every 50ms
    thread::sleep(Duration::from_millis(400));
    let idles = recorder.idles.load(Ordering::SeqCst);
    assert!(idles >= 3, "idle sweeps: {idles}");
    assert!(idles < 40, "idle sweeps: {idles}");

    // Data resets the backoff and is delivered promptly
    let start = Instant::now();
    queue.produce(Metric::new(0, 1));
    assert!(wait_until(WAIT, || recorder.count() == 1));
    assert!(start.elapsed() < Duration::from_secs(1));
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn test_error_handler_receives_failed_batches() {
    let manager = BatchQueueManager::new();
    let failed = Arc::new(AtomicUsize::new(0));
    let messages = Arc::new(Mutex::new(Vec::new()));

    let config = builder(1)
        .consumer(Arc::new(|batch: &[Metric]| -> Result<(), HandlerError> {
            if batch.iter().any(|m| m.kind == 1) {
                panic!("poison");
            }
            Err(HandlerError::failed("storage unavailable"))
        }))
        .error_handler({
            let failed = Arc::clone(&failed);
            let messages = Arc::clone(&messages);
            move |batch: &[Metric], err: &HandlerError| {
                failed.fetch_add(batch.len(), Ordering::SeqCst);
                messages.lock().push(err.to_string());
            }
        })
        .build()
        .unwrap();
    let queue = manager.create("FAILING", config).unwrap();

    queue.produce(Metric::new(0, 1));
    assert!(wait_until(WAIT, || failed.load(Ordering::SeqCst) == 1));
    queue.produce(Metric::new(1, 2));
    assert!(wait_until(WAIT, || failed.load(Ordering::SeqCst) == 2));

    // The drain thread survives both
    assert!(queue.is_running());
    let messages = messages.lock().clone();
    assert!(messages[0].contains("storage unavailable"));
    assert!(messages[1].contains("poison"));
    assert_eq!(queue.metrics().handler_errors, 2);
    assert_eq!(queue.metrics().consumed, 2);
}

// ============================================================================
// Manager and metrics
// ============================================================================

#[test]
fn test_manager_lifecycle() {
    let manager = BatchQueueManager::new();
    let first = manager.create("LIFECYCLE", builder(1).build().unwrap()).unwrap();
    assert!(
        manager
            .create("LIFECYCLE", builder(1).build().unwrap())
            .unwrap_err()
            .is_already_exists()
    );

    let same = manager
        .get_or_create("LIFECYCLE", builder(1).build().unwrap())
        .unwrap();
    assert!(Arc::ptr_eq(&first, &same));

    manager.shutdown("LIFECYCLE");
    assert!(manager.get::<Metric>("LIFECYCLE").is_none());
    assert_eq!(first.state(), QueueState::Stopped);
}

#[test]
fn test_metrics_handle_outlives_queue() {
    let manager = BatchQueueManager::new();
    let recorder = Arc::new(Recorder::default());
    let queue = manager
        .create("HANDLE", builder(1).consumer(consumer(&recorder)).build().unwrap())
        .unwrap();
    let handle = queue.metrics_handle();

    for seq in 0..10 {
        queue.produce(Metric::new(0, seq));
    }
    manager.shutdown_all();
    drop(queue);

    assert_eq!(handle.name(), "HANDLE");
    assert_eq!(handle.counters().produced, 10);
    assert_eq!(handle.counters().consumed, 10);
    assert_eq!(handle.usage().total_used(), 0);
}

#[test]
fn test_usage_reporter_over_manager_queues() {
    let manager = BatchQueueManager::new();
    let recorder = Arc::new(Recorder::default());
    let queue = manager
        .create("REPORTED", builder(1).consumer(consumer(&recorder)).build().unwrap())
        .unwrap();

    let mut reporter = UsageReporter::builder()
        .queues(manager.metrics_providers())
        .build();
    assert!(reporter.report_once().contains("collecting baseline"));

    for seq in 0..100 {
        queue.produce(Metric::new(0, seq));
    }
    assert!(wait_until(WAIT, || recorder.count() == 100));
    thread::sleep(Duration::from_millis(20));

    let report = reporter.report_once();
    assert!(report.contains("REPORTED"), "{report}");
}
