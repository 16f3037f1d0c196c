//! Config builder tests

use super::*;

struct Item;

impl TypeKeyed for Item {
    fn type_key(&self) -> TypeKey {
        TypeKey::new("item")
    }
}

fn threads(n: usize) -> ThreadPolicy {
    ThreadPolicy::fixed(n).unwrap()
}

fn builder() -> BatchQueueConfigBuilder<Item> {
    BatchQueueConfig::builder()
}

#[test]
fn test_defaults() {
    let config = builder().threads(threads(2)).build().unwrap();

    assert_eq!(config.scheduler(), &SchedulerMode::Dedicated(threads(2)));
    assert_eq!(config.buffer_size(), 10_000);
    assert_eq!(config.strategy(), BufferStrategy::Blocking);
    assert_eq!(config.min_idle(), Duration::from_millis(1));
    assert_eq!(config.max_idle(), Duration::from_millis(50));
    assert_eq!(config.max_batch_size(), 10_000);
    assert_eq!(config.partition_policy(2).resolve(2, 0), 2);
    assert!(config.consumer.is_none());
    assert!(config.balancer.is_none());
}

#[test]
fn test_requires_exactly_one_scheduler() {
    let neither = builder().build().unwrap_err();
    assert!(neither.is_invalid_argument());
    assert!(neither.to_string().contains("required"));

    let both = builder()
        .threads(threads(2))
        .shared_scheduler("pool", threads(2))
        .build()
        .unwrap_err();
    assert!(both.to_string().contains("not both"));
}

#[test]
fn test_shared_scheduler_mode() {
    let config = builder()
        .shared_scheduler("TEST_POOL", threads(3))
        .build()
        .unwrap();
    assert_eq!(
        config.scheduler(),
        &SchedulerMode::Shared {
            name: "TEST_POOL".into(),
            threads: threads(3)
        }
    );
    assert_eq!(config.scheduler().threads(), threads(3));

    assert!(builder().shared_scheduler("  ", threads(1)).build().is_err());
}

#[test]
fn test_rejects_zero_buffer() {
    let err = builder().threads(threads(1)).buffer_size(0).build().unwrap_err();
    assert!(err.to_string().contains("buffer_size"));
}

#[test]
fn test_rejects_zero_min_idle() {
    let err = builder()
        .threads(threads(1))
        .min_idle(Duration::ZERO)
        .build()
        .unwrap_err();
    assert!(err.to_string().contains("min_idle"));
}

#[test]
fn test_rejects_max_idle_below_min() {
    let err = builder()
        .threads(threads(1))
        .min_idle(Duration::from_millis(20))
        .max_idle(Duration::from_millis(10))
        .build()
        .unwrap_err();
    assert!(err.to_string().contains("max_idle"));

    // Equal is allowed
    builder()
        .threads(threads(1))
        .min_idle(Duration::from_millis(20))
        .max_idle(Duration::from_millis(20))
        .build()
        .unwrap();
}

#[test]
fn test_rejects_zero_batch_and_interval() {
    assert!(
        builder()
            .threads(threads(1))
            .max_batch_size(0)
            .build()
            .is_err()
    );
    assert!(
        builder()
            .threads(threads(1))
            .balancer(DrainBalancer::throughput_weighted(), Duration::ZERO)
            .build()
            .is_err()
    );
}

#[test]
fn test_handlers_and_consumer_are_kept() {
    let config = builder()
        .threads(threads(1))
        .consumer(Arc::new(|_: &[Item]| -> std::result::Result<(), HandlerError> { Ok(()) }))
        .handler(
            TypeKey::new("a"),
            Arc::new(|_: &[Item]| -> std::result::Result<(), HandlerError> { Ok(()) }),
        )
        .error_handler(|_: &[Item], _: &HandlerError| {})
        .max_batch_size(64)
        .build()
        .unwrap();

    assert!(config.consumer.is_some());
    assert_eq!(config.handlers.len(), 1);
    assert!(config.error_handler.is_some());
    assert_eq!(config.max_batch_size(), 64);

    let debug = format!("{config:?}");
    assert!(debug.contains("has_consumer: true"));
    assert!(debug.contains("handlers: 1"));
}

#[test]
fn test_explicit_partition_policy_wins() {
    let config = builder()
        .threads(threads(4))
        .partitions(PartitionPolicy::fixed(2).unwrap())
        .build()
        .unwrap();
    assert_eq!(config.partition_policy(4).resolve(4, 0), 2);
}
