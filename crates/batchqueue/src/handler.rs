//! Handler keys, consumers, and the per-queue handler registry
//!
//! Items name their own dispatch key through [`TypeKeyed`]. The registry
//! maps keys to consumers, falls back to the queue's default consumer,
//! and isolates consumer failures per batch.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;

use crate::error::{HandlerError, panic_message};
use crate::metrics::QueueMetrics;

// ============================================================================
// TypeKey
// ============================================================================

/// Explicit dispatch tag for an item type
///
/// The hash is computed once (FNV-1a over the name) so partition selection
/// never rehashes strings on the produce path.
#[derive(Clone, Copy)]
pub struct TypeKey {
    name: &'static str,
    hash: u64,
}

impl TypeKey {
    /// Key with an explicit name
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            hash: fnv1a(name.as_bytes()),
        }
    }

    /// Key derived from a Rust type name
    pub fn of<M: ?Sized + 'static>() -> Self {
        Self::new(std::any::type_name::<M>())
    }

    /// Key name
    #[inline]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Stable 64-bit hash of the name
    #[inline]
    pub const fn hash_code(&self) -> u64 {
        self.hash
    }
}

const fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    let mut i = 0;
    while i < bytes.len() {
        hash ^= bytes[i] as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
        i += 1;
    }
    hash
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.name == other.name
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeKey({})", self.name)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Items that know their dispatch key
pub trait TypeKeyed {
    fn type_key(&self) -> TypeKey;
}

impl<U: TypeKeyed + ?Sized> TypeKeyed for Box<U> {
    fn type_key(&self) -> TypeKey {
        (**self).type_key()
    }
}

impl<U: TypeKeyed + ?Sized> TypeKeyed for Arc<U> {
    fn type_key(&self) -> TypeKey {
        (**self).type_key()
    }
}

// ============================================================================
// HandlerConsumer
// ============================================================================

/// Receives drained batches
///
/// `consume` runs on a drain thread. An `Err` or a panic is reported to the
/// queue's error handler and the batch is not redelivered.
pub trait HandlerConsumer<T>: Send + Sync {
    /// Consume one batch
    fn consume(&self, batch: &[T]) -> Result<(), HandlerError>;

    /// Called once per sweep in which the drain thread found no data
    fn on_idle(&self) {}
}

impl<T, F> HandlerConsumer<T> for F
where
    F: Fn(&[T]) -> Result<(), HandlerError> + Send + Sync,
{
    fn consume(&self, batch: &[T]) -> Result<(), HandlerError> {
        self(batch)
    }
}

/// Callback for failed batches
pub type ErrorHandler<T> = Arc<dyn Fn(&[T], &HandlerError) + Send + Sync>;

type HandlerMap<T> = HashMap<TypeKey, Arc<dyn HandlerConsumer<T>>>;

// ============================================================================
// HandlerRegistry
// ============================================================================

/// Key-to-consumer routing for one queue
///
/// The handler map is swapped copy-on-write, so drain threads resolve
/// handlers without locking.
pub(crate) struct HandlerRegistry<T> {
    handlers: ArcSwap<HandlerMap<T>>,
    default_consumer: Option<Arc<dyn HandlerConsumer<T>>>,
    error_handler: Option<ErrorHandler<T>>,
    /// Keys already warned about as unhandled
    warned: Mutex<HashSet<TypeKey>>,
}

impl<T: TypeKeyed> HandlerRegistry<T> {
    pub(crate) fn new(
        handlers: HandlerMap<T>,
        default_consumer: Option<Arc<dyn HandlerConsumer<T>>>,
        error_handler: Option<ErrorHandler<T>>,
    ) -> Self {
        Self {
            handlers: ArcSwap::from_pointee(handlers),
            default_consumer,
            error_handler,
            warned: Mutex::new(HashSet::new()),
        }
    }

    /// Register or replace the handler for `key`, returning the handler count
    pub(crate) fn register(&self, key: TypeKey, handler: Arc<dyn HandlerConsumer<T>>) -> usize {
        self.handlers.rcu(|current| {
            let mut next = (**current).clone();
            next.insert(key, Arc::clone(&handler));
            next
        });
        self.warned.lock().remove(&key);
        self.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.handlers.load().len()
    }

    pub(crate) fn has_default(&self) -> bool {
        self.default_consumer.is_some()
    }

    /// Route one drained batch to its consumers
    ///
    /// Items are grouped by key in first-seen order; relative order within a
    /// group is preserved. Returns the number of items handed to consumers.
    pub(crate) fn dispatch(&self, queue: &str, batch: Vec<T>, metrics: &QueueMetrics) -> usize {
        if batch.is_empty() {
            return 0;
        }

        let handlers = self.handlers.load();

        // Single-consumer mode skips grouping entirely
        if handlers.is_empty()
            && let Some(consumer) = &self.default_consumer
        {
            self.invoke(queue, consumer.as_ref(), &batch, metrics);
            return batch.len();
        }

        let mut slots: HashMap<TypeKey, usize> = HashMap::new();
        let mut groups: Vec<(TypeKey, Vec<T>)> = Vec::new();
        for item in batch {
            let key = item.type_key();
            match slots.get(&key) {
                Some(&slot) => groups[slot].1.push(item),
                None => {
                    slots.insert(key, groups.len());
                    groups.push((key, vec![item]));
                }
            }
        }

        let mut delivered = 0;
        for (key, items) in groups {
            let consumer = handlers.get(&key).or(self.default_consumer.as_ref());
            match consumer {
                Some(consumer) => {
                    self.invoke(queue, consumer.as_ref(), &items, metrics);
                    delivered += items.len();
                }
                None => self.unhandled(queue, key, items.len(), metrics),
            }
        }
        delivered
    }

    /// Call `on_idle` on every handler and the default consumer
    pub(crate) fn notify_idle(&self, queue: &str) {
        let handlers = self.handlers.load();
        for handler in handlers.values().chain(self.default_consumer.iter()) {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| handler.on_idle())) {
                tracing::error!(
                    queue = %queue,
                    error = %panic_message(payload.as_ref()),
                    "on_idle panicked"
                );
            }
        }
    }

    fn invoke(
        &self,
        queue: &str,
        consumer: &dyn HandlerConsumer<T>,
        batch: &[T],
        metrics: &QueueMetrics,
    ) {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| consumer.consume(batch)))
            .unwrap_or_else(|payload| Err(HandlerError::from_panic(payload)));

        metrics.record_batch(batch.len() as u64);
        if let Err(err) = outcome {
            metrics.record_handler_error();
            self.report(queue, batch, &err);
        }
    }

    fn report(&self, queue: &str, batch: &[T], err: &HandlerError) {
        let Some(handler) = &self.error_handler else {
            tracing::error!(
                queue = %queue,
                batch_size = batch.len(),
                error = %err,
                "batch handler failed"
            );
            return;
        };

        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| handler(batch, err))) {
            tracing::error!(
                queue = %queue,
                error = %err,
                panic = %panic_message(payload.as_ref()),
                "error handler panicked"
            );
        }
    }

    fn unhandled(&self, queue: &str, key: TypeKey, count: usize, metrics: &QueueMetrics) {
        metrics.record_unhandled(count as u64);
        if self.warned.lock().insert(key) {
            tracing::warn!(
                queue = %queue,
                item_type = %key,
                "no handler registered for item type, dropping"
            );
        }
    }
}

#[cfg(test)]
#[path = "handler_test.rs"]
mod tests;
