//! Counter store contract and the in-process implementation.

// self
use crate::{_prelude::*, id::Identity, store::StoreError};

/// Boxed future returned by [`CounterStore::increment`].
pub type CounterFuture<'a> = Pin<Box<dyn Future<Output = Result<u64, StoreError>> + 'a + Send>>;

/// Shared counter backend used by the rate limiter.
///
/// Implementations must make [`increment`](CounterStore::increment) indivisible: the
/// increment, the expiry arming, and the returned post-increment value all come from a single
/// atomic operation (e.g. a Redis `INCR` + `EXPIRE NX` pipeline or a compare-and-swap loop).
pub trait CounterStore
where
	Self: Send + Sync,
{
	/// Atomically increments `key` and returns the post-increment value.
	///
	/// When the post-increment value is 1 the counter is set to expire `ttl` after `now`.
	fn increment<'a>(
		&'a self,
		key: &'a CounterKey,
		now: OffsetDateTime,
		ttl: Duration,
	) -> CounterFuture<'a>;
}

/// Key of one `(identity, window)` counter.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CounterKey {
	/// Identity the counter belongs to.
	pub identity: Identity,
	/// Window bucket (`floor(unix / window)`).
	pub window: i64,
}
impl CounterKey {
	/// Builds a key for the identity/window pair.
	pub fn new(identity: Identity, window: i64) -> Self {
		Self { identity, window }
	}
}
impl Display for CounterKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "rl:{}:{}", self.identity, self.window)
	}
}

#[derive(Debug)]
struct CounterEntry {
	count: u64,
	expires_at: OffsetDateTime,
}

#[derive(Debug, Default)]
struct CounterMap {
	entries: HashMap<CounterKey, CounterEntry>,
	ops: u64,
}

/// Thread-safe in-process counter store for single-node deployments and tests.
///
/// Expired counters are swept lazily every [`MemoryCounterStore::SWEEP_INTERVAL`] increments.
#[derive(Clone, Debug, Default)]
pub struct MemoryCounterStore(Arc<Mutex<CounterMap>>);
impl MemoryCounterStore {
	/// Number of increments between expiry sweeps.
	pub const SWEEP_INTERVAL: u64 = 256;

	/// Number of live (possibly expired but not yet swept) counters.
	pub fn len(&self) -> usize {
		self.0.lock().entries.len()
	}

	/// Returns true if no counters are tracked.
	pub fn is_empty(&self) -> bool {
		self.0.lock().entries.is_empty()
	}

	/// Drops every counter whose expiry is at or before `now`.
	pub fn purge_expired(&self, now: OffsetDateTime) {
		self.0.lock().entries.retain(|_, entry| entry.expires_at > now);
	}

	fn increment_now(&self, key: &CounterKey, now: OffsetDateTime, ttl: Duration) -> u64 {
		let mut map = self.0.lock();

		map.ops = map.ops.wrapping_add(1);

		if map.ops % Self::SWEEP_INTERVAL == 0 {
			map.entries.retain(|_, entry| entry.expires_at > now);
		}

		let entry = map
			.entries
			.entry(key.clone())
			.or_insert(CounterEntry { count: 0, expires_at: now + ttl });

		if entry.expires_at <= now {
			entry.count = 0;
		}

		entry.count = entry.count.saturating_add(1);

		if entry.count == 1 {
			entry.expires_at = now + ttl;
		}

		entry.count
	}
}
impl CounterStore for MemoryCounterStore {
	fn increment<'a>(
		&'a self,
		key: &'a CounterKey,
		now: OffsetDateTime,
		ttl: Duration,
	) -> CounterFuture<'a> {
		Box::pin(async move { Ok(self.increment_now(key, now, ttl)) })
	}
}


#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn key(identity: &str, window: i64) -> CounterKey {
		CounterKey::new(Identity::new(identity).expect("Identity fixture should be valid."), window)
	}

	fn at(unix: i64) -> OffsetDateTime {
		OffsetDateTime::from_unix_timestamp(unix).expect("Fixture timestamp should be valid.")
	}

	#[test]
	fn keys_render_like_redis_keys() {
		assert_eq!(key("alice", 16).to_string(), "rl:alice:16");
	}

	#[tokio::test]
	async fn increments_are_counted_per_key() {
		let store = MemoryCounterStore::default();
		let ttl = Duration::seconds(70);
		let a = key("alice", 1);
		let b = key("bob", 1);

		assert_eq!(store.increment(&a, at(60), ttl).await, Ok(1));
		assert_eq!(store.increment(&a, at(61), ttl).await, Ok(2));
		assert_eq!(store.increment(&b, at(61), ttl).await, Ok(1));
		assert_eq!(store.len(), 2);
	}

	#[tokio::test]
	async fn memory_store_honours_the_counter_contract() {
		contract::assert_counter_contract(Arc::new(MemoryCounterStore::default())).await;
	}

	#[tokio::test]
	async fn expired_counters_restart_and_are_purged() {
		let store = MemoryCounterStore::default();
		let ttl = Duration::seconds(70);
		let a = key("alice", 1);

		store.increment(&a, at(60), ttl).await.expect("Increment should succeed.");
		store.increment(&a, at(61), ttl).await.expect("Increment should succeed.");

		// Expiry is armed by the first increment only.
		assert_eq!(store.increment(&a, at(130), ttl).await, Ok(1));

		store.purge_expired(at(200));

		assert!(store.is_empty());
	}

	#[tokio::test]
	async fn concurrent_increments_never_share_a_count() {
		let store = MemoryCounterStore::default();
		let mut tasks = Vec::new();

		for _ in 0..64 {
			let store = store.clone();

			tasks.push(tokio::spawn(async move {
				let key = key("alice", 1);

				store
					.increment(&key, at(60), Duration::seconds(70))
					.await
					.expect("Increment should succeed.")
			}));
		}

		let mut counts = Vec::new();

		for task in tasks {
			counts.push(task.await.expect("Increment task should not panic."));
		}

		counts.sort_unstable();

		assert_eq!(counts, (1..=64).collect::<Vec<u64>>());
	}
}
