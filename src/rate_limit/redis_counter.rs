//! Redis-backed [`CounterStore`] shared by every gateway replica.

// crates.io
use redis::{Client, RedisError, RedisResult, aio::MultiplexedConnection};
// self
use crate::{
	_prelude::*,
	error::ConfigError,
	rate_limit::{CounterFuture, CounterKey, CounterStore},
	store::StoreError,
};

/// Counter store running `INCR` and `EXPIRE ... NX` inside one `MULTI`/`EXEC` transaction.
///
/// Replicas pointed at the same server share one quota per identity. `EXPIRE NX` only arms a
/// counter that has no expiry yet, which requires Redis 7.0 or newer. Expiry follows the server
/// clock rather than the `now` handed over by the limiter.
///
/// The connection is opened on first use and reopened after I/O failures.
#[derive(Clone)]
pub struct RedisCounterStore {
	client: Client,
	connection: Arc<AsyncMutex<Option<MultiplexedConnection>>>,
}
impl RedisCounterStore {
	/// Creates a store for a `redis://` or `rediss://` URL without connecting.
	pub fn new(url: &Url) -> Result<Self, ConfigError> {
		let client = Client::open(url.as_str())
			.map_err(|e| ConfigError::InvalidCounterStoreUrl { reason: e.to_string() })?;

		Ok(Self { client, connection: Default::default() })
	}

	async fn connection(&self) -> Result<MultiplexedConnection, StoreError> {
		let mut slot = self.connection.lock().await;

		if let Some(connection) = slot.as_ref() {
			return Ok(connection.clone());
		}

		let connection =
			self.client.get_multiplexed_async_connection().await.map_err(backend_error)?;

		*slot = Some(connection.clone());

		Ok(connection)
	}

	async fn increment_shared(&self, key: &CounterKey, ttl: Duration) -> Result<u64, StoreError> {
		let mut connection = self.connection().await?;
		let name = key.to_string();
		let mut pipe = redis::pipe();

		pipe.atomic()
			.incr(&name, 1_u64)
			.cmd("EXPIRE")
			.arg(&name)
			.arg(ttl.whole_seconds().max(1))
			.arg("NX")
			.ignore();

		let counted: RedisResult<(u64,)> = pipe.query_async(&mut connection).await;

		match counted {
			Ok((count,)) => Ok(count),
			Err(e) => {
				if e.is_io_error() || e.is_connection_dropped() {
					self.connection.lock().await.take();
				}

				Err(backend_error(e))
			},
		}
	}
}
impl CounterStore for RedisCounterStore {
	fn increment<'a>(
		&'a self,
		key: &'a CounterKey,
		_now: OffsetDateTime,
		ttl: Duration,
	) -> CounterFuture<'a> {
		Box::pin(self.increment_shared(key, ttl))
	}
}
impl Debug for RedisCounterStore {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RedisCounterStore").finish_non_exhaustive()
	}
}

fn backend_error(e: RedisError) -> StoreError {
	StoreError::Backend { message: format!("Redis counter store failed: {e}") }
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::rate_limit::counter::contract;

	fn store(url: &str) -> RedisCounterStore {
		RedisCounterStore::new(&Url::parse(url).expect("URL fixture should parse."))
			.expect("Redis URL fixture should be accepted.")
	}

	#[test]
	fn non_redis_urls_are_rejected() {
		let url = Url::parse("https://cache.example/0").expect("URL fixture should parse.");

		assert!(matches!(
			RedisCounterStore::new(&url),
			Err(ConfigError::InvalidCounterStoreUrl { .. })
		));
	}

	#[tokio::test]
	async fn unreachable_servers_surface_backend_errors() {
		let store = store("redis://127.0.0.1:1/");
		let key = contract::unique_key("unreachable");
		let counted = store.increment(&key, OffsetDateTime::now_utc(), Duration::seconds(70)).await;

		assert!(
			matches!(&counted, Err(StoreError::Backend { message }) if message.contains("Redis")),
			"Unexpected increment result: {counted:?}."
		);
	}

	#[tokio::test]
	#[ignore = "requires a Redis 7 server at WATERMARK_REDIS_URL"]
	async fn live_server_honours_the_counter_contract() {
		let url = std::env::var("WATERMARK_REDIS_URL")
			.expect("WATERMARK_REDIS_URL should point at a disposable Redis server.");

		contract::assert_counter_contract(Arc::new(store(&url))).await;
	}
}
