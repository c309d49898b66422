//! Redis-backed direct-exchange transport.
//!
//! Redis has no exchanges, so the routing topology is kept in plain keys:
//!
//! - **Exchange**: member of the set `itemrelay:exchanges`
//! - **Binding**: queue name in the set `itemrelay:exchange:{len}:{exchange}:{routing_key}`,
//!   where `len` is the byte length of the exchange name so names containing `:` never
//!   collide
//! - **Queue**: stream `itemrelay:queue:{queue}` with a consumer group named after
//!   the queue; consumers of one queue compete inside that group
//!
//! Publishing `XADD`s the body to every stream bound under the routing key (one
//! pipeline). Consuming uses `XREADGROUP ... NOACK`, so a delivered entry is never
//! handed out again: auto-ack. Entries read in a batch but not yet handed out are
//! returned by `take_buffered` so the consumer can still process them on shutdown.
//!
//! Every channel owns its own `redis::Connection`. A Redis error marks the channel
//! failed; the bridge drops it and connects again.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use redis::streams::{StreamReadOptions, StreamReadReply};
use redis::{Commands, RedisError};
use tracing::{debug, instrument};
use uuid::Uuid;

use itemrelay_events::{
    BusBinding, BusChannel, ConsumeChannel, Connector, PublishChannel, TransportError,
};

const KEY_PREFIX: &str = "itemrelay";

/// Stream field holding the message body.
const BODY_FIELD: &str = "body";

/// Entries fetched per `XREADGROUP`.
const READ_BATCH: usize = 16;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Slack on top of the `BLOCK` time before the socket read gives up.
const READ_TIMEOUT_SLACK: Duration = Duration::from_secs(5);

fn exchanges_key() -> String {
    format!("{KEY_PREFIX}:exchanges")
}

fn binding_key(exchange: &str, routing_key: &str) -> String {
    format!("{KEY_PREFIX}:exchange:{}:{exchange}:{routing_key}", exchange.len())
}

fn queue_key(queue: &str) -> String {
    format!("{KEY_PREFIX}:queue:{queue}")
}

fn classify(err: RedisError) -> TransportError {
    if err.is_connection_refusal() {
        TransportError::Unreachable(err.to_string())
    } else if err.is_connection_dropped() || err.is_io_error() || err.is_timeout() {
        TransportError::ConnectionLost(err.to_string())
    } else {
        TransportError::ChannelClosed(err.to_string())
    }
}

/// Opens one Redis connection per channel.
#[derive(Debug, Clone)]
pub struct RedisConnector {
    client: Arc<redis::Client>,
    connect_timeout: Duration,
}

impl RedisConnector {
    /// Parse `redis_url`. No connection is made until a channel is requested.
    pub fn new(redis_url: impl AsRef<str>) -> Result<Self, TransportError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| TransportError::Unreachable(format!("invalid redis url: {e}")))?;

        Ok(Self {
            client: Arc::new(client),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        })
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    fn open(&self) -> Result<RedisChannel, TransportError> {
        let conn = self
            .client
            .get_connection_with_timeout(self.connect_timeout)
            .map_err(classify)?;

        Ok(RedisChannel {
            conn,
            consumer_name: None,
            buffer: VecDeque::new(),
        })
    }
}

impl Connector for RedisConnector {
    type Publish = RedisChannel;
    type Consume = RedisChannel;

    fn connect_publish(&self) -> Result<Self::Publish, TransportError> {
        self.open()
    }

    fn connect_consume(&self) -> Result<Self::Consume, TransportError> {
        self.open()
    }
}

/// One Redis connection used as either a publish or a consume channel.
pub struct RedisChannel {
    conn: redis::Connection,
    /// Assigned on the first read; unique per channel so a reconnect never inherits
    /// another consumer's state.
    consumer_name: Option<String>,
    buffer: VecDeque<Vec<u8>>,
}

impl core::fmt::Debug for RedisChannel {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RedisChannel")
            .field("consumer_name", &self.consumer_name)
            .field("buffered", &self.buffer.len())
            .finish_non_exhaustive()
    }
}

impl RedisChannel {
    fn ensure_group(&mut self, queue: &str) -> Result<(), TransportError> {
        let created: redis::RedisResult<()> =
            self.conn.xgroup_create_mkstream(queue_key(queue), queue, "$");

        match created {
            Ok(()) => Ok(()),
            Err(err) if err.code() == Some("BUSYGROUP") => Ok(()),
            Err(err) => Err(classify(err)),
        }
    }

    fn fill_buffer(&mut self, binding: &BusBinding, timeout: Duration) -> Result<(), TransportError> {
        let consumer = self
            .consumer_name
            .get_or_insert_with(|| format!("{}-{}", binding.queue(), Uuid::now_v7()))
            .clone();

        let block_ms = timeout.as_millis().clamp(1, usize::MAX as u128) as usize;
        self.conn
            .set_read_timeout(Some(timeout + READ_TIMEOUT_SLACK))
            .map_err(classify)?;

        let opts = StreamReadOptions::default()
            .group(binding.queue(), &consumer)
            .count(READ_BATCH)
            .block(block_ms)
            .noack();

        let reply: Option<StreamReadReply> = self
            .conn
            .xread_options(&[queue_key(binding.queue())], &[">"], &opts)
            .map_err(classify)?;

        let Some(reply) = reply else {
            return Ok(());
        };

        for stream in reply.keys {
            for entry in stream.ids {
                match entry.map.get(BODY_FIELD) {
                    Some(redis::Value::Data(bytes)) => self.buffer.push_back(bytes.clone()),
                    _ => debug!(entry_id = %entry.id, "stream entry without body skipped"),
                }
            }
        }
        Ok(())
    }
}

impl BusChannel for RedisChannel {
    #[instrument(skip(self, binding), fields(binding = %binding), err)]
    fn declare(&mut self, binding: &BusBinding) -> Result<(), TransportError> {
        redis::pipe()
            .sadd(exchanges_key(), binding.exchange())
            .ignore()
            .sadd(
                binding_key(binding.exchange(), binding.routing_key()),
                binding.queue(),
            )
            .ignore()
            .query::<()>(&mut self.conn)
            .map_err(classify)?;

        self.ensure_group(binding.queue())
    }
}

impl PublishChannel for RedisChannel {
    fn publish(&mut self, binding: &BusBinding, body: &[u8]) -> Result<(), TransportError> {
        let exists: bool = self
            .conn
            .sismember(exchanges_key(), binding.exchange())
            .map_err(classify)?;
        if !exists {
            return Err(TransportError::ChannelClosed(format!(
                "no exchange '{}'",
                binding.exchange()
            )));
        }

        let queues: Vec<String> = self
            .conn
            .smembers(binding_key(binding.exchange(), binding.routing_key()))
            .map_err(classify)?;

        // Unroutable: dropped, like a direct exchange with no matching binding.
        if queues.is_empty() {
            debug!(routing_key = binding.routing_key(), "no queue bound; message dropped");
            return Ok(());
        }

        let mut pipe = redis::pipe();
        for queue in &queues {
            pipe.xadd(queue_key(queue), "*", &[(BODY_FIELD, body)]).ignore();
        }
        pipe.query::<()>(&mut self.conn).map_err(classify)?;
        Ok(())
    }
}

impl ConsumeChannel for RedisChannel {
    fn next_delivery(
        &mut self,
        binding: &BusBinding,
        timeout: Duration,
    ) -> Result<Option<Vec<u8>>, TransportError> {
        if self.buffer.is_empty() {
            self.fill_buffer(binding, timeout)?;
        }
        Ok(self.buffer.pop_front())
    }

    fn take_buffered(&mut self) -> Vec<Vec<u8>> {
        self.buffer.drain(..).collect()
    }
}
