use async_trait::async_trait;
use redis::{AsyncCommands, RedisResult};
use skybook_core::events::{BookingEvent, EventPublisher};
use tracing::debug;
use uuid::Uuid;

fn availability_key(flight_id: Uuid) -> String {
    format!("flight:{}:availability", flight_id)
}

#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
}

impl RedisClient {
    pub fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self { client })
    }

    pub async fn set_flight_availability(&self, flight_id: Uuid, available: u32) -> RedisResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.set(availability_key(flight_id), available).await
    }

    /// Returns the number of subscribers that received the message.
    pub async fn publish(&self, channel: &str, payload: &str) -> RedisResult<i64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.publish(channel, payload).await
    }
}

/// Publishes booking events as JSON on a Redis channel named after the topic.
#[derive(Clone)]
pub struct RedisEventPublisher {
    redis: RedisClient,
}

impl RedisEventPublisher {
    pub fn new(redis: RedisClient) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl EventPublisher for RedisEventPublisher {
    async fn publish(&self, event: &BookingEvent) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let payload = serde_json::to_string(event)?;
        let receivers = self.redis.publish(event.topic(), &payload).await?;
        debug!(topic = event.topic(), key = %event.key(), receivers, "Event sent to redis");
        Ok(())
    }
}
