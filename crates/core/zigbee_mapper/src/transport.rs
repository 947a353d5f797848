//! Wraps `mqtt_channel::Connection` with a queued-publish FIFO dispatcher
//! and keepalive heartbeat, keeping the MQTT client itself an owned value
//! rather than a global.

use futures::StreamExt;
use mqtt_channel::{heartbeat_topic, Connection, Message, MqttError, HEARTBEAT_PAYLOAD};
use std::collections::VecDeque;
use std::time::Duration;

/// Queued-publish dispatch tick period: drains one message per tick on a
/// fixed cadence.
pub const QUEUE_TICK_PERIOD: Duration = Duration::from_millis(50);

pub struct Transport {
    connection: Connection,
    queue: VecDeque<Message>,
    keepalive: Duration,
}

impl Transport {
    pub async fn connect(config: &mqtt_channel::Config) -> Result<Transport, MqttError> {
        let connection = Connection::new(config).await?;
        Ok(Transport {
            connection,
            queue: VecDeque::new(),
            keepalive: config.keepalive,
        })
    }

    pub fn client_id(&self) -> &str {
        self.connection.client_id()
    }

    pub fn keepalive(&self) -> Duration {
        self.keepalive
    }

    /// Enqueue a publish to be drained on the next queue tick, preserving
    /// enqueue order.
    pub fn enqueue(&mut self, message: Message) {
        self.queue.push_back(message);
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Publish immediately, bypassing the queue; interleaves with queued
    /// publishes at the MQTT layer.
    pub async fn publish_now(&mut self, message: Message) -> Result<(), MqttError> {
        use futures::SinkExt;
        self.connection.published.send(message).await?;
        Ok(())
    }

    pub async fn publish_heartbeat(&mut self) -> Result<(), MqttError> {
        let topic = heartbeat_topic(self.client_id());
        let message = Message::new(&topic, HEARTBEAT_PAYLOAD.as_bytes());
        self.publish_now(message).await
    }

    /// Used only by the bounded `onStart` wait, which has no competing
    /// borrow of `self.transport` in its `select!` and so can hold this
    /// directly.
    pub async fn next_message(&mut self) -> Option<Message> {
        self.connection.received.next().await
    }

    /// One tick of the main loop: races the three MQTT channels against the
    /// queue-drain and heartbeat timers, all under a single `&mut self`
    /// borrow so that `run_until_shutdown`'s own `select!` never needs more
    /// than one live borrow of the transport at a time.
    pub async fn next_event(
        &mut self,
        queue_tick: &mut tokio::time::Interval,
        heartbeat_tick: &mut tokio::time::Interval,
    ) -> TransportEvent {
        tokio::select! {
            message = self.connection.received.next() => match message {
                Some(message) => TransportEvent::Message(message),
                None => TransportEvent::Closed,
            },
            event = self.connection.events.next() => match event {
                Some(event) => TransportEvent::Connection(event),
                None => TransportEvent::Closed,
            },
            err = self.connection.errors.next() => match err {
                Some(err) => TransportEvent::Error(err),
                None => TransportEvent::Closed,
            },
            _ = queue_tick.tick() => {
                if let Some(message) = self.queue.pop_front() {
                    if let Err(err) = self.connection.published.send(message).await {
                        tracing::warn!("queued publish failed: {err}");
                    }
                }
                TransportEvent::QueueTick
            }
            _ = heartbeat_tick.tick() => {
                if let Err(err) = self.publish_heartbeat().await {
                    tracing::warn!("heartbeat publish failed: {err}");
                }
                TransportEvent::Heartbeat
            }
        }
    }

    /// Graceful shutdown: flush the last will, disconnect. Safe to call
    /// even if `connect` never completed a handshake.
    pub async fn close(self) {
        self.connection.close().await;
    }
}

/// Outcome of one `Transport::next_event` tick.
pub enum TransportEvent {
    Message(Message),
    Connection(mqtt_channel::ConnectionEvent),
    Error(MqttError),
    QueueTick,
    Heartbeat,
    /// One of the underlying channels was closed (sender task gone).
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use mqtt_channel::Topic;

    #[test]
    fn queue_preserves_fifo_order() {
        let mut queue = VecDeque::new();
        let topic = Topic::new("zigbee2mqtt/Lamp1/set").unwrap();
        queue.push_back(Message::new(&topic, "one"));
        queue.push_back(Message::new(&topic, "two"));
        assert_eq!(queue.pop_front().unwrap().payload_bytes(), b"one");
        assert_eq!(queue.pop_front().unwrap().payload_bytes(), b"two");
    }

    #[test]
    fn tick_period_is_fifty_milliseconds() {
        assert_eq!(QUEUE_TICK_PERIOD, Duration::from_millis(50));
    }
}
