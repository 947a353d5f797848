use crate::Config;
use crate::Message;
use crate::MqttError;
use crate::Topic;
use futures::channel::mpsc;
use futures::channel::oneshot;
use futures::SinkExt;
use futures::StreamExt;
use rumqttc::AsyncClient;
use rumqttc::ConnectionError;
use rumqttc::Event;
use rumqttc::EventLoop;
use rumqttc::Incoming;
use rumqttc::Outgoing;
use rumqttc::Packet;
use rumqttc::StateError;
use std::time::Duration;
use tokio::time::sleep;
use tracing::error;
use tracing::info;
use tracing::warn;

/// State machine events surfaced to callers, mirroring the client library's
/// own lifecycle notifications rather than a single opaque "connected" flag.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ConnectionEvent {
    Connect,
    Reconnect,
    Disconnect,
    Close,
    End,
    Offline,
    Subscribed,
    Published,
}

/// A connection to some MQTT server.
///
/// Built on `rumqttc::AsyncClient`/`EventLoop`: a receiver task forwards
/// incoming publishes and lifecycle events, a sender task drains outgoing
/// publishes (in FIFO order) and ensures the last-will message and a
/// graceful disconnect are sent on shutdown.
pub struct Connection {
    pub received: mpsc::UnboundedReceiver<Message>,
    pub published: mpsc::UnboundedSender<Message>,
    pub errors: mpsc::UnboundedReceiver<MqttError>,
    pub events: mpsc::UnboundedReceiver<ConnectionEvent>,
    pub pub_done: oneshot::Receiver<()>,
    client_id: String,
}

impl Connection {
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Establish a connection to the broker defined by `config`, subscribing
    /// once to every topic in `config.subscriptions` on the first `Connect`
    /// event (not on every reconnect: the broker replays the retained
    /// subscription state for a persistent session).
    pub async fn new(config: &Config) -> Result<Connection, MqttError> {
        let client_id = config
            .session_name
            .clone()
            .unwrap_or_else(|| Config::generate_client_id("client"));

        let (received_sender, received_receiver) = mpsc::unbounded();
        let (published_sender, published_receiver) = mpsc::unbounded();
        let (error_sender, error_receiver) = mpsc::unbounded();
        let (event_sender, event_receiver) = mpsc::unbounded();
        let (pub_done_sender, pub_done_receiver) = oneshot::channel();

        let mqtt_options = config.rumqttc_options(&client_id)?;
        let (mqtt_client, event_loop) = AsyncClient::new(mqtt_options, config.queue_capacity);

        info!(
            "MQTT connecting to broker: host={}:{}, scheme={:?}, client_id={client_id}",
            config.broker.host, config.broker.port, config.broker.scheme
        );

        tokio::spawn(Connection::receiver_loop(
            mqtt_client.clone(),
            config.clone(),
            event_loop,
            received_sender,
            error_sender.clone(),
            event_sender,
        ));
        tokio::spawn(Connection::sender_loop(
            mqtt_client,
            published_receiver,
            error_sender,
            config.last_will_message.clone(),
            pub_done_sender,
        ));

        Ok(Connection {
            received: received_receiver,
            published: published_sender,
            errors: error_receiver,
            events: event_receiver,
            pub_done: pub_done_receiver,
            client_id,
        })
    }

    /// Gracefully end the connection: closes the publish channel and waits
    /// for the sender loop to flush the last will and disconnect.
    pub async fn close(self) {
        self.published.close_channel();
        let _ = self.pub_done.await;
    }

    async fn receiver_loop(
        mqtt_client: AsyncClient,
        config: Config,
        mut event_loop: EventLoop,
        mut message_sender: mpsc::UnboundedSender<Message>,
        mut error_sender: mpsc::UnboundedSender<MqttError>,
        mut event_sender: mpsc::UnboundedSender<ConnectionEvent>,
    ) -> Result<(), MqttError> {
        let mut subscribed_once = false;
        loop {
            match event_loop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    if ack.code != rumqttc::ConnectReturnCode::Success {
                        error!("MQTT connection refused: {:?}", ack.code);
                        let _ = event_sender.send(ConnectionEvent::End).await;
                        break;
                    }
                    let _ = event_sender
                        .send(if subscribed_once {
                            ConnectionEvent::Reconnect
                        } else {
                            ConnectionEvent::Connect
                        })
                        .await;
                    info!("MQTT connection established");

                    if !subscribed_once {
                        let subscriptions = config.subscriptions.filters();
                        if !subscriptions.is_empty() {
                            Connection::subscribe_to_topics(&mqtt_client, subscriptions).await?;
                        }
                        subscribed_once = true;
                    }
                }

                Ok(Event::Incoming(Packet::SubAck(_))) => {
                    let _ = event_sender.send(ConnectionEvent::Subscribed).await;
                }

                Ok(Event::Incoming(Packet::PubAck(_)))
                | Ok(Event::Incoming(Packet::PubComp(_))) => {
                    let _ = event_sender.send(ConnectionEvent::Published).await;
                }

                Ok(Event::Incoming(Packet::Publish(msg))) => {
                    let _ = message_sender.send(msg.into()).await;
                }

                Ok(Event::Incoming(Incoming::Disconnect))
                | Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                    info!("MQTT connection closed");
                    let _ = event_sender.send(ConnectionEvent::Close).await;
                    break;
                }

                Err(err) => {
                    error!("MQTT connection error: {err}");
                    let delay = Connection::pause_on_error(&err);
                    let _ = event_sender.send(ConnectionEvent::Offline).await;
                    let _ = error_sender.send(err.into()).await;

                    if delay {
                        Connection::do_pause(config.reconnect_period).await;
                    }
                }
                _ => (),
            }
        }
        let _ = message_sender.close().await;
        let _ = error_sender.close().await;
        let _ = event_sender.send(ConnectionEvent::End).await;
        Ok(())
    }

    async fn sender_loop(
        mqtt_client: AsyncClient,
        mut messages_receiver: mpsc::UnboundedReceiver<Message>,
        mut error_sender: mpsc::UnboundedSender<MqttError>,
        last_will: Option<Message>,
        done: oneshot::Sender<()>,
    ) {
        loop {
            match messages_receiver.next().await {
                None => break,
                Some(message) => {
                    let payload = Vec::from(message.payload_bytes());
                    if let Err(err) = mqtt_client
                        .publish(message.topic, message.qos, message.retain, payload)
                        .await
                    {
                        warn!("MQTT publish failed: {err}");
                        let _ = error_sender.send(err.into()).await;
                    }
                }
            }
        }

        // The broker does not send the last will on a graceful disconnect,
        // so it must be published explicitly before disconnecting.
        if let Some(last_will) = last_will {
            let payload = Vec::from(last_will.payload_bytes());
            let _ = mqtt_client
                .publish(last_will.topic, last_will.qos, last_will.retain, payload)
                .await;
        }
        let _ = mqtt_client.disconnect().await;
        let _ = done.send(());
    }

    pub(crate) fn pause_on_error(err: &ConnectionError) -> bool {
        matches!(
            err,
            ConnectionError::Io(_) | ConnectionError::MqttState(StateError::Io(_))
        )
    }

    pub(crate) async fn do_pause(period: Duration) {
        sleep(period).await;
    }

    pub(crate) async fn subscribe_to_topics(
        mqtt_client: &AsyncClient,
        subscriptions: Vec<rumqttc::SubscribeFilter>,
    ) -> Result<(), MqttError> {
        mqtt_client
            .subscribe_many(subscriptions)
            .await
            .map_err(MqttError::ClientError)
    }
}

/// The literal heartbeat payload published to `clients/<clientId>/heartbeat`
/// every `keepalive` seconds once connected.
pub const HEARTBEAT_PAYLOAD: &str = "alive";

pub fn heartbeat_topic(client_id: &str) -> Topic {
    Topic::new_unchecked(&format!("clients/{client_id}/heartbeat"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heartbeat_topic_is_scoped_to_client_id() {
        let topic = heartbeat_topic("zigbee2mqtt_0123456789abcdef");
        assert_eq!(topic.name, "clients/zigbee2mqtt_0123456789abcdef/heartbeat");
    }

    #[test]
    fn pause_on_io_error_is_true() {
        let err = ConnectionError::Io(std::io::Error::new(std::io::ErrorKind::Other, "boom"));
        assert!(Connection::pause_on_error(&err));
    }
}
