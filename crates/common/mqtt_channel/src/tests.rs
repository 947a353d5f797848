use crate::Config;
use crate::Message;
use crate::Topic;
use crate::TopicFilter;

#[test]
fn config_default_uses_localhost_plain_mqtt() {
    let config = Config::default();
    assert_eq!(config.broker.host, "localhost");
    assert_eq!(config.broker.port, 1883);
}

#[test]
fn with_host_strips_scheme_and_records_it() {
    let config = Config::default().with_host("mqtts://broker.example");
    assert_eq!(config.broker.host, "broker.example");
    assert!(config.broker.scheme.is_tls());
}

#[test]
fn subscriptions_accumulate_across_with_subscriptions_calls() {
    let config = Config::default()
        .with_subscriptions(TopicFilter::new_unchecked("a/#"))
        .with_subscriptions(TopicFilter::new_unchecked("b/#"));
    assert_eq!(config.subscriptions.patterns.len(), 2);
}

#[test]
fn message_round_trips_through_rumqttc_publish() {
    let topic = Topic::new_unchecked("zigbee2mqtt/Lamp1/set");
    let message = Message::new(&topic, r#"{"state":"ON"}"#).with_retain();
    let publish: rumqttc::Publish = message.clone().into();
    let back: Message = publish.into();
    assert_eq!(back.topic, message.topic);
    assert_eq!(back.payload_bytes(), message.payload_bytes());
    assert!(back.retain);
}
