use crate::errors::{Error, Result};
use crate::metrics::{CHANNEL_FULL_TOTAL, MESSAGES_TOTAL};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// Inbound message kind, taken from the topic's action segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Register,
    Data,
}

/// A transport message demultiplexed by topic but not yet parsed.
#[derive(Debug)]
pub struct Inbound {
    pub device_id: String,
    pub action: Action,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct MqttSettings {
    pub broker: String,
    pub port: u16,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Split `devices/<id>/<action>` into its parts.
///
/// Unknown action segments return None and the message is dropped: the
/// broker carries command topics this service publishes but never consumes,
/// and future actions must not break the subscriber.
pub fn parse_topic(topic: &str) -> Option<(&str, Action)> {
    let parts: Vec<&str> = topic.split('/').collect();
    if parts.len() != 3 || parts[0] != "devices" || parts[1].is_empty() {
        return None;
    }

    let action = match parts[2] {
        "register" => Action::Register,
        "data" => Action::Data,
        _ => return None,
    };

    Some((parts[1], action))
}

/// Build the shared MQTT client. The `AsyncClient` is cloned into the HTTP
/// path for retained command publishes; the event loop is driven by
/// `run_mqtt` alone.
pub fn connect(settings: &MqttSettings) -> (AsyncClient, EventLoop) {
    AsyncClient::new(build_options(settings), 10_000)
}

fn build_options(settings: &MqttSettings) -> MqttOptions {
    let mut options = MqttOptions::new(&settings.client_id, &settings.broker, settings.port);
    options.set_keep_alive(std::time::Duration::from_secs(30));
    // Client ids are fresh per boot, so there is never a prior broker
    // session to resume; the pipeline is at-most-once either way.
    options.set_clean_session(true);

    if let (Some(username), Some(password)) = (&settings.username, &settings.password) {
        options.set_credentials(username, password);
    }

    options
}

pub async fn run_mqtt(
    client: AsyncClient,
    mut eventloop: EventLoop,
    tx: mpsc::Sender<Inbound>,
) -> Result<()> {
    client
        .subscribe("devices/+/register", QoS::AtLeastOnce)
        .await
        .map_err(Error::Mqtt)?;
    client
        .subscribe("devices/+/data", QoS::AtLeastOnce)
        .await
        .map_err(Error::Mqtt)?;

    info!("Subscribed to devices/+/register and devices/+/data with QoS 1");

    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                MESSAGES_TOTAL.inc();

                let Some((device_id, action)) = parse_topic(&publish.topic) else {
                    debug!("ignoring message on unhandled topic {}", publish.topic);
                    continue;
                };

                debug!(
                    "received {:?} message for {}, size: {} bytes",
                    action,
                    device_id,
                    publish.payload.len()
                );

                let inbound = Inbound {
                    device_id: device_id.to_string(),
                    action,
                    payload: publish.payload.to_vec(),
                };

                forward(inbound, &tx).await?;
            }
            Ok(_) => {}
            Err(e) => {
                error!("MQTT error: {}", e);
                // rumqttc reconnects on its own; just log and continue
                tokio::time::sleep(std::time::Duration::from_secs(1)).await;
            }
        }
    }
}

/// Hand a message to the pipeline, falling back to a blocking send when the
/// channel is full so delivery order is preserved under backpressure.
async fn forward(inbound: Inbound, tx: &mpsc::Sender<Inbound>) -> Result<()> {
    match tx.try_send(inbound) {
        Ok(()) => Ok(()),
        Err(mpsc::error::TrySendError::Full(inbound)) => {
            CHANNEL_FULL_TOTAL.inc();
            debug!("channel full, using blocking send");
            tx.send(inbound).await.map_err(|_| Error::ChannelSend)
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            error!("pipeline channel closed, cannot forward message");
            Err(Error::ChannelSend)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_topic_register() {
        assert_eq!(
            parse_topic("devices/esp32-abc/register"),
            Some(("esp32-abc", Action::Register))
        );
    }

    #[test]
    fn parse_topic_data() {
        assert_eq!(
            parse_topic("devices/esp32-abc/data"),
            Some(("esp32-abc", Action::Data))
        );
    }

    #[test]
    fn parse_topic_unknown_action_is_dropped() {
        assert_eq!(parse_topic("devices/esp32-abc/firmware"), None);
        assert_eq!(parse_topic("devices/esp32-abc/commands"), None);
    }

    #[test]
    fn parse_topic_wrong_prefix() {
        assert_eq!(parse_topic("sensors/esp32-abc/data"), None);
    }

    #[test]
    fn parse_topic_wrong_segment_count() {
        assert_eq!(parse_topic("devices/data"), None);
        assert_eq!(parse_topic("devices/esp32-abc/commands/set_schedule"), None);
    }

    #[test]
    fn parse_topic_empty_device_id() {
        assert_eq!(parse_topic("devices//data"), None);
    }

    #[test]
    fn parse_topic_empty_string() {
        assert_eq!(parse_topic(""), None);
    }

    #[test]
    fn build_options_starts_a_clean_session() {
        let settings = MqttSettings {
            broker: "localhost".to_string(),
            port: 1883,
            client_id: "backend-test".to_string(),
            username: None,
            password: None,
        };

        let options = build_options(&settings);
        assert!(options.clean_session());
        assert_eq!(options.client_id(), "backend-test");
    }

    #[test]
    fn forward_delivers_in_order() {
        tokio_test::block_on(async {
            let (tx, mut rx) = mpsc::channel(10);

            for i in 0..3 {
                let inbound = Inbound {
                    device_id: format!("dev-{i}"),
                    action: Action::Data,
                    payload: b"{}".to_vec(),
                };
                forward(inbound, &tx).await.unwrap();
            }

            for i in 0..3 {
                assert_eq!(rx.recv().await.unwrap().device_id, format!("dev-{i}"));
            }
        });
    }

    #[test]
    fn forward_fails_on_closed_channel() {
        tokio_test::block_on(async {
            let (tx, rx) = mpsc::channel(1);
            drop(rx);

            let inbound = Inbound {
                device_id: "dev-1".to_string(),
                action: Action::Register,
                payload: b"{}".to_vec(),
            };

            assert!(matches!(
                forward(inbound, &tx).await,
                Err(Error::ChannelSend)
            ));
        });
    }
}
