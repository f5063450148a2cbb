//! Reconnecting MQTT subscriber yielding decoded envelopes.

use std::time::Duration;

use prost::Message;
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use telemetry_wire::{decrypt, ServiceEnvelope, DEFAULT_CHANNEL_KEY};

/// Fixed wait after a transport error before polling again.
const RECONNECT_BACKOFF: Duration = Duration::from_secs(1);

const KEEP_ALIVE: Duration = Duration::from_secs(30);

/// Broker connection and filtering parameters.
#[derive(Clone, Debug)]
pub struct ConsumerSettings {
    /// Broker hostname.
    pub host: String,
    /// Broker port.
    pub port: u16,
    /// Optional broker credentials.
    pub username: Option<String>,
    /// Optional broker credentials.
    pub password: Option<String>,
    /// Topic patterns to subscribe to.
    pub topics: Vec<String>,
    /// Origin addresses whose packets are dropped at the door.
    pub reject_nodes: Vec<u32>,
    /// Pre-shared key for the default-channel encrypted section.
    pub channel_key: [u8; 16],
}

impl Default for ConsumerSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            username: None,
            password: None,
            topics: vec!["msh/#".to_string()],
            // A known misbehaving origin that floods public brokers.
            reject_nodes: vec![2144342101],
            channel_key: DEFAULT_CHANNEL_KEY,
        }
    }
}

/// One decoded envelope together with the topic it arrived on.
#[derive(Clone, Debug)]
pub struct EnvelopeEvent {
    /// Topic the transport message was published to.
    pub topic: String,
    /// The decoded envelope; its packet carries a plaintext section.
    pub envelope: ServiceEnvelope,
}

/// Subscribe to the configured topics and feed decoded envelopes into `tx`.
///
/// Runs until the shutdown signal fires or the receiving side of the channel
/// is dropped. Transport errors are never fatal; the loop backs off briefly
/// and reconnects.
pub async fn run_consumer(
    settings: ConsumerSettings,
    tx: mpsc::Sender<EnvelopeEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    let client_id = format!("telemetry-{:04x}", rand::random::<u16>());
    let mut options = MqttOptions::new(client_id, settings.host.clone(), settings.port);
    options.set_keep_alive(KEEP_ALIVE);
    if let (Some(user), Some(pass)) = (&settings.username, &settings.password) {
        options.set_credentials(user.clone(), pass.clone());
    }

    let (client, mut eventloop) = AsyncClient::new(options, 64);

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("consumer shutting down");
                    return;
                }
            }
            event = eventloop.poll() => match event {
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    info!(host = %settings.host, port = settings.port, "broker connected");
                    for topic in &settings.topics {
                        info!(topic = %topic, "subscribing");
                        if let Err(err) = client.subscribe(topic.clone(), QoS::AtMostOnce).await {
                            warn!(topic = %topic, error = %err, "subscribe failed");
                        }
                    }
                }
                Ok(Event::Incoming(Incoming::Publish(publish))) => {
                    let Some(event) =
                        decode_envelope(&settings, &publish.topic, &publish.payload)
                    else {
                        continue;
                    };
                    if tx.send(event).await.is_err() {
                        info!("processor gone, consumer stopping");
                        return;
                    }
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(error = %err, "transport error, reconnecting");
                    tokio::select! {
                        _ = tokio::time::sleep(RECONNECT_BACKOFF) => {}
                        changed = shutdown.changed() => {
                            if changed.is_err() || *shutdown.borrow() {
                                info!("consumer shutting down");
                                return;
                            }
                        }
                    }
                }
            }
        }
    }
}

/// Decode, decrypt, and filter one transport message.
///
/// Malformed envelopes, packets still undecodable after decryption, and
/// reject-listed origins all yield `None`.
fn decode_envelope(
    settings: &ConsumerSettings,
    topic: &str,
    payload: &[u8],
) -> Option<EnvelopeEvent> {
    let mut envelope = match ServiceEnvelope::decode(payload) {
        Ok(envelope) => envelope,
        Err(err) => {
            debug!(topic = %topic, error = %err, "malformed envelope dropped");
            return None;
        }
    };

    let packet = envelope.packet.as_mut()?;
    decrypt(packet, &settings.channel_key);
    if packet.decoded().is_none() {
        debug!(topic = %topic, id = packet.id, "undecodable packet dropped");
        return None;
    }
    if settings.reject_nodes.contains(&packet.from) {
        debug!(from = packet.from, "reject-listed origin dropped");
        return None;
    }

    Some(EnvelopeEvent {
        topic: topic.to_string(),
        envelope,
    })
}
