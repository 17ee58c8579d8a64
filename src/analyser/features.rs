//! Turns the server responses of one session into named numeric features.
use std::net::IpAddr;
use super::containers::{HandshakeMessage, Layer, Numeric, Packet, Session};
use super::state::{HandshakePhase, PhaseMachine};
use super::utils::{ordinal_words, OrderedMap};

/// Substrings of field names that are never features: raw byte dumps, tshark's
/// analysis annotations and timing.
pub const IGNORED_FIELD_PATTERNS: [&str; 3] = ["_raw", ".analysis.", "time"];

/// Feature key -> human-readable description.
pub type FieldDictionary = OrderedMap<String>;

pub fn is_ignored(field_name: &str) -> bool {
    IGNORED_FIELD_PATTERNS
        .iter()
        .any(|pattern| field_name.contains(pattern))
}

/// Features extracted from one session, before the minimum-count check.
#[derive(Debug, Default)]
pub struct SessionFeatures {
    pub features: OrderedMap<Numeric>,
    pub dictionary: FieldDictionary,
}

impl SessionFeatures {
    pub fn len(&self) -> usize {
        self.features.len()
    }
}

/// Address the first Client Key Exchange was sent to.
pub fn find_server_address(session: &Session) -> Option<IpAddr> {
    session
        .packets
        .iter()
        .find(|packet| packet.is_handshake(&HandshakeMessage::ClientKeyExchange))
        .and_then(Packet::destination)
}

/// Direction of packets relative to the server address, when known.
#[derive(Clone, Copy, Debug)]
pub struct Roles {
    server: Option<IpAddr>,
}

impl Roles {
    pub fn new(server: Option<IpAddr>) -> Self {
        Self { server }
    }

    /// `false` while the server is unknown.
    pub fn is_from_server(&self, packet: &Packet) -> bool {
        matches!((self.server, packet.source()), (Some(server), Some(src)) if server == src)
    }

    /// `false` while the server is unknown.
    pub fn is_from_client(&self, packet: &Packet) -> bool {
        matches!((self.server, packet.destination()), (Some(server), Some(dst)) if server == dst)
    }
}

/// Extracts the features of a session. Holds no state between sessions.
#[derive(Debug, Default)]
pub struct FeatureExtractor;

impl FeatureExtractor {
    pub fn new() -> Self {
        FeatureExtractor
    }

    pub fn extract(&self, session: &Session) -> SessionFeatures {
        let server = find_server_address(session);
        let roles = Roles::new(server);
        let mut machine = PhaseMachine::new();
        let mut extracted = SessionFeatures::default();

        match server {
            Some(address) => log::debug!("Stream {}: server is {address}", session.stream),
            None => log::debug!("Stream {}: no Client Key Exchange", session.stream),
        }

        for packet in &session.packets {
            let from_server = roles.is_from_server(packet);
            if from_server {
                machine.on_server_packet(packet);
            }
            if roles.is_from_client(packet) {
                machine.on_client_packet(packet);
            }

            if machine.phase() == HandshakePhase::Waiting || !from_server {
                continue;
            }

            let machine_name = format!("{}{}", machine.phase(), machine.phase_ordinal());
            let human_name = format!(
                "{} {}",
                ordinal_words(machine.phase_ordinal() + 1),
                machine.phase().description()
            );

            extract_packet_values(packet, &machine_name, &human_name, &mut extracted);

            let order_key = format!("{machine_name}:order");
            extracted.features.insert(
                order_key.clone(),
                Numeric::Integer(machine.received_ordinal() as i64),
            );
            extracted.dictionary.insert(
                order_key,
                format!("Message order of the {human_name} within the server responses"),
            );

            machine.increment();
        }

        extracted
    }
}

/// TCP fields of a server packet, plus its TLS (or else SSL) fields.
fn extract_packet_values(packet: &Packet, machine_name: &str, human_name: &str, out: &mut SessionFeatures) {
    if let Some(tcp) = packet.tcp() {
        extract_layer_values(tcp, machine_name, human_name, out);
    }
    if let Some(record) = packet.record_layer() {
        extract_layer_values(record, machine_name, human_name, out);
    }
}

fn extract_layer_values(layer: &Layer, machine_name: &str, human_name: &str, out: &mut SessionFeatures) {
    for field in layer.fields().iter() {
        if !field.name.contains(layer.name()) || is_ignored(&field.name) {
            continue;
        }
        let Some(value) = field.value.numeric() else {
            continue;
        };

        let key = format!("{machine_name}:{}", field.name);
        let human_field = field.display_name().unwrap_or(&field.name);
        out.dictionary
            .insert(key.clone(), describe_field(human_field, layer.name(), human_name));
        out.features.insert(key, value);
    }
}

/// "TCP Window of the first TLS Alert", without doubling the layer name when the
/// field's display name already carries it.
pub fn describe_field(human_field: &str, layer_name: &str, human_name: &str) -> String {
    let layer = layer_name.to_uppercase();
    if human_field.contains(&layer) {
        format!("{human_field} of the {human_name}")
    } else {
        format!("{layer} {human_field} of the {human_name}")
    }
}
