use serde::Serialize;
use std::fmt;
use std::net::IpAddr;
use super::utils::OrderedMap;

/// Numeric value of a decoded field, the only kind that ends up in a feature row.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Numeric {
    Integer(i64),
    Float(f64),
}

impl fmt::Display for Numeric {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Numeric::Integer(value) => write!(f, "{value}"),
            Numeric::Float(value) => write!(f, "{value}"),
        }
    }
}

/// Typed interpretation of a field's `show` string.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FieldValue {
    Integer(i64),
    Float(f64),
    Text,
}

impl FieldValue {
    /// Integer first, then float, otherwise text.
    pub fn parse(raw: &str) -> Self {
        if let Ok(value) = raw.parse::<i64>() {
            return FieldValue::Integer(value);
        }
        match raw.parse::<f64>() {
            Ok(value) => FieldValue::Float(value),
            Err(_) => FieldValue::Text,
        }
    }

    pub fn numeric(&self) -> Option<Numeric> {
        match *self {
            FieldValue::Integer(value) => Some(Numeric::Integer(value)),
            FieldValue::Float(value) => Some(Numeric::Float(value)),
            FieldValue::Text => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Field {
    pub name: String,
    pub show: String,
    pub showname: String,
    pub value: FieldValue,
}

impl Field {
    pub fn new(name: &str, show: &str, showname: &str) -> Self {
        Self {
            name: name.to_string(),
            show: show.to_string(),
            showname: showname.to_string(),
            value: FieldValue::parse(show),
        }
    }

    /// The `show` string, or the `showname` for label-only tree nodes.
    pub fn text(&self) -> &str {
        if self.show.is_empty() {
            &self.showname
        } else {
            &self.show
        }
    }

    /// Human-readable name, the part of `showname` before `": "`.
    pub fn display_name(&self) -> Option<&str> {
        self.showname.split_once(": ").map(|(key, _)| key)
    }

    /// Boolean flag fields are rendered as `1` by older tsharks and `True` by newer ones.
    pub fn is_set(&self) -> bool {
        self.show == "1" || self.show.eq_ignore_ascii_case("true")
    }
}

/// Fields of one layer keyed by qualified name (`tcp.srcport`).
///
/// A name that repeats within a layer (several records in one segment) keeps its
/// first occurrence, the same value tshark reports as the field's default.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldTable {
    fields: OrderedMap<Field>,
}

impl FieldTable {
    pub fn new() -> Self {
        Self {
            fields: OrderedMap::new(),
        }
    }

    pub fn push(&mut self, field: Field) {
        self.fields.insert_first(field.name.clone(), field);
    }

    pub fn get(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().map(|(_, field)| field)
    }
}

impl FromIterator<Field> for FieldTable {
    fn from_iter<I: IntoIterator<Item = Field>>(iter: I) -> Self {
        let mut table = FieldTable::new();
        for field in iter {
            table.push(field);
        }
        table
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LayerKind {
    Ip,
    Ipv6,
    Tcp,
    Tls,
    Ssl,
    Other,
}

/// One decoded protocol layer of a packet.
#[derive(Clone, Debug, PartialEq)]
pub enum Layer {
    Ip(FieldTable),
    Ipv6(FieldTable),
    Tcp(FieldTable),
    Tls(FieldTable),
    Ssl(FieldTable),
    Other { name: String, fields: FieldTable },
}

/// Handshake message named by a record layer's `handshake` tree node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandshakeMessage {
    ClientHello,
    ClientKeyExchange,
    EncryptedHandshakeMessage,
    Other(String),
}

impl HandshakeMessage {
    fn from_text(text: &str) -> Self {
        let name = text.strip_prefix("Handshake Protocol: ").unwrap_or(text);
        match name {
            "Client Hello" => HandshakeMessage::ClientHello,
            "Client Key Exchange" => HandshakeMessage::ClientKeyExchange,
            "Encrypted Handshake Message" => HandshakeMessage::EncryptedHandshakeMessage,
            other => HandshakeMessage::Other(other.to_string()),
        }
    }

    fn from_type(code: i64) -> Self {
        match code {
            1 => HandshakeMessage::ClientHello,
            16 => HandshakeMessage::ClientKeyExchange,
            other => HandshakeMessage::Other(other.to_string()),
        }
    }
}

impl Layer {
    pub fn new(name: &str, fields: FieldTable) -> Self {
        match name {
            "ip" => Layer::Ip(fields),
            "ipv6" => Layer::Ipv6(fields),
            "tcp" => Layer::Tcp(fields),
            "tls" => Layer::Tls(fields),
            "ssl" => Layer::Ssl(fields),
            other => Layer::Other {
                name: other.to_string(),
                fields,
            },
        }
    }

    pub fn kind(&self) -> LayerKind {
        match self {
            Layer::Ip(_) => LayerKind::Ip,
            Layer::Ipv6(_) => LayerKind::Ipv6,
            Layer::Tcp(_) => LayerKind::Tcp,
            Layer::Tls(_) => LayerKind::Tls,
            Layer::Ssl(_) => LayerKind::Ssl,
            Layer::Other { .. } => LayerKind::Other,
        }
    }

    /// tshark protocol name, e.g. `tcp`.
    pub fn name(&self) -> &str {
        match self {
            Layer::Ip(_) => "ip",
            Layer::Ipv6(_) => "ipv6",
            Layer::Tcp(_) => "tcp",
            Layer::Tls(_) => "tls",
            Layer::Ssl(_) => "ssl",
            Layer::Other { name, .. } => name.as_str(),
        }
    }

    pub fn fields(&self) -> &FieldTable {
        match self {
            Layer::Ip(fields)
            | Layer::Ipv6(fields)
            | Layer::Tcp(fields)
            | Layer::Tls(fields)
            | Layer::Ssl(fields)
            | Layer::Other { fields, .. } => fields,
        }
    }

    /// Looks up `{layer}.{suffix}`, e.g. `scoped("flags.fin")` on the TCP layer.
    pub fn scoped(&self, suffix: &str) -> Option<&Field> {
        self.fields().get(&format!("{}.{}", self.name(), suffix))
    }

    /// First handshake message of a TLS/SSL layer.
    pub fn handshake(&self) -> Option<HandshakeMessage> {
        if let Some(node) = self.scoped("handshake") {
            let text = node.text();
            if !text.is_empty() {
                return Some(HandshakeMessage::from_text(text));
            }
        }
        match self.scoped("handshake.type")?.value {
            FieldValue::Integer(code) => Some(HandshakeMessage::from_type(code)),
            _ => None,
        }
    }

    pub fn carries_change_cipher_spec(&self) -> bool {
        self.scoped("change_cipher_spec")
            .map_or(false, |node| node.text() == "Change Cipher Spec Message")
    }
}

/// A decoded packet, converted from rtshark's output into owned layers.
#[derive(Clone, Debug, PartialEq)]
pub struct Packet {
    layers: Vec<Layer>,
}

impl Packet {
    pub fn new(layers: Vec<Layer>) -> Self {
        Self { layers }
    }

    pub fn layer(&self, kind: LayerKind) -> Option<&Layer> {
        self.layers.iter().find(|layer| layer.kind() == kind)
    }

    pub fn tcp(&self) -> Option<&Layer> {
        self.layer(LayerKind::Tcp)
    }

    /// The TLS layer, or the SSL layer older tsharks produce instead.
    pub fn record_layer(&self) -> Option<&Layer> {
        self.layer(LayerKind::Tls).or_else(|| self.layer(LayerKind::Ssl))
    }

    fn record_layers(&self) -> impl Iterator<Item = &Layer> {
        self.layer(LayerKind::Tls)
            .into_iter()
            .chain(self.layer(LayerKind::Ssl))
    }

    pub fn has_record_layer(&self) -> bool {
        self.record_layer().is_some()
    }

    /// `tcp.stream`, tshark's connection identifier.
    pub fn stream_id(&self) -> Option<u64> {
        match self.tcp()?.scoped("stream")?.value {
            FieldValue::Integer(id) => u64::try_from(id).ok(),
            _ => None,
        }
    }

    fn address(&self, suffix: &str) -> Option<IpAddr> {
        self.layer(LayerKind::Ip)
            .or_else(|| self.layer(LayerKind::Ipv6))?
            .scoped(suffix)?
            .show
            .parse()
            .ok()
    }

    pub fn source(&self) -> Option<IpAddr> {
        self.address("src")
    }

    pub fn destination(&self) -> Option<IpAddr> {
        self.address("dst")
    }

    pub fn is_handshake(&self, message: &HandshakeMessage) -> bool {
        self.record_layers()
            .any(|layer| layer.handshake().as_ref() == Some(message))
    }

    pub fn carries_change_cipher_spec(&self) -> bool {
        self.record_layers().any(Layer::carries_change_cipher_spec)
    }

    /// TCP FIN or RST set.
    pub fn closes_connection(&self) -> bool {
        self.tcp().map_or(false, |tcp| {
            ["flags.fin", "flags.reset"]
                .iter()
                .any(|flag| tcp.scoped(flag).map_or(false, Field::is_set))
        })
    }
}

impl From<&rtshark::Packet> for Packet {
    fn from(packet: &rtshark::Packet) -> Self {
        let layers = packet
            .iter()
            .map(|layer| {
                let fields = layer
                    .iter()
                    .map(|metadata| Field::new(metadata.name(), metadata.value(), metadata.display()))
                    .collect();
                Layer::new(layer.name(), fields)
            })
            .collect();

        Packet::new(layers)
    }
}

/// Ordered packets of one TCP connection.
#[derive(Clone, Debug, PartialEq)]
pub struct Session {
    pub stream: u64,
    pub packets: Vec<Packet>,
}

impl Session {
    pub fn new(stream: u64) -> Self {
        Self {
            stream,
            packets: Vec::new(),
        }
    }

}


#[cfg(test)]
mod tests {
    use super::fixtures::PacketBuilder;
    use super::*;

    #[test]
    fn field_values_prefer_integers() {
        assert_eq!(FieldValue::parse("42"), FieldValue::Integer(42));
        assert_eq!(FieldValue::parse("-3"), FieldValue::Integer(-3));
        assert_eq!(FieldValue::parse("0.5"), FieldValue::Float(0.5));
        assert_eq!(FieldValue::parse("0x0018"), FieldValue::Text);
        assert_eq!(FieldValue::parse("ab:cd"), FieldValue::Text);
        assert_eq!(FieldValue::parse(""), FieldValue::Text);
    }

    #[test]
    fn repeated_field_keeps_first() {
        let table: FieldTable = [
            Field::new("tls.handshake", "", "Handshake Protocol: Client Key Exchange"),
            Field::new("tls.handshake", "", "Handshake Protocol: Encrypted Handshake Message"),
        ]
        .into_iter()
        .collect();
        let layer = Layer::new("tls", table);
        assert_eq!(layer.fields().iter().count(), 1);
        assert_eq!(layer.handshake(), Some(HandshakeMessage::ClientKeyExchange));
    }

    #[test]
    fn handshake_falls_back_to_type_code() {
        let layer = Layer::new(
            "ssl",
            [Field::new("ssl.handshake.type", "16", "Handshake Type: Client Key Exchange (16)")]
                .into_iter()
                .collect(),
        );
        assert_eq!(layer.kind(), LayerKind::Ssl);
        assert_eq!(layer.handshake(), Some(HandshakeMessage::ClientKeyExchange));
    }

    #[test]
    fn packet_queries() {
        let packet = PacketBuilder::new()
            .ip("10.0.0.1", "10.0.0.2")
            .tcp(7, 100)
            .handshake("tls", "Client Key Exchange")
            .change_cipher_spec("ssl")
            .build();

        assert!(packet.layer(LayerKind::Tcp).is_some());
        assert!(packet.has_record_layer());
        assert_eq!(packet.record_layer().map(Layer::name), Some("tls"));
        assert_eq!(packet.stream_id(), Some(7));
        assert_eq!(packet.source(), Some("10.0.0.1".parse().unwrap()));
        assert_eq!(packet.destination(), Some("10.0.0.2".parse().unwrap()));
        assert!(packet.is_handshake(&HandshakeMessage::ClientKeyExchange));
        assert!(!packet.is_handshake(&HandshakeMessage::ClientHello));
        assert!(packet.carries_change_cipher_spec());
        assert!(!packet.closes_connection());
    }

    #[test]
    fn ipv6_addresses_and_closing_flags() {
        let packet = PacketBuilder::new()
            .ip("fe80::1", "fe80::2")
            .tcp_closing(3)
            .build();
        assert_eq!(packet.source(), Some("fe80::1".parse().unwrap()));
        assert!(packet.closes_connection());

        let reset = Layer::new(
            "tcp",
            [Field::new("tcp.flags.reset", "True", "Reset: Set")].into_iter().collect(),
        );
        assert!(Packet::new(vec![reset]).closes_connection());
    }

    #[test]
    fn display_name_is_showname_key() {
        let field = Field::new("tcp.len", "5", "TCP Segment Len: 5");
        assert_eq!(field.display_name(), Some("TCP Segment Len"));
        assert_eq!(Field::new("tcp.x", "5", "").display_name(), None);
    }
}
