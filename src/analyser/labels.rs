//! Ground truth recorded by the traffic generator, keyed by Client Hello random.
use serde::Deserialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use crate::error::Result;
use super::containers::{HandshakeMessage, Session};
use super::utils::is_truthy;

/// Label given to sessions whose random is not in the table.
pub const UNKNOWN_LABEL: &str = "unknown";

#[derive(Debug, Deserialize)]
struct LabelRecord {
    client_hello_random: String,
    label: String,
    #[serde(default)]
    skipped_ccs_fin: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LabelEntry {
    pub label: String,
    pub skipped_ccs_fin: bool,
}

/// Label and flag attached to a feature row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionLabel {
    pub label: String,
    pub missing_ccs_fin: bool,
    pub matched: bool,
}

impl SessionLabel {
    fn unknown() -> Self {
        Self {
            label: UNKNOWN_LABEL.to_string(),
            missing_ccs_fin: false,
            matched: false,
        }
    }
}

/// Nonce -> label lookup.
///
/// The generator writes one row per handshake, so nonces should be unique. When
/// they are not, the first row wins and every later duplicate is logged.
#[derive(Debug, Default)]
pub struct LabelTable {
    entries: HashMap<String, LabelEntry>,
}

impl LabelTable {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        log::info!("Reading labels from {}", path.as_ref().display());
        Self::from_reader(File::open(path)?)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);
        let mut table = LabelTable::default();
        for record in reader.deserialize() {
            let record: LabelRecord = record?;
            table.insert(
                record.client_hello_random,
                LabelEntry {
                    label: record.label,
                    skipped_ccs_fin: record.skipped_ccs_fin.as_deref().map_or(false, is_truthy),
                },
            );
        }
        log::info!("Loaded {} labels", table.len());
        Ok(table)
    }

    pub fn insert(&mut self, nonce: String, entry: LabelEntry) {
        if self.entries.contains_key(&nonce) {
            log::warn!("Duplicate label row for randomness \"{nonce}\", keeping the first one");
            return;
        }
        self.entries.insert(nonce, entry);
    }

    pub fn get(&self, nonce: &str) -> Option<&LabelEntry> {
        self.entries.get(nonce)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Labels a session by the random of its first Client Hello.
    pub fn label_session(&self, session: &Session) -> SessionLabel {
        let Some(nonce) = client_hello_random(session) else {
            log::warn!("No Client Hello in stream {}, label unknown", session.stream);
            return SessionLabel::unknown();
        };

        match self.get(&nonce) {
            Some(entry) => SessionLabel {
                label: entry.label.clone(),
                missing_ccs_fin: entry.skipped_ccs_fin,
                matched: true,
            },
            None => {
                log::warn!("No matching label found for randomness \"{nonce}\"");
                SessionLabel::unknown()
            }
        }
    }
}

/// `handshake.random` of the first TLS or SSL Client Hello, verbatim.
pub fn client_hello_random(session: &Session) -> Option<String> {
    session
        .packets
        .iter()
        .filter(|packet| packet.is_handshake(&HandshakeMessage::ClientHello))
        .find_map(|packet| {
            let layer = packet.record_layer()?;
            Some(layer.scoped("handshake.random")?.show.clone())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyser::containers::fixtures::{session, PacketBuilder};

    const TABLE: &str = "\
,client_hello_random,label,skipped_ccs_fin
0,abcd1234,correct_padding,False
1,00112233,wrong_first_byte,yes
2,abcd1234,no_zero_byte,True
";

    fn hello_session(proto: &str, random: &str) -> Session {
        session(
            0,
            vec![
                PacketBuilder::new()
                    .ip("10.0.0.1", "10.0.0.2")
                    .tcp(0, 200)
                    .client_hello(proto, random)
                    .build(),
            ],
        )
    }

    #[test]
    fn matching_random_copies_label() {
        let table = LabelTable::from_reader(TABLE.as_bytes()).unwrap();
        let label = table.label_session(&hello_session("tls", "abcd1234"));
        assert_eq!(label.label, "correct_padding");
        assert!(!label.missing_ccs_fin);
        assert!(label.matched);
    }

    #[test]
    fn unknown_random() {
        let table = LabelTable::from_reader(TABLE.as_bytes()).unwrap();
        let label = table.label_session(&hello_session("tls", "ffffffff"));
        assert_eq!(label.label, UNKNOWN_LABEL);
        assert!(!label.missing_ccs_fin);
        assert!(!label.matched);
    }

    #[test]
    fn ssl_hello_and_truthy_flag() {
        let table = LabelTable::from_reader(TABLE.as_bytes()).unwrap();
        // Digits only: the nonce must be matched as text, not as a number.
        let label = table.label_session(&hello_session("ssl", "00112233"));
        assert_eq!(label.label, "wrong_first_byte");
        assert!(label.missing_ccs_fin);
    }

    #[test]
    fn duplicates_keep_first_row() {
        let table = LabelTable::from_reader(TABLE.as_bytes()).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get("abcd1234").unwrap().label, "correct_padding");
    }

    #[test]
    fn flag_column_is_optional() {
        let table = LabelTable::from_reader("client_hello_random,label\naa:bb,correct_padding\n".as_bytes()).unwrap();
        assert_eq!(
            table.get("aa:bb"),
            Some(&LabelEntry {
                label: "correct_padding".to_string(),
                skipped_ccs_fin: false,
            })
        );
    }

    #[test]
    fn first_client_hello_wins() {
        let builder = || PacketBuilder::new().ip("10.0.0.1", "10.0.0.2").tcp(0, 200);
        let session = session(
            0,
            vec![
                builder().build(),
                builder().client_hello("tls", "11:11").build(),
                builder().client_hello("tls", "22:22").build(),
            ],
        );
        assert_eq!(client_hello_random(&session).as_deref(), Some("11:11"));
    }

    #[test]
    fn session_without_hello_is_unknown() {
        let table = LabelTable::from_reader(TABLE.as_bytes()).unwrap();
        let label = table.label_session(&session(0, vec![]));
        assert_eq!(label.label, UNKNOWN_LABEL);
    }

    #[test]
    fn table_is_read_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Client Requests.csv");
        std::fs::write(&path, TABLE).unwrap();

        let table = LabelTable::from_path(&path).unwrap();
        assert_eq!(table.len(), 2);
        assert!(LabelTable::from_path(dir.path().join("absent.csv")).is_err());
    }
}
