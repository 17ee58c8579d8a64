//! Handshake phase tracking for a single TCP session.
//!
//! The phase is driven by what the client just sent (Client Key Exchange, Change
//! Cipher Spec, Finished) and by TLS records the server answers with afterwards.
//! Server packets observed in a phase are numbered by the phase ordinal, which is
//! what makes feature keys unique.
use std::fmt;
use super::containers::{HandshakeMessage, Packet};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HandshakePhase {
    Waiting,
    ClientKeyExchange,
    ChangeCipherSpec,
    Finished,
    Alert,
    Disconnected,
}

impl HandshakePhase {
    /// Prefix used in feature keys.
    pub fn machine_name(&self) -> &'static str {
        match self {
            HandshakePhase::Waiting => "WAITING",
            HandshakePhase::ClientKeyExchange => "CLIENT_KEY_EXCHANGE",
            HandshakePhase::ChangeCipherSpec => "CHANGE_CIPHER_SPEC",
            HandshakePhase::Finished => "FINISHED",
            HandshakePhase::Alert => "ALERT",
            HandshakePhase::Disconnected => "DISCONNECTED",
        }
    }

    /// What a server packet observed in this phase is, for the field dictionary.
    pub fn description(&self) -> &'static str {
        match self {
            HandshakePhase::Waiting => "message received in the unreachable waiting state",
            HandshakePhase::ClientKeyExchange => "Client Key Exchange TCP Acknowledgement",
            HandshakePhase::ChangeCipherSpec => "Change Cipher Spec TCP Acknowledgement",
            HandshakePhase::Finished => "Client Finished TCP Acknowledgement",
            HandshakePhase::Alert => "TLS Alert",
            HandshakePhase::Disconnected => "TCP Disconnect",
        }
    }
}

impl fmt::Display for HandshakePhase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.machine_name())
    }
}

#[derive(Debug)]
pub struct PhaseMachine {
    phase: HandshakePhase,
    phase_ordinal: u64,
    received_ordinal: u64,
}

impl Default for PhaseMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl PhaseMachine {
    pub fn new() -> Self {
        Self {
            phase: HandshakePhase::Waiting,
            phase_ordinal: 0,
            received_ordinal: 0,
        }
    }

    pub fn phase(&self) -> HandshakePhase {
        self.phase
    }

    /// Number of feature-bearing server packets seen in the current phase.
    pub fn phase_ordinal(&self) -> u64 {
        self.phase_ordinal
    }

    /// Number of feature-bearing server packets seen in the whole session.
    pub fn received_ordinal(&self) -> u64 {
        self.received_ordinal
    }

    pub fn on_client_packet(&mut self, packet: &Packet) {
        if packet.is_handshake(&HandshakeMessage::ClientKeyExchange) {
            self.request_transition(HandshakePhase::ClientKeyExchange);
        }
        if packet.carries_change_cipher_spec() {
            self.request_transition(HandshakePhase::ChangeCipherSpec);
        }
        if packet.is_handshake(&HandshakeMessage::EncryptedHandshakeMessage) {
            self.request_transition(HandshakePhase::Finished);
        }
        if packet.closes_connection() {
            self.request_transition(HandshakePhase::Disconnected);
        }
    }

    /// The server's own Change Cipher Spec / Finished never move the phase; any TLS
    /// record after the key exchange counts as the alert phase.
    pub fn on_server_packet(&mut self, packet: &Packet) {
        if self.phase != HandshakePhase::Waiting && packet.has_record_layer() {
            self.request_transition(HandshakePhase::Alert);
        }
        if packet.closes_connection() {
            self.request_transition(HandshakePhase::Disconnected);
        }
    }

    pub fn request_transition(&mut self, new_phase: HandshakePhase) {
        // Nothing leaves the disconnected state, regardless of late TLS messages.
        if self.phase == HandshakePhase::Disconnected {
            return;
        }

        if self.phase != new_phase {
            log::debug!("Phase {} -> {}", self.phase, new_phase);
            self.phase_ordinal = 0;
        }
        self.phase = new_phase;
    }

    pub fn increment(&mut self) {
        self.phase_ordinal += 1;
        self.received_ordinal += 1;
    }
}
