//! Pull-based client protocol state machine.
//!
//! The handshake is server-initiated: the server pushes an init packet
//! (IV + timestamp) as soon as the connection opens, and only then can the
//! client derive its encryption context and send check results. The driver
//! owns the poll/act loop: it asks `wants_data()` / `has_data()` which
//! half-duplex operation is legal next, performs it, and feeds the outcome
//! back through `on_read` / `on_write`. The two predicates are mutually
//! exclusive, so the next legal action is always unambiguous.

use std::sync::Arc;

use log::debug;
use rand::RngCore;

use crate::crypto::{Cipher, EncryptionContext};
use crate::packet::{CheckResult, DEFAULT_PAYLOAD_LENGTH, InitPacket, data_packet_length};

/// Supplies the session-constant secrets the protocol needs to derive its
/// encryption context from the server's init packet.
pub trait ClientHandler: Send + Sync {
    fn password(&self) -> &str;

    fn cipher(&self) -> Cipher;

    /// Size of the plugin output slot in outbound data packets.
    fn payload_length(&self) -> usize {
        DEFAULT_PAYLOAD_LENGTH
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Initial,
    Connected,
    GotHandshake,
    SentRequest,
    HasRequest,
    Done,
}

pub struct ClientProtocol {
    handler: Arc<dyn ClientHandler>,
    state: State,
    crypto: Option<EncryptionContext>,
    timestamp: u32,
    pending: Option<CheckResult>,
    inbound: Vec<u8>,
}

impl ClientProtocol {
    pub fn new(handler: Arc<dyn ClientHandler>) -> Self {
        Self {
            handler,
            state: State::Initial,
            crypto: None,
            timestamp: 0,
            pending: None,
            inbound: vec![],
        }
    }

    pub fn on_connect(&mut self) {
        self.state = State::Connected;
    }

    /// Queues `result` as the pending outbound payload. From `SentRequest`
    /// this re-enters `HasRequest`, pipelining another submission over the
    /// already-established encrypted channel; otherwise the session drops
    /// back to `Connected` and the handshake gate applies.
    pub fn prepare_request(&mut self, result: CheckResult) {
        if self.state == State::SentRequest {
            self.state = State::HasRequest;
        } else {
            self.state = State::Connected;
        }
        self.pending = Some(result);
    }

    /// True iff the server's init packet is still outstanding.
    pub fn wants_data(&self) -> bool {
        self.state == State::Connected
    }

    /// True iff an encrypted data packet is ready to send.
    pub fn has_data(&self) -> bool {
        self.state == State::GotHandshake || self.state == State::HasRequest
    }

    /// Buffer for the fixed-length init packet; the driver fills it with a
    /// deadline-raced read and then calls [`Self::on_read`].
    pub fn get_inbound(&mut self) -> &mut [u8] {
        self.inbound = vec![0u8; InitPacket::LENGTH];
        &mut self.inbound
    }

    /// Parses the init packet and derives the encryption context. Fails the
    /// session on a short or malformed handshake message.
    pub fn on_read(&mut self, bytes_transferred: usize) -> std::io::Result<()> {
        let init = InitPacket::decode(&self.inbound[..bytes_transferred])?;
        self.crypto = Some(EncryptionContext::new(
            self.handler.password(),
            self.handler.cipher(),
            &init.iv,
        )?);
        self.timestamp = init.timestamp;
        debug!("handshake complete, server timestamp {}", init.timestamp);
        self.state = State::GotHandshake;
        Ok(())
    }

    /// Serializes the pending check result over a fresh random pad,
    /// encrypts it in place and returns it for transmission. Only legal
    /// while [`Self::has_data`] is true.
    pub fn get_outbound(&mut self) -> std::io::Result<Vec<u8>> {
        let crypto = self.crypto.as_ref().ok_or_else(|| {
            std::io::Error::other("get_outbound called before handshake completed")
        })?;
        let pending = self
            .pending
            .as_ref()
            .ok_or_else(|| std::io::Error::other("no pending check result"))?;

        let mut buffer = vec![0u8; data_packet_length(self.handler.payload_length())];
        rand::rng().fill_bytes(&mut buffer);
        pending.encode_into(&mut buffer, self.timestamp)?;
        crypto.encrypt_in_place(&mut buffer);
        Ok(buffer)
    }

    pub fn on_write(&mut self, _bytes_transferred: usize) {
        self.state = State::SentRequest;
    }

    /// Terminal driver status: the exchange succeeded.
    pub fn get_response(&self) -> bool {
        true
    }

    /// Terminal driver status: the exchange timed out.
    pub fn get_timeout_response(&self) -> bool {
        false
    }

    /// Entered by the driver on connection teardown; never produced by an
    /// internal transition.
    pub fn mark_done(&mut self) {
        self.state = State::Done;
    }

    pub fn is_done(&self) -> bool {
        self.state == State::Done
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::TRANSMITTED_IV_LENGTH;

    struct TestHandler;

    impl ClientHandler for TestHandler {
        fn password(&self) -> &str {
            "secret"
        }

        fn cipher(&self) -> Cipher {
            Cipher::Xor
        }
    }

    fn new_protocol() -> ClientProtocol {
        ClientProtocol::new(Arc::new(TestHandler))
    }

    fn check_result() -> CheckResult {
        CheckResult {
            host: "web01".to_string(),
            service: "load".to_string(),
            code: 1,
            output: "WARNING - load average: 8.01".to_string(),
        }
    }

    fn run_handshake(protocol: &mut ClientProtocol) {
        let init = InitPacket {
            iv: [0x42; TRANSMITTED_IV_LENGTH],
            timestamp: 1700000000,
        };
        let encoded = init.encode();
        let inbound = protocol.get_inbound();
        assert_eq!(inbound.len(), InitPacket::LENGTH);
        inbound.copy_from_slice(&encoded);
        protocol.on_read(encoded.len()).unwrap();
    }

    #[test]
    fn test_handshake_before_send() {
        let mut protocol = new_protocol();
        protocol.prepare_request(check_result());
        protocol.on_connect();

        // Server-initiated handshake: read first, never send.
        assert!(protocol.wants_data());
        assert!(!protocol.has_data());

        run_handshake(&mut protocol);
        assert!(!protocol.wants_data());
        assert!(protocol.has_data());
    }

    #[test]
    fn test_pipelined_resubmission() {
        let mut protocol = new_protocol();
        protocol.prepare_request(check_result());
        protocol.on_connect();
        run_handshake(&mut protocol);

        let first = protocol.get_outbound().unwrap();
        protocol.on_write(first.len());
        assert!(!protocol.has_data());
        assert!(!protocol.wants_data());

        // A second result re-enters the sending state without another
        // handshake.
        let mut second_result = check_result();
        second_result.service = "disk".to_string();
        protocol.prepare_request(second_result);
        assert!(protocol.has_data());
        assert!(!protocol.wants_data());
        protocol.get_outbound().unwrap();
    }

    #[test]
    fn test_outbound_packet_decrypts_to_pending_result() {
        let mut protocol = new_protocol();
        protocol.prepare_request(check_result());
        protocol.on_connect();
        run_handshake(&mut protocol);

        let mut outbound = protocol.get_outbound().unwrap();
        assert_eq!(outbound.len(), data_packet_length(DEFAULT_PAYLOAD_LENGTH));

        let context =
            EncryptionContext::new("secret", Cipher::Xor, &[0x42; TRANSMITTED_IV_LENGTH]).unwrap();
        context.decrypt_in_place(&mut outbound);
        let (decoded, timestamp) = CheckResult::decode(&outbound).unwrap();
        assert_eq!(decoded, check_result());
        assert_eq!(timestamp, 1700000000);
    }

    #[test]
    fn test_outbound_before_handshake_is_an_error() {
        let mut protocol = new_protocol();
        protocol.prepare_request(check_result());
        protocol.on_connect();
        assert!(protocol.get_outbound().is_err());
    }

    #[test]
    fn test_short_handshake_fails_session() {
        let mut protocol = new_protocol();
        protocol.on_connect();
        protocol.get_inbound();
        assert!(protocol.on_read(10).is_err());
    }

    #[test]
    fn test_terminal_status_reporters() {
        let mut protocol = new_protocol();
        assert!(protocol.get_response());
        assert!(!protocol.get_timeout_response());

        assert!(!protocol.is_done());
        protocol.mark_done();
        assert!(protocol.is_done());
        assert!(!protocol.wants_data());
        assert!(!protocol.has_data());
    }
}
