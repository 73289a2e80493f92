use super::packet::{encode_cont, encode_init};
use super::types::*;

/// One logical U2FHID PDU. Stored as a flat payload buffer; the wire
/// representation (one init frame plus continuations) is produced on demand
/// by [`Message::frames`].
pub struct Message {
    pub cid: u32,
    pub cmd: u8,
    payload: Vec<u8>,
}

impl Message {
    pub fn new(cid: u32, cmd: u8) -> Self {
        Self {
            cid,
            cmd,
            payload: Vec::new(),
        }
    }

    pub fn with_payload(cid: u32, cmd: u8, payload: Vec<u8>) -> Self {
        debug_assert!(payload.len() <= MAX_MESSAGE_SIZE);
        Self { cid, cmd, payload }
    }

    /// Single-byte CMD_ERROR message.
    pub fn error(cid: u32, code: u8) -> Self {
        Self::with_payload(cid, CMD_ERROR, vec![code])
    }

    pub fn append(&mut self, bytes: &[u8]) {
        debug_assert!(self.payload.len() + bytes.len() <= MAX_MESSAGE_SIZE);
        self.payload.extend_from_slice(bytes);
    }

    pub fn bcnt(&self) -> u16 {
        self.payload.len() as u16
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Lazily emit the init frame, then continuations with seq 0, 1, 2, …
    pub fn frames(&self) -> Frames<'_> {
        Frames {
            msg: self,
            offset: 0,
            next_seq: 0,
            init_sent: false,
        }
    }
}

pub struct Frames<'a> {
    msg: &'a Message,
    offset: usize,
    next_seq: u8,
    init_sent: bool,
}

impl Iterator for Frames<'_> {
    type Item = [u8; FRAME_SIZE];

    fn next(&mut self) -> Option<Self::Item> {
        let payload = self.msg.payload();
        if !self.init_sent {
            self.init_sent = true;
            let head = payload.len().min(INIT_DATA_SIZE);
            self.offset = head;
            return Some(encode_init(
                self.msg.cid,
                self.msg.cmd,
                self.msg.bcnt(),
                &payload[..head],
            ));
        }
        if self.offset >= payload.len() {
            return None;
        }
        let chunk = (payload.len() - self.offset).min(CONT_DATA_SIZE);
        let frame = encode_cont(
            self.msg.cid,
            self.next_seq,
            &payload[self.offset..self.offset + chunk],
        );
        self.offset += chunk;
        self.next_seq = self.next_seq.wrapping_add(1);
        Some(frame)
    }
}
