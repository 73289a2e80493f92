use super::{U2fHidError, message::Message, types::*};
use crate::config::{CHANNEL_TIMEOUT_SECS, RECV_TIMEOUT_MS};
use rand::{Rng, SeedableRng, rngs::StdRng};
use std::collections::HashMap;
use std::time::{Duration, Instant};

pub enum ChannelState {
    Idle {
        last_activity: Instant,
    },
    Receiving {
        cmd: u8,
        bcnt: u16,
        buf: Vec<u8>,
        next_seq: u8,
        deadline: Instant,
    },
}

/// Allocates channel ids and holds the per-channel reassembly state machine.
pub struct ChannelManager {
    channels: HashMap<u32, ChannelState>,
    max_channels: usize,
    rng: StdRng,
}

impl ChannelManager {
    pub fn new(max_channels: usize) -> Self {
        Self {
            channels: HashMap::new(),
            max_channels,
            rng: StdRng::from_entropy(),
        }
    }

    /// Mint a fresh cid: random draw, rejecting the reserved and broadcast
    /// values and every currently live cid.
    pub fn allocate(&mut self) -> Result<u32, U2fHidError> {
        self.reap_idle();
        if self.channels.len() >= self.max_channels {
            return Err(U2fHidError::TableFull);
        }
        loop {
            let cid: u32 = self.rng.gen();
            if cid != RESERVED_CID && cid != BROADCAST_CID && !self.channels.contains_key(&cid) {
                self.channels.insert(
                    cid,
                    ChannelState::Idle {
                        last_activity: Instant::now(),
                    },
                );
                return Ok(cid);
            }
        }
    }

    pub fn is_allocated(&self, cid: u32) -> bool {
        self.channels.contains_key(&cid)
    }

    /// True if some other channel is mid-reassembly; the device services one
    /// transaction at a time.
    pub fn receiving_elsewhere(&self, cid: u32) -> bool {
        self.channels
            .iter()
            .any(|(c, s)| *c != cid && matches!(s, ChannelState::Receiving { .. }))
    }

    fn set_idle(&mut self, cid: u32) {
        if let Some(state) = self.channels.get_mut(&cid) {
            *state = ChannelState::Idle {
                last_activity: Instant::now(),
            };
        }
    }

    /// Init packet on an allocated channel: starts (or restarts) a message.
    pub fn feed_init(
        &mut self,
        cid: u32,
        cmd: u8,
        bcnt: u16,
        data: Vec<u8>,
    ) -> Result<Option<Message>, U2fHidError> {
        if bcnt as usize > MAX_MESSAGE_SIZE {
            return Err(U2fHidError::InvalidLen(bcnt));
        }
        if !self.channels.contains_key(&cid) {
            return Err(U2fHidError::UnknownChannel(cid));
        }

        if bcnt as usize <= INIT_DATA_SIZE {
            // Fits in the init frame; parse already truncated data to bcnt.
            self.set_idle(cid);
            return Ok(Some(Message::with_payload(cid, cmd, data)));
        }

        // Multi-frame: an init while Receiving aborts the previous transaction.
        let deadline = Instant::now() + Duration::from_millis(RECV_TIMEOUT_MS);
        self.channels.insert(
            cid,
            ChannelState::Receiving {
                cmd,
                bcnt,
                buf: data,
                next_seq: 0,
                deadline,
            },
        );
        Ok(None)
    }

    /// Continuation packet: sequence must be the next expected one; the
    /// reassembly deadline is refreshed on every accepted frame.
    pub fn feed_cont(
        &mut self,
        cid: u32,
        seq: u8,
        data: Vec<u8>,
    ) -> Result<Option<Message>, U2fHidError> {
        let state = self
            .channels
            .get_mut(&cid)
            .ok_or(U2fHidError::UnknownChannel(cid))?;

        match state {
            ChannelState::Idle { .. } => Err(U2fHidError::UnexpectedCont),
            ChannelState::Receiving {
                cmd,
                bcnt,
                buf,
                next_seq,
                deadline,
            } => {
                if seq != *next_seq {
                    let err = U2fHidError::BadSeq {
                        got: seq,
                        want: *next_seq,
                    };
                    self.set_idle(cid);
                    return Err(err);
                }
                *next_seq += 1;
                *deadline = Instant::now() + Duration::from_millis(RECV_TIMEOUT_MS);

                // Bytes past bcnt are frame padding.
                let remaining = *bcnt as usize - buf.len();
                let take = remaining.min(data.len());
                buf.extend_from_slice(&data[..take]);

                if buf.len() == *bcnt as usize {
                    let cmd = *cmd;
                    let payload = std::mem::take(buf);
                    self.set_idle(cid);
                    Ok(Some(Message::with_payload(cid, cmd, payload)))
                } else {
                    Ok(None)
                }
            }
        }
    }

    /// Earliest reassembly deadline over all Receiving channels, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.channels
            .values()
            .filter_map(|s| match s {
                ChannelState::Receiving { deadline, .. } => Some(*deadline),
                ChannelState::Idle { .. } => None,
            })
            .min()
    }

    /// Abort every reassembly whose deadline has passed; returns the affected
    /// cids so the dispatcher can emit ERR_MSG_TIMEOUT for each.
    pub fn take_expired(&mut self, now: Instant) -> Vec<u32> {
        let expired: Vec<u32> = self
            .channels
            .iter()
            .filter_map(|(cid, s)| match s {
                ChannelState::Receiving { deadline, .. } if *deadline <= now => Some(*cid),
                _ => None,
            })
            .collect();
        for cid in &expired {
            self.set_idle(*cid);
        }
        expired
    }

    fn reap_idle(&mut self) {
        let timeout = Duration::from_secs(CHANNEL_TIMEOUT_SECS);
        self.channels.retain(|_, state| match state {
            ChannelState::Idle { last_activity } => last_activity.elapsed() < timeout,
            ChannelState::Receiving { .. } => true,
        });
    }
}
