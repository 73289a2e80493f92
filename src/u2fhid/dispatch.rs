use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::sleep_until;

use super::{
    channel::ChannelManager,
    message::Message,
    packet::{self, Packet},
    types::*,
};
use crate::config::MAX_CHANNELS;
use crate::counter::CounterError;
use crate::u2f::Authenticator;

/// The event loop: 64-byte frames in, frames out. All assembly, crypto and
/// response emission for one frame run to completion before the next frame
/// is taken, so per-channel state needs no locking. Returns on a fatal fault
/// (counter persistence) or when the inbound channel closes.
pub async fn run_u2fhid_loop(
    mut incoming_rx: mpsc::Receiver<[u8; FRAME_SIZE]>,
    outgoing_tx: mpsc::Sender<[u8; FRAME_SIZE]>,
    mut authenticator: Authenticator,
) -> Result<(), CounterError> {
    let mut channels = ChannelManager::new(MAX_CHANNELS);
    tracing::info!("U2FHID loop running");

    loop {
        let deadline = channels.next_deadline().map(tokio::time::Instant::from_std);
        // The dummy fallback is never polled; the branch is disabled when no
        // reassembly is in flight.
        let sleep_target = deadline
            .unwrap_or_else(|| tokio::time::Instant::now() + Duration::from_secs(3600));

        let frames = tokio::select! {
            maybe_frame = incoming_rx.recv() => {
                let Some(frame) = maybe_frame else { break };
                let mut out = abort_expired(&mut channels);
                out.extend(process_frame(&mut channels, &mut authenticator, &frame)?);
                out
            }
            _ = sleep_until(sleep_target), if deadline.is_some() => {
                abort_expired(&mut channels)
            }
        };

        for frame in frames {
            if outgoing_tx.send(frame).await.is_err() {
                tracing::error!("Outgoing channel closed");
                return Ok(());
            }
        }
    }
    tracing::info!("U2FHID loop exiting (incoming channel closed)");
    Ok(())
}

fn error_frames(cid: u32, code: u8) -> Vec<[u8; FRAME_SIZE]> {
    Message::error(cid, code).frames().collect()
}

/// ERR_MSG_TIMEOUT for every reassembly past its deadline.
fn abort_expired(channels: &mut ChannelManager) -> Vec<[u8; FRAME_SIZE]> {
    let mut out = Vec::new();
    for cid in channels.take_expired(Instant::now()) {
        tracing::warn!(cid = format!("{cid:#010x}"), "Reassembly timed out");
        out.extend(error_frames(cid, ERR_MSG_TIMEOUT));
    }
    out
}

fn process_frame(
    channels: &mut ChannelManager,
    authenticator: &mut Authenticator,
    frame: &[u8; FRAME_SIZE],
) -> Result<Vec<[u8; FRAME_SIZE]>, CounterError> {
    let packet = match packet::parse(frame) {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!("Dropping unparseable frame: {e}");
            return Ok(vec![]);
        }
    };

    match packet {
        Packet::Init(init) => {
            tracing::debug!(
                cid = format!("{:#010x}", init.cid),
                cmd = format!("{:#04x}", init.cmd),
                bcnt = init.bcnt,
                "init frame"
            );

            if init.cid == RESERVED_CID {
                tracing::warn!("Rejected reserved CID");
                return Ok(error_frames(BROADCAST_CID, ERR_INVALID_CID));
            }

            // The broadcast channel is stateless and only speaks INIT.
            if init.cid == BROADCAST_CID {
                if init.cmd != CMD_INIT {
                    tracing::warn!(
                        cmd = format!("{:#04x}", init.cmd),
                        "Non-INIT command on broadcast CID"
                    );
                    return Ok(error_frames(BROADCAST_CID, ERR_INVALID_CID));
                }
                let msg = Message::with_payload(BROADCAST_CID, CMD_INIT, init.data);
                return dispatch_message(channels, authenticator, msg);
            }

            if !channels.is_allocated(init.cid) {
                tracing::warn!(cid = format!("{:#010x}", init.cid), "Unknown CID");
                return Ok(error_frames(init.cid, ERR_INVALID_CID));
            }
            if channels.receiving_elsewhere(init.cid) {
                tracing::warn!(
                    cid = format!("{:#010x}", init.cid),
                    "Another transaction is in flight"
                );
                return Ok(error_frames(init.cid, ERR_CHANNEL_BUSY));
            }

            match channels.feed_init(init.cid, init.cmd, init.bcnt, init.data) {
                Ok(Some(msg)) => dispatch_message(channels, authenticator, msg),
                Ok(None) => Ok(vec![]),
                Err(e) => {
                    tracing::warn!(cid = format!("{:#010x}", init.cid), "feed_init error: {e}");
                    Ok(error_frames(init.cid, e.code()))
                }
            }
        }
        Packet::Cont(cont) => {
            tracing::debug!(
                cid = format!("{:#010x}", cont.cid),
                seq = cont.seq,
                "cont frame"
            );

            if cont.cid == BROADCAST_CID || cont.cid == RESERVED_CID {
                tracing::warn!(cid = format!("{:#010x}", cont.cid), "Cont on invalid CID");
                return Ok(error_frames(cont.cid, ERR_INVALID_CID));
            }
            if !channels.is_allocated(cont.cid) {
                return Ok(error_frames(cont.cid, ERR_INVALID_CID));
            }

            match channels.feed_cont(cont.cid, cont.seq, cont.data) {
                Ok(Some(msg)) => dispatch_message(channels, authenticator, msg),
                Ok(None) => Ok(vec![]),
                Err(e) => {
                    tracing::warn!(cid = format!("{:#010x}", cont.cid), "feed_cont error: {e}");
                    Ok(error_frames(cont.cid, e.code()))
                }
            }
        }
    }
}

fn dispatch_message(
    channels: &mut ChannelManager,
    authenticator: &mut Authenticator,
    msg: Message,
) -> Result<Vec<[u8; FRAME_SIZE]>, CounterError> {
    match msg.cmd {
        CMD_INIT => Ok(handle_init(channels, &msg)),
        CMD_PING => {
            tracing::debug!(
                cid = format!("{:#010x}", msg.cid),
                len = msg.payload().len(),
                "PING"
            );
            let pong = Message::with_payload(msg.cid, CMD_PING, msg.payload().to_vec());
            Ok(pong.frames().collect())
        }
        CMD_MSG => {
            let body = authenticator.handle_msg(msg.payload())?;
            let reply = Message::with_payload(msg.cid, CMD_MSG, body);
            Ok(reply.frames().collect())
        }
        CMD_WINK => {
            tracing::info!(cid = format!("{:#010x}", msg.cid), "WINK");
            Ok(Message::new(msg.cid, CMD_WINK).frames().collect())
        }
        CMD_LOCK => {
            tracing::debug!(cid = format!("{:#010x}", msg.cid), "LOCK not supported");
            Ok(error_frames(msg.cid, ERR_INVALID_CMD))
        }
        cmd => {
            tracing::warn!(
                cid = format!("{:#010x}", msg.cid),
                cmd = format!("{:#04x}", cmd),
                "Unknown command"
            );
            Ok(error_frames(msg.cid, ERR_INVALID_CMD))
        }
    }
}

/// INIT on broadcast mints a channel; INIT on an allocated cid resyncs it
/// (hosts do this to recover a wedged conversation). Either way the reply
/// goes out on the cid the request arrived on.
fn handle_init(channels: &mut ChannelManager, msg: &Message) -> Vec<[u8; FRAME_SIZE]> {
    if msg.payload().len() != INIT_NONCE_SIZE {
        tracing::warn!("INIT payload is {} bytes, expected 8", msg.payload().len());
        return error_frames(msg.cid, ERR_INVALID_PAR);
    }

    let cid = if msg.cid == BROADCAST_CID {
        match channels.allocate() {
            Ok(cid) => {
                tracing::info!(cid = format!("{cid:#010x}"), "Allocated new channel");
                cid
            }
            Err(_) => {
                tracing::warn!("All channels busy, rejecting INIT");
                return error_frames(BROADCAST_CID, ERR_CHANNEL_BUSY);
            }
        }
    } else {
        tracing::debug!(cid = format!("{:#010x}", msg.cid), "Channel resync");
        msg.cid
    };

    let mut response = [0u8; INIT_RESPONSE_SIZE];
    response[0..8].copy_from_slice(&msg.payload()[0..8]);
    response[8..12].copy_from_slice(&cid.to_be_bytes());
    response[12] = PROTOCOL_VERSION;
    response[13] = DEVICE_VERSION_MAJOR;
    response[14] = DEVICE_VERSION_MINOR;
    response[15] = DEVICE_VERSION_BUILD;
    response[16] = CAPABILITIES;

    Message::with_payload(msg.cid, CMD_INIT, response.to_vec())
        .frames()
        .collect()
}
