use keyfob::counter::Counter;
use keyfob::crypto::{Attestation, KeyWrap};
use keyfob::u2f::Authenticator;
use keyfob::u2fhid::{run_u2fhid_loop, types::*};
use keyfob::up::AlwaysPresent;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio::time::{Duration, timeout};

type FrameTx = mpsc::Sender<[u8; 64]>;
type FrameRx = mpsc::Receiver<[u8; 64]>;

fn spawn_authenticator() -> (FrameTx, FrameRx, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let wrap = KeyWrap::new(&[0x42u8; 32]);
    let attestation = Attestation::load_or_create(dir.path()).unwrap();
    let counter = Counter::open(dir.path().join("counter.bin")).unwrap();
    let authenticator = Authenticator::new(wrap, attestation, counter, Box::new(AlwaysPresent));

    let (incoming_tx, incoming_rx) = mpsc::channel::<[u8; 64]>(16);
    let (outgoing_tx, outgoing_rx) = mpsc::channel::<[u8; 64]>(16);
    tokio::spawn(run_u2fhid_loop(incoming_rx, outgoing_tx, authenticator));

    (incoming_tx, outgoing_rx, dir)
}

fn make_init_frame(cid: u32, cmd: u8, bcnt: usize, chunk: &[u8]) -> [u8; 64] {
    let mut frame = [0u8; 64];
    frame[0..4].copy_from_slice(&cid.to_be_bytes());
    frame[4] = cmd;
    frame[5..7].copy_from_slice(&(bcnt as u16).to_be_bytes());
    frame[7..7 + chunk.len()].copy_from_slice(chunk);
    frame
}

fn make_cont_frame(cid: u32, seq: u8, chunk: &[u8]) -> [u8; 64] {
    let mut frame = [0u8; 64];
    frame[0..4].copy_from_slice(&cid.to_be_bytes());
    frame[4] = seq;
    frame[5..5 + chunk.len()].copy_from_slice(chunk);
    frame
}

async fn send_message(tx: &FrameTx, cid: u32, cmd: u8, payload: &[u8]) {
    let head = payload.len().min(57);
    tx.send(make_init_frame(cid, cmd, payload.len(), &payload[..head]))
        .await
        .unwrap();
    let mut offset = head;
    let mut seq = 0u8;
    while offset < payload.len() {
        let chunk = (payload.len() - offset).min(59);
        tx.send(make_cont_frame(cid, seq, &payload[offset..offset + chunk]))
            .await
            .unwrap();
        offset += chunk;
        seq += 1;
    }
}

async fn recv_frame(rx: &mut FrameRx) -> [u8; 64] {
    timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for a frame")
        .expect("outgoing channel closed")
}

/// Read one complete message: an init frame plus its continuations.
async fn recv_message(rx: &mut FrameRx) -> (u32, u8, Vec<u8>) {
    let first = recv_frame(rx).await;
    let cid = u32::from_be_bytes(first[0..4].try_into().unwrap());
    let cmd = first[4];
    assert!(cmd & CMD_MASK != 0, "response must start with an init frame");
    let bcnt = u16::from_be_bytes([first[5], first[6]]) as usize;

    let mut payload = first[7..7 + bcnt.min(57)].to_vec();
    let mut expect_seq = 0u8;
    while payload.len() < bcnt {
        let frame = recv_frame(rx).await;
        assert_eq!(u32::from_be_bytes(frame[0..4].try_into().unwrap()), cid);
        assert_eq!(frame[4], expect_seq, "continuation seq must be in order");
        expect_seq += 1;
        let take = (bcnt - payload.len()).min(59);
        payload.extend_from_slice(&frame[5..5 + take]);
    }
    (cid, cmd, payload)
}

async fn open_channel(tx: &FrameTx, rx: &mut FrameRx) -> u32 {
    send_message(tx, BROADCAST_CID, CMD_INIT, &[0xA5u8; 8]).await;
    let (_, _, payload) = recv_message(rx).await;
    u32::from_be_bytes(payload[8..12].try_into().unwrap())
}

#[tokio::test]
async fn test_init_handshake() {
    let (tx, mut rx, _dir) = spawn_authenticator();

    let nonce = [0x00u8, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07];
    send_message(&tx, BROADCAST_CID, CMD_INIT, &nonce).await;

    let (cid, cmd, payload) = recv_message(&mut rx).await;
    assert_eq!(cid, BROADCAST_CID, "reply rides the broadcast channel");
    assert_eq!(cmd, CMD_INIT);
    assert_eq!(payload.len(), 17);
    assert_eq!(&payload[0..8], &nonce, "nonce must be echoed");

    let new_cid = u32::from_be_bytes(payload[8..12].try_into().unwrap());
    assert_ne!(new_cid, RESERVED_CID);
    assert_ne!(new_cid, BROADCAST_CID);

    assert_eq!(payload[12], PROTOCOL_VERSION);
    assert_eq!(payload[13], DEVICE_VERSION_MAJOR);
    assert_eq!(payload[14], DEVICE_VERSION_MINOR);
    assert_eq!(payload[15], DEVICE_VERSION_BUILD);
    assert_eq!(payload[16], CAPABILITIES);
}

#[tokio::test]
async fn test_init_mints_distinct_channels() {
    let (tx, mut rx, _dir) = spawn_authenticator();
    let first = open_channel(&tx, &mut rx).await;
    let second = open_channel(&tx, &mut rx).await;
    assert_ne!(first, second);
}

#[tokio::test]
async fn test_ping_multi_frame_roundtrip() {
    let (tx, mut rx, _dir) = spawn_authenticator();
    let cid = open_channel(&tx, &mut rx).await;

    let payload = vec![0xABu8; 200];
    send_message(&tx, cid, CMD_PING, &payload).await;

    // 200 bytes come back as one init frame and three continuations
    // carrying 57, 59, 59 and 25 payload bytes.
    let first = recv_frame(&mut rx).await;
    assert_eq!(first[4], CMD_PING);
    assert_eq!(u16::from_be_bytes([first[5], first[6]]), 200);

    let mut echoed = first[7..64].to_vec();
    for expect_seq in 0..3u8 {
        let frame = recv_frame(&mut rx).await;
        assert_eq!(frame[4], expect_seq);
        echoed.extend_from_slice(&frame[5..64]);
    }
    echoed.truncate(200);
    assert_eq!(echoed, payload);
}

#[tokio::test]
async fn test_reassembly_timeout() {
    let (tx, mut rx, _dir) = spawn_authenticator();
    let cid = open_channel(&tx, &mut rx).await;

    // Promise 200 bytes, deliver only the init frame.
    tx.send(make_init_frame(cid, CMD_PING, 200, &[0xCDu8; 57]))
        .await
        .unwrap();

    let (err_cid, cmd, payload) = recv_message(&mut rx).await;
    assert_eq!(err_cid, cid);
    assert_eq!(cmd, CMD_ERROR);
    assert_eq!(payload, vec![ERR_MSG_TIMEOUT]);
}

#[tokio::test]
async fn test_cont_without_transaction_is_invalid_seq() {
    let (tx, mut rx, _dir) = spawn_authenticator();
    let cid = open_channel(&tx, &mut rx).await;

    tx.send(make_cont_frame(cid, 0, &[0u8; 59])).await.unwrap();

    let (_, cmd, payload) = recv_message(&mut rx).await;
    assert_eq!(cmd, CMD_ERROR);
    assert_eq!(payload, vec![ERR_INVALID_SEQ]);
}

#[tokio::test]
async fn test_out_of_order_cont_is_invalid_seq() {
    let (tx, mut rx, _dir) = spawn_authenticator();
    let cid = open_channel(&tx, &mut rx).await;

    tx.send(make_init_frame(cid, CMD_PING, 200, &[0u8; 57]))
        .await
        .unwrap();
    tx.send(make_cont_frame(cid, 1, &[0u8; 59])).await.unwrap();

    let (_, cmd, payload) = recv_message(&mut rx).await;
    assert_eq!(cmd, CMD_ERROR);
    assert_eq!(payload, vec![ERR_INVALID_SEQ]);
}

#[tokio::test]
async fn test_unknown_command_rejected() {
    let (tx, mut rx, _dir) = spawn_authenticator();
    let cid = open_channel(&tx, &mut rx).await;

    send_message(&tx, cid, 0xFE, &[]).await;

    let (_, cmd, payload) = recv_message(&mut rx).await;
    assert_eq!(cmd, CMD_ERROR);
    assert_eq!(payload, vec![ERR_INVALID_CMD]);
}

#[tokio::test]
async fn test_lock_rejected() {
    let (tx, mut rx, _dir) = spawn_authenticator();
    let cid = open_channel(&tx, &mut rx).await;

    send_message(&tx, cid, CMD_LOCK, &[5]).await;

    let (_, cmd, payload) = recv_message(&mut rx).await;
    assert_eq!(cmd, CMD_ERROR);
    assert_eq!(payload, vec![ERR_INVALID_CMD]);
}

#[tokio::test]
async fn test_wink_acknowledged() {
    let (tx, mut rx, _dir) = spawn_authenticator();
    let cid = open_channel(&tx, &mut rx).await;

    send_message(&tx, cid, CMD_WINK, &[]).await;

    let (wink_cid, cmd, payload) = recv_message(&mut rx).await;
    assert_eq!(wink_cid, cid);
    assert_eq!(cmd, CMD_WINK);
    assert!(payload.is_empty());
}

#[tokio::test]
async fn test_unknown_cid_rejected() {
    let (tx, mut rx, _dir) = spawn_authenticator();
    let _ = open_channel(&tx, &mut rx).await;

    send_message(&tx, 0x1234_5678, CMD_PING, b"hello").await;

    let (cid, cmd, payload) = recv_message(&mut rx).await;
    assert_eq!(cid, 0x1234_5678);
    assert_eq!(cmd, CMD_ERROR);
    assert_eq!(payload, vec![ERR_INVALID_CID]);
}

#[tokio::test]
async fn test_short_init_payload_is_invalid_par() {
    let (tx, mut rx, _dir) = spawn_authenticator();

    send_message(&tx, BROADCAST_CID, CMD_INIT, &[0u8; 4]).await;

    let (_, cmd, payload) = recv_message(&mut rx).await;
    assert_eq!(cmd, CMD_ERROR);
    assert_eq!(payload, vec![ERR_INVALID_PAR]);
}

#[tokio::test]
async fn test_second_transaction_is_busy() {
    let (tx, mut rx, _dir) = spawn_authenticator();
    let first = open_channel(&tx, &mut rx).await;
    let second = open_channel(&tx, &mut rx).await;

    // Start a multi-frame transaction on the first channel…
    tx.send(make_init_frame(first, CMD_PING, 200, &[0u8; 57]))
        .await
        .unwrap();
    // …then try to open another one on the second.
    tx.send(make_init_frame(second, CMD_PING, 8, &[0u8; 8]))
        .await
        .unwrap();

    let (busy_cid, cmd, payload) = recv_message(&mut rx).await;
    assert_eq!(busy_cid, second);
    assert_eq!(cmd, CMD_ERROR);
    assert_eq!(payload, vec![ERR_CHANNEL_BUSY]);
}

#[tokio::test]
async fn test_init_resyncs_allocated_channel() {
    let (tx, mut rx, _dir) = spawn_authenticator();
    let cid = open_channel(&tx, &mut rx).await;

    let nonce = [0x77u8; 8];
    send_message(&tx, cid, CMD_INIT, &nonce).await;

    let (resync_cid, cmd, payload) = recv_message(&mut rx).await;
    assert_eq!(resync_cid, cid, "resync replies on the same channel");
    assert_eq!(cmd, CMD_INIT);
    assert_eq!(&payload[0..8], &nonce);
    assert_eq!(
        u32::from_be_bytes(payload[8..12].try_into().unwrap()),
        cid,
        "resync keeps the cid"
    );
}
