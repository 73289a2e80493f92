use super::{U2fHidError, types::*};

pub enum Packet {
    Init(InitPacket),
    Cont(ContPacket),
}

pub struct InitPacket {
    pub cid: u32,
    pub cmd: u8,
    pub bcnt: u16,
    pub data: Vec<u8>,
}

pub struct ContPacket {
    pub cid: u32,
    pub seq: u8,
    pub data: Vec<u8>,
}

/// Distinguish init vs cont by bit 7 of byte 4. The cmd byte is kept with
/// its top bit set, matching the wire values in `types`.
pub fn parse(frame: &[u8]) -> Result<Packet, U2fHidError> {
    if frame.len() != FRAME_SIZE {
        return Err(U2fHidError::InvalidFrame(frame.len()));
    }
    let cid = u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]);
    let marker = frame[4];

    if marker & CMD_MASK != 0 {
        let bcnt = u16::from_be_bytes([frame[5], frame[6]]);
        let take = (bcnt as usize).min(INIT_DATA_SIZE);
        let data = frame[7..7 + take].to_vec();
        Ok(Packet::Init(InitPacket {
            cid,
            cmd: marker,
            bcnt,
            data,
        }))
    } else {
        let seq = marker;
        let data = frame[5..5 + CONT_DATA_SIZE].to_vec();
        Ok(Packet::Cont(ContPacket { cid, seq, data }))
    }
}

/// Fixed-width init frame; `head.len() <= 57`, the rest is zero padding.
pub fn encode_init(cid: u32, cmd: u8, bcnt: u16, head: &[u8]) -> [u8; FRAME_SIZE] {
    debug_assert!(head.len() <= INIT_DATA_SIZE);
    let mut frame = [0u8; FRAME_SIZE];
    frame[0..4].copy_from_slice(&cid.to_be_bytes());
    frame[4] = cmd | CMD_MASK;
    frame[5..7].copy_from_slice(&bcnt.to_be_bytes());
    frame[7..7 + head.len()].copy_from_slice(head);
    frame
}

/// Fixed-width continuation frame; `seq <= 0x7F`, `tail.len() <= 59`.
pub fn encode_cont(cid: u32, seq: u8, tail: &[u8]) -> [u8; FRAME_SIZE] {
    debug_assert!(seq & CMD_MASK == 0);
    debug_assert!(tail.len() <= CONT_DATA_SIZE);
    let mut frame = [0u8; FRAME_SIZE];
    frame[0..4].copy_from_slice(&cid.to_be_bytes());
    frame[4] = seq;
    frame[5..5 + tail.len()].copy_from_slice(tail);
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rejects_short_frame() {
        let res = parse(&[0u8; 63]);
        assert!(matches!(res, Err(U2fHidError::InvalidFrame(63))));
    }

    #[test]
    fn test_init_frame_roundtrip() {
        let head = [0xABu8; 40];
        let frame = encode_init(0x0102_0304, CMD_PING, 200, &head);

        match parse(&frame).unwrap() {
            Packet::Init(init) => {
                assert_eq!(init.cid, 0x0102_0304);
                assert_eq!(init.cmd, CMD_PING);
                assert_eq!(init.bcnt, 200);
                // bcnt exceeds the head, so the full 57-byte area is taken
                assert_eq!(init.data.len(), INIT_DATA_SIZE);
                assert_eq!(&init.data[..40], &head[..]);
                assert!(init.data[40..].iter().all(|&b| b == 0));
            }
            Packet::Cont(_) => panic!("expected init packet"),
        }
    }

    #[test]
    fn test_cont_frame_roundtrip() {
        let tail = [0xCDu8; 59];
        let frame = encode_cont(0xDEAD_BEEF, 0x7F, &tail);

        match parse(&frame).unwrap() {
            Packet::Cont(cont) => {
                assert_eq!(cont.cid, 0xDEAD_BEEF);
                assert_eq!(cont.seq, 0x7F);
                assert_eq!(cont.data, tail);
            }
            Packet::Init(_) => panic!("expected cont packet"),
        }
    }

    #[test]
    fn test_short_bcnt_truncates_init_data() {
        let frame = encode_init(1, CMD_MSG, 5, &[1, 2, 3, 4, 5]);
        match parse(&frame).unwrap() {
            Packet::Init(init) => assert_eq!(init.data, vec![1, 2, 3, 4, 5]),
            Packet::Cont(_) => panic!("expected init packet"),
        }
    }
}
