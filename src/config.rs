/// Identity the virtual device announces to the kernel. The vendor id is
/// the pid.codes open-hardware space.
pub const DEVICE_NAME: &str = "keyfob U2F token";
pub const USB_VENDOR_ID: u32 = 0x1209;
pub const USB_PRODUCT_ID: u32 = 0x50FB;

pub const MAX_CHANNELS: usize = 8;
/// Idle channels are reaped after this long without traffic.
pub const CHANNEL_TIMEOUT_SECS: u64 = 30;
/// A reassembly missing its next frame for this long is aborted with
/// ERR_MSG_TIMEOUT.
pub const RECV_TIMEOUT_MS: u64 = 500;

#[derive(clap::Parser, Debug, Clone)]
pub struct Config {
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
    /// Where the counter and key material live (default: XDG data dir).
    #[arg(long)]
    pub data_dir: Option<std::path::PathBuf>,
    /// Delete the counter, wrapping key and attestation identity, then exit.
    #[arg(long)]
    pub wipe: bool,
}
