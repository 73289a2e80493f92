pub mod config;
pub mod counter;
pub mod crypto;
pub mod diagnostics;
pub mod error;
pub mod hid;
pub mod u2f;
pub mod u2fhid;
pub mod up;

use error::{Error, Result};
use rand::RngCore;
use std::path::Path;
use zeroize::Zeroizing;

const WRAP_KEY_FILE: &str = "wrap.key";
const COUNTER_FILE: &str = "counter.bin";

pub fn data_dir(cfg: &config::Config) -> Result<std::path::PathBuf> {
    if let Some(dir) = &cfg.data_dir {
        return Ok(dir.clone());
    }
    directories::ProjectDirs::from("", "", "keyfob")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .ok_or_else(|| Error::Startup("cannot determine XDG data dir".into()))
}

pub async fn run(cfg: config::Config) -> Result<()> {
    use tracing_subscriber::EnvFilter;
    let level = match cfg.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(level))
        .init();

    tracing::info!("Starting keyfob");

    let data_dir = data_dir(&cfg)?;
    diagnostics::check(&data_dir)?;

    // Single-instance lock: two keyfobs would race on the counter file.
    let lock_dir = std::env::var("XDG_RUNTIME_DIR")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| data_dir.clone());
    let lock_path = lock_dir.join("keyfob.lock");
    let lock_file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .open(&lock_path)?;
    let mut lock = fd_lock::RwLock::new(lock_file);
    let _guard = lock.try_write().map_err(|_| {
        Error::Startup(format!(
            "keyfob is already running (lock: {})",
            lock_path.display()
        ))
    })?;

    let wrap_key = load_or_create_wrap_key(&data_dir)?;
    let wrap = crypto::KeyWrap::new(&wrap_key);
    let attestation = crypto::Attestation::load_or_create(&data_dir)?;
    tracing::info!("Attestation identity ready");

    let counter = counter::Counter::open(data_dir.join(COUNTER_FILE))?;
    let counter_value = counter.peek()?;
    tracing::info!(value = counter_value, "Counter ready");

    let authenticator =
        u2f::Authenticator::new(wrap, attestation, counter, Box::new(up::AlwaysPresent));

    let transport = hid::start_hid_transport()?;
    u2fhid::run_u2fhid_loop(transport.incoming_rx, transport.outgoing_tx, authenticator).await?;

    match transport.task.await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.into()),
        Err(e) => Err(Error::Startup(format!("HID transport panicked: {e}"))),
    }
}

/// Delete all persisted state (factory reset): counter, wrapping key,
/// attestation identity. Existing key handles become unusable.
pub fn wipe(cfg: &config::Config) -> Result<()> {
    let data_dir = data_dir(cfg)?;
    let mut count = 0usize;
    for name in [
        COUNTER_FILE,
        WRAP_KEY_FILE,
        crypto::attestation::KEY_FILE,
        crypto::attestation::CERT_FILE,
    ] {
        let path = data_dir.join(name);
        if path.exists() {
            std::fs::remove_file(&path)?;
            count += 1;
        }
    }
    println!("Deleted {count} state file(s) from {}", data_dir.display());
    Ok(())
}

fn load_or_create_wrap_key(dir: &Path) -> Result<Zeroizing<[u8; 32]>> {
    let path = dir.join(WRAP_KEY_FILE);
    if path.exists() {
        let bytes = Zeroizing::new(std::fs::read(&path)?);
        let key: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
            Error::Startup(format!("{} is not a 32-byte key", path.display()))
        })?;
        Ok(Zeroizing::new(key))
    } else {
        let mut key = Zeroizing::new([0u8; 32]);
        rand::rngs::OsRng.fill_bytes(&mut *key);
        std::fs::write(&path, key.as_slice())?;
        tracing::info!(path = %path.display(), "Generated wrapping key");
        Ok(key)
    }
}
