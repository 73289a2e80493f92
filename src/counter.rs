use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum CounterError {
    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("counter file is {0} bytes, expected 4")]
    Corrupt(usize),
}

/// The signature counter: a 4-byte big-endian file, replaced atomically
/// (write-to-temp, fsync, rename) on every increment. A missing file reads
/// as zero so a fresh install starts counting at one.
pub struct Counter {
    path: PathBuf,
}

impl Counter {
    pub fn open(path: PathBuf) -> Result<Self, CounterError> {
        let counter = Self { path };
        counter.peek()?;
        Ok(counter)
    }

    /// Current value without incrementing.
    pub fn peek(&self) -> Result<u32, CounterError> {
        match std::fs::read(&self.path) {
            Ok(bytes) => {
                let bytes: [u8; 4] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| CounterError::Corrupt(bytes.len()))?;
                Ok(u32::from_be_bytes(bytes))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    /// Increment, persist, return the new value. The new value is durable
    /// before any response carrying it can be emitted.
    pub fn next(&mut self) -> Result<u32, CounterError> {
        let next = self.peek()?.saturating_add(1);

        let tmp = self.path.with_extension("tmp");
        let mut file = File::create(&tmp)?;
        file.write_all(&next.to_be_bytes())?;
        file.sync_all()?;
        std::fs::rename(&tmp, &self.path)?;

        Ok(next)
    }
}
