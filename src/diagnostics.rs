use crate::error::{Error, Result};

/// Preflight checks with actionable messages; all failures are reported
/// before bailing.
pub fn check(data_dir: &std::path::Path) -> Result<()> {
    let mut errors: Vec<String> = Vec::new();

    // Check 1: /dev/uhid writable
    match std::fs::OpenOptions::new().write(true).open("/dev/uhid") {
        Ok(_) => {}
        Err(e) => errors.push(format!(
            "cannot open /dev/uhid: {e}\n  \
             → add yourself to the 'input' group: sudo usermod -aG input $USER\n  \
             → or install a udev rule granting your user access to uhid"
        )),
    }

    // Check 2: data dir creatable and writable
    if let Err(e) = std::fs::create_dir_all(data_dir) {
        errors.push(format!(
            "cannot create data dir {}: {e}\n  \
             → pass a writable location with --data-dir",
            data_dir.display()
        ));
    } else {
        let probe = data_dir.join(".write-probe");
        match std::fs::write(&probe, b"") {
            Ok(_) => {
                let _ = std::fs::remove_file(&probe);
            }
            Err(e) => errors.push(format!(
                "data dir {} is not writable: {e}\n  \
                 → pass a writable location with --data-dir",
                data_dir.display()
            )),
        }
    }

    if errors.is_empty() {
        return Ok(());
    }

    for err in &errors {
        eprintln!("ERROR: {err}");
    }
    Err(Error::Startup(format!(
        "{} preflight check(s) failed",
        errors.len()
    )))
}
