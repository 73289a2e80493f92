/// Test-of-user-presence seam. An ENFORCE authentication consults this
/// before signing; a denial is reported to the host as
/// SW_CONDITIONS_NOT_SATISFIED, which hosts answer by polling again.
/// `&mut self` so implementations may latch a button press or debounce.
pub trait UserPresence: Send {
    fn user_present(&mut self) -> bool;
}

/// Grants every presence test. There is no physical button to consult on a
/// purely software key; wire a real implementation here to change that.
pub struct AlwaysPresent;

impl UserPresence for AlwaysPresent {
    fn user_present(&mut self) -> bool {
        true
    }
}
