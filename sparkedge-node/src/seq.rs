/// The per-session modulo-256 message sequence counter.
///
/// Owned by the session state and mutated only inside the serialized publish
/// path; no global state. Every birth restarts the sequence: the birth
/// message itself takes 0 and subsequent messages continue from there.
#[derive(Debug)]
pub(crate) struct SequenceCounter {
    current: u8,
}

impl SequenceCounter {
    pub fn new() -> Self {
        Self { current: 0 }
    }

    /// Restart the sequence. Returns the value the birth message carries.
    pub fn reset(&mut self) -> u64 {
        self.current = 0;
        0
    }

    /// Take the sequence number for the next outgoing message, wrapping from
    /// 255 back to 0.
    pub fn next(&mut self) -> u64 {
        self.current = self.current.wrapping_add(1);
        self.current as u64
    }
}
