//! Message identifier allocation.
//!
//! A single counter per connection, incremented before each use and reset
//! when the broker accepts CONNECT, so the first id of a session is 1.

/// Sequential message id counter.
///
/// Ids are 16-bit and non-zero. The counter wraps from 65535 to 1 and skips
/// any id the caller reports as still in flight.
#[derive(Debug, Default)]
pub struct MessageIdCounter {
    last: u16,
}

impl MessageIdCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next id not rejected by `in_use`.
    ///
    /// Returns `None` if all 65535 ids are in use.
    pub fn next(&mut self, in_use: impl Fn(u16) -> bool) -> Option<u16> {
        for _ in 0..u16::MAX {
            self.advance();
            if !in_use(self.last) {
                return Some(self.last);
            }
        }
        None
    }

    /// Restart numbering (on CONNACK).
    pub fn reset(&mut self) {
        self.last = 0;
    }

    /// Advance, skipping 0.
    fn advance(&mut self) {
        self.last = self.last.wrapping_add(1);
        if self.last == 0 {
            self.last = 1;
        }
    }
}
