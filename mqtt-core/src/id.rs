/// Allocates MQTT packet identifiers for a single session.
///
/// Ids are handed out in increasing order starting at 1 (0 is reserved and
/// never valid) and wrap back to 1 after `u16::MAX`. An id is skipped while
/// it is still registered as in-flight, so the same id is never reused for
/// two packets awaiting acknowledgement at once.
#[derive(Debug, Clone)]
pub struct IdGenerator {
    last: u16,
    in_flight: Box<[bool; u16::MAX as usize + 1]>,
}

impl IdGenerator {
    pub fn new() -> Self {
        return Self {
            last: 0,
            in_flight: Box::new([false; u16::MAX as usize + 1]),
        };
    }

    /// Returns the next free id and marks it in-flight. `None` if every id is
    /// currently outstanding.
    pub fn next_id(&mut self) -> Option<u16> {
        let start = self.last;
        let mut candidate = checked_incr(self.last);

        loop {
            if candidate != 0 && !self.in_flight[candidate as usize] {
                self.last = candidate;
                self.in_flight[candidate as usize] = true;
                return Some(candidate);
            }

            let next = checked_incr(candidate);
            if next == start {
                return None;
            }
            candidate = next;
        }
    }

    /// Releases an id back to the pool once its packet has been fully acknowledged.
    pub fn free_id(&mut self, id: u16) {
        if id != 0 {
            self.in_flight[id as usize] = false;
        }
    }

    pub fn is_in_flight(&self, id: u16) -> bool {
        id != 0 && self.in_flight[id as usize]
    }
}

fn checked_incr(id: u16) -> u16 {
    match id.checked_add(1) {
        Some(next) if next != 0 => next,
        _ => 1,
    }
}
