use parking_lot::Mutex;
use crate::common::types::FrameId;

struct ClockState {
    // One (contains, ref) pair per frame. `contains` marks the frame as an
    // eviction candidate; `ref` is the second-chance bit.
    frames: Vec<(bool, bool)>,
    hand: usize,
}

/// Clock page replacement policy over a fixed number of frames.
///
/// All methods are individually atomic under the internal mutex. `victim`
/// holds it for the whole scan; the scan visits each frame at most twice, so
/// it terminates within 2N hand steps whenever a candidate exists.
pub struct ClockReplacer {
    state: Mutex<ClockState>,
}

impl ClockReplacer {
    pub fn new(num_frames: usize) -> Self {
        Self {
            state: Mutex::new(ClockState {
                frames: vec![(false, false); num_frames],
                // Start just before frame 0 so the first scan begins there.
                hand: num_frames.saturating_sub(1),
            }),
        }
    }

    /// Remove a frame from the candidate set. Idempotent.
    pub fn pin(&self, frame_id: FrameId) {
        let mut state = self.state.lock();
        state.frames[frame_id] = (false, false);
    }

    /// Add a frame to the candidate set with a fresh reference bit.
    /// Idempotent.
    pub fn unpin(&self, frame_id: FrameId) {
        let mut state = self.state.lock();
        state.frames[frame_id] = (true, true);
    }

    /// Pick a victim frame, or `None` if no frame is currently a candidate.
    pub fn victim(&self) -> Option<FrameId> {
        let mut state = self.state.lock();
        if !state.frames.iter().any(|&(contains, _)| contains) {
            return None;
        }

        loop {
            state.hand = (state.hand + 1) % state.frames.len();
            let hand = state.hand;
            let (contains, referenced) = state.frames[hand];
            if contains {
                if referenced {
                    state.frames[hand].1 = false;
                } else {
                    state.frames[hand].0 = false;
                    return Some(hand);
                }
            }
        }
    }

    /// Number of frames currently in the candidate set.
    pub fn size(&self) -> usize {
        let state = self.state.lock();
        state.frames.iter().filter(|&&(contains, _)| contains).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_replacer_has_no_victim() {
        let replacer = ClockReplacer::new(4);
        assert_eq!(replacer.size(), 0);
        assert_eq!(replacer.victim(), None);
    }

    #[test]
    fn test_second_chance_ordering() {
        let replacer = ClockReplacer::new(3);
        replacer.unpin(0);
        replacer.unpin(1);
        replacer.unpin(2);
        assert_eq!(replacer.size(), 3);

        // All reference bits are set, so the first scan clears them and the
        // second pass evicts in hand order starting at frame 0.
        assert_eq!(replacer.victim(), Some(0));
        assert_eq!(replacer.victim(), Some(1));
        assert_eq!(replacer.victim(), Some(2));
        assert_eq!(replacer.victim(), None);
    }

    #[test]
    fn test_pin_removes_candidate() {
        let replacer = ClockReplacer::new(3);
        replacer.unpin(0);
        replacer.unpin(1);
        replacer.pin(0);
        assert_eq!(replacer.size(), 1);
        assert_eq!(replacer.victim(), Some(1));
        assert_eq!(replacer.victim(), None);
    }

    #[test]
    fn test_unpin_is_idempotent() {
        let replacer = ClockReplacer::new(2);
        replacer.unpin(1);
        replacer.unpin(1);
        assert_eq!(replacer.size(), 1);
        assert_eq!(replacer.victim(), Some(1));
        assert_eq!(replacer.victim(), None);
    }

    #[test]
    fn test_recently_unpinned_gets_second_chance() {
        let replacer = ClockReplacer::new(3);
        replacer.unpin(0);
        replacer.unpin(1);

        assert_eq!(replacer.victim(), Some(0));

        // Frame 0 comes back with its reference bit set; frame 1's bit was
        // cleared by the previous scan, so frame 1 goes first.
        replacer.unpin(0);
        assert_eq!(replacer.victim(), Some(1));
        assert_eq!(replacer.victim(), Some(0));
    }
}
