//! Classification of raw LIRC events: which ones should flash the LED.

/// Marker lircd puts after the key name of a button-release event.
///
/// A lircd line reads `<code> <repeat> <key> <remote>`; release events carry
/// a key name ending in `_UP`, followed by the field separator.
pub const RELEASE_MARKER: &[u8] = b"_UP ";

/// Decides which raw events should flash the indicator.
///
/// The payload is never parsed; a window containing the release marker is
/// ignored and everything else is actionable.
#[derive(Debug, Clone)]
pub struct EventFilter {
    release_marker: Vec<u8>,
}

impl Default for EventFilter {
    fn default() -> Self {
        Self::new(RELEASE_MARKER)
    }
}

impl EventFilter {
    pub fn new(release_marker: &[u8]) -> Self {
        Self {
            release_marker: release_marker.to_vec(),
        }
    }

    pub fn is_actionable(&self, raw: &[u8]) -> bool {
        !contains(raw, &self.release_marker)
    }
}

/// Classify `raw` with the default release marker.
pub fn is_actionable(raw: &[u8]) -> bool {
    !contains(raw, RELEASE_MARKER)
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    if needle.is_empty() {
        return false;
    }
    haystack.windows(needle.len()).any(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_events_are_ignored() {
        assert!(!is_actionable(b"000000037ff07bfe 00 KEY_1_UP mceusb\n"));
        assert!(!is_actionable(b"KEY_1_UP "));
    }

    #[test]
    fn test_press_events_are_actionable() {
        assert!(is_actionable(b"000000037ff07bee 00 KEY_1 mceusb\n"));
        assert!(is_actionable(b"KEY_1 00 ..."));
        assert!(is_actionable(b""));
    }

    #[test]
    fn test_marker_needs_trailing_delimiter() {
        // "_UP" without the separator is part of a longer key name.
        assert!(is_actionable(b"0000 00 KEY_UPDATE remote\n"));
        assert!(is_actionable(b"0000 00 KEY_VOLUME_UP"));
    }

    #[test]
    fn test_marker_at_window_edges() {
        assert!(!is_actionable(b"_UP rest"));
        assert!(!is_actionable(b"prefix KEY_OK_UP "));
        // Split across two reads: neither window contains the full marker.
        assert!(is_actionable(b"0000 00 KEY_OK_U"));
        assert!(is_actionable(b"P remote\n"));
    }

    #[test]
    fn test_window_is_bounded() {
        let mut buf = [0u8; 128];
        buf[..9].copy_from_slice(b"KEY_1 00 ");
        assert!(is_actionable(&buf[..9]));

        buf[120..124].copy_from_slice(b"_UP ");
        assert!(is_actionable(&buf[..120]));
        assert!(!is_actionable(&buf));
    }

    #[test]
    fn test_custom_marker() {
        let filter = EventFilter::new(b"_RELEASE ");
        assert!(filter.is_actionable(b"KEY_1_UP "));
        assert!(!filter.is_actionable(b"KEY_1_RELEASE remote"));
        assert!(EventFilter::default().is_actionable(b"KEY_1 remote"));
    }
}
