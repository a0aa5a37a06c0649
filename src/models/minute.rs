use serde::{Deserialize, Serialize};

/// One minute of health history as reported by the platform.
///
/// The minute key is not stored here; samples live in window slots and
/// the key is derived from the window's base time plus the slot index.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MinuteSample {
    pub steps: u8,
    /// Two packed 4-bit components: yaw in the low nibble, pitch in the high.
    pub orientation: u8,
    /// Vector-magnitude-corrected motion value.
    pub vmc: u16,
    /// Ambient light level.
    pub light: u8,
    pub heart_rate_bpm: u8,
    /// False when the platform had no data for this minute.
    pub valid: bool,
}

impl MinuteSample {
    pub fn invalid() -> Self {
        Self {
            steps: 0,
            orientation: 0,
            vmc: 0,
            light: 0,
            heart_rate_bpm: 0,
            valid: false,
        }
    }

    pub fn yaw(&self) -> u16 {
        (self.orientation & 0xF) as u16
    }

    pub fn pitch(&self) -> u16 {
        (self.orientation >> 4) as u16
    }
}

impl Default for MinuteSample {
    fn default() -> Self {
        Self::invalid()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orientation_nibbles_split() {
        let sample = MinuteSample {
            orientation: 0xA3,
            ..MinuteSample::invalid()
        };
        assert_eq!(sample.yaw(), 3);
        assert_eq!(sample.pitch(), 10);
    }
}
