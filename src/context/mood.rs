//! Time-of-day mood annotation

/// Coarse mood derived from the local hour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mood {
    LateNight,
    Morning,
    Evening,
    Daytime,
}

impl Mood {
    /// Bucket an hour of day (0-23); out-of-range values fall into `Daytime`
    #[must_use]
    pub const fn for_hour(hour: u32) -> Self {
        match hour {
            0..5 => Self::LateNight,
            5..12 => Self::Morning,
            18..24 => Self::Evening,
            _ => Self::Daytime,
        }
    }

    /// Prompt line describing the mood
    #[must_use]
    pub const fn annotation(self) -> &'static str {
        match self {
            Self::LateNight => {
                "It's late at night. Be soft and unhurried, and notice if they should be sleeping."
            }
            Self::Morning => "It's morning. Be bright and gently energetic.",
            Self::Evening => "It's evening. Be warm and reflective, winding down with them.",
            Self::Daytime => "It's the middle of the day. Be present and easygoing.",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_edges() {
        assert_eq!(Mood::for_hour(0), Mood::LateNight);
        assert_eq!(Mood::for_hour(4), Mood::LateNight);
        assert_eq!(Mood::for_hour(5), Mood::Morning);
        assert_eq!(Mood::for_hour(11), Mood::Morning);
        assert_eq!(Mood::for_hour(12), Mood::Daytime);
        assert_eq!(Mood::for_hour(17), Mood::Daytime);
        assert_eq!(Mood::for_hour(18), Mood::Evening);
        assert_eq!(Mood::for_hour(23), Mood::Evening);
    }
}
