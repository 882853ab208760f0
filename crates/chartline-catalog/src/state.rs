//! Pipeline stage identifiers

/// The five crawl stages, in execution order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Playlists,
    Tracks,
    Artists,
    AudioFeatures,
    Streams,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Self::Playlists,
        Self::Tracks,
        Self::Artists,
        Self::AudioFeatures,
        Self::Streams,
    ];

    /// Parse CLI string into enum
    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "playlists" => Some(Self::Playlists),
            "tracks" => Some(Self::Tracks),
            "artists" => Some(Self::Artists),
            "audio-features" | "audio_features" => Some(Self::AudioFeatures),
            "streams" => Some(Self::Streams),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Playlists => "playlists",
            Self::Tracks => "tracks",
            Self::Artists => "artists",
            Self::AudioFeatures => "audio-features",
            Self::Streams => "streams",
        }
    }

    /// Stream counts come from an unauthenticated endpoint.
    pub fn needs_token(self) -> bool {
        self != Self::Streams
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_name_roundtrips_every_stage() {
        for stage in Stage::ALL {
            assert_eq!(Stage::from_name(stage.name()), Some(stage));
        }
        assert_eq!(Stage::from_name("audio_features"), Some(Stage::AudioFeatures));
    }

    #[test]
    fn from_name_invalid() {
        assert_eq!(Stage::from_name("Tracks"), None);
        assert_eq!(Stage::from_name(""), None);
    }

    #[test]
    fn stages_are_ordered() {
        assert!(Stage::ALL.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn only_streams_skip_token() {
        let anonymous: Vec<_> = Stage::ALL.into_iter().filter(|s| !s.needs_token()).collect();
        assert_eq!(anonymous, vec![Stage::Streams]);
    }
}
