//! Event-bus protocol shared by the resolution engine and its observers.
//!
//! Resolutions publish their phase transitions and per-source outcomes here;
//! the binary's progress logger is the only consumer today.

use std::fmt;

use crate::model::{ResolutionStatus, SourceId};

/// Top-level envelope for all bus traffic.
#[derive(Debug, Clone)]
pub enum Message {
    Resolution(ResolutionMessage),
}

/// Lifecycle of one resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionPhase {
    Pending,
    Querying(SourceId),
    Merging,
    AiSupplement,
    Done,
}

impl fmt::Display for ResolutionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("pending"),
            Self::Querying(source) => write!(f, "querying {source}"),
            Self::Merging => f.write_str("merging"),
            Self::AiSupplement => f.write_str("ai supplement"),
            Self::Done => f.write_str("done"),
        }
    }
}

/// What one adapter call contributed.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceOutcome {
    Facts(usize),
    NotFound,
    /// Not queried because earlier sources already covered its fields.
    Skipped,
    Failed {
        kind: &'static str,
        message: String,
    },
}

/// Resolution-domain notifications.
#[derive(Debug, Clone)]
pub enum ResolutionMessage {
    PhaseChanged {
        artist: String,
        phase: ResolutionPhase,
    },
    SourceFinished {
        artist: String,
        source: SourceId,
        outcome: SourceOutcome,
    },
    Finished {
        artist: String,
        status: ResolutionStatus,
        known_fields: usize,
        unknown_fields: usize,
    },
    Cancelled {
        artist: String,
    },
}

#[cfg(test)]
mod tests {
    use super::ResolutionPhase;
    use crate::model::SourceId;

    #[test]
    fn test_phase_display_names_the_source() {
        assert_eq!(
            ResolutionPhase::Querying(SourceId::Wikidata).to_string(),
            "querying Wikidata"
        );
        assert_eq!(ResolutionPhase::AiSupplement.to_string(), "ai supplement");
    }
}
