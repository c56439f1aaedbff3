use serde::Serialize;

/// The track we are looking for, usually built from Spotify metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackDescriptor {
    pub title: String,
    /// Display name, possibly several artists joined by a separator
    pub artist: String,
    pub duration_seconds: f64,
}

/// One search result to evaluate
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub url: String,
    pub title: String,
    /// Empty when the search did not report an uploader
    pub channel_name: String,
    /// 0.0 means unknown duration
    pub duration_seconds: f64,
}

impl TrackDescriptor {
    pub fn duration_diff(&self, candidate: &Candidate) -> f64 {
        (self.duration_seconds - candidate.duration_seconds).abs()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredCandidate {
    pub candidate: Candidate,
    pub score: f64,
    /// Always `|target.duration_seconds - candidate.duration_seconds|`
    pub duration_diff: f64,
    pub within_tolerance: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchKind {
    /// Highest score among candidates inside the duration tolerance band
    Scored,
    /// Nothing was inside the band; closest duration over all candidates
    ClosestDuration,
}

impl MatchKind {
    /// Same spelling as the serialized form.
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchKind::Scored => "scored",
            MatchKind::ClosestDuration => "closest-duration",
        }
    }
}

impl std::fmt::Display for MatchKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Winner of a selection plus the trace of every candidate that was looked at.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Selection {
    pub winner: Candidate,
    /// Index of the winner in the input candidates
    pub winner_index: usize,
    pub kind: MatchKind,
    /// Same order as the input candidates
    pub trace: Vec<ScoredCandidate>,
}

impl Selection {
    pub fn winner_trace(&self) -> Option<&ScoredCandidate> {
        self.trace.get(self.winner_index)
    }
}
