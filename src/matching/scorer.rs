use serde::{Deserialize, Serialize};

use super::normalize::{artist_names, contains_compact, contains_phrase, count_phrase, normalize};
use super::types::{Candidate, TrackDescriptor};

const OFFICIAL_AUDIO: &str = "official audio";
const LYRICS: [&str; 2] = ["lyrics", "lyric video"];

/// Tunable constants of the candidate scoring policy.
///
/// Every value can be overridden from the `[matching.scoring]` section of the config
/// file; the defaults are what the service ships with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringPolicy {
    /// Candidates whose duration differs by more than this are out of band
    pub duration_tolerance_secs: f64,
    /// Subtracted (on top of the raw difference) when out of band
    pub out_of_tolerance_penalty: f64,
    pub channel_match_bonus: f64,
    pub official_audio_bonus: f64,
    pub lyrics_bonus: f64,
    pub artist_in_title_bonus: f64,
    /// Phrases that indicate a different rendition of the track
    pub denylist: Vec<String>,
    /// Subtracted once per denylist phrase found in the candidate title
    pub denylist_penalty: f64,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            duration_tolerance_secs: 10.0,
            out_of_tolerance_penalty: 20.0,
            channel_match_bonus: 20.0,
            official_audio_bonus: 15.0,
            lyrics_bonus: 5.0,
            artist_in_title_bonus: 5.0,
            denylist: [
                "live", "cover", "remix", "reaction", "nightcore", "sped up", "slowed", "karaoke",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            denylist_penalty: 30.0,
        }
    }
}

/// Target fields normalized once per selection instead of once per candidate.
#[derive(Debug, Clone)]
pub(crate) struct NormalizedTarget {
    pub title: String,
    pub artists: Vec<String>,
    pub duration_seconds: f64,
}

impl NormalizedTarget {
    pub fn new(target: &TrackDescriptor) -> Self {
        Self {
            title: normalize(&target.title),
            artists: artist_names(&target.artist),
            duration_seconds: target.duration_seconds,
        }
    }
}

impl ScoringPolicy {
    pub fn is_within_tolerance(&self, duration_diff: f64) -> bool {
        duration_diff <= self.duration_tolerance_secs
    }

    /// Score one candidate against the target. Higher is better; the result is
    /// signed and unclamped.
    pub fn score(&self, target: &TrackDescriptor, candidate: &Candidate) -> f64 {
        self.score_normalized(&NormalizedTarget::new(target), candidate)
    }

    pub(crate) fn score_normalized(&self, target: &NormalizedTarget, candidate: &Candidate) -> f64 {
        let duration_diff = (target.duration_seconds - candidate.duration_seconds).abs();
        let title = normalize(&candidate.title);
        let channel = normalize(&candidate.channel_name);

        let mut score = self.duration_term(duration_diff);

        if target
            .artists
            .iter()
            .any(|artist| contains_phrase(&channel, artist) || contains_compact(&channel, artist))
        {
            score += self.channel_match_bonus;
        }

        if contains_phrase(&title, OFFICIAL_AUDIO) {
            score += self.official_audio_bonus;
        }
        if LYRICS.iter().any(|phrase| contains_phrase(&title, phrase)) {
            score += self.lyrics_bonus;
        }
        if target
            .artists
            .iter()
            .any(|artist| contains_phrase(&title, artist))
        {
            score += self.artist_in_title_bonus;
        }

        // Cumulative: "Song (Live Cover)" loses twice. Occurrences already in
        // the target title ("Live Forever") are not counted.
        for term in &self.denylist {
            let term = normalize(term);
            let extra = count_phrase(&title, &term).saturating_sub(count_phrase(&target.title, &term));
            score -= self.denylist_penalty * extra as f64;
        }

        score
    }

    /// Never increases as `duration_diff` grows, including across the
    /// tolerance boundary.
    fn duration_term(&self, duration_diff: f64) -> f64 {
        let banded = if self.is_within_tolerance(duration_diff) {
            (self.duration_tolerance_secs - duration_diff).max(0.0)
        } else {
            -self.out_of_tolerance_penalty.abs()
        };
        banded - duration_diff
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::select_best;
    use crate::test_utils::{candidate, target};

    #[test]
    fn test_score_is_deterministic() {
        let policy = ScoringPolicy::default();
        let target = target("Levitating", "Dua Lipa", 203.0);
        let c = candidate("Dua Lipa - Levitating (Official Audio)", "Dua Lipa", 204.0);
        let first = policy.score(&target, &c);
        for _ in 0..10 {
            assert_eq!(policy.score(&target, &c), first);
        }
    }

    #[test]
    fn test_duration_term_is_monotonic() {
        let policy = ScoringPolicy::default();
        let target = target("Song", "Artist", 200.0);
        let mut previous = f64::INFINITY;
        // Walk across the tolerance boundary in both directions
        for step in 0..80 {
            let diff = step as f64 * 0.5;
            let longer = policy.score(&target, &candidate("Song", "Someone", 200.0 + diff));
            let shorter = policy.score(&target, &candidate("Song", "Someone", 200.0 - diff));
            assert!(longer <= previous, "score rose at diff {diff}");
            assert_eq!(longer, shorter);
            previous = longer;
        }
    }

    #[test]
    fn test_duration_term_values() {
        let policy = ScoringPolicy::default();
        assert_eq!(policy.duration_term(0.0), 10.0);
        assert_eq!(policy.duration_term(4.0), 2.0);
        assert_eq!(policy.duration_term(10.0), -10.0);
        assert_eq!(policy.duration_term(11.0), -31.0);
    }

    #[test]
    fn test_denylist_applies_despite_perfect_duration() {
        let policy = ScoringPolicy::default();
        let target = target("Song Name", "Artist", 180.0);
        let live = policy.score(&target, &candidate("Song Name (Live)", "Uploader", 180.0));
        let studio = policy.score(&target, &candidate("Song Name", "Uploader", 180.0));
        assert!(live < studio);
        assert_eq!(studio - live, policy.denylist_penalty);
    }

    #[test]
    fn test_denylist_penalties_are_cumulative() {
        let policy = ScoringPolicy::default();
        let target = target("Song Name", "Artist", 180.0);
        let plain = policy.score(&target, &candidate("Song Name", "Uploader", 180.0));
        let twice = policy.score(
            &target,
            &candidate("Song Name (Live Acoustic Cover)", "Uploader", 180.0),
        );
        assert_eq!(plain - twice, 2.0 * policy.denylist_penalty);
    }

    #[test]
    fn test_denylist_skips_terms_in_target_title() {
        let policy = ScoringPolicy::default();
        let target = target("Live Forever", "Oasis", 276.0);
        let score = policy.score(&target, &candidate("Live Forever", "Uploader", 276.0));
        assert_eq!(score, policy.duration_tolerance_secs);
    }

    #[test]
    fn test_live_recording_of_live_titled_track_is_penalized() {
        let policy = ScoringPolicy::default();
        let target = target("Live Forever", "Oasis", 276.0);
        let studio = candidate("Live Forever", "Uploader", 278.0);
        let live = candidate("Oasis - Live Forever (Live at Knebworth)", "Uploader", 276.0);

        // 10 - 0 + artist in title - one extra "live"
        assert_eq!(
            policy.score(&target, &live),
            policy.duration_tolerance_secs + policy.artist_in_title_bonus - policy.denylist_penalty
        );

        let selection = select_best(&policy, &target, &[studio.clone(), live]).unwrap();
        assert_eq!(selection.winner, studio);
    }

    #[test]
    fn test_denylist_is_word_bounded() {
        let policy = ScoringPolicy::default();
        let target = target("Staying Alive", "Bee Gees", 285.0);
        let c = candidate("Staying Alive (Remastered)", "Uploader", 285.0);
        assert_eq!(policy.score(&target, &c), policy.duration_tolerance_secs);
    }

    #[test]
    fn test_channel_match_bonus() {
        let policy = ScoringPolicy::default();
        let target = target("Levitating", "Dua Lipa", 203.0);
        let base = policy.score(&target, &candidate("Levitating", "Random Uploads", 203.0));
        let official = policy.score(&target, &candidate("Levitating", "Dua Lipa", 203.0));
        let vevo = policy.score(&target, &candidate("Levitating", "DuaLipaVEVO", 203.0));
        let topic = policy.score(&target, &candidate("Levitating", "Dua Lipa - Topic", 203.0));
        assert_eq!(official - base, policy.channel_match_bonus);
        assert_eq!(vevo, official);
        assert_eq!(topic, official);
    }

    #[test]
    fn test_channel_match_any_artist() {
        let policy = ScoringPolicy::default();
        let target = target("Levitating", "Dua Lipa, DaBaby", 203.0);
        let base = policy.score(&target, &candidate("Levitating", "Someone", 203.0));
        let second_artist = policy.score(&target, &candidate("Levitating", "DaBaby", 203.0));
        assert_eq!(second_artist - base, policy.channel_match_bonus);
    }

    #[test]
    fn test_keyword_bonuses() {
        let policy = ScoringPolicy::default();
        let target = target("Levitating", "Dua Lipa", 203.0);
        let base = policy.score(&target, &candidate("Levitating", "", 203.0));

        let official = policy.score(&target, &candidate("Levitating (OFFICIAL AUDIO)", "", 203.0));
        assert_eq!(official - base, policy.official_audio_bonus);

        let lyrics = policy.score(&target, &candidate("Levitating [Lyrics]", "", 203.0));
        assert_eq!(lyrics - base, policy.lyrics_bonus);

        let lyric_video = policy.score(&target, &candidate("Levitating (Lyric Video)", "", 203.0));
        assert_eq!(lyric_video - base, policy.lyrics_bonus);

        let artist = policy.score(&target, &candidate("Dua Lipa - Levitating", "", 203.0));
        assert_eq!(artist - base, policy.artist_in_title_bonus);
    }

    #[test]
    fn test_score_may_be_negative() {
        let policy = ScoringPolicy::default();
        let target = target("Song", "Artist", 200.0);
        let c = candidate("Song (Live Reaction)", "", 500.0);
        assert!(policy.score(&target, &c) < 0.0);
    }

    #[test]
    fn test_scenario_a_scores() {
        let policy = ScoringPolicy::default();
        let target = target("Levitating", "Dua Lipa", 203.0);
        let official = candidate("Dua Lipa - Levitating (Official Audio)", "Dua Lipa", 203.0);
        let live = candidate("Levitating (Live at Glastonbury)", "Festival Clips", 210.0);
        // 10 (duration) + 20 (channel) + 15 (official audio) + 5 (artist in title)
        assert_eq!(policy.score(&target, &official), 50.0);
        // (10 - 7) - 7 (duration) - 30 (live)
        assert_eq!(policy.score(&target, &live), -34.0);
    }

    #[test]
    fn test_policy_deserializes_with_partial_overrides() {
        let policy: ScoringPolicy = toml::from_str(
            r#"
            duration_tolerance_secs = 15.0
            denylist = ["live"]
            "#,
        )
        .unwrap();
        assert_eq!(policy.duration_tolerance_secs, 15.0);
        assert_eq!(policy.denylist, vec!["live".to_string()]);
        assert_eq!(policy.channel_match_bonus, 20.0);
    }
}
