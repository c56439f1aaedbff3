use crate::matching::{Candidate, TrackDescriptor, normalize};
use crate::retry::{BackoffStrategy, RetryPolicy};
use std::time::Duration;

pub fn target(title: &str, artist: &str, duration_seconds: f64) -> TrackDescriptor {
    TrackDescriptor {
        title: title.to_string(),
        artist: artist.to_string(),
        duration_seconds,
    }
}

pub fn candidate(title: &str, channel_name: &str, duration_seconds: f64) -> Candidate {
    Candidate {
        url: format!(
            "https://www.youtube.com/watch?v={}",
            normalize(title).replace(' ', "-")
        ),
        title: title.to_string(),
        channel_name: channel_name.to_string(),
        duration_seconds,
    }
}

/// Retry policy with delays short enough for unit tests.
pub fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay: Duration::from_millis(1),
        max_delay: None,
        strategy: BackoffStrategy::Exponential,
    }
}
