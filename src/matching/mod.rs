//! Picks the search result most likely to be a given track.
//!
//! Everything in here is pure: no I/O, no shared state. Duration is the
//! strongest signal (studio, live and remix uploads usually share a title),
//! keyword and channel heuristics break ties inside the tolerance band.

mod normalize;
mod scorer;
mod selector;
mod types;

#[cfg(test)]
pub use normalize::normalize;
pub use scorer::ScoringPolicy;
pub use selector::select_best;
pub use types::{Candidate, MatchKind, Selection, TrackDescriptor};
