pub mod artwork;
pub mod spotify;
pub mod youtube;
