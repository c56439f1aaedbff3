/// Port trait for high resolution cover art.
///
/// Artwork is cosmetic, so implementations log failures and return `None`
/// instead of failing the request.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ArtworkSource: Send + Sync {
    async fn poster(&self, artist: &str, title: &str) -> Option<String>;
}
