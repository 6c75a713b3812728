use async_trait::async_trait;
use bytes::Bytes;
use mime::Mime;
use thiserror::Error;

/// A capability attached to a bulk-data attribute by the metadata layer that is able to fetch
/// the binary content of that attribute, e.g. through a WADO-RS bulkdata request.
#[async_trait]
pub trait BulkDataRetriever: Send + Sync {
	async fn retrieve(&self, options: RetrieveOptions) -> Result<Bytes, RetrieveError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrieveOptions {
	/// The media type that should be requested from the origin.
	pub media_type: Mime,
}

#[derive(Debug, Error)]
pub enum RetrieveError {
	#[error(transparent)]
	Backend { source: anyhow::Error },
}

impl RetrieveError {
	pub fn backend(source: impl Into<anyhow::Error>) -> Self {
		Self::Backend {
			source: source.into(),
		}
	}
}

/// Adapts an async closure into a [`BulkDataRetriever`].
pub struct RetrieveFn<F>(pub F);

#[async_trait]
impl<F, Fut> BulkDataRetriever for RetrieveFn<F>
where
	F: Fn(RetrieveOptions) -> Fut + Send + Sync,
	Fut: std::future::Future<Output = Result<Bytes, RetrieveError>> + Send,
{
	async fn retrieve(&self, options: RetrieveOptions) -> Result<Bytes, RetrieveError> {
		(self.0)(options).await
	}
}
