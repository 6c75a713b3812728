pub mod cache;
pub mod fallback;
pub mod uri;

use crate::blob::{decode_inline_binary, Blob, BlobStore, ObjectUrlAllocator};
use crate::config::ResolverConfig;
use crate::metadata::{AttributeValue, BulkDataValue, Instance};
use crate::retrieve::{BulkDataRetriever, RetrieveError, RetrieveOptions};
use crate::types::{is_renderable, Keyword, PIXEL_DATA};
use cache::{CacheKey, DirectUrlCache};
use fallback::{BulkDataFallback, RenderedEndpoint, RenderedRetrieve, SeriesBulkData};
use futures::future::BoxFuture;
use futures::FutureExt;
use mime::Mime;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, instrument, trace, warn, Instrument, Span};

static EMPTY_VALUE: BulkDataValue = BulkDataValue::empty();

/// Per-call parameters of a resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestParams {
	/// Keyword of the attribute to resolve.
	pub tag: Keyword,
	/// Path appended to the instance resource when the attribute has no `BulkDataURI`.
	pub default_path: String,
	/// Media type that is requested from the server and assigned to object URLs.
	pub default_type: Mime,
	/// The part type that must be enabled in [`ResolverConfig::singlepart`] for a direct URL.
	pub fetch_part: String,
	/// Returned as-is if present.
	pub url: Option<String>,
}

impl Default for RequestParams {
	fn default() -> Self {
		Self {
			tag: Keyword::from(PIXEL_DATA),
			default_path: String::from("/pixeldata"),
			default_type: video_mp4(),
			fetch_part: String::from("video"),
			url: None,
		}
	}
}

impl RequestParams {
	#[must_use]
	pub fn with_tag(mut self, tag: impl Into<Keyword>) -> Self {
		self.tag = tag.into();
		self
	}

	#[must_use]
	pub fn with_default_path(mut self, default_path: impl Into<String>) -> Self {
		self.default_path = default_path.into();
		self
	}

	#[must_use]
	pub fn with_default_type(mut self, default_type: Mime) -> Self {
		self.default_type = default_type;
		self
	}

	#[must_use]
	pub fn with_fetch_part(mut self, fetch_part: impl Into<String>) -> Self {
		self.fetch_part = fetch_part.into();
		self
	}

	#[must_use]
	pub fn with_url(mut self, url: impl Into<String>) -> Self {
		self.url = Some(url.into());
		self
	}
}

fn video_mp4() -> Mime {
	"video/mp4".parse().expect("video/mp4 is a valid media type")
}

/// The outcome of a successful resolution.
///
/// Already known URLs are returned immediately, while URLs that require a retrieval of the
/// binary content first are returned as a future.
pub enum DirectUrl {
	Resolved(String),
	Pending(BoxFuture<'static, Result<String, ResolveError>>),
}

impl DirectUrl {
	/// Waits for the URL, if necessary.
	///
	/// # Errors
	/// Returns a [`ResolveError`] if the retrieval of a pending URL failed.
	pub async fn into_url(self) -> Result<String, ResolveError> {
		match self {
			Self::Resolved(url) => Ok(url),
			Self::Pending(future) => future.await,
		}
	}

	pub fn as_resolved(&self) -> Option<&str> {
		match self {
			Self::Resolved(url) => Some(url),
			Self::Pending(_) => None,
		}
	}

	pub const fn is_pending(&self) -> bool {
		matches!(self, Self::Pending(_))
	}
}

impl Debug for DirectUrl {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Resolved(url) => f.debug_tuple("Resolved").field(url).finish(),
			Self::Pending(_) => f.write_str("Pending"),
		}
	}
}

#[derive(Debug, Error)]
pub enum ResolveError {
	#[error("InlineBinary of {tag} is not valid base64: {source}")]
	InlineBinary {
		tag: Keyword,
		source: base64::DecodeError,
	},
	#[error("Failed to retrieve {tag}: {source}")]
	Retrieve { tag: Keyword, source: RetrieveError },
}

/// Resolves directly usable URLs for bulk-data attributes of DICOM instances.
///
/// URLs that required decoding or retrieving binary content are memoized per
/// `(SOPInstanceUID, tag)`, so the resolver should live as long as the instances it serves.
pub struct BulkDataUrlResolver {
	config: ResolverConfig,
	cache: DirectUrlCache,
	allocator: Arc<dyn ObjectUrlAllocator>,
	rendered_retrieve: Option<Box<dyn RenderedRetrieve>>,
	bulkdata_fallback: Option<Box<dyn BulkDataFallback>>,
}

impl BulkDataUrlResolver {
	/// Creates a resolver without fallbacks for absent attributes that allocates object URLs in a
	/// private [`BlobStore`].
	pub fn new(config: ResolverConfig) -> Self {
		Self {
			config,
			cache: DirectUrlCache::new(),
			allocator: Arc::new(BlobStore::default()),
			rendered_retrieve: None,
			bulkdata_fallback: None,
		}
	}

	#[must_use]
	pub fn with_allocator(mut self, allocator: Arc<dyn ObjectUrlAllocator>) -> Self {
		self.allocator = allocator;
		self
	}

	#[must_use]
	pub fn with_rendered_retrieve(
		mut self,
		rendered_retrieve: impl RenderedRetrieve + 'static,
	) -> Self {
		self.rendered_retrieve = Some(Box::new(rendered_retrieve));
		self
	}

	#[must_use]
	pub fn with_bulkdata_fallback(mut self, fallback: impl BulkDataFallback + 'static) -> Self {
		self.bulkdata_fallback = Some(Box::new(fallback));
		self
	}

	/// Installs [`RenderedEndpoint`] and [`SeriesBulkData`] for absent attributes.
	#[must_use]
	pub fn with_default_fallbacks(self) -> Self {
		self.with_rendered_retrieve(RenderedEndpoint)
			.with_bulkdata_fallback(SeriesBulkData)
	}

	pub const fn config(&self) -> &ResolverConfig {
		&self.config
	}

	/// Resolves the attribute `params.tag` of `instance`.
	///
	/// Returns `Ok(None)` if the attribute is not available: it is absent and no fallback
	/// produced a URL, or it can neither be addressed directly nor retrieved.
	///
	/// # Errors
	/// Returns [`ResolveError::InlineBinary`] if inline binary content cannot be decoded.
	#[instrument(skip_all, fields(tag = %params.tag, sop_instance_uid = %instance.sop_instance_uid))]
	pub fn resolve(
		&self,
		instance: &Instance,
		params: &RequestParams,
	) -> Result<Option<DirectUrl>, ResolveError> {
		if let Some(url) = &params.url {
			return Ok(Some(DirectUrl::Resolved(url.clone())));
		}

		let value = match instance.attribute(&params.tag) {
			None => return Ok(self.absent(instance, params).map(DirectUrl::Resolved)),
			Some(AttributeValue::BulkData(value)) => value,
			Some(AttributeValue::Other(_)) => &EMPTY_VALUE,
		};

		if let Some(url) = &value.direct_retrieve_url {
			trace!(url, "Using DirectRetrieveURL of instance metadata");
			return Ok(Some(DirectUrl::Resolved(url.clone())));
		}

		let key = CacheKey::new(&instance.sop_instance_uid, &params.tag);
		if let Some(url) = self.cache.get(&key) {
			trace!(url, "Using memoized URL");
			return Ok(Some(DirectUrl::Resolved(url)));
		}

		if let Some(inline_binary) = &value.inline_binary {
			let blob = decode_inline_binary(inline_binary, params.default_type.clone()).map_err(
				|source| ResolveError::InlineBinary {
					tag: params.tag.clone(),
					source,
				},
			)?;
			let url = self.cache.insert(key, self.allocator.create_object_url(blob));
			return Ok(Some(DirectUrl::Resolved(url)));
		}

		if !self.config.singlepart.allows(&params.fetch_part) {
			let Some(retriever) = &value.retriever else {
				warn!(
					tag = %params.tag,
					sop_instance_uid = %instance.sop_instance_uid,
					"Unable to retrieve bulk data without single part support or a retriever"
				);
				return Ok(None);
			};
			return Ok(Some(DirectUrl::Pending(self.retrieve(
				key,
				Arc::clone(retriever),
				params,
			))));
		}

		Ok(Some(DirectUrl::Resolved(self.direct_url(
			instance, value, params,
		))))
	}

	/// Resolves and waits for the URL.
	///
	/// # Errors
	/// Returns a [`ResolveError`] if decoding or retrieving the binary content failed.
	pub async fn resolve_url(
		&self,
		instance: &Instance,
		params: &RequestParams,
	) -> Result<Option<String>, ResolveError> {
		match self.resolve(instance, params)? {
			Some(url) => url.into_url().await.map(Some),
			None => Ok(None),
		}
	}

	/// Drops memoized URLs of an instance, e.g. when its metadata is evicted.
	pub fn forget_instance(&self, sop_instance_uid: &str) -> usize {
		self.cache.forget_instance(sop_instance_uid)
	}

	pub fn clear(&self) {
		self.cache.clear();
	}

	fn absent(&self, instance: &Instance, params: &RequestParams) -> Option<String> {
		let url = self
			.rendered_retrieve
			.as_ref()
			.and_then(|rendered| rendered.rendered_url(&self.config, instance, params))
			.or_else(|| {
				self.bulkdata_fallback
					.as_ref()
					.and_then(|fallback| fallback.fallback_url(&self.config, instance, params))
			});
		if url.is_none() {
			debug!("Attribute is absent and no fallback produced a URL");
		}
		url
	}

	fn retrieve(
		&self,
		key: CacheKey,
		retriever: Arc<dyn BulkDataRetriever>,
		params: &RequestParams,
	) -> BoxFuture<'static, Result<String, ResolveError>> {
		let cell = self.cache.entry(key);
		let allocator = Arc::clone(&self.allocator);
		let media_type = params.default_type.clone();
		let tag = params.tag.clone();

		async move {
			let url = cell
				.get_or_try_init(|| async move {
					debug!(media_type = media_type.as_ref(), "Retrieving bulk data");
					let data = retriever
						.retrieve(RetrieveOptions {
							media_type: media_type.clone(),
						})
						.await?;
					let url = allocator.create_object_url(Blob::new(data, media_type));
					Ok::<_, RetrieveError>(url)
				})
				.await
				.map_err(|source| ResolveError::Retrieve { tag, source })?;
			Ok(url.clone())
		}
		.instrument(Span::current())
		.boxed()
	}

	/// Builds a WADO-RS URL for an attribute that may be retrieved as a single part.
	fn direct_url(
		&self,
		instance: &Instance,
		value: &BulkDataValue,
		params: &RequestParams,
	) -> String {
		let bulk_data_uri = value
			.bulk_data_uri
			.clone()
			.unwrap_or_else(|| uri::default_bulk_data_uri(instance, &params.default_path));
		let accept_uri = uri::with_accept(&bulk_data_uri, &params.default_type);

		if is_renderable(&params.tag) && !uri::has_query(&bulk_data_uri) {
			return uri::rendered(&self.config, instance);
		}

		uri::absolute(&self.config, instance, accept_uri)
	}
}
