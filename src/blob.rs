use base64::Engine;
use bytes::Bytes;
use mime::Mime;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use tracing::debug;
use uuid::Uuid;

/// Binary content tagged with its media type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
	pub media_type: Mime,
	pub data: Bytes,
}

impl Blob {
	pub fn new(data: impl Into<Bytes>, media_type: Mime) -> Self {
		Self {
			media_type,
			data: data.into(),
		}
	}

	pub fn len(&self) -> usize {
		self.data.len()
	}

	pub fn is_empty(&self) -> bool {
		self.data.is_empty()
	}
}

/// Decodes the base64 content of an `InlineBinary` attribute into a [`Blob`].
/// ASCII whitespace (e.g. line breaks inserted by encoders) is ignored.
///
/// # Errors
/// Returns a [`base64::DecodeError`] if the payload is not valid standard base64.
pub fn decode_inline_binary(encoded: &str, media_type: Mime) -> Result<Blob, base64::DecodeError> {
	let data = if encoded.bytes().any(|b| b.is_ascii_whitespace()) {
		let compact: String = encoded
			.chars()
			.filter(|c| !c.is_ascii_whitespace())
			.collect();
		base64::engine::general_purpose::STANDARD.decode(compact)?
	} else {
		base64::engine::general_purpose::STANDARD.decode(encoded)?
	};

	Ok(Blob::new(data, media_type))
}

/// Hands out process-local URLs referring to in-memory blobs.
///
/// The caller that receives an object URL owns it and is responsible for revoking it.
pub trait ObjectUrlAllocator: Send + Sync {
	fn create_object_url(&self, blob: Blob) -> String;
}

/// An in-memory [`ObjectUrlAllocator`] issuing `blob:{origin}/{uuid}` URLs.
#[derive(Debug)]
pub struct BlobStore {
	origin: String,
	blobs: RwLock<HashMap<String, Blob>>,
}

impl Default for BlobStore {
	fn default() -> Self {
		Self::new("null")
	}
}

impl BlobStore {
	pub fn new(origin: impl Into<String>) -> Self {
		Self {
			origin: origin.into(),
			blobs: RwLock::new(HashMap::new()),
		}
	}

	pub fn get(&self, url: &str) -> Option<Blob> {
		self.blobs
			.read()
			.unwrap_or_else(PoisonError::into_inner)
			.get(url)
			.cloned()
	}

	/// Releases the blob behind `url`. Returns `false` if the URL was unknown or already revoked.
	pub fn revoke(&self, url: &str) -> bool {
		self.blobs
			.write()
			.unwrap_or_else(PoisonError::into_inner)
			.remove(url)
			.is_some()
	}

	pub fn len(&self) -> usize {
		self.blobs.read().unwrap_or_else(PoisonError::into_inner).len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

impl ObjectUrlAllocator for BlobStore {
	fn create_object_url(&self, blob: Blob) -> String {
		let url = format!("blob:{}/{}", self.origin, Uuid::new_v4());
		debug!(
			url,
			media_type = blob.media_type.as_ref(),
			size = blob.len(),
			"Allocated object URL"
		);
		self.blobs
			.write()
			.unwrap_or_else(PoisonError::into_inner)
			.insert(url.clone(), blob);
		url
	}
}
