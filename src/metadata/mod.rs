pub mod naturalize;

use crate::retrieve::BulkDataRetriever;
use crate::types::{Keyword, UI};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// Naturalized metadata of a single DICOM instance, keyed by attribute keyword.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Instance {
	#[serde(rename = "StudyInstanceUID")]
	pub study_instance_uid: UI,
	#[serde(rename = "SeriesInstanceUID")]
	pub series_instance_uid: UI,
	#[serde(rename = "SOPInstanceUID")]
	pub sop_instance_uid: UI,
	#[serde(flatten)]
	pub attributes: HashMap<Keyword, AttributeValue>,
}

impl Instance {
	pub fn new(
		study_instance_uid: impl Into<UI>,
		series_instance_uid: impl Into<UI>,
		sop_instance_uid: impl Into<UI>,
	) -> Self {
		Self {
			study_instance_uid: study_instance_uid.into(),
			series_instance_uid: series_instance_uid.into(),
			sop_instance_uid: sop_instance_uid.into(),
			attributes: HashMap::new(),
		}
	}

	#[must_use]
	pub fn with_attribute(mut self, keyword: impl Into<Keyword>, value: AttributeValue) -> Self {
		self.attributes.insert(keyword.into(), value);
		self
	}

	/// Returns the value of the attribute. Empty values (`null`, `""`, `0` and `false`) are treated
	/// the same as a missing attribute.
	pub fn attribute(&self, keyword: &str) -> Option<&AttributeValue> {
		self.attributes
			.get(keyword)
			.filter(|value| !value.is_empty())
	}

	pub fn bulk_data(&self, keyword: &str) -> Option<&BulkDataValue> {
		match self.attribute(keyword)? {
			AttributeValue::BulkData(value) => Some(value),
			AttributeValue::Other(_) => None,
		}
	}

	pub fn bulk_data_mut(&mut self, keyword: &str) -> Option<&mut BulkDataValue> {
		match self.attributes.get_mut(keyword)? {
			AttributeValue::BulkData(value) => Some(value),
			AttributeValue::Other(_) => None,
		}
	}

	/// Attaches a retrieval capability to a bulk-data attribute.
	/// Returns `false` if the instance has no bulk-data value for `keyword`.
	pub fn attach_retriever(
		&mut self,
		keyword: &str,
		retriever: Arc<dyn BulkDataRetriever>,
	) -> bool {
		let Some(value) = self.bulk_data_mut(keyword) else {
			return false;
		};
		value.retriever = Some(retriever);
		true
	}
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum AttributeValue {
	BulkData(BulkDataValue),
	Other(Value),
}

impl AttributeValue {
	const BULK_DATA_KEYS: [&'static str; 3] = ["DirectRetrieveURL", "InlineBinary", "BulkDataURI"];

	fn is_empty(&self) -> bool {
		match self {
			Self::BulkData(_) => false,
			Self::Other(Value::Null) => true,
			Self::Other(Value::Bool(value)) => !value,
			Self::Other(Value::String(value)) => value.is_empty(),
			Self::Other(Value::Number(value)) => value.as_f64() == Some(0.0),
			Self::Other(_) => false,
		}
	}
}

/// Objects carrying any bulk-data location become [`AttributeValue::BulkData`], other keys such as
/// `vr` are ignored. Everything else is kept as a plain value.
impl<'de> Deserialize<'de> for AttributeValue {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		let value = Value::deserialize(deserializer)?;
		let is_bulk_data = value
			.as_object()
			.is_some_and(|object| Self::BULK_DATA_KEYS.iter().any(|key| object.contains_key(*key)));
		if !is_bulk_data {
			return Ok(Self::Other(value));
		}
		serde_json::from_value(value)
			.map(Self::BulkData)
			.map_err(serde::de::Error::custom)
	}
}

impl From<BulkDataValue> for AttributeValue {
	fn from(value: BulkDataValue) -> Self {
		Self::BulkData(value)
	}
}

impl From<Value> for AttributeValue {
	fn from(value: Value) -> Self {
		Self::Other(value)
	}
}

/// The value of an attribute that refers to binary content.
///
/// At most one of the locations is expected to be set by the origin server, but a metadata layer
/// may layer a `DirectRetrieveURL` or a retriever on top of either.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct BulkDataValue {
	#[serde(rename = "DirectRetrieveURL", skip_serializing_if = "Option::is_none")]
	pub direct_retrieve_url: Option<String>,
	#[serde(rename = "InlineBinary", skip_serializing_if = "Option::is_none")]
	pub inline_binary: Option<String>,
	#[serde(rename = "BulkDataURI", skip_serializing_if = "Option::is_none")]
	pub bulk_data_uri: Option<String>,
	#[serde(skip)]
	pub retriever: Option<Arc<dyn BulkDataRetriever>>,
}

impl BulkDataValue {
	pub const fn empty() -> Self {
		Self {
			direct_retrieve_url: None,
			inline_binary: None,
			bulk_data_uri: None,
			retriever: None,
		}
	}

	pub fn with_bulk_data_uri(uri: impl Into<String>) -> Self {
		Self {
			bulk_data_uri: Some(uri.into()),
			..Self::empty()
		}
	}

	pub fn with_inline_binary(encoded: impl Into<String>) -> Self {
		Self {
			inline_binary: Some(encoded.into()),
			..Self::empty()
		}
	}

	pub fn with_direct_retrieve_url(url: impl Into<String>) -> Self {
		Self {
			direct_retrieve_url: Some(url.into()),
			..Self::empty()
		}
	}

	pub fn with_retriever(retriever: Arc<dyn BulkDataRetriever>) -> Self {
		Self {
			retriever: Some(retriever),
			..Self::empty()
		}
	}
}

impl Debug for BulkDataValue {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("BulkDataValue")
			.field("direct_retrieve_url", &self.direct_retrieve_url)
			.field(
				"inline_binary",
				&self.inline_binary.as_ref().map(String::len),
			)
			.field("bulk_data_uri", &self.bulk_data_uri)
			.field("retriever", &self.retriever.is_some())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn deserialize_naturalized_instance() {
		let instance: Instance = serde_json::from_value(json!({
			"StudyInstanceUID": "1.2.3",
			"SeriesInstanceUID": "1.2.3.4",
			"SOPInstanceUID": "1.2.3.4.5",
			"Modality": "US",
			"PatientName": { "Alphabetic": "DOE^JANE" },
			"PixelData": { "BulkDataURI": "series/1.2.3.4/instances/1.2.3.4.5/frames/1" },
			"EncapsulatedDocument": { "InlineBinary": "JVBERi0=" },
			"IconImageSequence": null
		}))
		.unwrap();

		assert_eq!(instance.sop_instance_uid, "1.2.3.4.5");
		assert_eq!(
			instance.bulk_data("PixelData").unwrap().bulk_data_uri.as_deref(),
			Some("series/1.2.3.4/instances/1.2.3.4.5/frames/1")
		);
		assert_eq!(
			instance
				.bulk_data("EncapsulatedDocument")
				.unwrap()
				.inline_binary
				.as_deref(),
			Some("JVBERi0=")
		);
		assert!(matches!(
			instance.attribute("PatientName"),
			Some(AttributeValue::Other(_))
		));
		assert!(matches!(
			instance.attribute("Modality"),
			Some(AttributeValue::Other(_))
		));
		assert!(instance.attribute("IconImageSequence").is_none());
		assert!(instance.attribute("AudioSampleData").is_none());
	}

	#[test]
	fn bulk_data_keeps_locations_next_to_vr() {
		let instance: Instance = serde_json::from_value(json!({
			"StudyInstanceUID": "1",
			"SeriesInstanceUID": "2",
			"SOPInstanceUID": "3",
			"PixelData": { "vr": "OB", "BulkDataURI": "https://cdn/bulk/3?token=abc" },
			"EncapsulatedDocument": { "vr": "OB", "InlineBinary": "JVBERi0xLjc=" },
			"PatientName": { "Alphabetic": "DOE^JANE" },
			"ReferencedImageSequence": {}
		}))
		.unwrap();

		assert_eq!(
			instance.bulk_data("PixelData").unwrap().bulk_data_uri.as_deref(),
			Some("https://cdn/bulk/3?token=abc")
		);
		assert_eq!(
			instance
				.bulk_data("EncapsulatedDocument")
				.unwrap()
				.inline_binary
				.as_deref(),
			Some("JVBERi0xLjc=")
		);
		assert!(instance.bulk_data("PatientName").is_none());
		assert!(instance.bulk_data("ReferencedImageSequence").is_none());
		assert!(instance.attribute("ReferencedImageSequence").is_some());
	}

	#[test]
	fn malformed_bulk_data_is_rejected() {
		let result = serde_json::from_value::<Instance>(json!({
			"StudyInstanceUID": "1",
			"SeriesInstanceUID": "2",
			"SOPInstanceUID": "3",
			"PixelData": { "BulkDataURI": 42 }
		}));

		assert!(result.is_err());
	}

	#[test]
	fn empty_values_are_absent() {
		let instance = Instance::new("1", "2", "3")
			.with_attribute("PixelData", json!("").into())
			.with_attribute("EncapsulatedDocument", json!(0).into())
			.with_attribute("SpectroscopyData", json!(false).into())
			.with_attribute("FloatPixelData", json!(null).into())
			.with_attribute("Modality", json!("OT").into())
			.with_attribute("NumberOfFrames", json!(1).into())
			.with_attribute("BurnedInAnnotation", json!(true).into())
			.with_attribute("ImageType", json!([]).into());

		for keyword in [
			"PixelData",
			"EncapsulatedDocument",
			"SpectroscopyData",
			"FloatPixelData",
		] {
			assert!(instance.attribute(keyword).is_none(), "{keyword}");
		}
		for keyword in ["Modality", "NumberOfFrames", "BurnedInAnnotation", "ImageType"] {
			assert!(instance.attribute(keyword).is_some(), "{keyword}");
		}
	}

	#[test]
	fn attach_retriever_requires_bulk_data() {
		use crate::retrieve::{RetrieveError, RetrieveFn, RetrieveOptions};
		use bytes::Bytes;

		let retriever: Arc<dyn BulkDataRetriever> = Arc::new(RetrieveFn(|_: RetrieveOptions| async {
			Ok::<_, RetrieveError>(Bytes::new())
		}));
		let mut instance = Instance::new("1", "2", "3")
			.with_attribute("PixelData", BulkDataValue::empty().into())
			.with_attribute("Modality", json!("OT").into());

		assert!(instance.attach_retriever("PixelData", Arc::clone(&retriever)));
		assert!(!instance.attach_retriever("Modality", Arc::clone(&retriever)));
		assert!(!instance.attach_retriever("EncapsulatedDocument", retriever));
		assert!(instance.bulk_data("PixelData").unwrap().retriever.is_some());
	}

	#[test]
	fn serialize_skips_unset_locations() {
		let instance = Instance::new("1", "2", "3").with_attribute(
			"PixelData",
			BulkDataValue::with_direct_retrieve_url("blob:null/abc").into(),
		);

		assert_eq!(
			serde_json::to_value(&instance).unwrap(),
			json!({
				"StudyInstanceUID": "1",
				"SeriesInstanceUID": "2",
				"SOPInstanceUID": "3",
				"PixelData": { "DirectRetrieveURL": "blob:null/abc" }
			})
		);
	}
}
