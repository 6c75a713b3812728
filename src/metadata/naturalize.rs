//! Conversion of DICOM JSON (PS3.18 F.2) into naturalized, keyword-keyed [`Instance`]s.
//!
//! ```json
//! { "7FE00010": { "vr": "OW", "BulkDataURI": "series/1/instances/2/bulkdata/7fe00010" } }
//! ```
//! becomes
//! ```json
//! { "PixelData": { "BulkDataURI": "series/1/instances/2/bulkdata/7fe00010" } }
//! ```
use super::{AttributeValue, BulkDataValue, Instance};
use crate::types::{
	Keyword, BULKDATA_TAGS, SERIES_INSTANCE_UID, SOP_INSTANCE_UID, STUDY_INSTANCE_UID,
};
use dicom::core::dictionary::DataDictionary;
use dicom::core::Tag;
use dicom::dictionary_std::StandardDataDictionary;
use serde_json::{Map, Value};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{instrument, trace};

#[derive(Debug, Error)]
pub enum NaturalizeError {
	#[error("`{key}` is not a valid DICOM tag")]
	InvalidTag { key: String },
	#[error("element {key} is not a JSON object")]
	InvalidElement { key: String },
	#[error("instance is missing the {keyword} attribute")]
	MissingAttribute { keyword: &'static str },
	#[error("expected a JSON object or an array of JSON objects")]
	NotAnObject,
	#[error(transparent)]
	Json(#[from] serde_json::Error),
}

/// Loads instances from a metadata document, which may either be DICOM JSON as returned by a
/// WADO-RS metadata request or already naturalized JSON. A single object is accepted as well.
///
/// # Errors
/// Returns a [`NaturalizeError`] if the document is neither of the supported shapes.
#[instrument(skip_all)]
pub fn load_instances(document: Value) -> Result<Vec<Instance>, NaturalizeError> {
	let datasets = match document {
		Value::Array(datasets) => datasets,
		Value::Object(dataset) => vec![Value::Object(dataset)],
		_ => return Err(NaturalizeError::NotAnObject),
	};

	datasets
		.into_iter()
		.map(|dataset| match dataset {
			Value::Object(dataset) if is_dicom_json(&dataset) => naturalize_instance(&dataset),
			Value::Object(dataset) => Ok(serde_json::from_value::<Instance>(Value::Object(dataset))?),
			_ => Err(NaturalizeError::NotAnObject),
		})
		.collect()
}

/// A dataset is DICOM JSON if every key is a tag.
fn is_dicom_json(dataset: &Map<String, Value>) -> bool {
	!dataset.is_empty() && dataset.keys().all(|key| parse_tag(key).is_some())
}

/// Naturalizes one DICOM JSON dataset into an [`Instance`].
///
/// # Errors
/// Returns a [`NaturalizeError`] if a key is not a tag, an element is malformed or one of the
/// identifying UIDs is missing.
pub fn naturalize_instance(dataset: &Map<String, Value>) -> Result<Instance, NaturalizeError> {
	let mut attributes = HashMap::with_capacity(dataset.len());
	for (key, element) in dataset {
		let (keyword, value) = naturalize_element(key, element)?;
		attributes.insert(keyword, value);
	}

	let mut take_uid = |keyword: &'static str| match attributes.remove(keyword) {
		Some(AttributeValue::Other(Value::String(uid))) => Ok(uid),
		_ => Err(NaturalizeError::MissingAttribute { keyword }),
	};

	let study_instance_uid = take_uid(STUDY_INSTANCE_UID)?;
	let series_instance_uid = take_uid(SERIES_INSTANCE_UID)?;
	let sop_instance_uid = take_uid(SOP_INSTANCE_UID)?;
	trace!(sop_instance_uid, "Naturalized instance metadata");

	Ok(Instance {
		study_instance_uid,
		series_instance_uid,
		sop_instance_uid,
		attributes,
	})
}

fn naturalize_element(
	key: &str,
	element: &Value,
) -> Result<(Keyword, AttributeValue), NaturalizeError> {
	let tag = parse_tag(key).ok_or_else(|| NaturalizeError::InvalidTag { key: key.to_owned() })?;
	let Value::Object(element) = element else {
		return Err(NaturalizeError::InvalidElement { key: key.to_owned() });
	};

	let keyword = keyword_of(tag).unwrap_or_else(|| key.to_owned());

	let bulk_data_uri = element.get("BulkDataURI").and_then(Value::as_str);
	let inline_binary = element.get("InlineBinary").and_then(Value::as_str);
	if bulk_data_uri.is_some() || inline_binary.is_some() {
		let value = BulkDataValue {
			bulk_data_uri: bulk_data_uri.map(str::to_owned),
			inline_binary: inline_binary.map(str::to_owned),
			..BulkDataValue::empty()
		};
		return Ok((keyword, value.into()));
	}

	let value = match element.get("Value") {
		Some(Value::Array(values)) => naturalize_values(key, element, values)?,
		Some(_) => return Err(NaturalizeError::InvalidElement { key: key.to_owned() }),
		// A bulk-data attribute without a location still exists on the server and can be
		// addressed through its default path.
		None if BULKDATA_TAGS.contains(&tag) => return Ok((keyword, BulkDataValue::empty().into())),
		None => Value::Null,
	};

	Ok((keyword, AttributeValue::Other(value)))
}

fn naturalize_values(
	key: &str,
	element: &Map<String, Value>,
	values: &[Value],
) -> Result<Value, NaturalizeError> {
	let is_sequence = element.get("vr").and_then(Value::as_str) == Some("SQ");
	let mut naturalized = Vec::with_capacity(values.len());
	for value in values {
		if is_sequence {
			let Value::Object(item) = value else {
				return Err(NaturalizeError::InvalidElement { key: key.to_owned() });
			};
			naturalized.push(Value::Object(naturalize_item(item)?));
		} else {
			naturalized.push(value.clone());
		}
	}

	// Sequences stay arrays even with a single item, multi-valued attributes only with more than one value
	if !is_sequence && naturalized.len() == 1 {
		return Ok(naturalized.swap_remove(0));
	}
	Ok(Value::Array(naturalized))
}

fn naturalize_item(item: &Map<String, Value>) -> Result<Map<String, Value>, NaturalizeError> {
	let mut naturalized = Map::with_capacity(item.len());
	for (key, element) in item {
		let (keyword, value) = naturalize_element(key, element)?;
		naturalized.insert(keyword, attribute_to_json(value));
	}
	Ok(naturalized)
}

fn attribute_to_json(value: AttributeValue) -> Value {
	match value {
		AttributeValue::Other(value) => value,
		AttributeValue::BulkData(value) => {
			let mut object = Map::new();
			if let Some(uri) = value.bulk_data_uri {
				object.insert(String::from("BulkDataURI"), Value::String(uri));
			}
			if let Some(inline) = value.inline_binary {
				object.insert(String::from("InlineBinary"), Value::String(inline));
			}
			Value::Object(object)
		}
	}
}

fn parse_tag(key: &str) -> Option<Tag> {
	if key.len() != 8 || !key.bytes().all(|b| b.is_ascii_hexdigit()) {
		return None;
	}
	let group = u16::from_str_radix(&key[..4], 16).ok()?;
	let element = u16::from_str_radix(&key[4..], 16).ok()?;
	Some(Tag(group, element))
}

fn keyword_of(tag: Tag) -> Option<Keyword> {
	StandardDataDictionary
		.by_tag(tag)
		.map(|entry| entry.alias.to_owned())
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	fn dicom_json() -> Value {
		json!([{
			"0020000D": { "vr": "UI", "Value": ["1.2.840.1"] },
			"0020000E": { "vr": "UI", "Value": ["1.2.840.1.2"] },
			"00080018": { "vr": "UI", "Value": ["1.2.840.1.2.3"] },
			"00080060": { "vr": "CS", "Value": ["XC"] },
			"00080008": { "vr": "CS", "Value": ["ORIGINAL", "PRIMARY"] },
			"00100010": { "vr": "PN", "Value": [{ "Alphabetic": "DOE^JOHN" }] },
			"00081115": { "vr": "SQ", "Value": [{
				"0020000E": { "vr": "UI", "Value": ["1.2.840.9"] }
			}] },
			"00420011": { "vr": "OB", "InlineBinary": "JVBERi0xLjc=" },
			"7FE00010": { "vr": "OW", "BulkDataURI": "http://host/wado/bulk/7fe00010" },
			"00091001": { "vr": "LO", "Value": ["private"] },
			"00200013": { "vr": "IS" }
		}])
	}

	#[test]
	fn naturalize_dicom_json() {
		let instances = load_instances(dicom_json()).unwrap();
		assert_eq!(instances.len(), 1);
		let instance = &instances[0];

		assert_eq!(instance.study_instance_uid, "1.2.840.1");
		assert_eq!(instance.series_instance_uid, "1.2.840.1.2");
		assert_eq!(instance.sop_instance_uid, "1.2.840.1.2.3");
		assert!(instance.attribute("StudyInstanceUID").is_none());

		assert_eq!(
			instance.bulk_data("PixelData").unwrap().bulk_data_uri.as_deref(),
			Some("http://host/wado/bulk/7fe00010")
		);
		assert_eq!(
			instance
				.bulk_data("EncapsulatedDocument")
				.unwrap()
				.inline_binary
				.as_deref(),
			Some("JVBERi0xLjc=")
		);

		let other = |keyword| match instance.attribute(keyword) {
			Some(AttributeValue::Other(value)) => value.clone(),
			_ => panic!("{keyword} should be a plain value"),
		};
		assert_eq!(other("Modality"), json!("XC"));
		assert_eq!(other("ImageType"), json!(["ORIGINAL", "PRIMARY"]));
		assert_eq!(other("PatientName"), json!({ "Alphabetic": "DOE^JOHN" }));
		assert_eq!(
			other("ReferencedSeriesSequence"),
			json!([{ "SeriesInstanceUID": "1.2.840.9" }])
		);
		assert_eq!(other("00091001"), json!("private"));
		// Empty values are treated like missing attributes
		assert!(instance.attribute("InstanceNumber").is_none());
	}

	#[test]
	fn bulk_data_tag_without_location_is_present() {
		let instances = load_instances(json!({
			"0020000D": { "vr": "UI", "Value": ["1"] },
			"0020000E": { "vr": "UI", "Value": ["2"] },
			"00080018": { "vr": "UI", "Value": ["3"] },
			"7FE00010": { "vr": "OW" }
		}))
		.unwrap();

		let pixel_data = instances[0].bulk_data("PixelData").unwrap();
		assert!(pixel_data.bulk_data_uri.is_none());
		assert!(pixel_data.inline_binary.is_none());
	}

	#[test]
	fn naturalized_documents_pass_through() {
		let instances = load_instances(json!([{
			"StudyInstanceUID": "1",
			"SeriesInstanceUID": "2",
			"SOPInstanceUID": "3",
			"PixelData": { "BulkDataURI": "series/2/instances/3/pixeldata" }
		}]))
		.unwrap();

		assert_eq!(instances[0].sop_instance_uid, "3");
		assert!(instances[0].bulk_data("PixelData").is_some());
	}

	#[test]
	fn reject_malformed_documents() {
		assert!(matches!(
			load_instances(json!("metadata")),
			Err(NaturalizeError::NotAnObject)
		));
		assert!(matches!(
			load_instances(json!({
				"0020000D": { "vr": "UI", "Value": ["1"] },
				"0020000E": { "vr": "UI", "Value": ["2"] }
			})),
			Err(NaturalizeError::MissingAttribute {
				keyword: "SOPInstanceUID"
			})
		));
		assert!(matches!(
			load_instances(json!({
				"0020000D": { "vr": "UI", "Value": ["1"] },
				"0020000E": "2"
			})),
			Err(NaturalizeError::InvalidElement { .. })
		));
	}
}
