use dicom::core::Tag;
use dicom::dictionary_std::tags;

/// UI (Unique Identifier) value representation.
pub type UI = String;

/// The keyword of a DICOM attribute as used by naturalized DICOM JSON, e.g. `PixelData`.
pub type Keyword = String;

pub const PIXEL_DATA: &str = "PixelData";
pub const ENCAPSULATED_DOCUMENT: &str = "EncapsulatedDocument";
pub const STUDY_INSTANCE_UID: &str = "StudyInstanceUID";
pub const SERIES_INSTANCE_UID: &str = "SeriesInstanceUID";
pub const SOP_INSTANCE_UID: &str = "SOPInstanceUID";

/// Attributes that are served by the `/rendered` resource of an instance when they are not
/// addressed through an explicit query.
pub const RENDERABLE_ATTRIBUTES: [&str; 2] = [PIXEL_DATA, ENCAPSULATED_DOCUMENT];

pub fn is_renderable(keyword: &str) -> bool {
	RENDERABLE_ATTRIBUTES.contains(&keyword)
}

/// Tags that may carry bulk data in DICOM JSON, independent of their value representation.
pub const BULKDATA_TAGS: [Tag; 5] = [
	tags::PIXEL_DATA,
	tags::FLOAT_PIXEL_DATA,
	tags::DOUBLE_FLOAT_PIXEL_DATA,
	tags::SPECTROSCOPY_DATA,
	tags::ENCAPSULATED_DOCUMENT,
];
