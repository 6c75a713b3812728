//! String construction of WADO-RS retrieve URLs.
//!
//! <https://dicom.nema.org/medical/dicom/current/output/chtml/part18/sect_10.4.html>
use crate::config::ResolverConfig;
use crate::metadata::Instance;
use mime::Mime;

/// `series/{series}/instances/{instance}{default_path}`, relative to the study resource.
pub fn default_bulk_data_uri(instance: &Instance, default_path: &str) -> String {
	format!(
		"series/{}/instances/{}{default_path}",
		instance.series_instance_uid, instance.sop_instance_uid
	)
}

pub fn has_query(uri: &str) -> bool {
	uri.contains('?')
}

/// Appends `accept={media_type}` unless the URI already selects a media type.
///
/// The `accept` query parameter is the URL equivalent of the Accept header, see
/// <https://dicom.nema.org/medical/dicom/current/output/chtml/part18/sect_8.3.3.html>
pub fn with_accept(uri: &str, media_type: &Mime) -> String {
	if uri.contains("accept=") {
		return uri.to_owned();
	}
	let separator = if has_query(uri) { '&' } else { '?' };
	format!("{uri}{separator}accept={media_type}")
}

/// Resolves a series-relative URI against the study resource. Other URIs are returned unchanged.
pub fn absolute(config: &ResolverConfig, instance: &Instance, uri: String) -> String {
	if uri.starts_with("series") {
		format!(
			"{}/studies/{}/{uri}",
			config.wado_root, instance.study_instance_uid
		)
	} else {
		uri
	}
}

/// The instance-level rendered resource.
pub fn rendered(config: &ResolverConfig, instance: &Instance) -> String {
	format!(
		"{}/studies/{}/series/{}/instances/{}/rendered",
		config.wado_root,
		instance.study_instance_uid,
		instance.series_instance_uid,
		instance.sop_instance_uid
	)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::Singlepart;

	fn instance() -> Instance {
		Instance::new("1.2", "1.2.3", "1.2.3.4")
	}

	#[test]
	fn accept_parameter() {
		let mp4: Mime = "video/mp4".parse().unwrap();

		assert_eq!(
			with_accept("series/1/instances/2/pixeldata", &mp4),
			"series/1/instances/2/pixeldata?accept=video/mp4"
		);
		assert_eq!(
			with_accept("series/1/instances/2/pixeldata?foo=bar", &mp4),
			"series/1/instances/2/pixeldata?foo=bar&accept=video/mp4"
		);
		assert_eq!(
			with_accept("bulk/7fe00010?accept=application/json", &mp4),
			"bulk/7fe00010?accept=application/json"
		);
	}

	#[test]
	fn study_relative_uris() {
		let config = ResolverConfig::new("http://host/wado", Singlepart::All);
		let instance = instance();

		assert_eq!(
			default_bulk_data_uri(&instance, "/pixeldata"),
			"series/1.2.3/instances/1.2.3.4/pixeldata"
		);
		assert_eq!(
			absolute(&config, &instance, String::from("series/1.2.3/bulkdata")),
			"http://host/wado/studies/1.2/series/1.2.3/bulkdata"
		);
		assert_eq!(
			absolute(&config, &instance, String::from("https://cdn/bulk/1")),
			"https://cdn/bulk/1"
		);
		assert_eq!(
			rendered(&config, &instance),
			"http://host/wado/studies/1.2/series/1.2.3/instances/1.2.3.4/rendered"
		);
	}
}
