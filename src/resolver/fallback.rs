use super::uri;
use super::RequestParams;
use crate::config::ResolverConfig;
use crate::metadata::Instance;
use crate::types::is_renderable;

/// Builds a URL to a server-side rendering of an attribute the instance metadata does not carry.
pub trait RenderedRetrieve: Send + Sync {
	fn rendered_url(
		&self,
		config: &ResolverConfig,
		instance: &Instance,
		params: &RequestParams,
	) -> Option<String>;
}

/// Builds a bulk-data URL for an attribute the instance metadata does not carry.
/// Consulted after [`RenderedRetrieve`].
pub trait BulkDataFallback: Send + Sync {
	fn fallback_url(
		&self,
		config: &ResolverConfig,
		instance: &Instance,
		params: &RequestParams,
	) -> Option<String>;
}

impl<F> RenderedRetrieve for F
where
	F: Fn(&ResolverConfig, &Instance, &RequestParams) -> Option<String> + Send + Sync,
{
	fn rendered_url(
		&self,
		config: &ResolverConfig,
		instance: &Instance,
		params: &RequestParams,
	) -> Option<String> {
		self(config, instance, params)
	}
}

impl<F> BulkDataFallback for F
where
	F: Fn(&ResolverConfig, &Instance, &RequestParams) -> Option<String> + Send + Sync,
{
	fn fallback_url(
		&self,
		config: &ResolverConfig,
		instance: &Instance,
		params: &RequestParams,
	) -> Option<String> {
		self(config, instance, params)
	}
}

/// Addresses absent `PixelData` and `EncapsulatedDocument` attributes through the instance's
/// `/rendered` resource.
#[derive(Debug, Default, Clone, Copy)]
pub struct RenderedEndpoint;

impl RenderedRetrieve for RenderedEndpoint {
	fn rendered_url(
		&self,
		config: &ResolverConfig,
		instance: &Instance,
		params: &RequestParams,
	) -> Option<String> {
		is_renderable(&params.tag).then(|| uri::rendered(config, instance))
	}
}

/// Addresses the attribute through the instance's default path, with an `accept` parameter for the
/// requested media type. When used outside of [`BulkDataUrlResolver`](super::BulkDataUrlResolver),
/// which only falls back for absent attributes, an existing bulk-data URI takes precedence.
#[derive(Debug, Default, Clone, Copy)]
pub struct SeriesBulkData;

impl BulkDataFallback for SeriesBulkData {
	fn fallback_url(
		&self,
		config: &ResolverConfig,
		instance: &Instance,
		params: &RequestParams,
	) -> Option<String> {
		let bulk_data_uri = instance
			.bulk_data(&params.tag)
			.and_then(|value| value.bulk_data_uri.clone())
			.unwrap_or_else(|| uri::default_bulk_data_uri(instance, &params.default_path));
		let accept_uri = uri::with_accept(&bulk_data_uri, &params.default_type);
		Some(uri::absolute(config, instance, accept_uri))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::Singlepart;
	use crate::metadata::BulkDataValue;

	fn config() -> ResolverConfig {
		ResolverConfig::new("http://host/wado", Singlepart::Disabled)
	}

	#[test]
	fn rendered_endpoint_for_renderable_tags() {
		let instance = Instance::new("1", "2", "3");

		assert_eq!(
			RenderedEndpoint.rendered_url(&config(), &instance, &RequestParams::default()),
			Some(String::from(
				"http://host/wado/studies/1/series/2/instances/3/rendered"
			))
		);
		assert_eq!(
			RenderedEndpoint.rendered_url(
				&config(),
				&instance,
				&RequestParams::default().with_tag("EncapsulatedDocument")
			),
			Some(String::from(
				"http://host/wado/studies/1/series/2/instances/3/rendered"
			))
		);
		assert!(RenderedEndpoint
			.rendered_url(
				&config(),
				&instance,
				&RequestParams::default().with_tag("AudioSampleData")
			)
			.is_none());
	}

	#[test]
	fn series_bulk_data_uses_default_path() {
		let instance = Instance::new("1", "2", "3");
		let params = RequestParams::default()
			.with_tag("AudioSampleData")
			.with_default_path("/bulkdata")
			.with_default_type(mime::APPLICATION_OCTET_STREAM);

		assert_eq!(
			SeriesBulkData.fallback_url(&config(), &instance, &params),
			Some(String::from(
				"http://host/wado/studies/1/series/2/instances/3/bulkdata?accept=application/octet-stream"
			))
		);
	}

	#[test]
	fn series_bulk_data_prefers_bulk_data_uri() {
		let instance = Instance::new("1", "2", "3").with_attribute(
			"AudioSampleData",
			BulkDataValue::with_bulk_data_uri("series/2/instances/3/bulkdata/50003000").into(),
		);
		let params = RequestParams::default().with_tag("AudioSampleData");

		assert_eq!(
			SeriesBulkData.fallback_url(&config(), &instance, &params),
			Some(String::from(
				"http://host/wado/studies/1/series/2/instances/3/bulkdata/50003000?accept=video/mp4"
			))
		);
	}

	#[test]
	fn closures_are_fallbacks() {
		let fallback = |config: &ResolverConfig, instance: &Instance, _: &RequestParams| {
			Some(format!("{}/{}", config.wado_root, instance.sop_instance_uid))
		};

		assert_eq!(
			BulkDataFallback::fallback_url(
				&fallback,
				&config(),
				&Instance::new("1", "2", "3"),
				&RequestParams::default()
			),
			Some(String::from("http://host/wado/3"))
		);
	}
}
