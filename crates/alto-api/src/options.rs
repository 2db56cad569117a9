// Per-call options.
//
// Every operation takes one immutable `ApiOptions` value instead of a pile
// of optional parameters. Call options are layered over the session's
// defaults key-wise (call wins) by a pure function with no I/O, then the
// effective set is rendered into headers and query parameters.

use tokio_util::sync::CancellationToken;
use url::Url;

/// Query keys the session renders from structured options. A free-form param
/// with one of these keys is dropped when the structured option is set, so a
/// call can never send the same key twice.
const RESERVED_KEYS: [&str; 5] = [
    "name",
    "cloud",
    "cloud_ref.uuid",
    "skip_default",
    "include_name",
];

/// An immutable bag of per-call overrides.
///
/// Construct one per invocation with the `with_*` setters, pass it by
/// reference, and discard it after the call. Setting the same free-form
/// param key twice keeps the later value -- keys are unique.
///
/// ```
/// use alto_api::ApiOptions;
///
/// let opts = ApiOptions::new()
///     .with_tenant("marketing")
///     .with_cloud("aws-east")
///     .with_param("fields", "name,uuid");
/// assert_eq!(opts.tenant(), Some("marketing"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct ApiOptions {
    tenant: Option<String>,
    version: Option<String>,
    cloud: Option<String>,
    cloud_uuid: Option<String>,
    name: Option<String>,
    include_name: Option<bool>,
    skip_default: Option<bool>,
    page_size: Option<u32>,
    params: Vec<(String, String)>,
    cancel: Option<CancellationToken>,
}

impl ApiOptions {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Builder-style setters ────────────────────────────────────────

    /// Tenant to scope the call to (sent as a request header).
    pub fn with_tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant = Some(tenant.into());
        self
    }

    /// API version the request should be interpreted against
    /// (sent as a request header).
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Cloud scope, by name.
    pub fn with_cloud(mut self, cloud: impl Into<String>) -> Self {
        self.cloud = Some(cloud.into());
        self
    }

    /// Cloud scope, by UUID. Ignored when a cloud name is also set.
    pub fn with_cloud_uuid(mut self, cloud_uuid: impl Into<String>) -> Self {
        self.cloud_uuid = Some(cloud_uuid.into());
        self
    }

    /// Name-equality filter for object resolution.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Ask the controller to render reference fields with names attached.
    pub fn with_include_name(mut self, include_name: bool) -> Self {
        self.include_name = Some(include_name);
        self
    }

    /// Exclude controller-default objects from listings.
    pub fn with_skip_default(mut self, skip_default: bool) -> Self {
        self.skip_default = Some(skip_default);
        self
    }

    /// Page size for collection walks.
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size);
        self
    }

    /// Free-form query parameter, passed through opaquely. Setting the same
    /// key again replaces the earlier value.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        self.params.retain(|(k, _)| *k != key);
        self.params.push((key, value.into()));
        self
    }

    /// Cancellation token observed before each network round trip.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn tenant(&self) -> Option<&str> {
        self.tenant.as_deref()
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn page_size(&self) -> Option<u32> {
        self.page_size
    }

    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    pub(crate) fn cancellation(&self) -> Option<&CancellationToken> {
        self.cancel.as_ref()
    }

    // ── Resolution ───────────────────────────────────────────────────

    /// Layer these call options over session-wide defaults.
    ///
    /// Pure, key-wise override: a key set on `self` wins over the same key
    /// in `defaults`; everything else is inherited. Free-form params merge
    /// the same way, preserved opaquely for keys the session itself does
    /// not interpret.
    pub fn layered_over(&self, defaults: &Self) -> Self {
        let mut out = defaults.clone();
        if self.tenant.is_some() {
            out.tenant.clone_from(&self.tenant);
        }
        if self.version.is_some() {
            out.version.clone_from(&self.version);
        }
        if self.cloud.is_some() {
            out.cloud.clone_from(&self.cloud);
        }
        if self.cloud_uuid.is_some() {
            out.cloud_uuid.clone_from(&self.cloud_uuid);
        }
        if self.name.is_some() {
            out.name.clone_from(&self.name);
        }
        if self.include_name.is_some() {
            out.include_name = self.include_name;
        }
        if self.skip_default.is_some() {
            out.skip_default = self.skip_default;
        }
        if self.page_size.is_some() {
            out.page_size = self.page_size;
        }
        for (key, value) in &self.params {
            out.params.retain(|(k, _)| k != key);
            out.params.push((key.clone(), value.clone()));
        }
        if self.cancel.is_some() {
            out.cancel.clone_from(&self.cancel);
        }
        out
    }

    // ── Rendering ────────────────────────────────────────────────────

    /// True if the options carry something the resolver can filter on.
    pub(crate) fn has_filter(&self) -> bool {
        self.name.is_some() || !self.params.is_empty()
    }

    /// Human-readable description of the active filter, for resolution errors.
    pub(crate) fn selector(&self) -> String {
        if let Some(name) = &self.name {
            return format!("name '{name}'");
        }
        let filters: Vec<String> = self
            .params
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        format!("filter [{}]", filters.join(", "))
    }

    /// Append the query parameters this option set implies onto `url`.
    /// Values are percent-encoded by the URL serializer.
    pub(crate) fn apply_query(&self, url: &mut Url, paged: bool) {
        let mut pairs: Vec<(&str, String)> = Vec::new();
        if let Some(name) = &self.name {
            pairs.push(("name", name.clone()));
        }
        if let Some(cloud) = &self.cloud {
            pairs.push(("cloud", cloud.clone()));
        } else if let Some(cloud_uuid) = &self.cloud_uuid {
            pairs.push(("cloud_ref.uuid", cloud_uuid.clone()));
        }
        if self.skip_default == Some(true) {
            pairs.push(("skip_default", "true".to_owned()));
        }
        if self.include_name == Some(true) {
            pairs.push(("include_name", "true".to_owned()));
        }
        for (key, value) in &self.params {
            if RESERVED_KEYS.contains(&key.as_str()) && self.renders_reserved(key) {
                continue;
            }
            pairs.push((key.as_str(), value.clone()));
        }
        if paged {
            if let Some(page_size) = self.page_size {
                pairs.push(("page_size", page_size.to_string()));
            }
        }
        if pairs.is_empty() {
            return;
        }
        let mut serializer = url.query_pairs_mut();
        for (key, value) in pairs {
            serializer.append_pair(key, &value);
        }
    }

    /// True if the structured option shadowing this reserved key is set,
    /// i.e. the key is already rendered and the free-form copy must be
    /// dropped.
    fn renders_reserved(&self, key: &str) -> bool {
        match key {
            "name" => self.name.is_some(),
            "cloud" => self.cloud.is_some(),
            "cloud_ref.uuid" => self.cloud.is_none() && self.cloud_uuid.is_some(),
            "skip_default" => self.skip_default == Some(true),
            "include_name" => self.include_name == Some(true),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn query_of(opts: &ApiOptions, paged: bool) -> String {
        let mut url = Url::parse("https://ctrl.example.com/api/pool").unwrap();
        opts.apply_query(&mut url, paged);
        url.query().unwrap_or_default().to_owned()
    }

    #[test]
    fn call_option_wins_over_default() {
        let defaults = ApiOptions::new().with_tenant("admin").with_version("24.1.1");
        let call = ApiOptions::new().with_tenant("marketing");

        let effective = call.layered_over(&defaults);

        assert_eq!(effective.tenant(), Some("marketing"));
        assert_eq!(effective.version(), Some("24.1.1"));
    }

    #[test]
    fn params_merge_key_wise() {
        let defaults = ApiOptions::new()
            .with_param("fields", "name,uuid")
            .with_param("refers_to", "virtualservice:vs-1");
        let call = ApiOptions::new().with_param("fields", "name");

        let effective = call.layered_over(&defaults);

        let fields: Vec<_> = effective
            .params()
            .iter()
            .filter(|(k, _)| k == "fields")
            .collect();
        assert_eq!(fields, vec![&("fields".to_owned(), "name".to_owned())]);
        assert!(
            effective.params().iter().any(|(k, _)| k == "refers_to"),
            "unrecognized default param must be preserved"
        );
    }

    #[test]
    fn later_param_overrides_earlier() {
        let opts = ApiOptions::new()
            .with_param("page", "1")
            .with_param("page", "2");
        assert_eq!(opts.params(), [("page".to_owned(), "2".to_owned())]);
    }

    #[test]
    fn cloud_name_takes_precedence_over_cloud_uuid() {
        let opts = ApiOptions::new()
            .with_cloud("aws-east")
            .with_cloud_uuid("cloud-123");
        assert_eq!(query_of(&opts, false), "cloud=aws-east");
    }

    #[test]
    fn query_rendering_encodes_values() {
        let opts = ApiOptions::new().with_name("web pool/1");
        assert_eq!(query_of(&opts, false), "name=web+pool%2F1");
    }

    #[test]
    fn free_form_param_dropped_when_structured_twin_set() {
        let opts = ApiOptions::new().with_name("p1").with_param("name", "p2");
        assert_eq!(query_of(&opts, false), "name=p1");
    }

    #[test]
    fn page_size_only_rendered_for_paged_requests() {
        let opts = ApiOptions::new().with_page_size(100);
        assert_eq!(query_of(&opts, false), "");
        assert_eq!(query_of(&opts, true), "page_size=100");
    }

    #[test]
    fn no_query_appended_for_empty_options() {
        let mut url = Url::parse("https://ctrl.example.com/api/pool").unwrap();
        ApiOptions::new().apply_query(&mut url, false);
        assert_eq!(url.as_str(), "https://ctrl.example.com/api/pool");
    }

    #[test]
    fn selector_describes_name_or_params() {
        assert_eq!(ApiOptions::new().with_name("p1").selector(), "name 'p1'");
        assert_eq!(
            ApiOptions::new()
                .with_param("cloud_ref.name", "aws")
                .selector(),
            "filter [cloud_ref.name=aws]"
        );
    }
}
