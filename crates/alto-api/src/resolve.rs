// Object resolution.
//
// Turns a name (or a structured filter carried entirely in the options)
// into exactly one object by issuing a single filtered listing request --
// not a full collection walk, since a uniquely-filtered result is expected
// to be small. Zero matches and multiple matches are distinct errors; the
// resolver never silently picks the first match.

use reqwest::Method;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::Error;
use crate::options::ApiOptions;
use crate::pagination::CollectionPage;
use crate::path::ApiPath;
use crate::session::{Session, decode_body, decode_value};

impl Session {
    /// Resolve exactly one object of `kind` from the filters in `options`
    /// and bind it into `T`.
    ///
    /// The options must carry a name or at least one free-form filter param;
    /// otherwise the call fails validation before any network activity.
    pub async fn get_object<T: DeserializeOwned>(
        &self,
        kind: &str,
        options: &ApiOptions,
    ) -> Result<T, Error> {
        let value = self.resolve_object(kind, options).await?;
        decode_value(value)
    }

    /// Resolve exactly one object of `kind` by name and bind it into `T`.
    /// Scoping options (tenant, cloud) narrow the lookup as usual.
    pub async fn get_object_by_name<T: DeserializeOwned>(
        &self,
        kind: &str,
        name: &str,
        options: &ApiOptions,
    ) -> Result<T, Error> {
        self.get_object(kind, &options.clone().with_name(name)).await
    }

    /// Delete an object of `kind` by name: resolve, then delete by the
    /// resolved UUID.
    ///
    /// A resolution failure (`NotFound`, `Ambiguous`) is surfaced unchanged
    /// and the delete is never attempted.
    pub async fn delete_object_by_name(
        &self,
        kind: &str,
        name: &str,
        options: &ApiOptions,
    ) -> Result<(), Error> {
        let object: serde_json::Value = self.get_object_by_name(kind, name, options).await?;
        let uuid = object
            .get("uuid")
            .and_then(serde_json::Value::as_str)
            .filter(|uuid| !uuid.is_empty())
            .ok_or_else(|| Error::Deserialization {
                message: format!("resolved {kind} object '{name}' carries no uuid field"),
                body: object.to_string(),
            })?;
        debug!("resolved {kind} '{name}' to {uuid}");
        self.delete(&ApiPath::object(kind, uuid), options).await
    }

    /// One filtered listing request, classified by match count.
    async fn resolve_object(
        &self,
        kind: &str,
        options: &ApiOptions,
    ) -> Result<serde_json::Value, Error> {
        let opts = options.layered_over(&self.defaults);
        if !opts.has_filter() {
            return Err(Error::Validation {
                message: format!("object lookup for '{kind}' requires a name or filter option"),
            });
        }
        let selector = opts.selector();

        let url = self.build_url(&ApiPath::collection(kind).uri(), &opts, false)?;
        let raw = self.send_api(Method::GET, url, None, &opts).await?;
        let page: CollectionPage = decode_body(&raw.body)?;

        let matches = match usize::try_from(page.count) {
            Ok(count) if count > 0 => count,
            _ => page.results.len(),
        };
        match matches {
            0 => Err(Error::NotFound {
                kind: kind.to_owned(),
                selector,
            }),
            1 => page
                .results
                .into_iter()
                .next()
                .ok_or_else(|| Error::Deserialization {
                    message: format!(
                        "listing of {kind} reported one match for {selector} but returned no results"
                    ),
                    body: String::new(),
                }),
            matches => Err(Error::Ambiguous {
                kind: kind.to_owned(),
                selector,
                matches,
            }),
        }
    }
}
