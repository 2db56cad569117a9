// Generic CRUD surface.
//
// Each operation is a short linear pipeline: resolve effective options,
// validate the path, issue the transport call, decode into the caller's
// destination type. The destination's shape is the caller's business; this
// layer only shuttles JSON in and out of it.

use bytes::Bytes;
use reqwest::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::trace;

use crate::error::Error;
use crate::options::ApiOptions;
use crate::path::ApiPath;
use crate::session::{Session, decode_body};

/// How a partial-update payload is applied server-side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchOp {
    /// Merge the payload's entries into the object.
    Add,
    /// Replace the addressed fields with the payload.
    Replace,
    /// Remove the addressed fields/entries.
    Delete,
}

impl PatchOp {
    /// The wire key the payload is wrapped under.
    pub fn key(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Replace => "replace",
            Self::Delete => "delete",
        }
    }
}

impl Session {
    /// Fetch one resource (or any GET-able endpoint) into `T`.
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &ApiPath,
        options: &ApiOptions,
    ) -> Result<T, Error> {
        let opts = options.layered_over(&self.defaults);
        let url = self.build_url(&path.uri(), &opts, false)?;
        let raw = self.send_api(Method::GET, url, None, &opts).await?;
        decode_body(&raw.body)
    }

    /// Fetch a GET-able endpoint and return the raw body.
    pub async fn get_raw(&self, path: &ApiPath, options: &ApiOptions) -> Result<Bytes, Error> {
        let opts = options.layered_over(&self.defaults);
        let url = self.build_url(&path.uri(), &opts, false)?;
        let raw = self.send_api(Method::GET, url, None, &opts).await?;
        Ok(raw.body)
    }

    /// Create an object (the controller allocates its UUID), or invoke any
    /// POST endpoint, binding the response into `T`.
    pub async fn post<T, B>(
        &self,
        path: &ApiPath,
        body: &B,
        options: &ApiOptions,
    ) -> Result<T, Error>
    where
        T: DeserializeOwned,
        B: Serialize + Sync,
    {
        let opts = options.layered_over(&self.defaults);
        let payload = serde_json::to_value(body)?;
        let url = self.build_url(&path.uri(), &opts, false)?;
        let raw = self.send_api(Method::POST, url, Some(&payload), &opts).await?;
        decode_body(&raw.body)
    }

    /// POST returning the raw response body.
    pub async fn post_raw<B>(
        &self,
        path: &ApiPath,
        body: &B,
        options: &ApiOptions,
    ) -> Result<Bytes, Error>
    where
        B: Serialize + Sync,
    {
        let opts = options.layered_over(&self.defaults);
        let payload = serde_json::to_value(body)?;
        let url = self.build_url(&path.uri(), &opts, false)?;
        let raw = self.send_api(Method::POST, url, Some(&payload), &opts).await?;
        Ok(raw.body)
    }

    /// Replace an existing object. The path must carry the object's UUID;
    /// a missing identifier fails before any network call.
    pub async fn put<T, B>(
        &self,
        path: &ApiPath,
        body: &B,
        options: &ApiOptions,
    ) -> Result<T, Error>
    where
        T: DeserializeOwned,
        B: Serialize + Sync,
    {
        Self::require_object(path)?;
        let opts = options.layered_over(&self.defaults);
        let payload = serde_json::to_value(body)?;
        let url = self.build_url(&path.uri(), &opts, false)?;
        let raw = self.send_api(Method::PUT, url, Some(&payload), &opts).await?;
        decode_body(&raw.body)
    }

    /// Partially update an existing object.
    ///
    /// The payload may be a value of the resource's own shape or a free-form
    /// map; it is wrapped as `{"<op>": payload}` and forwarded verbatim.
    /// Compatibility with the resource schema is the controller's call -- a
    /// rejection surfaces as [`Error::Api`] with its message intact.
    pub async fn patch<T, B>(
        &self,
        path: &ApiPath,
        payload: &B,
        op: PatchOp,
        options: &ApiOptions,
    ) -> Result<T, Error>
    where
        T: DeserializeOwned,
        B: Serialize + Sync,
    {
        Self::require_object(path)?;
        let opts = options.layered_over(&self.defaults);
        let payload = json!({ op.key(): serde_json::to_value(payload)? });
        let url = self.build_url(&path.uri(), &opts, false)?;
        let raw = self.send_api(Method::PATCH, url, Some(&payload), &opts).await?;
        decode_body(&raw.body)
    }

    /// Delete an object by path. The path must carry the object's UUID.
    ///
    /// Scoping options (tenant, params) apply as on every other call, so
    /// this also covers filtered deletes. Deleting an already-deleted UUID
    /// surfaces the controller's classification (usually a 404
    /// [`Error::Api`]), never a silent success.
    pub async fn delete(&self, path: &ApiPath, options: &ApiOptions) -> Result<(), Error> {
        Self::require_object(path)?;
        let opts = options.layered_over(&self.defaults);
        let url = self.build_url(&path.uri(), &opts, false)?;
        let raw = self.send_api(Method::DELETE, url, None, &opts).await?;
        trace!("DELETE {} -> {}", path, raw.status);
        Ok(())
    }

    /// Delete with a request body, for controllers whose delete endpoints
    /// take disposition payloads.
    pub async fn delete_with_body<B>(
        &self,
        path: &ApiPath,
        body: &B,
        options: &ApiOptions,
    ) -> Result<(), Error>
    where
        B: Serialize + Sync,
    {
        Self::require_object(path)?;
        let opts = options.layered_over(&self.defaults);
        let payload = serde_json::to_value(body)?;
        let url = self.build_url(&path.uri(), &opts, false)?;
        let raw = self
            .send_api(Method::DELETE, url, Some(&payload), &opts)
            .await?;
        trace!("DELETE {} -> {}", path, raw.status);
        Ok(())
    }

    /// Mutating operations on a specific object need a non-empty identifier.
    fn require_object(path: &ApiPath) -> Result<(), Error> {
        if path.uuid().is_none() {
            return Err(Error::MissingIdentifier { path: path.uri() });
        }
        Ok(())
    }
}
