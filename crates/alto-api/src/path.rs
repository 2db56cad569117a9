// Resource paths.
//
// A path is a fixed per-kind base (`api/{kind}`) plus an optional object
// UUID segment, never mutated after construction. The session refuses to
// issue a mutating request against an object path whose identifier is
// missing, so facades can pass a possibly-absent UUID straight through and
// get a pre-network validation error instead of a confused controller reply.

use std::fmt;

/// Path to a resource collection or to one object within it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiPath {
    kind: String,
    uuid: Option<String>,
}

impl ApiPath {
    /// Path to the listing endpoint of a resource kind: `api/{kind}`.
    pub fn collection(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            uuid: None,
        }
    }

    /// Path to one object: `api/{kind}/{uuid}`.
    ///
    /// An empty UUID is stored as absent, which makes mutating requests on
    /// this path fail validation before any network call.
    pub fn object(kind: impl Into<String>, uuid: impl Into<String>) -> Self {
        let uuid = uuid.into();
        Self {
            kind: kind.into(),
            uuid: (!uuid.is_empty()).then_some(uuid),
        }
    }

    /// The resource kind this path addresses.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// The object identifier, if present and non-empty.
    pub fn uuid(&self) -> Option<&str> {
        self.uuid.as_deref()
    }

    /// Render the request URI relative to the controller root.
    pub fn uri(&self) -> String {
        match &self.uuid {
            Some(uuid) => format!("api/{}/{}", self.kind, uuid),
            None => format!("api/{}", self.kind),
        }
    }
}

impl fmt::Display for ApiPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uri())
    }
}
