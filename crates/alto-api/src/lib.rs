// alto-api: async session and transport core for Alto-family ADC controllers.
//
// One `Session` per controller carries authentication state, option
// defaults, and HTTP semantics; the generated per-resource client crates
// are thin typed wrappers over the generic operations exposed here
// (get / get_collection / get_object_by_name / post / put / patch / delete).

pub mod auth;
pub mod error;
pub mod options;
pub mod pagination;
pub mod path;
pub mod session;
pub mod transport;

mod crud;
mod resolve;

pub use auth::{ControllerProfile, Credentials, TokenProvider};
pub use crud::PatchOp;
pub use error::Error;
pub use options::ApiOptions;
pub use pagination::{Collection, CollectionPage, CollectionPager};
pub use path::ApiPath;
pub use session::{DEFAULT_API_VERSION, DEFAULT_TENANT, Session, SessionBuilder};
pub use transport::{TlsMode, TransportConfig};
