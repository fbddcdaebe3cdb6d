// Middleware for the trust planes
// edge = gateway ingress filter, trust = per-service kernel, extract =
// hybrid credential extraction shared by both.

pub mod cors;
pub mod edge;
pub mod extract;
pub mod trust;

pub use cors::dynamic_cors;
pub use edge::{edge_validator, Decoration, EdgeRejection};
pub use extract::{
    extract_access_token, extract_refresh_token, ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE,
};
pub use trust::{
    authorize, trust_kernel, Access, Principal, RequestContext, ResourceRef,
};
