mod backend;
mod backends;
mod registry;
mod result;

pub use backend::{DetectorBackend, SharedDetector};
pub use backends::StubBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use registry::{build_registry, BackendRegistry};
pub use result::Detection;
