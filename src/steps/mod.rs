//! The provisioning steps
//!
//! Each submodule implements one [`crate::pipeline::Step`]. Steps run in
//! the fixed order assembled by `Pipeline::standard`.

pub mod hardening;
pub mod hostname;
pub mod keysync;
pub mod packages;
pub mod reboot;
pub mod runtime;
pub mod storage;
pub mod swarm_join;

pub use hardening::HardenStep;
pub use hostname::HostnameStep;
pub use keysync::KeySyncStep;
pub use packages::PackageStep;
pub use reboot::RebootStep;
pub use runtime::RuntimeStep;
pub use storage::StorageStep;
pub use swarm_join::JoinStep;
