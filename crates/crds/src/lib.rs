//! Metal CRD Definitions
//!
//! Kubernetes Custom Resource Definitions for the bare-metal provisioning
//! controllers, plus typed mirrors of the external BMC and hardware resources
//! they drive.

pub mod address_pool;
pub mod baseboard;
pub mod cluster;
pub mod conditions;
pub mod hardware;
pub mod inventory;
pub mod references;

pub use address_pool::*;
pub use baseboard::*;
pub use cluster::*;
pub use conditions::*;
pub use hardware::*;
pub use inventory::*;
pub use references::*;
