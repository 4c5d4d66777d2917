//! Declarative Object Store Client
//!
//! The boundary between the metal reconcilers and the store that holds
//! Inventory, AddressPool, Cluster, Hardware and BaseboardManagement objects.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use store_client::{KubeStoreClient, StoreClientTrait};
//! use crds::ObjectReference;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = kube::Client::try_default().await?;
//! let store = KubeStoreClient::new(client, Duration::from_secs(30));
//!
//! let pool = store.get_address_pool(&ObjectReference::new("default", "pxe")).await?;
//! println!("{} addresses claimed", pool.status.map(|s| s.address_allocation.len()).unwrap_or(0));
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **Optimistic concurrency**: every write carries the object's resource version
//! - **Deadlines**: every call is bounded by the client's timeout
//! - **Mocking**: `test-util` provides an in-memory `MockStoreClient`

pub mod client;
pub mod error;
#[path = "trait.rs"]
pub mod store_trait;
#[cfg(feature = "test-util")]
pub mod mock;

pub use client::KubeStoreClient;
pub use error::StoreError;
pub use store_trait::StoreClientTrait;
#[cfg(feature = "test-util")]
pub use mock::MockStoreClient;
