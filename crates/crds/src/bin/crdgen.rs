//! Prints the CustomResourceDefinitions owned by the metal controllers as YAML.

use crds::{AddressPool, Cluster, Inventory};
use kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    for crd in [Inventory::crd(), AddressPool::crd(), Cluster::crd()] {
        print!("---\n{}", serde_yaml::to_string(&crd)?);
    }
    Ok(())
}
