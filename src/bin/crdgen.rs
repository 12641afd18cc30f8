//! Prints the CustomResourceDefinitions served by provider-planetscale as a
//! multi-document YAML stream.
//!
//! ```bash
//! cargo run --bin crdgen > package/crds.yaml
//! ```

use anyhow::Result;
use kube::CustomResourceExt;
use provider_planetscale::crd::{Database, Password, ProviderConfig, ProviderConfigUsage};

fn main() -> Result<()> {
    let crds = [
        Database::crd(),
        Password::crd(),
        ProviderConfig::crd(),
        ProviderConfigUsage::crd(),
    ];
    for crd in crds {
        print!("---\n{}", serde_yaml::to_string(&crd)?);
    }
    Ok(())
}
