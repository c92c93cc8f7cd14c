//! Prints the Subprocess CRD manifest as YAML.
//!
//! ```bash
//! cargo run -p crds --bin crdgen > config/crd/subprocess.yaml
//! ```

use crds::Subprocess;
use kube::CustomResourceExt;

fn main() -> Result<(), serde_yaml::Error> {
    print!("{}", serde_yaml::to_string(&Subprocess::crd())?);
    Ok(())
}
