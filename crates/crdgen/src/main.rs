use kube::CustomResourceExt as _;
use management_ingress::api::v1alpha1::ManagementIngress;

fn main() -> anyhow::Result<()> {
    print!("{}", serde_yaml::to_string(&ManagementIngress::crd())?);
    Ok(())
}
