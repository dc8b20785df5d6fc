//! KI-052: kube-component phase. Prepare hosts and install kubelet, kubeadm, kubectl.

use super::CONNECTION_FLAGS;
use crate::core::dispatch::dispatch;
use crate::core::error::KubeiError;
use crate::core::executor::{self, execute};
use crate::core::preflight;
use crate::core::rundata::{init_data, RunData};
use crate::core::workflow::Phase;
use crate::scripts::kube_component;
use tracing::info;

pub const NAME: &str = "kube-component";

pub fn phase() -> Phase {
    Phase::new(NAME)
        .short("Install Kubernetes components")
        .long("Disable swap, load the kernel modules Kubernetes needs, and install kubelet, kubeadm and kubectl on all nodes.")
        .inherit_flags(CONNECTION_FLAGS)
        .run(run)
}

fn run(data: &mut dyn RunData) -> Result<(), KubeiError> {
    let data = init_data(data, NAME)?;
    preflight::check(&*data)?;

    let kube = &data.cluster().kubernetes;
    dispatch(&data.nodes().all(), data.max_parallel(), |node| {
        info!(host = node.name(), version = %kube.version, "[kube-component] Installing Kubernetes components");
        execute(node, NAME, |n| kube_component::install(executor::facts(n)?, kube))
            .map_err(|e| e.context("Failed to install Kubernetes components"))?;
        info!(host = node.name(), "[kube-component] Successfully installed Kubernetes components");
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rundata::testing::{cluster, FakeTransport};

    #[test]
    fn test_ki052_installs_on_every_node() {
        let (m1, w1) = (FakeTransport::new(), FakeTransport::new());
        let mut ctx = cluster(&[("m1", m1.clone())], &[("w1", w1.clone())]);
        run(&mut ctx).unwrap();
        for t in [m1, w1] {
            let scripts = t.scripts();
            assert_eq!(scripts.len(), 2);
            assert!(scripts[1].contains("swapoff -a"));
            assert!(scripts[1].contains("systemctl enable kubelet"));
        }
    }

    #[test]
    fn test_ki052_bad_version_fails_before_remote_call() {
        let m1 = FakeTransport::new();
        let mut ctx = cluster(&[("m1", m1.clone())], &[]);
        ctx.cluster_mut().kubernetes.version = "latest".to_string();
        let err = run(&mut ctx).unwrap_err();
        let msg = err.to_string();
        assert!(msg.starts_with("[m1] [kube-component]"), "{}", msg);
        assert!(msg.contains("invalid Kubernetes version 'latest'"));
        assert_eq!(m1.scripts().len(), 1, "only the preflight probe ran");
    }
}
