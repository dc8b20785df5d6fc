//! KI-044: kubeadm bootstrap, join and reset scripts.

use super::{system, STRICT};
use crate::core::types::{KubeadmConfig, Kubernetes};
use crate::transport::quote;

const ADMIN_KUBECONFIG: &str = "mkdir -p \"$HOME/.kube\"\n\
cp -f /etc/kubernetes/admin.conf \"$HOME/.kube/config\"\n\
chown \"$(id -u):$(id -g)\" \"$HOME/.kube/config\"";

/// `kubeadm init` on the bootstrap master, then install the admin kubeconfig.
/// A node that already has an admin kubeconfig is left as is.
pub fn init(kubeadm: &KubeadmConfig, kube: &Kubernetes) -> String {
    let mut args = vec![
        format!("--control-plane-endpoint {}", quote(&kubeadm.control_plane_endpoint)),
        format!("--kubernetes-version {}", quote(&kube.version)),
        format!("--pod-network-cidr {}", quote(&kubeadm.pod_subnet)),
        format!("--service-cidr {}", quote(&kubeadm.service_subnet)),
        format!("--service-dns-domain {}", quote(&kubeadm.dns_domain)),
    ];
    if let Some(ref repo) = kube.image_repository {
        args.push(format!("--image-repository {}", quote(repo)));
    }
    args.push("--upload-certs".to_string());
    format!(
        "{STRICT}\n\
         if [ ! -f /etc/kubernetes/admin.conf ]; then\n  kubeadm init {}\nfi\n\
         {ADMIN_KUBECONFIG}",
        args.join(" ")
    )
}

/// Print a fresh worker join command.
pub fn print_join_command() -> String {
    format!("{STRICT}\nkubeadm token create --print-join-command")
}

/// Re-upload control-plane certificates and print the new certificate key.
pub fn upload_certs() -> String {
    format!("{STRICT}\nkubeadm init phase upload-certs --upload-certs")
}

/// Extract the `kubeadm join …` line from command output.
pub fn parse_join_command(stdout: &str) -> Result<String, String> {
    stdout
        .lines()
        .map(str::trim)
        .rev()
        .find(|l| l.starts_with("kubeadm join "))
        .map(str::to_string)
        .ok_or_else(|| "no 'kubeadm join' command in output".to_string())
}

/// The certificate key is the last line printed by `upload-certs`.
pub fn parse_certificate_key(stdout: &str) -> Result<String, String> {
    let key = stdout
        .lines()
        .map(str::trim)
        .rev()
        .find(|l| !l.is_empty())
        .unwrap_or_default();
    if key.len() == 64 && key.chars().all(|c| c.is_ascii_hexdigit()) {
        Ok(key.to_string())
    } else {
        Err(format!("unexpected certificate key '{}'", key))
    }
}

/// Join a worker. Nodes that already have a kubelet config are skipped.
pub fn join_worker(join_command: &str) -> String {
    format!(
        "{STRICT}\n\
         if [ ! -f /etc/kubernetes/kubelet.conf ]; then\n  {join_command}\nfi"
    )
}

/// Join an additional control-plane node and install its admin kubeconfig.
pub fn join_control_plane(join_command: &str) -> String {
    format!(
        "{STRICT}\n\
         if [ ! -f /etc/kubernetes/admin.conf ]; then\n  {join_command}\nfi\n\
         {ADMIN_KUBECONFIG}"
    )
}

/// Tear down everything kubeadm and the network plugin left on a node.
pub fn reset(api_domain: &str) -> String {
    format!(
        "set -uo pipefail\n\
         if command -v kubeadm >/dev/null 2>&1; then\n  kubeadm reset -f\nfi\n\
         rm -rf /etc/cni/net.d /var/lib/cni \"$HOME/.kube\"\n\
         ip link delete cni0 2>/dev/null || true\n\
         ip link delete flannel.1 2>/dev/null || true\n\
         iptables -F && iptables -t nat -F && iptables -t mangle -F && iptables -X || true\n\
         command -v ipvsadm >/dev/null 2>&1 && ipvsadm --clear || true\n\
         {}",
        system::remove_hosts(api_domain)
    )
}
