//! KI-042: kubelet, kubeadm and kubectl installation scripts.

use super::{system, OFFLINE_DIR, STRICT};
use crate::core::types::{InstallType, Kubernetes, NodeFacts, PackageManager};
use crate::transport::quote;

/// Kernel modules and sysctls kube-proxy and the CNI plugins rely on.
const KERNEL_SETUP: &str = "\
cat > /etc/modules-load.d/k8s.conf <<'KUBEI_EOF'
overlay
br_netfilter
KUBEI_EOF
modprobe overlay
modprobe br_netfilter
cat > /etc/sysctl.d/k8s.conf <<'KUBEI_EOF'
net.bridge.bridge-nf-call-iptables  = 1
net.bridge.bridge-nf-call-ip6tables = 1
net.ipv4.ip_forward                 = 1
KUBEI_EOF
sysctl --system >/dev/null";

/// Prepare the host and install the Kubernetes node components.
pub fn install(facts: &NodeFacts, kube: &Kubernetes) -> Result<String, String> {
    let minor = minor_version(&kube.version)?;
    let install = match (facts.package_manager, facts.install_type) {
        (PackageManager::Apt, InstallType::Online) => apt_online(&kube.version, &minor),
        (PackageManager::Yum, InstallType::Online) => yum_online(&kube.version, &minor),
        (PackageManager::Apt, InstallType::Offline) => format!(
            "dpkg -i {dir}/kube/*.deb || DEBIAN_FRONTEND=noninteractive apt-get -f install -y -qq\n\
             for img in {dir}/images/*.tar; do [ -e \"$img\" ] && docker load -i \"$img\"; done",
            dir = OFFLINE_DIR
        ),
        (PackageManager::Yum, InstallType::Offline) => format!(
            "yum localinstall -y --disablerepo='*' {dir}/kube/*.rpm\n\
             for img in {dir}/images/*.tar; do [ -e \"$img\" ] && docker load -i \"$img\"; done",
            dir = OFFLINE_DIR
        ),
    };
    Ok(format!(
        "{STRICT}\n{swap}\n{KERNEL_SETUP}\n{install}\nsystemctl enable kubelet",
        swap = system::swap_off()
    ))
}

/// `1.28.2` → `v1.28`, the channel of the community package repositories.
fn minor_version(version: &str) -> Result<String, String> {
    let trimmed = version.trim_start_matches('v');
    let mut parts = trimmed.split('.');
    match (parts.next(), parts.next()) {
        (Some(major), Some(minor))
            if major.parse::<u32>().is_ok() && minor.parse::<u32>().is_ok() =>
        {
            Ok(format!("v{}.{}", major, minor))
        }
        _ => Err(format!("invalid Kubernetes version '{}'", version)),
    }
}

fn apt_online(version: &str, minor: &str) -> String {
    format!(
        "export DEBIAN_FRONTEND=noninteractive\n\
         apt-get update -qq\n\
         apt-get install -y -qq apt-transport-https ca-certificates curl gpg\n\
         install -m 0755 -d /etc/apt/keyrings\n\
         curl -fsSL https://pkgs.k8s.io/core:/stable:/{minor}/deb/Release.key | gpg --dearmor --yes -o /etc/apt/keyrings/kubernetes-apt-keyring.gpg\n\
         echo 'deb [signed-by=/etc/apt/keyrings/kubernetes-apt-keyring.gpg] https://pkgs.k8s.io/core:/stable:/{minor}/deb/ /' > /etc/apt/sources.list.d/kubernetes.list\n\
         apt-get update -qq\n\
         PKG_VERSION=$(apt-cache madison kubeadm | awk '{{print $3}}' | grep -m1 -F -- {v} || true)\n\
         if [ -z \"$PKG_VERSION\" ]; then echo \"kubeadm \"{v}\" not available\" >&2; exit 1; fi\n\
         apt-get install -y -qq --allow-downgrades --allow-change-held-packages \
         \"kubelet=$PKG_VERSION\" \"kubeadm=$PKG_VERSION\" \"kubectl=$PKG_VERSION\"\n\
         apt-mark hold kubelet kubeadm kubectl",
        v = quote(version)
    )
}

fn yum_online(version: &str, minor: &str) -> String {
    format!(
        "cat > /etc/yum.repos.d/kubernetes.repo <<'KUBEI_EOF'\n\
         [kubernetes]\n\
         name=Kubernetes\n\
         baseurl=https://pkgs.k8s.io/core:/stable:/{minor}/rpm/\n\
         enabled=1\n\
         gpgcheck=1\n\
         gpgkey=https://pkgs.k8s.io/core:/stable:/{minor}/rpm/repodata/repomd.xml.key\n\
         KUBEI_EOF\n\
         setenforce 0 || true\n\
         sed -i 's/^SELINUX=enforcing$/SELINUX=permissive/' /etc/selinux/config || true\n\
         yum install -y \"kubelet-\"{v} \"kubeadm-\"{v} \"kubectl-\"{v}",
        v = quote(version)
    )
}
