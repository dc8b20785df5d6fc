//! KI-041: Docker installation scripts.

use super::{OFFLINE_DIR, STRICT};
use crate::core::types::{Docker, InstallType, NodeFacts, PackageManager};
use crate::transport::quote;

/// Install Docker at the configured version and write its daemon config.
pub fn docker(facts: &NodeFacts, docker: &Docker) -> Result<String, String> {
    let install = match (facts.package_manager, facts.install_type) {
        (PackageManager::Apt, InstallType::Online) => apt_online(&docker.version),
        (PackageManager::Yum, InstallType::Online) => yum_online(&docker.version),
        (PackageManager::Apt, InstallType::Offline) => format!(
            "dpkg -i {dir}/docker/*.deb || DEBIAN_FRONTEND=noninteractive apt-get -f install -y -qq",
            dir = OFFLINE_DIR
        ),
        (PackageManager::Yum, InstallType::Offline) => format!(
            "yum localinstall -y --disablerepo='*' {dir}/docker/*.rpm",
            dir = OFFLINE_DIR
        ),
    };
    Ok(format!(
        "{STRICT}\n{install}\n{config}\nsystemctl enable docker",
        config = daemon_config(docker)?
    ))
}

fn apt_online(version: &str) -> String {
    format!(
        "export DEBIAN_FRONTEND=noninteractive\n\
         apt-get update -qq\n\
         apt-get install -y -qq apt-transport-https ca-certificates curl gnupg\n\
         . /etc/os-release\n\
         install -m 0755 -d /etc/apt/keyrings\n\
         curl -fsSL \"https://download.docker.com/linux/$ID/gpg\" | gpg --dearmor --yes -o /etc/apt/keyrings/docker.gpg\n\
         echo \"deb [arch=$(dpkg --print-architecture) signed-by=/etc/apt/keyrings/docker.gpg] \
         https://download.docker.com/linux/$ID $VERSION_CODENAME stable\" > /etc/apt/sources.list.d/docker.list\n\
         apt-get update -qq\n\
         PKG_VERSION=$(apt-cache madison docker-ce | awk '{{print $3}}' | grep -m1 -F -- {v} || true)\n\
         if [ -z \"$PKG_VERSION\" ]; then echo \"docker-ce \"{v}\" not available\" >&2; exit 1; fi\n\
         apt-get install -y -qq --allow-downgrades \"docker-ce=$PKG_VERSION\" \"docker-ce-cli=$PKG_VERSION\" containerd.io",
        v = quote(version)
    )
}

fn yum_online(version: &str) -> String {
    format!(
        "yum install -y yum-utils\n\
         yum-config-manager --add-repo https://download.docker.com/linux/centos/docker-ce.repo\n\
         yum install -y \"docker-ce-\"{v} \"docker-ce-cli-\"{v} containerd.io",
        v = quote(version)
    )
}

/// `/etc/docker/daemon.json` with the cgroup driver kubelet expects.
fn daemon_config(docker: &Docker) -> Result<String, String> {
    let mut config = serde_json::json!({
        "exec-opts": [format!("native.cgroupdriver={}", docker.cgroup_driver)],
        "log-driver": "json-file",
        "log-opts": { "max-size": docker.log_max_size },
        "storage-driver": "overlay2",
    });
    if !docker.registry_mirrors.is_empty() {
        config["registry-mirrors"] = serde_json::json!(docker.registry_mirrors);
    }
    let body = serde_json::to_string_pretty(&config).map_err(|e| format!("daemon.json: {}", e))?;
    Ok(format!(
        "mkdir -p /etc/docker\ncat > /etc/docker/daemon.json <<'KUBEI_EOF'\n{}\nKUBEI_EOF",
        body
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn facts(pm: PackageManager, install: InstallType) -> NodeFacts {
        NodeFacts {
            package_manager: pm,
            install_type: install,
        }
    }

    #[test]
    fn test_ki041_apt_online() {
        let script = docker(&facts(PackageManager::Apt, InstallType::Online), &Docker::default()).unwrap();
        assert!(script.starts_with("set -euo pipefail"));
        assert!(script.contains("download.docker.com/linux/$ID"));
        assert!(script.contains(&format!("grep -m1 -F -- '{}'", Docker::default().version)));
        assert!(script.contains("systemctl enable docker"));
    }

    #[test]
    fn test_ki041_yum_online() {
        let mut d = Docker::default();
        d.version = "20.10.24".to_string();
        let script = docker(&facts(PackageManager::Yum, InstallType::Online), &d).unwrap();
        assert!(script.contains("yum-config-manager"));
        assert!(script.contains("\"docker-ce-\"'20.10.24'"));
    }

    #[test]
    fn test_ki041_offline_uses_local_packages() {
        let apt = docker(&facts(PackageManager::Apt, InstallType::Offline), &Docker::default()).unwrap();
        assert!(apt.contains("dpkg -i /opt/kubei/offline/docker/*.deb"));
        assert!(!apt.contains("download.docker.com"));
        let yum = docker(&facts(PackageManager::Yum, InstallType::Offline), &Docker::default()).unwrap();
        assert!(yum.contains("/opt/kubei/offline/docker/*.rpm"));
    }

    #[test]
    fn test_ki041_daemon_config() {
        let mut d = Docker::default();
        d.cgroup_driver = "systemd".to_string();
        d.registry_mirrors = vec!["https://mirror.example.com".to_string()];
        let script = daemon_config(&d).unwrap();
        assert!(script.contains("native.cgroupdriver=systemd"));
        assert!(script.contains("https://mirror.example.com"));
        assert!(script.contains("\"max-size\""));

        let plain = daemon_config(&Docker::default()).unwrap();
        assert!(!plain.contains("registry-mirrors"));
    }
}
