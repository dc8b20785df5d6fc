//! KI-045: Network plugin manifests.

use super::{OFFLINE_DIR, STRICT};
use crate::core::types::{FlannelConfig, InstallType};
use crate::transport::quote;

/// Fetch the flannel manifest, adapt it to the cluster and apply it.
pub fn flannel(cfg: &FlannelConfig, pod_subnet: &str, install_type: InstallType) -> String {
    let fetch = match install_type {
        InstallType::Online => format!("curl -fsSL {} -o \"$MANIFEST\"", quote(&cfg.manifest_url)),
        InstallType::Offline => format!("cp {}/network/kube-flannel.yml \"$MANIFEST\"", OFFLINE_DIR),
    };
    let mut edits = vec![
        format!("sed -i \"s#10.244.0.0/16#\"{}\"#g\" \"$MANIFEST\"", quote(pod_subnet)),
        format!(
            "sed -i \"s#\\\"Type\\\": \\\"vxlan\\\"#\\\"Type\\\": \\\"\"{}\"\\\"#\" \"$MANIFEST\"",
            quote(&cfg.backend_type)
        ),
    ];
    if let Some(ref image) = cfg.image {
        edits.push(format!(
            "sed -E -i \"s#(image: ).*/flannel:.*#\\1\"{}\"#\" \"$MANIFEST\"",
            quote(image)
        ));
    }
    format!(
        "{STRICT}\n\
         export KUBECONFIG=/etc/kubernetes/admin.conf\n\
         MANIFEST=$(mktemp)\n\
         trap 'rm -f \"$MANIFEST\"' EXIT\n\
         {fetch}\n\
         {edits}\n\
         kubectl apply -f \"$MANIFEST\"",
        edits = edits.join("\n")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::local::exec_local;

    const MANIFEST: &str = r#"  net-conf.json: |
    {
      "Network": "10.244.0.0/16",
      "Backend": {
        "Type": "vxlan"
      }
    }
      containers:
      - name: kube-flannel
        image: docker.io/flannel/flannel:v0.24.0
      - name: install-cni-plugin
        image: docker.io/flannel/flannel-cni-plugin:v1.2.0
"#;

    /// Run only the manifest edits against a local copy.
    fn edit_locally(script: &str) -> String {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kube-flannel.yml");
        std::fs::write(&path, MANIFEST).unwrap();
        let edits: Vec<&str> = script.lines().filter(|l| l.starts_with("sed ")).collect();
        let run = format!("set -euo pipefail\nMANIFEST={}\n{}", path.display(), edits.join("\n"));
        let out = exec_local(&run).unwrap();
        assert!(out.success(), "{}", out.stderr);
        std::fs::read_to_string(&path).unwrap()
    }

    #[test]
    fn test_ki045_online_fetches_manifest_url() {
        let script = flannel(&FlannelConfig::default(), "10.244.0.0/16", InstallType::Online);
        assert!(script.contains("curl -fsSL 'https://github.com/flannel-io/flannel"));
        assert!(script.ends_with("kubectl apply -f \"$MANIFEST\""));
    }

    #[test]
    fn test_ki045_offline_uses_bundled_manifest() {
        let script = flannel(&FlannelConfig::default(), "10.244.0.0/16", InstallType::Offline);
        assert!(script.contains("cp /opt/kubei/offline/network/kube-flannel.yml"));
        assert!(!script.contains("curl"));
    }

    #[test]
    fn test_ki045_manifest_edits() {
        let cfg = FlannelConfig {
            backend_type: "host-gw".to_string(),
            image: Some("registry.local/flannel/flannel:v0.24.0".to_string()),
            ..FlannelConfig::default()
        };
        let edited = edit_locally(&flannel(&cfg, "172.16.0.0/16", InstallType::Online));
        assert!(edited.contains("\"Network\": \"172.16.0.0/16\""));
        assert!(edited.contains("\"Type\": \"host-gw\""));
        assert!(edited.contains("image: registry.local/flannel/flannel:v0.24.0"));
        assert!(edited.contains("image: docker.io/flannel/flannel-cni-plugin:v1.2.0"));
    }
}
