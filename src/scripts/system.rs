//! KI-043: Host-level scripts: /etc/hosts, swap, services, offline package.

use super::{OFFLINE_DIR, STRICT};
use crate::transport::quote;

/// Map `domain` to `ip` in /etc/hosts, replacing any earlier mapping.
pub fn set_hosts(ip: &str, domain: &str) -> String {
    format!(
        "{STRICT}\n\
         sed -i \"/[[:space:]]$(printf '%s' {d} | sed 's/[.]/\\\\./g')\\$/d\" /etc/hosts\n\
         printf '%s %s\\n' {ip} {d} >> /etc/hosts",
        d = quote(domain),
        ip = quote(ip)
    )
}

/// Drop every /etc/hosts line ending in `domain`.
pub fn remove_hosts(domain: &str) -> String {
    format!(
        "sed -i \"/[[:space:]]$(printf '%s' {d} | sed 's/[.]/\\\\./g')\\$/d\" /etc/hosts",
        d = quote(domain)
    )
}

/// Disable swap now and across reboots.
pub fn swap_off() -> String {
    "swapoff -a\nsed -ri '/^[^#].*[[:space:]]swap[[:space:]]/s/^/#/' /etc/fstab".to_string()
}

pub fn restart(service: &str) -> String {
    format!(
        "{STRICT}\nsystemctl daemon-reload\nsystemctl restart {s}\nsystemctl is-active --quiet {s}",
        s = quote(service)
    )
}

/// Unpack an uploaded offline package into the offline directory.
pub fn unpack_offline(remote_archive: &str) -> String {
    format!(
        "{STRICT}\nrm -rf {dir}\nmkdir -p {dir}\ntar -xzf {a} -C {dir}\nrm -f {a}",
        dir = OFFLINE_DIR,
        a = quote(remote_archive)
    )
}
