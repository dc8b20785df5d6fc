//! KI-055: kubeadm phase. Bootstrap the control plane and join the rest.
//!
//! Sub-phases: init → network → join-control-plane → join-worker. Join
//! information captured by `init` is kept in the run data; a join sub-phase
//! run on its own fetches it from the first master instead.

use super::{network, CONNECTION_FLAGS};
use crate::core::dispatch::dispatch;
use crate::core::error::KubeiError;
use crate::core::executor::execute;
use crate::core::preflight;
use crate::core::rundata::{init_data, ClusterData, InitData, JoinInfo, Node, RunData};
use crate::core::workflow::Phase;
use crate::scripts::{kubeadm, system};
use tracing::info;

pub const NAME: &str = "kubeadm";

const INIT: &str = "kubeadm.init";
const JOIN_CONTROL_PLANE: &str = "kubeadm.join-control-plane";
const JOIN_WORKER: &str = "kubeadm.join-worker";

pub fn phase() -> Phase {
    Phase::new(NAME)
        .short("Bootstrap the cluster with kubeadm")
        .long("Initialize the first master, install the network plugin, then join the remaining masters and the workers.")
        .sub_phase(
            Phase::new("init")
                .short("Initialize the first master")
                .inherit_flags(CONNECTION_FLAGS)
                .run(run_init),
        )
        .sub_phase(
            Phase::new("network")
                .short("Install the network plugin")
                .inherit_flags(&["network-type"])
                .run(run_network),
        )
        .sub_phase(
            Phase::new("join-control-plane")
                .short("Join additional masters")
                .inherit_flags(CONNECTION_FLAGS)
                .run(run_join_control_plane),
        )
        .sub_phase(
            Phase::new("join-worker")
                .short("Join worker nodes")
                .inherit_flags(CONNECTION_FLAGS)
                .run(run_join_worker),
        )
}

fn first_master<D: ClusterData + ?Sized>(data: &D) -> Result<&Node, KubeiError> {
    data.nodes()
        .first_master()
        .ok_or_else(|| KubeiError::Preflight("no master nodes".to_string()))
}

fn run_init(data: &mut dyn RunData) -> Result<(), KubeiError> {
    let data = init_data(data, INIT)?;
    preflight::check(&*data)?;

    let join = {
        let cluster = data.cluster();
        let master = first_master(&*data)?;
        let domain = cluster.kubeadm.api_domain_name();

        info!(host = master.name(), "[kubeadm-init] Initializing master");
        execute(master, INIT, |n| Ok(system::set_hosts(n.host(), domain)))
            .map_err(|e| e.context("Failed to set /etc/hosts"))?;
        execute(master, INIT, |_| Ok(kubeadm::init(&cluster.kubeadm, &cluster.kubernetes)))
            .map_err(|e| e.context("Failed to initialize master"))?;
        info!(host = master.name(), "[kubeadm-init] Successfully initialized master");

        fetch_join_info(master, INIT)?
    };
    data.set_join_info(join);
    Ok(())
}

fn run_network(data: &mut dyn RunData) -> Result<(), KubeiError> {
    let data = init_data(data, network::OPERATION)?;
    preflight::check(&*data)?;
    let master = first_master(&*data)?;
    network::apply(master, data.cluster())
}

fn run_join_control_plane(data: &mut dyn RunData) -> Result<(), KubeiError> {
    let data = init_data(data, JOIN_CONTROL_PLANE)?;
    preflight::check(&*data)?;
    if data.nodes().other_masters().is_empty() {
        info!("[join-control-plane] No additional masters to join");
        return Ok(());
    }
    let join = ensure_join_info(data, JOIN_CONTROL_PLANE)?;

    let master_ip = first_master(&*data)?.host();
    let domain = data.cluster().kubeadm.api_domain_name();
    let command = join.control_plane_command();
    dispatch(&data.nodes().other_masters(), data.max_parallel(), |node| {
        info!(host = node.name(), "[join-control-plane] Joining master");
        execute(node, JOIN_CONTROL_PLANE, |_| Ok(system::set_hosts(master_ip, domain)))
            .map_err(|e| e.context("Failed to set /etc/hosts"))?;
        execute(node, JOIN_CONTROL_PLANE, |_| Ok(kubeadm::join_control_plane(&command)))
            .map_err(|e| e.context("Failed to join master"))?;
        // once joined, a master serves the API itself
        execute(node, JOIN_CONTROL_PLANE, |n| Ok(system::set_hosts(n.host(), domain)))
            .map_err(|e| e.context("Failed to set /etc/hosts"))?;
        info!(host = node.name(), "[join-control-plane] Successfully joined master");
        Ok(())
    })
}

fn run_join_worker(data: &mut dyn RunData) -> Result<(), KubeiError> {
    let data = init_data(data, JOIN_WORKER)?;
    preflight::check(&*data)?;
    if data.nodes().workers.is_empty() {
        info!("[join-worker] No workers to join");
        return Ok(());
    }
    let join = ensure_join_info(data, JOIN_WORKER)?;

    let master_ip = first_master(&*data)?.host();
    let domain = data.cluster().kubeadm.api_domain_name();
    dispatch(&data.nodes().workers(), data.max_parallel(), |node| {
        info!(host = node.name(), "[join-worker] Joining worker");
        execute(node, JOIN_WORKER, |_| Ok(system::set_hosts(master_ip, domain)))
            .map_err(|e| e.context("Failed to set /etc/hosts"))?;
        execute(node, JOIN_WORKER, |_| Ok(kubeadm::join_worker(&join.worker_command)))
            .map_err(|e| e.context("Failed to join worker"))?;
        info!(host = node.name(), "[join-worker] Successfully joined worker");
        Ok(())
    })
}

/// Join information from the run data, fetched from the first master when a
/// join phase runs without `init`.
fn ensure_join_info(data: &mut dyn InitData, operation: &str) -> Result<JoinInfo, KubeiError> {
    if let Some(join) = data.join_info() {
        return Ok(join.clone());
    }
    let join = {
        let master = first_master(&*data)?;
        info!(host = master.name(), "[kubeadm] Fetching join information");
        fetch_join_info(master, operation)?
    };
    data.set_join_info(join.clone());
    Ok(join)
}

/// Create a join token and re-upload control-plane certificates.
fn fetch_join_info(master: &Node, operation: &str) -> Result<JoinInfo, KubeiError> {
    let parse_failed = |e: String| KubeiError::node(master.name(), operation, e);

    let out = execute(master, operation, |_| Ok(kubeadm::print_join_command()))
        .map_err(|e| e.context("Failed to create join token"))?;
    let worker_command = kubeadm::parse_join_command(&out.stdout).map_err(parse_failed)?;

    let out = execute(master, operation, |_| Ok(kubeadm::upload_certs()))
        .map_err(|e| e.context("Failed to upload certificates"))?;
    let certificate_key = kubeadm::parse_certificate_key(&out.stdout).map_err(parse_failed)?;

    Ok(JoinInfo {
        worker_command,
        certificate_key,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rundata::testing::{cluster, FakeTransport};
    use crate::core::workflow::Runner;
    use crate::transport::ExecOutput;

    const JOIN: &str = "kubeadm join apiserver.k8s.local:6443 --token abc.def --discovery-token-ca-cert-hash sha256:00";

    fn ok(stdout: &str) -> ExecOutput {
        ExecOutput {
            exit_code: 0,
            stdout: stdout.to_string(),
            stderr: String::new(),
        }
    }

    fn bootstrap_master() -> FakeTransport {
        FakeTransport::new()
            .on("--print-join-command", ok(&format!("{}\n", JOIN)))
            .on("phase upload-certs", ok(&format!("[upload-certs] key:\n{}\n", "f".repeat(64))))
    }

    fn kubeadm_only() -> Runner {
        let mut r = Runner::new();
        r.append_phase(phase());
        r
    }

    #[test]
    fn test_ki055_init_captures_join_info() {
        let m1 = bootstrap_master();
        let mut ctx = cluster(&[("m1", m1.clone())], &[]);
        run_init(&mut ctx).unwrap();

        let join = init_data(&mut ctx, "test").unwrap().join_info().cloned().unwrap();
        assert_eq!(join.worker_command, JOIN);
        assert_eq!(join.certificate_key, "f".repeat(64));

        let scripts = m1.scripts();
        assert!(scripts[1].contains("'m1.local' 'apiserver.k8s.local'"));
        assert!(scripts[2].contains("kubeadm init"));
    }

    #[test]
    fn test_ki055_init_fails_on_bad_join_output() {
        let m1 = FakeTransport::new().on("--print-join-command", ok("nothing useful\n"));
        let mut ctx = cluster(&[("m1", m1)], &[]);
        let err = run_init(&mut ctx).unwrap_err();
        assert!(err.to_string().starts_with("[m1] [kubeadm.init]"), "{}", err);
    }

    #[test]
    fn test_ki055_full_kubeadm_phase() {
        let m1 = bootstrap_master();
        let (m2, w1, w2) = (FakeTransport::new(), FakeTransport::new(), FakeTransport::new());
        let ctx = cluster(
            &[("m1", m1.clone()), ("m2", m2.clone())],
            &[("w1", w1.clone()), ("w2", w2.clone())],
        );
        let mut runner = kubeadm_only();
        runner.set_data_initializer(move || Ok(Box::new(ctx) as Box<dyn RunData>));
        runner.run(&[]).unwrap();

        let m1_scripts = m1.scripts();
        assert!(m1_scripts.iter().any(|s| s.contains("kubectl apply")), "flannel applied from m1");

        let m2_scripts = m2.scripts();
        assert!(m2_scripts[1].contains("'m1.local' 'apiserver.k8s.local'"));
        assert!(m2_scripts[2].contains("--control-plane --certificate-key"));
        assert!(m2_scripts[3].contains("'m2.local' 'apiserver.k8s.local'"));

        for w in [w1, w2] {
            let s = w.scripts();
            assert!(s[1].contains("'m1.local' 'apiserver.k8s.local'"));
            assert!(s[2].contains(JOIN));
            assert!(!s[2].contains("--control-plane"));
        }
    }

    #[test]
    fn test_ki055_join_worker_alone_fetches_join_info() {
        let m1 = bootstrap_master();
        let w1 = FakeTransport::new();
        let ctx = cluster(&[("m1", m1.clone())], &[("w1", w1.clone())]);
        let mut runner = kubeadm_only();
        runner.set_data_initializer(move || Ok(Box::new(ctx) as Box<dyn RunData>));
        runner.run_phase("kubeadm.join-worker", &[]).unwrap();

        let m1_scripts = m1.scripts();
        assert!(m1_scripts.iter().any(|s| s.contains("--print-join-command")));
        assert!(!m1_scripts.iter().any(|s| s.contains("kubeadm init --")));
        assert!(w1.scripts()[2].contains(JOIN));
    }

    #[test]
    fn test_ki055_single_master_skips_control_plane_join() {
        let m1 = bootstrap_master();
        let mut ctx = cluster(&[("m1", m1.clone())], &[]);
        run_join_control_plane(&mut ctx).unwrap();
        assert_eq!(m1.scripts().len(), 1, "only the preflight probe");
    }

    #[test]
    fn test_ki055_worker_join_failure_names_worker() {
        let m1 = bootstrap_master();
        let w1 = FakeTransport::new().fail_on("kubeadm join", "token expired");
        let mut ctx = cluster(&[("m1", m1)], &[("w1", w1)]);
        let err = run_join_worker(&mut ctx).unwrap_err();
        assert_eq!(
            err.to_string(),
            "[w1] [kubeadm.join-worker] Failed to join worker: exit code 1: token expired"
        );
    }
}
