//! Benchmarks for kubei core operations.
//!
//! Run with: cargo bench
//!
//! Results include 95% confidence intervals via Criterion.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use kubei::core::dispatch::dispatch;
use kubei::core::rundata::Node;
use kubei::core::types::Role;
use kubei::transport::{ExecOutput, HostInfo, Transport};
use std::path::Path;

/// Channel that answers every script instantly.
struct NullTransport;

impl Transport for NullTransport {
    fn exec(&mut self, _script: &str) -> Result<ExecOutput, String> {
        Ok(ExecOutput::default())
    }

    fn upload(&mut self, _local: &Path, _remote: &str) -> Result<(), String> {
        Ok(())
    }
}

fn nodes(n: usize) -> Vec<Node> {
    (0..n)
        .map(|i| {
            let info = HostInfo {
                host: format!("10.0.{}.{}", i / 250, i % 250 + 1),
                port: 22,
                user: "root".to_string(),
                password: None,
                key: None,
                jump: None,
            };
            Node::with_transport(&format!("n{}", i), Role::Worker, info, Box::new(NullTransport))
        })
        .collect()
}

fn bench_yaml_parse(c: &mut Criterion) {
    let yaml = r#"
version: "1.0"
nodes:
  user: root
  key: ~/.ssh/id_rsa
  masters: [10.0.0.1, 10.0.0.2, 10.0.0.3]
  workers:
    - 10.0.1.1
    - 10.0.1.2
    - host: 10.0.1.3
      name: gpu-1
      port: 2222
container_engine:
  docker:
    version: "24.0.7"
    registry_mirrors: ["https://mirror.example.com"]
kubernetes:
  version: "1.28.2"
kubeadm:
  control_plane_endpoint: apiserver.k8s.local:6443
  pod_subnet: 10.244.0.0/16
network:
  type: flannel
  flannel:
    backend_type: host-gw
"#;
    c.bench_function("yaml_parse_and_validate", |b| {
        b.iter(|| {
            let config = kubei::core::parser::parse_config(black_box(yaml)).unwrap();
            black_box(kubei::core::parser::validate_config(&config));
        });
    });
}

fn bench_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch");
    for n in [3, 20, 100] {
        let pool = nodes(n);
        let refs: Vec<&Node> = pool.iter().collect();
        group.bench_with_input(BenchmarkId::from_parameter(n), &refs, |b, refs| {
            b.iter(|| {
                dispatch(black_box(refs), 10, |node| {
                    node.run("true").map(drop).map_err(|e| {
                        kubei::core::error::KubeiError::node(node.name(), "bench", e)
                    })
                })
                .unwrap();
            });
        });
    }
    group.finish();
}

fn bench_phase_catalog(c: &mut Criterion) {
    let runner = kubei::phases::init_workflow();
    c.bench_function("init_phase_paths", |b| {
        b.iter(|| black_box(runner.phase_paths()));
    });
    c.bench_function("init_help_text", |b| {
        b.iter(|| black_box(runner.help_text()));
    });
}

criterion_group!(benches, bench_yaml_parse, bench_dispatch, bench_phase_catalog);
criterion_main!(benches);
