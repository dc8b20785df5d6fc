//! KI-053: offline-package phase. Ship the air-gap bundle to every node.

use super::CONNECTION_FLAGS;
use crate::core::dispatch::dispatch;
use crate::core::error::KubeiError;
use crate::core::executor::{execute, upload};
use crate::core::preflight;
use crate::core::rundata::{init_data, RunData};
use crate::core::workflow::Phase;
use crate::scripts::system;
use tracing::{debug, info};

pub const NAME: &str = "offline-package";

const REMOTE_ARCHIVE: &str = "/tmp/kubei-offline.tgz";

pub fn phase() -> Phase {
    Phase::new(NAME)
        .short("Distribute the offline package")
        .inherit_flags(CONNECTION_FLAGS)
        .hidden()
        .run(run)
}

fn run(data: &mut dyn RunData) -> Result<(), KubeiError> {
    let data = init_data(data, NAME)?;
    let Some(package) = data.cluster().offline_package.clone() else {
        debug!("no offline package configured");
        return Ok(());
    };
    preflight::check(&*data)?;

    dispatch(&data.nodes().all(), data.max_parallel(), |node| {
        info!(host = node.name(), package = %package.display(), "[offline-package] Sending offline package");
        upload(node, NAME, &package, REMOTE_ARCHIVE)
            .map_err(|e| e.context("Failed to send offline package"))?;
        execute(node, NAME, |_| Ok(system::unpack_offline(REMOTE_ARCHIVE)))
            .map_err(|e| e.context("Failed to unpack offline package"))?;
        Ok(())
    })
}
