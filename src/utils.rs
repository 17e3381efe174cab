use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Install the fmt subscriber. `RUST_LOG` wins over `default_directive`.
pub fn init_tracing(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .try_init();
}

/// Pin the calling thread to CPU `core`. Returns false if the core does not
/// exist or the OS refused.
pub fn pin_current_thread(core: usize) -> bool {
    let Some(ids) = core_affinity::get_core_ids() else {
        warn!(core, "cannot enumerate CPU cores");
        return false;
    };
    let Some(id) = ids.into_iter().find(|c| c.id == core) else {
        warn!(core, "no such CPU core");
        return false;
    };
    let pinned = core_affinity::set_for_current(id);
    if pinned {
        info!(core, "worker pinned");
    } else {
        warn!(core, "failed to pin worker");
    }
    pinned
}
