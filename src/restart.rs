/// Exit status asking the supervisor (systemd, docker, pm2) to start a fresh process.
pub const RESTART_EXIT_CODE: i32 = 75;

pub trait RestartTrigger: Send + Sync {
    fn request_restart(&self);
}

#[derive(Debug, Clone, Default)]
pub struct ExitRestartTrigger;

impl RestartTrigger for ExitRestartTrigger {
    fn request_restart(&self) {
        tracing::error!(code = RESTART_EXIT_CODE, "exiting so the supervisor restarts the process");
        std::process::exit(RESTART_EXIT_CODE);
    }
}

/// Only records the request; the caller decides what to do after the run.
#[derive(Debug, Default)]
pub struct DeferredRestartTrigger {
    requested: std::sync::atomic::AtomicBool,
}

impl DeferredRestartTrigger {
    pub fn was_requested(&self) -> bool {
        self.requested.load(std::sync::atomic::Ordering::SeqCst)
    }
}

impl RestartTrigger for DeferredRestartTrigger {
    fn request_restart(&self) {
        tracing::warn!("restart requested");
        self.requested
            .store(true, std::sync::atomic::Ordering::SeqCst);
    }
}
