use std::thread;

use log::{error, info};

use crate::{Context, Result, RuntimeError};

/// Runs `handler` once, on the first Ctrl-C.
///
/// The handler runs on its own thread with a current-thread tokio runtime;
/// the thread is detached and ends with the process.
pub fn on_ctrl_c<F>(handler: F) -> Result<()>
where
    F: FnOnce() + Send + 'static,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(RuntimeError::SignalHandler)?;
    let name = "signal-handler".to_owned();

    thread::Builder::new()
        .name(name.clone())
        .spawn(move || match runtime.block_on(tokio::signal::ctrl_c()) {
            Ok(()) => {
                info!("interrupt received, shutting down");
                handler();
            }
            Err(err) => error!("failed to listen for Ctrl-C: {err}"),
        })
        .map_err(|source| RuntimeError::ThreadSpawn { name, source })?;
    Ok(())
}

/// Shuts `context` down on the first Ctrl-C.
pub fn shutdown_on_ctrl_c(context: &Context) -> Result<()> {
    let context = context.clone();
    on_ctrl_c(move || context.shutdown())
}
