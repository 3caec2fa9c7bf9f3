use std::{io, thread};

use anyhow::{Error, Result};
use log::{error, info};
use ros2_reentrant_node::{
    Context, ExecutorOptions, SpinOptions,
    minimal_timer::{MinimalTimer, MinimalTimerConfig, publish_lines},
    msg::std_msgs,
    signal::shutdown_on_ctrl_c,
};

fn main() -> Result<(), Error> {
    ros2_reentrant_node::init_logging()?;

    let context = Context::new();
    shutdown_on_ctrl_c(&context)?;

    let executor = context.create_executor(ExecutorOptions::default());
    let config = MinimalTimerConfig::default();
    let node = MinimalTimer::new_node(&executor, config.clone())?;
    info!("node '{}' created", node.name());

    // Each line typed on stdin is published on the node's topic. The reader
    // blocks on stdin, so the thread is left detached.
    let publisher = node
        .node()
        .create_publisher::<std_msgs::msg::String>(&config.topic)?;
    thread::Builder::new()
        .name("stdin-publisher".to_owned())
        .spawn(move || {
            if let Err(err) = publish_lines(io::stdin().lock(), &publisher) {
                error!("stopped reading stdin: {err}");
            }
        })?;

    executor.spin(SpinOptions::default())?;

    drop(node);
    context.shutdown();
    Ok(())
}
