// Runs the minimal timer node against a live ROS 2 graph: messages on the
// ROS "topic" are forwarded into the in-process node.

use std::thread;

use anyhow::{Error, Result, anyhow};
use log::{error, info};
use ros2_reentrant_node::{
    Context, ExecutorOptions, SpinOptions,
    minimal_timer::{MinimalTimer, MinimalTimerConfig},
    msg::std_msgs,
    ros::forward_topic,
    signal::on_ctrl_c,
};

fn main() -> Result<(), Error> {
    ros2_reentrant_node::init_logging()?;

    let ros_context = rclrs::Context::default_from_env()?;
    let mut ros_executor = ros_context.create_basic_executor();
    let ros_node = ros_executor.create_node("minimal_timer_bridge")?;

    let context = Context::new();
    let executor = context.create_executor(ExecutorOptions::default());
    let config = MinimalTimerConfig::default();
    let node = MinimalTimer::new_node(&executor, config.clone())?;
    let publisher = node
        .node()
        .create_publisher::<std_msgs::msg::String>(&config.topic)?;

    let depth = u32::try_from(config.queue_depth)?;
    let _bridge = forward_topic(
        &ros_node,
        &config.topic,
        depth,
        publisher,
        |msg: example_interfaces::msg::String| std_msgs::msg::String { data: msg.data },
    )?;
    info!("bridging ROS 2 topic '{}' into node '{}'", config.topic, node.name());

    // Ctrl-C stops both executors; neither spin is left to the default
    // SIGINT disposition.
    let ros_commands = ros_executor.commands().clone();
    let interrupted = context.clone();
    on_ctrl_c(move || {
        interrupted.shutdown();
        ros_commands.halt_spinning();
    })?;

    thread::scope(|scope| {
        let spinner = scope.spawn(|| executor.spin(SpinOptions::default()));

        for err in ros_executor.spin(rclrs::SpinOptions::default()) {
            error!("ROS 2 executor error: {err}");
        }
        context.shutdown();

        spinner
            .join()
            .map_err(|_| anyhow!("executor thread panicked"))?
            .map_err(Error::from)
    })?;

    drop(node);
    Ok(())
}
