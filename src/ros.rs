//! Bridge from a real ROS 2 graph into the in-process runtime.

use log::warn;

use crate::{Message, Publisher};

/// Subscribes to `topic` on the ROS 2 graph and republishes every message
/// into `publisher` after converting it with `convert`.
///
/// The returned subscription must be kept alive for the bridge to run.
pub fn forward_topic<R, T, F>(
    node: &rclrs::Node,
    topic: &str,
    depth: u32,
    publisher: Publisher<T>,
    convert: F,
) -> Result<rclrs::Subscription<R>, rclrs::RclrsError>
where
    R: rosidl_runtime_rs::Message,
    T: Message,
    F: Fn(R) -> T + Send + Sync + 'static,
{
    let mut options = rclrs::SubscriptionOptions::new(topic);
    options.qos = rclrs::QoSProfile::default().keep_last(depth);

    node.create_subscription::<R, _>(options, move |msg: R| {
        if let Err(err) = publisher.publish(&convert(msg)) {
            warn!("dropping bridged message on '{}': {err}", publisher.topic_name());
        }
    })
}
