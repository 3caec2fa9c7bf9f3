//! A node whose slow timer callback and subscription callback live in two
//! reentrant callback groups, so a multi-threaded executor can run them at
//! the same time.

use std::{hint::black_box, io::BufRead, sync::Arc, time::Duration};

use log::debug;

use crate::{
    CallbackGroup, CallbackGroupType, MultiThreadedExecutor, NodeLogger, NodeScope, Publisher,
    Result, RuntimeError, ScopedNode, Subscription, SubscriptionOptions, Timer, TimerOptions,
    msg::std_msgs::msg::String as StringMsg,
};

pub const DEFAULT_TOPIC: &str = "topic";
pub const DEFAULT_TIMER_PERIOD: Duration = Duration::from_millis(500);
pub const DEFAULT_QUEUE_DEPTH: usize = 1;
pub const DEFAULT_WORKLOAD_ITERATIONS: u64 = 100_000_000;

#[derive(Debug, Clone)]
pub struct MinimalTimerConfig {
    pub node_name: String,
    pub topic: String,
    pub timer_period: Duration,
    pub queue_depth: usize,
    /// Size of the busy loop inside the timer callback.
    pub workload_iterations: u64,
}

impl Default for MinimalTimerConfig {
    fn default() -> Self {
        Self {
            node_name: MinimalTimer::NODE_NAME.to_owned(),
            topic: DEFAULT_TOPIC.to_owned(),
            timer_period: DEFAULT_TIMER_PERIOD,
            queue_depth: DEFAULT_QUEUE_DEPTH,
            workload_iterations: DEFAULT_WORKLOAD_ITERATIONS,
        }
    }
}

impl MinimalTimerConfig {
    pub fn with_node_name(self, node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
            ..self
        }
    }

    pub fn with_topic(self, topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            ..self
        }
    }

    pub fn with_timer_period(self, timer_period: Duration) -> Self {
        Self {
            timer_period,
            ..self
        }
    }

    pub fn with_queue_depth(self, queue_depth: usize) -> Self {
        Self {
            queue_depth,
            ..self
        }
    }

    pub fn with_workload_iterations(self, workload_iterations: u64) -> Self {
        Self {
            workload_iterations,
            ..self
        }
    }
}

#[derive(NodeScope)]
#[node_scope(name = "minimal_timer")]
pub struct MinimalTimer {
    logger: NodeLogger,
    workload_iterations: u64,
}

impl MinimalTimer {
    fn timer_callback(&self) {
        self.logger.info("entering timer_callback");
        simulate_work(self.workload_iterations);
        self.logger.info("leaving timer_callback");
    }

    fn topic_callback(&self, msg: StringMsg) {
        self.logger.info(format_args!("I heard---: '{}'", msg.data));
    }

    pub fn new_node(
        executor: &MultiThreadedExecutor,
        config: MinimalTimerConfig,
    ) -> Result<MinimalTimerNode> {
        let scope = MinimalTimer {
            logger: NodeLogger::new(config.node_name.as_str()),
            workload_iterations: config.workload_iterations,
        };
        let mut node = ScopedNode::with_name(executor, &config.node_name, scope)?;

        let timer_cb_group = node.create_callback_group(CallbackGroupType::Reentrant);
        let timer = node.create_timer(
            TimerOptions::new(config.timer_period).with_callback_group(&timer_cb_group),
            MinimalTimer::timer_callback,
        )?;

        let sub_cb_group = node.create_callback_group(CallbackGroupType::Reentrant);
        let subscription = node.create_subscription(
            SubscriptionOptions::new(&config.topic)
                .depth(config.queue_depth)
                .callback_group(&sub_cb_group),
            MinimalTimer::topic_callback,
        )?;

        Ok(MinimalTimerNode {
            node,
            timer_cb_group,
            sub_cb_group,
            timer,
            subscription,
        })
    }
}

// Deliberately slow; the result only exists so the loop is not optimised out.
fn simulate_work(iterations: u64) -> f32 {
    let mut last = 0.0;
    for i in 0..iterations {
        last = black_box((i as f32).sqrt());
    }
    last
}

/// The running node. Dropping it cancels the timer and the subscription.
pub struct MinimalTimerNode {
    node: ScopedNode<MinimalTimer>,
    timer_cb_group: CallbackGroup,
    sub_cb_group: CallbackGroup,
    timer: Arc<Timer>,
    subscription: Arc<Subscription<StringMsg>>,
}

impl MinimalTimerNode {
    pub fn name(&self) -> &str {
        self.node.node().name()
    }

    pub fn node(&self) -> &ScopedNode<MinimalTimer> {
        &self.node
    }

    pub fn timer(&self) -> &Timer {
        &self.timer
    }

    pub fn subscription(&self) -> &Subscription<StringMsg> {
        &self.subscription
    }

    pub fn timer_callback_group(&self) -> &CallbackGroup {
        &self.timer_cb_group
    }

    pub fn subscription_callback_group(&self) -> &CallbackGroup {
        &self.sub_cb_group
    }
}

/// Publishes every non-empty line of `input` as a string message.
///
/// Stops at end of input or once the context shuts down, and returns how
/// many lines were published.
pub fn publish_lines(input: impl BufRead, publisher: &Publisher<StringMsg>) -> Result<usize> {
    let mut published = 0;
    for line in input.lines() {
        let line = line.map_err(RuntimeError::Input)?;
        if line.is_empty() {
            continue;
        }
        match publisher.publish(&StringMsg::from(line)) {
            Ok(_) => published += 1,
            Err(RuntimeError::ContextShutDown) => break,
            Err(err) => return Err(err),
        }
    }
    debug!("published {published} lines on '{}'", publisher.topic_name());
    Ok(published)
}
