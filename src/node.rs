use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use log::debug;

use crate::{
    context::Context,
    error::{Result, RuntimeError},
    executor::{Gate, WaitSet},
    group::{CallbackGroup, CallbackGroupType},
    logging::NodeLogger,
    msg::Message,
    names::{expand_topic_name, validate_node_name},
    timer::{Timer, TimerOptions},
    topic::{Publisher, Subscription, SubscriptionOptions},
};

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

/// Owner of callback groups, timers, subscriptions and publishers.
///
/// Clones share the node. Once the last clone is dropped, no callback of the
/// node starts again and the ones still running have finished.
#[derive(Clone)]
pub struct Node {
    inner: Arc<NodeInner>,
}

struct NodeInner {
    id: u64,
    name: Arc<str>,
    context: Context,
    wait_set: Arc<WaitSet>,
    gate: Arc<Gate>,
    default_group: CallbackGroup,
    logger: NodeLogger,
}

impl Drop for NodeInner {
    fn drop(&mut self) {
        self.gate.close();
        debug!("node '{}' destroyed", self.name);
    }
}

impl Node {
    pub(crate) fn new(context: &Context, wait_set: Arc<WaitSet>, name: &str) -> Result<Self> {
        validate_node_name(name)?;
        if context.is_shutdown() {
            return Err(RuntimeError::ContextShutDown);
        }

        let id = NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed);
        let name: Arc<str> = Arc::from(name);
        let node = Self {
            inner: Arc::new(NodeInner {
                id,
                default_group: CallbackGroup::new(
                    CallbackGroupType::MutuallyExclusive,
                    id,
                    Arc::clone(&name),
                ),
                logger: NodeLogger::new(Arc::clone(&name)),
                name,
                context: context.clone(),
                wait_set,
                gate: Arc::new(Gate::new()),
            }),
        };
        debug!("node '{}' created", node.name());
        Ok(node)
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn logger(&self) -> &NodeLogger {
        &self.inner.logger
    }

    pub fn context(&self) -> &Context {
        &self.inner.context
    }

    pub fn create_callback_group(&self, kind: CallbackGroupType) -> CallbackGroup {
        CallbackGroup::new(kind, self.inner.id, Arc::clone(&self.inner.name))
    }

    /// The mutually exclusive group used when no group is given.
    pub fn default_callback_group(&self) -> &CallbackGroup {
        &self.inner.default_group
    }

    fn resolve_group(&self, group: Option<CallbackGroup>) -> Result<CallbackGroup> {
        match group {
            None => Ok(self.inner.default_group.clone()),
            Some(group) if group.node_id() == self.inner.id => Ok(group),
            Some(group) => Err(RuntimeError::ForeignCallbackGroup {
                owner: group.node_name().to_owned(),
                node: self.name().to_owned(),
            }),
        }
    }

    pub fn create_timer<F>(&self, options: TimerOptions, callback: F) -> Result<Arc<Timer>>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let group = self.resolve_group(options.callback_group.clone())?;
        let timer = Timer::new(
            &self.inner.context,
            options,
            group,
            Arc::clone(&self.inner.gate),
            Arc::clone(&self.inner.wait_set),
            Arc::new(callback),
        )?;
        Ok(Arc::new(timer))
    }

    /// Periodic timer that starts right away.
    pub fn create_wall_timer<F>(
        &self,
        period: Duration,
        group: Option<&CallbackGroup>,
        callback: F,
    ) -> Result<Arc<Timer>>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let options = match group {
            Some(group) => TimerOptions::new(period).with_callback_group(group),
            None => TimerOptions::new(period),
        };
        self.create_timer(options, callback)
    }

    pub fn create_subscription<'a, T, F>(
        &self,
        options: impl Into<SubscriptionOptions<'a>>,
        callback: F,
    ) -> Result<Arc<Subscription<T>>>
    where
        T: Message,
        F: Fn(T) + Send + Sync + 'static,
    {
        let options = options.into();
        let topic = expand_topic_name(options.topic)?;
        options.qos.validate()?;
        let group = self.resolve_group(options.callback_group)?;

        let subscription = Subscription::new(
            &self.inner.context,
            topic,
            options.qos,
            group,
            Arc::clone(&self.inner.gate),
            Arc::clone(&self.inner.wait_set),
            Arc::new(callback),
        )?;
        debug!(
            "node '{}' subscribed to '{}' ({})",
            self.name(),
            subscription.topic_name(),
            T::type_name()
        );
        Ok(Arc::new(subscription))
    }

    pub fn create_publisher<T: Message>(&self, topic: &str) -> Result<Publisher<T>> {
        let topic = expand_topic_name(topic)?;
        Publisher::new(&self.inner.context, topic)
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        executor::{ExecutorOptions, SpinOptions},
        msg::std_msgs::msg::String as StringMsg,
    };
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn rejects_bad_node_names() {
        let context = Context::new();
        let executor = context.create_executor(ExecutorOptions::default());
        assert!(matches!(
            executor.create_node("9lives"),
            Err(RuntimeError::InvalidNodeName { .. })
        ));
    }

    #[test]
    fn no_nodes_after_shutdown() {
        let context = Context::new();
        let executor = context.create_executor(ExecutorOptions::default());
        context.shutdown();
        assert!(matches!(
            executor.create_node("late"),
            Err(RuntimeError::ContextShutDown)
        ));
    }

    #[test]
    fn foreign_groups_are_rejected() {
        let context = Context::new();
        let executor = context.create_executor(ExecutorOptions::default());
        let a = executor.create_node("a").unwrap();
        let b = executor.create_node("b").unwrap();
        let group = a.create_callback_group(CallbackGroupType::Reentrant);

        let err = b
            .create_wall_timer(Duration::from_millis(10), Some(&group), || {})
            .unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::ForeignCallbackGroup { ref owner, ref node } if owner == "a" && node == "b"
        ));

        let err = b
            .create_subscription::<StringMsg, _>(
                SubscriptionOptions::new("chatter").callback_group(&group),
                |_| {},
            )
            .unwrap_err();
        assert!(matches!(err, RuntimeError::ForeignCallbackGroup { .. }));
    }

    #[test]
    fn zero_depth_subscription_is_rejected() {
        let context = Context::new();
        let executor = context.create_executor(ExecutorOptions::default());
        let node = executor.create_node("depth").unwrap();
        let err = node
            .create_subscription::<StringMsg, _>(SubscriptionOptions::new("chatter").depth(0), |_| {})
            .unwrap_err();
        assert!(matches!(err, RuntimeError::InvalidQueueDepth));
    }

    #[test]
    fn default_group_is_mutually_exclusive() {
        let context = Context::new();
        let executor = context.create_executor(ExecutorOptions::default());
        let node = executor.create_node("defaults").unwrap();
        assert_eq!(
            node.default_callback_group().kind(),
            CallbackGroupType::MutuallyExclusive
        );

        let timer = node
            .create_timer(TimerOptions::new(Duration::from_secs(1)), || {})
            .unwrap();
        assert_eq!(timer.callback_group(), node.default_callback_group());
    }

    #[test]
    fn dropped_entities_leave_the_wait_set() {
        let context = Context::new();
        let executor = context.create_executor(ExecutorOptions::default());
        let node = executor.create_node("entities").unwrap();
        let timer = node
            .create_timer(TimerOptions::new(Duration::from_secs(1)), || {})
            .unwrap();
        let sub = node
            .create_subscription::<StringMsg, _>("chatter", |_| {})
            .unwrap();
        assert_eq!(node.inner.wait_set.entity_count(), 2);

        drop(timer);
        drop(sub);
        assert_eq!(node.inner.wait_set.entity_count(), 0);
    }

    #[test]
    fn subscription_and_publisher_meet_on_relative_name() {
        let context = Context::new();
        let executor = context.create_executor(ExecutorOptions::new().num_threads(2));
        let node = executor.create_node("relative").unwrap();

        let heard = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&heard);
        let _sub = node
            .create_subscription::<StringMsg, _>("chatter", move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        let publisher = node.create_publisher::<StringMsg>("/chatter").unwrap();
        assert_eq!(publisher.publish(&"hi".into()).unwrap(), 1);

        executor
            .spin(SpinOptions::new().timeout(Duration::from_millis(100)))
            .unwrap();
        assert_eq!(heard.load(Ordering::SeqCst), 1);
    }
}
