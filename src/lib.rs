//! Callback groups, wall timers and topics for ROS 2 style nodes, dispatched by
//! a multi-threaded executor.
//!
//! [`minimal_timer::MinimalTimer`] puts a slow timer callback and a
//! subscription callback in two reentrant callback groups so the executor can
//! run them side by side. With the `ros` feature the same node can listen to a
//! real ROS 2 graph through `rclrs`.

extern crate self as ros2_reentrant_node;

use std::{any::Any, sync::Arc};

mod context;
mod error;
mod executor;
mod group;
mod logging;
mod names;
mod node;
mod qos;
mod timer;
mod topic;

pub mod minimal_timer;
pub mod msg;
#[cfg(feature = "ros")]
pub mod ros;
pub mod signal;

pub use context::Context;
pub use error::{Result, RuntimeError};
pub use executor::{ExecutorOptions, MultiThreadedExecutor, SpinOptions};
pub use group::{CallbackGroup, CallbackGroupType};
pub use logging::{NodeLogger, init_logging};
pub use msg::Message;
pub use node::Node;
pub use qos::{QOS_PROFILE_DEFAULT, QoSHistory, QoSProfile};
pub use timer::{Timer, TimerOptions};
pub use topic::{Publisher, Subscription, SubscriptionOptions};

pub use ros2_reentrant_node_derive::NodeScope;

/// State shared by every callback of a [`ScopedNode`].
///
/// Usually derived: `#[derive(NodeScope)]`, optionally with
/// `#[node_scope(name = "my_node")]`.
pub trait NodeScope: Send + Sync + 'static {
    const NODE_NAME: &'static str;
}

/// A node whose callbacks all borrow one shared `Scope`.
///
/// Every entity created through it is kept alive as long as the scoped node.
pub struct ScopedNode<Scope> {
    node: Node,
    scope: Arc<Scope>,
    storage: Vec<Box<dyn Any + Send + Sync>>,
}

impl<Scope> ScopedNode<Scope>
where
    Scope: NodeScope,
{
    pub fn new(executor: &MultiThreadedExecutor, scope: Scope) -> Result<Self> {
        Self::with_name(executor, Scope::NODE_NAME, scope)
    }

    pub fn with_name(executor: &MultiThreadedExecutor, name: &str, scope: Scope) -> Result<Self> {
        Ok(Self {
            node: executor.create_node(name)?,
            scope: Arc::new(scope),
            storage: Vec::new(),
        })
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn create_callback_group(&self, kind: CallbackGroupType) -> CallbackGroup {
        self.node.create_callback_group(kind)
    }

    pub fn create_subscription<'a, T, F>(
        &mut self,
        options: impl Into<SubscriptionOptions<'a>>,
        callback: F,
    ) -> Result<Arc<Subscription<T>>>
    where
        T: Message,
        F: Fn(&Scope, T) + Send + Sync + 'static,
    {
        let scope = Arc::clone(&self.scope);
        let subscription = self
            .node
            .create_subscription(options, move |msg: T| callback(&scope, msg))?;
        self.storage.push(Box::new(Arc::clone(&subscription)));
        Ok(subscription)
    }

    pub fn create_timer<F>(&mut self, options: TimerOptions, callback: F) -> Result<Arc<Timer>>
    where
        F: Fn(&Scope) + Send + Sync + 'static,
    {
        let scope = Arc::clone(&self.scope);
        let timer = self.node.create_timer(options, move || callback(&scope))?;
        self.storage.push(Box::new(Arc::clone(&timer)));
        Ok(timer)
    }

    pub fn create_publisher<T: Message>(&self, topic: &str) -> Result<Publisher<T>> {
        self.node.create_publisher(topic)
    }
}
