use std::{
    any::Any,
    collections::{HashMap, VecDeque},
    fmt,
    marker::PhantomData,
    sync::{
        Arc, Weak,
        atomic::{AtomicU64, Ordering},
    },
};

use log::trace;
use parking_lot::Mutex;

use crate::{
    context::Context,
    error::{Result, RuntimeError},
    executor::{Executable, Gate, WaitSet, Work},
    group::CallbackGroup,
    msg::Message,
    qos::QoSProfile,
};

type Subscribers<T> = Vec<Weak<SubscriptionShared<T>>>;

struct TopicEntry {
    type_name: &'static str,
    subscribers: Box<dyn Any + Send>,
}

/// Topic name to type and live subscriptions, shared by one context.
#[derive(Default)]
pub(crate) struct TopicGraph {
    topics: Mutex<HashMap<String, TopicEntry>>,
}

impl TopicGraph {
    fn with_subscribers<T: Message, R>(
        &self,
        topic: &str,
        f: impl FnOnce(&mut Subscribers<T>) -> R,
    ) -> Result<R> {
        let mut topics = self.topics.lock();
        let entry = topics
            .entry(topic.to_owned())
            .or_insert_with(|| TopicEntry {
                type_name: T::type_name(),
                subscribers: Box::new(Subscribers::<T>::new()),
            });
        let existing = entry.type_name;
        match entry.subscribers.downcast_mut::<Subscribers<T>>() {
            Some(subscribers) => Ok(f(subscribers)),
            None => Err(RuntimeError::TopicTypeMismatch {
                topic: topic.to_owned(),
                existing,
                requested: T::type_name(),
            }),
        }
    }

    pub(crate) fn declare<T: Message>(&self, topic: &str) -> Result<()> {
        self.with_subscribers::<T, _>(topic, |_| ())
    }

    fn subscribe<T: Message>(&self, topic: &str, subscription: &Arc<SubscriptionShared<T>>) -> Result<()> {
        self.with_subscribers::<T, _>(topic, |subscribers| {
            subscribers.push(Arc::downgrade(subscription));
        })
    }

    fn live_subscribers<T: Message>(&self, topic: &str) -> Result<Vec<Arc<SubscriptionShared<T>>>> {
        self.with_subscribers::<T, _>(topic, |subscribers| {
            subscribers.retain(|subscription| subscription.strong_count() > 0);
            subscribers
                .iter()
                .filter_map(Weak::upgrade)
                .filter(|subscription| subscription.gate.is_open())
                .collect()
        })
    }
}

pub(crate) struct SubscriptionShared<T: Message> {
    topic: String,
    queue: Mutex<VecDeque<T>>,
    capacity: Option<usize>,
    dropped: AtomicU64,
    callback: Arc<dyn Fn(T) + Send + Sync>,
    group: CallbackGroup,
    gate: Arc<Gate>,
    wait_set: Arc<WaitSet>,
}

impl<T: Message> SubscriptionShared<T> {
    fn deliver(&self, message: T) {
        {
            let mut queue = self.queue.lock();
            if let Some(capacity) = self.capacity {
                while queue.len() >= capacity {
                    queue.pop_front();
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                }
            }
            queue.push_back(message);
        }
        self.wait_set.wake_all();
    }
}

impl<T: Message> Executable for SubscriptionShared<T> {
    fn callback_group(&self) -> &CallbackGroup {
        &self.group
    }

    fn gate(&self) -> &Gate {
        &self.gate
    }

    fn has_ready(&self) -> bool {
        !self.queue.lock().is_empty()
    }

    fn take_ready(&self) -> Option<Work> {
        let message = self.queue.lock().pop_front()?;
        let callback = Arc::clone(&self.callback);
        Some(Box::new(move || callback(message)))
    }
}

/// Options for [`Node::create_subscription`](crate::Node::create_subscription).
///
/// A bare topic name converts into options with the default QoS and the
/// node's default callback group.
#[derive(Debug, Clone)]
pub struct SubscriptionOptions<'a> {
    pub topic: &'a str,
    pub qos: QoSProfile,
    pub callback_group: Option<CallbackGroup>,
}

impl<'a> SubscriptionOptions<'a> {
    pub fn new(topic: &'a str) -> Self {
        Self {
            topic,
            qos: QoSProfile::default(),
            callback_group: None,
        }
    }

    pub fn depth(self, depth: usize) -> Self {
        Self {
            qos: self.qos.keep_last(depth),
            ..self
        }
    }

    pub fn qos(self, qos: QoSProfile) -> Self {
        Self { qos, ..self }
    }

    pub fn callback_group(self, group: &CallbackGroup) -> Self {
        Self {
            callback_group: Some(group.clone()),
            ..self
        }
    }
}

impl<'a> From<&'a str> for SubscriptionOptions<'a> {
    fn from(topic: &'a str) -> Self {
        Self::new(topic)
    }
}

/// Handle keeping a subscription alive. Dropping it unsubscribes.
pub struct Subscription<T: Message> {
    shared: Arc<SubscriptionShared<T>>,
}

impl<T: Message> Subscription<T> {
    pub(crate) fn new(
        context: &Context,
        topic: String,
        qos: QoSProfile,
        group: CallbackGroup,
        gate: Arc<Gate>,
        wait_set: Arc<WaitSet>,
        callback: Arc<dyn Fn(T) + Send + Sync>,
    ) -> Result<Self> {
        let shared = Arc::new(SubscriptionShared {
            topic,
            queue: Mutex::new(VecDeque::new()),
            capacity: qos.capacity(),
            dropped: AtomicU64::new(0),
            callback,
            group,
            gate,
            wait_set: Arc::clone(&wait_set),
        });
        context.graph().subscribe(&shared.topic, &shared)?;

        let entity: Arc<dyn Executable> = shared.clone();
        wait_set.add(Arc::downgrade(&entity));
        Ok(Self { shared })
    }

    pub fn topic_name(&self) -> &str {
        &self.shared.topic
    }

    pub fn callback_group(&self) -> &CallbackGroup {
        &self.shared.group
    }

    /// Messages received but not yet handed to the callback.
    pub fn pending_messages(&self) -> usize {
        self.shared.queue.lock().len()
    }

    /// Messages discarded because the history depth was exceeded.
    pub fn dropped_messages(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }
}

impl<T: Message> fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.shared.topic)
            .field("type", &T::type_name())
            .field("group", &self.shared.group)
            .finish()
    }
}

pub struct Publisher<T: Message> {
    topic: String,
    context: Context,
    _message: PhantomData<fn(T)>,
}

impl<T: Message> Clone for Publisher<T> {
    fn clone(&self) -> Self {
        Self {
            topic: self.topic.clone(),
            context: self.context.clone(),
            _message: PhantomData,
        }
    }
}

impl<T: Message> Publisher<T> {
    pub(crate) fn new(context: &Context, topic: String) -> Result<Self> {
        context.graph().declare::<T>(&topic)?;
        Ok(Self {
            topic,
            context: context.clone(),
            _message: PhantomData,
        })
    }

    pub fn topic_name(&self) -> &str {
        &self.topic
    }

    /// Hands a copy of `message` to every live subscription of the topic and
    /// returns how many there were.
    pub fn publish(&self, message: &T) -> Result<usize> {
        if self.context.is_shutdown() {
            return Err(RuntimeError::ContextShutDown);
        }
        let subscribers = self.context.graph().live_subscribers::<T>(&self.topic)?;
        for subscription in &subscribers {
            subscription.deliver(message.clone());
        }
        trace!(
            "published {} on '{}' to {} subscriptions",
            T::type_name(),
            self.topic,
            subscribers.len()
        );
        Ok(subscribers.len())
    }

    pub fn subscription_count(&self) -> Result<usize> {
        Ok(self
            .context
            .graph()
            .live_subscribers::<T>(&self.topic)?
            .len())
    }
}

impl<T: Message> fmt::Debug for Publisher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Publisher")
            .field("topic", &self.topic)
            .field("type", &T::type_name())
            .finish()
    }
}
