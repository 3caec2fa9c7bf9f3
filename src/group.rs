use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

static NEXT_GROUP_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackGroupType {
    /// At most one callback of the group runs at a time.
    MutuallyExclusive,
    /// Callbacks of the group may overlap, including with themselves.
    Reentrant,
}

/// Tag deciding which callbacks the executor may run side by side.
///
/// Cloning yields another handle to the same group.
#[derive(Clone)]
pub struct CallbackGroup {
    inner: Arc<GroupInner>,
}

struct GroupInner {
    id: u64,
    kind: CallbackGroupType,
    node_id: u64,
    node_name: Arc<str>,
    busy: AtomicBool,
}

impl CallbackGroup {
    pub(crate) fn new(kind: CallbackGroupType, node_id: u64, node_name: Arc<str>) -> Self {
        Self {
            inner: Arc::new(GroupInner {
                id: NEXT_GROUP_ID.fetch_add(1, Ordering::Relaxed),
                kind,
                node_id,
                node_name,
                busy: AtomicBool::new(false),
            }),
        }
    }

    pub fn kind(&self) -> CallbackGroupType {
        self.inner.kind
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub(crate) fn node_id(&self) -> u64 {
        self.inner.node_id
    }

    pub(crate) fn node_name(&self) -> &str {
        &self.inner.node_name
    }

    /// Claims the right to start a callback in this group.
    ///
    /// Every successful call must be paired with [`CallbackGroup::leave`].
    pub(crate) fn try_enter(&self) -> bool {
        match self.inner.kind {
            CallbackGroupType::Reentrant => true,
            CallbackGroupType::MutuallyExclusive => self
                .inner
                .busy
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok(),
        }
    }

    pub(crate) fn leave(&self) {
        if self.inner.kind == CallbackGroupType::MutuallyExclusive {
            self.inner.busy.store(false, Ordering::Release);
        }
    }
}

impl PartialEq for CallbackGroup {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for CallbackGroup {}

impl fmt::Debug for CallbackGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackGroup")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("node", &self.inner.node_name)
            .finish()
    }
}
