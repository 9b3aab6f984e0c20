use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use shared::{
    domain::{Container, ContainerId, Item, ItemId},
    protocol::ItemQuery,
};
use tokio::sync::{broadcast, watch, Mutex, Notify};
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, info, warn};

use crate::{
    candidates::{candidate_items, CandidateFilter},
    config::Settings,
    edit_queue::EditQueue,
    error::{CurationError, CurationFailure, FailureKind, InvalidEdit, ServiceError},
    reconciler::{Healed, Reconciler},
    reorder::{drag_reorder, step_reorder, Step},
    store::{dedup_preserving_order, ItemPool, MembershipEdit, MembershipStore},
    ContainerService, ItemService,
};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MembershipView {
    pub member_ids: Vec<ItemId>,
    pub resolved_members: Vec<Item>,
    pub candidate_items: Vec<Item>,
    /// True while the rendered members differ from the last confirmed list or a call is out.
    pub is_mutating: bool,
    pub last_error: Option<CurationFailure>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CurationEvent {
    MembersPruned {
        container_id: ContainerId,
        pruned: Vec<ItemId>,
    },
    Confirmed {
        container_id: ContainerId,
        member_ids: Vec<ItemId>,
    },
    PersistFailed {
        container_id: ContainerId,
        failure: CurationFailure,
    },
    Restored {
        container_id: ContainerId,
        member_ids: Vec<ItemId>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditStatus {
    Applied,
    /// The edit would not change the member list; nothing was sent.
    Unchanged,
    Rejected(InvalidEdit),
}

#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    pub member_count: usize,
    pub pruned: Vec<ItemId>,
    pub prune_error: Option<ServiceError>,
}

pub struct CurationSession {
    shared: Arc<Shared>,
}

struct Shared {
    container_id: ContainerId,
    container_kind: Option<String>,
    reconciler: Reconciler,
    coalesce_window: Duration,
    state: Mutex<SessionState>,
    view: watch::Sender<MembershipView>,
    events: broadcast::Sender<CurationEvent>,
    wake: Notify,
    closing: Notify,
    closed: AtomicBool,
}

struct SessionState {
    store: MembershipStore,
    /// Last member list the server confirmed.
    baseline: Vec<ItemId>,
    pending: EditQueue,
    in_flight: Vec<MembershipEdit>,
    dispatching: bool,
    filter: CandidateFilter,
    last_error: Option<CurationFailure>,
}

impl SessionState {
    fn is_mutating(&self) -> bool {
        self.dispatching || self.store.member_ids() != self.baseline.as_slice()
    }
}

impl CurationSession {
    /// Must run inside a tokio runtime.
    pub async fn open(
        container_id: ContainerId,
        containers: Arc<dyn ContainerService>,
        items: Arc<dyn ItemService>,
        query: ItemQuery,
        settings: &Settings,
    ) -> Result<(Self, LoadReport), CurationError> {
        let reconciler = Reconciler::new(containers, items, settings.request_timeout());
        let loaded = reconciler
            .load(&container_id, &query)
            .await
            .map_err(|source| CurationError::Load {
                container_id: container_id.clone(),
                source,
            })?;

        let Healed {
            container,
            resolved,
            pruned,
            prune_error,
        } = loaded.healed;
        let mut pool = ItemPool::new(loaded.pool);
        for item in resolved {
            pool.insert(item);
        }
        let store = MembershipStore::new(container.member_ids, pool);
        let report = LoadReport {
            member_count: store.member_ids().len(),
            pruned,
            prune_error: prune_error.clone(),
        };
        if !report.pruned.is_empty() {
            info!(
                container_id = %container_id,
                pruned = report.pruned.len(),
                "pruned unresolvable members on load"
            );
        }

        let state = SessionState {
            baseline: store.member_ids().to_vec(),
            store,
            pending: EditQueue::default(),
            in_flight: Vec::new(),
            dispatching: false,
            filter: CandidateFilter::default(),
            last_error: prune_error.map(|err| {
                CurationFailure::new(FailureKind::PrunePersist, err.to_string(), Vec::new())
            }),
        };
        let (events, _) = broadcast::channel(settings.event_capacity.max(1));
        let (view, _) = watch::channel(MembershipView::default());
        let shared = Arc::new(Shared {
            container_id,
            container_kind: container.item_kind,
            reconciler,
            coalesce_window: settings.coalesce_window(),
            state: Mutex::new(state),
            view,
            events,
            wake: Notify::new(),
            closing: Notify::new(),
            closed: AtomicBool::new(false),
        });
        {
            let state = shared.state.lock().await;
            shared.publish(&state);
        }
        tokio::spawn(run_worker(shared.clone()));

        Ok((Self { shared }, report))
    }

    pub fn container_id(&self) -> &ContainerId {
        &self.shared.container_id
    }

    pub fn view(&self) -> MembershipView {
        self.shared.view.borrow().clone()
    }

    pub fn watch_view(&self) -> watch::Receiver<MembershipView> {
        self.shared.view.subscribe()
    }

    pub fn view_stream(&self) -> WatchStream<MembershipView> {
        WatchStream::new(self.watch_view())
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<CurationEvent> {
        self.shared.events.subscribe()
    }

    pub async fn is_member(&self, item_id: &ItemId) -> bool {
        self.shared.state.lock().await.store.is_member(item_id)
    }

    pub async fn submit(&self, edit: MembershipEdit) -> Result<EditStatus, CurationError> {
        self.submit_derived(|_| Some(edit)).await
    }

    pub async fn toggle_membership(&self, item_id: ItemId) -> Result<EditStatus, CurationError> {
        self.submit_derived(|store| {
            Some(if store.is_member(&item_id) {
                MembershipEdit::Remove(item_id)
            } else {
                MembershipEdit::Add(item_id)
            })
        })
        .await
    }

    /// Drop `dragged` onto the slot currently held by `dropped_on`.
    pub async fn reorder(
        &self,
        dragged: &ItemId,
        dropped_on: &ItemId,
    ) -> Result<EditStatus, CurationError> {
        self.submit_derived(|store| {
            drag_reorder(store.member_ids(), dragged, dropped_on).map(MembershipEdit::Reorder)
        })
        .await
    }

    pub async fn move_up(&self, item_id: &ItemId) -> Result<EditStatus, CurationError> {
        self.step(item_id, Step::Up).await
    }

    pub async fn move_down(&self, item_id: &ItemId) -> Result<EditStatus, CurationError> {
        self.step(item_id, Step::Down).await
    }

    pub async fn set_filter(&self, filter: CandidateFilter) -> Result<(), CurationError> {
        self.ensure_open()?;
        let mut state = self.shared.state.lock().await;
        state.filter = filter;
        self.shared.publish(&state);
        Ok(())
    }

    /// Edits that no longer apply to the restored members come back as `Rejected`.
    pub async fn retry_failed(&self) -> Result<Vec<EditStatus>, CurationError> {
        self.ensure_open()?;
        let edits = {
            let mut state = self.shared.state.lock().await;
            let edits = state
                .last_error
                .take()
                .map(|failure| failure.discarded_edits)
                .unwrap_or_default();
            self.shared.publish(&state);
            edits
        };

        let mut statuses = Vec::with_capacity(edits.len());
        for edit in edits {
            statuses.push(self.submit(edit).await?);
        }
        Ok(statuses)
    }

    /// Resolves once nothing is left to reconcile, or when the session is closed.
    pub async fn settled(&self) -> MembershipView {
        let closing = self.shared.closing.notified();
        tokio::pin!(closing);
        closing.as_mut().enable();
        if self.shared.is_closed() {
            return self.view();
        }

        let mut rx = self.watch_view();
        tokio::select! {
            settled = rx.wait_for(|view| !view.is_mutating) => match settled {
                Ok(view) => view.clone(),
                Err(_) => self.view(),
            },
            _ = closing => self.view(),
        }
    }

    /// Queued edits are dropped. A call already in flight completes, but its result is ignored.
    pub fn close(&self) {
        if !self.shared.closed.swap(true, Ordering::SeqCst) {
            debug!(container_id = %self.shared.container_id, "closing curation session");
            self.shared.wake.notify_one();
            self.shared.closing.notify_waiters();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    async fn step(&self, item_id: &ItemId, step: Step) -> Result<EditStatus, CurationError> {
        self.submit_derived(|store| {
            step_reorder(store.member_ids(), item_id, step).map(MembershipEdit::Reorder)
        })
        .await
    }

    async fn submit_derived(
        &self,
        derive: impl FnOnce(&MembershipStore) -> Option<MembershipEdit>,
    ) -> Result<EditStatus, CurationError> {
        self.ensure_open()?;
        let mut state = self.shared.state.lock().await;
        let Some(edit) = derive(&state.store) else {
            return Ok(EditStatus::Unchanged);
        };

        let next = match state.store.apply(&edit) {
            Ok(next) => next,
            Err(invalid) => {
                debug!(
                    container_id = %self.shared.container_id,
                    edit = edit.label(),
                    reason = %invalid,
                    "rejected membership edit"
                );
                return Ok(EditStatus::Rejected(invalid));
            }
        };
        if next.as_slice() == state.store.member_ids() {
            return Ok(EditStatus::Unchanged);
        }

        state.store.replace_members(next);
        state.pending.push(edit);
        self.shared.publish(&state);
        drop(state);

        self.shared.wake.notify_one();
        Ok(EditStatus::Applied)
    }

    fn ensure_open(&self) -> Result<(), CurationError> {
        if self.shared.is_closed() {
            return Err(CurationError::Closed(self.shared.container_id.clone()));
        }
        Ok(())
    }
}

impl Drop for CurationSession {
    fn drop(&mut self) {
        self.close();
    }
}

impl Shared {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn publish(&self, state: &SessionState) {
        if self.is_closed() {
            return;
        }
        let members = state.store.member_ids();
        self.view.send_replace(MembershipView {
            member_ids: members.to_vec(),
            resolved_members: state.store.resolved_members().items,
            candidate_items: candidate_items(
                state.store.pool(),
                members,
                &state.filter,
                self.container_kind.as_deref(),
            ),
            is_mutating: state.is_mutating(),
            last_error: state.last_error.clone(),
        });
    }

    fn emit(&self, event: CurationEvent) {
        let _ = self.events.send(event);
    }

    async fn begin_dispatch(&self) -> Option<Vec<ItemId>> {
        let mut state = self.state.lock().await;
        if state.store.member_ids() == state.baseline.as_slice() {
            if !state.pending.is_empty() {
                debug!(
                    container_id = %self.container_id,
                    edits = state.pending.len(),
                    "queued edits cancelled out; nothing to send"
                );
                state.pending.clear();
            }
            self.publish(&state);
            return None;
        }
        let edits = state.pending.take();
        state.in_flight = edits;
        state.dispatching = true;
        self.publish(&state);
        Some(state.store.member_ids().to_vec())
    }

    async fn confirm(&self, container: Container, sent: &[ItemId]) {
        let (healed, lookup_error) = self.resolve_unknown(container).await;
        if self.is_closed() {
            return;
        }

        let mut state = self.state.lock().await;
        for item in healed.resolved {
            state.store.insert_item(item);
        }
        let authoritative = dedup_preserving_order(healed.container.member_ids);
        state.baseline = authoritative.clone();

        let mut conflict = None;
        if state.store.member_ids() == sent {
            state.store.replace_members(authoritative);
        } else if authoritative.as_slice() != sent {
            // Someone else changed the list; edits made while the call was out go on top of it.
            let rebased = state
                .store
                .rebase(authoritative.clone(), state.pending.as_slice());
            match rebased {
                Ok(next) => state.store.replace_members(next),
                Err(invalid) => {
                    let discarded = state.pending.take();
                    warn!(
                        container_id = %self.container_id,
                        edits = discarded.len(),
                        reason = %invalid,
                        "members changed on the server; dropping conflicting edits"
                    );
                    conflict = Some(CurationFailure::new(
                        FailureKind::Conflict,
                        format!("members changed on the server: {invalid}"),
                        discarded,
                    ));
                    state.store.replace_members(authoritative);
                }
            }
        }
        state.dispatching = false;
        state.in_flight.clear();
        state.last_error = conflict
            .clone()
            .or_else(|| {
                lookup_error.map(|err| {
                    CurationFailure::new(FailureKind::Resolve, err.to_string(), Vec::new())
                })
            })
            .or_else(|| {
                healed.prune_error.map(|err| {
                    CurationFailure::new(FailureKind::PrunePersist, err.to_string(), Vec::new())
                })
            });
        info!(
            container_id = %self.container_id,
            member_count = state.baseline.len(),
            "membership confirmed"
        );
        self.publish(&state);

        self.emit(CurationEvent::Confirmed {
            container_id: self.container_id.clone(),
            member_ids: state.baseline.clone(),
        });
        if let Some(failure) = conflict {
            self.emit(CurationEvent::PersistFailed {
                container_id: self.container_id.clone(),
                failure,
            });
        }
        if !healed.pruned.is_empty() {
            self.emit(CurationEvent::MembersPruned {
                container_id: self.container_id.clone(),
                pruned: healed.pruned,
            });
        }
    }

    async fn restore(&self, err: ServiceError) {
        warn!(
            container_id = %self.container_id,
            error = %err,
            "persisting membership failed; restoring authoritative state"
        );
        let refetched = match self.reconciler.fetch(&self.container_id).await {
            Ok(container) => Ok(self.resolve_unknown(container).await.0),
            Err(refetch_err) => Err(refetch_err),
        };
        if self.is_closed() {
            return;
        }

        let mut state = self.state.lock().await;
        let mut discarded = std::mem::take(&mut state.in_flight);
        discarded.extend(state.pending.take());

        let (kind, message, members) = match refetched {
            Ok(healed) => {
                for item in healed.resolved {
                    state.store.insert_item(item);
                }
                (FailureKind::Persist, err.to_string(), healed.container.member_ids)
            }
            Err(refetch_err) => {
                warn!(
                    container_id = %self.container_id,
                    error = %refetch_err,
                    "refetch failed; falling back to last confirmed membership"
                );
                (
                    FailureKind::PersistAndRefetch,
                    format!("{err}; refetch failed: {refetch_err}"),
                    state.baseline.clone(),
                )
            }
        };
        state.baseline = dedup_preserving_order(members);
        let baseline = state.baseline.clone();
        state.store.replace_members(baseline);
        state.dispatching = false;

        let failure = CurationFailure::new(kind, message, discarded);
        state.last_error = Some(failure.clone());
        self.publish(&state);

        self.emit(CurationEvent::PersistFailed {
            container_id: self.container_id.clone(),
            failure,
        });
        self.emit(CurationEvent::Restored {
            container_id: self.container_id.clone(),
            member_ids: state.baseline.clone(),
        });
    }

    /// Looks up member ids missing from the pool. A failed lookup keeps the container as sent.
    async fn resolve_unknown(&self, container: Container) -> (Healed, Option<ServiceError>) {
        let unknown: HashSet<ItemId> = {
            let state = self.state.lock().await;
            container
                .member_ids
                .iter()
                .filter(|id| !state.store.pool().contains(id))
                .cloned()
                .collect()
        };
        if unknown.is_empty() {
            return (Healed::unchanged(container), None);
        }

        match self
            .reconciler
            .heal(container.clone(), move |id| unknown.contains(id))
            .await
        {
            Ok(healed) => (healed, None),
            Err(err) => {
                warn!(
                    container_id = %self.container_id,
                    error = %err,
                    "could not resolve new members"
                );
                (Healed::unchanged(container), Some(err))
            }
        }
    }
}

async fn run_worker(shared: Arc<Shared>) {
    loop {
        shared.wake.notified().await;
        if shared.is_closed() {
            break;
        }
        if !shared.coalesce_window.is_zero() {
            tokio::time::sleep(shared.coalesce_window).await;
        }

        loop {
            if shared.is_closed() {
                return;
            }
            let Some(desired) = shared.begin_dispatch().await else {
                break;
            };

            let outcome = shared
                .reconciler
                .persist(&shared.container_id, &desired)
                .await;
            if shared.is_closed() {
                debug!(
                    container_id = %shared.container_id,
                    "discarding reconciliation result for closed session"
                );
                return;
            }
            match outcome {
                Ok(container) => shared.confirm(container, &desired).await,
                Err(err) => shared.restore(err).await,
            }
        }
    }
    debug!(container_id = %shared.container_id, "curation worker stopped");
}
