use std::sync::Arc;
use std::thread::{self, JoinHandle};

use arc_swap::ArcSwapOption;
use crossbeam_channel::{Receiver, Sender};
use log::{debug, info};

use crate::calc::CalculatorRegistry;
use crate::data::model::{Document, DocumentId};
use crate::error::AlignmentError;
use crate::session::{AlignmentSession, SessionRequest};

// ---------------------------------------------------------------------------
// SnapshotSlot – the single shared "current session" reference
// ---------------------------------------------------------------------------

/// Lock-free holder of the current value.
///
/// Readers load a snapshot and keep it as long as they like. The foreground
/// replaces the value with [`store`](Self::store); background work publishes
/// with [`compare_and_swap`](Self::compare_and_swap) so a result computed from
/// a value that has since been replaced is dropped.
pub struct SnapshotSlot<T = AlignmentSession> {
    current: ArcSwapOption<T>,
}

impl<T> Default for SnapshotSlot<T> {
    fn default() -> Self {
        SnapshotSlot {
            current: ArcSwapOption::empty(),
        }
    }
}

impl<T> SnapshotSlot<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&self) -> Option<Arc<T>> {
        self.current.load_full()
    }

    pub fn store(&self, value: Arc<T>) {
        self.current.store(Some(value));
    }

    pub fn clear(&self) {
        self.current.store(None);
    }

    /// Replace the value with `new` only if the slot still holds exactly
    /// `expected` (by reference). Returns whether `new` was published.
    pub fn compare_and_swap(&self, expected: &Option<Arc<T>>, new: Arc<T>) -> bool {
        let previous = self.current.compare_and_swap(expected, Some(new));
        match (&*previous, expected) {
            (Some(previous), Some(expected)) => Arc::ptr_eq(previous, expected),
            (None, None) => true,
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// AlignmentState – document, slot and background refinement
// ---------------------------------------------------------------------------

/// What became of a background refinement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefineEvent {
    /// The refined session replaced the one it started from.
    Published(DocumentId),
    /// Refinement changed nothing.
    Unchanged(DocumentId),
    /// The slot moved on while refining; the result was dropped.
    Discarded(DocumentId),
}

struct Shared {
    document: ArcSwapOption<Document>,
    slot: SnapshotSlot,
    registry: CalculatorRegistry,
}

impl Shared {
    fn is_current(&self, id: DocumentId) -> bool {
        let document = self.document.load();
        matches!(&*document, Some(doc) if doc.id() == id)
    }
}

/// The current document and session, independent of any front end.
pub struct AlignmentState {
    shared: Arc<Shared>,
    events_tx: Sender<RefineEvent>,
    events_rx: Receiver<RefineEvent>,
}

impl AlignmentState {
    pub fn new(registry: CalculatorRegistry) -> Self {
        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        AlignmentState {
            shared: Arc::new(Shared {
                document: ArcSwapOption::empty(),
                slot: SnapshotSlot::new(),
                registry,
            }),
            events_tx,
            events_rx,
        }
    }

    pub fn registry(&self) -> &CalculatorRegistry {
        &self.shared.registry
    }

    pub fn document(&self) -> Option<Arc<Document>> {
        self.shared.document.load_full()
    }

    pub fn current(&self) -> Option<Arc<AlignmentSession>> {
        self.shared.slot.load()
    }

    /// Outcomes of background refinements, in completion order.
    pub fn events(&self) -> &Receiver<RefineEvent> {
        &self.events_rx
    }

    /// Make `document` current and bring the session up to date with
    /// `request`.
    ///
    /// The session is rebuilt only when the current one does not already
    /// answer the request. When it still needs refining, refinement starts on
    /// a background thread whose handle is returned.
    pub fn update(
        &self,
        document: Arc<Document>,
        request: &SessionRequest,
    ) -> Result<Option<JoinHandle<()>>, AlignmentError> {
        if !self.shared.is_current(document.id()) {
            debug!("Switching to {}", document.id());
            self.shared.document.store(Some(Arc::clone(&document)));
        }

        let previous = self.shared.slot.load();
        let session = match &previous {
            Some(session) if session.is_valid_for(&document, request, &self.shared.registry) => {
                debug!("Session for {} still valid", document.id());
                Arc::clone(session)
            }
            _ => {
                let built = AlignmentSession::build(
                    &document,
                    &self.shared.registry,
                    previous.as_deref(),
                    request,
                )?;
                let built = Arc::new(built);
                self.shared.slot.store(Arc::clone(&built));
                built
            }
        };

        if !session.needs_refinement() {
            return Ok(None);
        }
        self.spawn_refinement(session).map(Some)
    }

    fn spawn_refinement(
        &self,
        start: Arc<AlignmentSession>,
    ) -> Result<JoinHandle<()>, AlignmentError> {
        let shared = Arc::clone(&self.shared);
        let events = self.events_tx.clone();
        let handle = thread::Builder::new()
            .name("rt-refine".into())
            .spawn(move || {
                let id = start.document_id();
                info!("Refining session for {id}");
                let refined = start.refine(|| !shared.is_current(id));
                let event = if Arc::ptr_eq(&refined, &start) {
                    RefineEvent::Unchanged(id)
                } else if shared.slot.compare_and_swap(&Some(start), refined) {
                    info!("Published refined session for {id}");
                    RefineEvent::Published(id)
                } else {
                    info!("Discarded stale refinement for {id}");
                    RefineEvent::Discarded(id)
                };
                let _ = events.send(event);
            })?;
        Ok(handle)
    }
}
