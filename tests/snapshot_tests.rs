mod common;

use std::collections::BTreeSet;
use std::sync::{Arc, Barrier};
use std::thread;

use crossbeam_channel::{Receiver, Sender};

use rusty_rt::calc::{Calculator, CalculatorRef};
use rusty_rt::data::model::PeptideKey;
use rusty_rt::error::CalculatorError;
use rusty_rt::session::{AlignmentSession, SessionRequest};
use rusty_rt::state::{AlignmentState, RefineEvent, SnapshotSlot};

use common::{document, registry, scores, unrefinable};

fn request() -> SessionRequest {
    SessionRequest {
        target_index: Some(0),
        ..SessionRequest::default()
    }
}

#[test]
fn stale_refinement_is_discarded() {
    let doc = document();
    let reg = registry([scores("ssr")]);
    let slot: Arc<SnapshotSlot> = Arc::new(SnapshotSlot::new());
    let old = Arc::new(AlignmentSession::build(&doc, &reg, None, &request()).unwrap());
    slot.store(Arc::clone(&old));

    let barrier = Arc::new(Barrier::new(2));
    let worker = {
        let slot = Arc::clone(&slot);
        let barrier = Arc::clone(&barrier);
        thread::spawn(move || {
            let start = slot.load();
            barrier.wait();
            let session = start.clone().unwrap();
            let refined = session.refine(|| false);
            assert!(!Arc::ptr_eq(&refined, &session));
            slot.compare_and_swap(&start, refined)
        })
    };

    // The foreground moves on while the worker is refining.
    let newer = Arc::new(AlignmentSession::build(&document(), &reg, Some(&old), &request()).unwrap());
    slot.store(Arc::clone(&newer));
    barrier.wait();

    assert!(!worker.join().unwrap());
    assert!(Arc::ptr_eq(&slot.load().unwrap(), &newer));
}

#[test]
fn refinement_is_published_when_nothing_moved() {
    let doc = document();
    let reg = registry([scores("ssr")]);
    let slot: SnapshotSlot = SnapshotSlot::new();
    let start = Arc::new(AlignmentSession::build(&doc, &reg, None, &request()).unwrap());
    slot.store(Arc::clone(&start));

    let refined = start.refine(|| false);
    assert!(slot.compare_and_swap(&Some(start), Arc::clone(&refined)));
    assert!(Arc::ptr_eq(&slot.load().unwrap(), &refined));
}

#[test]
fn state_refines_in_the_background() {
    let state = AlignmentState::new(registry([scores("ssr")]));
    let doc = Arc::new(document());

    let handle = state.update(Arc::clone(&doc), &request()).unwrap();
    handle.expect("refinement should be scheduled").join().unwrap();
    assert_eq!(state.events().recv().unwrap(), RefineEvent::Published(doc.id()));

    let current = state.current().unwrap();
    assert!(current.is_refined());
    assert!(current.has_outliers());

    // A repeated request reuses the published session.
    assert!(state.update(Arc::clone(&doc), &request()).unwrap().is_none());
    assert!(Arc::ptr_eq(&state.current().unwrap(), &current));
}

#[test]
fn state_skips_refinement_when_not_requested() {
    let state = AlignmentState::new(registry([scores("ssr")]));
    let doc = Arc::new(document());
    let request = SessionRequest {
        refine: false,
        ..request()
    };
    assert!(state.update(Arc::clone(&doc), &request).unwrap().is_none());
    let current = state.current().unwrap();
    assert!(current.refinement().is_none());
    assert!(current.is_valid_for_document(doc.id()));
}

#[test]
fn state_rebuilds_for_a_new_document() {
    let state = AlignmentState::new(registry([scores("ssr")]));
    let first = Arc::new(document());
    let no_refine = SessionRequest {
        refine: false,
        ..request()
    };
    state.update(Arc::clone(&first), &no_refine).unwrap();
    let before = state.current().unwrap();

    let second = Arc::new(document());
    state.update(Arc::clone(&second), &no_refine).unwrap();
    let after = state.current().unwrap();
    assert!(!Arc::ptr_eq(&before, &after));
    assert_eq!(after.document_id(), second.id());
    assert_eq!(state.document().map(|d| d.id()), Some(second.id()));
}

/// Wraps a calculator and holds refinement at its standards lookup until the
/// test releases it.
#[derive(Debug)]
struct Gated {
    inner: CalculatorRef,
    entered: Sender<()>,
    release: Receiver<()>,
}

impl Calculator for Gated {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn is_usable(&self) -> bool {
        self.inner.is_usable()
    }

    fn score(&self, peptide: &PeptideKey) -> Result<f64, CalculatorError> {
        self.inner.score(peptide)
    }

    fn required_standards(
        &self,
        peptides: &[PeptideKey],
    ) -> Result<BTreeSet<PeptideKey>, CalculatorError> {
        self.entered.send(()).unwrap();
        self.release.recv().unwrap();
        self.inner.required_standards(peptides)
    }
}

/// State over a gated `ssr` calculator, plus the gate's two ends.
fn gated_state() -> (AlignmentState, Receiver<()>, Sender<()>) {
    let (entered_tx, entered_rx) = crossbeam_channel::unbounded();
    let (release_tx, release_rx) = crossbeam_channel::unbounded();
    let gated: CalculatorRef = Arc::new(Gated {
        inner: scores("ssr"),
        entered: entered_tx,
        release: release_rx,
    });
    (AlignmentState::new(registry([gated])), entered_rx, release_tx)
}

#[test]
fn state_discards_refinement_overtaken_by_a_new_session() {
    let (state, entered, release) = gated_state();
    let doc = Arc::new(document());

    let handle = state.update(Arc::clone(&doc), &request()).unwrap().unwrap();
    entered.recv().unwrap();

    // Same document, different request: the slot moves on.
    let other_run = SessionRequest {
        target_index: Some(1),
        refine: false,
        ..request()
    };
    assert!(state.update(Arc::clone(&doc), &other_run).unwrap().is_none());
    let newer = state.current().unwrap();

    release.send(()).unwrap();
    handle.join().unwrap();
    assert_eq!(state.events().recv().unwrap(), RefineEvent::Discarded(doc.id()));
    assert!(Arc::ptr_eq(&state.current().unwrap(), &newer));
    assert!(!newer.is_refined());
}

#[test]
fn state_cancels_refinement_when_the_document_is_replaced() {
    let (state, entered, release) = gated_state();
    let first = Arc::new(document());

    let handle = state.update(Arc::clone(&first), &request()).unwrap().unwrap();
    entered.recv().unwrap();

    let second = Arc::new(document());
    let no_refine = SessionRequest {
        refine: false,
        ..request()
    };
    assert!(state.update(Arc::clone(&second), &no_refine).unwrap().is_none());
    let newer = state.current().unwrap();

    release.send(()).unwrap();
    handle.join().unwrap();
    // Without cancellation the first document would have been refined.
    assert_eq!(state.events().recv().unwrap(), RefineEvent::Unchanged(first.id()));
    assert!(Arc::ptr_eq(&state.current().unwrap(), &newer));
    assert_eq!(newer.document_id(), second.id());
}

#[test]
fn state_reports_refinement_that_changes_nothing() {
    let (doc, reg) = unrefinable();
    let doc = Arc::new(doc);
    let state = AlignmentState::new(reg);
    let strict = SessionRequest {
        threshold: 0.99,
        ..request()
    };

    let handle = state.update(Arc::clone(&doc), &strict).unwrap();
    let before = state.current().unwrap();
    handle.expect("refinement should be scheduled").join().unwrap();
    assert_eq!(state.events().recv().unwrap(), RefineEvent::Unchanged(doc.id()));
    assert!(Arc::ptr_eq(&state.current().unwrap(), &before));
    assert!(!before.is_refined());
}
