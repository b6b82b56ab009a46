use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use log::debug;

use crate::data::loader::load_file;
use crate::data::model::Document;
use crate::session::{AlignmentSession, SessionRequest};
use crate::state::AlignmentState;

// ---------------------------------------------------------------------------
// Command-line front end over AlignmentState
// ---------------------------------------------------------------------------

pub struct RustyRtApp {
    pub state: AlignmentState,
    document: Arc<Document>,
}

impl RustyRtApp {
    /// Load a document and register the calculators it carries.
    pub fn open(path: &Path) -> Result<Self> {
        let loaded = load_file(path)
            .with_context(|| format!("loading document {}", path.display()))?;
        let state = AlignmentState::new(loaded.registry());
        Ok(RustyRtApp {
            state,
            document: Arc::new(loaded.document),
        })
    }

    pub fn document(&self) -> &Arc<Document> {
        &self.document
    }

    /// Bring the session up to date with `request`, waiting for any
    /// background refinement to finish.
    pub fn align(&self, request: &SessionRequest) -> Result<Arc<AlignmentSession>> {
        let refinement = self.state.update(Arc::clone(&self.document), request)?;
        if let Some(handle) = refinement {
            handle
                .join()
                .map_err(|_| anyhow!("refinement thread panicked"))?;
        }
        for event in self.state.events().try_iter() {
            debug!("Refinement finished: {event:?}");
        }
        self.state.current().context("no regression session was built")
    }
}
