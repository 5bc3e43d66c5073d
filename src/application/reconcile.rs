//! Snapshot to live handoff.
//!
//! A view starts out rendering its bootstrap snapshot. The first successful,
//! non-empty live result whose member ids differ from what was last seen
//! moves it to live data for good. Before that edge live failures are
//! swallowed; after it they replace the content.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use metrics::counter;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::application::live::QueryState;
use crate::application::pagination::CollectionView;
use crate::application::repos::SourceError;
use crate::domain::entities::PostView;

pub(crate) const METRIC_HANDOFF: &str = "folio_handoff_total";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandoffState {
    /// Rendering the bootstrap snapshot.
    SnapshotOnly,
    /// Rendering live data. Never left except by teardown.
    LiveAuthoritative,
    /// The owning view is gone; nothing transitions any more.
    TornDown,
}

/// Shared cancellation flag for one view instance.
#[derive(Debug, Clone, Default)]
pub struct Teardown(Arc<AtomicBool>);

impl Teardown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Values whose identity is the set of post ids they contain.
pub trait Members {
    fn member_ids(&self) -> BTreeSet<Uuid>;
}

impl Members for CollectionView {
    fn member_ids(&self) -> BTreeSet<Uuid> {
        self.ids().collect()
    }
}

impl Members for Option<PostView> {
    fn member_ids(&self) -> BTreeSet<Uuid> {
        self.iter().map(PostView::id).collect()
    }
}

/// What a call to [`Reconciler::observe`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// Nothing changed: still loading, swallowed, or torn down.
    Ignored,
    /// Live data refreshed with the same member ids.
    Unchanged,
    /// The one-time switch from snapshot to live data.
    HandedOff,
    /// Live member ids changed.
    Changed,
    /// Live query failed after the handoff.
    Failed,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Render<'a, T> {
    Content {
        data: &'a T,
        /// True while a live re-fetch is under way.
        refreshing: bool,
        live: bool,
    },
    Error(&'a SourceError),
}

pub struct Reconciler<T> {
    state: HandoffState,
    snapshot: T,
    live: Option<T>,
    observed: BTreeSet<Uuid>,
    error: Option<SourceError>,
    refreshing: bool,
    teardown: Teardown,
}

impl<T: Members + Clone> Reconciler<T> {
    pub fn new(snapshot: T) -> Self {
        Self {
            state: HandoffState::SnapshotOnly,
            snapshot,
            live: None,
            observed: BTreeSet::new(),
            error: None,
            refreshing: false,
            teardown: Teardown::new(),
        }
    }

    pub fn state(&self) -> HandoffState {
        if self.teardown.is_triggered() {
            HandoffState::TornDown
        } else {
            self.state
        }
    }

    pub fn teardown_handle(&self) -> Teardown {
        self.teardown.clone()
    }

    pub fn tear_down(&mut self) {
        self.teardown.trigger();
        self.state = HandoffState::TornDown;
    }

    /// Feed the latest live query state through the state machine.
    pub fn observe(&mut self, query: &QueryState<T>) -> Observation {
        if self.teardown.is_triggered() {
            self.state = HandoffState::TornDown;
        }

        match self.state {
            HandoffState::TornDown => Observation::Ignored,
            HandoffState::SnapshotOnly => self.observe_before_handoff(query),
            HandoffState::LiveAuthoritative => self.observe_live(query),
        }
    }

    fn observe_before_handoff(&mut self, query: &QueryState<T>) -> Observation {
        if query.loading {
            return Observation::Ignored;
        }
        if let Some(err) = &query.error {
            debug!(error = %err, "Live query failed before handoff; keeping snapshot");
            return Observation::Ignored;
        }
        let Some(data) = &query.data else {
            return Observation::Ignored;
        };

        let ids = data.member_ids();
        // An empty first result must not replace the snapshot.
        if ids.is_empty() || ids == self.observed {
            return Observation::Ignored;
        }

        info!(
            members = ids.len(),
            snapshot_members = self.snapshot.member_ids().len(),
            "Handing off from snapshot to live data"
        );
        counter!(METRIC_HANDOFF).increment(1);
        self.observed = ids;
        self.live = Some(data.clone());
        self.state = HandoffState::LiveAuthoritative;
        Observation::HandedOff
    }

    fn observe_live(&mut self, query: &QueryState<T>) -> Observation {
        self.refreshing = query.loading;
        if let Some(err) = &query.error {
            if self.error.as_ref() != Some(err) {
                warn!(error = %err, "Live query failed");
            }
            self.error = Some(err.clone());
            return Observation::Failed;
        }
        self.error = None;

        let Some(data) = &query.data else {
            return Observation::Unchanged;
        };
        let ids = data.member_ids();
        self.live = Some(data.clone());
        if ids == self.observed {
            Observation::Unchanged
        } else {
            self.observed = ids;
            Observation::Changed
        }
    }

    pub fn render(&self) -> Render<'_, T> {
        match (self.state, &self.live) {
            (HandoffState::LiveAuthoritative, Some(live)) => match &self.error {
                Some(err) => Render::Error(err),
                None => Render::Content {
                    data: live,
                    refreshing: self.refreshing,
                    live: true,
                },
            },
            (HandoffState::TornDown, Some(live)) => Render::Content {
                data: live,
                refreshing: false,
                live: true,
            },
            _ => Render::Content {
                data: &self.snapshot,
                refreshing: false,
                live: false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use crate::domain::entities::PostRecord;
    use crate::domain::types::Confirmation;

    use super::*;

    fn post(title: &str) -> PostView {
        PostView {
            post: PostRecord {
                id: Uuid::new_v4(),
                title: title.to_string(),
                body: format!("{title} body text"),
                created_at: datetime!(2024-01-01 00:00 UTC),
                updated_at: None,
                published: true,
                author_id: Uuid::nil(),
                profile_id: None,
            },
            author: None,
            confirmation: Confirmation::Confirmed,
        }
    }

    fn list(posts: &[PostView]) -> CollectionView {
        CollectionView {
            posts: posts.to_vec(),
            ..CollectionView::default()
        }
    }

    fn rendered_len(reconciler: &Reconciler<CollectionView>) -> usize {
        match reconciler.render() {
            Render::Content { data, .. } => data.len(),
            Render::Error(_) => usize::MAX,
        }
    }

    #[test]
    fn loading_state_keeps_snapshot() {
        let snapshot = list(&[post("Snap")]);
        let mut reconciler = Reconciler::new(snapshot);

        let outcome = reconciler.observe(&QueryState::pending(None));
        assert_eq!(outcome, Observation::Ignored);
        assert_eq!(reconciler.state(), HandoffState::SnapshotOnly);
    }

    #[test]
    fn handoff_fires_once() {
        let a = post("Alpha");
        let b = post("Bravo");
        let mut reconciler = Reconciler::new(list(&[a.clone()]));

        assert_eq!(
            reconciler.observe(&QueryState::ready(list(&[a.clone()]))),
            Observation::HandedOff
        );
        assert_eq!(
            reconciler.observe(&QueryState::ready(list(&[a.clone()]))),
            Observation::Unchanged
        );
        assert_eq!(
            reconciler.observe(&QueryState::ready(list(&[a, b]))),
            Observation::Changed
        );
        assert_eq!(reconciler.state(), HandoffState::LiveAuthoritative);
    }

    #[test]
    fn empty_first_result_does_not_replace_snapshot() {
        let mut reconciler = Reconciler::new(list(&[post("Snap")]));

        let outcome = reconciler.observe(&QueryState::ready(CollectionView::empty()));
        assert_eq!(outcome, Observation::Ignored);
        assert_eq!(rendered_len(&reconciler), 1);
    }

    #[test]
    fn empty_result_after_handoff_is_applied() {
        let mut reconciler = Reconciler::new(list(&[post("Snap")]));
        reconciler.observe(&QueryState::ready(list(&[post("Live")])));

        let outcome = reconciler.observe(&QueryState::ready(CollectionView::empty()));
        assert_eq!(outcome, Observation::Changed);
        assert_eq!(rendered_len(&reconciler), 0);
    }

    #[test]
    fn errors_are_swallowed_before_handoff() {
        let mut reconciler = Reconciler::new(list(&[post("Snap")]));

        let outcome = reconciler.observe(&QueryState::failed(None, SourceError::Timeout));
        assert_eq!(outcome, Observation::Ignored);
        assert!(matches!(reconciler.render(), Render::Content { live: false, .. }));
    }

    #[test]
    fn errors_surface_after_handoff_and_clear_on_success() {
        let live = list(&[post("Live")]);
        let mut reconciler = Reconciler::new(list(&[post("Snap")]));
        reconciler.observe(&QueryState::ready(live.clone()));

        let outcome =
            reconciler.observe(&QueryState::failed(Some(live.clone()), SourceError::Timeout));
        assert_eq!(outcome, Observation::Failed);
        assert_eq!(reconciler.render(), Render::Error(&SourceError::Timeout));

        reconciler.observe(&QueryState::ready(live));
        assert!(matches!(reconciler.render(), Render::Content { live: true, .. }));
    }

    #[test]
    fn refreshing_keeps_live_content() {
        let live = list(&[post("Live")]);
        let mut reconciler = Reconciler::new(list(&[post("Snap")]));
        reconciler.observe(&QueryState::ready(live.clone()));

        reconciler.observe(&QueryState::pending(Some(live)));
        assert!(matches!(
            reconciler.render(),
            Render::Content {
                refreshing: true,
                live: true,
                ..
            }
        ));
    }

    #[test]
    fn teardown_blocks_the_transition() {
        let mut reconciler = Reconciler::new(list(&[post("Snap")]));
        let handle = reconciler.teardown_handle();
        handle.trigger();

        let outcome = reconciler.observe(&QueryState::ready(list(&[post("Live")])));
        assert_eq!(outcome, Observation::Ignored);
        assert_eq!(reconciler.state(), HandoffState::TornDown);
        assert!(matches!(reconciler.render(), Render::Content { live: false, .. }));
    }

    #[test]
    fn detail_handoff_uses_the_single_id() {
        let p = post("Detail");
        let mut reconciler: Reconciler<Option<PostView>> = Reconciler::new(None);

        assert_eq!(
            reconciler.observe(&QueryState::ready(None)),
            Observation::Ignored
        );
        assert_eq!(
            reconciler.observe(&QueryState::ready(Some(p))),
            Observation::HandedOff
        );
    }
}
