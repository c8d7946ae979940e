use super::forest::Forest;
use super::node::{Draft, NodeId, VersionNode};
use crate::error::ValidationError;
use crate::events::{EventBus, SessionEvent};
use tracing::{debug, warn};

/// Result of [`VersionTree::add_node`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AddOutcome {
    /// Draft equals the selected version; nothing was created.
    Unchanged(NodeId),
    Added(NodeId),
}

impl AddOutcome {
    pub fn id(self) -> NodeId {
        match self {
            AddOutcome::Unchanged(id) | AddOutcome::Added(id) => id,
        }
    }

    pub fn is_added(self) -> bool {
        matches!(self, AddOutcome::Added(_))
    }
}

/// Prompt history plus the two selection pointers.
///
/// `selected` is the version being edited. `timeline` is where the next edit
/// gets attached. Both always name nodes present in the forest.
#[derive(Debug)]
pub struct VersionTree {
    forest: Forest,
    selected: Option<NodeId>,
    timeline: Option<NodeId>,
    events: EventBus,
}

impl VersionTree {
    pub fn new(events: EventBus) -> Self {
        Self {
            forest: Forest::new(),
            selected: None,
            timeline: None,
            events,
        }
    }

    /// Rebuild from persisted parts. Pointers to unknown versions are dropped.
    pub fn from_parts(
        forest: Forest,
        selected: Option<NodeId>,
        timeline: Option<NodeId>,
        events: EventBus,
    ) -> Self {
        let known = |id: Option<NodeId>| id.filter(|id| forest.contains(*id));
        let (selected, timeline) = (known(selected), known(timeline));
        Self {
            forest,
            selected,
            timeline,
            events,
        }
    }

    pub fn forest(&self) -> &Forest {
        &self.forest
    }

    pub fn selected(&self) -> Option<NodeId> {
        self.selected
    }

    pub fn timeline(&self) -> Option<NodeId> {
        self.timeline
    }

    pub fn selected_node(&self) -> Option<&VersionNode> {
        self.selected.and_then(|id| self.forest.get(id))
    }

    pub fn get(&self, id: NodeId) -> Option<&VersionNode> {
        self.forest.get(id)
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Option<&mut VersionNode> {
        self.forest.get_mut(id)
    }

    /// Store `draft` as a new version unless it equals the selected one.
    ///
    /// Placement:
    /// - nothing selected: new root
    /// - no timeline: selected loses head, new root
    /// - selected is head: it loses head, new child of the timeline node
    /// - selected is historical: new child of selected, which becomes the timeline
    pub fn add_node(&mut self, draft: Draft) -> Result<AddOutcome, ValidationError> {
        draft.validate()?;

        if let Some(current) = self.selected_node() {
            if draft.matches(current) {
                debug!(node = %current.id, "draft unchanged, no new version");
                return Ok(AddOutcome::Unchanged(current.id));
            }
        }

        let id = self.forest.allocate_id();
        let node = VersionNode::from_draft(id, self.selected, draft);

        match (self.selected, self.timeline) {
            (None, _) => self.forest.push_root(node),
            (Some(selected), None) => {
                self.demote(selected);
                self.forest.push_root(node);
            }
            (Some(selected), Some(timeline)) if self.is_head(selected) => {
                self.demote(selected);
                self.attach(timeline, node);
            }
            (Some(selected), Some(_)) => {
                self.attach(selected, node);
                self.timeline = Some(selected);
            }
        }
        self.selected = Some(id);

        debug!(node = %id, parent = ?self.forest.parent_of(id), "added prompt version");
        self.events.publish(SessionEvent::NodeAdded(id));
        self.events.publish(SessionEvent::NodeSelected(Some(id)));
        self.events.publish(SessionEvent::StateChanged);
        Ok(AddOutcome::Added(id))
    }

    /// Point the selection at `id`. Unknown ids are ignored.
    ///
    /// Selecting a head makes its parent the timeline, so the next edit
    /// continues the branch instead of nesting under the head.
    pub fn select_node(&mut self, id: NodeId) -> bool {
        let Some(node) = self.forest.get(id) else {
            debug!(node = %id, "select: unknown version");
            return false;
        };

        self.timeline = if node.is_head {
            self.forest.parent_of(id)
        } else {
            Some(id)
        };
        self.selected = Some(id);
        self.events.publish(SessionEvent::NodeSelected(Some(id)));
        true
    }

    pub fn flag_node(&mut self, id: NodeId) -> bool {
        self.set_flag(id, true)
    }

    pub fn unflag_node(&mut self, id: NodeId) -> bool {
        self.set_flag(id, false)
    }

    /// Versions currently flagged, in pre-order.
    pub fn flagged_nodes(&self) -> Vec<&VersionNode> {
        self.forest.iter().filter(|node| node.flagged).collect()
    }

    /// Keep only flagged versions, each as a bare root, and clear the selection.
    pub fn extract_flagged_nodes(&mut self) -> &Forest {
        let before = self.forest.len();
        self.forest.extract_flagged();
        self.selected = None;
        self.timeline = None;

        debug!(before, kept = self.forest.len(), "extracted flagged versions");
        self.events.publish(SessionEvent::StateChanged);
        self.events.publish(SessionEvent::NodeSelected(None));
        &self.forest
    }

    /// Drop every version and both pointers. Publishes nothing.
    pub(crate) fn reset(&mut self) {
        self.forest = Forest::new();
        self.selected = None;
        self.timeline = None;
    }

    fn set_flag(&mut self, id: NodeId, flagged: bool) -> bool {
        let Some(node) = self.forest.get_mut(id) else {
            debug!(node = %id, flagged, "flag: unknown version");
            return false;
        };
        node.flagged = flagged;

        let event = if flagged {
            SessionEvent::NodeFlagged(id)
        } else {
            SessionEvent::NodeUnflagged(id)
        };
        self.events.publish(event);
        self.events.publish(SessionEvent::StateChanged);
        true
    }

    fn is_head(&self, id: NodeId) -> bool {
        self.forest.get(id).is_some_and(|node| node.is_head)
    }

    fn demote(&mut self, id: NodeId) {
        if let Some(node) = self.forest.get_mut(id) {
            node.is_head = false;
        }
    }

    fn attach(&mut self, parent: NodeId, node: VersionNode) {
        if let Err(node) = self.forest.push_child(parent, node) {
            warn!(%parent, node = %node.id, "attach point vanished, storing as root");
            self.forest.push_root(node);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChatMessage, RequestOptions};

    fn draft(text: &str) -> Draft {
        Draft::new("llama3", vec![ChatMessage::user(text)], RequestOptions::default())
    }

    fn tree() -> VersionTree {
        VersionTree::new(EventBus::new())
    }

    #[test]
    fn first_version_is_a_head_root() {
        let mut tree = tree();
        let id = tree.add_node(draft("v1")).unwrap().id();

        let node = tree.get(id).unwrap();
        assert!(node.is_head);
        assert_eq!(node.previous_version_id, None);
        assert_eq!(tree.forest().roots(), &[id]);
        assert_eq!(tree.selected(), Some(id));
        assert_eq!(tree.timeline(), None);
    }

    #[test]
    fn editing_without_timeline_appends_a_root() {
        let mut tree = tree();
        let first = tree.add_node(draft("v1")).unwrap().id();
        let second = tree.add_node(draft("v2")).unwrap().id();

        assert_eq!(tree.forest().roots(), &[first, second]);
        assert!(!tree.get(first).unwrap().is_head);
        assert!(tree.get(second).unwrap().is_head);
        assert_eq!(tree.get(second).unwrap().previous_version_id, Some(first));
    }

    #[test]
    fn invalid_draft_is_rejected_without_changes() {
        let mut tree = tree();
        let result = tree.add_node(Draft::new("", vec![], RequestOptions::default()));
        assert_eq!(result, Err(ValidationError::EmptyModel));
        assert!(tree.forest().is_empty());
    }

    #[test]
    fn selecting_a_historical_node_makes_it_the_timeline() {
        let mut tree = tree();
        let first = tree.add_node(draft("v1")).unwrap().id();
        tree.add_node(draft("v2")).unwrap();

        assert!(tree.select_node(first));
        assert_eq!(tree.timeline(), Some(first));
    }

    #[test]
    fn selecting_a_root_head_clears_the_timeline() {
        let mut tree = tree();
        let first = tree.add_node(draft("v1")).unwrap().id();
        tree.select_node(first);
        assert_eq!(tree.timeline(), None);
    }

    #[test]
    fn unknown_ids_are_ignored() {
        let mut tree = tree();
        let id = tree.add_node(draft("v1")).unwrap().id();
        let mut rx = tree.events.subscribe();

        assert!(!tree.select_node(NodeId(404)));
        assert!(!tree.flag_node(NodeId(404)));
        assert!(!tree.unflag_node(NodeId(404)));
        assert_eq!(tree.selected(), Some(id));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn flag_and_unflag_publish_events() {
        let mut tree = tree();
        let id = tree.add_node(draft("v1")).unwrap().id();
        let mut rx = tree.events.subscribe();

        tree.flag_node(id);
        assert!(tree.get(id).unwrap().flagged);
        tree.unflag_node(id);
        assert!(!tree.get(id).unwrap().flagged);

        let events: Vec<SessionEvent> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert_eq!(
            events,
            vec![
                SessionEvent::NodeFlagged(id),
                SessionEvent::StateChanged,
                SessionEvent::NodeUnflagged(id),
                SessionEvent::StateChanged,
            ]
        );
    }

    #[test]
    fn from_parts_drops_dangling_pointers() {
        let tree = VersionTree::from_parts(
            Forest::new(),
            Some(NodeId(3)),
            Some(NodeId(2)),
            EventBus::new(),
        );
        assert_eq!(tree.selected(), None);
        assert_eq!(tree.timeline(), None);
    }
}
