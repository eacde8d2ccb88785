use super::*;
use crate::fiber::{ElementType, Fiber};
use crate::hash::hash_key;
use crate::view::{fragment, host, text};

fn item(key: &str) -> View {
    host("li").key(key).into()
}

fn list(keys: &[&str]) -> View {
    View::List(keys.iter().map(|key| item(key)).collect())
}

struct Tree {
    arena: FiberArena,
    parent: FiberId,
}

impl Tree {
    /// Mounts `children` under a fresh parent as the committed child list.
    fn mount(children: &View) -> Self {
        let mut arena = FiberArena::new();
        let parent = arena.alloc(Fiber::new(
            WorkTag::Fragment,
            None,
            ElementType::Fragment,
            Props::None,
        ));
        let first = reconcile_child_fibers(&mut arena, parent, None, children, Lanes::SYNC, false);
        arena[parent].child = first;
        Self { arena, parent }
    }

    /// Reconciles `children` against the committed list and returns the
    /// work-in-progress parent.
    fn update(&mut self, children: &View) -> FiberId {
        let wip = create_work_in_progress(&mut self.arena, self.parent, Props::None);
        let current_first = self.arena[self.parent].child;
        let first =
            reconcile_child_fibers(&mut self.arena, wip, current_first, children, Lanes::SYNC, true);
        self.arena[wip].child = first;
        wip
    }

    fn children(&self, parent: FiberId) -> Vec<FiberId> {
        let mut out = Vec::new();
        let mut child = self.arena[parent].child;
        while let Some(id) = child {
            out.push(id);
            child = self.arena[id].sibling;
        }
        out
    }

    fn committed(&self, key: &str) -> FiberId {
        self.children(self.parent)
            .into_iter()
            .find(|id| self.arena[*id].key == Some(hash_key(key)))
            .unwrap_or_else(|| panic!("no committed child {key}"))
    }

    fn placed(&self, parent: FiberId) -> Vec<bool> {
        self.children(parent)
            .into_iter()
            .map(|id| self.arena[id].flags.contains(Flags::PLACEMENT))
            .collect()
    }
}

#[test]
fn mount_flags_nothing() {
    let tree = Tree::mount(&list(&["a", "b"]));
    let children = tree.children(tree.parent);
    assert_eq!(children.len(), 2);
    for (index, id) in children.iter().enumerate() {
        assert!(tree.arena[*id].flags.is_empty());
        assert_eq!(tree.arena[*id].index, index);
        assert_eq!(tree.arena[*id].parent, Some(tree.parent));
    }
}

#[test]
fn rotating_last_to_front_moves_the_others() {
    let mut tree = Tree::mount(&list(&["a", "b", "c"]));
    let wip = tree.update(&list(&["c", "a", "b"]));

    let children = tree.children(wip);
    let alternates: Vec<_> = children.iter().map(|id| tree.arena[*id].alternate).collect();
    assert_eq!(
        alternates,
        vec![
            Some(tree.committed("c")),
            Some(tree.committed("a")),
            Some(tree.committed("b"))
        ]
    );
    assert_eq!(tree.placed(wip), vec![false, true, true]);
    assert!(tree.arena[wip].deletions.is_empty());
}

#[test]
fn moving_first_to_back_moves_only_that_child() {
    let mut tree = Tree::mount(&list(&["a", "b", "c"]));
    let wip = tree.update(&list(&["b", "c", "a"]));
    assert_eq!(tree.placed(wip), vec![false, false, true]);
}

#[test]
fn removed_key_is_deleted_and_rest_stay() {
    let mut tree = Tree::mount(&list(&["a", "b", "c"]));
    let b = tree.committed("b");
    let wip = tree.update(&list(&["a", "c"]));

    assert_eq!(tree.placed(wip), vec![false, false]);
    assert_eq!(tree.arena[wip].deletions.as_slice(), &[b]);
    assert!(tree.arena[wip].flags.contains(Flags::CHILD_DELETION));
}

#[test]
fn inserted_key_is_placed() {
    let mut tree = Tree::mount(&list(&["a", "c"]));
    let wip = tree.update(&list(&["a", "b", "c"]));
    assert_eq!(tree.placed(wip), vec![false, true, false]);
    let indices: Vec<_> = tree
        .children(wip)
        .iter()
        .map(|id| tree.arena[*id].index)
        .collect();
    assert_eq!(indices, vec![0, 1, 2]);
}

#[test]
fn same_key_different_type_remounts() {
    let mut tree = Tree::mount(&View::List(vec![host("li").key("x").into()]));
    let old = tree.committed("x");
    let wip = tree.update(&View::List(vec![host("p").key("x").into()]));

    let children = tree.children(wip);
    assert_eq!(children.len(), 1);
    assert_eq!(tree.arena[children[0]].alternate, None);
    assert_eq!(tree.placed(wip), vec![true]);
    assert_eq!(tree.arena[wip].deletions.as_slice(), &[old]);
}

#[test]
fn duplicate_keys_mount_the_later_sibling() {
    let mut tree = Tree::mount(&list(&["a"]));
    let wip = tree.update(&list(&["a", "a"]));
    let children = tree.children(wip);
    assert_eq!(children.len(), 2);
    assert!(tree.arena[children[0]].alternate.is_some());
    assert!(tree.arena[children[1]].alternate.is_none());
    assert_eq!(tree.placed(wip), vec![false, true]);
}

#[test]
fn single_element_reuses_matching_key_and_deletes_siblings() {
    let mut tree = Tree::mount(&list(&["a", "b", "c"]));
    let a = tree.committed("a");
    let c = tree.committed("c");
    let wip = tree.update(&item("b"));

    let children = tree.children(wip);
    assert_eq!(children.len(), 1);
    assert_eq!(tree.arena[children[0]].alternate, Some(tree.committed("b")));
    assert_eq!(tree.arena[wip].deletions.as_slice(), &[a, c]);
}

#[test]
fn text_child_is_reused_with_new_props() {
    let mut tree = Tree::mount(&text("one"));
    let old = tree.children(tree.parent)[0];
    let wip = tree.update(&text("two"));

    let child = tree.children(wip)[0];
    assert_eq!(tree.arena[child].alternate, Some(old));
    match &tree.arena[child].pending_props {
        Props::Text(value) => assert_eq!(&**value, "two"),
        _ => panic!("expected text props"),
    }
    assert!(tree.arena[child].flags.is_empty());
}

#[test]
fn empty_children_delete_everything() {
    let mut tree = Tree::mount(&list(&["a", "b"]));
    let wip = tree.update(&View::Empty);
    assert!(tree.children(wip).is_empty());
    assert_eq!(tree.arena[wip].deletions.len(), 2);
}

#[test]
fn top_level_unkeyed_fragment_is_spliced() {
    let tree = Tree::mount(&fragment([item("a"), item("b")]).into());
    let children = tree.children(tree.parent);
    assert_eq!(children.len(), 2);
    assert_eq!(tree.arena[children[0]].tag, WorkTag::HostComponent);
}

#[test]
fn nested_list_becomes_fragment_fiber() {
    let tree = Tree::mount(&View::List(vec![list(&["a", "b"]), item("c")]));
    let children = tree.children(tree.parent);
    assert_eq!(children.len(), 2);
    assert_eq!(tree.arena[children[0]].tag, WorkTag::Fragment);
    assert_eq!(tree.arena[children[1]].tag, WorkTag::HostComponent);
}
