use super::*;
use crate::applier::HostOp;
use crate::component::Render;
use crate::hooks::{EffectResult, Hooks};
use crate::render_harness::RenderHarness;
use crate::view::{component, fragment, host, text, NodeRef, View};
use std::cell::RefCell;

type Log = Rc<RefCell<Vec<String>>>;

fn items(keys: &[&str]) -> View {
    host("ul")
        .children(keys.iter().map(|key| host("li").key(key).child(text(*key))))
        .into()
}

#[derive(Clone)]
struct Probe {
    name: &'static str,
    log: Log,
}

fn probe(hooks: &mut Hooks<'_>, props: &Probe) -> Render {
    let name = props.name;
    let log = props.log.clone();
    hooks.use_layout_effect(Some(()), move |scope| {
        log.borrow_mut().push(format!("layout {name}"));
        let log = log.clone();
        scope.on_cleanup(move || log.borrow_mut().push(format!("layout cleanup {name}")))
    });
    let log = props.log.clone();
    hooks.use_effect(Some(()), move |scope| {
        log.borrow_mut().push(format!("passive {name}"));
        let log = log.clone();
        scope.on_cleanup(move || log.borrow_mut().push(format!("passive cleanup {name}")))
    });
    Ok(text(name))
}

fn probe_element(name: &'static str, log: &Log) -> View {
    component(
        probe,
        Probe {
            name,
            log: log.clone(),
        },
    )
    .with_key(name)
    .into()
}

fn ul_text(harness: &RenderHarness) -> Vec<String> {
    let applier = harness.applier.borrow();
    let ul = applier.children(harness.container).expect("container")[0];
    applier
        .children(ul)
        .expect("ul")
        .iter()
        .map(|li| applier.text_content(*li))
        .collect()
}

#[test]
fn keyed_reorder_moves_nodes_without_recreating() {
    let mut harness = RenderHarness::new();
    harness.show(items(&["a", "b", "c"]));
    harness.applier.borrow_mut().clear_ops();

    harness.show(items(&["c", "a", "b"]));

    assert_eq!(ul_text(&harness), vec!["c", "a", "b"]);
    let ops = harness.applier.borrow_mut().take_ops();
    assert!(ops
        .iter()
        .all(|op| matches!(op, HostOp::AppendChild { .. } | HostOp::InsertBefore { .. })));
    assert_eq!(ops.len(), 2);
}

#[test]
fn moved_node_is_inserted_before_its_stable_sibling() {
    let mut harness = RenderHarness::new();
    harness.show(items(&["a", "b", "c"]));
    harness.show(items(&["b", "a", "c"]));
    assert_eq!(ul_text(&harness), vec!["b", "a", "c"]);

    let ops = harness.applier.borrow_mut().take_ops();
    assert!(matches!(ops.last(), Some(HostOp::InsertBefore { .. })));
}

#[test]
fn removal_and_insertion_touch_only_changed_children() {
    let mut harness = RenderHarness::new();
    harness.show(items(&["a", "b", "c"]));
    harness.applier.borrow_mut().clear_ops();

    harness.show(items(&["a", "c", "d"]));

    assert_eq!(ul_text(&harness), vec!["a", "c", "d"]);
    let ops = harness.applier.borrow_mut().take_ops();
    let removals = ops
        .iter()
        .filter(|op| matches!(op, HostOp::RemoveChild { .. }))
        .count();
    let created = ops.iter().filter(|op| !op.is_mutation()).count();
    assert_eq!(removals, 1);
    assert_eq!(created, 2, "one <li> and its text");
}

#[test]
fn text_and_prop_changes_update_in_place() {
    let mut harness = RenderHarness::new();
    harness.show(host("p").prop("class", "a").child(text("one")));
    harness.applier.borrow_mut().clear_ops();

    harness.show(host("p").prop("class", "b").child(text("two")));

    let ops = harness.applier.borrow_mut().take_ops();
    assert_eq!(ops.len(), 2);
    assert!(ops.iter().any(|op| matches!(op, HostOp::CommitUpdate { .. })));
    assert!(ops
        .iter()
        .any(|op| matches!(op, HostOp::CommitTextUpdate { text, .. } if text == "two")));
    assert_eq!(harness.text(), "two");
}

#[test]
fn unchanged_props_issue_no_mutations() {
    let mut harness = RenderHarness::new();
    harness.show(host("p").prop("class", "a").child(text("same")));
    harness.applier.borrow_mut().clear_ops();

    let outcome = harness.show(host("p").prop("class", "a").child(text("same")));
    assert_eq!(outcome.mutations, 0);
    assert!(harness.applier.borrow().ops().is_empty());
}

#[test]
fn effects_run_in_commit_order_and_clean_up_on_delete() {
    let log: Log = Rc::default();
    let mut harness = RenderHarness::new();
    harness.show(fragment([probe_element("a", &log), probe_element("b", &log)]));
    assert_eq!(
        *log.borrow(),
        vec!["layout a", "layout b", "passive a", "passive b"]
    );
    log.borrow_mut().clear();

    let outcome = harness.show(fragment([probe_element("b", &log)]));
    assert_eq!(outcome.passive.unmount.len(), 1);
    assert_eq!(
        *log.borrow(),
        vec!["layout cleanup a", "passive cleanup a"]
    );
    assert_eq!(harness.text(), "b");
}

#[test]
fn commit_makes_finished_tree_current() {
    let mut harness = RenderHarness::new();
    let before = harness.work.current;
    harness.enqueue(text("x"), Lanes::SYNC);
    harness.render(Lanes::SYNC, false).expect("render");
    let finished = harness.work.wip_root;

    let outcome = harness.commit().expect("commit");

    assert_eq!(Some(harness.work.current), finished);
    assert_ne!(harness.work.current, before);
    assert!(harness.work.wip_root.is_none());
    assert!(outcome.remaining_lanes.is_empty());
}

#[test]
fn committing_without_finished_work_is_rejected() {
    let mut harness = RenderHarness::new();
    let error = harness.commit().err().expect("nothing to commit");
    assert_eq!(
        error,
        ReconcileError::Consistency(ConsistencyError::CommitWithoutLane)
    );
}

#[test]
fn refs_attach_on_mount_and_detach_on_delete() {
    let node_ref = NodeRef::new();
    let mut harness = RenderHarness::new();
    harness.show(host("div").child(host("input").node_ref(&node_ref)));
    let attached = node_ref.get().expect("ref attached in layout phase");
    assert!(harness.applier.borrow().contains(attached));

    harness.show(host("div"));
    assert_eq!(node_ref.get(), None);
}

#[test]
fn deleting_a_subtree_removes_only_its_top_node() {
    let mut harness = RenderHarness::new();
    harness.show(host("div").child(host("section").child(host("p").child(text("deep")))));
    harness.applier.borrow_mut().clear_ops();

    harness.show(host("div"));

    let ops = harness.applier.borrow_mut().take_ops();
    assert_eq!(ops.len(), 1);
    assert!(matches!(ops[0], HostOp::RemoveChild { .. }));
    assert_eq!(harness.applier.borrow().len(), 2, "container and div remain");
}
