use super::*;
use crate::error::ComponentError;
use crate::hooks::Hooks;
use crate::render_harness::RenderHarness;
use crate::resource::Resource;
use crate::view::{component, host, suspense, text};
use crate::component::Render;
use std::cell::Cell;
use std::rc::Rc;

fn counted(_: &mut Hooks<'_>, calls: &Rc<Cell<usize>>) -> Render {
    calls.set(calls.get() + 1);
    Ok(text("x"))
}

fn reader(hooks: &mut Hooks<'_>, resource: &Resource<String>) -> Render {
    let value = hooks.use_resource(resource)?;
    Ok(text(value))
}

fn broken(_: &mut Hooks<'_>, _: &()) -> Render {
    Err(Throw::Error(ComponentError::new("boom")))
}

#[test]
fn mount_completes_and_commits_host_tree() {
    let mut harness = RenderHarness::new();
    harness.enqueue(
        host("div").child(text("a")).child(host("span").child(text("b"))),
        Lanes::SYNC,
    );

    let status = harness.render(Lanes::SYNC, false).expect("render");
    assert_eq!(status, RootExitStatus::Completed);
    assert!(harness.text().is_empty(), "nothing attached before commit");

    harness.commit().expect("commit");
    assert_eq!(harness.text(), "ab");
    assert_eq!(harness.host_children(harness.container).len(), 1);
}

#[test]
fn interrupted_pass_resumes_without_rerendering_finished_fibers() {
    let mut harness = RenderHarness::new();
    let calls: Vec<Rc<Cell<usize>>> = (0..4).map(|_| Rc::new(Cell::new(0))).collect();
    let children: Vec<View> = calls
        .iter()
        .enumerate()
        .map(|(index, calls)| component(counted, calls.clone()).with_key(&index).into())
        .collect();
    harness.enqueue(host("list").children(children), Lanes::DEFAULT);

    harness.scheduler.set_budget(Some(3));
    let status = harness.render(Lanes::DEFAULT, true).expect("render");
    assert_eq!(status, RootExitStatus::Incomplete);
    assert!(harness.work.wip.is_some());
    let rendered: usize = calls.iter().map(|c| c.get()).sum();
    assert!(rendered < 4);

    harness.scheduler.set_budget(None);
    let status = harness.render(Lanes::DEFAULT, true).expect("render");
    assert_eq!(status, RootExitStatus::Completed);
    for calls in &calls {
        assert_eq!(calls.get(), 1);
    }
}

#[test]
fn non_interruptible_pass_ignores_the_budget() {
    let mut harness = RenderHarness::new();
    harness.scheduler.set_budget(Some(0));
    harness.enqueue(host("div").child(text("a")), Lanes::SYNC);
    let status = harness.render(Lanes::SYNC, false).expect("render");
    assert_eq!(status, RootExitStatus::Completed);
}

#[test]
fn new_lanes_restart_from_the_root() {
    let mut harness = RenderHarness::new();
    harness.enqueue(host("a"), Lanes::DEFAULT);
    harness.scheduler.set_budget(Some(1));
    assert_eq!(
        harness.render(Lanes::DEFAULT, true).expect("render"),
        RootExitStatus::Incomplete
    );
    let abandoned = harness.work.wip_root;

    harness.scheduler.set_budget(None);
    harness.enqueue(host("b"), Lanes::SYNC);
    assert_eq!(
        harness.render(Lanes::SYNC, false).expect("render"),
        RootExitStatus::Completed
    );
    assert_eq!(harness.work.render_lanes, Lanes::SYNC);
    assert_eq!(harness.work.wip_root, abandoned, "root alternate is reused");
}

#[test]
fn suspension_inside_boundary_renders_fallback() {
    let mut harness = RenderHarness::new();
    let resource: Resource<String> = Resource::pending();
    harness.enqueue(
        suspense(text("loading"), component(reader, resource.clone())),
        Lanes::SYNC,
    );

    let status = harness.render(Lanes::SYNC, false).expect("render");
    assert_eq!(status, RootExitStatus::Completed);
    harness.commit().expect("commit");
    assert_eq!(harness.text(), "loading");

    let pings = harness.sink.pings.borrow();
    assert_eq!(pings.len(), 1);
    assert_eq!(pings[0].1, Lanes::SYNC);
    assert!(pings[0].2.is_some(), "ping retries the boundary");
}

#[test]
fn suspension_without_boundary_does_not_complete() {
    let mut harness = RenderHarness::new();
    let resource: Resource<String> = Resource::pending();
    harness.enqueue(component(reader, resource), Lanes::SYNC);

    let status = harness.render(Lanes::SYNC, false).expect("render");
    assert_eq!(status, RootExitStatus::DidNotComplete);
    assert!(harness.work.wip.is_none());
    assert_eq!(harness.sink.pings.borrow()[0].2, None);
}

#[test]
fn thrown_error_aborts_the_pass() {
    let mut harness = RenderHarness::new();
    harness.enqueue(host("div").child(component(broken, ())), Lanes::SYNC);
    let error = harness.render(Lanes::SYNC, false).expect_err("render must fail");
    assert_eq!(error, ReconcileError::Render(ComponentError::new("boom")));
}

#[test]
fn discarding_work_sweeps_orphans_on_the_next_pass() {
    let mut harness = RenderHarness::new();
    harness.enqueue(host("div").child(text("a")).child(text("b")), Lanes::DEFAULT);
    harness.scheduler.set_budget(Some(3));
    harness.render(Lanes::DEFAULT, true).expect("render");
    let live_mid_render = harness.work.arena.live();
    assert!(live_mid_render > 2);

    harness.work.discard_work_in_progress();
    harness.scheduler.set_budget(None);
    prepare_fresh_stack(&mut harness.work, Lanes::DEFAULT);
    assert_eq!(harness.work.arena.live(), 2, "only the root and its alternate remain");
}
