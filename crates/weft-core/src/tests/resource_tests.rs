use super::*;
use std::cell::Cell;

#[test]
fn pending_read_suspends_on_the_resource() {
    let resource: Resource<i32> = Resource::pending();
    let Err(Throw::Suspended(suspended)) = resource.read() else {
        panic!("pending resource must suspend");
    };
    assert!(!suspended.wakeable().is_settled());

    resource.resolve(7);
    assert!(suspended.wakeable().is_settled());
    assert_eq!(resource.read().ok(), Some(7));
}

#[test]
fn listeners_run_once_on_settle() {
    let resource: Resource<&'static str> = Resource::pending();
    let calls = Rc::new(Cell::new(0));
    let Err(Throw::Suspended(suspended)) = resource.read() else {
        panic!("expected suspension");
    };
    let counter = calls.clone();
    suspended
        .wakeable()
        .on_settle(Box::new(move || counter.set(counter.get() + 1)));

    resource.resolve("done");
    resource.resolve("again");
    assert_eq!(calls.get(), 1);
    assert_eq!(resource.read().ok(), Some("done"));
}

#[test]
fn listener_added_after_settle_runs_immediately() {
    let resource = Resource::ready(1u8);
    let ran = Rc::new(Cell::new(false));
    let flag = ran.clone();
    let wakeable: Rc<dyn Wakeable> = resource.inner.clone();
    wakeable.on_settle(Box::new(move || flag.set(true)));
    assert!(ran.get());
}

#[test]
fn rejected_resource_throws_error() {
    let resource: Resource<u32> = Resource::pending();
    resource.reject(ComponentError::new("offline"));
    match resource.read() {
        Err(Throw::Error(error)) => assert_eq!(error.message(), "offline"),
        _ => panic!("expected error"),
    }
    assert!(matches!(resource.state(), ResourceState::Failed(_)));
}

#[test]
fn wakeable_ids_are_unique_per_resource() {
    let a: Resource<()> = Resource::pending();
    let b: Resource<()> = Resource::pending();
    assert_ne!(a.inner.wakeable_id(), b.inner.wakeable_id());
    assert_eq!(a.clone().inner.wakeable_id(), a.inner.wakeable_id());
}
