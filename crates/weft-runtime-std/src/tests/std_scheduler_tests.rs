use super::*;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

type Log = Rc<RefCell<Vec<String>>>;

fn logging(log: &Log, label: &str) -> SchedulerCallback {
    let log = log.clone();
    let label = label.to_string();
    Box::new(move |_: bool| {
        log.borrow_mut().push(label.clone());
        TaskStatus::Done
    })
}

#[test]
fn tasks_run_in_expiration_order() {
    let scheduler = StdScheduler::deterministic(10);
    let log: Log = Rc::default();
    scheduler.schedule_callback(Priority::Low, logging(&log, "low"));
    scheduler.schedule_callback(Priority::Normal, logging(&log, "normal-1"));
    scheduler.schedule_callback(Priority::Immediate, logging(&log, "immediate"));
    scheduler.schedule_callback(Priority::Normal, logging(&log, "normal-2"));
    scheduler.schedule_callback(Priority::UserBlocking, logging(&log, "blocking"));

    scheduler.run_until_idle();

    assert_eq!(
        *log.borrow(),
        vec!["immediate", "blocking", "normal-1", "normal-2", "low"]
    );
    assert_eq!(scheduler.pending_tasks(), 0);
}

#[test]
fn earlier_normal_task_beats_later_user_blocking_once_time_passes() {
    let scheduler = StdScheduler::deterministic(10);
    let log: Log = Rc::default();
    scheduler.schedule_callback(Priority::Normal, logging(&log, "normal"));
    scheduler.advance_time(Duration::from_millis(4900));
    scheduler.schedule_callback(Priority::UserBlocking, logging(&log, "blocking"));

    scheduler.run_until_idle();

    assert_eq!(*log.borrow(), vec!["normal", "blocking"]);
}

#[test]
fn cancelled_task_never_runs() {
    let scheduler = StdScheduler::deterministic(10);
    let log: Log = Rc::default();
    let handle = scheduler.schedule_callback(Priority::Normal, logging(&log, "cancelled"));
    scheduler.schedule_callback(Priority::Normal, logging(&log, "kept"));
    scheduler.cancel_callback(handle);
    scheduler.cancel_callback(handle);

    assert_eq!(scheduler.pending_tasks(), 1);
    scheduler.run_until_idle();
    assert_eq!(*log.borrow(), vec!["kept"]);
}

#[test]
fn continuation_keeps_handle_and_position() {
    let scheduler = StdScheduler::deterministic(10);
    let log: Log = Rc::default();
    let runs = Rc::new(Cell::new(0));
    let counter = runs.clone();
    let first = scheduler.schedule_callback(
        Priority::Normal,
        Box::new(move |_: bool| {
            counter.set(counter.get() + 1);
            if counter.get() < 3 {
                TaskStatus::Continue
            } else {
                TaskStatus::Done
            }
        }),
    );
    scheduler.schedule_callback(Priority::Normal, logging(&log, "second"));

    assert!(scheduler.run_next_task());
    assert!(scheduler.run_next_task());
    assert_eq!(runs.get(), 2);
    assert!(log.borrow().is_empty());

    scheduler.cancel_callback(first);
    scheduler.run_until_idle();
    assert_eq!(runs.get(), 2);
    assert_eq!(*log.borrow(), vec!["second"]);
}

#[test]
fn task_cancelling_itself_is_not_continued() {
    let scheduler = Rc::new(StdScheduler::deterministic(10));
    let runs = Rc::new(Cell::new(0));
    let handle = Rc::new(Cell::new(None));
    let task = {
        let scheduler = Rc::downgrade(&scheduler);
        let runs = runs.clone();
        let handle = handle.clone();
        Box::new(move |_: bool| {
            runs.set(runs.get() + 1);
            if let (Some(scheduler), Some(handle)) = (scheduler.upgrade(), handle.get()) {
                scheduler.cancel_callback(handle);
            }
            TaskStatus::Continue
        })
    };
    handle.set(Some(scheduler.schedule_callback(Priority::Normal, task)));

    scheduler.run_until_idle();

    assert_eq!(runs.get(), 1);
    assert_eq!(scheduler.pending_tasks(), 0);
}

#[test]
fn unit_budget_counts_checks_per_task() {
    let scheduler = Rc::new(StdScheduler::deterministic(2));
    let observed = Rc::new(RefCell::new(Vec::new()));
    let task = {
        let scheduler = Rc::downgrade(&scheduler);
        let observed = observed.clone();
        Box::new(move |_: bool| {
            if let Some(scheduler) = scheduler.upgrade() {
                let checks: Vec<bool> = (0..3).map(|_| scheduler.should_yield()).collect();
                observed.borrow_mut().push(checks);
            }
            if observed.borrow().len() < 2 {
                TaskStatus::Continue
            } else {
                TaskStatus::Done
            }
        })
    };
    scheduler.schedule_callback(Priority::Normal, task);

    scheduler.run_until_idle();

    assert_eq!(
        *observed.borrow(),
        vec![vec![false, false, true], vec![false, false, true]]
    );
}

#[test]
fn time_budget_follows_the_manual_clock() {
    let scheduler = StdScheduler::build(
        SchedulerClock::Manual(Cell::new(Duration::ZERO)),
        FrameBudget::Time(Duration::from_millis(5)),
    );
    assert!(!scheduler.should_yield());
    scheduler.advance_time(Duration::from_millis(5));
    assert!(scheduler.should_yield());
}

#[test]
fn expired_task_reports_timeout() {
    let scheduler = StdScheduler::deterministic(10);
    let seen = Rc::new(RefCell::new(Vec::new()));
    for priority in [Priority::Immediate, Priority::Normal] {
        let seen = seen.clone();
        scheduler.schedule_callback(
            priority,
            Box::new(move |did_timeout| {
                seen.borrow_mut().push((priority, did_timeout));
                TaskStatus::Done
            }),
        );
    }

    scheduler.run_until_idle();

    assert_eq!(
        *seen.borrow(),
        vec![(Priority::Immediate, true), (Priority::Normal, false)]
    );
}

#[test]
fn running_task_sees_its_priority() {
    let scheduler = Rc::new(StdScheduler::deterministic(10));
    let seen = Rc::new(Cell::new(None));
    let task = {
        let scheduler = Rc::downgrade(&scheduler);
        let seen = seen.clone();
        Box::new(move |_: bool| {
            seen.set(scheduler.upgrade().map(|s| s.current_priority()));
            TaskStatus::Done
        })
    };
    scheduler.schedule_callback(Priority::UserBlocking, task);
    scheduler.run_until_idle();

    assert_eq!(seen.get(), Some(Priority::UserBlocking));
    assert_eq!(scheduler.current_priority(), Priority::Normal);

    let mut inner = None;
    scheduler.run_with_priority(Priority::Idle, &mut || {
        inner = Some(scheduler.current_priority());
    });
    assert_eq!(inner, Some(Priority::Idle));
    assert_eq!(scheduler.current_priority(), Priority::Normal);
}

#[test]
fn microtasks_drain_around_tasks() {
    let scheduler = Rc::new(StdScheduler::deterministic(10));
    let log: Log = Rc::default();
    {
        let log = log.clone();
        scheduler.schedule_microtask(Box::new(move || log.borrow_mut().push("before".into())));
    }
    let task = {
        let scheduler = Rc::downgrade(&scheduler);
        let log = log.clone();
        Box::new(move |_: bool| {
            log.borrow_mut().push("task".into());
            if let Some(scheduler) = scheduler.upgrade() {
                let log = log.clone();
                scheduler
                    .schedule_microtask(Box::new(move || log.borrow_mut().push("after".into())));
            }
            TaskStatus::Done
        })
    };
    scheduler.schedule_callback(Priority::Normal, task);

    assert!(scheduler.run_next_task());
    assert_eq!(*log.borrow(), vec!["before", "task", "after"]);
    assert!(!scheduler.has_pending_work());
    assert!(!scheduler.run_next_task());
}

#[test]
fn frame_waker_fires_once_per_request() {
    let scheduler = StdScheduler::deterministic(10);
    let wakes = Rc::new(Cell::new(0));
    let counter = wakes.clone();
    scheduler.set_frame_waker(move || counter.set(counter.get() + 1));

    scheduler.schedule_callback(Priority::Normal, Box::new(|_| TaskStatus::Done));
    scheduler.schedule_microtask(Box::new(|| {}));
    assert_eq!(wakes.get(), 1);
    assert!(scheduler.take_frame_request());
    assert!(!scheduler.take_frame_request());

    scheduler.run_until_idle();
    scheduler.schedule_callback(Priority::Low, Box::new(|_| TaskStatus::Done));
    assert_eq!(wakes.get(), 2);
}
