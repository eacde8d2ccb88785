#![doc = r"Incremental tree reconciliation with priority lanes and interruptible rendering."]
#![allow(clippy::missing_const_for_thread_local)]

pub extern crate self as weft_core;

pub mod applier;
mod begin_work;
mod child_fibers;
pub mod collections;
mod commit_work;
mod complete_work;
mod component;
mod context;
pub mod error;
mod fiber;
mod flags;
pub mod hash;
mod hook_ref;
mod hooks;
pub mod lane_context;
pub mod lanes;
pub mod platform;
mod resource;
mod root;
mod unwind_work;
mod update_queue;
pub mod view;
mod work_loop;

pub use applier::{Applier, HostOp, HostProps, MemoryApplier, NodeId, PropValue};
pub use component::{AnyComponent, Render};
pub use context::{create_context, Context, ContextId};
pub use error::{ComponentError, ConsistencyError, NodeError, ReconcileError, Throw};
pub use hash::{hash_key, Key};
pub use hook_ref::HookRef;
pub use hooks::{
    Dispatch, EffectResult, EffectScope, Hooks, SetState, StartTransition, StateAction,
};
pub use lane_context::{enter_lane, flush_sync, is_in_transition, start_transition};
pub use lanes::{Lanes, BLOCKING_LANES};
pub use platform::{CallbackHandle, Priority, Scheduler, SchedulerCallback, TaskStatus};
pub use resource::{Resource, ResourceState, Suspended, Wakeable};
pub use root::{Root, RootHandle, RootMode, RootOptions};
pub use view::{
    component, fragment, host, memo, memo_with, suspense, text, Element, HostBuilder, NodeRef,
    View,
};

#[cfg(test)]
pub(crate) use platform::TestScheduler;

#[cfg(test)]
#[path = "tests/render_harness.rs"]
pub(crate) mod render_harness;
