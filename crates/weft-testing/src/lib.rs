//! Testing utilities and harness for weft

pub mod testing;

pub use testing::*;

pub mod prelude {
    pub use crate::testing::*;
    pub use weft_core::{
        component, create_context, flush_sync, fragment, host, memo, memo_with, start_transition,
        suspense, text, EffectResult, Hooks, HostOp, Lanes, Render, Resource, View,
    };
}
