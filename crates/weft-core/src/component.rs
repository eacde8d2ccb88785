use std::any::{Any, TypeId};
use std::marker::PhantomData;

use crate::error::{ComponentError, Throw};
use crate::hooks::Hooks;
use crate::view::View;

/// Result of a component render.
pub type Render = Result<View, Throw>;

/// Type-erased render function. Two components are the same element type when
/// their render functions have the same Rust type.
pub trait AnyComponent {
    fn render(&self, hooks: &mut Hooks<'_>, props: &dyn Any) -> Render;
    fn component_type(&self) -> TypeId;
    fn name(&self) -> &'static str;
}

pub(crate) struct ComponentFn<P, F> {
    render: F,
    _props: PhantomData<fn(&P)>,
}

impl<P, F> ComponentFn<P, F> {
    pub(crate) fn new(render: F) -> Self {
        Self {
            render,
            _props: PhantomData,
        }
    }
}

impl<P, F> AnyComponent for ComponentFn<P, F>
where
    P: 'static,
    F: Fn(&mut Hooks<'_>, &P) -> Render + 'static,
{
    fn render(&self, hooks: &mut Hooks<'_>, props: &dyn Any) -> Render {
        match props.downcast_ref::<P>() {
            Some(props) => (self.render)(hooks, props),
            None => Err(Throw::Error(ComponentError::new(format!(
                "{} received props of an unexpected type",
                self.name()
            )))),
        }
    }

    fn component_type(&self) -> TypeId {
        TypeId::of::<F>()
    }

    fn name(&self) -> &'static str {
        std::any::type_name::<F>()
    }
}
