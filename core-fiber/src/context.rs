//! Per-thread execution context.
//!
//! Every fiber owns an OS thread, so "the current fiber" is a thread-local.
//! The loop thread carries a context without a fiber while `block_on` runs.

use crate::event_loop::LoopShared;
use crate::fiber::{Fiber, Resume};
use crate::sync::mpsc::UnboundedReceiver;
use std::cell::RefCell;
use std::sync::Arc;

thread_local! {
    static CONTEXT: RefCell<Option<Context>> = const { RefCell::new(None) };
}

pub(crate) struct Context {
    event_loop: Arc<LoopShared>,
    fiber: Option<Fiber>,
    resume: Option<UnboundedReceiver<Resume>>,
}

impl Context {
    pub(crate) fn root(event_loop: Arc<LoopShared>) -> Self {
        Self {
            event_loop,
            fiber: None,
            resume: None,
        }
    }

    pub(crate) fn fiber(
        event_loop: Arc<LoopShared>,
        fiber: Fiber,
        resume: Option<UnboundedReceiver<Resume>>,
    ) -> Self {
        Self {
            event_loop,
            fiber: Some(fiber),
            resume,
        }
    }
}

/// Restores the previous context when dropped.
pub(crate) struct ContextGuard {
    previous: Option<Context>,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        let current = CONTEXT.with(|slot| std::mem::replace(&mut *slot.borrow_mut(), previous));
        drop(current);
    }
}

pub(crate) fn enter(context: Context) -> ContextGuard {
    let previous = CONTEXT.with(|slot| slot.borrow_mut().replace(context));
    ContextGuard { previous }
}

pub(crate) fn event_loop() -> Option<Arc<LoopShared>> {
    CONTEXT.with(|slot| {
        slot.borrow()
            .as_ref()
            .map(|context| Arc::clone(&context.event_loop))
    })
}

pub(crate) fn fiber() -> Option<Fiber> {
    CONTEXT.with(|slot| slot.borrow().as_ref().and_then(|context| context.fiber.clone()))
}

/// Runs `f` with this fiber's resume receiver. Returns `None` outside a fiber.
pub(crate) fn with_resume<R>(f: impl FnOnce(&mut UnboundedReceiver<Resume>) -> R) -> Option<R> {
    CONTEXT.with(|slot| {
        slot.borrow_mut()
            .as_mut()
            .and_then(|context| context.resume.as_mut())
            .map(f)
    })
}
