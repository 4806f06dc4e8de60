// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Lifetime contexts: scoped ownership of trees built on the current thread.
//!
//! Contexts form a per-thread stack. Every tree built while a context is
//! innermost is owned by it and released when the context exits, unless it
//! was [`Context::remove`]d first. Exiting happens on `exit()` or when the
//! guard is dropped, so `?` propagation and unwinding release too.

use super::Tree;
use crate::error::{Error, Result};
use std::cell::{Cell, RefCell};
use std::marker::PhantomData;

struct Frame {
    id: u64,
    owned: Vec<Tree>,
    closed: bool,
}

thread_local! {
    static STACK: RefCell<Vec<Frame>> = const { RefCell::new(Vec::new()) };
    static NEXT_ID: Cell<u64> = const { Cell::new(1) };
}

/// Guard for one entered context. Not `Send`: a context belongs to the
/// thread that entered it.
#[must_use = "dropping the guard exits the context immediately"]
pub struct Context {
    id: u64,
    closed: bool,
    _thread_bound: PhantomData<*const ()>,
}

impl Context {
    /// Push a new context; it becomes the active one for this thread
    pub fn enter() -> Context {
        let id = NEXT_ID.with(|next| {
            let id = next.get();
            next.set(id + 1);
            id
        });
        STACK.with(|stack| {
            stack.borrow_mut().push(Frame {
                id,
                owned: Vec::new(),
                closed: false,
            })
        });
        tracing::trace!(context = id, depth = active_depth(), "entered context");
        Context {
            id,
            closed: false,
            _thread_bound: PhantomData,
        }
    }

    /// Release every tree still owned and pop the context.
    ///
    /// Exiting a context that is not innermost releases its trees but leaves
    /// the inner contexts active; the frame is discarded once they exit. This
    /// is reported as `ContextDiscipline` and trips an assertion in debug
    /// builds.
    pub fn exit(mut self) -> Result<()> {
        self.close()
    }

    /// Detach `tree` so it survives this context's exit. The caller becomes
    /// responsible for releasing it.
    pub fn remove(&self, tree: &Tree) -> Result<()> {
        let removed = self.with_frame(|frame| {
            let at = frame.owned.iter().position(|owned| owned.same_handle(tree))?;
            Some(frame.owned.remove(at))
        });
        match removed.flatten() {
            Some(_) => Ok(()),
            None => Err(Error::ContextDiscipline(format!(
                "context {} does not own tree {}",
                self.id,
                tree.handle()
            ))),
        }
    }

    /// True if `tree` is currently owned by this context
    pub fn owns(&self, tree: &Tree) -> bool {
        self.with_frame(|frame| frame.owned.iter().any(|owned| owned.same_handle(tree)))
            .unwrap_or(false)
    }

    pub fn owned_count(&self) -> usize {
        self.with_frame(|frame| frame.owned.len()).unwrap_or(0)
    }

    /// True if this is the innermost open context of the thread
    pub fn is_active(&self) -> bool {
        !self.closed
            && STACK.with(|stack| stack.borrow().last().map(|frame| frame.id) == Some(self.id))
    }

    fn with_frame<R>(&self, f: impl FnOnce(&mut Frame) -> R) -> Option<R> {
        if self.closed {
            return None;
        }
        STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            stack
                .iter_mut()
                .find(|frame| frame.id == self.id && !frame.closed)
                .map(f)
        })
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let (owned, innermost) = STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            let Some(at) = stack.iter().position(|frame| frame.id == self.id) else {
                return (Vec::new(), true);
            };
            let innermost = at + 1 == stack.len();
            let owned = std::mem::take(&mut stack[at].owned);
            stack[at].closed = true;
            while stack.last().is_some_and(|frame| frame.closed) {
                stack.pop();
            }
            (owned, innermost)
        });

        let released = owned.len();
        for tree in owned {
            tree.dispose();
        }
        tracing::trace!(context = self.id, released, "exited context");

        if innermost {
            return Ok(());
        }

        tracing::warn!(
            context = self.id,
            "context exited while an inner context is still active"
        );
        if cfg!(debug_assertions) && !std::thread::panicking() {
            panic!(
                "context {} exited out of order; inner contexts must exit first",
                self.id
            );
        }
        Err(Error::ContextDiscipline(format!(
            "context {} is not the innermost context",
            self.id
        )))
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        // errors were already logged by close()
        let _ = self.close();
    }
}

/// Number of open contexts on this thread
pub fn active_depth() -> usize {
    STACK.with(|stack| stack.borrow().iter().filter(|frame| !frame.closed).count())
}

/// Hand a freshly built tree to the innermost context, if any
pub(crate) fn register(tree: &Tree) {
    STACK.with(|stack| {
        if let Some(frame) = stack.borrow_mut().last_mut() {
            frame.owned.push(tree.clone());
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::ArenaKernel;

    #[test]
    fn test_exit_releases_owned_trees() {
        let kernel = ArenaKernel::shared();
        let ctx = Context::enter();
        let kept = Tree::x(&kernel) + 1.0;
        let temp = Tree::y(&kernel);
        ctx.remove(&kept).unwrap();
        assert!(ctx.owns(&temp));
        ctx.exit().unwrap();

        assert!(kept.is_valid());
        assert!(!temp.is_valid());
        assert_eq!(active_depth(), 0);
    }

    #[test]
    fn test_double_remove_is_discipline_error() {
        let kernel = ArenaKernel::shared();
        let ctx = Context::enter();
        let t = Tree::z(&kernel);
        ctx.remove(&t).unwrap();
        assert!(matches!(ctx.remove(&t), Err(Error::ContextDiscipline(_))));
        t.dispose();
    }

    #[test]
    fn test_nested_contexts_own_their_own_trees() {
        let kernel = ArenaKernel::shared();
        let outer = Context::enter();
        let a = Tree::x(&kernel);
        {
            let inner = Context::enter();
            assert!(inner.is_active());
            assert!(!outer.is_active());
            let b = Tree::y(&kernel);
            assert!(inner.owns(&b));
            assert!(!outer.owns(&b));
        }
        assert!(outer.is_active());
        assert!(outer.owns(&a));
        assert_eq!(outer.owned_count(), 1);
    }

    #[test]
    fn test_scope_exit_on_error_path() {
        let kernel = ArenaKernel::shared();
        let leaked = std::cell::RefCell::new(None);
        let build = || -> Result<()> {
            let _ctx = Context::enter();
            *leaked.borrow_mut() = Some(Tree::x(&kernel));
            Err(Error::InvalidArgument("bail".into()))
        };
        assert!(build().is_err());
        let tree = leaked.borrow_mut().take().unwrap();
        assert!(!tree.is_valid());
        assert_eq!(active_depth(), 0);
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "exited out of order")]
    fn test_out_of_order_exit_panics_in_debug() {
        let outer = Context::enter();
        let _inner = Context::enter();
        let _ = outer.exit();
    }

    #[cfg(not(debug_assertions))]
    #[test]
    fn test_out_of_order_exit_reports_discipline() {
        let kernel = ArenaKernel::shared();
        let outer = Context::enter();
        let a = Tree::x(&kernel);
        let inner = Context::enter();
        assert!(matches!(outer.exit(), Err(Error::ContextDiscipline(_))));
        assert!(!a.is_valid());
        assert!(inner.is_active());
        assert_eq!(active_depth(), 1);
        inner.exit().unwrap();
        assert_eq!(active_depth(), 0);
    }
}
