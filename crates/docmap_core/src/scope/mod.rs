//! Connection scopes.
//!
//! # Responsibility
//! - Bind a connection and a fresh identity map for a unit of work.
//! - Tell model operations which connection and cache are active.
//!
//! # Invariants
//! - The active frame is the top of the stack.
//! - A frame is released exactly once: its connection is closed, then the
//!   frame is popped, on every exit path including unwinding.
//! - A nested frame never sees or alters the enclosing frame's cache.
//!
//! A `ScopeStack` is owned by one flow of control and passed by `&mut` to
//! every operation. Handles are `Rc`-based, so neither the stack nor the
//! instances it caches can cross threads.

use crate::db::Connection;
use crate::model::error::{ModelError, ModelResult};
use log::{debug, warn};
use std::ops::{Deref, DerefMut};

mod identity_map;

pub use identity_map::{Handle, IdentityMap};

struct Frame {
    connection: Box<dyn Connection>,
    identity_map: IdentityMap,
}

/// Stack of active (connection, identity map) frames.
#[derive(Default)]
pub struct ScopeStack {
    frames: Vec<Frame>,
}

impl ScopeStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes a frame for `connection` with an empty identity map.
    ///
    /// The frame lives until the returned guard is dropped or exited.
    pub fn enter(&mut self, connection: impl Connection + 'static) -> ScopeGuard<'_> {
        self.enter_boxed(Box::new(connection))
    }

    pub fn enter_boxed(&mut self, connection: Box<dyn Connection>) -> ScopeGuard<'_> {
        self.frames.push(Frame {
            connection,
            identity_map: IdentityMap::new(),
        });
        debug!(
            "event=scope_enter module=scope status=ok depth={}",
            self.frames.len()
        );
        ScopeGuard {
            stack: self,
            released: false,
        }
    }

    /// Runs `body` inside a frame for `connection`.
    ///
    /// The frame is released whatever `body` returns. An error from `body`
    /// takes precedence over an error closing the connection.
    pub fn with_connection<R>(
        &mut self,
        connection: impl Connection + 'static,
        body: impl FnOnce(&mut ScopeStack) -> ModelResult<R>,
    ) -> ModelResult<R> {
        let mut guard = self.enter(connection);
        let outcome = body(&mut guard);
        let released = guard.exit();
        let value = outcome?;
        released?;
        Ok(value)
    }

    /// Number of active frames.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_active(&self) -> bool {
        !self.frames.is_empty()
    }

    /// Connection of the active frame.
    pub fn connection(&self) -> ModelResult<&dyn Connection> {
        let frame = self.top()?;
        if !frame.connection.is_open() {
            return Err(ModelError::NoConnection);
        }
        Ok(frame.connection.as_ref())
    }

    pub fn connection_mut(&mut self) -> ModelResult<&mut dyn Connection> {
        let frame = self.top_mut()?;
        if !frame.connection.is_open() {
            return Err(ModelError::NoConnection);
        }
        Ok(frame.connection.as_mut())
    }

    /// Identity map of the active frame.
    pub fn identity_map(&self) -> ModelResult<&IdentityMap> {
        self.top().map(|frame| &frame.identity_map)
    }

    pub fn identity_map_mut(&mut self) -> ModelResult<&mut IdentityMap> {
        self.top_mut().map(|frame| &mut frame.identity_map)
    }

    fn top(&self) -> ModelResult<&Frame> {
        self.frames.last().ok_or(ModelError::NoActiveScope)
    }

    fn top_mut(&mut self) -> ModelResult<&mut Frame> {
        self.frames.last_mut().ok_or(ModelError::NoActiveScope)
    }

    /// Closes the active frame's connection, then pops the frame.
    fn release_top(&mut self) -> ModelResult<()> {
        let closed = match self.frames.last_mut() {
            Some(frame) if frame.connection.is_open() => frame.connection.close(),
            Some(_) => Ok(()),
            None => return Err(ModelError::NoActiveScope),
        };
        self.frames.pop();
        debug!(
            "event=scope_exit module=scope status={} depth={}",
            if closed.is_ok() { "ok" } else { "error" },
            self.frames.len()
        );
        closed.map_err(ModelError::from)
    }
}

/// Keeps one scope frame active; releases it on exit or drop.
///
/// Derefs to the `ScopeStack`, so nested scopes and model operations go
/// through the guard.
pub struct ScopeGuard<'s> {
    stack: &'s mut ScopeStack,
    released: bool,
}

impl ScopeGuard<'_> {
    /// Releases the frame now and reports a connection close failure.
    pub fn exit(mut self) -> ModelResult<()> {
        self.released = true;
        self.stack.release_top()
    }
}

impl Deref for ScopeGuard<'_> {
    type Target = ScopeStack;

    fn deref(&self) -> &ScopeStack {
        self.stack
    }
}

impl DerefMut for ScopeGuard<'_> {
    fn deref_mut(&mut self) -> &mut ScopeStack {
        self.stack
    }
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(err) = self.stack.release_top() {
            warn!("event=scope_exit module=scope status=error error={err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ScopeStack;
    use crate::db::{DbCall, MemoryDatabase};
    use crate::model::error::ModelError;

    #[test]
    fn empty_stack_reports_no_active_scope() {
        let mut scope = ScopeStack::new();
        assert!(matches!(scope.connection(), Err(ModelError::NoActiveScope)));
        assert!(matches!(
            scope.identity_map_mut(),
            Err(ModelError::NoActiveScope)
        ));
    }

    #[test]
    fn guard_drop_closes_connection_and_pops_frame() {
        let db = MemoryDatabase::new();
        let mut scope = ScopeStack::new();
        {
            let guard = scope.enter(db.connect());
            assert_eq!(guard.depth(), 1);
        }
        assert_eq!(scope.depth(), 0);
        assert_eq!(db.calls(), vec![DbCall::Close]);
    }

    #[test]
    fn nested_guards_unwind_in_order() {
        let db = MemoryDatabase::new();
        let mut scope = ScopeStack::new();
        let mut outer = scope.enter(db.connect());
        {
            let inner = outer.enter(db.connect());
            assert_eq!(inner.depth(), 2);
            inner.exit().unwrap();
        }
        assert_eq!(outer.depth(), 1);
        outer.exit().unwrap();
        assert_eq!(scope.depth(), 0);
        assert_eq!(db.calls(), vec![DbCall::Close, DbCall::Close]);
    }

    #[test]
    fn closed_connection_reports_no_connection() {
        let db = MemoryDatabase::new();
        let mut scope = ScopeStack::new();
        let mut guard = scope.enter(db.connect());
        guard.connection_mut().unwrap().close().unwrap();

        assert!(matches!(guard.connection(), Err(ModelError::NoConnection)));
        guard.exit().unwrap();
        assert_eq!(db.calls(), vec![DbCall::Close]);
    }
}
