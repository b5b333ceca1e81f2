//! LIFO stack of open contexts owned by one thread

use log::warn;

use crate::domain::{ApplicationId, Context, ContextId, Payload};

/// Open contexts of one thread, innermost last.
///
/// An adopted context (handed over from another thread) sits below the
/// stack as a read-only root: it parents the first push but is never popped
/// or written to from here.
#[derive(Debug)]
pub struct ContextStack {
    frames: Vec<Context>,
    adopted: Option<Context>,
    application_id: ApplicationId,
}

impl ContextStack {
    #[must_use]
    pub fn new(application_id: ApplicationId) -> Self {
        Self { frames: Vec::new(), adopted: None, application_id }
    }

    /// Open a child of the current context (or a root) and make it current.
    pub fn push(&mut self, name: impl Into<String>, tag: impl Into<String>) -> &mut Context {
        let parent_id = self.current().map(Context::id);
        let ctx = Context::open(name, tag, parent_id, self.application_id.clone());
        self.frames.push(ctx);
        let top = self.frames.len() - 1;
        &mut self.frames[top]
    }

    /// Close and remove the current context. `None` when nothing is open.
    pub fn pop(&mut self) -> Option<Context> {
        let mut ctx = self.frames.pop()?;
        ctx.close();
        Some(ctx)
    }

    /// Innermost open context, falling back to the adopted root
    #[must_use]
    pub fn current(&self) -> Option<&Context> {
        self.frames.last().or(self.adopted.as_ref())
    }

    /// Innermost context owned by this stack
    pub fn current_mut(&mut self) -> Option<&mut Context> {
        self.frames.last_mut()
    }

    #[must_use]
    pub fn current_id(&self) -> Option<ContextId> {
        self.current().map(Context::id)
    }

    /// Contexts opened on this stack (the adopted root is not counted)
    #[must_use]
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Install `root` as the parent of the next root-level push. Returns the
    /// root it replaces.
    pub fn adopt(&mut self, root: Option<Context>) -> Option<Context> {
        if !self.frames.is_empty() {
            warn!(
                "Adopting a context with {} context(s) still open; it only parents new root contexts",
                self.frames.len()
            );
        }
        std::mem::replace(&mut self.adopted, root)
    }

    /// Payload of every context on the stack merged into one map.
    ///
    /// Outermost first, so an inner context overrides a key set further out.
    #[must_use]
    pub fn flattened(&self) -> Payload {
        let mut merged = Payload::new();
        for ctx in self.adopted.iter().chain(self.frames.iter()) {
            merged.extend(ctx.payload().iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        merged
    }
}
