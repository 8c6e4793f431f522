//! Local command dispatch
//!
//! The owning system registers one handler per 7-bit command code before
//! routing starts; the router only looks them up.

use crate::constants::COMMAND_CODES;
use crate::error::{LinkError, LinkResult};
use crate::link::Payload;
use std::fmt;
use std::sync::Arc;

/// Business logic for one command code
pub trait CommandHandler: Send + Sync {
    fn handle(&self, payload: &Payload);
}

impl<F> CommandHandler for F
where
    F: Fn(&Payload) + Send + Sync,
{
    fn handle(&self, payload: &Payload) {
        self(payload)
    }
}

/// Command code -> handler mapping
pub struct CommandTable {
    handlers: Vec<Option<Arc<dyn CommandHandler>>>,
}

impl CommandTable {
    pub fn new() -> Self {
        Self {
            handlers: vec![None; COMMAND_CODES],
        }
    }

    /// Register (or replace) the handler for `code`
    ///
    /// # Errors
    ///
    /// `InvalidCommandCode` for codes above 127.
    pub fn register(&mut self, code: u8, handler: impl CommandHandler + 'static) -> LinkResult<()> {
        self.register_shared(code, Arc::new(handler))
    }

    /// Register a handler shared with other codes or owners
    pub fn register_shared(
        &mut self,
        code: u8,
        handler: Arc<dyn CommandHandler>,
    ) -> LinkResult<()> {
        let slot = self
            .handlers
            .get_mut(code as usize)
            .ok_or(LinkError::InvalidCommandCode { code })?;
        *slot = Some(handler);
        Ok(())
    }

    pub fn handler_for(&self, code: u8) -> Option<&Arc<dyn CommandHandler>> {
        self.handlers.get(code as usize)?.as_ref()
    }

    /// Number of codes with a handler
    pub fn len(&self) -> usize {
        self.handlers.iter().filter(|h| h.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for CommandTable {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CommandTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let codes: Vec<usize> = self
            .handlers
            .iter()
            .enumerate()
            .filter_map(|(code, h)| h.as_ref().map(|_| code))
            .collect();
        f.debug_struct("CommandTable")
            .field("registered", &codes)
            .finish()
    }
}
