//! Lifecycle hooks for model writes
//!
//! Hooks are an external collaborator: the write path calls them at fixed
//! points and every default implementation passes the payload through, so a
//! model with no hooks behaves exactly like one with the defaults.
//!
//! A `before_*` hook returning `Ok(false)` short-circuits the write: nothing
//! is persisted and the operation resolves to `None`.

use crate::executor::TideError;
use crate::term::Datum;

/// Which write operation is validating
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Create,
    Update,
}

/// Lifecycle hooks invoked around `create` and `update`
///
/// Call order for `create`: `validate` → `before_create` → `before_save` →
/// insert/cascade → `after_create`. For `update`: `validate` →
/// `before_update` → `before_save` → update/cascade → `after_update`.
///
/// `before_*` hooks receive the payload mutably and may normalize it in
/// place. `after_*` hooks receive the materialized, re-read result and may
/// replace it.
pub trait Hooks: Send + Sync {
    fn validate(&self, _payload: &Datum, _mode: WriteMode) -> Result<bool, TideError> {
        Ok(true)
    }

    fn before_create(&self, _payload: &mut Datum) -> Result<bool, TideError> {
        Ok(true)
    }

    fn before_update(&self, _payload: &mut Datum) -> Result<bool, TideError> {
        Ok(true)
    }

    fn before_save(&self, _payload: &mut Datum) -> Result<bool, TideError> {
        Ok(true)
    }

    fn after_create(&self, saved: Datum) -> Result<Datum, TideError> {
        Ok(saved)
    }

    fn after_update(&self, saved: Datum, _previous: Option<Datum>) -> Result<Datum, TideError> {
        Ok(saved)
    }
}

/// The no-op hook set used when a model declares none
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultHooks;

impl Hooks for DefaultHooks {}
