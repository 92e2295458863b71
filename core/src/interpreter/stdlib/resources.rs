//! Context resources for `with` blocks

use super::Args;
use crate::interpreter::errors::{Error, Result};
use crate::interpreter::host::ContextResource;
use crate::interpreter::report::{Event, Reporter, Status};
use crate::interpreter::types::Val;
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Suppresses errors whose kind (or any wrapped kind) is listed; with no
/// kinds it suppresses everything
#[derive(Debug)]
pub struct SuppressResource {
    kinds: Vec<String>,
}

impl SuppressResource {
    pub fn new(kinds: Vec<String>) -> Self {
        SuppressResource { kinds }
    }
}

impl ContextResource for SuppressResource {
    fn name(&self) -> &str {
        "suppress"
    }

    fn enter(&self, _reporter: &Reporter) -> Result<Val> {
        Ok(Val::Null)
    }

    fn exit(&self, reporter: &Reporter, error: Option<&Error>) -> Result<bool> {
        let Some(error) = error else {
            return Ok(false);
        };
        let suppressed = self.kinds.is_empty() || self.kinds.iter().any(|k| error.matches_kind(k));
        if suppressed {
            reporter.emit(
                Event::new("suppressed")
                    .error(error)
                    .field("kinds", self.kinds.clone()),
            );
        }
        Ok(suppressed)
    }
}

/// Brackets its block with `span_start`/`span_end` events
#[derive(Debug)]
pub struct SpanResource {
    label: String,
    started: Mutex<Option<Instant>>,
}

impl SpanResource {
    pub fn new(label: impl Into<String>) -> Self {
        SpanResource {
            label: label.into(),
            started: Mutex::new(None),
        }
    }
}

impl ContextResource for SpanResource {
    fn name(&self) -> &str {
        &self.label
    }

    fn enter(&self, reporter: &Reporter) -> Result<Val> {
        *self.started.lock().unwrap_or_else(|p| p.into_inner()) = Some(Instant::now());
        reporter.emit(Event::new("span_start").field("label", self.label.clone()));
        Ok(Val::Null)
    }

    fn exit(&self, reporter: &Reporter, error: Option<&Error>) -> Result<bool> {
        let started = self.started.lock().unwrap_or_else(|p| p.into_inner()).take();
        let mut event = Event::new("span_end")
            .field("label", self.label.clone())
            .status(if error.is_some() { Status::Error } else { Status::Ok });
        if let Some(started) = started {
            event = event.duration(started.elapsed());
        }
        if let Some(error) = error {
            event = event.error(error);
        }
        reporter.emit(event);
        Ok(false)
    }
}

/// `vbl.suppress(*kinds)`
pub fn suppress(mut args: Args) -> Result<Val> {
    let kinds = args
        .rest()
        .into_iter()
        .map(|k| args.string(k))
        .collect::<Result<Vec<_>>>()?;
    args.finish()?;
    Ok(Val::Resource(Arc::new(SuppressResource::new(kinds))))
}

/// `vbl.span(label)`
pub fn span(mut args: Args) -> Result<Val> {
    args.arity(1, 1)?;
    let label = args.next().to_string();
    args.finish()?;
    Ok(Val::Resource(Arc::new(SpanResource::new(label))))
}
