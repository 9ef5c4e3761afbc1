//! Diagnostic reporting shared across the transform pipeline and the replay emitter (§11
//! supplement). §6 names `IssuesRequest{out: channel<Issue>}` but the distilled spec never says
//! what an `Issue` carries; this module is the concrete producer both `replay-pipeline`'s
//! transformers and `replay-emitter` append to, grounded in the same "collect diagnostics
//! alongside the main result" shape as the teacher's `render-extra` validation layer. Lives in
//! `core` rather than `pipeline` or `emitter` specifically so both can share one sink without a
//! dependency cycle.

use crate::command::CommandId;
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

#[derive(Clone, Debug)]
pub struct Issue {
    pub command_id: CommandId,
    pub severity: Severity,
    pub message: String,
}

impl Issue {
    pub fn new(command_id: CommandId, severity: Severity, message: impl Into<String>) -> Issue {
        Issue { command_id, severity, message: message.into() }
    }
}

/// A shared sink transformers and the emitter append to; cloned (cheaply, via `Rc`) into every
/// stage that wants to report something. Single-producer/single-consumer in spirit even though
/// `Vec` is the concrete backing store, matching §5's "per-request result channels are
/// single-producer / single-consumer" for the request types this ultimately feeds.
pub type IssueSink = Rc<RefCell<Vec<Issue>>>;

pub fn new_issue_sink() -> IssueSink {
    Rc::new(RefCell::new(Vec::new()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issues_pushed_from_different_owners_land_in_the_same_sink() {
        let sink = new_issue_sink();
        sink.borrow_mut().push(Issue::new(CommandId::root(1), Severity::Warning, "a"));
        let sink2 = sink.clone();
        sink2.borrow_mut().push(Issue::new(CommandId::root(2), Severity::Error, "b"));
        assert_eq!(sink.borrow().len(), 2);
    }
}
