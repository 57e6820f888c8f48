/*!
 * Output
 * Ordered client registry and the dispatch loop with buggy-client quarantine
 *
 * Dispatch calls every client in registration order and checks each result
 * individually: a failing client never interrupts the pass and never reaches
 * the emitting caller. Failures are collected into a deferred-removal list
 * that the monitor applies once the pass completes.
 */

mod client;

pub use client::{BoundClient, ChangeSignal, Client, GroupView, MonitorHandle};

use crate::core::errors::ClientError;
use crate::core::types::SourceLocation;
use crate::data::LogData;
use crate::group::Conclusion;
use crate::tag::TagSet;
use std::sync::Arc;

/// One quarantine candidate collected during a dispatch pass
pub(crate) type DispatchFailure = (Arc<dyn Client>, ClientError);

/// Ordered, duplicate-free client registry
pub(crate) struct Output {
    entries: Vec<Arc<dyn Client>>,
}

impl Output {
    pub(crate) fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn contains(&self, client: &Arc<dyn Client>) -> bool {
        self.entries.iter().any(|entry| Arc::ptr_eq(entry, client))
    }

    /// First registered client matching `tester`
    pub(crate) fn find(&self, tester: &dyn Fn(&Arc<dyn Client>) -> bool) -> Option<Arc<dyn Client>> {
        self.entries.iter().find(|entry| tester(entry)).cloned()
    }

    pub(crate) fn clients(&self) -> &[Arc<dyn Client>] {
        &self.entries
    }

    /// Add a client; bound clients are wired up before they become visible
    ///
    /// Returns `false` when the client was already registered. A failing
    /// `set_owner` aborts the registration with no half-registered state.
    pub(crate) fn register(
        &mut self,
        client: Arc<dyn Client>,
        handle: &MonitorHandle,
    ) -> Result<bool, ClientError> {
        if self.contains(&client) {
            return Ok(false);
        }
        if let Some(bound) = client.bound() {
            bound.set_owner(Some(handle.clone()), false)?;
        }
        self.entries.push(client);
        Ok(true)
    }

    /// Remove a client from the registry (no owner call)
    pub(crate) fn remove(&mut self, client: &Arc<dyn Client>) -> bool {
        match self.entries.iter().position(|entry| Arc::ptr_eq(entry, client)) {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }

    /// Orderly unregistration: remove, then release the bound owner
    ///
    /// Returns `None` when the client was not registered, otherwise the
    /// outcome of its `set_owner(None)` call.
    pub(crate) fn unregister(
        &mut self,
        client: &Arc<dyn Client>,
    ) -> Option<Result<(), ClientError>> {
        if !self.remove(client) {
            return None;
        }
        Some(match client.bound() {
            Some(bound) => bound.set_owner(None, false),
            None => Ok(()),
        })
    }

    fn dispatch_each(
        &self,
        mut callback: impl FnMut(&Arc<dyn Client>) -> Result<(), ClientError>,
    ) -> Vec<DispatchFailure> {
        let mut failures = Vec::new();
        for entry in &self.entries {
            if let Err(err) = callback(entry) {
                failures.push((Arc::clone(entry), err));
            }
        }
        failures
    }

    pub(crate) fn dispatch_log(&self, data: &LogData) -> Vec<DispatchFailure> {
        self.dispatch_each(|client| client.on_unfiltered_log(data))
    }

    pub(crate) fn dispatch_open_group(&self, view: &GroupView<'_>) -> Vec<DispatchFailure> {
        self.dispatch_each(|client| client.on_open_group(view))
    }

    pub(crate) fn dispatch_group_closing(
        &self,
        view: &GroupView<'_>,
        conclusions: &mut Vec<Conclusion>,
    ) -> Vec<DispatchFailure> {
        self.dispatch_each(|client| client.on_group_closing(view, conclusions))
    }

    pub(crate) fn dispatch_group_closed(
        &self,
        view: &GroupView<'_>,
        conclusions: &[Conclusion],
    ) -> Vec<DispatchFailure> {
        self.dispatch_each(|client| client.on_group_closed(view, conclusions))
    }

    pub(crate) fn dispatch_topic_changed(
        &self,
        topic: &str,
        origin: SourceLocation,
    ) -> Vec<DispatchFailure> {
        self.dispatch_each(|client| client.on_topic_changed(topic, origin))
    }

    pub(crate) fn dispatch_auto_tags_changed(&self, tags: &TagSet) -> Vec<DispatchFailure> {
        self.dispatch_each(|client| client.on_auto_tags_changed(tags))
    }
}
