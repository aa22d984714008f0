//! Lifecycle controller: start, stop, restart and recovery.
//!
//! Every operation here resolves only once the affected resources have
//! reached a stable state (`Started`, `Stopped` or `Error`). Cascades walk
//! precomputed orders from the dependency graph; nothing recurses.
//!
//! A request against a resource that is mid-transition never queues behind
//! it: the same direction is a no-op, the opposite direction fails with
//! [`ResourceError::AlreadyInProgress`].

use core::iter;

use crate::error::ResourceError;
use crate::runtime::ResourceRuntime;
use crate::state::ResourceState;

enum Plan {
    Run,
    Skip,
}

impl ResourceRuntime {
    /// Starts a resource and any stopped dependencies, dependencies first.
    ///
    /// Returns the names of the resources this call started, in start order.
    /// Starting a resource that is already `Started` or `Starting` is a no-op.
    ///
    /// # Errors
    ///
    /// - [`ResourceError::NotFound`] if `name` is not registered.
    /// - [`ResourceError::InvalidState`] if `name` is in `Error`.
    /// - [`ResourceError::AlreadyInProgress`] if `name` is `Stopping`.
    /// - [`ResourceError::DependencyStartFailed`] if a dependency could not be
    ///   started. Everything this call started has been stopped again, except
    ///   the failing dependency, which stays in `Error`; later starts of
    ///   anything that needs it fail with `DependencyStartFailed` until it is
    ///   [`reset`](Self::reset).
    /// - [`ResourceError::Host`] or [`ResourceError::Timeout`] if `name`
    ///   itself failed; it is left in `Error`.
    pub async fn start(&self, name: &str) -> Result<Vec<String>, ResourceError> {
        if let Plan::Skip = self.plan_start(name)? {
            return Ok(Vec::new());
        }
        let _writer = self.shared.writer.lock().await;
        self.start_locked(name).await
    }

    /// Stops a resource.
    ///
    /// With `cascade`, running dependants are stopped first, deepest first.
    /// Returns the names of the resources that reached `Stopped`, in stop order.
    /// Stopping a resource that is already `Stopped` or `Stopping` is a no-op.
    ///
    /// # Errors
    ///
    /// - [`ResourceError::NotFound`] if `name` is not registered.
    /// - [`ResourceError::HasActiveDependants`] if dependants are running and
    ///   `cascade` is false. Nothing is stopped.
    /// - [`ResourceError::AlreadyInProgress`] if `name` is `Starting`.
    /// - [`ResourceError::InvalidState`] if `name` is in `Error`.
    /// - The first [`ResourceError::Host`] or [`ResourceError::Timeout`] of the
    ///   cascade. The remaining resources are still stopped.
    pub async fn stop(&self, name: &str, cascade: bool) -> Result<Vec<String>, ResourceError> {
        if let Plan::Skip = self.plan_stop(name)? {
            return Ok(Vec::new());
        }
        let _writer = self.shared.writer.lock().await;
        self.stop_locked(name, cascade).await
    }

    /// Stops then starts a resource under a single writer lock hold.
    ///
    /// Dependants stopped by the cascade are started again afterwards, in
    /// dependency order. Returns the names of the resources started.
    ///
    /// # Errors
    ///
    /// Any error of [`stop`](Self::stop), in which case nothing is started,
    /// or of [`start`](Self::start).
    pub async fn restart(&self, name: &str, cascade: bool) -> Result<Vec<String>, ResourceError> {
        match self.current_state(name)? {
            state @ (ResourceState::Starting | ResourceState::Stopping) => {
                return Err(ResourceError::AlreadyInProgress {
                    resource: name.to_string(),
                    state,
                });
            }
            ResourceState::Error => return Err(invalid_state(name, ResourceState::Error, "restart")),
            ResourceState::Stopped | ResourceState::Started => {}
        }

        let _writer = self.shared.writer.lock().await;
        let stopped = self.stop_locked(name, cascade).await?;
        let mut started = self.start_locked(name).await?;

        // `stopped` is deepest first; bring dependants back dependencies first.
        for dependant in stopped.iter().rev().filter(|stopped| *stopped != name) {
            started.extend(self.start_locked(dependant).await?);
        }

        tracing::info!(resource = %name, restarted = started.len(), "resource restarted");
        Ok(started)
    }

    /// Marks a running resource as crashed (`Started → Error`).
    ///
    /// Used by the embedding when a script runtime dies on its own. The
    /// resource stays in `Error` until [`reset`](Self::reset).
    pub async fn report_failure(&self, name: &str, reason: impl Into<String>) -> Result<(), ResourceError> {
        let reason = reason.into();
        let _writer = self.shared.writer.lock().await;

        let state = self.current_state(name)?;
        if state != ResourceState::Started {
            return Err(invalid_state(name, state, "report failure for"));
        }

        tracing::warn!(resource = %name, %reason, "resource reported failure");
        let held = self.owned_entities(name);
        self.transition(name, ResourceState::Error)?;
        self.invalidate_owned(name, held);
        Ok(())
    }

    /// Clears the `Error` state (`Error → Stopped`) so the resource can be started again.
    pub async fn reset(&self, name: &str) -> Result<(), ResourceError> {
        let _writer = self.shared.writer.lock().await;

        let state = self.current_state(name)?;
        if state != ResourceState::Error {
            return Err(invalid_state(name, state, "reset"));
        }

        let held = self.owned_entities(name);
        self.transition(name, ResourceState::Stopped)?;
        self.invalidate_owned(name, held);
        Ok(())
    }

    /// Stops every started resource in reverse dependency order, then tears
    /// down every live script context.
    ///
    /// Stopping is skipped when
    /// [`RuntimeConfig::stop_on_shutdown`](crate::config::RuntimeConfig::stop_on_shutdown)
    /// is off. Failures do not interrupt the sequence; the first one is returned
    /// after contexts are torn down.
    pub async fn shutdown(&self) -> Result<Vec<String>, ResourceError> {
        let _writer = self.shared.writer.lock().await;

        let mut stopped = Vec::new();
        let mut first_error = None;

        if self.shared.config.stop_on_shutdown {
            let order = self.shared.registry.read().graph().full_order()?;
            for name in order.iter().rev() {
                if self.state(name) != Some(ResourceState::Started) {
                    continue;
                }
                match self.stop_one(name).await {
                    Ok(()) => stopped.push(name.clone()),
                    Err(err) => {
                        if self.state(name) == Some(ResourceState::Stopped) {
                            stopped.push(name.clone());
                        }
                        first_error.get_or_insert(err);
                    }
                }
            }
        }

        self.teardown();
        tracing::info!(stopped = stopped.len(), "resource runtime shut down");

        match first_error {
            Some(err) => Err(err),
            None => Ok(stopped),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Locked sequences
    // ─────────────────────────────────────────────────────────────────────

    async fn start_locked(&self, name: &str) -> Result<Vec<String>, ResourceError> {
        if let Plan::Skip = self.plan_start(name)? {
            return Ok(Vec::new());
        }

        let order = self
            .start_order(name)
            .map_err(|err| match err {
                ResourceError::NotFound(dependency) if dependency != name => {
                    ResourceError::DependencyStartFailed {
                        source: Box::new(ResourceError::NotFound(dependency.clone())),
                        dependency,
                    }
                }
                other => other,
            })?;

        let mut started: Vec<String> = Vec::with_capacity(order.len());
        for resource in &order {
            if self.state(resource) == Some(ResourceState::Started) {
                continue;
            }

            if let Err(err) = self.start_one(resource).await {
                tracing::warn!(
                    resource = %name,
                    failed = %resource,
                    rollback = started.len(),
                    error = %err,
                    "start failed, rolling back"
                );
                self.rollback(&started).await;

                if resource == name {
                    return Err(err);
                }
                return Err(ResourceError::DependencyStartFailed {
                    dependency: resource.clone(),
                    source: Box::new(err),
                });
            }
            started.push(resource.clone());
        }

        Ok(started)
    }

    async fn stop_locked(&self, name: &str, cascade: bool) -> Result<Vec<String>, ResourceError> {
        if let Plan::Skip = self.plan_stop(name)? {
            return Ok(Vec::new());
        }

        let active: Vec<String> = self
            .transitive_dependants(name)?
            .into_iter()
            .filter(|dependant| self.state(dependant).is_some_and(ResourceState::is_active))
            .collect();

        if !active.is_empty() && !cascade {
            return Err(ResourceError::HasActiveDependants {
                resource: name.to_string(),
                dependants: active,
            });
        }

        let mut stopped = Vec::with_capacity(active.len() + 1);
        let mut first_error = None;

        for target in active.iter().map(String::as_str).chain(iter::once(name)) {
            let result = self.stop_one(target).await;
            if self.state(target) == Some(ResourceState::Stopped) {
                stopped.push(target.to_string());
            }
            if let Err(err) = result {
                first_error.get_or_insert(err);
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(stopped),
        }
    }

    /// Stops resources started by a failed cascade, newest first.
    async fn rollback(&self, started: &[String]) {
        for resource in started.iter().rev() {
            if let Err(err) = self.stop_one(resource).await {
                tracing::warn!(resource = %resource, error = %err, "rollback stop failed");
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Single transitions
    // ─────────────────────────────────────────────────────────────────────

    async fn start_one(&self, name: &str) -> Result<(), ResourceError> {
        let state = self.current_state(name)?;
        if state != ResourceState::Stopped {
            return Err(invalid_state(name, state, "start"));
        }

        let held = self.owned_entities(name);
        self.transition(name, ResourceState::Starting)?;
        let resource = self
            .get(name)
            .ok_or_else(|| ResourceError::NotFound(name.to_string()))?;

        let timeout = self.shared.config.transition_timeout();
        let outcome = tokio::time::timeout(timeout, self.shared.host.start(&resource)).await;

        let result = match outcome {
            Ok(Ok(exports)) => {
                self.shared.registry.write().set_exports(name, exports);
                self.transition(name, ResourceState::Started)?;
                Ok(())
            }
            Ok(Err(err)) => {
                tracing::warn!(resource = %name, error = %err, "host failed to start resource");
                self.transition(name, ResourceState::Error)?;
                Err(ResourceError::Host {
                    resource: name.to_string(),
                    message: err.message().to_string(),
                })
            }
            Err(_) => {
                tracing::warn!(resource = %name, ?timeout, "resource start timed out");
                self.transition(name, ResourceState::Error)?;
                Err(ResourceError::Timeout {
                    resource: name.to_string(),
                    state: ResourceState::Starting,
                    timeout,
                })
            }
        };

        self.invalidate_owned(name, held);
        result
    }

    async fn stop_one(&self, name: &str) -> Result<(), ResourceError> {
        let held = self.owned_entities(name);
        self.transition(name, ResourceState::Stopping)?;
        let resource = self
            .get(name)
            .ok_or_else(|| ResourceError::NotFound(name.to_string()))?;

        let timeout = self.shared.config.transition_timeout();
        let outcome = tokio::time::timeout(timeout, self.shared.host.stop(&resource)).await;

        let result = match outcome {
            Ok(Ok(())) => {
                self.transition(name, ResourceState::Stopped)?;
                Ok(())
            }
            Ok(Err(err)) => {
                tracing::warn!(resource = %name, error = %err, "host failed to stop resource, marking stopped");
                self.transition(name, ResourceState::Stopped)?;
                Err(ResourceError::Host {
                    resource: name.to_string(),
                    message: err.message().to_string(),
                })
            }
            Err(_) => {
                tracing::warn!(resource = %name, ?timeout, "resource stop timed out");
                self.transition(name, ResourceState::Error)?;
                Err(ResourceError::Timeout {
                    resource: name.to_string(),
                    state: ResourceState::Stopping,
                    timeout,
                })
            }
        };

        self.invalidate_owned(name, held);
        result
    }

    // ─────────────────────────────────────────────────────────────────────
    // Preconditions
    // ─────────────────────────────────────────────────────────────────────

    fn current_state(&self, name: &str) -> Result<ResourceState, ResourceError> {
        self.state(name)
            .ok_or_else(|| ResourceError::NotFound(name.to_string()))
    }

    fn plan_start(&self, name: &str) -> Result<Plan, ResourceError> {
        match self.current_state(name)? {
            ResourceState::Stopped => Ok(Plan::Run),
            ResourceState::Started | ResourceState::Starting => Ok(Plan::Skip),
            state @ ResourceState::Stopping => Err(ResourceError::AlreadyInProgress {
                resource: name.to_string(),
                state,
            }),
            state @ ResourceState::Error => Err(invalid_state(name, state, "start")),
        }
    }

    fn plan_stop(&self, name: &str) -> Result<Plan, ResourceError> {
        match self.current_state(name)? {
            ResourceState::Started => Ok(Plan::Run),
            ResourceState::Stopped | ResourceState::Stopping => Ok(Plan::Skip),
            state @ ResourceState::Starting => Err(ResourceError::AlreadyInProgress {
                resource: name.to_string(),
                state,
            }),
            state @ ResourceState::Error => Err(invalid_state(name, state, "stop")),
        }
    }
}

fn invalid_state(name: &str, state: ResourceState, operation: &'static str) -> ResourceError {
    ResourceError::InvalidState {
        resource: name.to_string(),
        state,
        operation,
    }
}
