//! Double-submit protection for the planner's forms.
//!
//! A [`SubmissionGuard`] owns the visible state of one form's submit control
//! (label, disabled flag, busy marker) together with an explicit in-flight
//! flag. Submissions go through [`SubmissionGuard::submit`], which either
//! blocks on a missing required field, suppresses a re-entrant attempt, or
//! lets the submission proceed and flips the control into its busy state.
//!
//! A fallback timer armed with [`arm_fallback`] restores the control after a
//! fixed delay unless the page has already been replaced.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const FALLBACK_DELAY: Duration = Duration::from_secs(5);

/// The submit/save button of a form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitControl {
    label: String,
    original_label: Option<String>,
    disabled: bool,
}

impl SubmitControl {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            original_label: None,
            disabled: false,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    pub fn set_disabled(&mut self, disabled: bool) {
        self.disabled = disabled;
    }

    fn engage(&mut self, busy_label: &str) {
        self.disabled = true;
        if self.original_label.is_none() {
            self.original_label = Some(std::mem::replace(&mut self.label, busy_label.to_string()));
        } else {
            self.label = busy_label.to_string();
        }
    }

    fn restore(&mut self) {
        self.disabled = false;
        if let Some(original) = self.original_label.take() {
            self.label = original;
        }
    }
}

/// A field that must be non-blank before the form may be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequiredField {
    pub name: String,
    pub notice: String,
}

impl RequiredField {
    pub fn new(name: impl Into<String>, notice: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            notice: notice.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The submission goes ahead; the control is now busy.
    Proceed,
    /// A required field was blank. Nothing was sent; focus belongs on `focus`.
    Blocked { focus: String, notice: String },
    /// A submission is already in flight.
    Suppressed,
}

#[derive(Debug, Clone)]
pub struct SubmissionGuard {
    control: SubmitControl,
    busy_label: String,
    required: Option<RequiredField>,
    in_flight: bool,
    form_busy: bool,
    navigated: bool,
}

impl SubmissionGuard {
    /// Attach a guard to a form. A form without a submit control gets no guard.
    pub fn attach(control: Option<SubmitControl>, busy_label: impl Into<String>) -> Option<Self> {
        let control = control?;
        Some(Self {
            control,
            busy_label: busy_label.into(),
            required: None,
            in_flight: false,
            form_busy: false,
            navigated: false,
        })
    }

    pub fn require(mut self, field: RequiredField) -> Self {
        self.required = Some(field);
        self
    }

    pub fn control(&self) -> &SubmitControl {
        &self.control
    }

    /// Label the control shows while a submission is in flight
    pub fn busy_label(&self) -> &str {
        &self.busy_label
    }

    pub fn required(&self) -> Option<&RequiredField> {
        self.required.as_ref()
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    /// Mirrors `aria-busy` on the form
    pub fn is_busy(&self) -> bool {
        self.form_busy
    }

    /// Handle a submit attempt with the form's current field values.
    ///
    /// A required field that is not present in `fields` at all is not checked.
    /// A control that is already disabled never submits.
    pub fn submit(&mut self, fields: &HashMap<String, String>) -> SubmitOutcome {
        if self.in_flight || self.control.is_disabled() {
            debug!(in_flight = self.in_flight, "submit control unavailable, suppressing");
            return SubmitOutcome::Suppressed;
        }

        if let Some(required) = &self.required {
            if let Some(value) = fields.get(&required.name) {
                if value.trim().is_empty() {
                    return SubmitOutcome::Blocked {
                        focus: required.name.clone(),
                        notice: required.notice.clone(),
                    };
                }
            }
        }

        self.control.engage(&self.busy_label);
        self.form_busy = true;
        self.in_flight = true;
        SubmitOutcome::Proceed
    }

    /// Fallback recovery: re-enable the control unless the page was replaced.
    /// Returns whether anything was restored.
    pub fn recover(&mut self) -> bool {
        if self.navigated {
            return false;
        }
        self.control.restore();
        self.form_busy = false;
        self.in_flight = false;
        true
    }

    /// The submission produced a new page; this guard's document is gone.
    pub fn mark_navigated(&mut self) {
        self.navigated = true;
    }
}

pub type SharedGuard = Arc<Mutex<SubmissionGuard>>;

/// Spawn the fallback timer for a guarded submission.
///
/// The timer is never cancelled. Once the page has navigated the recovery is
/// a no-op. `on_fired` runs after the attempt either way.
pub fn arm_fallback<F>(guard: SharedGuard, delay: Duration, on_fired: F) -> JoinHandle<()>
where
    F: FnOnce() + Send + 'static,
{
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let restored = match guard.lock() {
            Ok(mut g) => g.recover(),
            Err(_) => {
                warn!("submission guard lock poisoned, skipping fallback");
                return;
            }
        };
        if restored {
            info!(delay_ms = delay.as_millis() as u64, "fallback restored submit control");
        }
        on_fired();
    })
}

/// Guards for every form the server has handed out, keyed by the hidden
/// `submission` token each guarded form carries.
#[derive(Clone)]
pub struct SubmissionRegistry {
    guards: Arc<Mutex<HashMap<Uuid, SharedGuard>>>,
    fallback: Duration,
}

impl Default for SubmissionRegistry {
    fn default() -> Self {
        Self::new(FALLBACK_DELAY)
    }
}

impl SubmissionRegistry {
    pub fn new(fallback: Duration) -> Self {
        Self {
            guards: Arc::default(),
            fallback,
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.guards.lock().map(|g| g.len()).unwrap_or(0)
    }

    /// The guard for `token` and whether it was created just now.
    fn guard_for(
        &self,
        token: Uuid,
        make: impl FnOnce() -> Option<SubmissionGuard>,
    ) -> Option<(SharedGuard, bool)> {
        let mut guards = self.guards.lock().ok()?;
        if let Some(existing) = guards.get(&token) {
            return Some((existing.clone(), false));
        }
        let guard = Arc::new(Mutex::new(make()?));
        guards.insert(token, guard.clone());
        Some((guard, true))
    }

    /// Run a submit attempt for `token`, creating its guard on first sight.
    ///
    /// With no guard (the form had no submit control) the attempt proceeds
    /// unguarded. A proceeding submission arms the fallback timer, which drops
    /// the guard when it fires; a later submit with the same token starts
    /// over. A guard whose first attempt did not proceed is not kept.
    pub fn begin(
        &self,
        token: Uuid,
        make: impl FnOnce() -> Option<SubmissionGuard>,
        fields: &HashMap<String, String>,
    ) -> SubmitOutcome {
        let Some((guard, created)) = self.guard_for(token, make) else {
            return SubmitOutcome::Proceed;
        };

        let outcome = match guard.lock() {
            Ok(mut g) => g.submit(fields),
            Err(_) => {
                warn!(%token, "submission guard lock poisoned");
                return SubmitOutcome::Suppressed;
            }
        };

        if outcome == SubmitOutcome::Proceed {
            let registry = self.clone();
            arm_fallback(guard, self.fallback, move || registry.forget(token));
        } else if created {
            self.forget(token);
        }
        outcome
    }

    /// The response for `token` has been produced and replaces the page.
    pub fn finish(&self, token: Uuid) {
        let guard = self.guards.lock().ok().and_then(|g| g.get(&token).cloned());
        if let Some(guard) = guard {
            if let Ok(mut g) = guard.lock() {
                g.mark_navigated();
            }
        }
    }

    pub fn forget(&self, token: Uuid) {
        if let Ok(mut guards) = self.guards.lock() {
            guards.remove(&token);
        }
    }
}
