//! Binding between a lead form and the submission pipeline.

use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use crate::lead::{LeadSubmission, PageContext};
use crate::submitter::{DeliveryResult, LeadSubmitter};

/// Field names as (preferred, alternate). Older pages use the Portuguese names.
pub const FIELD_ALIASES: [(&str, &str); 6] = [
    ("name", "nome"),
    ("email", "e-mail"),
    ("phone", "telefone"),
    ("operadora", "operator"),
    ("subject", "assunto"),
    ("message", "mensagem"),
];

/// What the binding needs from a form: read fields, drive the submit
/// control, tell the visitor something, and clear the inputs.
pub trait FormSurface {
    fn value(&self, field: &str) -> Option<String>;
    fn submit_label(&self) -> String;
    fn submit_enabled(&self) -> bool;
    fn set_submit_state(&mut self, enabled: bool, label: &str);
    /// Blocking notification; the visitor has to acknowledge it.
    fn alert(&mut self, message: &str);
    fn reset(&mut self);
}

pub type FormCallback = Box<dyn Fn(&DeliveryResult, &mut dyn FormSurface) + Send + Sync>;

pub struct FormOptions {
    /// Fixed operator for single-carrier landing pages; wins over the form field
    pub operadora: Option<String>,
    pub subject: Option<String>,
    pub loading_text: String,
    pub on_success: Option<FormCallback>,
    pub on_error: Option<FormCallback>,
}

impl Default for FormOptions {
    fn default() -> Self {
        Self {
            operadora: None,
            subject: None,
            loading_text: "Enviando...".to_string(),
            on_success: None,
            on_error: None,
        }
    }
}

/// Holds the submit control disabled and relabelled; puts it back on drop.
struct BusyGuard<'a, S: FormSurface> {
    form: &'a mut S,
    label: String,
    enabled: bool,
}

impl<'a, S: FormSurface> BusyGuard<'a, S> {
    fn engage(form: &'a mut S, loading_text: &str) -> Self {
        let label = form.submit_label();
        let enabled = form.submit_enabled();
        form.set_submit_state(false, loading_text);
        Self {
            form,
            label,
            enabled,
        }
    }
}

impl<S: FormSurface> Deref for BusyGuard<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        self.form
    }
}

impl<S: FormSurface> DerefMut for BusyGuard<'_, S> {
    fn deref_mut(&mut self) -> &mut S {
        self.form
    }
}

impl<S: FormSurface> Drop for BusyGuard<'_, S> {
    fn drop(&mut self) {
        self.form.set_submit_state(self.enabled, &self.label);
    }
}

pub struct FormBinding {
    submitter: Arc<LeadSubmitter>,
    options: FormOptions,
}

impl FormBinding {
    pub fn new(submitter: Arc<LeadSubmitter>, options: FormOptions) -> Self {
        Self { submitter, options }
    }

    /// Read the lead fields, accepting either naming convention and applying
    /// the binding's overrides.
    pub fn extract(&self, form: &dyn FormSurface) -> LeadSubmission {
        let read = |(preferred, alternate): (&str, &str)| {
            form.value(preferred)
                .filter(|v| !v.trim().is_empty())
                .or_else(|| form.value(alternate))
        };
        let [name, email, phone, operator, subject, message] = FIELD_ALIASES.map(read);

        LeadSubmission {
            name,
            email,
            phone,
            operator: self.options.operadora.clone().or(operator),
            subject: self.options.subject.clone().or(subject),
            message,
        }
    }

    /// Handle one submit event end to end. The submit control stays disabled
    /// until the result has been presented.
    pub async fn submit<S: FormSurface>(
        &self,
        form: &mut S,
        page: &PageContext,
    ) -> DeliveryResult {
        let mut guard = BusyGuard::engage(form, &self.options.loading_text);

        let submission = self.extract(&*guard);
        let result = self.submitter.submit_lead(&submission, page).await;
        self.present(&result, &mut *guard);

        result
    }

    fn present(&self, result: &DeliveryResult, form: &mut dyn FormSurface) {
        let callback = if result.is_success() {
            &self.options.on_success
        } else {
            &self.options.on_error
        };
        if let Some(callback) = callback {
            callback(result, form);
            return;
        }

        let mut text = result.message().to_string();
        if let Some(extra) = result.warning().or(result.action()) {
            text.push('\n');
            text.push_str(extra);
        }
        form.alert(&text);

        if result.is_success() {
            form.reset();
        }
    }
}

/// In-memory form, used by the command line front end and in tests.
#[derive(Debug, Clone)]
pub struct MapForm {
    pub fields: HashMap<String, String>,
    pub label: String,
    pub enabled: bool,
    pub alerts: Vec<String>,
    /// Every (enabled, label) state the submit control went through
    pub submit_states: Vec<(bool, String)>,
    pub reset_count: usize,
}

impl MapForm {
    pub fn new(fields: HashMap<String, String>) -> Self {
        Self {
            fields,
            label: "Enviar".to_string(),
            enabled: true,
            alerts: Vec::new(),
            submit_states: Vec::new(),
            reset_count: 0,
        }
    }

    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self::new(
            pairs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }
}

impl FormSurface for MapForm {
    fn value(&self, field: &str) -> Option<String> {
        self.fields.get(field).cloned()
    }

    fn submit_label(&self) -> String {
        self.label.clone()
    }

    fn submit_enabled(&self) -> bool {
        self.enabled
    }

    fn set_submit_state(&mut self, enabled: bool, label: &str) {
        self.enabled = enabled;
        self.label = label.to_string();
        self.submit_states.push((enabled, label.to_string()));
    }

    fn alert(&mut self, message: &str) {
        self.alerts.push(message.to_string());
    }

    fn reset(&mut self) {
        self.fields.clear();
        self.reset_count += 1;
    }
}
