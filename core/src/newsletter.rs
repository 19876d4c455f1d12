//! List-subscription and campaign facade.
//!
//! # Design
//! `Newsletter` resolves a list name to its id, shapes the request body by
//! merging caller options over defaults, and issues exactly one call through
//! the wrapped `MailChimp` client (two for `create_campaign` with content).
//! List resolution always happens before any request, so an unknown list
//! never reaches the network.
//!
//! Merges are shallow: a caller option replaces the default of the same key
//! wholesale, nested objects included.

use std::time::Duration;

use serde_json::{json, Value};

use crate::api::{MailChimp, Params};
use crate::config::NewsletterConfig;
use crate::error::{NewsletterError, Result};
use crate::http::{Transport, UreqTransport};
use crate::lists::NewsletterListCollection;

/// Default per-call timeout.
pub const TIMEOUT: Duration = Duration::from_secs(10);

/// A member to subscribe: the address, merge fields (`FNAME`, `LNAME`, ...)
/// and any extra member fields to send as-is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Subscription {
    pub email: String,
    pub merge_fields: Params,
    pub options: Params,
}

impl Subscription {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            ..Self::default()
        }
    }

    pub fn merge_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.merge_fields.insert(key.into(), value.into());
        self
    }

    pub fn option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }
}

/// A regular campaign addressed to one list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Campaign {
    pub from_name: String,
    pub reply_to: String,
    pub subject: String,
    /// When set and non-empty, uploaded as the campaign content right after
    /// creation.
    pub html: Option<String>,
    pub options: Params,
    pub content_options: Params,
}

impl Campaign {
    pub fn new(
        from_name: impl Into<String>,
        reply_to: impl Into<String>,
        subject: impl Into<String>,
    ) -> Self {
        Self {
            from_name: from_name.into(),
            reply_to: reply_to.into(),
            subject: subject.into(),
            ..Self::default()
        }
    }

    pub fn html(mut self, html: impl Into<String>) -> Self {
        self.html = Some(html.into());
        self
    }

    pub fn option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn content_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.content_options.insert(key.into(), value.into());
        self
    }
}

pub struct Newsletter<T> {
    api: MailChimp<T>,
    lists: NewsletterListCollection,
    timeout: Duration,
}

impl Newsletter<UreqTransport> {
    /// Validate `config` and build a facade over a `ureq`-backed client.
    pub fn from_config(config: &NewsletterConfig) -> Result<Self> {
        config.validate()?;
        let mut api = MailChimp::new(&config.api_key, UreqTransport::new())?;
        if let Some(endpoint) = &config.endpoint {
            api = api.with_endpoint(endpoint);
        }
        let lists = NewsletterListCollection::from_config(config)?;
        Ok(Self::new(api, lists).with_timeout(config.timeout()))
    }
}

impl<T: Transport> Newsletter<T> {
    pub fn new(api: MailChimp<T>, lists: NewsletterListCollection) -> Self {
        Self {
            api,
            lists,
            timeout: TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Change the timeout used by subsequent calls.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn lists(&self) -> &NewsletterListCollection {
        &self.lists
    }

    pub fn subscribe(&mut self, subscription: &Subscription, list_name: Option<&str>) -> Result<Value> {
        let list_id = self.list_id(list_name)?;
        let options = subscription_options(
            &subscription.email,
            &subscription.merge_fields,
            &subscription.options,
        );
        tracing::debug!(list = %list_id, "subscribing member");
        self.api
            .post(&format!("lists/{list_id}/members"), &options, self.timeout)
    }

    /// Subscribe with `status: "pending"`, which makes Mailchimp send a
    /// confirmation email first. Overrides any caller-provided status.
    pub fn subscribe_pending(
        &mut self,
        subscription: &Subscription,
        list_name: Option<&str>,
    ) -> Result<Value> {
        let pending = subscription.clone().option("status", "pending");
        self.subscribe(&pending, list_name)
    }

    pub fn subscribe_or_update(
        &mut self,
        subscription: &Subscription,
        list_name: Option<&str>,
    ) -> Result<Value> {
        let path = self.member_path(&subscription.email, list_name)?;
        let options = subscription_options(
            &subscription.email,
            &subscription.merge_fields,
            &subscription.options,
        );
        self.api.put(&path, &options, self.timeout)
    }

    pub fn get_members(&mut self, list_name: Option<&str>, parameters: &Params) -> Result<Value> {
        let list_id = self.list_id(list_name)?;
        self.api
            .get(&format!("lists/{list_id}/members"), parameters, self.timeout)
    }

    pub fn get_member(&mut self, email: &str, list_name: Option<&str>) -> Result<Value> {
        let path = self.member_path(email, list_name)?;
        self.api.get(&path, &Params::new(), self.timeout)
    }

    pub fn get_member_activity(&mut self, email: &str, list_name: Option<&str>) -> Result<Value> {
        let path = self.member_path(email, list_name)?;
        self.api
            .get(&format!("{path}/activity"), &Params::new(), self.timeout)
    }

    /// True when the list holds a member with this address, in any status.
    pub fn has_member(&mut self, email: &str, list_name: Option<&str>) -> Result<bool> {
        match self.get_member(email, list_name) {
            Ok(member) => Ok(member
                .get("email_address")
                .and_then(Value::as_str)
                .is_some_and(|address| address.eq_ignore_ascii_case(email))),
            Err(e) if e.is_api_failure() => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn is_subscribed(&mut self, email: &str, list_name: Option<&str>) -> Result<bool> {
        match self.get_member(email, list_name) {
            Ok(member) => Ok(member.get("status").and_then(Value::as_str) == Some("subscribed")),
            Err(e) if e.is_api_failure() => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn unsubscribe(&mut self, email: &str, list_name: Option<&str>) -> Result<Value> {
        let path = self.member_path(email, list_name)?;
        self.api
            .patch(&path, &object(json!({"status": "unsubscribed"})), self.timeout)
    }

    pub fn update_email_address(
        &mut self,
        current_email: &str,
        new_email: &str,
        list_name: Option<&str>,
    ) -> Result<Value> {
        let path = self.member_path(current_email, list_name)?;
        self.api
            .patch(&path, &object(json!({"email_address": new_email})), self.timeout)
    }

    /// Archive the member. Mailchimp keeps the record and allows
    /// re-subscribing later.
    pub fn delete(&mut self, email: &str, list_name: Option<&str>) -> Result<Value> {
        let path = self.member_path(email, list_name)?;
        self.api.delete(&path, &Params::new(), self.timeout)
    }

    /// Erase the member and its history. The address cannot be re-imported.
    pub fn delete_permanently(&mut self, email: &str, list_name: Option<&str>) -> Result<Value> {
        let path = self.member_path(email, list_name)?;
        self.api.post(
            &format!("{path}/actions/delete-permanent"),
            &Params::new(),
            self.timeout,
        )
    }

    pub fn get_tags(&mut self, email: &str, list_name: Option<&str>) -> Result<Value> {
        let path = self.member_path(email, list_name)?;
        self.api
            .get(&format!("{path}/tags"), &Params::new(), self.timeout)
    }

    pub fn add_tags<S: AsRef<str>>(
        &mut self,
        tags: &[S],
        email: &str,
        list_name: Option<&str>,
    ) -> Result<Value> {
        self.set_tags(tags, "active", email, list_name)
    }

    pub fn remove_tags<S: AsRef<str>>(
        &mut self,
        tags: &[S],
        email: &str,
        list_name: Option<&str>,
    ) -> Result<Value> {
        self.set_tags(tags, "inactive", email, list_name)
    }

    /// Create a regular campaign for the list and, when `campaign.html` is
    /// non-empty, upload its content. Returns the created campaign.
    pub fn create_campaign(&mut self, campaign: &Campaign, list_name: Option<&str>) -> Result<Value> {
        let list_id = self.list_id(list_name)?;

        let mut options = object(json!({
            "type": "regular",
            "recipients": { "list_id": list_id },
            "settings": {
                "subject_line": campaign.subject,
                "from_name": campaign.from_name,
                "reply_to": campaign.reply_to,
            },
        }));
        options.extend(campaign.options.clone());

        let response = self.api.post("campaigns", &options, self.timeout)?;

        let Some(html) = campaign.html.as_deref().filter(|html| !html.is_empty()) else {
            return Ok(response);
        };

        let Some(campaign_id) = response.get("id").and_then(Value::as_str).map(str::to_string)
        else {
            let message = "campaign response carries no id";
            self.api.record_failure(message);
            return Err(NewsletterError::Deserialization(message.to_string()));
        };
        self.update_content(&campaign_id, html, &campaign.content_options)?;

        Ok(response)
    }

    pub fn update_content(
        &mut self,
        campaign_id: &str,
        html: &str,
        options: &Params,
    ) -> Result<Value> {
        let mut body = object(json!({ "html": html }));
        body.extend(options.clone());
        self.api
            .put(&format!("campaigns/{campaign_id}/content"), &body, self.timeout)
    }

    pub fn api(&self) -> &MailChimp<T> {
        &self.api
    }

    pub fn api_mut(&mut self) -> &mut MailChimp<T> {
        &mut self.api
    }

    pub fn last_error(&self) -> Option<&str> {
        self.api.last_error()
    }

    pub fn last_action_succeeded(&self) -> bool {
        self.api.success()
    }

    fn list_id(&self, list_name: Option<&str>) -> Result<String> {
        Ok(self.lists.find_by_name(list_name)?.id().to_string())
    }

    fn member_path(&self, email: &str, list_name: Option<&str>) -> Result<String> {
        let list_id = self.list_id(list_name)?;
        Ok(format!(
            "lists/{list_id}/members/{}",
            self.api.subscriber_hash(email)
        ))
    }

    fn set_tags<S: AsRef<str>>(
        &mut self,
        tags: &[S],
        status: &str,
        email: &str,
        list_name: Option<&str>,
    ) -> Result<Value> {
        let path = self.member_path(email, list_name)?;
        let payload: Vec<Value> = tags
            .iter()
            .map(|tag| json!({ "name": tag.as_ref(), "status": status }))
            .collect();
        self.api.post(
            &format!("{path}/tags"),
            &object(json!({ "tags": payload })),
            self.timeout,
        )
    }
}

/// Member body for subscribe calls: defaults for address, status and email
/// type, `merge_fields` when any are given, then `options` on top.
pub fn subscription_options(email: &str, merge_fields: &Params, options: &Params) -> Params {
    let mut merged = object(json!({
        "email_address": email,
        "status": "subscribed",
        "email_type": "html",
    }));
    if !merge_fields.is_empty() {
        merged.insert("merge_fields".to_string(), Value::Object(merge_fields.clone()));
    }
    merged.extend(options.clone());
    merged
}

fn object(value: Value) -> Params {
    match value {
        Value::Object(map) => map,
        _ => Params::new(),
    }
}
