use crate::client::WebhookApi;
use crate::error::RegistrationFailed;
use crate::types::{EventFilter, Subscription};

/// What the vendor handed back when a subscription was created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub remote_id: String,
    pub secret: Option<String>,
}

/// Whether the vendor still has this subscription, pointed at our current URL.
///
/// Lookup failures count as "does not exist".
pub async fn exists(api: &dyn WebhookApi, subscription: &Subscription) -> bool {
    let Some(remote_id) = subscription.remote_id.as_deref() else {
        return false;
    };

    match api.get_webhook(remote_id).await {
        Ok(remote) => {
            let same_url = remote.url.as_deref() == Some(subscription.target_url.as_str());
            if !same_url {
                tracing::info!(
                    trigger_id = %subscription.trigger_id,
                    remote_id,
                    remote_url = remote.url.as_deref().unwrap_or(""),
                    "remote webhook points elsewhere"
                );
            }
            same_url
        }
        Err(e) => {
            tracing::info!(
                trigger_id = %subscription.trigger_id,
                remote_id,
                error = %e,
                "webhook lookup failed, treating as missing"
            );
            false
        }
    }
}

pub async fn register(
    api: &dyn WebhookApi,
    target_url: &str,
    filter: &EventFilter,
) -> Result<Registration, RegistrationFailed> {
    let remote = api
        .create_webhook(target_url, &filter.as_events())
        .await
        .map_err(|e| RegistrationFailed(e.to_string()))?;
    if remote.id.is_empty() {
        return Err(RegistrationFailed("response carried no webhook id".into()));
    }
    Ok(Registration {
        remote_id: remote.id,
        secret: remote.secret.filter(|s| !s.is_empty()),
    })
}

/// Best-effort remote delete. Local id and secret are cleared regardless.
pub async fn deregister(api: &dyn WebhookApi, subscription: &mut Subscription) {
    if let Some(remote_id) = subscription.remote_id.as_deref() {
        match api.delete_webhook(remote_id).await {
            Ok(()) => tracing::info!(
                trigger_id = %subscription.trigger_id,
                remote_id,
                "webhook deleted"
            ),
            Err(e) if e.status() == Some(404) => tracing::info!(
                trigger_id = %subscription.trigger_id,
                remote_id,
                "webhook already gone"
            ),
            Err(e) => tracing::warn!(
                trigger_id = %subscription.trigger_id,
                remote_id,
                error = %e,
                "webhook delete failed, ignoring"
            ),
        }
    }
    subscription.remote_id = None;
    subscription.secret = None;
}

/// Bring `subscription` in line with the vendor for activation.
///
/// Keeps an existing remote subscription when it is still valid. Otherwise the
/// stale one is deleted and a new one registered. A failed registration leaves
/// the trigger active but unregistered; deliveries configured by hand still arrive.
pub async fn activate(api: &dyn WebhookApi, subscription: &mut Subscription) -> bool {
    if exists(api, subscription).await {
        tracing::debug!(trigger_id = %subscription.trigger_id, "reusing remote webhook");
        return true;
    }
    if subscription.remote_id.is_some() {
        deregister(api, subscription).await;
    }

    match register(api, &subscription.target_url, &subscription.event_filter).await {
        Ok(reg) => {
            tracing::info!(
                trigger_id = %subscription.trigger_id,
                remote_id = %reg.remote_id,
                signed = reg.secret.is_some(),
                "webhook registered"
            );
            subscription.remote_id = Some(reg.remote_id);
            subscription.secret = reg.secret;
            true
        }
        Err(e) => {
            tracing::warn!(
                trigger_id = %subscription.trigger_id,
                error = %e,
                "continuing without a registered webhook"
            );
            subscription.remote_id = None;
            subscription.secret = None;
            false
        }
    }
}
