//! Mapping of server statuses and exception names to typed errors.

use crate::error::RavenLinkError;
use crate::models::{ConnectionStatusData, SubscriptionConnectionStatus};

/// Error for a non-`Accepted` connection status, `None` when accepted.
pub(crate) fn connection_status_error(
    subscription: &str,
    status: SubscriptionConnectionStatus,
    message: Option<&str>,
    exception: Option<&str>,
    data: Option<&ConnectionStatusData>,
) -> Option<RavenLinkError> {
    let detail = |fallback: String| message.map(str::to_string).unwrap_or(fallback);
    let err = match status {
        SubscriptionConnectionStatus::Accepted => return None,
        SubscriptionConnectionStatus::InUse => RavenLinkError::SubscriptionInUse(detail(format!(
            "Subscription '{}' is in use by another client",
            subscription
        ))),
        SubscriptionConnectionStatus::Closed => {
            // A closed status may wrap a more specific server exception
            if let Some(class) = exception {
                return Some(error_from_exception(Some(class), message));
            }
            RavenLinkError::SubscriptionClosed(detail(format!(
                "Subscription '{}' was closed by the server",
                subscription
            )))
        },
        SubscriptionConnectionStatus::NotFound => RavenLinkError::SubscriptionDoesNotExist(detail(
            format!("Subscription '{}' could not be found", subscription),
        )),
        SubscriptionConnectionStatus::Invalid => RavenLinkError::SubscriptionInvalidState(detail(
            format!("Subscription '{}' is in an invalid state", subscription),
        )),
        SubscriptionConnectionStatus::Redirect => RavenLinkError::SubscriptionDoesNotBelongToNode {
            node_tag: data.and_then(|d| d.redirected_tag.clone()),
            message: detail(format!("Subscription '{}' is served by another node", subscription)),
        },
        SubscriptionConnectionStatus::ConcurrencyReconnect => RavenLinkError::ConnectionTransient(
            detail("server asked the client to reconnect".to_string()),
        ),
        SubscriptionConnectionStatus::Forbidden | SubscriptionConnectionStatus::ForbiddenReadOnly => {
            RavenLinkError::AuthorizationError(detail(format!(
                "Access to subscription '{}' is forbidden",
                subscription
            )))
        },
        SubscriptionConnectionStatus::None => RavenLinkError::ConnectionTransient(detail(
            "server did not report a connection status".to_string(),
        )),
    };
    Some(err)
}

/// Typed error for an `Error` frame's exception class name.
pub(crate) fn error_from_exception(exception: Option<&str>, message: Option<&str>) -> RavenLinkError {
    let message = message.unwrap_or("no message").to_string();
    let class = exception
        .map(|e| e.rsplit('.').next().unwrap_or(e))
        .unwrap_or_default();

    match class {
        "SubscriptionDoesNotExistException" => RavenLinkError::SubscriptionDoesNotExist(message),
        "SubscriptionClosedException" => RavenLinkError::SubscriptionClosed(message),
        "SubscriptionInUseException" => RavenLinkError::SubscriptionInUse(message),
        "SubscriptionInvalidStateException" => RavenLinkError::SubscriptionInvalidState(message),
        "SubscriptionDoesNotBelongToNodeException" => {
            RavenLinkError::SubscriptionDoesNotBelongToNode {
                node_tag: None,
                message,
            }
        },
        "SubscriptionChangeVectorUpdateConcurrencyException" => {
            RavenLinkError::ConnectionTransient(message)
        },
        "SubscriberErrorException" => RavenLinkError::SubscriberError(message),
        "AuthorizationException" => RavenLinkError::AuthorizationError(message),
        "DatabaseDoesNotExistException" => RavenLinkError::ConfigurationError(message),
        "" => RavenLinkError::ServerError {
            status_code: 500,
            message,
        },
        other => RavenLinkError::ServerError {
            status_code: 500,
            message: format!("{}: {}", other, message),
        },
    }
}
