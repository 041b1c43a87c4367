//! Data models for the raven-link client library.
//!
//! Wire frames of the subscription TCP protocol and the JSON bodies of the
//! subscription registry API.

pub mod client_message;
pub mod revision;
pub mod server_message;
pub mod server_node;
pub mod subscription_connect_request;
pub mod subscription_creation_options;
pub mod subscription_opening_strategy;
pub mod subscription_state;
pub mod subscription_worker_options;
pub mod tcp_connection_header;
pub mod tcp_connection_info;

pub use client_message::SubscriptionClientMessage;
pub use revision::Revision;
pub use server_message::{
    ConnectionStatusData, SubscriptionConnectionStatus, SubscriptionServerMessage,
};
pub use server_node::ServerNode;
pub use subscription_connect_request::SubscriptionConnectRequest;
pub use subscription_creation_options::SubscriptionCreationOptions;
pub use subscription_opening_strategy::SubscriptionOpeningStrategy;
pub use subscription_state::SubscriptionState;
pub use subscription_worker_options::SubscriptionWorkerOptions;
pub use tcp_connection_header::{
    highest_supported_version, TcpConnectionHeaderMessage, TcpConnectionHeaderResponse,
    TcpConnectionStatus, TcpOperation,
    SUBSCRIPTION_BASE_LINE, SUPPORTED_SUBSCRIPTION_VERSIONS,
};
pub use tcp_connection_info::TcpConnectionInfo;
