pub mod error;
pub mod mode;
pub mod settings;
pub mod filter;
pub mod transport;
pub mod client;
pub mod service;

pub use error::Error;
pub use error::Result;
pub use mode::ResultMode;

pub use settings::ServiceSettings;
pub use settings::MethodOptions;
pub use settings::ClientSettings;
pub use settings::InvokeSettings;

pub use filter::Filter;
pub use filter::FilterChain;

pub use transport::Transport;
pub use transport::TransportError;
pub use transport::ServiceTransport;

pub use client::Client;
pub use client::CallContext;
pub use client::ErrorHook;

pub use service::Service;
pub use service::Method;
pub use service::WILDCARD;
