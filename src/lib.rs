/// Collaborator traits for a concrete broker and the in-memory broker.
pub mod broker;
/// Service configuration loading.
pub mod config;
/// Connection state machine and automatic reconnection.
pub mod connection;
/// Consumer pool: polling workers and topic assignment.
pub mod downstream;
/// Common error types and result alias.
pub mod error;
/// Listener registry and packet dispatch.
pub mod listener;
/// Flexible logging (formatting, filters, sinks).
pub mod logging;
/// Packets, payloads, statuses and the wire form.
pub mod packet;
/// Payload serialization bindings.
pub mod serdes;
/// Service facade wiring all components together.
pub mod service;
/// Topic patterns and the topic registry.
pub mod topic;
/// Send path and idle packet tracking.
pub mod upstream;
/// Request/response packet builder.
pub mod wizard;

// -----------------------------------------------------------------------------
//  Frequently used public types
// -----------------------------------------------------------------------------

/// Broker boundary.
pub use broker::{InMemoryBroker, Publisher, Record, Subscriber, Transport};
/// config
pub use config::HagridConfig;
/// Connection state.
pub use connection::{ConnectionHandler, ConnectionStatus};
/// Operation errors and result types.
pub use error::{
    BrokerError, ConfigError, ConnectionError, ErrorCode, HagridResult, ListenerError, PoolError,
    StackError, StreamError, TopicError,
};
/// Listeners and dispatch.
pub use listener::{Delivery, Direction, Listener, ListenerId, Priority, Response};
/// Logging entry point.
pub use logging::{init_logging, LoggingConfig, LoggingHandle};
/// Packets.
pub use packet::{Packet, Payload, Status, StatusCode};
/// Serialization bindings.
pub use serdes::{BytesSerdes, JsonSerdes, NullSerdes, Serdes, StringSerdes};
/// Service facade.
pub use service::Hagrid;
/// Topics.
pub use topic::{Topic, TopicPattern, TopicProperties};
/// Request/response builder.
pub use wizard::PacketWizard;
