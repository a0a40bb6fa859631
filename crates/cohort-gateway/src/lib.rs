/// WebSocket gateway: forwards realtime row changes to connected clients for
/// the channels each connection subscribed to.

pub mod connection;
pub mod subscriptions;
