//! # mqtt-waiter
//!
//! Tooling for waiting on MQTT broker connections. The core is
//! [`waiter::ConnectionWaiter`], which acquires the connection registered
//! under a client identifier in an [`service::MqttService`] and waits for it
//! to report [`connection::ConnectionState::Connected`], failing with a
//! distinct error if either wait runs out.
//!
//! The crate also carries an in-memory registry, an MQTT 3.1.1 client
//! connection over TCP and the `mqtt-wait` readiness probe built on them.
pub mod connection;
pub mod error;
pub mod logging;
pub mod mqtt;
pub mod observers;
pub mod service;
pub mod waiter;


pub use waiter::{wait_for_connection, ConnectionWaiter, WaitConfig, EMBEDDED_CLIENT_ID};
