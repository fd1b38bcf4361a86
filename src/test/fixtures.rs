pub use broker::{Behavior, FakeBroker};
pub use connection::ManualConnection;

mod broker;
