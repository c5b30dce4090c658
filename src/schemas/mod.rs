pub mod checkin;
pub mod command;
pub mod firewall;
pub mod proxy;

pub use checkin::*;
pub use command::*;
pub use firewall::*;
pub use proxy::*;
