mod audit_log;
mod cart;
mod funding_intent;
mod license;
mod point_entry;
mod script;
mod user;

pub use audit_log::*;
pub use cart::*;
pub use funding_intent::*;
pub use license::*;
pub use point_entry::*;
pub use script::*;
pub use user::*;
