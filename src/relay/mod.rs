pub mod codec;
pub mod command;
pub mod filter;
pub mod notice;
pub mod outbound;
pub mod registry;
pub mod router;
pub mod server;
pub mod session;

pub use filter::PhraseFilter;
pub use registry::{ClientHandle, ConnectionId, NameTaken, Registry};
pub use router::{Delivery, DirectReport, RouteError, Router};
pub use server::{ServerState, SharedState};
