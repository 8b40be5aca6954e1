//! Status socket for operator tools

mod protocol;
mod server;

pub use server::Server;
