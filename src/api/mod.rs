// Version-cache HTTP server: republishes the cached output of a command.

pub mod cache;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod server;

pub use cache::VersionCache;
pub use server::VersionServer;
