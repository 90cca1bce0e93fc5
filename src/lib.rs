//! Script Web Server - run scripts on a single-threaded host from a browser
//!
//! A local HTTP listener accepts form-submitted source text and hands it to the
//! host's script engine on the one thread that is allowed to run it.
//!
//! # Wiring
//!
//! ```rust,ignore
//! use script_web_server::{config::ServerConfig, dispatcher::HomeContext, server::ScriptServer};
//!
//! // On the thread that owns the engine:
//! let (mut home, dispatcher) = HomeContext::new(my_executor);
//! let mut server = ScriptServer::new(ServerConfig::default(), dispatcher);
//! server.start("8080")?;
//! let mut state = server.into_state();
//! home.run(); // returns once the listener has stopped
//! state.wait();
//! ```

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod logging;
pub mod request;
pub mod response;
pub mod server;
