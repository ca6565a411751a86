//! JSON-RPC facade: line-framed JSON 2.0 over stdio.
//!
//! The session state machine serializes all index and query operations;
//! the serve loop is a thin framing layer on top of it.

mod serve;
mod session;
mod wire;

pub use serve::serve;
pub use session::{Session, SessionState};
pub use wire::{
    Request, Response, RpcError, INTERNAL_ERROR, INVALID_PARAMS, INVALID_REQUEST,
    METHOD_NOT_FOUND,
};
