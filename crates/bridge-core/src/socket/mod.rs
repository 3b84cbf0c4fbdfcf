//! Socket module containing the virtual socket registry and its types.

pub mod registry;

pub use registry::{
    Interest, PollEvent, PollRequest, ReadOutcome, SocketId, SocketRegistry, WriteError,
};
