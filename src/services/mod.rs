//! Business logic sitting between the HTTP routes and the session engine.

pub mod documentation;
pub mod health_service;
pub mod host_service;
pub mod player_service;
pub mod session_service;
pub mod sse_service;
pub mod storage_supervisor;
