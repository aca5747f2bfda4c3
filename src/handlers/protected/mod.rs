// handlers/protected/mod.rs - Protected handlers (JWT authentication required)
//
// Every handler here receives the `Caller` injected by `jwt_auth_middleware`
// and resolves it to a `Scope` before touching the store.
pub mod rankings;
pub mod results;
