//! API trait for capability registration.
//!
//! APIs are long-lived service objects a plugin publishes on the server so
//! that other plugins and the embedding layer can reach them. The resource
//! runtime is the canonical example: `ResourcesPlugin` inserts it during
//! `build()` and the script bindings fetch it with `server.api::<T>()`.
//!
//! # API vs State
//!
//! | Aspect | API | State |
//! |--------|-----|-------|
//! | **Purpose** | Shared services | Plain data (config, metadata) |
//! | **Access method** | `server.api::<A>()` | `server.get_global::<T>()` |
//! | **Mutation** | Interior (locks inside the API) | Guard-based (`get_state_mut`) |
//!
//! APIs are handed out as `&A`, so anything that mutates must do so through
//! interior mutability:
//!
//! ```ignore
//! pub struct SessionAPI {
//!     sessions: RwLock<HashMap<u32, Session>>,
//! }
//!
//! impl API for SessionAPI {}
//!
//! impl SessionAPI {
//!     pub fn open(&self, id: u32) {
//!         self.sessions.write().insert(id, Session::default());
//!     }
//! }
//! ```

/// Marker trait for capability APIs.
///
/// # Usage in Plugins
///
/// ```ignore
/// impl Plugin for SessionPlugin {
///     fn build(&self, server: &mut Server) {
///         server.insert_api(SessionAPI::new());
///     }
/// }
///
/// impl Plugin for LobbyPlugin {
///     fn ready(&self, server: &mut Server) {
///         let sessions = server.api::<SessionAPI>()
///             .expect("SessionPlugin must be added before LobbyPlugin");
///         sessions.open(0);
///     }
/// }
/// ```
pub trait API: Send + Sync + 'static {}
