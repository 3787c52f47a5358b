pub mod prekey_manager;
pub mod session_manager;
pub mod state;
