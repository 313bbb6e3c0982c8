//! babelcast: live interpretation audio relay client.
//!
//! A technician streams microphone audio to a relay; listeners pick a
//! language channel and hear it played back without gaps.
//!
//! * [`auth`]: sender credential from the OS keychain or a prompt.
//! * [`transport`]: role-scoped WebSocket connections to the relay.
//! * [`audio`]: microphone capture and block extraction.
//! * [`playback`]: gapless scheduling of received blocks.
//! * [`session`]: sender pipeline and listener join / leave / switch.
//! * [`config`]: `settings.toml` persistence.

pub mod audio;
pub mod auth;
pub mod config;
pub mod playback;
pub mod session;
pub mod transport;
