//! vcshift-sdk: a small client for the chat platform's bot gateway and REST API.
//!
//! Covers only what a voice-channel bot needs: guild/channel/voice-state
//! events from the gateway, a presence cache to answer "who is in this
//! channel", and the REST calls to create, move into, and delete channels
//! and to answer slash-command interactions.

pub mod cache;
pub mod event;
pub mod gateway;
pub mod model;
pub mod rest;
