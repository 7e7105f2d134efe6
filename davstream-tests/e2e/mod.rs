//! End-to-end tests for davstream
//!
//! These tests run the real HTTP server against a scripted WebDAV backend
//! on loopback sockets: PROPFIND metadata, ranged GETs, status mapping and
//! the JSON error and health bodies as a browser would see them.

mod dav_server;
mod http_delivery;
