//! Integration tests for Layer 1: Storage
//!
//! Tests for byte layouts, columns, entity locations, and the store.

mod entities;
mod layouts;
mod stores;
