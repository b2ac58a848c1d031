//! Property-based tests for the safety gate and cache keys

mod safety_gate;
