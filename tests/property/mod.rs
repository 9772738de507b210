// Copyright 2025 Cowboy AI, LLC.
//! Property-Based Tests Module

mod graph_invariants;
