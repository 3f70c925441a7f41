//! End-to-end tests for the Petri server and viewer runtime live under `tests/`.
