//! Timing checks for the store hot paths
