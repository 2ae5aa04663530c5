//! Unit tests for memory manager components
