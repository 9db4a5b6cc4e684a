//! Library half of the semindex MCP server, split out so integration
//! tests can exercise tool handlers directly.

pub mod tools;
