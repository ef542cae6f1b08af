/*!
# CLI module
Command line interface functionality that is specific to Bandicoot.
*/

/// The main CLI module that contains the top-level CLI parser and help text
pub mod core;
/// The align CLI subcommand
pub mod align;
