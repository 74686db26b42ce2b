//! Integration tests for the index projection and virtualization dispatcher

mod config_loading;
mod dispatcher_admission;
mod dot_git_routing;
mod placeholder_updates;
mod projection_build;
