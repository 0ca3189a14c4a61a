// SPDX-License-Identifier: MIT

pub mod condition;
pub mod graph;
pub mod loader;
pub mod registry;
pub mod run;
pub mod state;
