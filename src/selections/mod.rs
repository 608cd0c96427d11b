// src/selections/mod.rs

//! The resolved selection graph: data model, bindings, dependency order,
//! canonical XML and the length-prefixed handoff message.

pub mod binding;
pub mod graph;
pub mod handoff;
pub mod model;
pub mod xml;

pub use binding::{Binding, BindingMode, BindingSource, EnvironmentBinding};
pub use graph::binding_order;
pub use model::{Dependency, Selection, Selections, PACKAGE_PREFIX};
