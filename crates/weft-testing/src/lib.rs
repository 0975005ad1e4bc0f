//! Testing utilities and harness for Weft

pub mod testing;

pub use testing::*;

pub mod prelude {
    pub use crate::testing::*;
    pub use weft_core::{
        component, keyed_list, show, Content, NodeId, RenderContext, Signal, Switch, Unit, View,
    };
}
