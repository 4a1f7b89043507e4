//! Custom Resource Definitions for the custom-operator controller

mod custom_operator;

pub use custom_operator::{
    CustomOperator, CustomOperatorPhase, CustomOperatorSpec, CustomOperatorStatus,
    DEFAULT_CONTAINER_PORT, DEFAULT_IMAGE,
};
