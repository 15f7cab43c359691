use crate::builder::StepBuilder;
use crate::context::BuildContext;
use crate::error::ActionError;

/// One node of the declarative routine tree. Implemented as one struct per
/// variant (a sealed interface, not a tagged enum), dispatched by name
/// through [`crate::registry::ActionRegistry`].
pub trait Action: Send + Sync {
    /// Pure, load-time validation of this action's own fields and any
    /// nested children. Never reads device state.
    fn validate(&self, ctx: &BuildContext<'_>) -> Result<(), ActionError>;
    /// Lowers this action into one or more compiled Steps appended to
    /// `builder`. Composite actions build their nested children exactly
    /// once, capturing the resulting Step list by value.
    fn build(&self, builder: &mut StepBuilder<'_>) -> Result<(), ActionError>;
}
