//! The analysis' view of the substrate heap: identities, values,
//! completions and raw effects.

pub mod def;
pub mod effects;
pub mod value;

pub use def::{AbstractId, BaselineId, CallableId, ObjectId};
pub use effects::{Effects, WriteSite};
pub use value::{
    AbruptCompletion, AbruptKind, AbstractType, AbstractValue, Completion, Primitive,
    PropertyBinding, PropertyKey, Value,
};
